pub mod api;
pub mod locks;
pub mod model;
pub mod service;
pub mod store;

use std::sync::Arc;

use axum::Router;
use fleetops_core::{Module, ServiceError};
use fleetops_sql::SQLStore;

pub use service::{EngineConfig, EquipmentService};

/// The equipment module: installation ledger, usage accumulation and
/// maintenance schedules for a fleet of machines and compressors.
pub struct EquipmentModule {
    service: Arc<EquipmentService>,
}

impl EquipmentModule {
    /// Create the module and initialise its storage.
    pub fn new(db: Arc<dyn SQLStore>) -> Result<Self, ServiceError> {
        Self::with_config(db, EngineConfig::default())
    }

    pub fn with_config(db: Arc<dyn SQLStore>, config: EngineConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            service: Arc::new(EquipmentService::new(db, config)?),
        })
    }

    /// Direct access to the engine for in-process callers.
    pub fn service(&self) -> &Arc<EquipmentService> {
        &self.service
    }
}

impl Module for EquipmentModule {
    fn name(&self) -> &str {
        "equipment"
    }

    fn routes(&self) -> Router {
        api::router(Arc::clone(&self.service))
    }
}
