pub mod catalog;
pub mod ledger;
pub mod report;
pub mod schedule;
pub mod usage;

use std::sync::Arc;

use serde::Deserialize;

use fleetops_core::ServiceError;
use fleetops_sql::SQLStore;

use crate::locks::KeyedLocks;
use crate::store::EquipmentStore;

pub use schedule::evaluate_schedule;
pub use usage::compute_daily_delta;

/// Engine tunables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Remaining RPM at or below which a schedule is reported as due soon.
    pub due_soon_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { due_soon_threshold: 50.0 }
    }
}

/// Equipment service: Installation Ledger, Usage Accumulation Engine,
/// Schedule Evaluator and reporting projections over one store.
///
/// Writes that touch an asset take that asset's lock first, then run in a
/// single SQL transaction.
pub struct EquipmentService {
    pub(crate) store: Arc<EquipmentStore>,
    pub(crate) locks: KeyedLocks,
    pub(crate) config: EngineConfig,
}

impl EquipmentService {
    pub fn new(db: Arc<dyn SQLStore>, config: EngineConfig) -> Result<Self, ServiceError> {
        let store = Arc::new(EquipmentStore::new(db)?);
        Ok(Self {
            store,
            locks: KeyedLocks::new(),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Reject readings that are negative or not finite.
pub(crate) fn check_reading(field: &str, value: f64) -> Result<(), ServiceError> {
    if !value.is_finite() {
        return Err(ServiceError::Validation(format!("{field} must be a finite number")));
    }
    if value < 0.0 {
        return Err(ServiceError::Validation(format!(
            "{field} must not be negative (got {value})"
        )));
    }
    Ok(())
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        return Err(ServiceError::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// Float comparison for stored amounts.
pub(crate) fn same_amount(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
