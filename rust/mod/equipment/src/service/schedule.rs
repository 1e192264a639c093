//! Maintenance Schedule Evaluator and schedule configuration.

use tracing::info;

use fleetops_core::{ServiceError, new_id, now_rfc3339};

use super::{EquipmentService, check_reading, require_non_empty};
use crate::model::*;

/// Derive the status of one schedule at `current_reading`.
pub fn evaluate_schedule(
    cfg: &ServiceScheduleConfig,
    current_reading: f64,
    due_soon_threshold: f64,
) -> ServiceStatus {
    let next_due = cfg.last_service_rpm + cfg.cycle;
    let remaining = next_due - current_reading;
    let status = if remaining <= 0.0 {
        ServiceState::Overdue
    } else if remaining <= due_soon_threshold {
        ServiceState::DueSoon
    } else {
        ServiceState::Ok
    };
    let percent_remaining = if cfg.cycle > 0.0 {
        (remaining / cfg.cycle).clamp(0.0, 1.0) * 100.0
    } else {
        0.0
    };
    ServiceStatus {
        name: cfg.name.clone(),
        cycle: cfg.cycle,
        last_service_reading: cfg.last_service_rpm,
        next_due_reading: next_due,
        current_reading,
        remaining,
        status,
        percent_remaining,
    }
}

impl EquipmentService {
    /// Status of every schedule on the asset at its current reading.
    pub fn evaluate(&self, asset_id: &str) -> Result<Vec<ServiceStatus>, ServiceError> {
        let repo = self.store.read();
        let asset = repo.get_asset(asset_id)?;
        Ok(repo
            .list_schedules(asset_id)?
            .iter()
            .map(|cfg| evaluate_schedule(cfg, asset.current_rpm, self.config.due_soon_threshold))
            .collect())
    }

    pub fn list_schedules(&self, asset_id: &str) -> Result<Vec<ServiceScheduleConfig>, ServiceError> {
        let repo = self.store.read();
        repo.get_asset(asset_id)?;
        repo.list_schedules(asset_id)
    }

    /// Create or reconfigure the named schedule on an asset.
    pub async fn upsert_schedule(
        &self,
        asset_id: &str,
        name: &str,
        input: ScheduleInput,
    ) -> Result<ServiceScheduleConfig, ServiceError> {
        require_non_empty("name", name)?;
        if !input.cycle.is_finite() || input.cycle <= 0.0 {
            return Err(ServiceError::Validation(format!(
                "cycle of schedule '{name}' must be a positive number (got {})",
                input.cycle
            )));
        }
        check_reading("lastServiceRpm", input.last_service_rpm)?;

        let _guard = self.locks.acquire(asset_id).await;
        self.store.write(|repo| {
            repo.get_asset(asset_id)?;
            let now = now_rfc3339();
            let existing = repo.get_schedule(asset_id, name)?;
            let cfg = ServiceScheduleConfig {
                id: existing.as_ref().map_or_else(new_id, |e| e.id.clone()),
                asset_id: asset_id.to_string(),
                name: name.to_string(),
                cycle: input.cycle,
                last_service_rpm: input.last_service_rpm,
                next_due_rpm: input.last_service_rpm + input.cycle,
                created_at: existing.map_or_else(|| now.clone(), |e| e.created_at),
                updated_at: now,
            };
            repo.put_schedule(&cfg)?;
            Ok(cfg)
        })
    }

    /// Record a completed service and restart the cycle from `reading`.
    pub async fn record_service(
        &self,
        asset_id: &str,
        name: &str,
        req: RecordServiceRequest,
    ) -> Result<ServiceScheduleConfig, ServiceError> {
        check_reading("reading", req.reading)?;

        let _guard = self.locks.acquire(asset_id).await;
        self.store.write(|repo| {
            let mut cfg = repo.get_schedule(asset_id, name)?.ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "schedule '{name}' not found on asset '{asset_id}'"
                ))
            })?;
            let now = now_rfc3339();
            repo.insert_service_record(&ServiceRecord {
                id: new_id(),
                asset_id: asset_id.to_string(),
                name: name.to_string(),
                reading: req.reading,
                date: req.date,
                notes: req.notes.clone(),
                created_at: now.clone(),
            })?;
            cfg.last_service_rpm = req.reading;
            cfg.next_due_rpm = req.reading + cfg.cycle;
            cfg.updated_at = now;
            repo.put_schedule(&cfg)?;
            info!(
                "service '{name}' recorded on asset {asset_id} at {} (next due {})",
                req.reading, cfg.next_due_rpm
            );
            Ok(cfg)
        })
    }

    /// Stop evaluating a schedule. Its service history is kept.
    pub async fn delete_schedule(&self, asset_id: &str, name: &str) -> Result<(), ServiceError> {
        let _guard = self.locks.acquire(asset_id).await;
        let deleted = self.store.write(|repo| repo.delete_schedule(asset_id, name))?;
        if deleted == 0 {
            return Err(ServiceError::NotFound(format!(
                "schedule '{name}' not found on asset '{asset_id}'"
            )));
        }
        Ok(())
    }

    /// Completed services on an asset, newest first.
    pub fn service_history(&self, asset_id: &str) -> Result<Vec<ServiceRecord>, ServiceError> {
        let repo = self.store.read();
        repo.get_asset(asset_id)?;
        repo.list_service_records(asset_id)
    }
}
