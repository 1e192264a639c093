//! Installation Ledger: fit, remove, credit and undo.
//!
//! The `*_in` functions do the work against an open transaction so that
//! `reconcile_day` can compose them into one command.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{debug, info};

use fleetops_core::{ServiceError, new_id, now_rfc3339};
use fleetops_sql::SQLExec;

use super::{EquipmentService, check_reading, same_amount};
use crate::model::*;
use crate::store::{Repo, TxRepo};

impl EquipmentService {
    /// Fit a component instance to an asset.
    pub async fn fit(&self, req: FitRequest) -> Result<Installation, ServiceError> {
        let _guard = self.locks.acquire(&req.asset_id).await;
        self.store.write(|repo| fit_in(repo, &req))
    }

    /// Remove an active installation, freezing its accumulated meter.
    pub async fn remove(
        &self,
        installation_id: &str,
        req: RemoveRequest,
    ) -> Result<Installation, ServiceError> {
        let asset_id = self.store.read().get_installation(installation_id)?.asset_id;
        let _guard = self.locks.acquire(&asset_id).await;
        self.store.write(|repo| remove_in(repo, installation_id, &req))
    }

    /// Credit one installation for one day.
    ///
    /// Idempotent by (installation, day): a repeated credit for a day is a
    /// no-op, a different amount replaces the stored one by diff.
    pub async fn record_usage(
        &self,
        installation_id: &str,
        credit: UsageCredit,
    ) -> Result<Installation, ServiceError> {
        check_reading("rpmDelta", credit.rpm_delta)?;
        check_reading("meterDelta", credit.meter_delta)?;
        if let Some(c) = credit.closing_rpm {
            check_reading("closingRpm", c)?;
        }

        let asset_id = self.store.read().get_installation(installation_id)?.asset_id;
        let _guard = self.locks.acquire(&asset_id).await;
        self.store.write(|repo| {
            let mut inst = repo.get_installation(installation_id)?;
            if !inst.is_active() {
                return Err(ServiceError::InvalidState(format!(
                    "installation '{installation_id}' is {}; usage can no longer be recorded",
                    inst.status
                )));
            }
            if credit.date < inst.fitted_date {
                return Err(ServiceError::Validation(format!(
                    "usage date {} is before installation '{installation_id}' was fitted ({})",
                    credit.date, inst.fitted_date
                )));
            }

            let prior = repo.get_attribution(installation_id, credit.date)?;
            let (old_rpm, old_meter) = prior.as_ref().map_or((0.0, 0.0), |a| (a.rpm, a.meter));
            if prior.is_some()
                && same_amount(old_rpm, credit.rpm_delta)
                && same_amount(old_meter, credit.meter_delta)
            {
                return Ok(inst);
            }

            let record_id = credit.record_id.as_deref();
            credit_installation(
                repo,
                &mut inst,
                credit.date,
                credit.rpm_delta - old_rpm,
                credit.meter_delta - old_meter,
                credit.closing_rpm,
                record_id,
            )?;
            repo.put_attribution(&DayAttribution {
                installation_id: inst.id.clone(),
                asset_id: inst.asset_id.clone(),
                day: credit.date,
                rpm: credit.rpm_delta,
                meter: credit.meter_delta,
                record_id: credit.record_id.clone(),
            })?;
            Ok(inst)
        })
    }

    /// Hard-delete a fit that has not yet received any usage.
    ///
    /// The caller must present the transaction context the fit was made
    /// with. The instance goes back to stock.
    pub async fn undo_pending_fit(
        &self,
        installation_id: &str,
        context: &str,
    ) -> Result<(), ServiceError> {
        let asset_id = self.store.read().get_installation(installation_id)?.asset_id;
        let _guard = self.locks.acquire(&asset_id).await;
        self.store.write(|repo| {
            let inst = repo.get_installation(installation_id)?;
            if !inst.is_active() {
                return Err(ServiceError::InvalidState(format!(
                    "installation '{installation_id}' is {}; use remove history instead of undo",
                    inst.status
                )));
            }
            if inst.fit_context.as_deref() != Some(context) {
                return Err(ServiceError::InvalidState(format!(
                    "installation '{installation_id}' was not fitted in context '{context}'"
                )));
            }
            if repo.count_attributions(installation_id)? > 0 {
                return Err(ServiceError::InvalidState(format!(
                    "installation '{installation_id}' has recorded usage; remove it instead"
                )));
            }

            repo.delete_installation(installation_id)?;
            if let Some(instance_id) = inst.instance_id() {
                let mut instance = repo.get_instance(instance_id)?;
                instance.state = InstanceState::InStock;
                instance.updated_at = now_rfc3339();
                repo.update_instance(&instance)?;
            }
            repo.adjust_stock(&inst.component_type_id, 1)?;
            info!(
                "undid fit {installation_id} of {} on asset {}",
                inst.instance_id().unwrap_or("-"),
                inst.asset_id
            );
            Ok(())
        })
    }

    /// Consume type-only stock against an asset (no lifecycle tracking).
    pub async fn consume(&self, req: ConsumeRequest) -> Result<UsageLogEntry, ServiceError> {
        if req.quantity <= 0 {
            return Err(ServiceError::Validation(format!(
                "quantity must be positive (got {})",
                req.quantity
            )));
        }
        let quantity = u32::try_from(req.quantity).map_err(|_| {
            ServiceError::Validation(format!("quantity {} is too large", req.quantity))
        })?;

        let _guard = self.locks.acquire(&req.asset_id).await;
        self.store.write(|repo| {
            let asset = repo.get_asset(&req.asset_id)?;
            let ct = repo.get_component_type(&req.component_type_id)?;
            if !repo.adjust_stock(&ct.id, -req.quantity)? {
                return Err(ServiceError::Validation(format!(
                    "quantity {} of '{}' exceeds available stock {}",
                    req.quantity, ct.part_number, ct.stock_qty
                )));
            }
            let entry = UsageLogEntry {
                id: new_id(),
                installation_id: None,
                component: ComponentRef::ByTypeOnly { type_id: ct.id.clone() },
                asset_id: asset.id.clone(),
                site_id: asset.site_id.clone(),
                action: UsageAction::Consume,
                date: req.date,
                quantity,
                asset_rpm: asset.current_rpm,
                asset_meter: 0.0,
                rpm_delta: 0.0,
                meter_delta: 0.0,
                record_id: req.record_id.clone(),
                created_at: now_rfc3339(),
            };
            repo.append_log(&entry)?;
            info!("consumed {quantity} x {} on asset {}", ct.id, asset.id);
            Ok(entry)
        })
    }

    pub fn get_installation(&self, id: &str) -> Result<Installation, ServiceError> {
        self.store.read().get_installation(id)
    }

    /// Active installations on an asset.
    pub fn list_active_for_asset(&self, asset_id: &str) -> Result<Vec<Installation>, ServiceError> {
        let repo = self.store.read();
        repo.get_asset(asset_id)?;
        repo.active_for_asset(asset_id)
    }

    /// The active installation of an instance, if any.
    pub fn active_for_instance(
        &self,
        instance_id: &str,
    ) -> Result<Option<Installation>, ServiceError> {
        let repo = self.store.read();
        repo.get_instance(instance_id)?;
        repo.active_for_instance(instance_id)
    }

    /// In-stock instances that can be fitted to `asset_id`, with the meter
    /// each would carry into a new installation.
    pub fn list_available_components_for_asset(
        &self,
        asset_id: &str,
    ) -> Result<Vec<AvailableComponent>, ServiceError> {
        let repo = self.store.read();
        let asset = repo.get_asset(asset_id)?;
        let mut types: HashMap<String, ComponentType> = HashMap::new();
        let mut out = Vec::new();
        for inst in repo.in_stock_for_site(&asset.site_id)? {
            if !types.contains_key(&inst.type_id) {
                let ct = repo.get_component_type(&inst.type_id)?;
                types.insert(inst.type_id.clone(), ct);
            }
            let Some(ct) = types.get(&inst.type_id) else { continue };
            out.push(AvailableComponent {
                accumulated_meter: carried_meter(&repo, &inst.id)?,
                instance_id: inst.id,
                serial_number: inst.serial_number,
                component_type_id: ct.id.clone(),
                name: ct.name.clone(),
                part_number: ct.part_number.clone(),
            });
        }
        Ok(out)
    }

    /// Audit trail of one installation, oldest first.
    pub fn usage_log(&self, installation_id: &str) -> Result<Vec<UsageLogEntry>, ServiceError> {
        let repo = self.store.read();
        repo.get_installation(installation_id)?;
        repo.log_for_installation(installation_id)
    }
}

/// Meter an instance carries over from its last completed installation.
fn carried_meter<E: SQLExec + ?Sized>(
    repo: &Repo<'_, E>,
    instance_id: &str,
) -> Result<f64, ServiceError> {
    Ok(repo
        .last_completed_for_instance(instance_id)?
        .map(|i| i.current_accumulated_meter)
        .unwrap_or(0.0))
}

pub(crate) fn fit_in(repo: &TxRepo<'_>, req: &FitRequest) -> Result<Installation, ServiceError> {
    check_reading("reading.rpm", req.reading.rpm)?;
    check_reading("reading.meter", req.reading.meter)?;

    let instance_id = match &req.component {
        ComponentRef::ByInstance { instance_id } => instance_id.clone(),
        ComponentRef::ByTypeOnly { type_id } => {
            return Err(ServiceError::Validation(format!(
                "component type '{type_id}' is tracked by type only and cannot be fitted; consume it instead"
            )));
        }
    };

    let asset = repo.get_asset(&req.asset_id)?;
    if let Some(kind) = req.asset_kind {
        if kind != asset.kind {
            return Err(ServiceError::Validation(format!(
                "asset '{}' is a {}, not a {kind}",
                asset.id, asset.kind
            )));
        }
    }
    let site_id = req.site_id.clone().unwrap_or_else(|| asset.site_id.clone());
    repo.get_site(&site_id)?;

    let mut instance = repo.get_instance(&instance_id)?;
    if let Some(active) = repo.active_for_instance(&instance_id)? {
        return Err(ServiceError::Conflict(format!(
            "component instance '{instance_id}' is already active on asset '{}' (installation '{}'); remove it first",
            active.asset_id, active.id
        )));
    }
    match instance.state {
        InstanceState::InStock => {}
        InstanceState::Fitted => {
            return Err(ServiceError::Conflict(format!(
                "component instance '{instance_id}' is marked fitted"
            )));
        }
        InstanceState::Scrapped => {
            return Err(ServiceError::InvalidState(format!(
                "component instance '{instance_id}' has been scrapped"
            )));
        }
    }

    if !repo.adjust_stock(&instance.type_id, -1)? {
        return Err(ServiceError::Validation(format!(
            "no stock left for component type '{}'",
            instance.type_id
        )));
    }

    let initial = carried_meter(repo, &instance_id)?;
    let now = now_rfc3339();
    let inst = Installation {
        id: new_id(),
        component_type_id: instance.type_id.clone(),
        component: req.component.clone(),
        asset_id: asset.id.clone(),
        asset_kind: asset.kind,
        site_id,
        status: InstallationStatus::Active,
        fitted_date: req.date,
        fitted_rpm: req.reading.rpm,
        fitted_meter: req.reading.meter,
        removed_date: None,
        removed_rpm: None,
        removed_meter: None,
        initial_accumulated_meter: initial,
        current_accumulated_meter: initial,
        accumulated_rpm: 0.0,
        current_rpm: req.reading.rpm,
        last_credited_date: None,
        fit_context: req.context.clone(),
        fit_record_id: req.record_id.clone(),
        remove_record_id: None,
        created_at: now.clone(),
        updated_at: now.clone(),
    };
    repo.insert_installation(&inst)?;

    instance.state = InstanceState::Fitted;
    instance.updated_at = now;
    repo.update_instance(&instance)?;

    repo.append_log(&log_entry(&inst, UsageAction::Fit, req.date, req.reading, req.record_id.as_deref()))?;

    info!(
        "fitted {instance_id} to asset {} on {} (installation {}, carried meter {initial})",
        inst.asset_id, inst.fitted_date, inst.id
    );
    Ok(inst)
}

pub(crate) fn remove_in(
    repo: &TxRepo<'_>,
    installation_id: &str,
    req: &RemoveRequest,
) -> Result<Installation, ServiceError> {
    check_reading("reading.rpm", req.reading.rpm)?;
    check_reading("reading.meter", req.reading.meter)?;

    let mut inst = repo.get_installation(installation_id)?;
    if !inst.is_active() {
        return Err(ServiceError::InvalidState(format!(
            "installation '{installation_id}' is already {}",
            inst.status
        )));
    }
    if req.date < inst.fitted_date {
        return Err(ServiceError::Validation(format!(
            "removal date {} is before fitted date {} of installation '{installation_id}'",
            req.date, inst.fitted_date
        )));
    }
    if req.reading.rpm < inst.fitted_rpm {
        return Err(ServiceError::Validation(format!(
            "removal rpm {} is below fitted rpm {} of installation '{installation_id}'",
            req.reading.rpm, inst.fitted_rpm
        )));
    }

    let now = now_rfc3339();
    inst.status = InstallationStatus::Completed;
    inst.removed_date = Some(req.date);
    inst.removed_rpm = Some(req.reading.rpm);
    inst.removed_meter = Some(req.reading.meter);
    inst.current_rpm = req.reading.rpm;
    inst.remove_record_id = req.record_id.clone();
    inst.updated_at = now.clone();
    repo.update_installation(&inst)?;

    if let Some(instance_id) = inst.instance_id() {
        let mut instance = repo.get_instance(instance_id)?;
        if req.scrap {
            instance.state = InstanceState::Scrapped;
        } else {
            instance.state = InstanceState::InStock;
            instance.site_id = Some(inst.site_id.clone());
            repo.adjust_stock(&inst.component_type_id, 1)?;
        }
        instance.updated_at = now;
        repo.update_instance(&instance)?;
    }

    repo.append_log(&log_entry(&inst, UsageAction::Remove, req.date, req.reading, req.record_id.as_deref()))?;

    info!(
        "removed installation {} from asset {} on {} (accumulated meter {}{})",
        inst.id,
        inst.asset_id,
        req.date,
        inst.current_accumulated_meter,
        if req.scrap { ", scrapped" } else { "" }
    );
    Ok(inst)
}

/// Apply a diff to an installation's running totals and its type's
/// lifetime totals, and log it.
///
/// The closing reading only moves the installation's rpm snapshot forward
/// when `on` is not older than the last credited day.
pub(crate) fn credit_installation(
    repo: &TxRepo<'_>,
    inst: &mut Installation,
    on: NaiveDate,
    rpm_diff: f64,
    meter_diff: f64,
    closing_rpm: Option<f64>,
    record_id: Option<&str>,
) -> Result<InstallationCredit, ServiceError> {
    inst.current_accumulated_meter += meter_diff;
    inst.accumulated_rpm = (inst.accumulated_rpm + rpm_diff).max(0.0);
    if inst.last_credited_date.is_none_or(|last| on >= last) {
        if let Some(c) = closing_rpm {
            inst.current_rpm = c;
        }
        inst.last_credited_date = Some(on);
    }
    inst.updated_at = now_rfc3339();
    repo.update_installation(inst)?;
    repo.add_lifetime(&inst.component_type_id, rpm_diff, meter_diff)?;

    if !same_amount(rpm_diff, 0.0) || !same_amount(meter_diff, 0.0) {
        let mut entry = log_entry(
            inst,
            UsageAction::Update,
            on,
            AssetReading {
                rpm: closing_rpm.unwrap_or(inst.current_rpm),
                meter: inst.current_accumulated_meter,
            },
            record_id,
        );
        entry.rpm_delta = rpm_diff;
        entry.meter_delta = meter_diff;
        repo.append_log(&entry)?;
    }

    debug!(
        "credited installation {} for {on}: rpm {rpm_diff:+}, meter {meter_diff:+} -> {}",
        inst.id, inst.current_accumulated_meter
    );
    Ok(InstallationCredit {
        installation_id: inst.id.clone(),
        rpm_diff,
        meter_diff,
        current_accumulated_meter: inst.current_accumulated_meter,
    })
}

fn log_entry(
    inst: &Installation,
    action: UsageAction,
    date: NaiveDate,
    reading: AssetReading,
    record_id: Option<&str>,
) -> UsageLogEntry {
    UsageLogEntry {
        id: new_id(),
        installation_id: Some(inst.id.clone()),
        component: inst.component.clone(),
        asset_id: inst.asset_id.clone(),
        site_id: inst.site_id.clone(),
        action,
        date,
        quantity: 1,
        asset_rpm: reading.rpm,
        asset_meter: reading.meter,
        rpm_delta: 0.0,
        meter_delta: 0.0,
        record_id: record_id.map(str::to_string),
        created_at: now_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use crate::model::*;
    use crate::service::testing::*;
    use fleetops_core::ServiceError;

    fn credit(date: &str, rpm: f64, meter: f64) -> UsageCredit {
        UsageCredit {
            date: d(date),
            rpm_delta: rpm,
            meter_delta: meter,
            closing_rpm: None,
            record_id: None,
        }
    }

    #[tokio::test]
    async fn fit_reserves_stock_and_logs() {
        let svc = seeded(1);
        let inst = svc.fit(fit_req("bit-1", "2024-03-01", 100.0)).await.unwrap();

        assert_eq!(inst.status, InstallationStatus::Active);
        assert_eq!(inst.initial_accumulated_meter, 0.0);
        assert_eq!(inst.fitted_rpm, 100.0);
        assert_eq!(inst.site_id, "s1");
        assert_eq!(svc.get_component_type("t1").unwrap().stock_qty, 0);
        assert_eq!(
            svc.get_component_instance("bit-1").unwrap().state,
            InstanceState::Fitted
        );

        let log = svc.usage_log(&inst.id).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, UsageAction::Fit);
        assert_eq!(log[0].asset_rpm, 100.0);
    }

    #[tokio::test]
    async fn second_fit_conflicts() {
        let svc = seeded(1);
        svc.fit(fit_req("bit-1", "2024-03-01", 0.0)).await.unwrap();
        let err = svc.fit(fit_req("bit-1", "2024-03-02", 0.0)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn fit_by_type_only_rejected() {
        let svc = seeded(1);
        let mut req = fit_req("bit-1", "2024-03-01", 0.0);
        req.component = ComponentRef::ByTypeOnly { type_id: "t1".into() };
        let err = svc.fit(req).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn fit_checks_asset_kind() {
        let svc = seeded(1);
        let mut req = fit_req("bit-1", "2024-03-01", 0.0);
        req.asset_kind = Some(AssetKind::Compressor);
        let err = svc.fit(req).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        // Nothing was reserved.
        assert_eq!(svc.get_component_type("t1").unwrap().stock_qty, 1);
    }

    #[tokio::test]
    async fn remove_twice_is_invalid_state() {
        let svc = seeded(1);
        let inst = svc.fit(fit_req("bit-1", "2024-03-01", 0.0)).await.unwrap();
        svc.remove(&inst.id, remove_req("2024-03-03", 40.0)).await.unwrap();

        let err = svc.remove(&inst.id, remove_req("2024-03-04", 50.0)).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        let err = svc.remove("missing", remove_req("2024-03-04", 50.0)).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn remove_validates_readings() {
        let svc = seeded(1);
        let inst = svc.fit(fit_req("bit-1", "2024-03-05", 100.0)).await.unwrap();

        let err = svc.remove(&inst.id, remove_req("2024-03-04", 120.0)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        let err = svc.remove(&inst.id, remove_req("2024-03-06", 90.0)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn remove_returns_stock_or_scraps() {
        let svc = seeded(2);
        let a = svc.fit(fit_req("bit-1", "2024-03-01", 0.0)).await.unwrap();
        let b = svc.fit(fit_req("bit-2", "2024-03-01", 0.0)).await.unwrap();
        assert_eq!(svc.get_component_type("t1").unwrap().stock_qty, 0);

        svc.remove(&a.id, remove_req("2024-03-02", 10.0)).await.unwrap();
        let mut scrap = remove_req("2024-03-02", 10.0);
        scrap.scrap = true;
        svc.remove(&b.id, scrap).await.unwrap();

        assert_eq!(svc.get_component_type("t1").unwrap().stock_qty, 1);
        assert_eq!(svc.get_component_instance("bit-1").unwrap().state, InstanceState::InStock);
        assert_eq!(svc.get_component_instance("bit-2").unwrap().state, InstanceState::Scrapped);

        let err = svc.fit(fit_req("bit-2", "2024-03-03", 10.0)).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn refit_carries_accumulated_meter() {
        let svc = seeded(1);
        let first = svc.fit(fit_req("bit-1", "2024-03-01", 0.0)).await.unwrap();
        svc.record_usage(&first.id, credit("2024-03-01", 8.0, 100.0)).await.unwrap();
        svc.remove(&first.id, remove_req("2024-03-02", 8.0)).await.unwrap();

        let avail = svc.list_available_components_for_asset("m1").unwrap();
        assert_eq!(avail.len(), 1);
        assert_eq!(avail[0].accumulated_meter, 100.0);

        let second = svc.fit(fit_req("bit-1", "2024-03-03", 8.0)).await.unwrap();
        assert_eq!(second.initial_accumulated_meter, 100.0);
        assert_eq!(second.current_accumulated_meter, 100.0);
        assert!(svc.list_available_components_for_asset("m1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn record_usage_is_idempotent_by_day() {
        let svc = seeded(1);
        let inst = svc.fit(fit_req("bit-1", "2024-03-01", 0.0)).await.unwrap();

        svc.record_usage(&inst.id, credit("2024-03-01", 5.0, 50.0)).await.unwrap();
        let again = svc.record_usage(&inst.id, credit("2024-03-01", 5.0, 50.0)).await.unwrap();
        assert_eq!(again.current_accumulated_meter, 50.0);

        let fixed = svc.record_usage(&inst.id, credit("2024-03-01", 6.0, 60.0)).await.unwrap();
        assert_eq!(fixed.current_accumulated_meter, 60.0);
        assert_eq!(fixed.accumulated_rpm, 6.0);

        let ct = svc.get_component_type("t1").unwrap();
        assert_eq!(ct.lifetime_meter, 60.0);
        assert_eq!(ct.lifetime_rpm, 6.0);

        let updates: Vec<_> = svc
            .usage_log(&inst.id)
            .unwrap()
            .into_iter()
            .filter(|e| e.action == UsageAction::Update)
            .collect();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1].meter_delta, 10.0);
    }

    #[tokio::test]
    async fn record_usage_rejects_negative_and_frozen() {
        let svc = seeded(1);
        let inst = svc.fit(fit_req("bit-1", "2024-03-01", 0.0)).await.unwrap();
        let err = svc
            .record_usage(&inst.id, credit("2024-03-01", -1.0, 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        svc.record_usage(&inst.id, credit("2024-03-01", 2.0, 20.0)).await.unwrap();
        svc.remove(&inst.id, remove_req("2024-03-02", 2.0)).await.unwrap();
        let err = svc
            .record_usage(&inst.id, credit("2024-03-02", 1.0, 5.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert_eq!(svc.get_installation(&inst.id).unwrap().current_accumulated_meter, 20.0);
    }

    #[tokio::test]
    async fn undo_pending_fit() {
        let svc = seeded(1);
        let inst = svc.fit(fit_req("bit-1", "2024-03-01", 0.0)).await.unwrap();

        let err = svc.undo_pending_fit(&inst.id, "someone-else").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        svc.undo_pending_fit(&inst.id, "ctx-1").await.unwrap();
        assert!(matches!(svc.get_installation(&inst.id), Err(ServiceError::NotFound(_))));
        assert_eq!(svc.get_component_type("t1").unwrap().stock_qty, 1);
        assert!(svc.active_for_instance("bit-1").unwrap().is_none());
    }

    #[tokio::test]
    async fn undo_after_usage_is_refused() {
        let svc = seeded(1);
        let inst = svc.fit(fit_req("bit-1", "2024-03-01", 0.0)).await.unwrap();
        svc.record_usage(&inst.id, credit("2024-03-01", 1.0, 10.0)).await.unwrap();

        let err = svc.undo_pending_fit(&inst.id, "ctx-1").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert!(svc.active_for_instance("bit-1").unwrap().is_some());
    }

    #[tokio::test]
    async fn consume_checks_stock() {
        let svc = seeded(0);
        let req = |q| ConsumeRequest {
            asset_id: "m1".into(),
            component_type_id: "t1".into(),
            quantity: q,
            date: d("2024-03-01"),
            record_id: None,
        };
        let err = svc.consume(req(0)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        let err = svc.consume(req(1)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        svc.create_component_type(NewComponentType {
            id: Some("t2".into()),
            name: "Coupling sleeve".into(),
            part_number: "CS-38".into(),
            category: "sleeve".into(),
            base_price: 0.0,
            stock_qty: 5,
        })
        .unwrap();
        let mut ok = req(3);
        ok.component_type_id = "t2".into();
        let entry = svc.consume(ok).await.unwrap();
        assert_eq!(entry.action, UsageAction::Consume);
        assert_eq!(entry.quantity, 3);
        assert!(entry.installation_id.is_none());
        assert_eq!(svc.get_component_type("t2").unwrap().stock_qty, 2);
    }
}
