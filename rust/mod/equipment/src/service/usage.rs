//! Usage Accumulation Engine.
//!
//! A daily entry is turned into one asset-level delta, which every
//! installation in the asset-day cohort receives in full. What each
//! installation got from each asset-day is stored, so a corrected entry is
//! applied as a diff against the stored amount and a repeated entry is a
//! no-op.

use chrono::NaiveDate;
use tracing::{info, warn};

use fleetops_core::ServiceError;

use super::ledger::{credit_installation, fit_in, remove_in};
use super::{EquipmentService, same_amount};
use crate::model::*;
use crate::store::TxRepo;

/// Sum a day's shifts into one delta.
///
/// At most two shifts, numbered 1 and 2. An enabled shift needs both
/// readings; a disabled one contributes nothing. Negative values are
/// clamped to zero and reported as warnings.
pub fn compute_daily_delta(usage: &DailyUsage) -> Result<DailyDelta, ServiceError> {
    let asset = &usage.asset_id;
    let date = usage.date;

    if usage.shifts.len() > 2 {
        return Err(ServiceError::Validation(format!(
            "asset '{asset}' on {date}: at most two shifts per day (got {})",
            usage.shifts.len()
        )));
    }

    let mut shifts: Vec<&ShiftReading> = usage.shifts.iter().collect();
    shifts.sort_by_key(|s| s.shift);
    for pair in shifts.windows(2) {
        if pair[0].shift == pair[1].shift {
            return Err(ServiceError::Validation(format!(
                "asset '{asset}' on {date}: shift {} submitted twice",
                pair[0].shift
            )));
        }
    }

    let mut delta = DailyDelta {
        rpm_delta: 0.0,
        meter_delta: 0.0,
        closing_rpm: None,
        opening_rpm: None,
        warnings: Vec::new(),
    };

    for s in shifts {
        let n = s.shift;
        if n != 1 && n != 2 {
            return Err(ServiceError::Validation(format!(
                "asset '{asset}' on {date}: shift must be 1 or 2 (got {n})"
            )));
        }
        if !s.enabled {
            continue;
        }

        let opening = s.opening_rpm.ok_or_else(|| {
            ServiceError::Validation(format!(
                "shift {n} of asset '{asset}' on {date}: opening reading is required"
            ))
        })?;
        let closing = s.closing_rpm.ok_or_else(|| {
            ServiceError::Validation(format!(
                "shift {n} of asset '{asset}' on {date}: closing reading is required"
            ))
        })?;
        for (field, v) in [("openingRpm", opening), ("closingRpm", closing), ("meter", s.meter)] {
            if !v.is_finite() {
                return Err(ServiceError::Validation(format!(
                    "shift {n} of asset '{asset}' on {date}: {field} must be a finite number"
                )));
            }
        }

        let rpm = closing - opening;
        if rpm < 0.0 {
            let message = format!(
                "shift {n} of asset '{asset}' on {date}: closing reading {closing} is below opening reading {opening}; counted as 0"
            );
            warn!("{message}");
            delta.warnings.push(UsageWarning {
                field: format!("shifts[{n}].closingRpm"),
                message,
            });
        } else {
            delta.rpm_delta += rpm;
        }

        if s.meter < 0.0 {
            let message = format!(
                "shift {n} of asset '{asset}' on {date}: negative meter {} counted as 0",
                s.meter
            );
            warn!("{message}");
            delta.warnings.push(UsageWarning {
                field: format!("shifts[{n}].meter"),
                message,
            });
        } else {
            delta.meter_delta += s.meter;
        }

        if delta.opening_rpm.is_none() {
            delta.opening_rpm = Some(opening);
        }
        delta.closing_rpm = Some(closing);
    }

    Ok(delta)
}

impl EquipmentService {
    /// Apply one daily entry to every installation on the asset.
    pub async fn apply_daily_usage(
        &self,
        usage: DailyUsage,
    ) -> Result<DailyUsageOutcome, ServiceError> {
        let delta = compute_daily_delta(&usage)?;
        let _guard = self.locks.acquire(&usage.asset_id).await;
        self.store.write(|repo| apply_in(repo, &usage, &delta))
    }

    /// Withdraw the contribution of a deleted daily entry.
    pub async fn retract_daily_usage(
        &self,
        req: RetractRequest,
    ) -> Result<DailyUsageOutcome, ServiceError> {
        let _guard = self.locks.acquire(&req.asset_id).await;
        self.store.write(|repo| {
            let held = repo.get_asset_day(&req.asset_id, req.date)?.ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "no usage recorded for asset '{}' on {}",
                    req.asset_id, req.date
                ))
            })?;
            if held.record_id != req.record_id {
                return Err(ServiceError::Conflict(format!(
                    "usage for asset '{}' on {} belongs to record '{}', not '{}'",
                    req.asset_id, req.date, held.record_id, req.record_id
                )));
            }

            let mut credits = Vec::new();
            for attr in repo.attributions_for_day(&req.asset_id, req.date)? {
                if same_amount(attr.rpm, 0.0) && same_amount(attr.meter, 0.0) {
                    continue;
                }
                let mut inst = repo.get_installation(&attr.installation_id)?;
                ensure_open(&inst, req.date)?;
                credits.push(credit_installation(
                    repo,
                    &mut inst,
                    req.date,
                    -attr.rpm,
                    -attr.meter,
                    None,
                    Some(&req.record_id),
                )?);
            }
            repo.delete_attributions_for_day(&req.asset_id, req.date)?;
            repo.delete_asset_day(&req.asset_id, req.date)?;
            rewind_reading(repo, &req.asset_id, req.date, &held)?;

            info!(
                "retracted usage of record {} for asset {} on {} ({} installations)",
                req.record_id,
                req.asset_id,
                req.date,
                credits.len()
            );
            Ok(DailyUsageOutcome {
                asset_id: req.asset_id.clone(),
                date: req.date,
                record_id: req.record_id.clone(),
                rpm_delta: 0.0,
                meter_delta: 0.0,
                correction: true,
                credits,
                warnings: Vec::new(),
            })
        })
    }

    /// One daily entry with its fit and remove actions, as a single command.
    ///
    /// Fits run first, then the day's usage, then removals, so a tool
    /// removed that day is credited before it is frozen. Replaying the same
    /// command skips fits and removals the record already performed.
    pub async fn reconcile_day(&self, cmd: ReconcileDay) -> Result<ReconcileOutcome, ServiceError> {
        let delta = compute_daily_delta(&cmd.usage)?;
        let usage = &cmd.usage;
        let _guard = self.locks.acquire(&usage.asset_id).await;

        self.store.write(|repo| {
            let asset = repo.get_asset(&usage.asset_id)?;

            let mut fitted = Vec::new();
            for fit in &cmd.fits {
                if let Some(done) = repo.fit_by_record(&fit.instance_id, &usage.record_id)? {
                    fitted.push(done);
                    continue;
                }
                let reading = fit.reading.unwrap_or(AssetReading {
                    rpm: delta.opening_rpm.unwrap_or(asset.current_rpm),
                    meter: 0.0,
                });
                fitted.push(fit_in(
                    repo,
                    &FitRequest {
                        asset_id: asset.id.clone(),
                        asset_kind: None,
                        site_id: None,
                        component: ComponentRef::ByInstance {
                            instance_id: fit.instance_id.clone(),
                        },
                        date: usage.date,
                        reading,
                        context: Some(usage.record_id.clone()),
                        record_id: Some(usage.record_id.clone()),
                    },
                )?);
            }

            let outcome = apply_in(repo, usage, &delta)?;

            let mut removed = Vec::new();
            for rm in &cmd.removes {
                let inst = repo.get_installation(&rm.installation_id)?;
                if inst.asset_id != asset.id {
                    return Err(ServiceError::Validation(format!(
                        "installation '{}' is on asset '{}', not '{}'",
                        inst.id, inst.asset_id, asset.id
                    )));
                }
                if !inst.is_active()
                    && inst.remove_record_id.as_deref() == Some(usage.record_id.as_str())
                {
                    removed.push(inst);
                    continue;
                }
                let reading = AssetReading {
                    rpm: delta.closing_rpm.unwrap_or(inst.current_rpm).max(inst.current_rpm),
                    meter: rm.meter.unwrap_or(inst.current_accumulated_meter),
                };
                removed.push(remove_in(
                    repo,
                    &inst.id,
                    &RemoveRequest {
                        date: usage.date,
                        reading,
                        scrap: rm.scrap,
                        record_id: Some(usage.record_id.clone()),
                    },
                )?);
            }

            Ok(ReconcileOutcome {
                fitted,
                usage: outcome,
                removed,
            })
        })
    }
}

/// Credit (or re-credit) the asset-day cohort with `delta`.
pub(crate) fn apply_in(
    repo: &TxRepo<'_>,
    usage: &DailyUsage,
    delta: &DailyDelta,
) -> Result<DailyUsageOutcome, ServiceError> {
    let mut asset = repo.get_asset(&usage.asset_id)?;
    let date = usage.date;

    let correction = match repo.get_asset_day(&asset.id, date)? {
        None => false,
        Some(held)
            if held.record_id == usage.record_id
                || usage.supersedes.as_deref() == Some(held.record_id.as_str()) =>
        {
            true
        }
        Some(held) => {
            warn!(
                "rejected record {} for asset {} on {}: day is held by record {}",
                usage.record_id, asset.id, date, held.record_id
            );
            return Err(ServiceError::Conflict(format!(
                "usage for asset '{}' on {date} was already recorded by '{}'; \
                 resubmit with supersedes = '{}' to replace it",
                asset.id, held.record_id, held.record_id
            )));
        }
    };

    // Fixed at first submission; corrections re-credit the same set.
    let cohort: Vec<Installation> = if correction {
        repo.attributions_for_day(&asset.id, date)?
            .iter()
            .map(|a| repo.get_installation(&a.installation_id))
            .collect::<Result<_, _>>()?
    } else {
        let carries_usage =
            !same_amount(delta.rpm_delta, 0.0) || !same_amount(delta.meter_delta, 0.0);
        let missed = repo.completed_spanning(&asset.id, date)?;
        if carries_usage && !missed.is_empty() {
            let ids: Vec<&str> = missed.iter().map(|i| i.id.as_str()).collect();
            warn!(
                "rejected record {} for asset {} on {}: removed installations {:?} ran that day",
                usage.record_id, asset.id, date, ids
            );
            return Err(ServiceError::InvalidState(format!(
                "usage for asset '{}' on {date} arrived after installations {} were removed; \
                 their totals are frozen and cannot take that day's usage",
                asset.id,
                ids.join(", ")
            )));
        }
        repo.active_for_asset(&asset.id)?
            .into_iter()
            .filter(|i| i.fitted_date <= date)
            .collect()
    };

    let mut credits = Vec::new();
    for mut inst in cohort {
        let prior = repo.get_attribution(&inst.id, date)?;
        let (old_rpm, old_meter) = prior.as_ref().map_or((0.0, 0.0), |a| (a.rpm, a.meter));
        let rpm_diff = delta.rpm_delta - old_rpm;
        let meter_diff = delta.meter_delta - old_meter;

        if same_amount(rpm_diff, 0.0) && same_amount(meter_diff, 0.0) {
            if inst.is_active() && delta.closing_rpm.is_some() && prior.is_none() {
                credits.push(credit_installation(
                    repo,
                    &mut inst,
                    date,
                    0.0,
                    0.0,
                    delta.closing_rpm,
                    Some(&usage.record_id),
                )?);
            }
        } else {
            if !inst.is_active() {
                warn!(
                    "rejected correction of record {} for asset {} on {}: installation {} is frozen",
                    usage.record_id, asset.id, date, inst.id
                );
            }
            ensure_open(&inst, date)?;
            credits.push(credit_installation(
                repo,
                &mut inst,
                date,
                rpm_diff,
                meter_diff,
                delta.closing_rpm,
                Some(&usage.record_id),
            )?);
        }

        repo.put_attribution(&DayAttribution {
            installation_id: inst.id.clone(),
            asset_id: asset.id.clone(),
            day: date,
            rpm: delta.rpm_delta,
            meter: delta.meter_delta,
            record_id: Some(usage.record_id.clone()),
        })?;
    }

    repo.put_asset_day(&AssetDay {
        asset_id: asset.id.clone(),
        day: date,
        record_id: usage.record_id.clone(),
        rpm_delta: delta.rpm_delta,
        meter_delta: delta.meter_delta,
        closing_rpm: delta.closing_rpm,
    })?;

    if let Some(closing) = delta.closing_rpm {
        if asset.last_reading_date.is_none_or(|last| date >= last) {
            asset.current_rpm = closing;
            asset.last_reading_date = Some(date);
            repo.update_asset(&asset)?;
        }
    }

    info!(
        "applied record {} to asset {} on {}: rpm {}, meter {}, {} installations{}",
        usage.record_id,
        asset.id,
        date,
        delta.rpm_delta,
        delta.meter_delta,
        credits.len(),
        if correction { " (correction)" } else { "" }
    );

    Ok(DailyUsageOutcome {
        asset_id: asset.id,
        date,
        record_id: usage.record_id.clone(),
        rpm_delta: delta.rpm_delta,
        meter_delta: delta.meter_delta,
        correction,
        credits,
        warnings: delta.warnings.clone(),
    })
}

/// Put the asset's reading back on the latest remaining day once the day
/// that set it has been retracted. Active installations' snapshots follow.
fn rewind_reading(
    repo: &TxRepo<'_>,
    asset_id: &str,
    retracted: NaiveDate,
    held: &AssetDay,
) -> Result<(), ServiceError> {
    let mut asset = repo.get_asset(asset_id)?;
    if asset.last_reading_date != Some(retracted) {
        return Ok(());
    }

    let (reading_day, reading) = match repo.latest_reading(asset_id)? {
        Some((on, closing)) => (Some(on), closing),
        // Nothing left to fall back on: the retracted day's opening reading.
        None => (
            None,
            held.closing_rpm
                .map_or(asset.current_rpm, |c| (c - held.rpm_delta).max(0.0)),
        ),
    };
    asset.current_rpm = reading;
    asset.last_reading_date = reading_day;
    repo.update_asset(&asset)?;

    for mut inst in repo.active_for_asset(asset_id)? {
        if inst.last_credited_date != Some(retracted) {
            continue;
        }
        inst.current_rpm = reading.max(inst.fitted_rpm);
        inst.last_credited_date = reading_day.filter(|on| *on >= inst.fitted_date);
        inst.updated_at = fleetops_core::now_rfc3339();
        repo.update_installation(&inst)?;
    }

    info!(
        "rewound reading of asset {asset_id} to {reading} after retracting {retracted}"
    );
    Ok(())
}

/// A completed installation's totals are frozen.
fn ensure_open(inst: &Installation, date: NaiveDate) -> Result<(), ServiceError> {
    if inst.is_active() {
        return Ok(());
    }
    Err(ServiceError::InvalidState(format!(
        "installation '{}' was removed on {}; its usage for {date} can no longer change",
        inst.id,
        inst.removed_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string())
    )))
}
