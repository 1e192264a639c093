//! End-to-end ledger properties against a file-backed store.

use std::sync::Arc;

use chrono::NaiveDate;

use equipment::model::*;
use equipment::{EngineConfig, EquipmentService};
use fleetops_core::ServiceError;
use fleetops_sql::SqliteStore;

struct Fleet {
    svc: Arc<EquipmentService>,
    _dir: tempfile::TempDir,
}

fn d(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

/// Site, two machines and serialized bits `T`, `U`, `V`.
fn fleet() -> Fleet {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(SqliteStore::open(&dir.path().join("ledger.sqlite")).unwrap());
    let svc = EquipmentService::new(db, EngineConfig::default()).unwrap();

    svc.create_site(NewSite { id: Some("s1".into()), name: "Quarry".into() }).unwrap();
    for id in ["M", "N"] {
        svc.create_asset(NewAsset {
            id: Some(id.into()),
            name: format!("Machine {id}"),
            kind: AssetKind::Machine,
            site_id: "s1".into(),
            current_rpm: 0.0,
        })
        .unwrap();
    }
    svc.create_component_type(NewComponentType {
        id: Some("bit".into()),
        name: "Drill bit 89mm".into(),
        part_number: "DB-89".into(),
        category: "bit".into(),
        base_price: 90.0,
        stock_qty: 0,
    })
    .unwrap();
    for id in ["T", "U", "V"] {
        svc.create_component_instance(NewComponentInstance {
            id: Some(id.into()),
            type_id: "bit".into(),
            serial_number: format!("SN-{id}"),
            site_id: None,
        })
        .unwrap();
    }
    Fleet { svc: Arc::new(svc), _dir: dir }
}

fn fit(asset: &str, instance: &str, date: &str, rpm: f64) -> FitRequest {
    FitRequest {
        asset_id: asset.into(),
        asset_kind: Some(AssetKind::Machine),
        site_id: None,
        component: ComponentRef::ByInstance { instance_id: instance.into() },
        date: d(date),
        reading: AssetReading { rpm, meter: 0.0 },
        context: None,
        record_id: None,
    }
}

fn remove(date: &str, rpm: f64) -> RemoveRequest {
    RemoveRequest {
        date: d(date),
        reading: AssetReading { rpm, meter: 0.0 },
        scrap: false,
        record_id: None,
    }
}

fn day(asset: &str, record: &str, date: &str, opening: f64, closing: f64, meter: f64) -> DailyUsage {
    DailyUsage {
        record_id: record.into(),
        supersedes: None,
        asset_id: asset.into(),
        date: d(date),
        shifts: vec![ShiftReading {
            shift: 1,
            enabled: true,
            opening_rpm: Some(opening),
            closing_rpm: Some(closing),
            meter,
        }],
    }
}

fn meter_of(svc: &EquipmentService, installation_id: &str) -> f64 {
    svc.get_installation(installation_id).unwrap().current_accumulated_meter
}

#[tokio::test]
async fn fit_remove_refit_scenario() {
    let Fleet { svc, .. } = &fleet();

    let t = svc.fit(fit("M", "T", "2024-05-01", 0.0)).await.unwrap();
    svc.apply_daily_usage(day("M", "d1", "2024-05-01", 0.0, 8.0, 20.0)).await.unwrap();
    assert_eq!(meter_of(svc, &t.id), 20.0);

    // Day 2: swap T for U, then record the day.
    svc.remove(&t.id, remove("2024-05-02", 8.0)).await.unwrap();
    let u = svc.fit(fit("M", "U", "2024-05-02", 8.0)).await.unwrap();
    svc.apply_daily_usage(day("M", "d2", "2024-05-02", 8.0, 14.0, 15.0)).await.unwrap();

    assert_eq!(meter_of(svc, &t.id), 20.0);
    assert_eq!(u.initial_accumulated_meter, 0.0);
    assert_eq!(meter_of(svc, &u.id), 15.0);
    assert_eq!(svc.get_component_type("bit").unwrap().lifetime_meter, 35.0);
}

#[tokio::test]
async fn conservation_across_installations() {
    let Fleet { svc, .. } = &fleet();

    let i1 = svc.fit(fit("M", "T", "2024-05-01", 0.0)).await.unwrap();
    svc.apply_daily_usage(day("M", "d1", "2024-05-01", 0.0, 10.0, 60.0)).await.unwrap();
    svc.apply_daily_usage(day("M", "d2", "2024-05-02", 10.0, 20.0, 40.0)).await.unwrap();
    let i1 = svc.remove(&i1.id, remove("2024-05-03", 20.0)).await.unwrap();
    assert_eq!(i1.initial_accumulated_meter, 0.0);
    assert_eq!(i1.current_accumulated_meter, 100.0);

    // Re-fitted elsewhere, T carries its 100 over.
    let i2 = svc.fit(fit("N", "T", "2024-05-04", 0.0)).await.unwrap();
    assert_eq!(i2.initial_accumulated_meter, 100.0);

    let mut attributed = 0.0;
    for (n, meter) in [12.5, 0.0, 7.5].into_iter().enumerate() {
        let date = format!("2024-05-{:02}", 4 + n);
        let opening = n as f64 * 3.0;
        svc.apply_daily_usage(day("N", &format!("n{n}"), &date, opening, opening + 3.0, meter))
            .await
            .unwrap();
        attributed += meter;
        let now = meter_of(svc, &i2.id);
        assert!(now >= 100.0);
        assert_eq!(now, 100.0 + attributed);
    }
}

#[tokio::test]
async fn idempotent_correction() {
    let Fleet { svc, .. } = &fleet();
    let a = svc.fit(fit("M", "T", "2024-05-01", 0.0)).await.unwrap();
    let b = svc.fit(fit("M", "U", "2024-05-01", 0.0)).await.unwrap();

    svc.apply_daily_usage(day("M", "d1", "2024-05-01", 0.0, 50.0, 50.0)).await.unwrap();
    svc.apply_daily_usage(day("M", "d1", "2024-05-01", 0.0, 50.0, 50.0)).await.unwrap();
    assert_eq!(meter_of(svc, &a.id), 50.0);
    assert_eq!(meter_of(svc, &b.id), 50.0);

    let mut edited = day("M", "d1-v2", "2024-05-01", 0.0, 60.0, 60.0);
    edited.supersedes = Some("d1".into());
    let out = svc.apply_daily_usage(edited).await.unwrap();
    assert!(out.correction);
    assert!(out.credits.iter().all(|c| c.meter_diff == 10.0));
    assert_eq!(meter_of(svc, &a.id), 60.0);
    assert_eq!(meter_of(svc, &b.id), 60.0);
}

#[tokio::test]
async fn negative_delta_clamps_to_zero() {
    let Fleet { svc, .. } = &fleet();
    let a = svc.fit(fit("M", "T", "2024-05-01", 100.0)).await.unwrap();

    let out = svc
        .apply_daily_usage(day("M", "d1", "2024-05-01", 100.0, 90.0, 5.0))
        .await
        .unwrap();
    assert_eq!(out.rpm_delta, 0.0);
    assert_eq!(out.warnings.len(), 1);

    let inst = svc.get_installation(&a.id).unwrap();
    assert_eq!(inst.accumulated_rpm, 0.0);
    assert_eq!(inst.current_accumulated_meter, 5.0);
}

#[tokio::test]
async fn removal_freezes_totals() {
    let Fleet { svc, .. } = &fleet();
    let a = svc.fit(fit("M", "T", "2024-05-01", 0.0)).await.unwrap();
    svc.apply_daily_usage(day("M", "d1", "2024-05-01", 0.0, 5.0, 30.0)).await.unwrap();
    svc.remove(&a.id, remove("2024-05-01", 5.0)).await.unwrap();

    let err = svc
        .record_usage(
            &a.id,
            UsageCredit {
                date: d("2024-05-02"),
                rpm_delta: 1.0,
                meter_delta: 1.0,
                closing_rpm: None,
                record_id: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));

    // Later activity on the same asset leaves it alone.
    svc.fit(fit("M", "U", "2024-05-02", 5.0)).await.unwrap();
    svc.apply_daily_usage(day("M", "d2", "2024-05-02", 5.0, 9.0, 44.0)).await.unwrap();
    assert_eq!(meter_of(svc, &a.id), 30.0);
}

#[tokio::test]
async fn late_entry_over_removed_tool_is_rejected() {
    let Fleet { svc, .. } = &fleet();
    let t = svc.fit(fit("M", "T", "2024-05-01", 0.0)).await.unwrap();
    svc.apply_daily_usage(day("M", "d1", "2024-05-01", 0.0, 8.0, 20.0)).await.unwrap();
    svc.remove(&t.id, remove("2024-05-03", 8.0)).await.unwrap();

    // Day 2 arrives after T was taken off.
    let err = svc
        .apply_daily_usage(day("M", "d2", "2024-05-02", 8.0, 12.0, 30.0))
        .await
        .unwrap_err();
    match err {
        ServiceError::InvalidState(msg) => assert!(msg.contains(&t.id), "{msg}"),
        other => panic!("expected InvalidState, got {other:?}"),
    }
    assert_eq!(meter_of(svc, &t.id), 20.0);
    assert_eq!(svc.get_component_type("bit").unwrap().lifetime_meter, 20.0);

    // Nothing was held for the day, and the removal day itself still records.
    let err = svc
        .retract_daily_usage(RetractRequest {
            asset_id: "M".into(),
            date: d("2024-05-02"),
            record_id: "d2".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
    let out = svc.apply_daily_usage(day("M", "d3", "2024-05-03", 12.0, 15.0, 9.0)).await.unwrap();
    assert!(out.credits.is_empty());
}

#[tokio::test]
async fn schedule_math() {
    let Fleet { svc, .. } = &fleet();
    svc.upsert_schedule("M", "Hammer service", ScheduleInput { cycle: 500.0, last_service_rpm: 1000.0 })
        .await
        .unwrap();

    svc.apply_daily_usage(day("M", "d1", "2024-05-01", 1400.0, 1460.0, 0.0)).await.unwrap();
    let s = &svc.evaluate("M").unwrap()[0];
    assert_eq!(s.next_due_reading, 1500.0);
    assert_eq!(s.remaining, 40.0);
    assert_eq!(s.status, ServiceState::DueSoon);

    svc.apply_daily_usage(day("M", "d2", "2024-05-02", 1460.0, 1500.0, 0.0)).await.unwrap();
    assert_eq!(svc.evaluate("M").unwrap()[0].status, ServiceState::Overdue);
}

#[tokio::test]
async fn concurrent_fits_of_one_instance() {
    let Fleet { svc, .. } = &fleet();

    let a = tokio::spawn({
        let svc = Arc::clone(svc);
        async move { svc.fit(fit("M", "V", "2024-05-01", 0.0)).await }
    });
    let b = tokio::spawn({
        let svc = Arc::clone(svc);
        async move { svc.fit(fit("N", "V", "2024-05-01", 0.0)).await }
    });
    let results = [a.await.unwrap(), b.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(ServiceError::Conflict(_))))
    );
    assert!(svc.active_for_instance("V").unwrap().is_some());
    assert_eq!(svc.get_component_type("bit").unwrap().stock_qty, 2);
}

#[tokio::test]
async fn concurrent_entries_for_one_asset_day() {
    let Fleet { svc, .. } = &fleet();
    let a = svc.fit(fit("M", "T", "2024-05-01", 0.0)).await.unwrap();

    let mut handles = Vec::new();
    for (record, meter) in [("x", 10.0), ("y", 25.0)] {
        let svc = Arc::clone(svc);
        handles.push(tokio::spawn(async move {
            svc.apply_daily_usage(day("M", record, "2024-05-01", 0.0, 4.0, meter)).await
        }));
    }
    let mut applied = Vec::new();
    for h in handles {
        match h.await.unwrap() {
            Ok(out) => applied.push(out.meter_delta),
            Err(e) => assert!(matches!(e, ServiceError::Conflict(_))),
        }
    }

    assert_eq!(applied.len(), 1);
    assert_eq!(meter_of(svc, &a.id), applied[0]);
}

#[tokio::test]
async fn concurrent_entries_on_two_assets_share_type_totals() {
    let Fleet { svc, .. } = &fleet();
    svc.fit(fit("M", "T", "2024-05-01", 0.0)).await.unwrap();
    svc.fit(fit("N", "U", "2024-05-01", 0.0)).await.unwrap();

    let mut handles = Vec::new();
    for (asset, rpm, meter) in [("M", 3.0, 10.0), ("N", 2.0, 7.0)] {
        let svc = Arc::clone(svc);
        handles.push(tokio::spawn(async move {
            for n in 0..5u32 {
                let date = format!("2024-05-{:02}", 1 + n);
                let opening = f64::from(n) * rpm;
                svc.apply_daily_usage(day(asset, &format!("{asset}{n}"), &date, opening, opening + rpm, meter))
                    .await?;
            }
            Ok::<_, ServiceError>(())
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }

    let bit = svc.get_component_type("bit").unwrap();
    assert_eq!(bit.lifetime_meter, 5.0 * 10.0 + 5.0 * 7.0);
    assert_eq!(bit.lifetime_rpm, 5.0 * 3.0 + 5.0 * 2.0);
}
