use criterion::{black_box, criterion_group, criterion_main, Criterion};

use fleetops_sql::{SQLExec, SQLStore, SqliteStore, Value};

/// A ledger-shaped table: one row per installation-day credit.
fn attribution_store(rows: i64) -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .exec_batch(
            "CREATE TABLE credits (
                installation_id TEXT NOT NULL,
                day TEXT NOT NULL,
                meter REAL NOT NULL,
                PRIMARY KEY (installation_id, day)
            );
            CREATE TABLE totals (id TEXT PRIMARY KEY, meter REAL NOT NULL);
            INSERT INTO totals (id, meter) VALUES ('bit', 0);",
        )
        .unwrap();

    for i in 0..rows {
        store
            .exec(
                "INSERT INTO credits (installation_id, day, meter) VALUES (?1, ?2, ?3)",
                &[
                    Value::Text(format!("inst-{}", i % 100)),
                    Value::Text(format!("day-{:05}", i)),
                    Value::Real(i as f64 * 0.5),
                ],
            )
            .unwrap();
    }
    store
}

fn bench_upsert_credit(c: &mut Criterion) {
    let store = attribution_store(0);
    let mut i = 0i64;

    c.bench_function("sqlite_upsert_credit", |b| {
        b.iter(|| {
            store
                .exec(
                    "INSERT INTO credits (installation_id, day, meter) VALUES (?1, ?2, ?3) \
                     ON CONFLICT(installation_id, day) DO UPDATE SET meter = excluded.meter",
                    &[
                        Value::Text("inst-1".to_string()),
                        Value::Text(format!("day-{:05}", black_box(i % 365))),
                        Value::Real(42.5),
                    ],
                )
                .unwrap();
            i += 1;
        });
    });
}

fn bench_credit_transaction(c: &mut Criterion) {
    let store = attribution_store(0);
    let mut i = 0i64;

    c.bench_function("sqlite_credit_transaction", |b| {
        b.iter(|| {
            let tx = store.begin().unwrap();
            tx.exec(
                "INSERT OR REPLACE INTO credits (installation_id, day, meter) VALUES (?1, ?2, ?3)",
                &[
                    Value::Text("inst-1".to_string()),
                    Value::Text(format!("day-{:05}", black_box(i))),
                    Value::Real(1.0),
                ],
            )
            .unwrap();
            tx.exec(
                "UPDATE totals SET meter = meter + ?1 WHERE id = 'bit'",
                &[Value::Real(1.0)],
            )
            .unwrap();
            tx.commit().unwrap();
            i += 1;
        });
    });
}

fn bench_sum_by_installation(c: &mut Criterion) {
    let store = attribution_store(10000);
    let mut i = 0i64;

    c.bench_function("sqlite_sum_by_installation", |b| {
        b.iter(|| {
            let rows = store
                .query(
                    "SELECT SUM(meter) AS total FROM credits WHERE installation_id = ?1",
                    &[Value::Text(format!("inst-{}", black_box(i % 100)))],
                )
                .unwrap();
            assert_eq!(rows.len(), 1);
            i += 1;
        });
    });
}

criterion_group!(
    benches,
    bench_upsert_credit,
    bench_credit_transaction,
    bench_sum_by_installation
);
criterion_main!(benches);
