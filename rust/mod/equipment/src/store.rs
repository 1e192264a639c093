use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;

use fleetops_core::{ListParams, ListResult, ServiceError};
use fleetops_sql::{Row, SQLError, SQLExec, SQLStore, SQLTransaction, Value};

use crate::model::*;

/// SQL schema for the equipment ledger.
///
/// Records keep their full JSON in `data`; the other columns are indexes,
/// except on `component_types` where the lifetime totals and stock count
/// live only in their numeric columns so they can be bumped atomically.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sites (
    id          TEXT PRIMARY KEY,
    data        TEXT NOT NULL,
    name        TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS assets (
    id          TEXT PRIMARY KEY,
    data        TEXT NOT NULL,
    name        TEXT NOT NULL,
    kind        TEXT NOT NULL,
    site_id     TEXT NOT NULL REFERENCES sites(id),
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_asset_site ON assets(site_id);

CREATE TABLE IF NOT EXISTS component_types (
    id              TEXT PRIMARY KEY,
    data            TEXT NOT NULL,
    name            TEXT NOT NULL,
    part_number     TEXT NOT NULL,
    lifetime_rpm    REAL NOT NULL DEFAULT 0,
    lifetime_meter  REAL NOT NULL DEFAULT 0,
    stock_qty       INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS component_instances (
    id              TEXT PRIMARY KEY,
    data            TEXT NOT NULL,
    type_id         TEXT NOT NULL REFERENCES component_types(id),
    serial_number   TEXT NOT NULL UNIQUE,
    state           TEXT NOT NULL,
    site_id         TEXT,
    created_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_instance_state ON component_instances(state);

CREATE TABLE IF NOT EXISTS installations (
    id              TEXT PRIMARY KEY,
    data            TEXT NOT NULL,
    instance_id     TEXT,
    type_id         TEXT NOT NULL REFERENCES component_types(id),
    asset_id        TEXT NOT NULL REFERENCES assets(id),
    site_id         TEXT NOT NULL REFERENCES sites(id),
    status          TEXT NOT NULL,
    fitted_date     TEXT NOT NULL,
    removed_date    TEXT,
    fit_record_id   TEXT,
    created_at      TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_installation_one_active
    ON installations(instance_id) WHERE status = 'ACTIVE';
CREATE INDEX IF NOT EXISTS idx_installation_asset ON installations(asset_id, status);
CREATE INDEX IF NOT EXISTS idx_installation_site ON installations(site_id);
CREATE INDEX IF NOT EXISTS idx_installation_instance ON installations(instance_id, status);

CREATE TABLE IF NOT EXISTS usage_log (
    id              TEXT PRIMARY KEY,
    data            TEXT NOT NULL,
    installation_id TEXT REFERENCES installations(id),
    asset_id        TEXT NOT NULL,
    action          TEXT NOT NULL,
    date            TEXT NOT NULL,
    record_id       TEXT,
    created_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_usage_log_installation ON usage_log(installation_id);
CREATE INDEX IF NOT EXISTS idx_usage_log_asset ON usage_log(asset_id, date);

CREATE TABLE IF NOT EXISTS day_attributions (
    installation_id TEXT NOT NULL REFERENCES installations(id),
    asset_id        TEXT NOT NULL,
    day             TEXT NOT NULL,
    rpm             REAL NOT NULL,
    meter           REAL NOT NULL,
    record_id       TEXT,
    updated_at      TEXT NOT NULL,
    PRIMARY KEY (installation_id, day)
);
CREATE INDEX IF NOT EXISTS idx_attribution_asset_day ON day_attributions(asset_id, day);

CREATE TABLE IF NOT EXISTS asset_days (
    asset_id        TEXT NOT NULL,
    day             TEXT NOT NULL,
    record_id       TEXT NOT NULL,
    rpm_delta       REAL NOT NULL,
    meter_delta     REAL NOT NULL,
    closing_rpm     REAL,
    updated_at      TEXT NOT NULL,
    PRIMARY KEY (asset_id, day)
);

CREATE TABLE IF NOT EXISTS service_schedules (
    id          TEXT PRIMARY KEY,
    data        TEXT NOT NULL,
    asset_id    TEXT NOT NULL REFERENCES assets(id),
    name        TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    UNIQUE (asset_id, name)
);

CREATE TABLE IF NOT EXISTS service_records (
    id          TEXT PRIMARY KEY,
    data        TEXT NOT NULL,
    asset_id    TEXT NOT NULL,
    name        TEXT NOT NULL,
    date        TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_service_record_asset ON service_records(asset_id, date);
";

/// Persistent storage for the equipment ledger, backed by SQLStore (SQLite).
pub struct EquipmentStore {
    db: Arc<dyn SQLStore>,
}

/// Repository bound to an open write transaction.
pub type TxRepo<'a> = Repo<'a, dyn SQLTransaction + 'a>;

impl EquipmentStore {
    /// Create a new EquipmentStore and initialise the schema.
    pub fn new(db: Arc<dyn SQLStore>) -> Result<Self, ServiceError> {
        db.exec_batch(SCHEMA)
            .map_err(|e| ServiceError::Storage(format!("equipment schema init: {e}")))?;
        Ok(Self { db })
    }

    /// Repository for reads outside a transaction.
    pub fn read(&self) -> Repo<'_, dyn SQLStore> {
        Repo { db: self.db.as_ref() }
    }

    /// Run `f` inside one write transaction.
    ///
    /// Commits when `f` returns `Ok`; any error rolls back every statement
    /// `f` executed.
    pub fn write<T, F>(&self, f: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&TxRepo<'_>) -> Result<T, ServiceError>,
    {
        let tx = self.db.begin().map_err(storage)?;
        let out = {
            let repo: TxRepo<'_> = Repo { db: tx.as_ref() };
            f(&repo)?
        };
        tx.commit().map_err(storage)?;
        Ok(out)
    }
}

/// Typed access to the equipment tables over any SQL executor.
pub struct Repo<'a, E: SQLExec + ?Sized> {
    db: &'a E,
}

impl<E: SQLExec + ?Sized> Repo<'_, E> {
    // -----------------------------------------------------------------------
    // Generic record helpers
    // -----------------------------------------------------------------------

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, ServiceError> {
        self.db.query(sql, params).map_err(storage)
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, ServiceError> {
        self.db.exec(sql, params).map_err(storage)
    }

    fn get_record<T: DeserializeOwned>(
        &self,
        table: &str,
        id: &str,
        what: &str,
    ) -> Result<Option<T>, ServiceError> {
        let rows = self.query(
            &format!("SELECT data FROM {table} WHERE id = ?1"),
            &[text(id)],
        )?;
        rows.first().map(|r| from_data(r, what)).transpose()
    }

    fn count(&self, sql: &str, params: &[Value]) -> Result<usize, ServiceError> {
        Ok(self
            .query(sql, params)?
            .first()
            .and_then(|r| r.get_i64("cnt"))
            .unwrap_or(0) as usize)
    }

    fn page<T: DeserializeOwned + Serialize>(
        &self,
        table: &str,
        params: &ListParams,
        what: &str,
    ) -> Result<ListResult<T>, ServiceError> {
        let total = self.count(&format!("SELECT COUNT(*) AS cnt FROM {table}"), &[])?;
        let rows = self.query(
            &format!("SELECT data FROM {table} ORDER BY created_at, id LIMIT ?1 OFFSET ?2"),
            &[
                Value::Integer(params.page_limit() as i64),
                Value::Integer(params.offset as i64),
            ],
        )?;
        let items = rows
            .iter()
            .map(|r| from_data(r, what))
            .collect::<Result<Vec<T>, _>>()?;
        Ok(ListResult { items, total })
    }

    // -----------------------------------------------------------------------
    // Sites and assets
    // -----------------------------------------------------------------------

    pub fn insert_site(&self, site: &Site) -> Result<(), ServiceError> {
        self.exec(
            "INSERT INTO sites (id, data, name, created_at) VALUES (?1, ?2, ?3, ?4)",
            &[
                text(&site.id),
                Value::Text(to_json(site)?),
                text(&site.name),
                text(&site.created_at),
            ],
        )
        .map_err(|e| already_exists(e, "site", &site.id))?;
        Ok(())
    }

    pub fn get_site(&self, id: &str) -> Result<Site, ServiceError> {
        self.get_record("sites", id, "site")?
            .ok_or_else(|| ServiceError::NotFound(format!("site '{id}' not found")))
    }

    pub fn list_sites(&self, params: &ListParams) -> Result<ListResult<Site>, ServiceError> {
        self.page("sites", params, "site")
    }

    pub fn insert_asset(&self, asset: &Asset) -> Result<(), ServiceError> {
        self.exec(
            "INSERT INTO assets (id, data, name, kind, site_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            &[
                text(&asset.id),
                Value::Text(to_json(asset)?),
                text(&asset.name),
                text(asset.kind.as_str()),
                text(&asset.site_id),
                text(&asset.created_at),
            ],
        )
        .map_err(|e| already_exists(e, "asset", &asset.id))?;
        Ok(())
    }

    pub fn get_asset(&self, id: &str) -> Result<Asset, ServiceError> {
        self.get_record("assets", id, "asset")?
            .ok_or_else(|| ServiceError::NotFound(format!("asset '{id}' not found")))
    }

    /// Persist the asset's reading snapshot.
    pub fn update_asset(&self, asset: &Asset) -> Result<(), ServiceError> {
        let affected = self.exec(
            "UPDATE assets SET data = ?1 WHERE id = ?2",
            &[Value::Text(to_json(asset)?), text(&asset.id)],
        )?;
        if affected == 0 {
            return Err(ServiceError::NotFound(format!("asset '{}' not found", asset.id)));
        }
        Ok(())
    }

    pub fn list_assets(&self, params: &ListParams) -> Result<ListResult<Asset>, ServiceError> {
        self.page("assets", params, "asset")
    }

    // -----------------------------------------------------------------------
    // Component types
    // -----------------------------------------------------------------------

    pub fn insert_component_type(&self, ct: &ComponentType) -> Result<(), ServiceError> {
        self.exec(
            "INSERT INTO component_types \
             (id, data, name, part_number, lifetime_rpm, lifetime_meter, stock_qty, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            &[
                text(&ct.id),
                Value::Text(to_json(ct)?),
                text(&ct.name),
                text(&ct.part_number),
                Value::Real(ct.lifetime_rpm),
                Value::Real(ct.lifetime_meter),
                Value::Integer(ct.stock_qty),
                text(&ct.created_at),
            ],
        )
        .map_err(|e| already_exists(e, "component type", &ct.id))?;
        Ok(())
    }

    pub fn get_component_type(&self, id: &str) -> Result<ComponentType, ServiceError> {
        let rows = self.query(
            "SELECT data, lifetime_rpm, lifetime_meter, stock_qty \
             FROM component_types WHERE id = ?1",
            &[text(id)],
        )?;
        let row = rows
            .first()
            .ok_or_else(|| ServiceError::NotFound(format!("component type '{id}' not found")))?;
        row_to_component_type(row)
    }

    pub fn list_component_types(
        &self,
        params: &ListParams,
    ) -> Result<ListResult<ComponentType>, ServiceError> {
        let total = self.count("SELECT COUNT(*) AS cnt FROM component_types", &[])?;
        let rows = self.query(
            "SELECT data, lifetime_rpm, lifetime_meter, stock_qty FROM component_types \
             ORDER BY created_at, id LIMIT ?1 OFFSET ?2",
            &[
                Value::Integer(params.page_limit() as i64),
                Value::Integer(params.offset as i64),
            ],
        )?;
        let items = rows
            .iter()
            .map(row_to_component_type)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ListResult { items, total })
    }

    /// Move `delta` units in or out of stock.
    ///
    /// Returns `false` without touching the row when stock would go negative.
    pub fn adjust_stock(&self, type_id: &str, delta: i64) -> Result<bool, ServiceError> {
        let affected = self.exec(
            "UPDATE component_types SET stock_qty = stock_qty + ?1 \
             WHERE id = ?2 AND stock_qty + ?1 >= 0",
            &[Value::Integer(delta), text(type_id)],
        )?;
        Ok(affected > 0)
    }

    /// Roll the type's lifetime totals forward (or back, for corrections).
    pub fn add_lifetime(&self, type_id: &str, rpm: f64, meter: f64) -> Result<(), ServiceError> {
        let affected = self.exec(
            "UPDATE component_types \
             SET lifetime_rpm = MAX(lifetime_rpm + ?1, 0), lifetime_meter = MAX(lifetime_meter + ?2, 0) \
             WHERE id = ?3",
            &[Value::Real(rpm), Value::Real(meter), text(type_id)],
        )?;
        if affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "component type '{type_id}' not found"
            )));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Component instances
    // -----------------------------------------------------------------------

    pub fn insert_instance(&self, inst: &ComponentInstance) -> Result<(), ServiceError> {
        self.exec(
            "INSERT INTO component_instances \
             (id, data, type_id, serial_number, state, site_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            &[
                text(&inst.id),
                Value::Text(to_json(inst)?),
                text(&inst.type_id),
                text(&inst.serial_number),
                text(inst.state.as_str()),
                Value::opt_text(inst.site_id.as_deref()),
                text(&inst.created_at),
            ],
        )
        .map_err(|e| match e {
            ServiceError::Conflict(_) => ServiceError::Conflict(format!(
                "component instance '{}' or serial '{}' already exists",
                inst.id, inst.serial_number
            )),
            other => other,
        })?;
        Ok(())
    }

    pub fn get_instance(&self, id: &str) -> Result<ComponentInstance, ServiceError> {
        self.get_record("component_instances", id, "component instance")?
            .ok_or_else(|| ServiceError::NotFound(format!("component instance '{id}' not found")))
    }

    pub fn update_instance(&self, inst: &ComponentInstance) -> Result<(), ServiceError> {
        let affected = self.exec(
            "UPDATE component_instances SET data = ?1, state = ?2, site_id = ?3 WHERE id = ?4",
            &[
                Value::Text(to_json(inst)?),
                text(inst.state.as_str()),
                Value::opt_text(inst.site_id.as_deref()),
                text(&inst.id),
            ],
        )?;
        if affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "component instance '{}' not found",
                inst.id
            )));
        }
        Ok(())
    }

    pub fn list_instances(
        &self,
        params: &ListParams,
    ) -> Result<ListResult<ComponentInstance>, ServiceError> {
        self.page("component_instances", params, "component instance")
    }

    /// In-stock instances stored at `site_id` or not assigned to any site.
    pub fn in_stock_for_site(&self, site_id: &str) -> Result<Vec<ComponentInstance>, ServiceError> {
        let rows = self.query(
            "SELECT data FROM component_instances \
             WHERE state = ?1 AND (site_id IS NULL OR site_id = ?2) \
             ORDER BY serial_number",
            &[text(InstanceState::InStock.as_str()), text(site_id)],
        )?;
        rows.iter()
            .map(|r| from_data(r, "component instance"))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Installations
    // -----------------------------------------------------------------------

    pub fn insert_installation(&self, inst: &Installation) -> Result<(), ServiceError> {
        self.exec(
            "INSERT INTO installations \
             (id, data, instance_id, type_id, asset_id, site_id, status, fitted_date, \
              removed_date, fit_record_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            &[
                text(&inst.id),
                Value::Text(to_json(inst)?),
                Value::opt_text(inst.instance_id()),
                text(&inst.component_type_id),
                text(&inst.asset_id),
                text(&inst.site_id),
                text(inst.status.as_str()),
                day(inst.fitted_date),
                opt_day(inst.removed_date),
                Value::opt_text(inst.fit_record_id.as_deref()),
                text(&inst.created_at),
            ],
        )
        .map_err(|e| match e {
            ServiceError::Conflict(_) => ServiceError::Conflict(format!(
                "component instance '{}' already has an active installation",
                inst.instance_id().unwrap_or("-")
            )),
            other => other,
        })?;
        Ok(())
    }

    pub fn get_installation(&self, id: &str) -> Result<Installation, ServiceError> {
        self.get_record("installations", id, "installation")?
            .ok_or_else(|| ServiceError::NotFound(format!("installation '{id}' not found")))
    }

    pub fn update_installation(&self, inst: &Installation) -> Result<(), ServiceError> {
        let affected = self.exec(
            "UPDATE installations SET data = ?1, status = ?2, removed_date = ?3 WHERE id = ?4",
            &[
                Value::Text(to_json(inst)?),
                text(inst.status.as_str()),
                opt_day(inst.removed_date),
                text(&inst.id),
            ],
        )?;
        if affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "installation '{}' not found",
                inst.id
            )));
        }
        Ok(())
    }

    /// Hard-delete an installation together with its log trail.
    pub fn delete_installation(&self, id: &str) -> Result<(), ServiceError> {
        self.exec(
            "DELETE FROM usage_log WHERE installation_id = ?1",
            &[text(id)],
        )?;
        let affected = self.exec("DELETE FROM installations WHERE id = ?1", &[text(id)])?;
        if affected == 0 {
            return Err(ServiceError::NotFound(format!("installation '{id}' not found")));
        }
        Ok(())
    }

    pub fn active_for_instance(
        &self,
        instance_id: &str,
    ) -> Result<Option<Installation>, ServiceError> {
        let rows = self.query(
            "SELECT data FROM installations WHERE instance_id = ?1 AND status = 'ACTIVE'",
            &[text(instance_id)],
        )?;
        rows.first().map(|r| from_data(r, "installation")).transpose()
    }

    pub fn active_for_asset(&self, asset_id: &str) -> Result<Vec<Installation>, ServiceError> {
        let rows = self.query(
            "SELECT data FROM installations WHERE asset_id = ?1 AND status = 'ACTIVE' \
             ORDER BY fitted_date, rowid",
            &[text(asset_id)],
        )?;
        rows.iter().map(|r| from_data(r, "installation")).collect()
    }

    /// Installations on the asset that were running on `on` but have been
    /// removed since.
    pub fn completed_spanning(
        &self,
        asset_id: &str,
        on: NaiveDate,
    ) -> Result<Vec<Installation>, ServiceError> {
        let rows = self.query(
            "SELECT data FROM installations \
             WHERE asset_id = ?1 AND status = 'COMPLETED' \
               AND fitted_date <= ?2 AND removed_date > ?2 \
             ORDER BY fitted_date, rowid",
            &[text(asset_id), day(on)],
        )?;
        rows.iter().map(|r| from_data(r, "installation")).collect()
    }

    /// Most recently closed installation of an instance.
    pub fn last_completed_for_instance(
        &self,
        instance_id: &str,
    ) -> Result<Option<Installation>, ServiceError> {
        let rows = self.query(
            "SELECT data FROM installations WHERE instance_id = ?1 AND status = 'COMPLETED' \
             ORDER BY removed_date DESC, rowid DESC LIMIT 1",
            &[text(instance_id)],
        )?;
        rows.first().map(|r| from_data(r, "installation")).transpose()
    }

    /// Installation of `instance_id` created by operational record `record_id`.
    pub fn fit_by_record(
        &self,
        instance_id: &str,
        record_id: &str,
    ) -> Result<Option<Installation>, ServiceError> {
        let rows = self.query(
            "SELECT data FROM installations WHERE instance_id = ?1 AND fit_record_id = ?2 \
             ORDER BY rowid DESC LIMIT 1",
            &[text(instance_id), text(record_id)],
        )?;
        rows.first().map(|r| from_data(r, "installation")).transpose()
    }

    // -----------------------------------------------------------------------
    // Usage log
    // -----------------------------------------------------------------------

    pub fn append_log(&self, entry: &UsageLogEntry) -> Result<(), ServiceError> {
        self.exec(
            "INSERT INTO usage_log \
             (id, data, installation_id, asset_id, action, date, record_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            &[
                text(&entry.id),
                Value::Text(to_json(entry)?),
                Value::opt_text(entry.installation_id.as_deref()),
                text(&entry.asset_id),
                text(entry.action.as_str()),
                day(entry.date),
                Value::opt_text(entry.record_id.as_deref()),
                text(&entry.created_at),
            ],
        )?;
        Ok(())
    }

    /// Log entries of one installation in append order.
    pub fn log_for_installation(
        &self,
        installation_id: &str,
    ) -> Result<Vec<UsageLogEntry>, ServiceError> {
        let rows = self.query(
            "SELECT data FROM usage_log WHERE installation_id = ?1 ORDER BY rowid",
            &[text(installation_id)],
        )?;
        rows.iter().map(|r| from_data(r, "usage log entry")).collect()
    }

    // -----------------------------------------------------------------------
    // Day attribution
    // -----------------------------------------------------------------------

    pub fn get_attribution(
        &self,
        installation_id: &str,
        on: NaiveDate,
    ) -> Result<Option<DayAttribution>, ServiceError> {
        let rows = self.query(
            "SELECT installation_id, asset_id, day, rpm, meter, record_id \
             FROM day_attributions WHERE installation_id = ?1 AND day = ?2",
            &[text(installation_id), day(on)],
        )?;
        rows.first().map(row_to_attribution).transpose()
    }

    /// Every installation credited for one asset-day.
    pub fn attributions_for_day(
        &self,
        asset_id: &str,
        on: NaiveDate,
    ) -> Result<Vec<DayAttribution>, ServiceError> {
        let rows = self.query(
            "SELECT installation_id, asset_id, day, rpm, meter, record_id \
             FROM day_attributions WHERE asset_id = ?1 AND day = ?2 ORDER BY rowid",
            &[text(asset_id), day(on)],
        )?;
        rows.iter().map(row_to_attribution).collect()
    }

    pub fn count_attributions(&self, installation_id: &str) -> Result<usize, ServiceError> {
        self.count(
            "SELECT COUNT(*) AS cnt FROM day_attributions WHERE installation_id = ?1",
            &[text(installation_id)],
        )
    }

    pub fn put_attribution(&self, attr: &DayAttribution) -> Result<(), ServiceError> {
        self.exec(
            "INSERT INTO day_attributions \
             (installation_id, asset_id, day, rpm, meter, record_id, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(installation_id, day) DO UPDATE SET \
             rpm = excluded.rpm, meter = excluded.meter, \
             record_id = excluded.record_id, updated_at = excluded.updated_at",
            &[
                text(&attr.installation_id),
                text(&attr.asset_id),
                day(attr.day),
                Value::Real(attr.rpm),
                Value::Real(attr.meter),
                Value::opt_text(attr.record_id.as_deref()),
                Value::Text(fleetops_core::now_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn delete_attributions_for_day(
        &self,
        asset_id: &str,
        on: NaiveDate,
    ) -> Result<u64, ServiceError> {
        self.exec(
            "DELETE FROM day_attributions WHERE asset_id = ?1 AND day = ?2",
            &[text(asset_id), day(on)],
        )
    }

    pub fn get_asset_day(
        &self,
        asset_id: &str,
        on: NaiveDate,
    ) -> Result<Option<AssetDay>, ServiceError> {
        let rows = self.query(
            "SELECT asset_id, day, record_id, rpm_delta, meter_delta, closing_rpm \
             FROM asset_days WHERE asset_id = ?1 AND day = ?2",
            &[text(asset_id), day(on)],
        )?;
        rows.first()
            .map(|r| {
                Ok(AssetDay {
                    asset_id: req_str(r, "asset_id")?.to_string(),
                    day: req_day(r, "day")?,
                    record_id: req_str(r, "record_id")?.to_string(),
                    rpm_delta: r.get_number("rpm_delta").unwrap_or(0.0),
                    meter_delta: r.get_number("meter_delta").unwrap_or(0.0),
                    closing_rpm: r.get_number("closing_rpm"),
                })
            })
            .transpose()
    }

    pub fn put_asset_day(&self, ad: &AssetDay) -> Result<(), ServiceError> {
        self.exec(
            "INSERT INTO asset_days \
             (asset_id, day, record_id, rpm_delta, meter_delta, closing_rpm, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(asset_id, day) DO UPDATE SET \
             record_id = excluded.record_id, rpm_delta = excluded.rpm_delta, \
             meter_delta = excluded.meter_delta, closing_rpm = excluded.closing_rpm, \
             updated_at = excluded.updated_at",
            &[
                text(&ad.asset_id),
                day(ad.day),
                text(&ad.record_id),
                Value::Real(ad.rpm_delta),
                Value::Real(ad.meter_delta),
                ad.closing_rpm.map(Value::Real).unwrap_or(Value::Null),
                Value::Text(fleetops_core::now_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Latest recorded day that carries a closing reading.
    pub fn latest_reading(&self, asset_id: &str) -> Result<Option<(NaiveDate, f64)>, ServiceError> {
        let rows = self.query(
            "SELECT day, closing_rpm FROM asset_days \
             WHERE asset_id = ?1 AND closing_rpm IS NOT NULL \
             ORDER BY day DESC LIMIT 1",
            &[text(asset_id)],
        )?;
        rows.first()
            .map(|r| {
                let closing = r
                    .get_number("closing_rpm")
                    .ok_or_else(|| ServiceError::Storage("missing closing_rpm column".into()))?;
                Ok((req_day(r, "day")?, closing))
            })
            .transpose()
    }

    pub fn delete_asset_day(&self, asset_id: &str, on: NaiveDate) -> Result<u64, ServiceError> {
        self.exec(
            "DELETE FROM asset_days WHERE asset_id = ?1 AND day = ?2",
            &[text(asset_id), day(on)],
        )
    }

    // -----------------------------------------------------------------------
    // Service schedules
    // -----------------------------------------------------------------------

    pub fn get_schedule(
        &self,
        asset_id: &str,
        name: &str,
    ) -> Result<Option<ServiceScheduleConfig>, ServiceError> {
        let rows = self.query(
            "SELECT data FROM service_schedules WHERE asset_id = ?1 AND name = ?2",
            &[text(asset_id), text(name)],
        )?;
        rows.first().map(|r| from_data(r, "service schedule")).transpose()
    }

    pub fn list_schedules(&self, asset_id: &str) -> Result<Vec<ServiceScheduleConfig>, ServiceError> {
        let rows = self.query(
            "SELECT data FROM service_schedules WHERE asset_id = ?1 ORDER BY name",
            &[text(asset_id)],
        )?;
        rows.iter().map(|r| from_data(r, "service schedule")).collect()
    }

    /// Insert or replace the schedule keyed by (asset, name).
    pub fn put_schedule(&self, cfg: &ServiceScheduleConfig) -> Result<(), ServiceError> {
        self.exec(
            "INSERT INTO service_schedules (id, data, asset_id, name, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(asset_id, name) DO UPDATE SET \
             data = excluded.data, updated_at = excluded.updated_at",
            &[
                text(&cfg.id),
                Value::Text(to_json(cfg)?),
                text(&cfg.asset_id),
                text(&cfg.name),
                text(&cfg.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn delete_schedule(&self, asset_id: &str, name: &str) -> Result<u64, ServiceError> {
        self.exec(
            "DELETE FROM service_schedules WHERE asset_id = ?1 AND name = ?2",
            &[text(asset_id), text(name)],
        )
    }

    pub fn insert_service_record(&self, rec: &ServiceRecord) -> Result<(), ServiceError> {
        self.exec(
            "INSERT INTO service_records (id, data, asset_id, name, date, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            &[
                text(&rec.id),
                Value::Text(to_json(rec)?),
                text(&rec.asset_id),
                text(&rec.name),
                day(rec.date),
                text(&rec.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn list_service_records(&self, asset_id: &str) -> Result<Vec<ServiceRecord>, ServiceError> {
        let rows = self.query(
            "SELECT data FROM service_records WHERE asset_id = ?1 ORDER BY date DESC, rowid DESC",
            &[text(asset_id)],
        )?;
        rows.iter().map(|r| from_data(r, "service record")).collect()
    }

    // -----------------------------------------------------------------------
    // Reporting
    // -----------------------------------------------------------------------

    /// Installations joined with their type, asset and site names.
    pub fn installation_rows(
        &self,
        filter: &ReportFilter,
    ) -> Result<Vec<InstallationReportRow>, ServiceError> {
        let mut where_clauses: Vec<String> = Vec::new();
        let mut params: Vec<Value> = Vec::new();
        let mut idx = 1;

        if let Some(ref a) = filter.asset_id {
            where_clauses.push(format!("i.asset_id = ?{idx}"));
            params.push(text(a));
            idx += 1;
        }
        if let Some(ref s) = filter.site_id {
            where_clauses.push(format!("i.site_id = ?{idx}"));
            params.push(text(s));
            idx += 1;
        }
        if let Some(status) = filter.status {
            where_clauses.push(format!("i.status = ?{idx}"));
            params.push(text(status.as_str()));
        }

        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", where_clauses.join(" AND "))
        };

        let sql = format!(
            "SELECT i.data AS data, i.status AS status, t.name AS tool_name, \
                    t.part_number AS part_number, a.name AS machine, a.kind AS kind, \
                    s.name AS site \
             FROM installations i \
             JOIN component_types t ON t.id = i.type_id \
             JOIN assets a ON a.id = i.asset_id \
             JOIN sites s ON s.id = i.site_id \
             {where_sql} \
             ORDER BY i.fitted_date, i.rowid"
        );

        let rows = self.query(&sql, &params)?;
        rows.iter()
            .map(|r| {
                let inst: Installation = from_data(r, "installation")?;
                Ok(InstallationReportRow {
                    installation_id: inst.id,
                    tool_name: req_str(r, "tool_name")?.to_string(),
                    part_number: req_str(r, "part_number")?.to_string(),
                    rpm_source: req_enum(r, "kind", AssetKind::from_str)?,
                    machine: req_str(r, "machine")?.to_string(),
                    site: req_str(r, "site")?.to_string(),
                    fitted_date: inst.fitted_date,
                    fitted_rpm: inst.fitted_rpm,
                    removed_date: inst.removed_date,
                    removed_rpm: inst.removed_rpm,
                    accumulated_meter: inst.current_accumulated_meter,
                    status: req_enum(r, "status", InstallationStatus::from_str)?,
                })
            })
            .collect()
    }

    /// Per-asset or per-site aggregate over all installations.
    pub fn usage_summary(&self, by: SummaryKey) -> Result<Vec<UsageSummary>, ServiceError> {
        let (table, column) = match by {
            SummaryKey::Asset => ("assets", "asset_id"),
            SummaryKey::Site => ("sites", "site_id"),
        };
        let sql = format!(
            "SELECT g.id AS id, g.name AS name, COUNT(i.id) AS installations, \
                    COALESCE(SUM(CASE WHEN i.status = 'ACTIVE' THEN 1 ELSE 0 END), 0) AS active, \
                    COALESCE(SUM(json_extract(i.data, '$.currentAccumulatedMeter') \
                               - json_extract(i.data, '$.initialAccumulatedMeter')), 0) AS accrued_meter, \
                    COALESCE(SUM(json_extract(i.data, '$.accumulatedRpm')), 0) AS accrued_rpm \
             FROM {table} g LEFT JOIN installations i ON i.{column} = g.id \
             GROUP BY g.id, g.name \
             ORDER BY g.name, g.id"
        );
        let rows = self.query(&sql, &[])?;
        rows.iter()
            .map(|r| {
                Ok(UsageSummary {
                    id: req_str(r, "id")?.to_string(),
                    name: req_str(r, "name")?.to_string(),
                    installations: r.get_i64("installations").unwrap_or(0) as u64,
                    active: r.get_i64("active").unwrap_or(0) as u64,
                    accrued_meter: r.get_number("accrued_meter").unwrap_or(0.0),
                    accrued_rpm: r.get_number("accrued_rpm").unwrap_or(0.0),
                })
            })
            .collect()
    }
}

/// Grouping for [`Repo::usage_summary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryKey {
    Asset,
    Site,
}

// ---------------------------------------------------------------------------
// Row and value helpers
// ---------------------------------------------------------------------------

/// Map a storage failure, turning UNIQUE violations into conflicts.
fn storage(e: SQLError) -> ServiceError {
    if e.is_unique_violation() {
        ServiceError::Conflict(e.to_string())
    } else {
        ServiceError::Storage(e.to_string())
    }
}

fn already_exists(e: ServiceError, what: &str, id: &str) -> ServiceError {
    match e {
        ServiceError::Conflict(_) => ServiceError::Conflict(format!("{what} '{id}' already exists")),
        other => other,
    }
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn day(d: NaiveDate) -> Value {
    Value::Text(d.to_string())
}

fn opt_day(d: Option<NaiveDate>) -> Value {
    d.map(day).unwrap_or(Value::Null)
}

fn to_json<T: Serialize>(v: &T) -> Result<String, ServiceError> {
    serde_json::to_string(v).map_err(|e| ServiceError::Internal(e.to_string()))
}

/// Deserialize a record from a row's `data` JSON column.
fn from_data<T: DeserializeOwned>(row: &Row, what: &str) -> Result<T, ServiceError> {
    let json = req_str(row, "data")?;
    serde_json::from_str(json).map_err(|e| ServiceError::Storage(format!("bad {what} json: {e}")))
}

fn req_str<'r>(row: &'r Row, col: &str) -> Result<&'r str, ServiceError> {
    row.get_str(col)
        .ok_or_else(|| ServiceError::Storage(format!("missing {col} column")))
}

fn req_enum<T>(row: &Row, col: &str, parse: fn(&str) -> Option<T>) -> Result<T, ServiceError> {
    let raw = req_str(row, col)?;
    parse(raw).ok_or_else(|| ServiceError::Storage(format!("unknown {col} '{raw}'")))
}

fn req_day(row: &Row, col: &str) -> Result<NaiveDate, ServiceError> {
    req_str(row, col)?
        .parse()
        .map_err(|e| ServiceError::Storage(format!("bad {col} date: {e}")))
}

fn row_to_component_type(row: &Row) -> Result<ComponentType, ServiceError> {
    let mut ct: ComponentType = from_data(row, "component type")?;
    ct.lifetime_rpm = row.get_number("lifetime_rpm").unwrap_or(0.0);
    ct.lifetime_meter = row.get_number("lifetime_meter").unwrap_or(0.0);
    ct.stock_qty = row.get_i64("stock_qty").unwrap_or(0);
    Ok(ct)
}

fn row_to_attribution(row: &Row) -> Result<DayAttribution, ServiceError> {
    Ok(DayAttribution {
        installation_id: req_str(row, "installation_id")?.to_string(),
        asset_id: req_str(row, "asset_id")?.to_string(),
        day: req_day(row, "day")?,
        rpm: row.get_number("rpm").unwrap_or(0.0),
        meter: row.get_number("meter").unwrap_or(0.0),
        record_id: row.get_str("record_id").map(str::to_string),
    })
}
