use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use crate::error::SQLError;
use crate::traits::{Row, SQLExec, SQLStore, SQLTransaction, Value};

/// SqliteStore is a SQLStore implementation backed by rusqlite (bundled SQLite).
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self, SQLError> {
        let conn = Connection::open(path)
            .map_err(|e| SQLError::Connection(e.to_string()))?;

        // Enable WAL mode for better concurrent read performance.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| SQLError::Connection(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self, SQLError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SQLError::Connection(e.to_string()))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| SQLError::Connection(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SQLError> {
        self.conn
            .lock()
            .map_err(|e| SQLError::Connection(e.to_string()))
    }
}

impl SQLExec for SqliteStore {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
        query_on(&*self.lock()?, sql, params)
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
        exec_on(&*self.lock()?, sql, params)
    }

    fn exec_batch(&self, sql: &str) -> Result<(), SQLError> {
        self.lock()?
            .execute_batch(sql)
            .map_err(|e| SQLError::Execution(e.to_string()))
    }
}

impl SQLStore for SqliteStore {
    fn begin(&self) -> Result<Box<dyn SQLTransaction + '_>, SQLError> {
        let conn = self.lock()?;
        // IMMEDIATE takes the write lock up front so two writers never
        // interleave read-then-write on the same rows.
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| SQLError::Transaction(e.to_string()))?;
        Ok(Box::new(SqliteTransaction { conn, finished: false }))
    }
}

/// An open `BEGIN IMMEDIATE` transaction. Rolls back on drop unless committed.
pub struct SqliteTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl SQLExec for SqliteTransaction<'_> {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
        query_on(&self.conn, sql, params)
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
        exec_on(&self.conn, sql, params)
    }

    fn exec_batch(&self, sql: &str) -> Result<(), SQLError> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| SQLError::Execution(e.to_string()))
    }
}

impl SQLTransaction for SqliteTransaction<'_> {
    fn commit(mut self: Box<Self>) -> Result<(), SQLError> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| SQLError::Transaction(e.to_string()))?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}

/// Convert our Value enum to rusqlite's ToSql.
fn bind_params(params: &[Value]) -> Vec<Box<dyn rusqlite::types::ToSql + '_>> {
    params
        .iter()
        .map(|v| -> Box<dyn rusqlite::types::ToSql + '_> {
            match v {
                Value::Null => Box::new(rusqlite::types::Null),
                Value::Integer(i) => Box::new(*i),
                Value::Real(f) => Box::new(*f),
                Value::Text(s) => Box::new(s.as_str()),
                Value::Blob(b) => Box::new(b.as_slice()),
            }
        })
        .collect()
}

fn query_on(conn: &Connection, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
    let bound = bind_params(params);
    let param_refs: Vec<&dyn rusqlite::types::ToSql> =
        bound.iter().map(|b| b.as_ref()).collect();

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| SQLError::Query(e.to_string()))?;

    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            let mut columns = Vec::new();
            for (i, name) in column_names.iter().enumerate() {
                let val = row_value_at(row, i);
                columns.push((name.clone(), val));
            }
            Ok(Row { columns })
        })
        .map_err(|e| SQLError::Query(e.to_string()))?;

    let mut result = Vec::new();
    for row in rows {
        result.push(row.map_err(|e| SQLError::Query(e.to_string()))?);
    }
    Ok(result)
}

fn exec_on(conn: &Connection, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
    let bound = bind_params(params);
    let param_refs: Vec<&dyn rusqlite::types::ToSql> =
        bound.iter().map(|b| b.as_ref()).collect();

    let affected = conn
        .execute(sql, param_refs.as_slice())
        .map_err(|e| SQLError::Execution(e.to_string()))?;

    Ok(affected as u64)
}

/// Extract a Value from a rusqlite row at a given column index.
fn row_value_at(row: &rusqlite::Row, idx: usize) -> Value {
    // Try integer first, then real, then text, then blob, then null.
    if let Ok(i) = row.get::<_, i64>(idx) {
        return Value::Integer(i);
    }
    if let Ok(f) = row.get::<_, f64>(idx) {
        return Value::Real(f);
    }
    if let Ok(s) = row.get::<_, String>(idx) {
        return Value::Text(s);
    }
    if let Ok(b) = row.get::<_, Vec<u8>>(idx) {
        return Value::Blob(b);
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_table() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .exec_batch(
                "CREATE TABLE counters (id TEXT PRIMARY KEY, total REAL NOT NULL);
                 CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT);",
            )
            .unwrap();
        store
            .exec(
                "INSERT INTO counters (id, total) VALUES (?1, ?2)",
                &[Value::Text("c1".into()), Value::Real(10.0)],
            )
            .unwrap();
        store
    }

    fn total(store: &SqliteStore) -> f64 {
        store
            .query("SELECT total FROM counters WHERE id = 'c1'", &[])
            .unwrap()[0]
            .get_number("total")
            .unwrap()
    }

    #[test]
    fn query_returns_typed_columns() {
        let store = store_with_table();
        store
            .exec(
                "INSERT INTO notes (id, body) VALUES (?1, ?2)",
                &[Value::Integer(7), Value::opt_text(None)],
            )
            .unwrap();
        let rows = store.query("SELECT id, body FROM notes", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_i64("id"), Some(7));
        assert_eq!(rows[0].get("body"), Some(&Value::Null));
        assert_eq!(total(&store), 10.0);
    }

    #[test]
    fn committed_transaction_is_visible() {
        let store = store_with_table();
        let tx = store.begin().unwrap();
        tx.exec("UPDATE counters SET total = total + ?1 WHERE id = 'c1'", &[Value::Real(5.5)])
            .unwrap();
        let inside = tx.query("SELECT total FROM counters", &[]).unwrap();
        assert_eq!(inside[0].get_number("total"), Some(15.5));
        tx.commit().unwrap();

        assert_eq!(total(&store), 15.5);
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let store = store_with_table();
        {
            let tx = store.begin().unwrap();
            tx.exec("UPDATE counters SET total = 99 WHERE id = 'c1'", &[]).unwrap();
            tx.exec("INSERT INTO notes (id, body) VALUES (1, 'x')", &[]).unwrap();
        }
        assert_eq!(total(&store), 10.0);
        assert!(store.query("SELECT * FROM notes", &[]).unwrap().is_empty());

        // The connection is usable again after the rollback.
        let tx = store.begin().unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn unique_violation_is_detected() {
        let store = store_with_table();
        let err = store
            .exec(
                "INSERT INTO counters (id, total) VALUES ('c1', 0)",
                &[],
            )
            .unwrap_err();
        assert!(err.is_unique_violation());
        assert!(!SQLError::Connection("UNIQUE constraint".into()).is_unique_violation());
    }

    #[test]
    fn file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.sqlite");
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .exec_batch("CREATE TABLE t (id TEXT PRIMARY KEY)")
                .unwrap();
            store.exec("INSERT INTO t (id) VALUES ('a')", &[]).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        let rows = store.query("SELECT id FROM t", &[]).unwrap();
        assert_eq!(rows[0].get_str("id"), Some("a"));
    }
}
