//! SQLite Lease Store
//!
//! Durable lease storage for a lease server or for participants sharing
//! a database file. Updates are conditional on the stored version.

use std::num::TryFromIntError;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tokio::sync::Mutex;

use super::{LeaseRecord, LeaseStore};
use crate::error::{Error, Result};

const SELECT_LEASE: &str = r#"
    SELECT namespace, name, holder_identity, lease_duration_seconds,
           acquire_time_us, renew_time_us, lease_transitions, version
    FROM leases WHERE namespace = ?1 AND name = ?2
"#;

/// Lease store backed by SQLite
pub struct SqliteLeaseStore {
    /// Database connection
    conn: Mutex<Connection>,
}

impl SqliteLeaseStore {
    /// Create or open the lease database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::with_connection(Connection::open(path)?)
    }

    /// Open a private in-memory database
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS leases (
                namespace TEXT NOT NULL,
                name TEXT NOT NULL,
                holder_identity TEXT,
                lease_duration_seconds INTEGER NOT NULL,
                acquire_time_us INTEGER,
                renew_time_us INTEGER,
                lease_transitions INTEGER NOT NULL DEFAULT 0,
                version INTEGER NOT NULL,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (namespace, name)
            );
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn select(conn: &Connection, namespace: &str, name: &str) -> Result<Option<LeaseRecord>> {
        let record = conn
            .query_row(SELECT_LEASE, params![namespace, name], row_to_record)
            .optional()?;
        Ok(record)
    }
}

fn to_micros(time: Option<DateTime<Utc>>) -> Option<i64> {
    time.map(|t| t.timestamp_micros())
}

fn from_micros(micros: Option<i64>) -> Option<DateTime<Utc>> {
    micros.and_then(DateTime::<Utc>::from_timestamp_micros)
}

/// Read an INTEGER column, rejecting values that don't fit `T`
fn get_int<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: TryFrom<i64, Error = TryFromIntError>,
{
    let value: i64 = row.get(idx)?;
    T::try_from(value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<LeaseRecord> {
    Ok(LeaseRecord {
        namespace: row.get(0)?,
        name: row.get(1)?,
        holder_identity: row.get(2)?,
        lease_duration_seconds: get_int(row, 3)?,
        acquire_time: from_micros(row.get(4)?),
        renew_time: from_micros(row.get(5)?),
        lease_transitions: get_int(row, 6)?,
        version: Some(get_int(row, 7)?),
    })
}

#[async_trait]
impl LeaseStore for SqliteLeaseStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<LeaseRecord> {
        let conn = self.conn.lock().await;
        Self::select(&conn, namespace, name)?.ok_or_else(|| Error::not_found(namespace, name))
    }

    async fn create(&self, record: &LeaseRecord) -> Result<LeaseRecord> {
        let conn = self.conn.lock().await;
        let inserted = conn.execute(
            r#"
            INSERT INTO leases (namespace, name, holder_identity, lease_duration_seconds,
                                acquire_time_us, renew_time_us, lease_transitions, version)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)
            "#,
            params![
                record.namespace,
                record.name,
                record.holder_identity,
                i64::from(record.lease_duration_seconds),
                to_micros(record.acquire_time),
                to_micros(record.renew_time),
                i64::from(record.lease_transitions),
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(Error::Conflict(format!("lease {} already exists", record.key())));
            }
            Err(e) => return Err(e.into()),
        }

        Self::select(&conn, &record.namespace, &record.name)?
            .ok_or_else(|| Error::not_found(&record.namespace, &record.name))
    }

    async fn update(&self, record: &LeaseRecord) -> Result<LeaseRecord> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            r#"
            UPDATE leases SET
                holder_identity = ?3,
                lease_duration_seconds = ?4,
                acquire_time_us = ?5,
                renew_time_us = ?6,
                lease_transitions = ?7,
                version = version + 1,
                updated_at = CURRENT_TIMESTAMP
            WHERE namespace = ?1 AND name = ?2 AND (?8 IS NULL OR version = ?8)
            "#,
            params![
                record.namespace,
                record.name,
                record.holder_identity,
                i64::from(record.lease_duration_seconds),
                to_micros(record.acquire_time),
                to_micros(record.renew_time),
                i64::from(record.lease_transitions),
                // Out-of-range versions never match a stored row
                record.version.map(|v| i64::try_from(v).unwrap_or(-1)),
            ],
        )?;

        let current = Self::select(&conn, &record.namespace, &record.name)?
            .ok_or_else(|| Error::not_found(&record.namespace, &record.name))?;

        if changed == 0 {
            return Err(Error::Conflict(format!(
                "lease {} changed (expected version {:?}, found {:?})",
                record.key(),
                record.version,
                current.version
            )));
        }

        Ok(current)
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn lease(holder: &str) -> LeaseRecord {
        let now = Utc::now();
        LeaseRecord {
            holder_identity: Some(holder.to_string()),
            lease_duration_seconds: 15,
            acquire_time: Some(now),
            renew_time: Some(now),
            ..LeaseRecord::new("default", "leader")
        }
    }

    #[tokio::test]
    async fn test_sqlite_store_basic() {
        let dir = tempdir().unwrap();
        let store = SqliteLeaseStore::open(&dir.path().join("leases.db")).unwrap();

        assert!(store.get("default", "leader").await.unwrap_err().is_not_found());

        let created = store.create(&lease("node-1")).await.unwrap();
        assert_eq!(created.version, Some(1));
        assert!(created.is_held_by("node-1"));

        let fetched = store.get("default", "leader").await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_timestamps_keep_microseconds() {
        let store = SqliteLeaseStore::in_memory().unwrap();
        let mut record = lease("node-1");
        let stamp = DateTime::<Utc>::from_timestamp_micros(1_700_000_000_123_456).unwrap();
        record.renew_time = Some(stamp);

        let created = store.create(&record).await.unwrap();
        assert_eq!(created.renew_time, Some(stamp));
    }

    #[tokio::test]
    async fn test_create_conflict() {
        let store = SqliteLeaseStore::in_memory().unwrap();
        store.create(&lease("node-1")).await.unwrap();
        assert!(store.create(&lease("node-2")).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_update_compare_and_swap() {
        let store = SqliteLeaseStore::in_memory().unwrap();
        let created = store.create(&lease("node-1")).await.unwrap();

        let mut renewed = created.clone();
        renewed.renew_time = Some(Utc::now() + Duration::seconds(2));
        let updated = store.update(&renewed).await.unwrap();
        assert_eq!(updated.version, Some(2));
        assert_eq!(updated.acquire_time, created.acquire_time);

        // Stale version from the first read is rejected
        let mut stale = created.clone();
        stale.holder_identity = Some("node-2".into());
        assert!(store.update(&stale).await.unwrap_err().is_conflict());
        assert!(store.get("default", "leader").await.unwrap().is_held_by("node-1"));
    }

    #[tokio::test]
    async fn test_update_missing() {
        let store = SqliteLeaseStore::in_memory().unwrap();
        assert!(store.update(&lease("node-1")).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_out_of_range_columns_are_store_errors() {
        let store = SqliteLeaseStore::in_memory().unwrap();
        store.create(&lease("node-1")).await.unwrap();
        store
            .conn
            .lock()
            .await
            .execute(
                "UPDATE leases SET lease_duration_seconds = -1 WHERE name = 'leader'",
                [],
            )
            .unwrap();

        let err = store.get("default", "leader").await.unwrap_err();
        assert!(matches!(err, Error::Store { status: None, .. }));

        store
            .conn
            .lock()
            .await
            .execute(
                "UPDATE leases SET lease_duration_seconds = 15, lease_transitions = 4294967296 WHERE name = 'leader'",
                [],
            )
            .unwrap();
        let err = store.get("default", "leader").await.unwrap_err();
        assert!(matches!(err, Error::Store { status: None, .. }));
    }

    #[tokio::test]
    async fn test_reopen_keeps_leases() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("leases.db");

        {
            let store = SqliteLeaseStore::open(&path).unwrap();
            store.create(&lease("node-1")).await.unwrap();
        }

        let store = SqliteLeaseStore::open(&path).unwrap();
        assert!(store.get("default", "leader").await.unwrap().is_held_by("node-1"));
    }
}
