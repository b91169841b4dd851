//! Persisted job status lookup.

use crate::config;
use crate::error::{Error, Result};
use crate::events::{EventSink, LogCategory};
use crate::status::DbStatus;
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, OpenFlags};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// SQLite's default host-parameter limit is generous, but older builds stop at 999.
const PAIRS_PER_QUERY: usize = 400;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub job_no: String,
    pub request_no: String,
}

impl JobKey {
    pub fn new(job_no: impl Into<String>, request_no: impl Into<String>) -> Self {
        Self {
            job_no: job_no.into().trim().to_string(),
            request_no: request_no.into().trim().to_string(),
        }
    }
}

/// Read side of the job-card table. A key missing from the returned map
/// has no row; a present key with `None` has a null status.
pub trait StatusStore: Send + Sync {
    fn fetch_statuses(&self, keys: &[JobKey]) -> Result<HashMap<JobKey, Option<String>>>;
}

impl<T: StatusStore + ?Sized> StatusStore for Box<T> {
    fn fetch_statuses(&self, keys: &[JobKey]) -> Result<HashMap<JobKey, Option<String>>> {
        (**self).fetch_statuses(keys)
    }
}

pub struct SqliteStatusStore {
    path: PathBuf,
    table: String,
    conn: Mutex<Option<Connection>>,
}

impl SqliteStatusStore {
    pub fn new(cfg: &config::Database) -> Result<Self> {
        let table = cfg.table.trim();
        let valid = !table.is_empty()
            && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !table.starts_with(|c: char| c.is_ascii_digit());
        if !valid {
            return Err(Error::Config(format!(
                "database.table is not a plain identifier: {table:?}"
            )));
        }
        Ok(Self {
            path: PathBuf::from(&cfg.path),
            table: table.to_string(),
            conn: Mutex::new(None),
        })
    }

    fn query(&self, conn: &Connection, keys: &[JobKey]) -> Result<HashMap<JobKey, Option<String>>> {
        let mut out = HashMap::new();
        for chunk in keys.chunks(PAIRS_PER_QUERY) {
            let clause = vec!["(job_no = ? AND request_no = ?)"; chunk.len()].join(" OR ");
            let sql = format!(
                "SELECT job_no, request_no, status FROM {} WHERE {}",
                self.table, clause
            );
            let mut stmt = conn.prepare(&sql)?;
            let params = chunk
                .iter()
                .flat_map(|k| [k.job_no.as_str(), k.request_no.as_str()]);
            let mut rows = stmt.query(params_from_iter(params))?;
            while let Some(row) = rows.next()? {
                let job_no = text_of(row.get_ref(0)?).unwrap_or_default();
                let request_no = text_of(row.get_ref(1)?).unwrap_or_default();
                let status = text_of(row.get_ref(2)?);
                out.insert(JobKey::new(job_no, request_no), status);
            }
        }
        Ok(out)
    }
}

impl StatusStore for SqliteStatusStore {
    fn fetch_statuses(&self, keys: &[JobKey]) -> Result<HashMap<JobKey, Option<String>>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let mut guard = self
            .conn
            .lock()
            .map_err(|e| Error::Database(format!("connection lock poisoned: {e}")))?;
        if guard.is_none() {
            debug!("opening status database {}", self.path.display());
            let conn = Connection::open_with_flags(
                &self.path,
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            *guard = Some(conn);
        }
        let Some(conn) = guard.as_ref() else {
            return Err(Error::Database("no connection".into()));
        };
        let result = self.query(conn, keys);
        if result.is_err() {
            // Reconnect on the next attempt.
            *guard = None;
        }
        result
    }
}

fn text_of(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).trim().to_string()),
    }
}

/// Looks up every key with bounded retry. Never fails: an unreachable
/// store yields [`DbStatus::DbError`] for every key.
pub fn lookup_statuses(
    store: &dyn StatusStore,
    keys: &[JobKey],
    cfg: &config::Database,
    events: &EventSink,
) -> Vec<DbStatus> {
    let attempts = cfg.max_attempts.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        match store.fetch_statuses(keys) {
            Ok(found) => {
                return keys
                    .iter()
                    .map(|k| match found.get(k) {
                        Some(status) => DbStatus::from_text(status.as_deref()),
                        None => DbStatus::NotFound,
                    })
                    .collect();
            }
            Err(err) => {
                events.warn(
                    LogCategory::Status,
                    format!("Status lookup attempt {attempt}/{attempts} failed: {err}"),
                );
                last_err = Some(err);
                if attempt < attempts {
                    std::thread::sleep(Duration::from_millis(cfg.retry_backoff_ms));
                }
            }
        }
    }
    if let Some(err) = last_err {
        events.warn(
            LogCategory::Status,
            format!("Database unavailable, showing DB Error for {} jobs: {err}", keys.len()),
        );
    }
    vec![DbStatus::DbError; keys.len()]
}
