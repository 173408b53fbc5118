//! SQLite-backed Store Reader
//!
//! One database per project at `<root>/<project>.db`, opened read-only. The
//! logging side may append while we read: every multi-statement read runs in
//! one deferred transaction, so it sees a single snapshot and never a torn
//! row. Rows appended after the snapshot are simply missed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, ErrorCode, OpenFlags, TransactionBehavior};
use tracing::{debug, warn};

use super::StoreReader;
use crate::config::{database_path, Config, RESERVED_DATABASES};
use crate::experiment::{DataPoint, RunRecord, SystemLog};
use crate::grouping::matches_filter;
use crate::{Error, Result};

/// How long a read waits on a writer holding the database lock.
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Store Reader over a directory of SQLite project databases.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    root: PathBuf,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// Create a reader over `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Create a reader over the configured storage root.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.storage_root())
    }

    /// Override the busy timeout.
    #[must_use]
    pub const fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    /// Directory scanned for project databases.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run `read` against the project's database on the blocking pool.
    async fn with_snapshot<T, F>(&self, project: &str, read: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &str) -> Result<T> + Send + 'static,
    {
        let path = database_path(&self.root, project);
        let project = project.to_string();
        let busy_timeout = self.busy_timeout;

        tokio::task::spawn_blocking(move || {
            let mut conn = open_read_only(&project, &path, busy_timeout)?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Deferred)
                .map_err(|e| sql_error(&project, "begin read", &e))?;
            let value = read(&tx, &project)?;
            // Read-only: ending the snapshot cannot lose anything
            tx.finish().map_err(|e| sql_error(&project, "end read", &e))?;
            Ok(value)
        })
        .await?
    }
}

impl StoreReader for SqliteStore {
    async fn list_projects(&self) -> Result<Vec<String>> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || scan_projects(&root)).await?
    }

    async fn list_runs(&self, project: &str) -> Result<Vec<RunRecord>> {
        let runs = self.with_snapshot(project, read_runs).await?;
        debug!(project, runs = runs.len(), "listed runs");
        Ok(runs)
    }

    async fn list_metric_names(&self, project: &str, run_id: &str) -> Result<Vec<String>> {
        let run_id = run_id.to_string();
        self.with_snapshot(project, move |conn, project| {
            read_metric_names(conn, project, &run_id)
        })
        .await
    }

    async fn load_points(&self, project: &str, run_id: &str, metric: &str) -> Result<Vec<DataPoint>> {
        let run_id = run_id.to_string();
        let metric = metric.to_string();
        let points = self
            .with_snapshot(project, move |conn, project| {
                read_points(conn, project, &run_id, &metric)
            })
            .await?;
        debug!(project, points = points.len(), "loaded points");
        Ok(points)
    }

    async fn load_system_logs(&self, project: &str, run_id: &str) -> Result<Vec<SystemLog>> {
        let run_id = run_id.to_string();
        let logs = self
            .with_snapshot(project, move |conn, project| {
                read_system_logs(conn, project, &run_id)
            })
            .await?;
        debug!(project, samples = logs.len(), "loaded system logs");
        Ok(logs)
    }

    async fn load_metrics(
        &self,
        project: &str,
        run_id: &str,
        metric_filter: &str,
    ) -> Result<BTreeMap<String, Vec<DataPoint>>> {
        let run_id = run_id.to_string();
        let metric_filter = metric_filter.to_string();
        self.with_snapshot(project, move |conn, project| {
            let mut metrics = BTreeMap::new();
            for name in read_metric_names(conn, project, &run_id)? {
                if matches_filter(&name, &metric_filter) {
                    let points = read_points(conn, project, &run_id, &name)?;
                    metrics.insert(name, points);
                }
            }
            Ok(metrics)
        })
        .await
    }
}

fn open_read_only(project: &str, path: &Path, busy_timeout: Duration) -> Result<Connection> {
    if !path.is_file() {
        return Err(Error::StoreNotFound {
            project: project.to_string(),
            path: path.to_path_buf(),
        });
    }
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(path, flags).map_err(|e| sql_error(project, "open", &e))?;
    conn.busy_timeout(busy_timeout)
        .map_err(|e| sql_error(project, "configure", &e))?;
    Ok(conn)
}

/// Lock contention is transient; anything else means the file is unreadable.
fn sql_error(project: &str, context: &str, err: &rusqlite::Error) -> Error {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            Error::Other(format!("Store for project '{project}' is busy ({context}): {err}"))
        }
        _ => Error::corrupt(project, format!("{context}: {err}")),
    }
}

fn scan_projects(root: &Path) -> Result<Vec<String>> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut projects = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("db") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
            if !RESERVED_DATABASES.contains(&stem) {
                projects.push(stem.to_string());
            }
        }
    }
    projects.sort();
    Ok(projects)
}

fn has_column(conn: &Connection, project: &str, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .map_err(|e| sql_error(project, "inspect schema", &e))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(|e| sql_error(project, "inspect schema", &e))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| sql_error(project, "inspect schema", &e))?;
    Ok(names.iter().any(|name| name == column))
}

fn read_runs(conn: &Connection, project: &str) -> Result<Vec<RunRecord>> {
    let with_config = has_column(conn, project, "runs", "config")?;
    let sql = if with_config {
        "SELECT run_id, project, start_time, config FROM runs \
         ORDER BY start_time IS NULL, start_time, run_id"
    } else {
        "SELECT run_id, project, start_time, NULL FROM runs \
         ORDER BY start_time IS NULL, start_time, run_id"
    };

    let mut stmt = conn.prepare(sql).map_err(|e| sql_error(project, "list runs", &e))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<f64>>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })
        .map_err(|e| sql_error(project, "list runs", &e))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| sql_error(project, "list runs", &e))?;

    let mut runs = Vec::with_capacity(rows.len());
    for (run_id, run_project, start_time, config) in rows {
        let mut builder = RunRecord::builder(&run_id, run_project.unwrap_or_else(|| project.to_string()));
        if let Some(start_time) = start_time {
            builder = builder.start_time(start_time);
        }
        if let Some(raw) = config {
            match serde_json::from_str(&raw) {
                Ok(config) => builder = builder.config(config),
                Err(e) => warn!(project, run_id, error = %e, "ignoring malformed run config"),
            }
        }
        runs.push(builder.build());
    }

    // Runs that logged metrics without a runs row
    let mut stmt = conn
        .prepare("SELECT DISTINCT run_id FROM metrics WHERE run_id NOT IN (SELECT run_id FROM runs) ORDER BY run_id")
        .map_err(|e| sql_error(project, "list runs", &e))?;
    let orphans = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| sql_error(project, "list runs", &e))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| sql_error(project, "list runs", &e))?;
    runs.extend(orphans.into_iter().map(|run_id| RunRecord::new(run_id, project)));

    Ok(runs)
}

fn read_metric_names(conn: &Connection, project: &str, run_id: &str) -> Result<Vec<String>> {
    let context = format!("list metrics of run '{run_id}'");
    let mut stmt = conn
        .prepare("SELECT DISTINCT metric_name FROM metrics WHERE run_id = ?1 ORDER BY metric_name")
        .map_err(|e| sql_error(project, &context, &e))?;
    let names = stmt
        .query_map(params![run_id], |row| row.get::<_, String>(0))
        .map_err(|e| sql_error(project, &context, &e))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| sql_error(project, &context, &e))?;
    Ok(names)
}

fn read_points(conn: &Connection, project: &str, run_id: &str, metric: &str) -> Result<Vec<DataPoint>> {
    let context = format!("load run '{run_id}' metric '{metric}'");
    let mut stmt = conn
        .prepare(
            "SELECT step, wall_time, value FROM metrics \
             WHERE run_id = ?1 AND metric_name = ?2 ORDER BY rowid",
        )
        .map_err(|e| sql_error(project, &context, &e))?;
    let points = stmt
        .query_map(params![run_id, metric], |row| {
            Ok(DataPoint::new(row.get(0)?, row.get(1)?, row.get(2)?))
        })
        .map_err(|e| sql_error(project, &context, &e))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| sql_error(project, &context, &e))?;
    Ok(points)
}

fn has_table(conn: &Connection, project: &str, table: &str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        params![table],
        |row| row.get::<_, bool>(0),
    )
    .map_err(|e| sql_error(project, "inspect schema", &e))
}

/// Databases written before system logging existed have no table: no samples.
fn read_system_logs(conn: &Connection, project: &str, run_id: &str) -> Result<Vec<SystemLog>> {
    if !has_table(conn, project, "system_metrics")? {
        return Ok(Vec::new());
    }

    let context = format!("load system logs of run '{run_id}'");
    let mut stmt = conn
        .prepare(
            "SELECT COALESCE(step, 0), wall_time, metrics FROM system_metrics \
             WHERE run_id = ?1 ORDER BY rowid",
        )
        .map_err(|e| sql_error(project, &context, &e))?;
    let rows = stmt
        .query_map(params![run_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?, row.get::<_, String>(2)?))
        })
        .map_err(|e| sql_error(project, &context, &e))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| sql_error(project, &context, &e))?;

    rows.into_iter()
        .map(|(step, wall_time, raw)| {
            serde_json::from_str(&raw)
                .ok()
                .and_then(|payload| SystemLog::from_json(step, wall_time, &payload))
                .ok_or_else(|| Error::corrupt(project, format!("{context}: metrics is not a JSON object")))
        })
        .collect()
}
