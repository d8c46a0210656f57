//! Detection persistence.
//!
//! Every cycle's result is written down, detections one row each plus a
//! per-cycle audit row, so an empty cycle still leaves a trace. Recording
//! state also lives here: the hysteresis in [`crate::recording`] consults
//! recent rows rather than in-process state, which keeps the decision
//! correct across worker restarts.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::result::{Detection, DetectionResult};

pub trait NvrDatabase: Send + Sync {
    /// Persist one cycle's result for `stream` at unix-seconds `at`.
    fn store_result(&self, stream: &str, at: i64, result: &DetectionResult) -> Result<()>;

    /// Detections for `stream` no older than `max_age_secs` before `now`.
    fn recent_detections(&self, stream: &str, now: i64, max_age_secs: i64) -> Result<Vec<Detection>>;

    fn recording_active(&self, stream: &str) -> Result<bool>;

    fn set_recording_active(&self, stream: &str, active: bool, path: Option<&str>) -> Result<()>;

    /// Drop detection rows older than `max_age_secs` before `now`.
    fn prune_detections(&self, now: i64, max_age_secs: i64) -> Result<usize>;
}

pub struct SqliteDatabase {
    conn: Mutex<Connection>,
}

impl SqliteDatabase {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS detection_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                stream TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                detection_count INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS detections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                stream TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                label TEXT NOT NULL,
                confidence REAL NOT NULL,
                x REAL NOT NULL,
                y REAL NOT NULL,
                width REAL NOT NULL,
                height REAL NOT NULL,
                track_id INTEGER NOT NULL DEFAULT -1,
                zone TEXT NOT NULL DEFAULT ''
            );
            CREATE INDEX IF NOT EXISTS idx_detections_stream_time
                ON detections(stream, created_at);
            CREATE TABLE IF NOT EXISTS recording_state (
                stream TEXT PRIMARY KEY,
                active INTEGER NOT NULL,
                path TEXT,
                updated_at INTEGER NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }
}

impl NvrDatabase for SqliteDatabase {
    fn store_result(&self, stream: &str, at: i64, result: &DetectionResult) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO detection_runs (stream, created_at, detection_count) VALUES (?1, ?2, ?3)",
            params![stream, at, result.len() as i64],
        )?;
        for d in &result.detections {
            tx.execute(
                "INSERT INTO detections
                    (stream, created_at, label, confidence, x, y, width, height, track_id, zone)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    stream,
                    at,
                    d.label,
                    d.confidence as f64,
                    d.x as f64,
                    d.y as f64,
                    d.width as f64,
                    d.height as f64,
                    d.track_id,
                    d.zone,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn recent_detections(&self, stream: &str, now: i64, max_age_secs: i64) -> Result<Vec<Detection>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT label, confidence, x, y, width, height, track_id, zone
             FROM detections
             WHERE stream = ?1 AND created_at >= ?2
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![stream, now - max_age_secs], |row| {
            Ok(Detection {
                label: row.get(0)?,
                confidence: row.get::<_, f64>(1)? as f32,
                x: row.get::<_, f64>(2)? as f32,
                y: row.get::<_, f64>(3)? as f32,
                width: row.get::<_, f64>(4)? as f32,
                height: row.get::<_, f64>(5)? as f32,
                track_id: row.get(6)?,
                zone: row.get(7)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn recording_active(&self, stream: &str) -> Result<bool> {
        let conn = self.lock();
        let active: Option<i64> = conn
            .query_row(
                "SELECT active FROM recording_state WHERE stream = ?1",
                params![stream],
                |row| row.get(0),
            )
            .optional()?;
        Ok(active == Some(1))
    }

    fn set_recording_active(&self, stream: &str, active: bool, path: Option<&str>) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO recording_state (stream, active, path, updated_at)
             VALUES (?1, ?2, ?3, strftime('%s','now'))
             ON CONFLICT(stream) DO UPDATE SET
                active = excluded.active,
                path = excluded.path,
                updated_at = excluded.updated_at",
            params![stream, active as i64, path],
        )?;
        Ok(())
    }

    fn prune_detections(&self, now: i64, max_age_secs: i64) -> Result<usize> {
        let conn = self.lock();
        let cutoff = now - max_age_secs;
        let n = conn.execute(
            "DELETE FROM detections WHERE created_at < ?1",
            params![cutoff],
        )?;
        conn.execute(
            "DELETE FROM detection_runs WHERE created_at < ?1",
            params![cutoff],
        )?;
        Ok(n)
    }
}

/// In-memory database for tests and dry runs.
#[derive(Default)]
pub struct MemoryDatabase {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    rows: Vec<(String, i64, Detection)>,
    runs: Vec<(String, i64, usize)>,
    recording: std::collections::HashMap<String, (bool, Option<String>)>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_count(&self) -> usize {
        self.lock().runs.len()
    }

    pub fn recording_path(&self, stream: &str) -> Option<String> {
        self.lock()
            .recording
            .get(stream)
            .and_then(|(_, path)| path.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }
}

impl NvrDatabase for MemoryDatabase {
    fn store_result(&self, stream: &str, at: i64, result: &DetectionResult) -> Result<()> {
        let mut inner = self.lock();
        inner.runs.push((stream.to_string(), at, result.len()));
        for d in &result.detections {
            inner.rows.push((stream.to_string(), at, d.clone()));
        }
        Ok(())
    }

    fn recent_detections(&self, stream: &str, now: i64, max_age_secs: i64) -> Result<Vec<Detection>> {
        let inner = self.lock();
        Ok(inner
            .rows
            .iter()
            .filter(|(s, at, _)| s == stream && *at >= now - max_age_secs)
            .map(|(_, _, d)| d.clone())
            .collect())
    }

    fn recording_active(&self, stream: &str) -> Result<bool> {
        Ok(self
            .lock()
            .recording
            .get(stream)
            .map(|(active, _)| *active)
            .unwrap_or(false))
    }

    fn set_recording_active(&self, stream: &str, active: bool, path: Option<&str>) -> Result<()> {
        self.lock()
            .recording
            .insert(stream.to_string(), (active, path.map(String::from)));
        Ok(())
    }

    fn prune_detections(&self, now: i64, max_age_secs: i64) -> Result<usize> {
        let mut inner = self.lock();
        let cutoff = now - max_age_secs;
        let before = inner.rows.len();
        inner.rows.retain(|(_, at, _)| *at >= cutoff);
        inner.runs.retain(|(_, at, _)| *at >= cutoff);
        Ok(before - inner.rows.len())
    }
}
