//! Durable write pipeline for ticks.
//!
//! Producers enqueue ticks without blocking; a single writer task batches them
//! into SQLite transactions and then appends each batch to the flat CSV logs.
//! Per-row failures are skipped inside a batch; flat-sink failures never fail
//! the structured commit.

pub mod csv_sink;

pub use csv_sink::{CsvSink, TickSink};

use crate::model::Tick;
use crate::sqlite_pragma::apply_optimized_pragmas;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    Database(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err)
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "IO error: {}", e),
            StorageError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS ticks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL,
    ts TEXT NOT NULL,
    price REAL NOT NULL,
    size REAL,
    created_at TEXT DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_ticks_symbol_ts ON ticks(symbol, ts);
";

/// How long the writer waits for the first tick of a batch before re-checking
/// the stop signal.
const WRITER_IDLE_WAIT: Duration = Duration::from_secs(1);

/// Queue-backed batched tick persistence. The SQLite handle is owned here;
/// other components read persisted data only through [`TickStore::fetch_recent`]
/// or the cold path in [`fetch_recent_cold`].
pub struct TickStore {
    tx: mpsc::UnboundedSender<Tick>,
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
    writer: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl TickStore {
    /// Open the database, initialize the schema and spawn the writer task.
    /// Must be called from within a tokio runtime.
    pub fn open(
        db_path: impl AsRef<Path>,
        csv_dir: impl AsRef<Path>,
        batch_cap: usize,
    ) -> Result<Self, StorageError> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&db_path)?;
        apply_optimized_pragmas(&conn)?;
        conn.execute_batch(SCHEMA)?;
        log::info!("✅ Tick database initialized with WAL mode: {}", db_path.display());

        let sink: Box<dyn TickSink> = Box::new(CsvSink::new(csv_dir)?);
        let conn = Arc::new(Mutex::new(conn));
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let writer = tokio::spawn(writer_loop(
            rx,
            conn.clone(),
            sink,
            batch_cap.max(1),
            shutdown_rx,
        ));

        Ok(Self {
            tx,
            conn,
            db_path,
            writer,
            shutdown_tx,
        })
    }

    /// A cloneable intake handle for producers.
    pub fn sender(&self) -> mpsc::UnboundedSender<Tick> {
        self.tx.clone()
    }

    pub fn enqueue(&self, tick: Tick) {
        let _ = self.tx.send(tick);
    }

    /// Most recent `limit` ticks, newest first (warm path on the open handle,
    /// falling back to a cold read if the warm query fails).
    pub fn fetch_recent(&self, limit: usize) -> Result<Vec<Tick>, StorageError> {
        let warm = {
            let conn = self.conn.lock().unwrap();
            fetch_recent_from(&conn, limit)
        };
        match warm {
            Ok(ticks) => Ok(ticks),
            Err(e) => {
                log::debug!("Warm read failed, retrying cold: {}", e);
                fetch_recent_cold(&self.db_path, limit)
            }
        }
    }

    /// Stop intake, flush outstanding ticks and wait for the writer, bounded
    /// by `timeout`. Returns `true` when the flush completed in time; on
    /// timeout the writer is abandoned to finish in the background.
    pub async fn close(self, timeout: Duration) -> bool {
        let _ = self.shutdown_tx.send(true);
        drop(self.tx);
        match tokio::time::timeout(timeout, self.writer).await {
            Ok(_) => {
                log::info!("✅ Tick store closed");
                true
            }
            Err(_) => {
                log::warn!("⚠️  Tick store flush timed out, abandoning writer");
                false
            }
        }
    }
}

async fn writer_loop(
    mut rx: mpsc::UnboundedReceiver<Tick>,
    conn: Arc<Mutex<Connection>>,
    mut sink: Box<dyn TickSink>,
    batch_cap: usize,
    shutdown: watch::Receiver<bool>,
) {
    log::info!("📝 Tick writer started (batch cap {})", batch_cap);
    loop {
        let first = tokio::select! {
            item = rx.recv() => match item {
                Some(tick) => tick,
                // All senders gone; queued items were already delivered.
                None => break,
            },
            _ = tokio::time::sleep(WRITER_IDLE_WAIT) => {
                if *shutdown.borrow() {
                    flush_remaining(&mut rx, &conn, sink.as_mut(), batch_cap).await;
                    break;
                }
                continue;
            }
        };

        let mut batch = vec![first];
        while batch.len() < batch_cap {
            match rx.try_recv() {
                Ok(tick) => batch.push(tick),
                Err(_) => break,
            }
        }

        commit_batch(&conn, &batch);
        if let Err(e) = sink.append(&batch).await {
            log::warn!("⚠️  {} sink append failed: {}", sink.sink_type(), e);
        }
    }
    log::info!("✅ Tick writer stopped");
}

/// Drain everything still queued at shutdown and commit it in batch-sized
/// chunks.
async fn flush_remaining(
    rx: &mut mpsc::UnboundedReceiver<Tick>,
    conn: &Arc<Mutex<Connection>>,
    sink: &mut dyn TickSink,
    batch_cap: usize,
) {
    let mut remaining = Vec::new();
    while let Ok(tick) = rx.try_recv() {
        remaining.push(tick);
    }
    if remaining.is_empty() {
        return;
    }
    log::info!("🔄 Final flush: {} queued ticks", remaining.len());
    for chunk in remaining.chunks(batch_cap) {
        commit_batch(conn, chunk);
        if let Err(e) = sink.append(chunk).await {
            log::warn!("⚠️  {} sink append failed during final flush: {}", sink.sink_type(), e);
        }
    }
}

/// Commit one batch as a single transaction. A failing row is logged and
/// skipped; a failing commit loses only this batch.
fn commit_batch(conn: &Arc<Mutex<Connection>>, batch: &[Tick]) {
    let mut guard = conn.lock().unwrap();
    let tx = match guard.transaction() {
        Ok(tx) => tx,
        Err(e) => {
            log::error!("❌ Failed to begin tick transaction: {}", e);
            return;
        }
    };

    let mut inserted = 0usize;
    for tick in batch {
        let result = tx.execute(
            "INSERT INTO ticks (symbol, ts, price, size) VALUES (?1, ?2, ?3, ?4)",
            params![tick.symbol, tick.iso_ts(), tick.price, tick.size],
        );
        match result {
            Ok(_) => inserted += 1,
            Err(e) => log::warn!("⚠️  Skipping tick row {} @ {}: {}", tick.symbol, tick.ts_ms, e),
        }
    }

    match tx.commit() {
        Ok(()) => log::debug!("✅ Flushed {} ticks to SQLite", inserted),
        Err(e) => log::error!("❌ Batch commit failed ({} ticks): {}", batch.len(), e),
    }
}

fn fetch_recent_from(conn: &Connection, limit: usize) -> Result<Vec<Tick>, StorageError> {
    let mut stmt =
        conn.prepare("SELECT symbol, ts, price, size FROM ticks ORDER BY id DESC LIMIT ?1")?;
    let rows = stmt.query_map([limit as i64], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, f64>(2)?,
            row.get::<_, Option<f64>>(3)?,
        ))
    })?;

    let mut ticks = Vec::new();
    for row in rows {
        let (symbol, ts, price, size) = row?;
        // Rows with an unparsable timestamp are dropped, not fatal.
        if let Some(ts_ms) = Tick::parse_iso_ts(&ts) {
            ticks.push(Tick::new(symbol, ts_ms, price, size.unwrap_or(0.0)));
        }
    }
    Ok(ticks)
}

/// Read the most recent `limit` ticks from a fresh read-only handle; used when
/// no write pipeline is running. A missing database yields an empty result.
pub fn fetch_recent_cold(db_path: impl AsRef<Path>, limit: usize) -> Result<Vec<Tick>, StorageError> {
    let db_path = db_path.as_ref();
    if !db_path.exists() {
        return Ok(Vec::new());
    }
    let conn = Connection::open(db_path)?;
    apply_optimized_pragmas(&conn)?;
    conn.execute_batch("PRAGMA query_only = ON;")?;
    fetch_recent_from(&conn, limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn tick(symbol: &str, n: i64) -> Tick {
        Tick::new(symbol, 1_700_000_000_000 + n * 1_000, 100.0 + n as f64, 0.1)
    }

    #[tokio::test]
    async fn test_write_then_fetch_recent_reverse_order() {
        let dir = tempdir().unwrap();
        let store = TickStore::open(dir.path().join("ticks.db"), dir.path().join("csv"), 200).unwrap();

        for i in 0..10 {
            store.enqueue(tick("BTCUSDT", i));
        }
        assert!(store.close(Duration::from_secs(5)).await);

        let ticks = fetch_recent_cold(dir.path().join("ticks.db"), 5).unwrap();
        assert_eq!(ticks.len(), 5);
        // Newest first
        assert_eq!(ticks[0].price, 109.0);
        assert_eq!(ticks[4].price, 105.0);
    }

    #[tokio::test]
    async fn test_warm_read_while_running() {
        let dir = tempdir().unwrap();
        let store = TickStore::open(dir.path().join("ticks.db"), dir.path().join("csv"), 200).unwrap();

        for i in 0..3 {
            store.enqueue(tick("ETHUSDT", i));
        }
        // Give the writer a chance to flush its first batch.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let ticks = store.fetch_recent(10).unwrap();
        assert_eq!(ticks.len(), 3);
        assert_eq!(ticks[0].symbol, "ETHUSDT");
        assert!(store.close(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_close_zero_timeout_reports_timeout() {
        let dir = tempdir().unwrap();
        let store = TickStore::open(dir.path().join("ticks.db"), dir.path().join("csv"), 200).unwrap();
        store.enqueue(tick("BTCUSDT", 0));
        assert!(!store.close(Duration::from_millis(0)).await);
    }

    #[tokio::test]
    async fn test_csv_logs_written_with_single_header() {
        let dir = tempdir().unwrap();
        let csv_dir = dir.path().join("csv");
        let store = TickStore::open(dir.path().join("ticks.db"), &csv_dir, 200).unwrap();

        store.enqueue(tick("BTCUSDT", 0));
        store.enqueue(tick("ETHUSDT", 1));
        assert!(store.close(Duration::from_secs(5)).await);

        // Second session appends without rewriting the header.
        let store = TickStore::open(dir.path().join("ticks.db"), &csv_dir, 200).unwrap();
        store.enqueue(tick("BTCUSDT", 2));
        assert!(store.close(Duration::from_secs(5)).await);

        let all = std::fs::read_to_string(csv_dir.join("all-ticks.csv")).unwrap();
        let headers = all.lines().filter(|l| *l == "symbol,ts,price,size").count();
        assert_eq!(headers, 1);
        assert_eq!(all.lines().count(), 4); // header + 3 rows

        let per_symbol = std::fs::read_to_string(csv_dir.join("BTCUSDT.csv")).unwrap();
        assert_eq!(per_symbol.lines().count(), 3); // header + 2 rows
        assert!(csv_dir.join("ETHUSDT.csv").exists());
    }

    #[tokio::test]
    async fn test_fetch_recent_cold_missing_db() {
        let dir = tempdir().unwrap();
        let ticks = fetch_recent_cold(dir.path().join("absent.db"), 100).unwrap();
        assert!(ticks.is_empty());
    }

    #[tokio::test]
    async fn test_large_batch_fully_persisted() {
        let dir = tempdir().unwrap();
        let store = TickStore::open(dir.path().join("ticks.db"), dir.path().join("csv"), 200).unwrap();

        for i in 0..450 {
            store.enqueue(tick("BTCUSDT", i));
        }
        assert!(store.close(Duration::from_secs(5)).await);

        let ticks = fetch_recent_cold(dir.path().join("ticks.db"), 1_000).unwrap();
        assert_eq!(ticks.len(), 450);
    }
}
