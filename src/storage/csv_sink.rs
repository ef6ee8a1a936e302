//! Flat append-log sinks fed after each structured commit.

use crate::model::Tick;
use crate::storage::StorageError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const CSV_HEADER: &str = "symbol,ts,price,size";
const GLOBAL_LOG: &str = "all-ticks.csv";

/// A secondary sink the writer feeds after the SQLite commit. Implementations
/// must not block the writer task on disk I/O.
#[async_trait]
pub trait TickSink: Send {
    async fn append(&mut self, batch: &[Tick]) -> Result<(), StorageError>;

    /// Sink name for logging.
    fn sink_type(&self) -> &'static str;
}

/// Appends every batch to `all-ticks.csv` plus one `<SYMBOL>.csv` per symbol,
/// each file getting a header row exactly once. Individual file failures are
/// logged and skipped so one bad path cannot lose the rest of the batch.
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }
}

#[async_trait]
impl TickSink for CsvSink {
    async fn append(&mut self, batch: &[Tick]) -> Result<(), StorageError> {
        let dir = self.dir.clone();
        let batch = batch.to_vec();
        // Disk appends run on the blocking pool so slow I/O cannot starve
        // the writer's intake loop.
        tokio::task::spawn_blocking(move || append_batch_blocking(&dir, &batch))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
            })?;
        Ok(())
    }

    fn sink_type(&self) -> &'static str {
        "CSV"
    }
}

fn append_batch_blocking(dir: &Path, batch: &[Tick]) {
    let all: Vec<&Tick> = batch.iter().collect();
    if let Err(e) = append_rows(&dir.join(GLOBAL_LOG), &all) {
        log::warn!("⚠️  Failed to append {}: {}", GLOBAL_LOG, e);
    }

    let mut per_symbol: BTreeMap<&str, Vec<&Tick>> = BTreeMap::new();
    for tick in batch {
        per_symbol.entry(tick.symbol.as_str()).or_default().push(tick);
    }
    for (symbol, rows) in per_symbol {
        let path = dir.join(format!("{}.csv", symbol.to_uppercase()));
        if let Err(e) = append_rows(&path, &rows) {
            log::warn!("⚠️  Failed to append {}: {}", path.display(), e);
        }
    }
}

fn append_rows(path: &Path, rows: &[&Tick]) -> std::io::Result<()> {
    let write_header = !path.exists();
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    if write_header {
        writeln!(writer, "{}", CSV_HEADER)?;
    }
    for tick in rows {
        writeln!(
            writer,
            "{},{},{},{}",
            tick.symbol,
            tick.iso_ts(),
            tick.price,
            tick.size
        )?;
    }
    writer.flush()
}
