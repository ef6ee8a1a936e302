//! Session handle owning the background ingestion runtime.
//!
//! The presentation layer holds one [`Ingestor`] per active session and calls
//! into it from its own (synchronous) thread; all network and storage
//! suspension points live on the runtime owned here.

use crate::config::{ConfigError, SessionConfig};
use crate::delivery::DeliveryQueue;
use crate::ingest::feed::{run_demo_injector, run_symbol_loop, synthetic_tick, TickFanout};
use crate::model::Tick;
use crate::storage::{fetch_recent_cold, StorageError, TickStore};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Debug)]
pub enum SessionError {
    Config(ConfigError),
    Storage(StorageError),
    Runtime(std::io::Error),
}

impl From<ConfigError> for SessionError {
    fn from(err: ConfigError) -> Self {
        SessionError::Config(err)
    }
}

impl From<StorageError> for SessionError {
    fn from(err: StorageError) -> Self {
        SessionError::Storage(err)
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Config(e) => write!(f, "Configuration error: {}", e),
            SessionError::Storage(e) => write!(f, "Storage error: {}", e),
            SessionError::Runtime(e) => write!(f, "Runtime error: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

/// Running ingestion session: one feed task per symbol (or one demo injector)
/// plus the write pipeline, all on a dedicated runtime.
pub struct Ingestor {
    runtime: Option<tokio::runtime::Runtime>,
    shutdown_tx: watch::Sender<bool>,
    delivery: DeliveryQueue,
    store: Option<TickStore>,
    store_tx: Option<mpsc::UnboundedSender<Tick>>,
    tasks: Vec<JoinHandle<()>>,
    db_path: PathBuf,
}

impl Ingestor {
    /// Validate the config, open storage and spawn the per-symbol feed tasks.
    /// An unrecoverable store-open failure is the only fatal startup error.
    pub fn start(config: SessionConfig) -> Result<Self, SessionError> {
        config.validate()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("tickflow-ingest")
            .enable_all()
            .build()
            .map_err(SessionError::Runtime)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let delivery = DeliveryQueue::new(config.delivery_capacity);

        let store = {
            let _guard = runtime.enter();
            TickStore::open(&config.db_path, &config.csv_dir, config.write_batch_cap)?
        };
        let store_tx = store.sender();

        let fanout = TickFanout {
            delivery: delivery.clone(),
            store_tx: store_tx.clone(),
        };

        let mut tasks = Vec::new();
        if config.demo_mode {
            tasks.push(runtime.spawn(run_demo_injector(
                config.symbols.clone(),
                Duration::from_millis(config.demo_interval_ms),
                fanout,
                shutdown_rx,
            )));
        } else {
            for symbol in &config.symbols {
                tasks.push(runtime.spawn(run_symbol_loop(
                    symbol.clone(),
                    config.reconnect_base_secs,
                    config.reconnect_cap_secs,
                    fanout.clone(),
                    shutdown_rx.clone(),
                )));
            }
        }

        log::info!(
            "🚀 Ingestor started: symbols={:?} demo={} db={}",
            config.symbols,
            config.demo_mode,
            config.db_path.display()
        );

        Ok(Self {
            runtime: Some(runtime),
            shutdown_tx,
            delivery,
            store: Some(store),
            store_tx: Some(store_tx),
            tasks,
            db_path: config.db_path,
        })
    }

    pub fn is_running(&self) -> bool {
        self.runtime.is_some()
    }

    /// The bounded queue the consumer drains on its own schedule.
    pub fn delivery(&self) -> &DeliveryQueue {
        &self.delivery
    }

    /// Non-blocking: remove and return up to `max_items` buffered ticks.
    pub fn drain(&self, max_items: usize) -> Vec<Tick> {
        self.delivery.drain(max_items)
    }

    /// Push one synthetic tick through the normal fanout. Safe to call from
    /// any thread; the tick takes the identical path as live feed ticks.
    pub fn inject_test_tick(&self, symbol: &str) {
        let tick = synthetic_tick(symbol);
        log::info!("💉 Injected test tick: {} @ {}", tick.symbol, tick.price);
        self.delivery.push(tick.clone());
        if let Some(tx) = &self.store_tx {
            let _ = tx.send(tick);
        }
    }

    /// Most recent `limit` persisted ticks, newest first. Uses the warm store
    /// handle while the session runs, the cold path otherwise.
    pub fn fetch_recent(&self, limit: usize) -> Result<Vec<Tick>, StorageError> {
        match &self.store {
            Some(store) => store.fetch_recent(limit),
            None => fetch_recent_cold(&self.db_path, limit),
        }
    }

    /// Signal all tasks to stop, flush the write pipeline and shut the
    /// runtime down, bounded by `timeout`. Returns `true` when everything
    /// finished within the budget, `false` when shutdown was abandoned.
    pub fn stop(mut self, timeout: Duration) -> bool {
        log::info!("🛑 Ingestor stop requested (timeout {:?})", timeout);
        let _ = self.shutdown_tx.send(true);

        let runtime = match self.runtime.take() {
            Some(runtime) => runtime,
            None => return true,
        };
        let tasks = std::mem::take(&mut self.tasks);
        let store = self.store.take();
        // Drop our intake handle so the writer sees channel close once the
        // feed tasks are gone.
        drop(self.store_tx.take());

        let deadline = Instant::now() + timeout;
        let mut clean = true;

        runtime.block_on(async {
            for task in tasks {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if tokio::time::timeout(remaining, task).await.is_err() {
                    log::warn!("⚠️  Feed task did not stop within timeout");
                    clean = false;
                }
            }
            if let Some(store) = store {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if !store.close(remaining).await {
                    clean = false;
                }
            }
        });

        runtime.shutdown_timeout(Duration::from_secs(1));
        if clean {
            log::info!("✅ Ingestor stopped cleanly");
        } else {
            log::warn!("⚠️  Ingestor stop timed out");
        }
        clean
    }
}

impl Drop for Ingestor {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            let _ = self.shutdown_tx.send(true);
            runtime.shutdown_background();
        }
    }
}
