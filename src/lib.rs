pub mod alerts;
pub mod analytics;
pub mod config;
pub mod delivery;
pub mod ingest;
pub mod model;
pub mod resample;
pub mod sqlite_pragma;
pub mod storage;

pub use alerts::{evaluate_rules, AlertEvent, AlertLog, AlertRule, Comparison, Metric};
pub use analytics::{adf_test, pair_metrics, AdfResult, PairMetrics};
pub use config::SessionConfig;
pub use delivery::DeliveryQueue;
pub use ingest::session::Ingestor;
pub use model::{SymbolPair, Tick};
pub use resample::{ticks_to_ohlcv, OhlcvBucket};
pub use storage::{fetch_recent_cold, TickStore};

/// Initialize stderr logging from `RUST_LOG`, defaulting to `info`.
/// Safe to call more than once.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .try_init()
        .ok();
}
