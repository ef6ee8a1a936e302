use std::path::PathBuf;

#[derive(Debug)]
pub enum ConfigError {
    NoSymbols,
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NoSymbols => write!(f, "At least one symbol is required"),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Configuration for one ingestion session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Symbols to subscribe to, e.g. `["btcusdt", "ethusdt"]`.
    pub symbols: Vec<String>,
    /// SQLite database file for the structured sink.
    pub db_path: PathBuf,
    /// Directory for the flat CSV append logs.
    pub csv_dir: PathBuf,
    /// Synthesize ticks locally instead of opening network connections.
    pub demo_mode: bool,
    /// Base reconnect delay in seconds. Grows 1.5x per consecutive failure.
    pub reconnect_base_secs: f64,
    /// Reconnect delay ceiling in seconds.
    pub reconnect_cap_secs: f64,
    /// Delivery queue capacity; oldest ticks are evicted beyond this.
    pub delivery_capacity: usize,
    /// Maximum ticks committed per write transaction.
    pub write_batch_cap: usize,
    /// Interval between synthetic ticks in demo mode.
    pub demo_interval_ms: u64,
}

impl SessionConfig {
    pub fn new(symbols: Vec<String>, db_path: impl Into<PathBuf>) -> Self {
        Self {
            symbols,
            db_path: db_path.into(),
            csv_dir: PathBuf::from("csv_data"),
            demo_mode: false,
            reconnect_base_secs: 3.0,
            reconnect_cap_secs: 30.0,
            delivery_capacity: 10_000,
            write_batch_cap: 200,
            demo_interval_ms: 150,
        }
    }

    pub fn with_csv_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.csv_dir = dir.into();
        self
    }

    pub fn with_demo_mode(mut self, enabled: bool) -> Self {
        self.demo_mode = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::NoSymbols);
        }
        if self.symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(ConfigError::InvalidValue("empty symbol".to_string()));
        }
        if self.reconnect_base_secs <= 0.0 || self.reconnect_cap_secs < self.reconnect_base_secs {
            return Err(ConfigError::InvalidValue(format!(
                "reconnect delays must satisfy 0 < base <= cap, got base={} cap={}",
                self.reconnect_base_secs, self.reconnect_cap_secs
            )));
        }
        if self.delivery_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "delivery_capacity must be at least 1".to_string(),
            ));
        }
        if self.write_batch_cap == 0 {
            return Err(ConfigError::InvalidValue(
                "write_batch_cap must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SessionConfig::new(vec!["btcusdt".to_string()], "ticks.db");
        assert!(config.validate().is_ok());
        assert_eq!(config.write_batch_cap, 200);
        assert_eq!(config.reconnect_base_secs, 3.0);
    }

    #[test]
    fn test_rejects_empty_symbols() {
        let config = SessionConfig::new(vec![], "ticks.db");
        assert!(matches!(config.validate(), Err(ConfigError::NoSymbols)));
    }

    #[test]
    fn test_rejects_bad_backoff() {
        let mut config = SessionConfig::new(vec!["btcusdt".to_string()], "ticks.db");
        config.reconnect_cap_secs = 1.0;
        assert!(config.validate().is_err());
    }
}
