use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One trade observation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    /// Event time, UTC milliseconds since the epoch.
    pub ts_ms: i64,
    pub price: f64,
    pub size: f64,
}

impl Tick {
    pub fn new(symbol: impl Into<String>, ts_ms: i64, price: f64, size: f64) -> Self {
        Self {
            symbol: symbol.into(),
            ts_ms,
            price,
            size,
        }
    }

    /// ISO-8601 UTC timestamp with millisecond precision and trailing `Z`,
    /// the format used by the persisted `ticks.ts` column and the CSV logs.
    pub fn iso_ts(&self) -> String {
        match Utc.timestamp_millis_opt(self.ts_ms).single() {
            Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
            None => String::new(),
        }
    }

    /// Parse a persisted ISO-8601 timestamp back to epoch milliseconds.
    pub fn parse_iso_ts(ts: &str) -> Option<i64> {
        DateTime::parse_from_rfc3339(ts)
            .ok()
            .map(|dt| dt.timestamp_millis())
    }
}

pub fn current_timestamp_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Two symbols whose price series are analyzed together, written `LEFT:RIGHT`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolPair {
    pub left: String,
    pub right: String,
}

impl SymbolPair {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }

    /// Parse a `LEFT:RIGHT` spec. Both sides must be non-empty.
    pub fn parse(spec: &str) -> Option<Self> {
        let (left, right) = spec.split_once(':')?;
        let (left, right) = (left.trim(), right.trim());
        if left.is_empty() || right.is_empty() {
            return None;
        }
        Some(Self::new(left.to_uppercase(), right.to_uppercase()))
    }

    pub fn label(&self) -> String {
        format!("{}:{}", self.left, self.right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_roundtrip() {
        let tick = Tick::new("BTCUSDT", 1_700_000_000_123, 42_000.5, 0.25);
        let iso = tick.iso_ts();
        assert!(iso.ends_with('Z'));
        assert_eq!(Tick::parse_iso_ts(&iso), Some(1_700_000_000_123));
    }

    #[test]
    fn test_parse_bad_timestamp() {
        assert_eq!(Tick::parse_iso_ts("not-a-time"), None);
        assert_eq!(Tick::parse_iso_ts(""), None);
    }

    #[test]
    fn test_pair_parse() {
        let pair = SymbolPair::parse("btcusdt:ethusdt").unwrap();
        assert_eq!(pair.left, "BTCUSDT");
        assert_eq!(pair.right, "ETHUSDT");
        assert_eq!(pair.label(), "BTCUSDT:ETHUSDT");

        assert!(SymbolPair::parse("BTCUSDT").is_none());
        assert!(SymbolPair::parse(":ETHUSDT").is_none());
    }
}
