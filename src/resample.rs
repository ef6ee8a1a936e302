//! Fixed-width OHLCV bucketing of a raw tick series.
//!
//! Pure and stateless: the same tick set always yields the same buckets, so it
//! is safe to recompute on every refresh instead of maintaining incremental
//! aggregates.

use crate::model::Tick;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvBucket {
    /// Bucket start, UTC milliseconds, aligned to the bucket width.
    pub bucket_start_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

struct BucketAcc {
    open: f64,
    open_ts: i64,
    high: f64,
    low: f64,
    close: f64,
    close_ts: i64,
    volume: f64,
}

/// Aggregate ticks into OHLCV buckets of `bucket_ms` width.
///
/// Input does not need to be sorted; within a bucket, open/close follow tick
/// time. Buckets with no ticks are omitted. Ticks with a non-finite price are
/// excluded before bucketing.
pub fn ticks_to_ohlcv(ticks: &[Tick], bucket_ms: i64) -> Vec<OhlcvBucket> {
    if ticks.is_empty() || bucket_ms <= 0 {
        return Vec::new();
    }

    let mut buckets: BTreeMap<i64, BucketAcc> = BTreeMap::new();

    for tick in ticks {
        if !tick.price.is_finite() {
            continue;
        }
        let start = tick.ts_ms.div_euclid(bucket_ms) * bucket_ms;
        let size = if tick.size.is_finite() { tick.size } else { 0.0 };

        match buckets.get_mut(&start) {
            Some(acc) => {
                if tick.ts_ms < acc.open_ts {
                    acc.open = tick.price;
                    acc.open_ts = tick.ts_ms;
                }
                if tick.ts_ms >= acc.close_ts {
                    acc.close = tick.price;
                    acc.close_ts = tick.ts_ms;
                }
                acc.high = acc.high.max(tick.price);
                acc.low = acc.low.min(tick.price);
                acc.volume += size;
            }
            None => {
                buckets.insert(
                    start,
                    BucketAcc {
                        open: tick.price,
                        open_ts: tick.ts_ms,
                        high: tick.price,
                        low: tick.price,
                        close: tick.price,
                        close_ts: tick.ts_ms,
                        volume: size,
                    },
                );
            }
        }
    }

    buckets
        .into_iter()
        .map(|(bucket_start_ms, acc)| OhlcvBucket {
            bucket_start_ms,
            open: acc.open,
            high: acc.high,
            low: acc.low,
            close: acc.close,
            volume: acc.volume,
        })
        .collect()
}
