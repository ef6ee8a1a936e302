//! Pairwise statistical analytics over two price series.
//!
//! Raw tick series are resampled onto a shared 1-second grid (last price per
//! second, forward-filled) before any fit, so both legs line up even when one
//! feed is quiet. Every function tolerates empty or misaligned input by
//! returning an empty result.

pub mod adf;

pub use adf::{adf_test, AdfResult};

use crate::model::Tick;
use std::collections::BTreeMap;

/// Minimum samples before a rolling window produces a value.
pub const MIN_ROLLING_SAMPLES: usize = 5;

/// Widest 1-second grid that will be densified. Ticks whose second falls
/// further than this before the newest tick are dropped as stale outliers,
/// so one bogus timestamp cannot inflate the grid.
pub const MAX_GRID_SPAN_SECS: i64 = 86_400;

/// Last observed price per second over the series' span, forward-filled.
/// Returns `(second, price)` pairs in ascending time order. The span is
/// bounded by [`MAX_GRID_SPAN_SECS`] ending at the newest tick.
pub fn price_grid_1s(ticks: &[Tick]) -> Vec<(i64, f64)> {
    let mut by_second: BTreeMap<i64, f64> = BTreeMap::new();
    for tick in ticks {
        if tick.price.is_finite() {
            by_second.insert(tick.ts_ms.div_euclid(1_000), tick.price);
        }
    }

    let last = match by_second.keys().next_back() {
        Some(&last) => last,
        None => return Vec::new(),
    };
    let by_second = by_second.split_off(&(last - (MAX_GRID_SPAN_SECS - 1)));
    let first = match by_second.keys().next() {
        Some(&first) => first,
        None => return Vec::new(),
    };

    let mut grid = Vec::with_capacity((last - first + 1) as usize);
    let mut current = f64::NAN;
    for second in first..=last {
        if let Some(&price) = by_second.get(&second) {
            current = price;
        }
        grid.push((second, current));
    }
    grid
}

/// Align two tick series on their overlapping 1-second grid.
/// Returns `(left_prices, right_prices)` of equal length, possibly empty.
pub fn align_pair(left: &[Tick], right: &[Tick]) -> (Vec<f64>, Vec<f64>) {
    let grid_l = price_grid_1s(left);
    let grid_r = price_grid_1s(right);
    if grid_l.is_empty() || grid_r.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let start = grid_l[0].0.max(grid_r[0].0);
    let end = grid_l[grid_l.len() - 1].0.min(grid_r[grid_r.len() - 1].0);
    if start > end {
        return (Vec::new(), Vec::new());
    }

    let offset_l = (start - grid_l[0].0) as usize;
    let offset_r = (start - grid_r[0].0) as usize;
    let len = (end - start + 1) as usize;

    let left_prices = grid_l[offset_l..offset_l + len].iter().map(|&(_, p)| p).collect();
    let right_prices = grid_r[offset_r..offset_r + len].iter().map(|&(_, p)| p).collect();
    (left_prices, right_prices)
}

/// OLS slope of `y = beta * x + intercept`.
///
/// Returns 1.0 when there is no data and 0.0 when the fit is degenerate
/// (uniformly zero or constant independent series), matching the upstream
/// pair-monitor behavior rather than reporting an error.
pub fn ols_hedge_ratio(y: &[f64], x: &[f64]) -> f64 {
    let n = y.len().min(x.len());
    if n == 0 {
        return 1.0;
    }
    if x[..n].iter().all(|&v| v == 0.0) {
        return 0.0;
    }

    let nf = n as f64;
    let mean_x = x[..n].iter().sum::<f64>() / nf;
    let mean_y = y[..n].iter().sum::<f64>() / nf;

    let mut cov = 0.0;
    let mut var = 0.0;
    for i in 0..n {
        let dx = x[i] - mean_x;
        cov += dx * (y[i] - mean_y);
        var += dx * dx;
    }
    if var == 0.0 {
        return 0.0;
    }
    cov / var
}

/// `y - beta * x`, element-wise over the aligned prefix.
pub fn spread_series(y: &[f64], x: &[f64], beta: f64) -> Vec<f64> {
    y.iter()
        .zip(x.iter())
        .map(|(&yv, &xv)| yv - beta * xv)
        .collect()
}

/// Rolling z-score of `series` with sample standard deviation.
/// Windows with fewer than [`MIN_ROLLING_SAMPLES`] values, or zero variance,
/// yield `None`.
pub fn rolling_zscore(series: &[f64], window: usize) -> Vec<Option<f64>> {
    let window = window.max(1);
    series
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let start = (i + 1).saturating_sub(window);
            let slice = &series[start..=i];
            let n = slice.len();
            if n < MIN_ROLLING_SAMPLES {
                return None;
            }
            let nf = n as f64;
            let mean = slice.iter().sum::<f64>() / nf;
            let var = slice.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / (nf - 1.0);
            let std = var.sqrt();
            let z = (value - mean) / std;
            z.is_finite().then_some(z)
        })
        .collect()
}

/// Rolling Pearson correlation of two aligned series, same minimum-sample
/// floor as [`rolling_zscore`].
pub fn rolling_correlation(a: &[f64], b: &[f64], window: usize) -> Vec<Option<f64>> {
    let window = window.max(1);
    let n = a.len().min(b.len());
    (0..n)
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let wa = &a[start..=i];
            let wb = &b[start..=i];
            let len = wa.len();
            if len < MIN_ROLLING_SAMPLES {
                return None;
            }
            let lf = len as f64;
            let mean_a = wa.iter().sum::<f64>() / lf;
            let mean_b = wb.iter().sum::<f64>() / lf;
            let mut cov = 0.0;
            let mut var_a = 0.0;
            let mut var_b = 0.0;
            for j in 0..len {
                let da = wa[j] - mean_a;
                let db = wb[j] - mean_b;
                cov += da * db;
                var_a += da * da;
                var_b += db * db;
            }
            let denom = (var_a * var_b).sqrt();
            if denom == 0.0 {
                return None;
            }
            let corr = cov / denom;
            corr.is_finite().then_some(corr)
        })
        .collect()
}

/// Derived series for one symbol pair.
#[derive(Debug, Clone)]
pub struct PairMetrics {
    pub beta: f64,
    pub spread: Vec<f64>,
    pub zscore: Vec<Option<f64>>,
    pub correlation: Vec<Option<f64>>,
    /// Stationarity test on the spread; absent below 10 observations.
    pub adf: Option<AdfResult>,
}

impl PairMetrics {
    fn empty() -> Self {
        Self {
            beta: 1.0,
            spread: Vec::new(),
            zscore: Vec::new(),
            correlation: Vec::new(),
            adf: None,
        }
    }

    pub fn last_spread(&self) -> Option<f64> {
        self.spread.last().copied().filter(|v| v.is_finite())
    }

    pub fn last_zscore(&self) -> Option<f64> {
        self.zscore.last().copied().flatten()
    }

    pub fn last_correlation(&self) -> Option<f64> {
        self.correlation.last().copied().flatten()
    }
}

/// Compute hedge ratio, spread, rolling z-score/correlation and the ADF test
/// for two raw tick series. Empty or fully-misaligned input yields an empty
/// result, never an error.
pub fn pair_metrics(left: &[Tick], right: &[Tick], window: usize) -> PairMetrics {
    let (series_l, series_r) = align_pair(left, right);
    if series_l.is_empty() {
        return PairMetrics::empty();
    }

    let beta = ols_hedge_ratio(&series_l, &series_r);
    let spread = spread_series(&series_l, &series_r, beta);
    let zscore = rolling_zscore(&spread, window);
    let correlation = rolling_correlation(&series_l, &series_r, window);
    let adf = adf_test(&spread);

    PairMetrics {
        beta,
        spread,
        zscore,
        correlation,
        adf,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticks(prices: &[f64]) -> Vec<Tick> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &p)| Tick::new("TEST", (i as i64) * 1_000, p, 0.0))
            .collect()
    }

    #[test]
    fn test_hedge_ratio_identity() {
        let series: Vec<f64> = (0..50).map(|i| 100.0 + (i as f64) * 0.5).collect();
        let beta = ols_hedge_ratio(&series, &series);
        assert!((beta - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_hedge_ratio_zero_independent() {
        let y: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let x = vec![0.0; 20];
        assert_eq!(ols_hedge_ratio(&y, &x), 0.0);
    }

    #[test]
    fn test_hedge_ratio_empty_is_one() {
        assert_eq!(ols_hedge_ratio(&[], &[]), 1.0);
    }

    #[test]
    fn test_hedge_ratio_known_slope() {
        let x: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&v| 2.5 * v + 7.0).collect();
        let beta = ols_hedge_ratio(&y, &x);
        assert!((beta - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_zscore_min_samples() {
        let series: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let z = rolling_zscore(&series, 50);
        for v in &z[..MIN_ROLLING_SAMPLES - 1] {
            assert!(v.is_none());
        }
        for v in &z[MIN_ROLLING_SAMPLES - 1..] {
            assert!(v.is_some());
        }
    }

    #[test]
    fn test_zscore_constant_series_undefined() {
        let series = vec![5.0; 20];
        let z = rolling_zscore(&series, 10);
        assert!(z.iter().all(|v| v.is_none()));
    }

    #[test]
    fn test_correlation_perfect() {
        let a: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let b: Vec<f64> = a.iter().map(|&v| 3.0 * v + 1.0).collect();
        let corr = rolling_correlation(&a, &b, 10);
        assert!(corr[..MIN_ROLLING_SAMPLES - 1].iter().all(|v| v.is_none()));
        let last = corr.last().unwrap().unwrap();
        assert!((last - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_grid_forward_fills_gaps() {
        let mut series = ticks(&[100.0, 101.0]);
        // 3-second gap before the final tick
        series.push(Tick::new("TEST", 5_000, 103.0, 0.0));
        let grid = price_grid_1s(&series);
        assert_eq!(grid.len(), 6);
        assert_eq!(grid[2].1, 101.0);
        assert_eq!(grid[4].1, 101.0);
        assert_eq!(grid[5].1, 103.0);
    }

    #[test]
    fn test_grid_drops_stale_outlier_timestamps() {
        // An epoch-adjacent stray next to a current tick must not densify
        // the whole gap.
        let series = vec![
            Tick::new("TEST", 0, 50.0, 0.0),
            Tick::new("TEST", 10_000_000_000, 100.0, 0.0),
        ];
        let grid = price_grid_1s(&series);
        assert!(grid.len() < 1_000_000);
        assert_eq!(grid.len(), 1);
        assert_eq!(grid[0].1, 100.0);
    }

    #[test]
    fn test_grid_keeps_full_window_span() {
        let series = vec![
            Tick::new("TEST", 0, 50.0, 0.0),
            Tick::new("TEST", (MAX_GRID_SPAN_SECS - 1) * 1_000, 100.0, 0.0),
        ];
        let grid = price_grid_1s(&series);
        assert_eq!(grid.len(), MAX_GRID_SPAN_SECS as usize);
        assert_eq!(grid[0].1, 50.0);
    }

    #[test]
    fn test_align_disjoint_ranges() {
        let left = ticks(&[100.0, 101.0]);
        let right: Vec<Tick> = (0..2)
            .map(|i| Tick::new("TEST", 100_000 + i * 1_000, 50.0, 0.0))
            .collect();
        let (a, b) = align_pair(&left, &right);
        assert!(a.is_empty());
        assert!(b.is_empty());
    }

    #[test]
    fn test_pair_metrics_empty_input() {
        let metrics = pair_metrics(&[], &[], 50);
        assert_eq!(metrics.beta, 1.0);
        assert!(metrics.spread.is_empty());
        assert!(metrics.adf.is_none());
        assert!(metrics.last_zscore().is_none());
    }

    #[test]
    fn test_pair_metrics_linked_series() {
        let left: Vec<Tick> = (0..120)
            .map(|i| {
                let wave = ((i as f64) * 0.7).sin();
                let noise = 0.05 * (((i * 13) % 7) as f64 - 3.0);
                Tick::new("L", i * 1_000, 100.0 + wave + noise, 0.0)
            })
            .collect();
        let right: Vec<Tick> = (0..120)
            .map(|i| {
                let wave = ((i as f64) * 0.7).sin();
                Tick::new("R", i * 1_000, 50.0 + 0.5 * wave, 0.0)
            })
            .collect();

        let metrics = pair_metrics(&left, &right, 50);
        assert!((metrics.beta - 2.0).abs() < 0.2);
        assert_eq!(metrics.spread.len(), 120);
        assert!(metrics.last_zscore().is_some());
        assert!(metrics.last_correlation().is_some());
        assert!(metrics.adf.is_some());
    }
}
