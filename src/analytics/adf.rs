//! Augmented Dickey-Fuller stationarity test for the spread series.
//!
//! Regression with constant, lag order chosen by AIC over a common sample,
//! as in the usual `adfuller` formulation. P-values come from interpolating
//! the asymptotic tau distribution for the constant-only case, which is
//! adequate for a best-effort mean-reversion check.

#[derive(Debug, Clone)]
pub struct AdfResult {
    /// t-statistic on the lagged level term.
    pub statistic: f64,
    /// Approximate p-value, clamped to [0.001, 0.999].
    pub p_value: f64,
    /// Number of lagged difference terms in the chosen regression.
    pub used_lag: usize,
    /// Observations used in the final regression.
    pub n_obs: usize,
    /// Critical values at the standard confidence levels.
    pub critical_values: [(&'static str, f64); 3],
}

const CRITICAL_VALUES: [(&'static str, f64); 3] =
    [("1%", -3.43), ("5%", -2.86), ("10%", -2.57)];

/// Asymptotic quantiles of the Dickey-Fuller tau distribution (constant case).
const TAU_TABLE: [(f64, f64); 11] = [
    (-5.00, 0.001),
    (-3.43, 0.010),
    (-3.12, 0.025),
    (-2.86, 0.050),
    (-2.57, 0.100),
    (-1.57, 0.500),
    (-0.44, 0.900),
    (-0.07, 0.950),
    (0.23, 0.975),
    (0.60, 0.990),
    (1.50, 0.999),
];

/// Run the ADF test on `series`. Returns `None` when fewer than 10 finite
/// observations are available or the regression is degenerate; never an error.
pub fn adf_test(series: &[f64]) -> Option<AdfResult> {
    let y: Vec<f64> = series.iter().copied().filter(|v| v.is_finite()).collect();
    let n = y.len();
    if n < 10 {
        return None;
    }

    // First differences: d[i] = y[i+1] - y[i]
    let diffs: Vec<f64> = y.windows(2).map(|w| w[1] - w[0]).collect();

    // Schwert rule, capped so every candidate regression stays overdetermined.
    let schwert = (12.0 * (n as f64 / 100.0).powf(0.25)).floor() as usize;
    let max_lag = schwert.min((n.saturating_sub(6)) / 2);

    // Pick the lag by AIC over the common sample, then refit on the full one.
    let mut best: Option<(f64, usize)> = None;
    for lag in 0..=max_lag {
        if let Some(fit) = fit_adf(&y, &diffs, lag, max_lag) {
            let aic = fit.aic();
            if best.map_or(true, |(best_aic, _)| aic < best_aic) {
                best = Some((aic, lag));
            }
        }
    }
    let (_, used_lag) = best?;
    let fit = fit_adf(&y, &diffs, used_lag, used_lag)?;

    let statistic = fit.t_stat?;
    Some(AdfResult {
        statistic,
        p_value: interpolate_p(statistic),
        used_lag,
        n_obs: fit.n_obs,
        critical_values: CRITICAL_VALUES,
    })
}

struct AdfFit {
    ssr: f64,
    n_obs: usize,
    n_params: usize,
    t_stat: Option<f64>,
}

impl AdfFit {
    fn aic(&self) -> f64 {
        let nf = self.n_obs as f64;
        nf * (self.ssr / nf).ln() + 2.0 * self.n_params as f64
    }
}

/// OLS of d[t] on [y[t], d[t-1]..d[t-lag], 1] for t in start_lag..diffs.len().
fn fit_adf(y: &[f64], diffs: &[f64], lag: usize, start_lag: usize) -> Option<AdfFit> {
    let n_params = lag + 2;
    let rows = diffs.len().checked_sub(start_lag)?;
    if rows <= n_params {
        return None;
    }

    let mut xtx = vec![vec![0.0; n_params]; n_params];
    let mut xty = vec![0.0; n_params];
    let mut yty = 0.0;

    let mut row = vec![0.0; n_params];
    for t in start_lag..diffs.len() {
        row[0] = y[t];
        for j in 0..lag {
            row[1 + j] = diffs[t - 1 - j];
        }
        row[n_params - 1] = 1.0;

        let dep = diffs[t];
        yty += dep * dep;
        for i in 0..n_params {
            xty[i] += row[i] * dep;
            for j in i..n_params {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }
    for i in 0..n_params {
        for j in 0..i {
            xtx[i][j] = xtx[j][i];
        }
    }

    let beta = solve(&xtx, &xty)?;
    let explained: f64 = beta.iter().zip(xty.iter()).map(|(b, v)| b * v).sum();
    let ssr = (yty - explained).max(0.0);

    let dof = rows - n_params;
    let t_stat = if dof > 0 && ssr > 0.0 {
        let sigma2 = ssr / dof as f64;
        // Diagonal of the inverse via solving against the unit vector.
        let mut e0 = vec![0.0; n_params];
        e0[0] = 1.0;
        let inv_col = solve(&xtx, &e0)?;
        let var0 = sigma2 * inv_col[0];
        (var0 > 0.0).then(|| beta[0] / var0.sqrt())
    } else {
        None
    };

    Some(AdfFit {
        ssr,
        n_obs: rows,
        n_params,
        t_stat,
    })
}

/// Gaussian elimination with partial pivoting. Returns `None` for singular
/// systems (constant spread, collinear lags).
fn solve(matrix: &[Vec<f64>], rhs: &[f64]) -> Option<Vec<f64>> {
    let n = rhs.len();
    let mut a: Vec<Vec<f64>> = matrix.iter().map(|r| r.clone()).collect();
    let mut b = rhs.to_vec();

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| {
            a[i][col].abs().partial_cmp(&a[j][col].abs()).unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut sum = b[row];
        for k in (row + 1)..n {
            sum -= a[row][k] * x[k];
        }
        x[row] = sum / a[row][row];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}

fn interpolate_p(statistic: f64) -> f64 {
    let first = TAU_TABLE[0];
    let last = TAU_TABLE[TAU_TABLE.len() - 1];
    if statistic <= first.0 {
        return first.1;
    }
    if statistic >= last.0 {
        return last.1;
    }
    for pair in TAU_TABLE.windows(2) {
        let (s0, p0) = pair[0];
        let (s1, p1) = pair[1];
        if statistic <= s1 {
            let frac = (statistic - s0) / (s1 - s0);
            return p0 + frac * (p1 - p0);
        }
    }
    last.1
}
