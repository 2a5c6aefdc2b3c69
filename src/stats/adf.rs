//! Augmented Dickey-Fuller unit-root test.
//!
//! Regression with a constant term:
//!
//! ```text
//! dy_t = c + gamma * y_{t-1} + sum_{i=1..p} phi_i * dy_{t-i} + e_t
//! ```
//!
//! The lag order `p` is chosen by AIC over `0..=max_lag`, with every
//! candidate fitted on the same sample. The chosen order is then refitted on
//! the full available sample and the t-statistic of `gamma` is converted to a
//! p-value with MacKinnon's (1994) response surface for a single series with
//! constant.

use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ContinuousCDF, Normal};

/// Above this statistic the p-value is 1.
const TAU_MAX: f64 = 2.74;
/// Below this statistic the p-value is 0.
const TAU_MIN: f64 = -18.83;
/// Switch point between the small-p and large-p polynomials.
const TAU_STAR: f64 = -1.61;
const TAU_SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038269];
const TAU_LARGE_P: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

/// Outcome of a unit-root test on one series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdfOutcome {
    /// t-statistic of the lagged-level coefficient
    pub statistic: f64,
    /// MacKinnon approximate p-value
    pub p_value: f64,
    /// Number of lagged differences in the final regression
    pub used_lag: usize,
    /// Observations in the final regression
    pub nobs: usize,
}

/// A stationarity test that maps a series to a p-value.
///
/// Small p-values reject the unit-root null, i.e. the series mean-reverts.
pub trait StationarityTest: Send + Sync {
    /// `None` when the series is too short or numerically degenerate.
    fn p_value(&self, series: &[f64]) -> Option<f64>;
}

/// ADF test with constant and AIC lag selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct AugmentedDickeyFuller {
    /// Upper bound on the lag search; `None` uses `ceil(12 * (n/100)^(1/4))`.
    pub max_lag: Option<usize>,
}

impl AugmentedDickeyFuller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_lag(max_lag: usize) -> Self {
        Self {
            max_lag: Some(max_lag),
        }
    }

    /// Run the full test.
    pub fn run(&self, series: &[f64]) -> Option<AdfOutcome> {
        let n = series.len();
        if n < 4 || series.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let schwert = (12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize;
        // Leave room for the constant, the level and at least one residual dof.
        let ceiling = (n / 2).checked_sub(2)?;
        let max_lag = self.max_lag.unwrap_or(schwert).min(ceiling);

        let diffs: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();

        let mut best: Option<(f64, usize)> = None;
        for lag in 0..=max_lag {
            let Some(fit) = fit_adf_regression(series, &diffs, lag, max_lag) else {
                continue;
            };
            let aic = fit.aic();
            match best {
                Some((best_aic, _)) if aic >= best_aic => {}
                _ => best = Some((aic, lag)),
            }
        }
        let (_, used_lag) = best?;

        let fit = fit_adf_regression(series, &diffs, used_lag, used_lag)?;
        let statistic = fit.level_t_stat()?;

        Some(AdfOutcome {
            statistic,
            p_value: mackinnon_p_value(statistic),
            used_lag,
            nobs: fit.nobs,
        })
    }
}

impl StationarityTest for AugmentedDickeyFuller {
    fn p_value(&self, series: &[f64]) -> Option<f64> {
        self.run(series).map(|outcome| outcome.p_value)
    }
}

/// MacKinnon (1994) approximate p-value for the constant-only ADF statistic.
pub fn mackinnon_p_value(statistic: f64) -> f64 {
    if statistic.is_nan() {
        return 1.0;
    }
    if statistic > TAU_MAX {
        return 1.0;
    }
    if statistic < TAU_MIN {
        return 0.0;
    }
    let poly = if statistic <= TAU_STAR {
        polyval(&TAU_SMALL_P, statistic)
    } else {
        polyval(&TAU_LARGE_P, statistic)
    };
    standard_normal_cdf(poly)
}

fn polyval(coefs: &[f64], x: f64) -> f64 {
    coefs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

fn standard_normal_cdf(x: f64) -> f64 {
    match Normal::new(0.0, 1.0) {
        Ok(normal) => normal.cdf(x),
        // Constant parameters, never hit
        Err(_) => 1.0,
    }
}

struct AdfFit {
    nobs: usize,
    k: usize,
    ssr: f64,
    level_coef: f64,
    level_var_factor: f64,
}

impl AdfFit {
    fn aic(&self) -> f64 {
        let n = self.nobs as f64;
        let llf = -n / 2.0 * ((2.0 * std::f64::consts::PI).ln() + (self.ssr / n).ln() + 1.0);
        -2.0 * llf + 2.0 * self.k as f64
    }

    fn level_t_stat(&self) -> Option<f64> {
        let dof = self.nobs.checked_sub(self.k)?;
        if dof == 0 {
            return None;
        }
        let sigma2 = self.ssr / dof as f64;
        let se = (sigma2 * self.level_var_factor).sqrt();
        let t = self.level_coef / se;
        if t.is_nan() {
            None
        } else {
            Some(t)
        }
    }
}

/// Fit the ADF regression with `lag` lagged differences on rows
/// `start..diffs.len()`; `start >= lag` lets all lag candidates share a sample.
fn fit_adf_regression(series: &[f64], diffs: &[f64], lag: usize, start: usize) -> Option<AdfFit> {
    let nobs = diffs.len().checked_sub(start)?;
    let k = lag + 2;
    if nobs <= k {
        return None;
    }

    let mut x = DMatrix::<f64>::zeros(nobs, k);
    let mut y = DVector::<f64>::zeros(nobs);
    for (row, t) in (start..diffs.len()).enumerate() {
        y[row] = diffs[t];
        x[(row, 0)] = series[t];
        for i in 1..=lag {
            x[(row, i)] = diffs[t - i];
        }
        x[(row, k - 1)] = 1.0;
    }

    let xt = x.transpose();
    let xtx_inv = (&xt * &x).try_inverse()?;
    let beta = &xtx_inv * (&xt * &y);
    let residuals = &y - &x * &beta;
    let ssr = residuals.dot(&residuals);
    if !ssr.is_finite() {
        return None;
    }

    Some(AdfFit {
        nobs,
        k,
        ssr,
        level_coef: beta[0],
        level_var_factor: xtx_inv[(0, 0)],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Deterministic pseudo-noise in [-0.5, 0.5) from a linear congruential step.
    fn noise(len: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                ((state >> 11) as f64 / (1u64 << 53) as f64) - 0.5
            })
            .collect()
    }

    fn ar1(len: usize, phi: f64, seed: u64) -> Vec<f64> {
        let eps = noise(len, seed);
        let mut out = Vec::with_capacity(len);
        let mut prev = 0.0;
        for e in eps {
            prev = phi * prev + e;
            out.push(prev);
        }
        out
    }

    fn random_walk(len: usize, seed: u64) -> Vec<f64> {
        let mut level = 100.0;
        noise(len, seed)
            .into_iter()
            .map(|e| {
                level += e;
                level
            })
            .collect()
    }

    // =========================================================================
    // MacKinnon p-value surface
    // =========================================================================

    #[test]
    fn test_mackinnon_critical_values() {
        // Asymptotic 1%, 5% and 10% critical values for the constant case.
        assert_relative_eq!(mackinnon_p_value(-3.43), 0.01, epsilon = 0.002);
        assert_relative_eq!(mackinnon_p_value(-2.86), 0.05, epsilon = 0.003);
        assert_relative_eq!(mackinnon_p_value(-2.57), 0.10, epsilon = 0.005);
    }

    #[test]
    fn test_mackinnon_bounds() {
        assert_eq!(mackinnon_p_value(3.0), 1.0);
        assert_eq!(mackinnon_p_value(-25.0), 0.0);
        assert_eq!(mackinnon_p_value(f64::NAN), 1.0);
        assert!(mackinnon_p_value(f64::NEG_INFINITY) == 0.0);
    }

    #[test]
    fn test_normal_cdf_reference_points() {
        assert_relative_eq!(standard_normal_cdf(0.0), 0.5, epsilon = 1e-12);
        assert_relative_eq!(standard_normal_cdf(1.959964), 0.975, epsilon = 1e-6);
        assert_relative_eq!(standard_normal_cdf(-1.644854), 0.05, epsilon = 1e-6);
    }

    #[test]
    fn test_mackinnon_is_monotonic() {
        let mut prev = 0.0;
        for i in 0..200 {
            let stat = -18.0 + i as f64 * 0.1;
            let p = mackinnon_p_value(stat);
            assert!(p >= prev - 1e-9, "p-value decreased at {}", stat);
            prev = p;
        }
    }

    // =========================================================================
    // Test behaviour on synthetic series
    // =========================================================================

    #[test]
    fn test_mean_reverting_series_is_significant() {
        let series = ar1(400, 0.3, 7);
        let outcome = AugmentedDickeyFuller::new().run(&series).unwrap();
        assert!(outcome.statistic < -3.5, "stat = {}", outcome.statistic);
        assert!(outcome.p_value < 0.01);
    }

    #[test]
    fn test_random_walk_is_not_significant() {
        let series = random_walk(400, 11);
        let p = AugmentedDickeyFuller::new().p_value(&series).unwrap();
        assert!(p > 0.05, "p = {}", p);
    }

    #[test]
    fn test_short_series_is_rejected() {
        assert!(AugmentedDickeyFuller::new().run(&[1.0, 2.0, 1.5]).is_none());
    }

    #[test]
    fn test_constant_series_is_degenerate() {
        assert!(AugmentedDickeyFuller::new().run(&vec![4.2; 250]).is_none());
    }

    #[test]
    fn test_non_finite_values_are_rejected() {
        let mut series = ar1(100, 0.5, 3);
        series[10] = f64::NAN;
        assert!(AugmentedDickeyFuller::new().run(&series).is_none());
    }

    #[test]
    fn test_fixed_lag_bound_is_respected() {
        let series = ar1(300, 0.5, 5);
        let outcome = AugmentedDickeyFuller::with_max_lag(2).run(&series).unwrap();
        assert!(outcome.used_lag <= 2);
        assert_eq!(outcome.nobs, series.len() - 1 - outcome.used_lag);
    }

    #[test]
    fn test_deterministic_for_same_input() {
        let series = ar1(250, 0.6, 42);
        let adf = AugmentedDickeyFuller::new();
        assert_eq!(adf.run(&series), adf.run(&series));
    }
}
