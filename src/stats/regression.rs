//! Ordinary least squares and descriptive statistics over price series.

use statrs::statistics::Statistics;

/// Result of a simple linear fit `y = intercept + slope * x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub intercept: f64,
    pub slope: f64,
}

/// Fit `y = a + b * x` by ordinary least squares.
///
/// Returns `None` when the inputs differ in length, hold fewer than two
/// points, or `x` has no variance (the slope is unidentified).
pub fn ols_fit(y: &[f64], x: &[f64]) -> Option<LinearFit> {
    let n = y.len();
    if n < 2 || x.len() != n {
        return None;
    }

    let mean_x = mean(x)?;
    let mean_y = mean(y)?;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    for (xi, yi) in x.iter().zip(y.iter()) {
        let dx = xi - mean_x;
        cov += dx * (yi - mean_y);
        var_x += dx * dx;
    }

    if !var_x.is_finite() || var_x <= f64::EPSILON * (1.0 + mean_x * mean_x) * n as f64 {
        return None;
    }

    let slope = cov / var_x;
    Some(LinearFit {
        intercept: mean_y - slope * mean_x,
        slope,
    })
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().copied().mean())
}

/// Sample standard deviation with Bessel's correction (divisor `n - 1`).
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    Some(values.iter().copied().std_dev())
}
