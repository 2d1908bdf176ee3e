//! Closed-form statistics over consumption series. No ML, no state.

/// Arithmetic mean. Returns `None` for an empty series.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n − 1 denominator). Returns `None` with
/// fewer than two observations.
pub fn sample_stdev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Standard score of `value` against the series. `None` when the series is
/// too short or has zero dispersion.
pub fn z_score(value: f64, values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let sd = sample_stdev(values)?;
    if sd == 0.0 {
        return None;
    }
    Some((value - m) / sd)
}

/// Ordinary least-squares slope over a chronologically ordered series,
/// with the observation index as the independent variable.
pub fn ols_slope(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(values)?;

    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}
