//! Descriptive statistics over `f64` samples.
//!
//! All functions are pure and sum in slice order, so equal inputs give
//! bit-identical outputs.

use crate::domain::{MetricValue, UndefinedReason};

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample variance (n - 1 denominator), `None` below two values.
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss = values.iter().map(|x| (x - m).powi(2)).sum::<f64>();
    Some(ss / (values.len() - 1) as f64)
}

/// Sample standard deviation.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    sample_variance(values).map(f64::sqrt)
}

/// Mean as a metric.
pub fn mean_metric(values: &[f64]) -> MetricValue {
    MetricValue::from_option(mean(values), UndefinedReason::NoRecords)
}

/// Sample standard deviation as a metric.
pub fn std_dev_metric(values: &[f64]) -> MetricValue {
    if values.is_empty() {
        return MetricValue::undefined(UndefinedReason::NoRecords);
    }
    MetricValue::from_option(sample_std_dev(values), UndefinedReason::InsufficientSamples)
}

/// Pearson correlation coefficient of paired samples.
///
/// Undefined with fewer than two pairs, or when either series is constant.
pub fn pearson(pairs: &[(f64, f64)]) -> MetricValue {
    if pairs.len() < 2 {
        return MetricValue::undefined(UndefinedReason::InsufficientSamples);
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return MetricValue::undefined(UndefinedReason::ZeroVariance);
    }

    MetricValue::defined((cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0))
}
