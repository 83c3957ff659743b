//! Small numeric helpers shared by the metric engine and anomaly detector.
//!
//! Every function resolves empty or degenerate input to `None` instead of
//! producing `NaN` or panicking.

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n − 1 denominator).
///
/// `None` when fewer than two values are available.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let sum_sq: f64 = values.iter().map(|&x| (x - m).powi(2)).sum();
    Some((sum_sq / (values.len() as f64 - 1.0)).sqrt())
}

/// Key of the largest value; ties go to the first key in iteration order.
pub fn argmax<K: Copy>(pairs: impl IntoIterator<Item = (K, f64)>) -> Option<K> {
    let mut best: Option<(K, f64)> = None;
    for (key, value) in pairs {
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((key, value)),
        }
    }
    best.map(|(key, _)| key)
}
