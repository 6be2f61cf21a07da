//! Pure statistics helpers over `f64` slices.

pub fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation; zero below two observations.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Apply `f` over a trailing window that grows from one observation.
pub fn rolling<F>(values: &[f64], window: usize, f: F) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let window = window.max(1);
    (0..values.len())
        .map(|idx| {
            let start = (idx + 1).saturating_sub(window);
            f(&values[start..=idx])
        })
        .collect()
}

pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, mean_f64)
}

pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, std_dev)
}

/// Pearson correlation; `None` when either series has no variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let mean_x = mean_f64(xs);
    let mean_y = mean_f64(ys);

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }
    Some(cov / denom)
}

/// Dense descending rank starting at 1; ties share a rank.
pub fn dense_rank_desc(values: &[f64]) -> Vec<u32> {
    let mut distinct: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    distinct.sort_by(|a, b| b.total_cmp(a));
    distinct.dedup();

    values
        .iter()
        .map(|value| {
            distinct
                .iter()
                .position(|candidate| candidate == value)
                .map(|pos| pos as u32 + 1)
                .unwrap_or(0)
        })
        .collect()
}

pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std_dev_of_single_point_is_zero() {
        assert_eq!(std_dev(&[4.2]), 0.0);
        assert!((std_dev(&[1.0, 2.0, 3.0, 4.0]) - 1.2909944).abs() < 1e-6);
    }

    #[test]
    fn rolling_window_grows_then_slides() {
        let means = rolling_mean(&[1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(means, vec![1.0, 1.5, 2.5, 3.5]);
    }

    #[test]
    fn dense_rank_shares_ties() {
        assert_eq!(dense_rank_desc(&[5.0, 5.0, 3.0]), vec![1, 1, 2]);
        assert_eq!(dense_rank_desc(&[1.0, 3.0, 2.0, 3.0]), vec![3, 1, 2, 1]);
    }

    #[test]
    fn pearson_handles_constant_series() {
        assert_eq!(pearson(&[1.0, 2.0, 3.0], &[5.0, 5.0, 5.0]), None);
        let r = pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]).expect("correlated");
        assert!((r - 1.0).abs() < 1e-12);
    }
}
