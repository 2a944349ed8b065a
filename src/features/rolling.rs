/// Trailing mean over the last `window` samples of `values`.
///
/// Uses whatever samples exist when fewer than `window` precede a position
/// (min_periods = 1). `NaN` samples are skipped; a window with no finite
/// samples yields `NaN`.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);

    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let (sum, count) = values[start..=i]
                .iter()
                .filter(|v| !v.is_nan())
                .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

            if count == 0 {
                f64::NAN
            } else {
                sum / count as f64
            }
        })
        .collect()
}
