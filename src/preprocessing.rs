use log::trace;

/// Arithmetic mean, 0.0 for an empty slice
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Population variance (divides by n, like numpy's default), 0.0 for an empty slice
pub fn variance(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mean = mean(data);
    data.iter()
        .map(|&x| {
            let diff = x - mean;
            diff * diff
        })
        .sum::<f64>()
        / data.len() as f64
}

pub fn std_dev(data: &[f64]) -> f64 {
    variance(data).sqrt()
}

/// `data[i] - data[i - 1]` for every i >= 1. One element shorter than the input.
pub fn first_difference(data: &[f64]) -> Vec<f64> {
    data.windows(2).map(|w| w[1] - w[0]).collect()
}

/// (min, max) of the slice, (0.0, 0.0) when empty
pub fn min_max(data: &[f64]) -> (f64, f64) {
    if data.is_empty() {
        return (0.0, 0.0);
    }
    let min = data.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let max = data.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    (min, max)
}

/// Box filter of length `window` with weights `1 / window`, returned at the input length.
///
/// Alignment follows a zero-padded "same" convolution: output `i` is the sum of
/// `data[i - window / 2 ..= i + (window - 1) / 2]` (indices outside the signal count as
/// zero) divided by `window`. Near the edges the divisor stays `window`, so the average is
/// pulled towards zero there. When the signal is shorter than the window the output is
/// still truncated to the input length.
pub fn moving_average_same(data: &[f64], window: usize) -> Vec<f64> {
    let n = data.len();
    let window = window.max(1);
    if n == 0 {
        return Vec::new();
    }

    // prefix[k] = sum of data[..k]
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    for &x in data {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + x);
    }

    let before = window / 2;
    let after = (window - 1) / 2;
    trace!(
        "moving average: {} samples, window {} ({} before, {} after)",
        n,
        window,
        before,
        after
    );

    (0..n)
        .map(|i| {
            let start = i.saturating_sub(before);
            let end = (i + after + 1).min(n);
            (prefix[end] - prefix[start]) / window as f64
        })
        .collect()
}

/// Round to the given number of decimals, ties to even
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}
