// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   alpha  = 2 / (period + 1)
//   EMA_t  = alpha * close_t + (1 - alpha) * EMA_{t-1}
//
// The very first EMA value is seeded with the SMA of the first `period`
// closes, so `EMA_t` at index `period - 1` equals the `period`-point SMA
// there.
// =============================================================================

use super::sma::sma;

/// Compute the EMA series for `values` with look-back `period`.
///
/// Returns a series the same length as `values`, `f64::NAN` in the first
/// `period - 1` positions. `period == 0` or `values` shorter than `period`
/// yields an all-NaN series.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let alpha = 2.0 / (period as f64 + 1.0);

    // Seed with the period-point SMA (reuses `sma` so the seed is
    // byte-identical to what a direct SMA(period) call would produce there).
    let seed = sma(values, period)[period - 1];
    out[period - 1] = seed;

    let mut prev = seed;
    for i in period..values.len() {
        let value = alpha * values[i] + (1.0 - alpha) * prev;
        out[i] = value;
        prev = value;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_for_first_period_minus_one() {
        let values: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        let out = ema(&values, 5);
        for v in &out[..4] {
            assert!(v.is_nan());
        }
        assert!(!out[4].is_nan());
    }

    #[test]
    fn seed_equals_period_point_sma() {
        let values: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        let ema_out = ema(&values, 5);
        let sma_out = sma(&values, 5);
        assert_eq!(ema_out[4], sma_out[4]);
    }

    #[test]
    fn known_values() {
        let values: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        let out = ema(&values, 5);

        let alpha = 2.0 / 6.0;
        let mut expected = 3.0; // SMA seed of [1..5]
        let mut expected_series = vec![expected];
        for &v in &values[5..] {
            expected = alpha * v + (1.0 - alpha) * expected;
            expected_series.push(expected);
        }
        for (i, e) in expected_series.iter().enumerate() {
            assert!((out[4 + i] - e).abs() < 1e-10);
        }
    }

    #[test]
    fn period_zero_is_all_nan() {
        let out = ema(&[1.0, 2.0, 3.0], 0);
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn too_short_is_all_nan() {
        let out = ema(&[1.0, 2.0], 5);
        assert!(out.iter().all(|v| v.is_nan()));
    }
}
