// =============================================================================
// Average True Range (ATR) — Wilder's Smoothing Method
// =============================================================================
//
// ATR measures market volatility by decomposing the entire range of a bar.
//
// True Range (TR) for each bar:
//   TR_t = max(high_t - low_t, |high_t - close_{t-1}|, |low_t - close_{t-1}|)
//
// ATR is the Wilder-smoothed average of TR:
//   ATR seed (index period) = mean of the first `period` true ranges
//   ATR_t = ((period - 1) * ATR_{t-1} + TR_t) / period
//
// Unlike the teacher crate's `calculate_atr`, which consumes `Candle`
// structs and returns only the single latest value, this returns the full
// NaN-padded series over parallel `highs`/`lows`/`closes` slices.
// =============================================================================

/// Compute the Wilder ATR series for `period` over parallel OHLC slices.
///
/// `TR_0` has no previous close, so the first defined ATR value lands at
/// index `period` (not `period - 1`, since a window of `period` true ranges
/// needs `period + 1` bars). All earlier positions are `f64::NAN`.
pub fn wilder_atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let n = highs.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period + 1 || lows.len() != n || closes.len() != n {
        return out;
    }

    // True range for i in 1..n (TR_i depends on close_{i-1}).
    let mut tr = vec![0.0; n];
    for i in 1..n {
        let hl = highs[i] - lows[i];
        let hc = (highs[i] - closes[i - 1]).abs();
        let lc = (lows[i] - closes[i - 1]).abs();
        tr[i] = hl.max(hc).max(lc);
    }

    // Seed: mean of TR[1..=period].
    let seed: f64 = tr[1..=period].iter().sum::<f64>() / period as f64;
    out[period] = seed;

    let mut prev = seed;
    for i in (period + 1)..n {
        let atr = ((period as f64 - 1.0) * prev + tr[i]) / period as f64;
        out[i] = atr;
        prev = atr;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ohlc(n: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let mut highs = Vec::with_capacity(n);
        let mut lows = Vec::with_capacity(n);
        let mut closes = Vec::with_capacity(n);
        for i in 0..n {
            let base = 100.0 + i as f64 * 0.1;
            highs.push(base + 5.0);
            lows.push(base - 5.0);
            closes.push(base);
        }
        (highs, lows, closes)
    }

    #[test]
    fn nan_before_seed_index() {
        let (h, l, c) = ohlc(20);
        let out = wilder_atr(&h, &l, &c, 5);
        for v in &out[..5] {
            assert!(v.is_nan());
        }
        assert!(!out[5].is_nan());
    }

    #[test]
    fn converges_to_constant_range() {
        let (h, l, c) = ohlc(40);
        let out = wilder_atr(&h, &l, &c, 14);
        let last = *out.last().unwrap();
        assert!((last - 10.0).abs() < 1.0, "expected ~10.0, got {last}");
    }

    #[test]
    fn period_zero_is_all_nan() {
        let (h, l, c) = ohlc(10);
        let out = wilder_atr(&h, &l, &c, 0);
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn insufficient_data_is_all_nan() {
        let (h, l, c) = ohlc(5);
        let out = wilder_atr(&h, &l, &c, 14);
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn gap_reflected_in_true_range() {
        let highs = vec![105.0, 115.0, 118.0, 120.0];
        let lows = vec![95.0, 108.0, 110.0, 113.0];
        let closes = vec![95.0, 112.0, 115.0, 118.0];
        let out = wilder_atr(&highs, &lows, &closes, 3);
        assert!(out[3] > 7.0, "expected ATR to reflect the gap, got {}", out[3]);
    }
}
