// =============================================================================
// Volume-Weighted Average Price (VWAP)
// =============================================================================
//
// typ_t = (high_t + low_t + close_t) / 3
// Running/session VWAP: cumulative sum(typ * vol) / cumulative sum(vol).
// Rolling-window VWAP: both sums span the same `period`-wide window only.
// =============================================================================

/// Cumulative (session) VWAP series: both sums run from index 0.
pub fn vwap(highs: &[f64], lows: &[f64], closes: &[f64], volumes: &[f64]) -> Vec<f64> {
    let n = highs.len();
    let mut out = vec![f64::NAN; n];
    let mut cum_pv = 0.0;
    let mut cum_vol = 0.0;
    for i in 0..n {
        let typical = (highs[i] + lows[i] + closes[i]) / 3.0;
        cum_pv += typical * volumes[i];
        cum_vol += volumes[i];
        out[i] = if cum_vol > 0.0 {
            cum_pv / cum_vol
        } else {
            f64::NAN
        };
    }
    out
}

/// Rolling `period`-wide VWAP: both sums span only the trailing window,
/// NaN until the window is full.
pub fn rolling_vwap(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    volumes: &[f64],
    period: usize,
) -> Vec<f64> {
    let n = highs.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period {
        return out;
    }
    for i in (period - 1)..n {
        let start = i + 1 - period;
        let mut pv = 0.0;
        let mut vol = 0.0;
        for j in start..=i {
            let typical = (highs[j] + lows[j] + closes[j]) / 3.0;
            pv += typical * volumes[j];
            vol += volumes[j];
        }
        out[i] = if vol > 0.0 { pv / vol } else { f64::NAN };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cumulative_vwap_known_values() {
        let highs = vec![10.0, 12.0];
        let lows = vec![8.0, 10.0];
        let closes = vec![9.0, 11.0];
        let volumes = vec![2.0, 3.0];

        let out = vwap(&highs, &lows, &closes, &volumes);
        let typ0 = (10.0 + 8.0 + 9.0) / 3.0;
        assert!((out[0] - typ0).abs() < 1e-10);

        let typ1 = (12.0 + 10.0 + 11.0) / 3.0;
        let expected1 = (typ0 * 2.0 + typ1 * 3.0) / 5.0;
        assert!((out[1] - expected1).abs() < 1e-10);
    }

    #[test]
    fn rolling_vwap_nan_until_full() {
        let highs = vec![10.0, 12.0, 11.0];
        let lows = vec![8.0, 10.0, 9.0];
        let closes = vec![9.0, 11.0, 10.0];
        let volumes = vec![1.0, 1.0, 1.0];
        let out = rolling_vwap(&highs, &lows, &closes, &volumes, 3);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert!(!out[2].is_nan());
    }

    #[test]
    fn zero_volume_is_nan() {
        let highs = vec![10.0];
        let lows = vec![8.0];
        let closes = vec![9.0];
        let volumes = vec![0.0];
        let out = vwap(&highs, &lows, &closes, &volumes);
        assert!(out[0].is_nan());
    }
}
