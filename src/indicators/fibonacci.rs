// =============================================================================
// Fibonacci retracement levels over a rolling window
// =============================================================================
//
// For a `period`-wide window: H = highest(high, period), L = lowest(low,
// period), R = H - L. Levels are measured down from the high:
//   fib_382 = H - 0.382*R, fib_500 = H - 0.5*R, fib_618 = H - 0.618*R
// NaN until the window is full.
// =============================================================================

use super::extremes::{highest, lowest};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FibLevels {
    pub fib_382: f64,
    pub fib_500: f64,
    pub fib_618: f64,
}

impl FibLevels {
    pub fn is_nan(&self) -> bool {
        self.fib_382.is_nan() || self.fib_500.is_nan() || self.fib_618.is_nan()
    }
}

/// Compute the Fibonacci retracement series for `period` over `highs`/`lows`.
pub fn fibonacci_levels(highs: &[f64], lows: &[f64], period: usize) -> Vec<FibLevels> {
    let h = highest(highs, period);
    let l = lowest(lows, period);
    let n = highs.len().min(lows.len());

    (0..n)
        .map(|i| {
            let (hi, lo) = (h[i], l[i]);
            if hi.is_nan() || lo.is_nan() {
                FibLevels {
                    fib_382: f64::NAN,
                    fib_500: f64::NAN,
                    fib_618: f64::NAN,
                }
            } else {
                let range = hi - lo;
                FibLevels {
                    fib_382: hi - 0.382 * range,
                    fib_500: hi - 0.5 * range,
                    fib_618: hi - 0.618 * range,
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_until_window_full() {
        let highs = vec![10.0, 12.0, 11.0];
        let lows = vec![8.0, 9.0, 7.0];
        let levels = fibonacci_levels(&highs, &lows, 3);
        assert!(levels[0].is_nan());
        assert!(levels[1].is_nan());
        assert!(!levels[2].is_nan());
    }

    #[test]
    fn known_levels() {
        let highs = vec![10.0, 20.0, 15.0];
        let lows = vec![5.0, 8.0, 9.0];
        let levels = fibonacci_levels(&highs, &lows, 3);
        // H = 20, L = 5, R = 15
        let last = levels[2];
        assert!((last.fib_382 - (20.0 - 0.382 * 15.0)).abs() < 1e-10);
        assert!((last.fib_500 - 12.5).abs() < 1e-10);
        assert!((last.fib_618 - (20.0 - 0.618 * 15.0)).abs() < 1e-10);
    }
}
