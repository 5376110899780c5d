// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free routines over fixed-length `f64` sequences. Unlike
// the teacher crate's indicator functions (`indicators/ema.rs`,
// `indicators/atr.rs`), which return `Option<f64>` for the single most
// recent value, every routine here returns a full equal-length series with
// `f64::NAN` in positions where the look-back window is not yet full —
// Fibonacci/VWAP consumers over a rolling window need the whole series, not
// just the latest point. The teacher's doc-comment density and edge-case
// enumeration style is kept; only the return shape changes.

pub mod atr;
pub mod ema;
pub mod extremes;
pub mod fibonacci;
pub mod sma;
pub mod vwap;

pub use atr::wilder_atr;
pub use ema::ema;
pub use extremes::{highest, lowest};
pub use fibonacci::fibonacci_levels;
pub use sma::sma;
pub use vwap::{rolling_vwap, vwap};
