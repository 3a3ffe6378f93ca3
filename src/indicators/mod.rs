// =============================================================================
// Indicator Engine
// =============================================================================
//
// Pure, side-effect-free transforms over an ascending daily-bar series.
// Short or incomplete histories never panic: series functions return an empty
// or truncated vec, point functions return `Option`/tagged results, and the
// callers decide what insufficiency means for the scan.
//
// Alignment convention: a series computed with window `W` produces its first
// value for bar index `W`, so `series[i]` belongs to `bars[W + i]`.

pub mod atr;
pub mod extremes;
pub mod overextension;
pub mod rsi;
