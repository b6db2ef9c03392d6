//! Flag evaluation for a single lab value.

use crate::constants::CRITICAL_RANGE_FRACTION;
use clinicalflow_types::Flag;

/// Classifies `value` against an optional reference range.
///
/// With either bound absent the result is [`Flag::Normal`]. Otherwise the panic thresholds
/// sit half a range width beyond each bound:
///
/// ```text
/// range         = max - min
/// critical_low  = min - 0.5 * range
/// critical_high = max + 0.5 * range
/// ```
///
/// A value strictly outside the panic thresholds is [`Flag::Critical`], then strictly below
/// `min` is [`Flag::Low`], strictly above `max` is [`Flag::High`], and anything else is
/// [`Flag::Normal`]. Bounds are inclusive for the normal band.
///
/// When `min == max` both thresholds collapse onto that point: the point itself is normal and
/// any deviation is critical.
///
/// Pure and total; callers validate that inputs are finite and that `min <= max`.
pub fn evaluate(value: f64, reference_min: Option<f64>, reference_max: Option<f64>) -> Flag {
    let (Some(min), Some(max)) = (reference_min, reference_max) else {
        return Flag::Normal;
    };

    let range = max - min;
    let critical_low = min - CRITICAL_RANGE_FRACTION * range;
    let critical_high = max + CRITICAL_RANGE_FRACTION * range;

    if value < critical_low || value > critical_high {
        Flag::Critical
    } else if value < min {
        Flag::Low
    } else if value > max {
        Flag::High
    } else {
        Flag::Normal
    }
}
