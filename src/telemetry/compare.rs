//! Equality checks used to suppress redundant notifications.
//!
//! Both comparators are exact: no epsilon is applied to numeric readings.

use super::{TelemetryPrimitive, TelemetryValues, TelemetryVar};

/// Compares two reads of a telemetry variable.
///
/// Equal when both are missing, or both are present with identical value sequences.
/// Metadata (name, unit, description) does not participate.
pub fn telemetry_compare(a: Option<&TelemetryVar>, b: Option<&TelemetryVar>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => values_compare(&a.value, &b.value),
        _ => false,
    }
}

/// Element-wise comparison of two value sequences. A kind change is never equal.
pub fn values_compare(a: &TelemetryValues, b: &TelemetryValues) -> bool {
    match (a, b) {
        (TelemetryValues::Numbers(a), TelemetryValues::Numbers(b)) => list_compare(a, b),
        (TelemetryValues::Bools(a), TelemetryValues::Bools(b)) => list_compare(a, b),
        _ => false,
    }
}

/// Compares two ordered sequences for equal length and pairwise equality.
pub fn list_compare<T: TelemetryPrimitive>(a: &[T], b: &[T]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.same(b))
}

/// Single-value comparison where absence is a distinct state.
pub fn option_compare<T: TelemetryPrimitive>(a: &Option<T>, b: &Option<T>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.same(b),
        _ => false,
    }
}
