//! Threshold classification for area occupancy and sensor readings.
//!
//! Both checks are pure functions over a validated band. Note the two
//! families use different boundary rules: occupancy thresholds are closed
//! (reaching the warning ratio counts as a warning), sensor bands are open
//! (a value sitting exactly on a bound is still normal).

use crate::model::{ClassificationResult, OccupancyBand, ReadingBand, Status};

/// Classifies the current visitor count of an area against its band.
///
/// `Restricted` at or above capacity, `Warning` at or above the warning
/// ratio, `Normal` otherwise.
pub fn classify_occupancy(current: u32, band: &OccupancyBand) -> ClassificationResult {
    let ratio = f64::from(current) / f64::from(band.capacity());

    let (status, reason) = if ratio >= 1.0 {
        (
            Status::Restricted,
            Some(format!("occupancy {:.2} >= capacity ({} of {})", ratio, current, band.capacity())),
        )
    } else if ratio >= band.warning_ratio() {
        (
            Status::Warning,
            Some(format!(
                "occupancy {:.2} >= warning ratio {:.2}",
                ratio,
                band.warning_ratio()
            )),
        )
    } else {
        (Status::Normal, None)
    };

    ClassificationResult {
        status,
        reason,
        ratio_or_value: ratio,
    }
}

/// Classifies a sensor value against an indicator band.
///
/// Returns `Abnormal` only when the value is strictly above the upper bound
/// or strictly below the lower bound.
pub fn classify_reading(value: f64, band: &ReadingBand) -> ClassificationResult {
    let reason = if value > band.upper() {
        Some(format!("value {} > upper bound {}", value, band.upper()))
    } else if value < band.lower() {
        Some(format!("value {} < lower bound {}", value, band.lower()))
    } else {
        None
    };

    ClassificationResult {
        status: if reason.is_some() { Status::Abnormal } else { Status::Normal },
        reason,
        ratio_or_value: value,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
