/// Core data types for the park monitoring service.
///
/// This module defines the shared domain model imported by all other modules:
/// threshold bands, measurements, classification results, and alert records.
/// Band constructors enforce their invariants so that classification itself
/// never has to deal with a malformed configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Warning ratio applied to an area whose configuration leaves it unset.
pub const DEFAULT_WARNING_RATIO: f64 = 0.8;

// ---------------------------------------------------------------------------
// Threshold bands
// ---------------------------------------------------------------------------

/// Acceptable range for an environmental indicator, e.g. pH 6.5–8.5.
///
/// Values equal to either bound are inside the band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReadingBand {
    lower: f64,
    upper: f64,
}

impl ReadingBand {
    /// Builds a band, rejecting non-finite bounds and `lower > upper`.
    pub fn new(lower: f64, upper: f64) -> Result<Self, MonitorError> {
        if !lower.is_finite() || !upper.is_finite() || lower > upper {
            return Err(MonitorError::InvalidBand { lower, upper });
        }
        Ok(Self { lower, upper })
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }
}

/// Daily capacity of an area and the occupancy ratio at which it enters
/// the warning state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OccupancyBand {
    capacity: u32,
    warning_ratio: f64,
}

impl OccupancyBand {
    /// Builds a band. `capacity` must be positive and `warning_ratio` must
    /// lie in `(0, 1]`.
    pub fn new(capacity: i64, warning_ratio: f64) -> Result<Self, MonitorError> {
        if capacity <= 0 || capacity > i64::from(u32::MAX) {
            return Err(MonitorError::InvalidCapacity(capacity));
        }
        if !(warning_ratio > 0.0 && warning_ratio <= 1.0) {
            return Err(MonitorError::InvalidWarningRatio(warning_ratio));
        }
        Ok(Self {
            capacity: capacity as u32,
            warning_ratio,
        })
    }

    /// Same as [`OccupancyBand::new`] with [`DEFAULT_WARNING_RATIO`].
    pub fn with_default_ratio(capacity: i64) -> Result<Self, MonitorError> {
        Self::new(capacity, DEFAULT_WARNING_RATIO)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn warning_ratio(&self) -> f64 {
        self.warning_ratio
    }
}

// ---------------------------------------------------------------------------
// Measurements and classification
// ---------------------------------------------------------------------------

/// A single observed value for a subject (area or device).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub subject_id: String,
    pub value: f64,
    pub observed_at: DateTime<Utc>,
}

impl Measurement {
    pub fn new(subject_id: impl Into<String>, value: f64, observed_at: DateTime<Utc>) -> Self {
        Self {
            subject_id: subject_id.into(),
            value,
            observed_at,
        }
    }
}

/// Classification labels, in ascending order of severity for each family.
///
/// `Warning` and `Restricted` come from occupancy checks, `Abnormal` from
/// sensor readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Normal,
    Warning,
    Restricted,
    Abnormal,
}

impl Status {
    /// True for every status that should be considered for an alert.
    pub fn is_alerting(&self) -> bool {
        !matches!(self, Status::Normal)
    }

    /// Label as stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Normal => "normal",
            Status::Warning => "warning",
            Status::Restricted => "restricted",
            Status::Abnormal => "abnormal",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of comparing a measurement with its band. Derived on demand,
/// never stored on its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub status: Status,
    pub reason: Option<String>,
    /// Occupancy ratio for area checks, the raw value for sensor readings.
    pub ratio_or_value: f64,
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// A device reported a value outside its indicator's band.
    DataAbnormal,
    /// A device moved into the fault state.
    DeviceFault,
    /// An area reached its warning ratio or capacity.
    AreaOccupancy,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::DataAbnormal => "data_abnormal",
            AlertKind::DeviceFault => "device_fault",
            AlertKind::AreaOccupancy => "area_occupancy",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies a class of recurring alert, e.g. "device D001's indicator I002
/// is out of range" as opposed to "device D001 is faulted".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertKey {
    pub subject_id: String,
    pub secondary_id: Option<String>,
    pub kind: AlertKind,
}

impl AlertKey {
    pub fn new(kind: AlertKind, subject_id: impl Into<String>, secondary_id: Option<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            secondary_id,
            kind,
        }
    }

    pub fn data_abnormal(device_id: &str, indicator_id: &str) -> Self {
        Self::new(AlertKind::DataAbnormal, device_id, Some(indicator_id.to_string()))
    }

    pub fn device_fault(device_id: &str) -> Self {
        Self::new(AlertKind::DeviceFault, device_id, None)
    }

    pub fn area_occupancy(area_id: &str) -> Self {
        Self::new(AlertKind::AreaOccupancy, area_id, None)
    }
}

/// Renders as `<kind>_<subject>[_<secondary>]`, e.g. `data_abnormal_D001_I002`.
impl fmt::Display for AlertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind, self.subject_id)?;
        if let Some(secondary) = &self.secondary_id {
            write!(f, "_{}", secondary)?;
        }
        Ok(())
    }
}

/// One raised alert. Only `handled` ever changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRecord {
    pub key: AlertKey,
    pub raised_at: DateTime<Utc>,
    pub message: String,
    pub handled: bool,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised by configuration loading and measurement ingestion.
#[derive(Debug, PartialEq)]
pub enum MonitorError {
    /// Area capacity was zero, negative, or out of range.
    InvalidCapacity(i64),
    /// Warning ratio outside `(0, 1]`.
    InvalidWarningRatio(f64),
    /// Indicator band with `lower > upper` or a non-finite bound.
    InvalidBand { lower: f64, upper: f64 },
    /// The measurement cannot be classified (non-finite value, wrong subject).
    InvalidMeasurement(String),
    UnknownArea(String),
    UnknownDevice(String),
    UnknownIndicator(String),
    /// The same id appears twice in one registry table.
    DuplicateId(String),
    /// The configuration file could not be read.
    ConfigIo(String),
    /// The configuration file is not valid TOML for `MonitorConfig`.
    ConfigParse(String),
    /// A `[debounce]` setting outside its accepted range.
    InvalidDebounce(String),
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorError::InvalidCapacity(capacity) => {
                write!(f, "Invalid capacity: {} (must be > 0)", capacity)
            }
            MonitorError::InvalidWarningRatio(ratio) => {
                write!(f, "Invalid warning ratio: {} (must be in (0, 1])", ratio)
            }
            MonitorError::InvalidBand { lower, upper } => {
                write!(f, "Invalid band: lower {} > upper {}", lower, upper)
            }
            MonitorError::InvalidMeasurement(msg) => write!(f, "Invalid measurement: {}", msg),
            MonitorError::UnknownArea(id) => write!(f, "Unknown area: {}", id),
            MonitorError::UnknownDevice(id) => write!(f, "Unknown device: {}", id),
            MonitorError::UnknownIndicator(id) => write!(f, "Unknown indicator: {}", id),
            MonitorError::DuplicateId(id) => write!(f, "Duplicate id: {}", id),
            MonitorError::ConfigIo(msg) => write!(f, "Config read error: {}", msg),
            MonitorError::ConfigParse(msg) => write!(f, "Config parse error: {}", msg),
            MonitorError::InvalidDebounce(msg) => write!(f, "Invalid debounce setting: {}", msg),
        }
    }
}

impl std::error::Error for MonitorError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_band_rejects_inverted_bounds() {
        assert_eq!(
            ReadingBand::new(8.5, 6.5),
            Err(MonitorError::InvalidBand { lower: 8.5, upper: 6.5 })
        );
    }

    #[test]
    fn test_reading_band_allows_degenerate_range() {
        let band = ReadingBand::new(7.0, 7.0).expect("lower == upper is a valid band");
        assert_eq!(band.lower(), band.upper());
    }

    #[test]
    fn test_reading_band_rejects_nan() {
        assert!(ReadingBand::new(f64::NAN, 1.0).is_err());
        assert!(ReadingBand::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_occupancy_band_rejects_non_positive_capacity() {
        assert_eq!(OccupancyBand::new(0, 0.8), Err(MonitorError::InvalidCapacity(0)));
        assert_eq!(OccupancyBand::new(-5, 0.8), Err(MonitorError::InvalidCapacity(-5)));
    }

    #[test]
    fn test_occupancy_band_warning_ratio_bounds() {
        assert!(OccupancyBand::new(100, 0.0).is_err(), "0 is excluded");
        assert!(OccupancyBand::new(100, 1.0).is_ok(), "1 is included");
        assert!(OccupancyBand::new(100, 1.01).is_err());
        assert!(OccupancyBand::new(100, f64::NAN).is_err());
    }

    #[test]
    fn test_default_ratio_is_point_eight() {
        let band = OccupancyBand::with_default_ratio(500).unwrap();
        assert_eq!(band.warning_ratio(), 0.8);
        assert_eq!(band.capacity(), 500);
    }

    #[test]
    fn test_alert_key_display_matches_stored_key_format() {
        assert_eq!(AlertKey::data_abnormal("D001", "I002").to_string(), "data_abnormal_D001_I002");
        assert_eq!(AlertKey::device_fault("D001").to_string(), "device_fault_D001");
        assert_eq!(AlertKey::area_occupancy("A001").to_string(), "area_occupancy_A001");
    }

    #[test]
    fn test_status_labels_and_alerting() {
        assert_eq!(Status::Restricted.to_string(), "restricted");
        assert!(!Status::Normal.is_alerting());
        assert!(Status::Warning.is_alerting());
        assert!(Status::Abnormal.is_alerting());
    }

    #[test]
    fn test_error_display() {
        let err = MonitorError::UnknownDevice("D404".to_string());
        assert_eq!(err.to_string(), "Unknown device: D404");

        let err = MonitorError::InvalidDebounce("list_limit must be at least 1".to_string());
        assert_eq!(err.to_string(), "Invalid debounce setting: list_limit must be at least 1");
    }
}
