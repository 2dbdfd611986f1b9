//! Environmental sensor ingestion.
//!
//! Covers the call sites that feed the alert store:
//! - `upload_reading` for a freshly reported device value,
//! - `adjust_reading` when an operator corrects a stored value,
//! - `recalculate_abnormal` / `recalculate_all_abnormal` after bands change,
//! - `update_device_status` and `clear_alert` for fault alerts,
//! - `visible_alerts` for the operator listing.
//!
//! Data alerts are only raised for devices operating normally; a faulted or
//! offline device already has an operator's attention and its readings are
//! not trusted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::AddAssign;

use crate::alert::debounce::{AlertDebouncer, AlertFilter};
use crate::alert::thresholds::classify_reading;
use crate::logging::{self, Subsystem};
use crate::model::{
    AlertKey, AlertKind, AlertRecord, ClassificationResult, Measurement, MonitorError, ReadingBand,
};

// ---------------------------------------------------------------------------
// Registry types
// ---------------------------------------------------------------------------

/// A monitored environmental indicator and its acceptable range.
#[derive(Debug, Clone, PartialEq)]
pub struct Indicator {
    pub indicator_id: String,
    pub name: String,
    pub unit: String,
    pub band: ReadingBand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Normal,
    Fault,
    Offline,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStatus::Normal => write!(f, "normal"),
            DeviceStatus::Fault => write!(f, "fault"),
            DeviceStatus::Offline => write!(f, "offline"),
        }
    }
}

/// A field monitoring device.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub device_id: String,
    pub device_type: String,
    pub region_id: String,
    pub status: DeviceStatus,
}

// ---------------------------------------------------------------------------
// Reading upload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingOutcome {
    pub device_id: String,
    pub indicator_id: String,
    pub classification: ClassificationResult,
    /// Newly raised alert, if the reading produced one.
    pub alert: Option<AlertRecord>,
}

impl ReadingOutcome {
    pub fn is_abnormal(&self) -> bool {
        self.classification.status.is_alerting()
    }
}

/// Classifies a device reading and raises or clears the matching
/// `data_abnormal` alert.
///
/// The measurement's subject must be the device, and its value must be
/// finite.
pub fn upload_reading(
    device: &Device,
    indicator: &Indicator,
    measurement: &Measurement,
    alerts: &AlertDebouncer,
    now: DateTime<Utc>,
) -> Result<ReadingOutcome, MonitorError> {
    if measurement.subject_id != device.device_id {
        return Err(MonitorError::InvalidMeasurement(format!(
            "reading from '{}' submitted for device '{}'",
            measurement.subject_id, device.device_id
        )));
    }
    if !measurement.value.is_finite() {
        return Err(MonitorError::InvalidMeasurement(format!(
            "non-finite value {} from device '{}'",
            measurement.value, device.device_id
        )));
    }

    let classification = classify_reading(measurement.value, &indicator.band);
    logging::log_classification(Subsystem::Environment, &device.device_id, &classification);

    let alert = raise_or_clear(device, indicator, &classification, alerts, now);

    Ok(ReadingOutcome {
        device_id: device.device_id.clone(),
        indicator_id: indicator.indicator_id.clone(),
        classification,
        alert,
    })
}

fn raise_or_clear(
    device: &Device,
    indicator: &Indicator,
    classification: &ClassificationResult,
    alerts: &AlertDebouncer,
    now: DateTime<Utc>,
) -> Option<AlertRecord> {
    let key = AlertKey::data_abnormal(&device.device_id, &indicator.indicator_id);

    match &classification.reason {
        Some(reason) if classification.status.is_alerting() => {
            if device.status != DeviceStatus::Normal {
                logging::debug(
                    Subsystem::Environment,
                    Some(&device.device_id),
                    &format!("device is {}, not alerting on abnormal data", device.status),
                );
                return None;
            }
            let message = format!(
                "device {} indicator {} abnormal: {}",
                device.device_id, indicator.name, reason
            );
            alerts.try_raise(key, message, now, alerts.window())
        }
        _ => {
            alerts.acknowledge(&key);
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Bulk recalculation
// ---------------------------------------------------------------------------

/// A persisted environment reading together with its stored abnormal flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReading {
    pub data_id: String,
    pub device_id: String,
    pub indicator_id: String,
    pub value: f64,
    pub observed_at: DateTime<Utc>,
    pub is_abnormal: bool,
    pub abnormal_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecalcSummary {
    /// Readings of the indicator that were re-evaluated.
    pub evaluated: usize,
    /// Readings now abnormal, plus readings that went from abnormal to normal.
    pub affected: usize,
    /// Readings whose abnormal flag flipped.
    pub changed: usize,
    pub alerts_raised: usize,
}

impl AddAssign for RecalcSummary {
    fn add_assign(&mut self, other: Self) {
        self.evaluated += other.evaluated;
        self.affected += other.affected;
        self.changed += other.changed;
        self.alerts_raised += other.alerts_raised;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingAdjustment {
    pub data_id: String,
    pub old_value: f64,
    pub new_value: f64,
    pub was_abnormal: bool,
    pub is_abnormal: bool,
    /// Records acknowledged because the reading went back in band.
    pub acknowledged: usize,
}

/// Replaces a stored reading's value and re-checks it against `indicator`.
///
/// A reading that moves from abnormal to normal acknowledges its
/// `data_abnormal` alert. Corrections never raise new alerts.
pub fn adjust_reading(
    reading: &mut StoredReading,
    new_value: f64,
    indicator: &Indicator,
    alerts: &AlertDebouncer,
) -> Result<ReadingAdjustment, MonitorError> {
    if reading.indicator_id != indicator.indicator_id {
        return Err(MonitorError::InvalidMeasurement(format!(
            "reading {} belongs to indicator '{}', not '{}'",
            reading.data_id, reading.indicator_id, indicator.indicator_id
        )));
    }
    if !new_value.is_finite() {
        return Err(MonitorError::InvalidMeasurement(format!(
            "non-finite value {} for reading {}",
            new_value, reading.data_id
        )));
    }

    let old_value = reading.value;
    let was_abnormal = reading.is_abnormal;
    let classification = classify_reading(new_value, &indicator.band);

    reading.value = new_value;
    reading.is_abnormal = classification.status.is_alerting();
    reading.abnormal_reason = classification.reason;

    let acknowledged = if was_abnormal && !reading.is_abnormal {
        alerts.acknowledge(&AlertKey::data_abnormal(&reading.device_id, &indicator.indicator_id))
    } else {
        0
    };

    logging::info(
        Subsystem::Environment,
        Some(&reading.data_id),
        &format!(
            "value {} -> {}, abnormal {} -> {}",
            old_value, new_value, was_abnormal, reading.is_abnormal
        ),
    );

    Ok(ReadingAdjustment {
        data_id: reading.data_id.clone(),
        old_value,
        new_value,
        was_abnormal,
        is_abnormal: reading.is_abnormal,
        acknowledged,
    })
}

/// Re-evaluates every stored reading of `indicator` against its current band,
/// rewriting `is_abnormal`/`abnormal_reason` in place.
///
/// Readings of other indicators are left untouched. Readings whose device is
/// unknown are re-flagged but never alert.
pub fn recalculate_abnormal(
    readings: &mut [StoredReading],
    indicator: &Indicator,
    devices: &[Device],
    alerts: &AlertDebouncer,
    now: DateTime<Utc>,
) -> RecalcSummary {
    let mut summary = RecalcSummary::default();

    for reading in readings.iter_mut().filter(|r| r.indicator_id == indicator.indicator_id) {
        summary.evaluated += 1;
        let was_abnormal = reading.is_abnormal;
        let classification = classify_reading(reading.value, &indicator.band);

        reading.is_abnormal = classification.status.is_alerting();
        reading.abnormal_reason = classification.reason.clone();

        if reading.is_abnormal || was_abnormal {
            summary.affected += 1;
        }
        if reading.is_abnormal != was_abnormal {
            summary.changed += 1;
            logging::info(
                Subsystem::Environment,
                Some(&reading.data_id),
                &format!("abnormal flag {} -> {}", was_abnormal, reading.is_abnormal),
            );
        }

        // stored normal rows never acknowledge live alerts
        if reading.is_abnormal {
            if let Some(device) = devices.iter().find(|d| d.device_id == reading.device_id) {
                if raise_or_clear(device, indicator, &classification, alerts, now).is_some() {
                    summary.alerts_raised += 1;
                }
            }
        }
    }

    logging::log_recalculation_summary(
        &indicator.indicator_id,
        summary.evaluated,
        summary.affected,
        summary.changed,
    );
    summary
}

/// Runs [`recalculate_abnormal`] for every indicator. Readings whose
/// indicator is not listed are left untouched.
pub fn recalculate_all_abnormal(
    readings: &mut [StoredReading],
    indicators: &[Indicator],
    devices: &[Device],
    alerts: &AlertDebouncer,
    now: DateTime<Utc>,
) -> RecalcSummary {
    let mut total = RecalcSummary::default();
    for indicator in indicators {
        total += recalculate_abnormal(readings, indicator, devices, alerts, now);
    }
    total
}

// ---------------------------------------------------------------------------
// Device status
// ---------------------------------------------------------------------------

/// Applies a status change to `device`.
///
/// Entering `Fault` raises a `device_fault` alert; leaving `Fault` for
/// `Normal` acknowledges it. Returns the newly raised alert, if any.
pub fn update_device_status(
    device: &mut Device,
    status: DeviceStatus,
    alerts: &AlertDebouncer,
    now: DateTime<Utc>,
) -> Option<AlertRecord> {
    let old = device.status;
    device.status = status;
    let key = AlertKey::device_fault(&device.device_id);

    if old != status {
        logging::info(
            Subsystem::Environment,
            Some(&device.device_id),
            &format!("status {} -> {}", old, status),
        );
    }

    match (old, status) {
        (DeviceStatus::Fault, DeviceStatus::Fault) => None,
        (_, DeviceStatus::Fault) => {
            let message = format!(
                "device {} ({}) in region {} reported a fault",
                device.device_id, device.device_type, device.region_id
            );
            alerts.try_raise(key, message, now, alerts.window())
        }
        (DeviceStatus::Fault, DeviceStatus::Normal) => {
            alerts.acknowledge(&key);
            None
        }
        _ => None,
    }
}

/// Operator "clear" on one alert key.
///
/// Clearing a `device_fault_<id>` key also returns that device to
/// `Normal`. Returns `None` when no alert is stored under `key_name`.
pub fn clear_alert(
    key_name: &str,
    devices: &mut [Device],
    alerts: &AlertDebouncer,
    now: DateTime<Utc>,
) -> Option<usize> {
    let acknowledged = alerts.acknowledge_by_name(key_name);
    if let Some(device_id) = key_name.strip_prefix("device_fault_") {
        if let Some(device) = devices.iter_mut().find(|d| d.device_id == device_id) {
            update_device_status(device, DeviceStatus::Normal, alerts, now);
        }
    }
    acknowledged
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// Active alerts as shown to operators: data alerts from devices that are
/// not operating normally are hidden. The filter's limit applies after
/// hiding.
pub fn visible_alerts(
    alerts: &AlertDebouncer,
    devices: &[Device],
    now: DateTime<Utc>,
    filter: &AlertFilter,
) -> Vec<AlertRecord> {
    let unlimited = AlertFilter { limit: None, ..filter.clone() };
    let mut visible: Vec<AlertRecord> = alerts
        .list_active(now, alerts.window(), &unlimited)
        .into_iter()
        .filter(|record| {
            record.key.kind != AlertKind::DataAbnormal
                || devices
                    .iter()
                    .find(|d| d.device_id == record.key.subject_id)
                    .is_none_or(|d| d.status == DeviceStatus::Normal)
        })
        .collect();
    if let Some(limit) = filter.limit {
        visible.truncate(limit);
    }
    visible
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
