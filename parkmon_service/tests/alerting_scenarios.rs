/// End-to-end alerting scenarios through the public API
///
/// These tests drive the bundled `parkmon.toml` registry through the same
/// call sites the service binary uses: flow sweeps, reading uploads, device
/// status changes, and operator acknowledgement. Time is injected so every
/// window boundary is exact.
///
/// Run with: cargo test --test alerting_scenarios

use chrono::{DateTime, Duration, TimeZone, Utc};

use parkmon_service::alert::debounce::{AlertDebouncer, AlertFilter, DebounceConfig};
use parkmon_service::alert::thresholds::{classify_occupancy, classify_reading};
use parkmon_service::config::MonitorConfig;
use parkmon_service::ingest::environment::{self, DeviceStatus};
use parkmon_service::ingest::flow;
use parkmon_service::model::{AlertKey, AlertKind, Measurement, OccupancyBand, ReadingBand, Status};
use parkmon_service::registry::Registry;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn registry() -> Registry {
    let config = MonitorConfig::from_toml_str(include_str!("../parkmon.toml"))
        .expect("bundled config should parse");
    Registry::from_config(&config).expect("bundled config should validate")
}

/// 2024-07-14 10:00:00 UTC, a busy summer morning.
fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 14, 10, 0, 0).unwrap()
}

fn upload(
    registry: &Registry,
    alerts: &AlertDebouncer,
    device_id: &str,
    indicator_id: &str,
    value: f64,
    at: DateTime<Utc>,
) -> environment::ReadingOutcome {
    let device = registry.find_device(device_id).expect("device in registry");
    let indicator = registry.find_indicator(indicator_id).expect("indicator in registry");
    environment::upload_reading(device, indicator, &Measurement::new(device_id, value, at), alerts, at)
        .expect("well-formed reading")
}

// ---------------------------------------------------------------------------
// Classification scenarios
// ---------------------------------------------------------------------------

#[test]
fn occupancy_scenario_capacity_1000_ratio_point_eight() {
    let band = OccupancyBand::new(1000, 0.8).unwrap();

    let at_warning = classify_occupancy(800, &band);
    assert_eq!(at_warning.status, Status::Warning);
    assert_eq!(at_warning.ratio_or_value, 0.8);

    assert_eq!(classify_occupancy(799, &band).status, Status::Normal);
    assert_eq!(classify_occupancy(1000, &band).status, Status::Restricted);
}

#[test]
fn ph_scenario_upper_bound_is_normal_just_above_is_abnormal() {
    let band = ReadingBand::new(6.5, 8.5).unwrap();

    assert_eq!(classify_reading(8.5, &band).status, Status::Normal);

    let above = classify_reading(8.51, &band);
    assert_eq!(above.status, Status::Abnormal);
    assert!(above.reason.unwrap().contains('>'));
}

#[test]
fn reading_bounds_are_open_for_several_bands() {
    for (lower, upper) in [(6.5, 8.5), (0.0, 35.0), (-10.0, 35.0), (20.0, 60.0)] {
        let band = ReadingBand::new(lower, upper).unwrap();
        assert_eq!(classify_reading(lower, &band).status, Status::Normal);
        assert_eq!(classify_reading(upper, &band).status, Status::Normal);
        assert_eq!(classify_reading(upper + 1e-9, &band).status, Status::Abnormal);
        assert_eq!(classify_reading(lower - 1e-9, &band).status, Status::Abnormal);
    }
}

// ---------------------------------------------------------------------------
// Debounce scenarios
// ---------------------------------------------------------------------------

#[test]
fn debounce_protocol_record_then_window() {
    let alerts = AlertDebouncer::new(DebounceConfig::default());
    let key = AlertKey::data_abnormal("D001", "I002");
    let window = Duration::minutes(30);

    assert!(alerts.should_raise(&key, t0(), window));
    alerts.record(key.clone(), "pH out of range", t0());
    assert!(!alerts.should_raise(&key, t0() + Duration::seconds(1), window));
    assert!(alerts.should_raise(&key, t0() + window + Duration::seconds(1), window));
}

#[test]
fn acknowledged_alert_never_blocks() {
    let alerts = AlertDebouncer::new(DebounceConfig::default());
    let key = AlertKey::device_fault("D002");
    alerts.record(key.clone(), "fault", t0());
    alerts.acknowledge(&key);

    for offset in [0, 1, 10, 29, 31] {
        assert!(alerts.should_raise(&key, t0() + Duration::minutes(offset), Duration::minutes(30)));
    }
}

#[test]
fn two_abnormal_readings_five_minutes_apart_raise_once() {
    let registry = registry();
    let alerts = AlertDebouncer::new(DebounceConfig::default());

    let first = upload(&registry, &alerts, "D001", "I002", 9.1, t0());
    let second = upload(&registry, &alerts, "D001", "I002", 9.3, t0() + Duration::minutes(5));

    assert!(first.alert.is_some());
    assert!(second.is_abnormal());
    assert!(second.alert.is_none(), "second alert should be suppressed");
}

#[test]
fn two_abnormal_readings_forty_minutes_apart_raise_twice() {
    let registry = registry();
    let alerts = AlertDebouncer::new(DebounceConfig::default());

    let first = upload(&registry, &alerts, "D001", "I002", 9.1, t0());
    let second = upload(&registry, &alerts, "D001", "I002", 9.3, t0() + Duration::minutes(40));

    assert!(first.alert.is_some());
    assert!(second.alert.is_some());
    assert_eq!(alerts.len(), 2);
}

// ---------------------------------------------------------------------------
// Full service flow
// ---------------------------------------------------------------------------

#[test]
fn operator_view_of_a_busy_morning() {
    let mut registry = registry();
    let alerts = AlertDebouncer::new(DebounceConfig::default());

    // Crowds build at the summit viewpoint (capacity 500, warning at 0.75).
    registry.find_area_mut("A003").unwrap().current_visitors = 400;
    let statuses = flow::update_flow_status(registry.area_flows(), &alerts, t0());
    let summit = statuses.iter().find(|s| s.area_id == "A003").unwrap();
    assert_eq!(summit.classification.status, Status::Warning);
    assert!(summit.alert.is_some());

    // PM2.5 spikes at D002, and D003 goes into fault.
    upload(&registry, &alerts, "D002", "I001", 48.0, t0() + Duration::minutes(3));
    let device = registry.find_device_mut("D003").unwrap();
    environment::update_device_status(device, DeviceStatus::Fault, &alerts, t0() + Duration::minutes(4));

    let now = t0() + Duration::minutes(5);
    let active = alerts.list_active(now, alerts.window(), &AlertFilter::default());
    let kinds: Vec<_> = active.iter().map(|r| r.key.kind).collect();
    assert_eq!(
        kinds,
        vec![AlertKind::DeviceFault, AlertKind::DataAbnormal, AlertKind::AreaOccupancy],
        "most recent first"
    );

    // Operator clears the fault from the alert panel.
    assert_eq!(alerts.acknowledge_by_name("device_fault_D003"), Some(1));
    assert_eq!(alerts.list_active(now, alerts.window(), &AlertFilter::default()).len(), 2);

    // Offline devices never alert on data.
    let offline = upload(&registry, &alerts, "D004", "I005", 95.0, now);
    assert!(offline.is_abnormal());
    assert!(offline.alert.is_none());

    // Hours later the history is swept.
    assert_eq!(alerts.sweep(t0() + Duration::hours(3)), 3);
    assert!(alerts.is_empty());
}
