/// Park monitoring service entry point.
///
/// Loads the registry from `PARKMON_CONFIG` (default `parkmon.toml`), runs a
/// flow-status sweep over every configured area, then processes
/// newline-delimited JSON events from stdin, writing one JSON result per
/// event to stdout. Logs go to stderr (and the configured log file).
///
/// Event examples:
///   {"type":"reading","device_id":"D001","indicator_id":"I002","value":8.51}
///   {"type":"occupancy","area_id":"A001","current_visitors":812}
///   {"type":"device_status","device_id":"D001","status":"fault"}
///   {"type":"acknowledge","alert_key":"device_fault_D001"}   (also restores D001 to normal)
///   {"type":"acknowledge"}
///   {"type":"alerts"}

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use parkmon_service::alert::debounce::{AlertDebouncer, AlertFilter};
use parkmon_service::config::MonitorConfig;
use parkmon_service::ingest::environment::{self, DeviceStatus};
use parkmon_service::ingest::flow;
use parkmon_service::logging::{self, Subsystem};
use parkmon_service::model::{Measurement, MonitorError};
use parkmon_service::registry::Registry;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Event {
    Reading {
        device_id: String,
        indicator_id: String,
        value: f64,
        observed_at: Option<DateTime<Utc>>,
    },
    Occupancy {
        area_id: String,
        current_visitors: u32,
    },
    DeviceStatus {
        device_id: String,
        status: DeviceStatus,
    },
    Acknowledge {
        alert_key: Option<String>,
    },
    Alerts {
        subject_id: Option<String>,
    },
}

fn main() -> ExitCode {
    let config = match MonitorConfig::load_from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("✗ {}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init_logger(
        config.logging.level,
        config.logging.file.as_deref(),
        config.logging.timestamps,
    );

    let mut registry = match Registry::from_config(&config) {
        Ok(r) => r,
        Err(e) => {
            logging::error(Subsystem::Config, None, &e.to_string());
            return ExitCode::FAILURE;
        }
    };
    let alerts = AlertDebouncer::new(config.debounce.clone());

    let stdout = io::stdout();
    let mut out = stdout.lock();

    for status in flow::update_flow_status(registry.area_flows(), &alerts, Utc::now()) {
        if let Err(e) = emit(&mut out, &json!({ "area_status": status })) {
            logging::error(Subsystem::System, None, &format!("stdout: {}", e));
            return ExitCode::FAILURE;
        }
    }

    for (line_no, line) in io::stdin().lock().lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                logging::error(Subsystem::System, None, &format!("stdin: {}", e));
                return ExitCode::FAILURE;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let result = match serde_json::from_str::<Event>(&line) {
            Ok(event) => handle(event, &mut registry, &alerts, Utc::now())
                .unwrap_or_else(|e| json!({ "error": e.to_string() })),
            Err(e) => {
                logging::warn(
                    Subsystem::System,
                    None,
                    &format!("line {}: invalid event: {}", line_no + 1, e),
                );
                json!({ "error": format!("invalid event: {}", e) })
            }
        };

        if let Err(e) = emit(&mut out, &result) {
            logging::error(Subsystem::System, None, &format!("stdout: {}", e));
            return ExitCode::FAILURE;
        }
    }

    let now = Utc::now();
    let active = environment::visible_alerts(&alerts, registry.devices(), now, &listing_filter(&alerts, None));
    if let Err(e) = emit(&mut out, &json!({ "active_alerts": active })) {
        logging::error(Subsystem::System, None, &format!("stdout: {}", e));
        return ExitCode::FAILURE;
    }
    alerts.sweep(now);

    ExitCode::SUCCESS
}

fn handle(
    event: Event,
    registry: &mut Registry,
    alerts: &AlertDebouncer,
    now: DateTime<Utc>,
) -> Result<Value, MonitorError> {
    match event {
        Event::Reading {
            device_id,
            indicator_id,
            value,
            observed_at,
        } => {
            let device = registry.find_device(&device_id)?;
            let indicator = registry.find_indicator(&indicator_id)?;
            let measurement = Measurement::new(device_id.as_str(), value, observed_at.unwrap_or(now));
            let outcome = environment::upload_reading(device, indicator, &measurement, alerts, now)?;
            Ok(json!({ "reading": outcome }))
        }
        Event::Occupancy {
            area_id,
            current_visitors,
        } => {
            let area = registry.find_area_mut(&area_id)?;
            area.current_visitors = current_visitors;
            Ok(json!({ "area_status": flow::evaluate_area(area, alerts, now) }))
        }
        Event::DeviceStatus { device_id, status } => {
            let device = registry.find_device_mut(&device_id)?;
            let alert = environment::update_device_status(device, status, alerts, now);
            Ok(json!({ "device_id": device_id, "status": status, "alert": alert }))
        }
        Event::Acknowledge { alert_key: Some(key) } => {
            match environment::clear_alert(&key, registry.devices_mut(), alerts, now) {
                Some(count) => Ok(json!({ "acknowledged": count, "alert_key": key })),
                None => Ok(json!({ "error": format!("no such alert: {}", key) })),
            }
        }
        Event::Acknowledge { alert_key: None } => Ok(json!({ "acknowledged": alerts.acknowledge_all() })),
        Event::Alerts { subject_id } => {
            let filter = listing_filter(alerts, subject_id);
            Ok(json!({ "active_alerts": environment::visible_alerts(alerts, registry.devices(), now, &filter) }))
        }
    }
}

fn listing_filter(alerts: &AlertDebouncer, subject_id: Option<String>) -> AlertFilter {
    AlertFilter {
        subject_id,
        limit: Some(alerts.config().list_limit),
        ..AlertFilter::default()
    }
}

fn emit(out: &mut impl Write, value: &Value) -> io::Result<()> {
    writeln!(out, "{}", value)
}
