//! Service configuration loaded from TOML.
//!
//! Threshold bands come from externally managed registry rows; this file is
//! the service's read-only view of them plus its own tuning (debounce window,
//! logging). See `parkmon.toml` at the repository root for a full example.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::alert::debounce::DebounceConfig;
use crate::ingest::environment::DeviceStatus;
use crate::logging::{self, LogLevel, Subsystem};
use crate::model::MonitorError;

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "PARKMON_CONFIG";

/// Config file used when `PARKMON_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "parkmon.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub debounce: DebounceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub areas: Vec<AreaConfig>,
    #[serde(default)]
    pub indicators: Vec<IndicatorConfig>,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub file: Option<String>,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: None,
            timestamps: true,
        }
    }
}

/// One `flow_control` row.
#[derive(Debug, Clone, Deserialize)]
pub struct AreaConfig {
    pub area_id: String,
    #[serde(default)]
    pub name: String,
    pub daily_capacity: i64,
    /// Falls back to `DEFAULT_WARNING_RATIO` when absent.
    pub warning_threshold: Option<f64>,
    #[serde(default)]
    pub current_visitors: u32,
}

/// One `monitor_indicator` row.
#[derive(Debug, Clone, Deserialize)]
pub struct IndicatorConfig {
    pub indicator_id: String,
    pub name: String,
    #[serde(default)]
    pub unit: String,
    pub standard_lower: f64,
    pub standard_upper: f64,
}

/// One `monitor_device` row.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub device_id: String,
    pub device_type: String,
    #[serde(default)]
    pub region_id: String,
    #[serde(default = "default_device_status")]
    pub status: DeviceStatus,
}

fn default_device_status() -> DeviceStatus {
    DeviceStatus::Normal
}

impl MonitorConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, MonitorError> {
        let config: Self = toml::from_str(text).map_err(|e| MonitorError::ConfigParse(e.to_string()))?;
        config.debounce.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, MonitorError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| MonitorError::ConfigIo(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&text)?;
        logging::info(
            Subsystem::Config,
            None,
            &format!(
                "loaded {} ({} areas, {} indicators, {} devices)",
                path.display(),
                config.areas.len(),
                config.indicators.len(),
                config.devices.len()
            ),
        );
        Ok(config)
    }

    /// Loads `.env` if present, then the file named by `PARKMON_CONFIG`
    /// (default `parkmon.toml`).
    pub fn load_from_env() -> Result<Self, MonitorError> {
        dotenv::dotenv().ok();
        let path = std::env::var(CONFIG_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(path)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = MonitorConfig::from_toml_str("").expect("empty config is valid");
        assert_eq!(config.debounce, DebounceConfig::default());
        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(config.areas.is_empty());
    }

    #[test]
    fn test_partial_debounce_table_keeps_other_defaults() {
        let config = MonitorConfig::from_toml_str("[debounce]\nwindow_minutes = 10\n").unwrap();
        assert_eq!(config.debounce.window_minutes, 10);
        assert_eq!(config.debounce.max_records_per_key, 20);
    }

    #[test]
    fn test_debounce_window_out_of_range_is_rejected() {
        for window in ["0", "-30", "1000000000000"] {
            let text = format!("[debounce]\nwindow_minutes = {}\n", window);
            let result = MonitorConfig::from_toml_str(&text);
            assert!(
                matches!(result, Err(MonitorError::InvalidDebounce(_))),
                "window_minutes = {} should be rejected, got {:?}",
                window,
                result.map(|c| c.debounce)
            );
        }
    }

    #[test]
    fn test_debounce_zero_limits_are_rejected() {
        for table in [
            "[debounce]\nlist_limit = 0\n",
            "[debounce]\nmax_records_per_key = 0\n",
            "[debounce]\nretention_multiplier = 0\n",
        ] {
            let result = MonitorConfig::from_toml_str(table);
            assert!(matches!(result, Err(MonitorError::InvalidDebounce(_))), "{}", table);
        }
    }

    #[test]
    fn test_debounce_day_long_window_is_accepted() {
        let config = MonitorConfig::from_toml_str("[debounce]\nwindow_minutes = 1440\n").unwrap();
        assert_eq!(config.debounce.window(), chrono::Duration::days(1));
    }

    #[test]
    fn test_area_without_warning_threshold() {
        let config = MonitorConfig::from_toml_str(
            r#"
            [[areas]]
            area_id = "A002"
            daily_capacity = 800
            "#,
        )
        .unwrap();
        assert_eq!(config.areas[0].warning_threshold, None);
        assert_eq!(config.areas[0].current_visitors, 0);
    }

    #[test]
    fn test_device_status_parses_lowercase() {
        let config = MonitorConfig::from_toml_str(
            r#"
            [[devices]]
            device_id = "D004"
            device_type = "noise monitor"
            status = "offline"
            "#,
        )
        .unwrap();
        assert_eq!(config.devices[0].status, DeviceStatus::Offline);
    }

    #[test]
    fn test_bad_log_level_is_parse_error() {
        let result = MonitorConfig::from_toml_str("[logging]\nlevel = \"loud\"\n");
        assert!(matches!(result, Err(MonitorError::ConfigParse(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = MonitorConfig::load("/nonexistent/parkmon.toml");
        assert!(matches!(result, Err(MonitorError::ConfigIo(_))));
    }

    #[test]
    fn test_bundled_config_parses() {
        let config = MonitorConfig::from_toml_str(include_str!("../parkmon.toml"))
            .expect("bundled parkmon.toml should parse");
        assert_eq!(config.areas.len(), 4);
        assert_eq!(config.indicators.len(), 5);
    }
}
