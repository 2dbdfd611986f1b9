/// Validated registry of areas, indicators, and devices.
///
/// Built once from `MonitorConfig`. Every band is checked here, so a
/// misconfigured capacity or inverted indicator range is reported at load
/// time instead of producing a wrong classification later. All other modules
/// should look subjects up through this registry rather than the raw config.

use std::collections::HashSet;

use crate::config::MonitorConfig;
use crate::ingest::environment::{Device, Indicator};
use crate::ingest::flow::AreaFlow;
use crate::model::{MonitorError, OccupancyBand, ReadingBand};

#[derive(Debug, Clone, Default)]
pub struct Registry {
    areas: Vec<AreaFlow>,
    indicators: Vec<Indicator>,
    devices: Vec<Device>,
}

impl Registry {
    pub fn from_config(config: &MonitorConfig) -> Result<Self, MonitorError> {
        let areas = config
            .areas
            .iter()
            .map(|a| {
                let band = match a.warning_threshold {
                    Some(ratio) => OccupancyBand::new(a.daily_capacity, ratio)?,
                    None => OccupancyBand::with_default_ratio(a.daily_capacity)?,
                };
                Ok(AreaFlow {
                    area_id: a.area_id.clone(),
                    name: a.name.clone(),
                    band,
                    current_visitors: a.current_visitors,
                })
            })
            .collect::<Result<Vec<_>, MonitorError>>()?;

        let indicators = config
            .indicators
            .iter()
            .map(|i| {
                Ok(Indicator {
                    indicator_id: i.indicator_id.clone(),
                    name: i.name.clone(),
                    unit: i.unit.clone(),
                    band: ReadingBand::new(i.standard_lower, i.standard_upper)?,
                })
            })
            .collect::<Result<Vec<_>, MonitorError>>()?;

        let devices: Vec<Device> = config
            .devices
            .iter()
            .map(|d| Device {
                device_id: d.device_id.clone(),
                device_type: d.device_type.clone(),
                region_id: d.region_id.clone(),
                status: d.status,
            })
            .collect();

        ensure_unique(areas.iter().map(|a| a.area_id.as_str()))?;
        ensure_unique(indicators.iter().map(|i| i.indicator_id.as_str()))?;
        ensure_unique(devices.iter().map(|d| d.device_id.as_str()))?;

        Ok(Self {
            areas,
            indicators,
            devices,
        })
    }

    pub fn area_flows(&self) -> &[AreaFlow] {
        &self.areas
    }

    pub fn indicators(&self) -> &[Indicator] {
        &self.indicators
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut [Device] {
        &mut self.devices
    }

    pub fn find_area(&self, area_id: &str) -> Result<&AreaFlow, MonitorError> {
        self.areas
            .iter()
            .find(|a| a.area_id == area_id)
            .ok_or_else(|| MonitorError::UnknownArea(area_id.to_string()))
    }

    pub fn find_area_mut(&mut self, area_id: &str) -> Result<&mut AreaFlow, MonitorError> {
        self.areas
            .iter_mut()
            .find(|a| a.area_id == area_id)
            .ok_or_else(|| MonitorError::UnknownArea(area_id.to_string()))
    }

    pub fn find_indicator(&self, indicator_id: &str) -> Result<&Indicator, MonitorError> {
        self.indicators
            .iter()
            .find(|i| i.indicator_id == indicator_id)
            .ok_or_else(|| MonitorError::UnknownIndicator(indicator_id.to_string()))
    }

    pub fn find_device(&self, device_id: &str) -> Result<&Device, MonitorError> {
        self.devices
            .iter()
            .find(|d| d.device_id == device_id)
            .ok_or_else(|| MonitorError::UnknownDevice(device_id.to_string()))
    }

    pub fn find_device_mut(&mut self, device_id: &str) -> Result<&mut Device, MonitorError> {
        self.devices
            .iter_mut()
            .find(|d| d.device_id == device_id)
            .ok_or_else(|| MonitorError::UnknownDevice(device_id.to_string()))
    }
}

fn ensure_unique<'a>(ids: impl Iterator<Item = &'a str>) -> Result<(), MonitorError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(MonitorError::DuplicateId(id.to_string()));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
