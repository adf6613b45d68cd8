// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Telemetry and forecast payloads exchanged with the collaborator services

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cycle::SearchOrder;

/// What the heat pump reports it is doing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeviceOperatingMode {
    Stop,
    HotWater,
    Heating,
    Other(String),
}

impl From<String> for DeviceOperatingMode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Stop" => Self::Stop,
            "Hot water" => Self::HotWater,
            "Heating" => Self::Heating,
            _ => Self::Other(value),
        }
    }
}

impl From<DeviceOperatingMode> for String {
    fn from(value: DeviceOperatingMode) -> Self {
        match value {
            DeviceOperatingMode::Stop => "Stop".to_owned(),
            DeviceOperatingMode::HotWater => "Hot water".to_owned(),
            DeviceOperatingMode::Heating => "Heating".to_owned(),
            DeviceOperatingMode::Other(other) => other,
        }
    }
}

/// Heat source currently used by the heat pump
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HeatSource {
    /// The compressor itself
    HeatPump,
    /// Compressor idle while the unit is nominally on
    HeatPumpPause,
    /// Any booster or auxiliary heater
    Auxiliary(String),
}

impl From<String> for HeatSource {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Heatpump" => Self::HeatPump,
            "Heatpump pause" => Self::HeatPumpPause,
            _ => Self::Auxiliary(value),
        }
    }
}

impl From<HeatSource> for String {
    fn from(value: HeatSource) -> Self {
        match value {
            HeatSource::HeatPump => "Heatpump".to_owned(),
            HeatSource::HeatPumpPause => "Heatpump pause".to_owned(),
            HeatSource::Auxiliary(other) => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DefrostStatus {
    Normal,
    Defrosting(String),
}

impl From<String> for DefrostStatus {
    fn from(value: String) -> Self {
        if value == "Normal" {
            Self::Normal
        } else {
            Self::Defrosting(value)
        }
    }
}

impl From<DefrostStatus> for String {
    fn from(value: DefrostStatus) -> Self {
        match value {
            DefrostStatus::Normal => "Normal".to_owned(),
            DefrostStatus::Defrosting(other) => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub operating_mode: DeviceOperatingMode,
    pub heat_source: HeatSource,
    #[serde(rename = "defrost_status")]
    pub defrost: DefrostStatus,
}

impl DeviceStatus {
    pub fn is_heating_water(&self) -> bool {
        self.operating_mode == DeviceOperatingMode::HotWater
    }

    pub fn is_defrosting(&self) -> bool {
        self.defrost != DefrostStatus::Normal
    }

    /// Unit is on but the compressor pauses
    pub fn is_idle(&self) -> bool {
        self.operating_mode != DeviceOperatingMode::Stop
            && self.heat_source == HeatSource::HeatPumpPause
    }

    /// An auxiliary heater is carrying the load outside of a defrost
    pub fn is_boosting(&self) -> bool {
        !matches!(self.heat_source, HeatSource::HeatPump) && !self.is_defrosting()
    }
}

/// Target temperatures as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceSetpoint {
    pub dhw: f64,
    pub heating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementKind {
    TankTemperature,
    OutsideTemperature,
    /// Negative while exporting to the grid
    NetPower,
    DailyProduction,
    CurrentConsumption,
}

/// Distribution summary over a time period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodStats {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub unit: String,
    pub q25: f64,
    pub q50: f64,
    pub q75: f64,
    pub stddev: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> chrono::TimeDelta {
        self.end - self.start
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }
}

/// Forecast production compared to a clear sky
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProductionWeather {
    pub ratio: f64,
    /// Expected production over the range, when the forecast provides it
    #[serde(default)]
    pub expected_kwh: Option<f64>,
}

/// Request for the best production window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakProductionQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub min_kwh: f64,
    pub duration_hours: f64,
    pub order: SearchOrder,
}
