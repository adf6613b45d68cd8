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

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use ecodan_types::{
    Circuit, CycleKind, DeviceSetpoint, DeviceStatus, Measurement, MeasurementKind,
    OperatingMode, PeakProductionQuery, PeriodStats, ProductionWeather, ScheduledCycle,
    SetpointRecord, SetpointRole, TimeRange,
};

// ============= Collaborator Traits =============

/// Live telemetry of the heat pump and the household
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// What the heat pump is currently doing
    async fn device_status(&self) -> Result<DeviceStatus>;

    /// Target temperatures currently configured on the heat pump
    async fn device_setpoint(&self) -> Result<DeviceSetpoint>;

    /// Latest value of a measured quantity
    async fn measurement(&self, kind: MeasurementKind) -> Result<Measurement>;

    /// Rolling consumption baseline used for load admission
    async fn consumption_baseline(&self) -> Result<PeriodStats>;

    /// Measured house temperature, `None` when no data is available for the range
    async fn house_temperature_stats(&self, range: Option<TimeRange>)
    -> Result<Option<PeriodStats>>;

    /// Start of the last legionella run the tank actually completed
    async fn last_legionella_start(&self) -> Result<DateTime<Utc>>;

    /// Get data source name for logging
    fn name(&self) -> &str;
}

/// Pre-computed solar production and weather forecast
#[async_trait]
pub trait ForecastSource: Send + Sync {
    /// Start of the best admissible production window inside the query range
    async fn peak_production(&self, query: &PeakProductionQuery) -> Result<DateTime<Utc>>;

    /// First and last moment of `date` with production above `min_power_kw`
    async fn production_bounds(&self, date: NaiveDate, min_power_kw: f64) -> Result<TimeRange>;

    /// Forecast outside temperature over a range
    async fn temperature_stats(&self, range: TimeRange) -> Result<PeriodStats>;

    /// Forecast production relative to a clear sky over a range
    async fn production_weather(&self, range: TimeRange) -> Result<ProductionWeather>;

    /// Get data source name for logging
    fn name(&self) -> &str;
}

/// Write access to the heat pump
#[async_trait]
pub trait Actuator: Send + Sync {
    async fn set_dhw_target(&self, value: f64) -> Result<()>;

    async fn set_heating_target(&self, value: f64) -> Result<()>;

    /// Get actuator name for logging
    fn name(&self) -> &str;
}

/// Durable records, one row per natural key with upsert semantics
pub trait RecordStore: Send + Sync {
    fn operating_mode(&self, circuit: Circuit) -> Result<Option<OperatingMode>>;

    fn save_operating_mode(&self, mode: &OperatingMode) -> Result<()>;

    fn cycle(&self, kind: CycleKind) -> Result<Option<ScheduledCycle>>;

    fn save_cycle(&self, cycle: &ScheduledCycle) -> Result<()>;

    /// Returns whether a record was removed
    fn delete_cycle(&self, kind: CycleKind) -> Result<bool>;

    /// Soonest planned cycle across kinds
    fn next_cycle(&self) -> Result<Option<ScheduledCycle>>;

    fn setpoint(&self, role: SetpointRole) -> Result<Option<SetpointRecord>>;

    fn save_setpoint(&self, record: &SetpointRecord) -> Result<()>;
}

/// Source of "now", injectable for tests
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
