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

//! Fakes shared by the core integration tests

#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeDelta, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

use ecodan_core::{
    Actuator, Clock, ControlContext, ForecastSource, MemoryStore, RecordStore, TelemetrySource,
};
use ecodan_types::{
    CycleKind, DefrostStatus, DeviceOperatingMode, DeviceSetpoint, DeviceStatus, DhwMode,
    HeatSource, Measurement, MeasurementKind, OperatingMode, PeakProductionQuery, PeriodStats,
    ProductionWeather, ScheduledCycle, SearchOrder, SetpointRole, TimeRange,
};

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Monday 2 June 2025, 10:00 UTC
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: TimeDelta) {
        *self.now.lock() += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

// ---------------------------------------------------------------------------
// Heat pump and household
// ---------------------------------------------------------------------------

pub fn stats(q50: f64, stddev: f64) -> PeriodStats {
    PeriodStats {
        start: t0(),
        end: t0(),
        unit: String::new(),
        q25: q50 - stddev,
        q50,
        q75: q50 + stddev,
        stddev,
    }
}

#[derive(Debug, Clone)]
pub struct PlantState {
    pub status: DeviceStatus,
    pub setpoint: DeviceSetpoint,
    pub tank: f64,
    pub outside: f64,
    pub net_power: f64,
    pub daily_production: f64,
    pub consumption: f64,
    pub baseline: PeriodStats,
    pub house: Option<PeriodStats>,
    pub last_legionella: DateTime<Utc>,
    pub dhw_writes: Vec<f64>,
    pub heating_writes: Vec<f64>,
    pub fail_actuation: bool,
}

/// Telemetry and actuator of one heat pump, writes are reflected in the device setpoint
#[derive(Debug)]
pub struct FakePlant {
    pub state: Mutex<PlantState>,
}

impl FakePlant {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PlantState {
                status: DeviceStatus {
                    operating_mode: DeviceOperatingMode::Stop,
                    heat_source: HeatSource::HeatPump,
                    defrost: DefrostStatus::Normal,
                },
                setpoint: DeviceSetpoint {
                    dhw: 10.0,
                    heating: 20.0,
                },
                tank: 38.0,
                outside: 12.0,
                net_power: 150.0,
                daily_production: 10.0,
                consumption: 300.0,
                baseline: stats(400.0, 100.0),
                house: Some(stats(21.0, 0.5)),
                last_legionella: Utc.with_ymd_and_hms(2025, 5, 28, 8, 0, 0).unwrap(),
                dhw_writes: Vec::new(),
                heating_writes: Vec::new(),
                fail_actuation: false,
            }),
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut PlantState)) {
        f(&mut self.state.lock());
    }

    pub fn heating_water(&self, on: bool) {
        self.update(|s| {
            s.status.operating_mode = if on {
                DeviceOperatingMode::HotWater
            } else {
                DeviceOperatingMode::Stop
            };
        });
    }

    pub fn dhw_writes(&self) -> Vec<f64> {
        self.state.lock().dhw_writes.clone()
    }

    pub fn heating_writes(&self) -> Vec<f64> {
        self.state.lock().heating_writes.clone()
    }
}

#[async_trait]
impl TelemetrySource for FakePlant {
    async fn device_status(&self) -> Result<DeviceStatus> {
        Ok(self.state.lock().status.clone())
    }

    async fn device_setpoint(&self) -> Result<DeviceSetpoint> {
        Ok(self.state.lock().setpoint)
    }

    async fn measurement(&self, kind: MeasurementKind) -> Result<Measurement> {
        let state = self.state.lock();
        let (value, unit) = match kind {
            MeasurementKind::TankTemperature => (state.tank, "°C"),
            MeasurementKind::OutsideTemperature => (state.outside, "°C"),
            MeasurementKind::NetPower => (state.net_power, "W"),
            MeasurementKind::DailyProduction => (state.daily_production, "kWh"),
            MeasurementKind::CurrentConsumption => (state.consumption, "W"),
        };
        Ok(Measurement {
            timestamp: t0(),
            value,
            unit: unit.to_owned(),
        })
    }

    async fn consumption_baseline(&self) -> Result<PeriodStats> {
        Ok(self.state.lock().baseline.clone())
    }

    async fn house_temperature_stats(
        &self,
        _range: Option<TimeRange>,
    ) -> Result<Option<PeriodStats>> {
        Ok(self.state.lock().house.clone())
    }

    async fn last_legionella_start(&self) -> Result<DateTime<Utc>> {
        Ok(self.state.lock().last_legionella)
    }

    fn name(&self) -> &str {
        "fake-plant"
    }
}

#[async_trait]
impl Actuator for FakePlant {
    async fn set_dhw_target(&self, value: f64) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_actuation {
            return Err(anyhow!("connection refused"));
        }
        state.setpoint.dhw = value;
        state.dhw_writes.push(value);
        Ok(())
    }

    async fn set_heating_target(&self, value: f64) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_actuation {
            return Err(anyhow!("connection refused"));
        }
        state.setpoint.heating = value;
        state.heating_writes.push(value);
        Ok(())
    }

    fn name(&self) -> &str {
        "fake-plant"
    }
}

// ---------------------------------------------------------------------------
// Forecast
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ForecastState {
    /// Answer to peak queries, the query bound per search order when unset
    pub peak: Option<DateTime<Utc>>,
    pub production: TimeRange,
    pub temperature: PeriodStats,
    pub weather: ProductionWeather,
    pub queries: Vec<PeakProductionQuery>,
}

#[derive(Debug)]
pub struct FakeForecast {
    pub state: Mutex<ForecastState>,
}

impl FakeForecast {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ForecastState {
                peak: None,
                production: TimeRange::new(
                    Utc.with_ymd_and_hms(2025, 6, 2, 7, 0, 0).unwrap(),
                    Utc.with_ymd_and_hms(2025, 6, 2, 17, 0, 0).unwrap(),
                ),
                temperature: stats(8.0, 2.0),
                weather: ProductionWeather {
                    ratio: 0.8,
                    expected_kwh: Some(10.0),
                },
                queries: Vec::new(),
            }),
        }
    }

    pub fn answer_peak(&self, at: DateTime<Utc>) {
        self.state.lock().peak = Some(at);
    }

    pub fn queries(&self) -> Vec<PeakProductionQuery> {
        self.state.lock().queries.clone()
    }
}

#[async_trait]
impl ForecastSource for FakeForecast {
    async fn peak_production(&self, query: &PeakProductionQuery) -> Result<DateTime<Utc>> {
        let mut state = self.state.lock();
        state.queries.push(query.clone());
        Ok(state.peak.unwrap_or(match query.order {
            SearchOrder::First => query.start,
            SearchOrder::Last => query.end,
        }))
    }

    async fn production_bounds(&self, _date: NaiveDate, _min_power_kw: f64) -> Result<TimeRange> {
        Ok(self.state.lock().production)
    }

    async fn temperature_stats(&self, _range: TimeRange) -> Result<PeriodStats> {
        Ok(self.state.lock().temperature.clone())
    }

    async fn production_weather(&self, _range: TimeRange) -> Result<ProductionWeather> {
        Ok(self.state.lock().weather)
    }

    fn name(&self) -> &str {
        "fake-forecast"
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub struct Harness {
    pub plant: Arc<FakePlant>,
    pub forecast: Arc<FakeForecast>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
    pub ctx: ControlContext,
}

impl Harness {
    pub fn new() -> Self {
        let plant = Arc::new(FakePlant::new());
        let forecast = Arc::new(FakeForecast::new());
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(t0()));
        let ctx = ControlContext {
            store: store.clone(),
            telemetry: plant.clone(),
            forecast: forecast.clone(),
            actuator: plant.clone(),
            clock: clock.clone(),
            tz: chrono_tz::UTC,
        };
        Self {
            plant,
            forecast,
            store,
            clock,
            ctx,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn mode(&self) -> DhwMode {
        self.ctx.dhw_mode().unwrap().mode
    }

    pub fn set_mode(&self, mode: DhwMode) {
        self.store
            .save_operating_mode(&OperatingMode::new(
                ecodan_types::Circuit::Dhw,
                mode,
                self.now(),
            ))
            .unwrap();
    }

    pub fn cycle(&self, kind: CycleKind) -> Option<ScheduledCycle> {
        self.store.cycle(kind).unwrap()
    }

    pub fn put_cycle(&self, cycle: &ScheduledCycle) {
        self.store.save_cycle(cycle).unwrap();
    }

    pub fn setpoint(&self, role: SetpointRole) -> Option<f64> {
        self.store.setpoint(role).unwrap().map(|record| record.value)
    }

    pub fn put_setpoint(&self, role: SetpointRole, value: f64) {
        self.ctx.save_setpoint(role, value).unwrap();
    }
}
