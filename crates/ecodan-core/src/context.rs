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

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use ecodan_types::{
    Circuit, CycleKind, DeviceSetpoint, DeviceStatus, DhwMode, Measurement, MeasurementKind,
    OperatingMode, PeakProductionQuery, ScheduledCycle, SetpointRecord, SetpointRole,
};

use crate::error::{ControlError, ControlResult};
use crate::traits::{Actuator, Clock, ForecastSource, RecordStore, TelemetrySource};

/// Everything a control component needs, injected at construction
#[derive(Clone)]
pub struct ControlContext {
    pub store: Arc<dyn RecordStore>,
    pub telemetry: Arc<dyn TelemetrySource>,
    pub forecast: Arc<dyn ForecastSource>,
    pub actuator: Arc<dyn Actuator>,
    pub clock: Arc<dyn Clock>,
    /// Timezone of local day boundaries
    pub tz: Tz,
}

impl fmt::Debug for ControlContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlContext")
            .field("telemetry", &self.telemetry.name())
            .field("forecast", &self.forecast.name())
            .field("actuator", &self.actuator.name())
            .field("tz", &self.tz)
            .finish_non_exhaustive()
    }
}

impl ControlContext {
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ============= Local time helpers =============

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.tz).date_naive()
    }

    pub fn today(&self) -> NaiveDate {
        self.local_date(self.now())
    }

    /// Local wall-clock time on `date`, moved past a DST gap when needed
    pub fn local_instant(&self, date: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
        let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
        let naive = date.and_time(time);
        self.tz
            .from_local_datetime(&naive)
            .earliest()
            .or_else(|| {
                self.tz
                    .from_local_datetime(&(naive + TimeDelta::hours(1)))
                    .earliest()
            })
            .map_or_else(|| naive.and_utc(), |local| local.with_timezone(&Utc))
    }

    pub fn start_of_local_day(&self, date: NaiveDate) -> DateTime<Utc> {
        self.local_instant(date, 0, 0)
    }

    /// 23:59:59 local time on `date`
    pub fn end_of_local_day(&self, date: NaiveDate) -> DateTime<Utc> {
        self.start_of_local_day(date + Days::new(1)) - TimeDelta::seconds(1)
    }

    // ============= Telemetry =============

    pub async fn measurement(&self, kind: MeasurementKind) -> ControlResult<Measurement> {
        self.telemetry
            .measurement(kind)
            .await
            .map_err(|source| ControlError::Telemetry {
                what: measurement_label(kind),
                source,
            })
    }

    pub async fn tank_temperature(&self) -> ControlResult<f64> {
        Ok(self.measurement(MeasurementKind::TankTemperature).await?.value)
    }

    pub async fn device_status(&self) -> ControlResult<DeviceStatus> {
        self.telemetry
            .device_status()
            .await
            .map_err(|source| ControlError::Telemetry {
                what: "device status",
                source,
            })
    }

    pub async fn device_setpoint(&self) -> ControlResult<DeviceSetpoint> {
        self.telemetry
            .device_setpoint()
            .await
            .map_err(|source| ControlError::Telemetry {
                what: "device setpoint",
                source,
            })
    }

    pub async fn peak_production(&self, query: &PeakProductionQuery) -> ControlResult<DateTime<Utc>> {
        debug!(
            start = %query.start,
            end = %query.end,
            min_kwh = query.min_kwh,
            order = query.order.as_str(),
            "Querying peak production window"
        );
        self.forecast
            .peak_production(query)
            .await
            .map_err(|source| ControlError::Forecast {
                what: "peak production",
                source,
            })
    }

    // ============= Actuation =============

    pub async fn actuate_dhw(&self, value: f64) -> ControlResult<()> {
        info!("🚿 Setting DHW target to {value:.1}°");
        self.actuator
            .set_dhw_target(value)
            .await
            .map_err(|source| ControlError::Actuation {
                target: "DHW target",
                source,
            })
    }

    pub async fn actuate_heating(&self, value: f64) -> ControlResult<()> {
        info!("🌡️ Setting heating target to {value:.1}°");
        self.actuator
            .set_heating_target(value)
            .await
            .map_err(|source| ControlError::Actuation {
                target: "heating target",
                source,
            })
    }

    // ============= Records =============

    /// Current DHW mode, `Off` when nothing was persisted yet
    pub fn dhw_mode(&self) -> ControlResult<OperatingMode> {
        let stored = self
            .store
            .operating_mode(Circuit::Dhw)
            .map_err(ControlError::Store)?;
        Ok(stored.unwrap_or_else(|| OperatingMode::new(Circuit::Dhw, DhwMode::Off, self.now())))
    }

    pub fn set_dhw_mode(&self, mode: DhwMode) -> ControlResult<()> {
        info!("Setting {} to mode: {mode}", Circuit::Dhw);
        self.store
            .save_operating_mode(&OperatingMode::new(Circuit::Dhw, mode, self.now()))
            .map_err(ControlError::Store)
    }

    pub fn cycle(&self, kind: CycleKind) -> ControlResult<Option<ScheduledCycle>> {
        self.store.cycle(kind).map_err(ControlError::Store)
    }

    pub fn save_cycle(&self, cycle: &ScheduledCycle) -> ControlResult<()> {
        self.store.save_cycle(cycle).map_err(ControlError::Store)
    }

    pub fn delete_cycle(&self, kind: CycleKind) -> ControlResult<bool> {
        let removed = self.store.delete_cycle(kind).map_err(ControlError::Store)?;
        if removed {
            debug!("Removed {kind} schedule");
        }
        Ok(removed)
    }

    pub fn setpoint(&self, role: SetpointRole) -> ControlResult<Option<SetpointRecord>> {
        self.store.setpoint(role).map_err(ControlError::Store)
    }

    /// Persist a setpoint, returning the stored (rounded) value
    pub fn save_setpoint(&self, role: SetpointRole, value: f64) -> ControlResult<f64> {
        let record = SetpointRecord::new(role, value, self.now());
        self.store
            .save_setpoint(&record)
            .map_err(ControlError::Store)?;
        Ok(record.value)
    }
}

fn measurement_label(kind: MeasurementKind) -> &'static str {
    match kind {
        MeasurementKind::TankTemperature => "tank temperature",
        MeasurementKind::OutsideTemperature => "outside temperature",
        MeasurementKind::NetPower => "net power",
        MeasurementKind::DailyProduction => "daily production",
        MeasurementKind::CurrentConsumption => "current consumption",
    }
}
