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

use anyhow::{Result, bail};
use chrono::TimeDelta;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::mode::RunningMode;
use crate::setpoint::FadeDuring;

// ============= Controller Configuration =============

/// Tunables of the control core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// IANA timezone used for local day boundaries
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub cycle: CycleTimingConfig,
    #[serde(default)]
    pub dhw: DhwConfig,
    #[serde(default)]
    pub legionella: LegionellaConfig,
    #[serde(default)]
    pub heating: HeatingConfig,
}

/// Timing and ramp settings shared by both DHW cycle kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleTimingConfig {
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,
    /// Minimum lead time between now and a planned start
    #[serde(default = "default_min_interval_minutes")]
    pub min_interval_minutes: i64,
    /// Delay applied when an imminent start gets postponed
    #[serde(default = "default_retry_interval_minutes")]
    pub retry_interval_minutes: i64,
    #[serde(default)]
    pub running_mode: RunningMode,
    /// `auto` running mode ramps when outside is at or below this
    #[serde(default = "default_auto_step_max_temp")]
    pub auto_step_max_temp: f64,
    #[serde(default = "default_start_tolerance_secs")]
    pub start_tolerance_secs: i64,
    /// Pending modes older than this are aborted
    #[serde(default = "default_pending_timeout_minutes")]
    pub pending_timeout_minutes: i64,
    /// Tank must be within this many degrees of the current step before stepping
    #[serde(default = "default_buffer_interval")]
    pub buffer_interval: f64,
    #[serde(default = "default_step")]
    pub step: f64,
    /// Net power samples kept while buffering
    #[serde(default = "default_power_window")]
    pub power_window: usize,
    /// Admission allows consumption up to q50 + factor * stddev of the baseline
    #[serde(default = "default_consumption_stddev_factor")]
    pub consumption_stddev_factor: f64,
}

/// Normal DHW cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhwConfig {
    /// Setpoint written to switch DHW heating off
    #[serde(default = "default_temp_off")]
    pub temp_off: f64,
    #[serde(default = "default_temp_base")]
    pub temp_base: f64,
    /// Ceiling of the buffering ramp
    #[serde(default = "default_temp_buffer")]
    pub temp_buffer: f64,
    /// Replan once the tank dropped this far below base
    #[serde(default = "default_temp_drop")]
    pub temp_drop: f64,
    /// Hysteresis the device applies below its own target
    #[serde(default = "default_temp_drop_device")]
    pub temp_drop_device: f64,
    #[serde(default = "default_dhw_runtime_hours")]
    pub runtime_hours: f64,
    /// Longest allowed time between normal cycles
    #[serde(default = "default_dhw_max_interval_hours")]
    pub max_interval_hours: f64,
    #[serde(default = "default_dhw_energy_kwh")]
    pub energy_kwh: f64,
}

/// Anti-legionella cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegionellaConfig {
    #[serde(default = "default_legionella_temp")]
    pub temp: f64,
    #[serde(default = "default_legionella_interval_days")]
    pub interval_days: i64,
    /// Earliest day after the last run a new run may be planned
    #[serde(default = "default_legionella_min_interval_days")]
    pub min_interval_days: i64,
    #[serde(default = "default_legionella_runtime_hours")]
    pub runtime_hours: f64,
    #[serde(default = "default_legionella_energy_kwh")]
    pub energy_kwh: f64,
    /// Device gives up a legionella run after this long
    #[serde(default = "default_device_max_runtime_hours")]
    pub device_max_runtime_hours: f64,
    /// Buffering hands over to legionella when it will be this cold at the planned start
    #[serde(default = "default_force_below_outside_temp")]
    pub force_below_outside_temp: f64,
    #[serde(default = "default_replan_delay_minutes")]
    pub replan_delay_minutes: i64,
}

/// Heating curve for one zone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatingConfig {
    #[serde(default = "default_zone")]
    pub zone: u8,
    /// Idle nudges never go below this
    #[serde(default = "default_heating_temp_min")]
    pub temp_min: f64,
    #[serde(default = "default_heating_temp_night")]
    pub temp_night: f64,
    #[serde(default = "default_heating_temp_day")]
    pub temp_day: f64,
    /// Cold nights below this keep the day setpoint unless tomorrow is sunny
    #[serde(default = "default_fade_min_temp_night")]
    pub fade_min_temp_night: f64,
    /// Nights at or below this never drop
    #[serde(default = "default_fade_min_temp_force_off")]
    pub fade_min_temp_force_off: f64,
    #[serde(default = "default_fade_min_clearsky_ratio")]
    pub fade_min_clearsky_ratio: f64,
    #[serde(default = "default_fade_period_hours")]
    pub fade_period_hours: f64,
    #[serde(default)]
    pub fade_during: FadeDuring,
    #[serde(default = "default_fade_steps")]
    pub fade_steps: u32,
    /// Production threshold defining the daily production window
    #[serde(default = "default_production_min_kw")]
    pub production_min_kw: f64,
    #[serde(default = "default_idle_debounce_minutes")]
    pub idle_debounce_minutes: i64,
    #[serde(default = "default_idle_decrement")]
    pub idle_decrement: f64,
    #[serde(default)]
    pub buffer: HeatingBufferConfig,
    #[serde(default)]
    pub summer: SummerConfig,
}

/// Mid-day raise while surplus power is available
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatingBufferConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Degrees added on top of the day setpoint
    #[serde(default = "default_buffer_raise")]
    pub raise: f64,
    #[serde(default = "default_buffer_min_clearsky_ratio")]
    pub min_clearsky_ratio: f64,
    /// Only buffer when tonight's median is at or below this
    #[serde(default = "default_buffer_max_night_temp")]
    pub max_night_temp: f64,
    #[serde(default = "default_buffer_min_window_hours")]
    pub min_window_hours: f64,
    /// Measured over expected production, checked live
    #[serde(default = "default_buffer_min_production_ratio")]
    pub min_production_ratio: f64,
    #[serde(default = "default_buffer_max_net_power_w")]
    pub max_net_power_w: f64,
}

/// Flat low setpoint on warm days
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_summer_setpoint")]
    pub setpoint: f64,
    #[serde(default = "default_summer_min_outside_temp")]
    pub min_outside_temp: f64,
    #[serde(default = "default_summer_min_inside_temp")]
    pub min_inside_temp: f64,
}

fn default_timezone() -> String {
    "Europe/Brussels".to_owned()
}

fn default_max_retry() -> u32 {
    3
}

fn default_min_interval_minutes() -> i64 {
    30
}

fn default_retry_interval_minutes() -> i64 {
    15
}

fn default_auto_step_max_temp() -> f64 {
    5.0
}

fn default_start_tolerance_secs() -> i64 {
    35
}

fn default_pending_timeout_minutes() -> i64 {
    15
}

fn default_buffer_interval() -> f64 {
    2.0
}

fn default_step() -> f64 {
    1.0
}

fn default_power_window() -> usize {
    8
}

fn default_consumption_stddev_factor() -> f64 {
    1.5
}

fn default_temp_off() -> f64 {
    10.0
}

fn default_temp_base() -> f64 {
    45.0
}

fn default_temp_buffer() -> f64 {
    55.0
}

fn default_temp_drop() -> f64 {
    5.0
}

fn default_temp_drop_device() -> f64 {
    5.0
}

fn default_dhw_runtime_hours() -> f64 {
    2.0
}

fn default_dhw_max_interval_hours() -> f64 {
    36.0
}

fn default_dhw_energy_kwh() -> f64 {
    3.0
}

fn default_legionella_temp() -> f64 {
    60.0
}

fn default_legionella_interval_days() -> i64 {
    7
}

fn default_legionella_min_interval_days() -> i64 {
    5
}

fn default_legionella_runtime_hours() -> f64 {
    3.0
}

fn default_legionella_energy_kwh() -> f64 {
    5.0
}

fn default_device_max_runtime_hours() -> f64 {
    4.0
}

fn default_force_below_outside_temp() -> f64 {
    2.0
}

fn default_replan_delay_minutes() -> i64 {
    60
}

fn default_zone() -> u8 {
    1
}

fn default_heating_temp_min() -> f64 {
    18.0
}

fn default_heating_temp_night() -> f64 {
    19.0
}

fn default_heating_temp_day() -> f64 {
    21.0
}

fn default_fade_min_temp_night() -> f64 {
    2.0
}

fn default_fade_min_temp_force_off() -> f64 {
    -5.0
}

fn default_fade_min_clearsky_ratio() -> f64 {
    0.4
}

fn default_fade_period_hours() -> f64 {
    3.0
}

fn default_fade_steps() -> u32 {
    3
}

fn default_production_min_kw() -> f64 {
    0.5
}

fn default_idle_debounce_minutes() -> i64 {
    9
}

fn default_idle_decrement() -> f64 {
    0.5
}

fn default_buffer_raise() -> f64 {
    1.0
}

fn default_buffer_min_clearsky_ratio() -> f64 {
    0.6
}

fn default_buffer_max_night_temp() -> f64 {
    5.0
}

fn default_buffer_min_window_hours() -> f64 {
    4.0
}

fn default_buffer_min_production_ratio() -> f64 {
    0.8
}

fn default_buffer_max_net_power_w() -> f64 {
    0.0
}

fn default_summer_setpoint() -> f64 {
    15.0
}

fn default_summer_min_outside_temp() -> f64 {
    18.0
}

fn default_summer_min_inside_temp() -> f64 {
    22.0
}

/// Fractional hours to a duration, at second precision
#[expect(
    clippy::cast_possible_truncation,
    reason = "configured durations are a few days at most"
)]
pub fn hours(value: f64) -> TimeDelta {
    TimeDelta::seconds((value * 3600.0).round() as i64)
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            cycle: CycleTimingConfig::default(),
            dhw: DhwConfig::default(),
            legionella: LegionellaConfig::default(),
            heating: HeatingConfig::default(),
        }
    }
}

impl Default for CycleTimingConfig {
    fn default() -> Self {
        Self {
            max_retry: default_max_retry(),
            min_interval_minutes: default_min_interval_minutes(),
            retry_interval_minutes: default_retry_interval_minutes(),
            running_mode: RunningMode::default(),
            auto_step_max_temp: default_auto_step_max_temp(),
            start_tolerance_secs: default_start_tolerance_secs(),
            pending_timeout_minutes: default_pending_timeout_minutes(),
            buffer_interval: default_buffer_interval(),
            step: default_step(),
            power_window: default_power_window(),
            consumption_stddev_factor: default_consumption_stddev_factor(),
        }
    }
}

impl Default for DhwConfig {
    fn default() -> Self {
        Self {
            temp_off: default_temp_off(),
            temp_base: default_temp_base(),
            temp_buffer: default_temp_buffer(),
            temp_drop: default_temp_drop(),
            temp_drop_device: default_temp_drop_device(),
            runtime_hours: default_dhw_runtime_hours(),
            max_interval_hours: default_dhw_max_interval_hours(),
            energy_kwh: default_dhw_energy_kwh(),
        }
    }
}

impl Default for LegionellaConfig {
    fn default() -> Self {
        Self {
            temp: default_legionella_temp(),
            interval_days: default_legionella_interval_days(),
            min_interval_days: default_legionella_min_interval_days(),
            runtime_hours: default_legionella_runtime_hours(),
            energy_kwh: default_legionella_energy_kwh(),
            device_max_runtime_hours: default_device_max_runtime_hours(),
            force_below_outside_temp: default_force_below_outside_temp(),
            replan_delay_minutes: default_replan_delay_minutes(),
        }
    }
}

impl Default for HeatingConfig {
    fn default() -> Self {
        Self {
            zone: default_zone(),
            temp_min: default_heating_temp_min(),
            temp_night: default_heating_temp_night(),
            temp_day: default_heating_temp_day(),
            fade_min_temp_night: default_fade_min_temp_night(),
            fade_min_temp_force_off: default_fade_min_temp_force_off(),
            fade_min_clearsky_ratio: default_fade_min_clearsky_ratio(),
            fade_period_hours: default_fade_period_hours(),
            fade_during: FadeDuring::default(),
            fade_steps: default_fade_steps(),
            production_min_kw: default_production_min_kw(),
            idle_debounce_minutes: default_idle_debounce_minutes(),
            idle_decrement: default_idle_decrement(),
            buffer: HeatingBufferConfig::default(),
            summer: SummerConfig::default(),
        }
    }
}

impl Default for HeatingBufferConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            raise: default_buffer_raise(),
            min_clearsky_ratio: default_buffer_min_clearsky_ratio(),
            max_night_temp: default_buffer_max_night_temp(),
            min_window_hours: default_buffer_min_window_hours(),
            min_production_ratio: default_buffer_min_production_ratio(),
            max_net_power_w: default_buffer_max_net_power_w(),
        }
    }
}

impl Default for SummerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            setpoint: default_summer_setpoint(),
            min_outside_temp: default_summer_min_outside_temp(),
            min_inside_temp: default_summer_min_inside_temp(),
        }
    }
}

impl CycleTimingConfig {
    pub fn min_interval(&self) -> TimeDelta {
        TimeDelta::minutes(self.min_interval_minutes)
    }

    pub fn retry_interval(&self) -> TimeDelta {
        TimeDelta::minutes(self.retry_interval_minutes)
    }

    pub fn start_tolerance(&self) -> TimeDelta {
        TimeDelta::seconds(self.start_tolerance_secs)
    }

    pub fn pending_timeout(&self) -> TimeDelta {
        TimeDelta::minutes(self.pending_timeout_minutes)
    }
}

impl DhwConfig {
    pub fn runtime(&self) -> TimeDelta {
        hours(self.runtime_hours)
    }

    pub fn max_interval(&self) -> TimeDelta {
        hours(self.max_interval_hours)
    }

    /// Tank temperature above which no normal cycle is needed
    pub fn still_hot_threshold(&self) -> f64 {
        self.temp_base - self.temp_drop
    }
}

impl LegionellaConfig {
    pub fn interval(&self) -> TimeDelta {
        TimeDelta::days(self.interval_days)
    }

    pub fn min_interval(&self) -> TimeDelta {
        TimeDelta::days(self.min_interval_days)
    }

    pub fn runtime(&self) -> TimeDelta {
        hours(self.runtime_hours)
    }

    pub fn device_max_runtime(&self) -> TimeDelta {
        hours(self.device_max_runtime_hours)
    }

    pub fn replan_delay(&self) -> TimeDelta {
        TimeDelta::minutes(self.replan_delay_minutes)
    }
}

impl HeatingConfig {
    pub fn fade_period(&self) -> TimeDelta {
        hours(self.fade_period_hours)
    }

    pub fn idle_debounce(&self) -> TimeDelta {
        TimeDelta::minutes(self.idle_debounce_minutes)
    }
}

impl ControllerConfig {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Invalid timezone '{}': {e}", self.timezone))
    }

    /// Reject settings the control loop cannot work with
    pub fn validate(&self) -> Result<()> {
        self.tz()?;

        let dhw = &self.dhw;
        if !(dhw.temp_off < dhw.temp_base && dhw.temp_base <= dhw.temp_buffer) {
            bail!("dhw temperatures must satisfy temp_off < temp_base <= temp_buffer");
        }
        if self.legionella.temp <= dhw.temp_base {
            bail!("legionella.temp must be above dhw.temp_base");
        }
        if dhw.max_interval() - dhw.runtime() <= self.cycle.min_interval() {
            bail!("dhw.max_interval_hours must leave room for the runtime and the minimum lead time");
        }
        if self.legionella.min_interval_days > self.legionella.interval_days {
            bail!("legionella.min_interval_days must not exceed legionella.interval_days");
        }
        if self.cycle.power_window == 0 {
            bail!("cycle.power_window must be at least 1");
        }
        if self.cycle.step <= 0.0 {
            bail!("cycle.step must be positive");
        }

        let heating = &self.heating;
        if heating.fade_steps == 0 {
            bail!("heating.fade_steps must be at least 1");
        }
        if heating.temp_night > heating.temp_day {
            bail!("heating.temp_night must not exceed heating.temp_day");
        }
        if heating.fade_period_hours < 0.0 {
            bail!("heating.fade_period_hours must not be negative");
        }
        Ok(())
    }
}
