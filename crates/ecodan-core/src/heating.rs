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

//! Daily heating setpoint curve
//!
//! The curve fades from the night setpoint up to the day setpoint around the
//! start of solar production and back down around its end. Cold and cloudy
//! nights keep the day setpoint, warm days switch to a flat summer setpoint.

use chrono::{DateTime, Days, Utc};
use tracing::{debug, info};

use ecodan_types::{
    DhwMode, HeatingConfig, HeatingPlanPoint, MeasurementKind, PeriodStats, PlanPointKind,
    ProductionWeather, SetpointRecord, SetpointRole, TimeRange,
};

use crate::context::ControlContext;
use crate::error::{ControlError, ControlResult};

/// Local hour the night forecast window starts today
const NIGHT_START_HOUR: u32 = 20;
/// Local hour the night forecast window ends tomorrow
const NIGHT_END_HOUR: u32 = 8;

/// Everything the curve depends on, gathered once per plan
#[derive(Debug, Clone)]
pub struct HeatingInputs {
    /// Local midnight starting the planned day
    pub midnight: DateTime<Utc>,
    /// Today's production window
    pub production: TimeRange,
    /// Outside temperature forecast for the coming night
    pub night: PeriodStats,
    pub today_weather: ProductionWeather,
    pub tomorrow_weather: ProductionWeather,
    /// Heating setpoint currently configured on the device
    pub device_heating: f64,
    /// Forecast outside temperature during production, only read when summer mode is on
    pub day_outside: Option<PeriodStats>,
    /// Measured house temperature
    pub house: Option<PeriodStats>,
}

/// Build the curve for one day
pub fn build_heating_plan(config: &HeatingConfig, inputs: &HeatingInputs) -> Vec<HeatingPlanPoint> {
    if is_summer(config, inputs) {
        return vec![HeatingPlanPoint::new(
            inputs.midnight,
            config.summer.setpoint,
            PlanPointKind::Drop,
        )];
    }

    let steps = config.fade_steps.max(1);
    let (offset_sunrise, offset_sunset) = config.fade_during.offsets(config.fade_period());
    let interval = config.fade_period() / i32::try_from(steps).unwrap_or(i32::MAX);

    let day = config.temp_day;
    let night = config.temp_night.min(inputs.device_heating);
    let step = (day - night) / f64::from(steps);

    let raise_start = inputs.production.start - offset_sunrise;
    let drop_start = inputs.production.end - offset_sunset;

    let mut points = vec![HeatingPlanPoint::new(raise_start, night, PlanPointKind::Raise)];
    for i in 1..=steps {
        let at = raise_start + interval * i32::try_from(i).unwrap_or(i32::MAX);
        let setpoint = if i == steps {
            day
        } else {
            night + step * f64::from(i)
        };
        points.push(HeatingPlanPoint::new(at, setpoint, PlanPointKind::Raise));
    }
    let raise_end = raise_start + config.fade_period();

    let night_median = inputs.night.q50;
    let keep_warm = night_median <= config.fade_min_temp_force_off
        || (night_median <= config.fade_min_temp_night
            && inputs.tomorrow_weather.ratio < config.fade_min_clearsky_ratio);

    if keep_warm {
        debug!(
            night_median,
            clearsky_ratio = inputs.tomorrow_weather.ratio,
            "Cold night ahead, keeping the day setpoint"
        );
    } else {
        points.push(HeatingPlanPoint::new(drop_start, day, PlanPointKind::Drop));
        for i in 1..=steps {
            let at = drop_start + interval * i32::try_from(i).unwrap_or(i32::MAX);
            let setpoint = if i == steps {
                night
            } else {
                day - step * f64::from(i)
            };
            points.push(HeatingPlanPoint::new(at, setpoint, PlanPointKind::Drop));
        }
    }

    if wants_buffer(config, inputs) && raise_end < drop_start {
        points.push(HeatingPlanPoint::new(
            raise_end,
            day + config.buffer.raise,
            PlanPointKind::RaiseBuffer,
        ));
        if keep_warm {
            points.push(HeatingPlanPoint::new(drop_start, day, PlanPointKind::Drop));
        }
    }

    // Stable, so a buffer point stays after the raise point sharing its timestamp
    points.sort_by_key(|point| point.timestamp);
    points
}

fn is_summer(config: &HeatingConfig, inputs: &HeatingInputs) -> bool {
    if !config.summer.enabled {
        return false;
    }
    match (&inputs.day_outside, &inputs.house) {
        (Some(outside), Some(house)) => {
            outside.q50 >= config.summer.min_outside_temp
                && house.q50 >= config.summer.min_inside_temp
        }
        _ => false,
    }
}

fn wants_buffer(config: &HeatingConfig, inputs: &HeatingInputs) -> bool {
    let buffer = &config.buffer;
    buffer.enabled
        && inputs.today_weather.ratio >= buffer.min_clearsky_ratio
        && inputs.night.q50 <= buffer.max_night_temp
        && inputs.production.duration().as_seconds_f64() / 3600.0 >= buffer.min_window_hours
}

/// Plans and applies the heating curve of one zone
#[derive(Debug)]
pub struct HeatingCurvePlanner {
    config: HeatingConfig,
    points: Vec<HeatingPlanPoint>,
    idle_since: Option<DateTime<Utc>>,
}

impl HeatingCurvePlanner {
    pub fn new(config: HeatingConfig) -> Self {
        Self {
            config,
            points: Vec::new(),
            idle_since: None,
        }
    }

    pub fn points(&self) -> &[HeatingPlanPoint] {
        &self.points
    }

    pub fn idle_since(&self) -> Option<DateTime<Utc>> {
        self.idle_since
    }

    fn role(&self) -> SetpointRole {
        SetpointRole::Heating {
            zone: self.config.zone,
        }
    }

    /// Rebuild today's curve from the forecast
    pub async fn plan(&mut self, ctx: &ControlContext) -> ControlResult<&[HeatingPlanPoint]> {
        let today = ctx.today();
        let tomorrow = today + Days::new(1);
        let night = TimeRange::new(
            ctx.local_instant(today, NIGHT_START_HOUR, 0),
            ctx.local_instant(tomorrow, NIGHT_END_HOUR, 0),
        );
        let today_range = TimeRange::new(ctx.start_of_local_day(today), ctx.end_of_local_day(today));
        let tomorrow_range =
            TimeRange::new(ctx.start_of_local_day(tomorrow), ctx.end_of_local_day(tomorrow));

        let forecast = &ctx.forecast;
        let (production, night_stats, tomorrow_weather, today_weather, device, house) = tokio::try_join!(
            async {
                forecast
                    .production_bounds(today, self.config.production_min_kw)
                    .await
                    .map_err(|source| ControlError::Forecast {
                        what: "production bounds",
                        source,
                    })
            },
            async {
                forecast
                    .temperature_stats(night)
                    .await
                    .map_err(|source| ControlError::Forecast {
                        what: "night temperature",
                        source,
                    })
            },
            async {
                forecast
                    .production_weather(tomorrow_range)
                    .await
                    .map_err(|source| ControlError::Forecast {
                        what: "tomorrow's weather",
                        source,
                    })
            },
            async {
                forecast
                    .production_weather(today_range)
                    .await
                    .map_err(|source| ControlError::Forecast {
                        what: "today's weather",
                        source,
                    })
            },
            ctx.device_setpoint(),
            async {
                ctx.telemetry
                    .house_temperature_stats(None)
                    .await
                    .map_err(|source| ControlError::Telemetry {
                        what: "house temperature",
                        source,
                    })
            },
        )?;

        let day_outside = if self.config.summer.enabled {
            Some(
                forecast
                    .temperature_stats(production)
                    .await
                    .map_err(|source| ControlError::Forecast {
                        what: "daytime temperature",
                        source,
                    })?,
            )
        } else {
            None
        };

        let inputs = HeatingInputs {
            midnight: today_range.start,
            production,
            night: night_stats,
            today_weather,
            tomorrow_weather,
            device_heating: device.heating,
            day_outside,
            house,
        };
        self.points = build_heating_plan(&self.config, &inputs);

        info!(
            points = self.points.len(),
            production_start = %production.start,
            production_end = %production.end,
            night_median = inputs.night.q50,
            "🏠 Planned heating curve"
        );
        for point in &self.points {
            debug!(
                "  {} {:?} {:.1}°",
                point.timestamp, point.kind, point.setpoint
            );
        }
        Ok(&self.points)
    }

    /// Live check for a mid-day buffer raise
    async fn buffer_admitted(&self, ctx: &ControlContext) -> ControlResult<bool> {
        let now = ctx.now();
        let today = ctx.today();
        let day = TimeRange::new(ctx.start_of_local_day(today), ctx.end_of_local_day(today));
        let so_far = TimeRange::new(day.start, now);

        let forecast = &ctx.forecast;
        let weather = |range: TimeRange| async move {
            forecast
                .production_weather(range)
                .await
                .map_err(|source| ControlError::Forecast {
                    what: "production weather",
                    source,
                })
        };
        let (day_weather, so_far_weather, produced, net) = tokio::try_join!(
            weather(day),
            weather(so_far),
            ctx.measurement(MeasurementKind::DailyProduction),
            ctx.measurement(MeasurementKind::NetPower),
        )?;

        let buffer = &self.config.buffer;
        let production_ratio = match so_far_weather.expected_kwh {
            Some(expected) if expected > 0.0 => produced.value / expected,
            _ => 0.0,
        };
        let admitted = day_weather.ratio >= buffer.min_clearsky_ratio
            && production_ratio >= buffer.min_production_ratio
            && net.value <= buffer.max_net_power_w;
        debug!(
            clearsky_ratio = day_weather.ratio,
            production_ratio,
            net_power = net.value,
            admitted,
            "Evaluated heating buffer"
        );
        Ok(admitted)
    }

    /// Point in force at `now`, deciding buffer points with `buffer_admitted`
    async fn active_point(&self, ctx: &ControlContext) -> ControlResult<Option<HeatingPlanPoint>> {
        let now = ctx.now();
        let Some(index) = self.points.iter().rposition(|point| point.timestamp <= now) else {
            return Ok(None);
        };

        let point = &self.points[index];
        if point.kind != PlanPointKind::RaiseBuffer || self.buffer_admitted(ctx).await? {
            return Ok(Some(point.clone()));
        }

        debug!("Heating buffer not admitted, using previous point");
        Ok(self.points[..index]
            .iter()
            .rev()
            .find(|point| point.kind != PlanPointKind::RaiseBuffer)
            .cloned())
    }

    /// Apply the curve point in force, returning the setpoint sent to the device
    pub async fn evaluate(&self, ctx: &ControlContext) -> ControlResult<Option<f64>> {
        let Some(point) = self.active_point(ctx).await? else {
            debug!("No heating point in force yet");
            return Ok(None);
        };

        let role = self.role();
        let state = match ctx.setpoint(role)? {
            Some(record) => record,
            None => {
                let device = ctx.device_setpoint().await?;
                let value = ctx.save_setpoint(role, device.heating)?;
                debug!("Bootstrapped heating state from device: {value:.1}°");
                SetpointRecord::new(role, value, ctx.now())
            }
        };

        if state.equals(point.setpoint) {
            return Ok(None);
        }

        let device = ctx.device_setpoint().await?.heating;
        match point.kind {
            PlanPointKind::Raise | PlanPointKind::RaiseBuffer if point.setpoint <= device => {
                debug!(
                    "Device heating at {device:.1}° already above raise to {:.1}°",
                    point.setpoint
                );
                return Ok(None);
            }
            PlanPointKind::Drop if point.setpoint >= device => {
                debug!(
                    "Device heating at {device:.1}° already below drop to {:.1}°",
                    point.setpoint
                );
                return Ok(None);
            }
            PlanPointKind::Raise | PlanPointKind::RaiseBuffer | PlanPointKind::Drop => {}
        }

        ctx.actuate_heating(point.setpoint).await?;
        ctx.save_setpoint(role, point.setpoint)?;
        Ok(Some(point.setpoint))
    }

    /// Nudge the curve down while the compressor keeps pausing
    pub async fn check_idling(&mut self, ctx: &ControlContext) -> ControlResult<Option<f64>> {
        let mode = ctx.dhw_mode()?.mode;
        let status = ctx.device_status().await?;
        if mode != DhwMode::Off || status.is_defrosting() {
            return Ok(None);
        }

        let now = ctx.now();
        if !status.is_idle() {
            if self.idle_since.take().is_some() {
                debug!("Heat pump no longer idle");
            }
            return Ok(None);
        }

        let Some(since) = self.idle_since else {
            debug!("Heat pump idle, watching");
            self.idle_since = Some(now);
            return Ok(None);
        };
        if now - since < self.config.idle_debounce() {
            return Ok(None);
        }

        let heating = ctx.device_setpoint().await?.heating;
        if heating <= self.config.temp_min {
            debug!("Heating at {heating:.1}° already at minimum");
            return Ok(None);
        }

        let lowered = (heating - self.config.idle_decrement).max(self.config.temp_min);
        info!(
            idle_for = %(now - since),
            "Heat pump idling, lowering heating to {lowered:.1}°"
        );
        self.points
            .push(HeatingPlanPoint::new(now, lowered, PlanPointKind::Drop));
        Ok(Some(lowered))
    }

    /// Take the device heating setpoint as the persisted state
    pub async fn update_from_state(&self, ctx: &ControlContext) -> ControlResult<f64> {
        let device = ctx.device_setpoint().await?;
        debug!("Heating state from device: {:.1}°", device.heating);
        ctx.save_setpoint(self.role(), device.heating)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, minute, 0).unwrap()
    }

    fn stats(q50: f64) -> PeriodStats {
        PeriodStats {
            start: at(0, 0),
            end: at(0, 0),
            unit: "°C".to_owned(),
            q25: q50 - 1.0,
            q50,
            q75: q50 + 1.0,
            stddev: 1.0,
        }
    }

    fn weather(ratio: f64) -> ProductionWeather {
        ProductionWeather {
            ratio,
            expected_kwh: None,
        }
    }

    fn inputs(night_median: f64, tomorrow_ratio: f64) -> HeatingInputs {
        HeatingInputs {
            midnight: at(0, 0),
            production: TimeRange::new(at(7, 0), at(17, 0)),
            night: stats(night_median),
            today_weather: weather(0.8),
            tomorrow_weather: weather(tomorrow_ratio),
            device_heating: 20.0,
            day_outside: None,
            house: None,
        }
    }

    fn setpoints(points: &[HeatingPlanPoint]) -> Vec<f64> {
        points.iter().map(|point| point.setpoint).collect()
    }

    #[test]
    fn test_fades_around_production_window() {
        let config = HeatingConfig::default();
        let points = build_heating_plan(&config, &inputs(5.0, 0.8));

        assert_eq!(points.len(), 8);
        assert_eq!(points[0].timestamp, at(5, 30));
        assert_eq!(points[3].timestamp, at(8, 30));
        assert_eq!(points[4].timestamp, at(15, 30));
        assert_eq!(points[7].timestamp, at(18, 30));
        assert_eq!(
            setpoints(&points),
            vec![19.0, 19.7, 20.3, 21.0, 21.0, 20.3, 19.7, 19.0]
        );
        assert!(points[..4].iter().all(|p| p.kind == PlanPointKind::Raise));
        assert!(points[4..].iter().all(|p| p.kind == PlanPointKind::Drop));
    }

    #[test]
    fn test_night_setpoint_never_above_device() {
        let config = HeatingConfig::default();
        let mut inputs = inputs(5.0, 0.8);
        inputs.device_heating = 18.0;

        let points = build_heating_plan(&config, &inputs);
        assert_eq!(points[0].setpoint, 18.0);
        assert_eq!(points[3].setpoint, 21.0);
        assert_eq!(points[7].setpoint, 18.0);
    }

    #[test]
    fn test_cold_cloudy_night_keeps_day_setpoint() {
        let config = HeatingConfig::default();

        let cloudy = build_heating_plan(&config, &inputs(1.0, 0.3));
        assert_eq!(cloudy.len(), 4);
        assert!(cloudy.iter().all(|p| p.kind == PlanPointKind::Raise));

        let sunny = build_heating_plan(&config, &inputs(1.0, 0.5));
        assert_eq!(sunny.len(), 8);

        let freezing = build_heating_plan(&config, &inputs(-6.0, 0.9));
        assert_eq!(freezing.len(), 4);
    }

    #[test]
    fn test_fade_during_day_starts_at_production_start() {
        let config = HeatingConfig {
            fade_during: ecodan_types::FadeDuring::Day,
            ..HeatingConfig::default()
        };
        let points = build_heating_plan(&config, &inputs(5.0, 0.8));
        assert_eq!(points[0].timestamp, at(7, 0));
        assert_eq!(points[4].timestamp, at(14, 0));
        assert_eq!(points[7].timestamp, at(17, 0));
    }

    #[test]
    fn test_summer_override() {
        let mut config = HeatingConfig::default();
        config.summer.enabled = true;
        let mut inputs = inputs(15.0, 0.9);
        inputs.day_outside = Some(stats(24.0));
        inputs.house = Some(stats(23.0));

        let points = build_heating_plan(&config, &inputs);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].timestamp, at(0, 0));
        assert_eq!(points[0].setpoint, 15.0);
        assert_eq!(points[0].kind, PlanPointKind::Drop);

        inputs.house = Some(stats(21.0));
        assert_eq!(build_heating_plan(&config, &inputs).len(), 8);
    }

    #[test]
    fn test_buffer_point_after_raise() {
        let mut config = HeatingConfig::default();
        config.buffer.enabled = true;

        let points = build_heating_plan(&config, &inputs(3.0, 0.8));
        assert_eq!(points.len(), 9);
        assert_eq!(points[3].kind, PlanPointKind::Raise);
        assert_eq!(points[4].kind, PlanPointKind::RaiseBuffer);
        assert_eq!(points[4].timestamp, at(8, 30));
        assert_eq!(points[4].setpoint, 22.0);
        assert_eq!(points[5].kind, PlanPointKind::Drop);
        assert_eq!(points[5].setpoint, 21.0);

        // Warm night, no buffering
        let warm = build_heating_plan(&config, &inputs(8.0, 0.8));
        assert!(warm.iter().all(|p| p.kind != PlanPointKind::RaiseBuffer));
    }
}
