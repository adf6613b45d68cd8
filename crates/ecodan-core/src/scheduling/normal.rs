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

use chrono::TimeDelta;
use tracing::{debug, info};

use ecodan_types::{
    ControllerConfig, CycleKind, CycleTimingConfig, DhwConfig, DhwMode, LegionellaConfig,
    MeasurementKind, RunningMode, ScheduledCycle, SearchOrder, SetpointRole, TimeRange,
};

use super::{DutyCycleScheduler, StartOutcome, apply_start_setpoints};
use crate::admission::LoadAdmission;
use crate::context::ControlContext;
use crate::error::{ControlError, ControlResult};
use crate::ramp::{BufferVerdict, RampConfig, RampController};

/// A legionella cycle due within `runtime + N × min_interval` makes a normal start pointless
const LEGIONELLA_PREEMPT_INTERVALS: i32 = 4;

/// Buffering hands over to a legionella cycle due within `runtime + N × min_interval`
const LEGIONELLA_HANDOVER_INTERVALS: i32 = 16;

/// Hours of outdoor forecast considered at the planned legionella start
const HANDOVER_FORECAST_HOURS: i64 = 2;

/// What a buffering evaluation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferOutcome {
    /// No normal cycle is running
    NotApplicable,
    /// Tank has not caught up with the current step yet
    Waiting,
    /// Running, but not exporting on the heat pump alone
    NotEntered,
    Buffering,
    Stopped,
    /// The tank is hot enough to finish as a legionella cycle
    HandOverToLegionella,
}

/// Normal DHW heat-up cycle
#[derive(Debug)]
pub struct NormalCycleService {
    scheduler: DutyCycleScheduler,
    timing: CycleTimingConfig,
    dhw: DhwConfig,
    legionella: LegionellaConfig,
    ramp: RampController,
}

impl NormalCycleService {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            scheduler: DutyCycleScheduler::new(
                CycleKind::Normal,
                config.dhw.runtime(),
                config.dhw.energy_kwh,
                &config.cycle,
            ),
            timing: config.cycle.clone(),
            dhw: config.dhw.clone(),
            legionella: config.legionella.clone(),
            ramp: RampController::new(RampConfig::from(&config.cycle), config.cycle.power_window),
        }
    }

    pub fn scheduler(&self) -> &DutyCycleScheduler {
        &self.scheduler
    }

    pub fn ramp(&self) -> &RampController {
        &self.ramp
    }

    fn preempt_horizon(&self) -> TimeDelta {
        self.dhw.runtime() + self.timing.min_interval() * LEGIONELLA_PREEMPT_INTERVALS
    }

    fn handover_horizon(&self) -> TimeDelta {
        self.dhw.runtime() + self.timing.min_interval() * LEGIONELLA_HANDOVER_INTERVALS
    }

    // ============= Scheduling =============

    pub async fn plan(&self, ctx: &ControlContext) -> ControlResult<Option<ScheduledCycle>> {
        let now = ctx.now();

        let mode = ctx.dhw_mode()?;
        if mode.mode.is_active_cycle() {
            debug!("DHW is in mode {}, not planning a normal cycle", mode.mode);
            return Ok(None);
        }

        if let Some(cycle) = ctx.cycle(CycleKind::Normal)?
            && cycle.planned_start >= now
        {
            debug!("Normal cycle already planned at {}", cycle.planned_start);
            return Ok(None);
        }

        let tank = ctx.tank_temperature().await?;
        if tank > self.dhw.still_hot_threshold() {
            debug!(
                "DHW at {tank}° is above {}°, no normal cycle needed",
                self.dhw.still_hot_threshold()
            );
            return Ok(None);
        }

        let first_start = now + self.timing.min_interval();
        let ultimate_start = now + self.dhw.max_interval() - self.dhw.runtime();
        self.scheduler
            .plan_window(ctx, first_start, ultimate_start, SearchOrder::First)
            .await
            .map(Some)
    }

    pub async fn reschedule(&self, ctx: &ControlContext) -> ControlResult<Option<ScheduledCycle>> {
        let Some(cycle) = ctx.cycle(CycleKind::Normal)? else {
            debug!("No normal cycle planned, nothing to reschedule");
            return Ok(None);
        };

        let tank = ctx.tank_temperature().await?;
        if tank > self.dhw.still_hot_threshold() {
            info!("DHW still at {tank}°, dropping the planned normal cycle");
            ctx.delete_cycle(CycleKind::Normal)?;
            return Ok(None);
        }

        let (first_start, ultimate_start) = (cycle.first_start, cycle.ultimate_start);
        self.scheduler
            .reschedule_window(ctx, cycle, first_start, ultimate_start)
            .await
    }

    pub async fn postpone(&self, ctx: &ControlContext) -> ControlResult<Option<ScheduledCycle>> {
        self.scheduler.postpone(ctx).await
    }

    // ============= Start / stop =============

    pub async fn start(
        &mut self,
        ctx: &ControlContext,
        admission: &LoadAdmission,
    ) -> ControlResult<StartOutcome> {
        let mode = ctx.dhw_mode()?.mode;
        if mode.cycle_kind().is_some() {
            debug!("DHW already in mode {mode}, not starting a normal cycle");
            return Ok(StartOutcome::AlreadyActive);
        }

        let now = ctx.now();
        if let Some(legionella) = ctx.cycle(CycleKind::Legionella)?
            && legionella.planned_start <= now + self.preempt_horizon()
        {
            info!(
                "Legionella cycle planned at {} makes the normal cycle unnecessary",
                legionella.planned_start
            );
            ctx.delete_cycle(CycleKind::Normal)?;
            return Ok(StartOutcome::PreEmpted);
        }

        if !admission.can_start(ctx).await? && !self.scheduler.postpone_or_start_anyway(ctx).await?
        {
            return Ok(StartOutcome::Postponed);
        }

        info!("{} Starting normal DHW cycle", CycleKind::Normal.symbol());
        apply_start_setpoints(
            ctx,
            &self.timing,
            self.dhw.temp_base,
            self.dhw.temp_drop_device,
        )
        .await?;
        ctx.set_dhw_mode(DhwMode::PendingNormal)?;
        ctx.delete_cycle(CycleKind::Normal)?;
        self.ramp.reset();
        Ok(StartOutcome::Started)
    }

    pub async fn stop(&mut self, ctx: &ControlContext) -> ControlResult<()> {
        info!("Stopping normal DHW cycle");
        ctx.actuate_dhw(self.dhw.temp_off).await?;
        ctx.set_dhw_mode(DhwMode::Off)?;
        ctx.save_setpoint(SetpointRole::DhwCurrent, self.dhw.temp_base)?;
        self.ramp.reset();
        Ok(())
    }

    /// Leave buffering, falling back to a plain run while the tank is below base
    pub async fn stop_buffer(&mut self, ctx: &ControlContext) -> ControlResult<()> {
        let tank = ctx.tank_temperature().await?;
        if tank < self.dhw.temp_base {
            info!("DHW at {tank}° is below base, back to a normal run");
            ctx.actuate_dhw(self.dhw.temp_base).await?;
            ctx.set_dhw_mode(DhwMode::RunningNormal)?;
            ctx.save_setpoint(SetpointRole::DhwCurrent, self.dhw.temp_base)?;
            self.ramp.reset();
            return Ok(());
        }
        self.stop(ctx).await
    }

    // ============= Ramp =============

    /// Advance a staged start towards the DHW target
    pub async fn step(&self, ctx: &ControlContext) -> ControlResult<Option<f64>> {
        let mode = ctx.dhw_mode()?.mode;
        if self.timing.running_mode == RunningMode::Normal
            || !matches!(mode, DhwMode::RunningNormal | DhwMode::RunningStepped)
        {
            return Ok(None);
        }

        let (Some(current), Some(target)) = (
            ctx.setpoint(SetpointRole::DhwCurrent)?,
            ctx.setpoint(SetpointRole::DhwTarget)?,
        ) else {
            debug!("DHW setpoints missing, not stepping");
            return Ok(None);
        };
        let tank = ctx.tank_temperature().await?;

        if mode == DhwMode::RunningNormal {
            if current.value >= target.value || current.equals(target.value) {
                return Ok(None);
            }
            if !self.ramp.config.has_caught_up(tank, current.value) {
                debug!("DHW at {tank}° still heating up to {}°", current.value);
                return Ok(None);
            }
            ctx.set_dhw_mode(DhwMode::RunningStepped)?;
        }

        self.ramp.config.advance(ctx, tank, target.value).await
    }

    /// Opportunistic over-heating while exporting
    pub async fn buffer(&mut self, ctx: &ControlContext) -> ControlResult<BufferOutcome> {
        let mode = ctx.dhw_mode()?.mode;
        if !mode.is_running_normal() {
            return Ok(BufferOutcome::NotApplicable);
        }

        let (net, status, tank) = tokio::try_join!(
            ctx.measurement(MeasurementKind::NetPower),
            ctx.device_status(),
            ctx.tank_temperature(),
        )?;

        if mode != DhwMode::RunningBuffer {
            let current = ctx
                .setpoint(SetpointRole::DhwCurrent)?
                .map_or(self.dhw.temp_base, |record| record.value);
            if !self.ramp.config.has_caught_up(tank, current) {
                debug!("DHW at {tank}° not yet near {current}°, not buffering");
                return Ok(BufferOutcome::Waiting);
            }
            if !self.ramp.enter_buffering(&status, net.value) {
                debug!(
                    net_power = net.value,
                    heat_source = ?status.heat_source,
                    "Not buffering"
                );
                return Ok(BufferOutcome::NotEntered);
            }
            info!(net_power = net.value, "🔋 Exporting power, buffering DHW");
            ctx.set_dhw_mode(DhwMode::RunningBuffer)?;
        }

        if self.should_hand_over(ctx, tank).await? {
            return Ok(BufferOutcome::HandOverToLegionella);
        }

        if status.is_boosting() {
            info!("Auxiliary heater active while buffering, stopping buffer");
            self.stop_buffer(ctx).await?;
            return Ok(BufferOutcome::Stopped);
        }

        if self.ramp.record_power(net.value) == BufferVerdict::Stop {
            info!(
                samples = ?self.ramp.window().samples(),
                "No longer exporting, stopping buffer"
            );
            self.stop_buffer(ctx).await?;
            return Ok(BufferOutcome::Stopped);
        }

        self.ramp.config.advance(ctx, tank, self.dhw.temp_buffer).await?;
        Ok(BufferOutcome::Buffering)
    }

    async fn should_hand_over(&self, ctx: &ControlContext, tank: f64) -> ControlResult<bool> {
        if tank < self.legionella.temp - self.dhw.temp_drop_device {
            return Ok(false);
        }
        let Some(legionella) = ctx.cycle(CycleKind::Legionella)? else {
            return Ok(false);
        };

        let range = TimeRange::new(
            legionella.planned_start,
            legionella.planned_start + TimeDelta::hours(HANDOVER_FORECAST_HOURS),
        );
        let outdoor = ctx
            .forecast
            .temperature_stats(range)
            .await
            .map_err(|source| ControlError::Forecast {
                what: "outdoor temperature",
                source,
            })?;

        let due_soon = legionella.planned_start <= ctx.now() + self.handover_horizon();
        let cold = outdoor.q50 <= self.legionella.force_below_outside_temp;
        if due_soon || cold {
            info!(
                due_soon,
                outdoor_median = outdoor.q50,
                "DHW at {tank}°, finishing buffer as legionella cycle"
            );
            return Ok(true);
        }
        Ok(false)
    }

    // ============= Device reconciliation =============

    pub async fn update_from_state(&mut self, ctx: &ControlContext) -> ControlResult<BufferOutcome> {
        let (mode, status) = (ctx.dhw_mode()?.mode, ctx.device_status().await?);
        let heating_water = status.is_heating_water();

        match mode {
            DhwMode::Off if heating_water => {
                info!("Device heats water on its own, tracking manual run");
                ctx.set_dhw_mode(DhwMode::RunningManual)?;
            }
            DhwMode::RunningManual if !heating_water => {
                ctx.set_dhw_mode(DhwMode::Off)?;
            }
            DhwMode::PendingNormal if heating_water => {
                ctx.set_dhw_mode(DhwMode::RunningNormal)?;
            }
            DhwMode::RunningNormal | DhwMode::RunningStepped | DhwMode::RunningBuffer => {
                if !heating_water {
                    debug!("Device no longer heats water");
                    self.stop(ctx).await?;
                    return Ok(BufferOutcome::Stopped);
                }
                self.step(ctx).await?;
                return self.buffer(ctx).await;
            }
            DhwMode::Off
            | DhwMode::RunningManual
            | DhwMode::PendingNormal
            | DhwMode::PendingLegionella
            | DhwMode::RunningLegionella => {}
        }
        Ok(BufferOutcome::NotApplicable)
    }

    /// Setpoint bookkeeping after a buffer handed over to legionella
    pub fn finish_hand_over(&mut self, ctx: &ControlContext) -> ControlResult<()> {
        ctx.save_setpoint(SetpointRole::DhwCurrent, self.dhw.temp_base)?;
        self.ramp.reset();
        Ok(())
    }
}
