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

use chrono::{DateTime, Days, Utc};
use tracing::{debug, info, warn};

use ecodan_types::{
    ControllerConfig, CycleKind, CycleTimingConfig, DhwConfig, DhwMode, LegionellaConfig,
    RunningMode, ScheduledCycle, SearchOrder, SetpointRole,
};

use super::{DutyCycleScheduler, StartOutcome, apply_start_setpoints};
use crate::admission::LoadAdmission;
use crate::context::ControlContext;
use crate::error::{ControlError, ControlResult};
use crate::ramp::RampConfig;

/// Anti-legionella disinfection cycle
///
/// The tank has to reach the legionella temperature at least every
/// `interval_days`. Cycles are planned as late as possible before that
/// deadline, or as early as possible once it has passed.
#[derive(Debug)]
pub struct LegionellaService {
    scheduler: DutyCycleScheduler,
    config: LegionellaConfig,
    timing: CycleTimingConfig,
    dhw: DhwConfig,
    ramp: RampConfig,
    started_at: Option<DateTime<Utc>>,
    replan_at: Option<DateTime<Utc>>,
}

impl LegionellaService {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            scheduler: DutyCycleScheduler::new(
                CycleKind::Legionella,
                config.legionella.runtime(),
                config.legionella.energy_kwh,
                &config.cycle,
            ),
            config: config.legionella.clone(),
            timing: config.cycle.clone(),
            dhw: config.dhw.clone(),
            ramp: RampConfig::from(&config.cycle),
            started_at: None,
            replan_at: None,
        }
    }

    pub fn scheduler(&self) -> &DutyCycleScheduler {
        &self.scheduler
    }

    /// When the running cycle was started by this service
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Pending re-plan after a stop
    pub fn replan_at(&self) -> Option<DateTime<Utc>> {
        self.replan_at
    }

    /// End of the local day on which the next run is due
    fn deadline(&self, ctx: &ControlContext, last_start: DateTime<Utc>) -> DateTime<Utc> {
        ctx.end_of_local_day(ctx.local_date(last_start + self.config.interval()))
    }

    fn first_start_for(&self, ultimate_start: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
        let earliest_day = ultimate_start - (self.config.interval() - self.config.min_interval());
        earliest_day.max(now + self.timing.min_interval())
    }

    async fn last_start(&self, ctx: &ControlContext) -> ControlResult<DateTime<Utc>> {
        ctx.telemetry
            .last_legionella_start()
            .await
            .map_err(|source| ControlError::Telemetry {
                what: "last legionella start",
                source,
            })
    }

    // ============= Scheduling =============

    pub async fn plan(&mut self, ctx: &ControlContext) -> ControlResult<Option<ScheduledCycle>> {
        let now = ctx.now();

        if let Some(cycle) = ctx.cycle(CycleKind::Legionella)?
            && cycle.planned_start >= now
        {
            debug!("Legionella cycle already planned at {}", cycle.planned_start);
            return Ok(None);
        }

        let mode = ctx.dhw_mode()?.mode;
        if mode.is_legionella() {
            debug!("Legionella cycle in progress ({mode}), not planning");
            return Ok(None);
        }

        let last_start = self.last_start(ctx).await?;
        let mut ultimate_start = self.deadline(ctx, last_start);
        let mut order = SearchOrder::Last;

        if ultimate_start <= now {
            let tomorrow = ctx.today() + Days::new(1);
            warn!(
                "Legionella deadline {ultimate_start} already passed (last run {last_start}), planning by tomorrow"
            );
            ultimate_start = ctx.end_of_local_day(tomorrow);
            order = SearchOrder::First;
        }

        let first_start = self.first_start_for(ultimate_start, now);
        self.replan_at = None;
        self.scheduler
            .plan_window(ctx, first_start, ultimate_start, order)
            .await
            .map(Some)
    }

    pub async fn reschedule(&self, ctx: &ControlContext) -> ControlResult<Option<ScheduledCycle>> {
        let Some(cycle) = ctx.cycle(CycleKind::Legionella)? else {
            debug!("No legionella cycle planned, nothing to reschedule");
            return Ok(None);
        };

        let last_start = self.last_start(ctx).await?;
        let deadline = self.deadline(ctx, last_start);
        let (first_start, ultimate_start) = if deadline > cycle.ultimate_start {
            debug!("Legionella deadline moved to {deadline}, extending window");
            (self.first_start_for(deadline, ctx.now()), deadline)
        } else {
            (cycle.first_start, cycle.ultimate_start)
        };

        self.scheduler
            .reschedule_window(ctx, cycle, first_start, ultimate_start)
            .await
    }

    pub async fn postpone(&self, ctx: &ControlContext) -> ControlResult<Option<ScheduledCycle>> {
        self.scheduler.postpone(ctx).await
    }

    // ============= Start / stop =============

    /// Admission plus a tank that still needs heating
    pub async fn can_start_legionella(
        &self,
        ctx: &ControlContext,
        admission: &LoadAdmission,
    ) -> ControlResult<bool> {
        let (tank, admitted) = tokio::try_join!(ctx.tank_temperature(), admission.can_start(ctx))?;
        let ceiling = self.config.temp - self.dhw.temp_drop_device;
        if tank > ceiling {
            debug!("DHW at {tank}° is above {ceiling}°, device would not start");
            return Ok(false);
        }
        Ok(admitted)
    }

    pub async fn start(
        &mut self,
        ctx: &ControlContext,
        admission: &LoadAdmission,
        force: bool,
    ) -> ControlResult<StartOutcome> {
        let mode = ctx.dhw_mode()?.mode;
        if mode.is_legionella() {
            debug!("Legionella cycle already {mode}");
            return Ok(StartOutcome::AlreadyActive);
        }

        if !force
            && !self.can_start_legionella(ctx, admission).await?
            && !self.scheduler.postpone_or_start_anyway(ctx).await?
        {
            return Ok(StartOutcome::Postponed);
        }

        info!(force, "{} Starting legionella cycle", CycleKind::Legionella.symbol());
        apply_start_setpoints(ctx, &self.timing, self.config.temp, self.dhw.temp_drop_device)
            .await?;
        ctx.set_dhw_mode(DhwMode::PendingLegionella)?;
        ctx.delete_cycle(CycleKind::Legionella)?;
        if ctx.delete_cycle(CycleKind::Normal)? {
            info!("Dropped planned normal cycle, legionella heats the tank anyway");
        }
        self.started_at = Some(ctx.now());
        self.replan_at = None;
        Ok(StartOutcome::Started)
    }

    pub async fn stop(&mut self, ctx: &ControlContext) -> ControlResult<()> {
        let mode = ctx.dhw_mode()?.mode;
        if !mode.is_legionella() {
            debug!("DHW in mode {mode}, no legionella cycle to stop");
            return Ok(());
        }

        info!("Stopping legionella cycle");
        ctx.actuate_dhw(self.dhw.temp_off).await?;
        ctx.set_dhw_mode(DhwMode::Off)?;
        let replan_at = ctx.now() + self.config.replan_delay();
        debug!("Planning next legionella cycle at {replan_at}");
        self.replan_at = Some(replan_at);
        self.started_at = None;
        Ok(())
    }

    // ============= Ramp and reconciliation =============

    pub async fn step(&self, ctx: &ControlContext) -> ControlResult<Option<f64>> {
        if self.timing.running_mode == RunningMode::Normal
            || ctx.dhw_mode()?.mode != DhwMode::RunningLegionella
        {
            return Ok(None);
        }
        let Some(target) = ctx.setpoint(SetpointRole::DhwTarget)? else {
            return Ok(None);
        };
        let tank = ctx.tank_temperature().await?;
        self.ramp.advance(ctx, tank, target.value).await
    }

    pub async fn update_from_state(&mut self, ctx: &ControlContext) -> ControlResult<()> {
        let mode = ctx.dhw_mode()?;
        if !mode.mode.is_legionella() {
            return Ok(());
        }

        let (status, tank) = tokio::try_join!(ctx.device_status(), ctx.tank_temperature())?;
        let heating_water = status.is_heating_water();

        match mode.mode {
            DhwMode::PendingLegionella if heating_water => {
                ctx.set_dhw_mode(DhwMode::RunningLegionella)?;
            }
            DhwMode::RunningLegionella => {
                let started_at = self.started_at.unwrap_or(mode.last_modified);
                if tank >= self.config.temp && !heating_water {
                    info!("DHW reached {tank}°, legionella cycle done");
                    self.stop(ctx).await?;
                } else if !heating_water
                    && started_at <= ctx.now() - self.config.device_max_runtime()
                {
                    warn!("Device gave up the legionella run started at {started_at} at {tank}°");
                    self.stop(ctx).await?;
                } else {
                    self.step(ctx).await?;
                }
            }
            DhwMode::PendingLegionella
            | DhwMode::Off
            | DhwMode::PendingNormal
            | DhwMode::RunningNormal
            | DhwMode::RunningStepped
            | DhwMode::RunningBuffer
            | DhwMode::RunningManual => {}
        }
        Ok(())
    }

    /// Run the re-plan scheduled by a stop once it is due
    pub async fn run_deferred_replan(
        &mut self,
        ctx: &ControlContext,
    ) -> ControlResult<Option<ScheduledCycle>> {
        match self.replan_at {
            Some(at) if at <= ctx.now() => {
                self.replan_at = None;
                self.plan(ctx).await
            }
            Some(_) | None => Ok(None),
        }
    }
}
