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

//! Planning, rescheduling and postponing of DHW cycles
//!
//! [`DutyCycleScheduler`] holds the machinery shared by both cycle kinds;
//! [`NormalCycleService`] and [`LegionellaService`] add the kind specific
//! deadlines, start conditions and device reconciliation.

pub mod legionella;
pub mod normal;

pub use legionella::LegionellaService;
pub use normal::{BufferOutcome, NormalCycleService};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

use ecodan_types::{
    CycleKind, CycleTimingConfig, MeasurementKind, PeakProductionQuery, RunningMode,
    ScheduledCycle, SearchOrder, SetpointRole,
};

use crate::context::ControlContext;
use crate::error::{ControlError, ControlResult};

/// Result of asking a service to start its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A cycle of this kind is already pending or running
    AlreadyActive,
    /// Load admission refused and the plan moved to a later window
    Postponed,
    /// A legionella cycle due soon made this normal cycle unnecessary
    PreEmpted,
}

/// Window search shared by both cycle kinds
#[derive(Debug, Clone)]
pub struct DutyCycleScheduler {
    pub kind: CycleKind,
    pub runtime: TimeDelta,
    pub energy_kwh: f64,
    /// Minimum time between now and any committed planned start
    pub lead_time: TimeDelta,
    pub retry_interval: TimeDelta,
    pub max_retry: u32,
}

impl DutyCycleScheduler {
    pub fn new(
        kind: CycleKind,
        runtime: TimeDelta,
        energy_kwh: f64,
        timing: &CycleTimingConfig,
    ) -> Self {
        Self {
            kind,
            runtime,
            energy_kwh,
            lead_time: timing.min_interval(),
            retry_interval: timing.retry_interval(),
            max_retry: timing.max_retry,
        }
    }

    pub fn query(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        order: SearchOrder,
    ) -> PeakProductionQuery {
        PeakProductionQuery {
            start,
            end,
            min_kwh: self.energy_kwh,
            duration_hours: self.runtime.as_seconds_f64() / 3600.0,
            order,
        }
    }

    /// Persist a fresh cycle for the best window in `[first_start, ultimate_start]`
    pub async fn plan_window(
        &self,
        ctx: &ControlContext,
        first_start: DateTime<Utc>,
        ultimate_start: DateTime<Utc>,
        order: SearchOrder,
    ) -> ControlResult<ScheduledCycle> {
        let planned_start = ctx
            .peak_production(&self.query(first_start, ultimate_start, order))
            .await?;

        let cycle = ScheduledCycle::new(
            self.kind,
            first_start,
            planned_start,
            ultimate_start,
            order == SearchOrder::First,
        );
        info!(
            first_start = %cycle.first_start,
            planned_start = %cycle.planned_start,
            ultimate_start = %cycle.ultimate_start,
            "📅 Saving new {} schedule",
            self.kind
        );
        ctx.save_cycle(&cycle)?;
        Ok(cycle)
    }

    /// Re-query a window, committing only a start that keeps the lead time
    pub async fn reschedule_window(
        &self,
        ctx: &ControlContext,
        mut cycle: ScheduledCycle,
        first_start: DateTime<Utc>,
        ultimate_start: DateTime<Utc>,
    ) -> ControlResult<Option<ScheduledCycle>> {
        let now = ctx.now();
        let planned_start = ctx
            .peak_production(&self.query(first_start, ultimate_start, cycle.search_order()))
            .await?;

        if planned_start < now + self.lead_time {
            debug!(
                "Newly planned {} start of {planned_start} is too close to now, not rescheduling",
                self.kind
            );
            return Ok(None);
        }

        cycle.replan(first_start, planned_start, ultimate_start);
        info!(
            first_start = %cycle.first_start,
            planned_start = %cycle.planned_start,
            ultimate_start = %cycle.ultimate_start,
            "📅 Rescheduled {} cycle",
            self.kind
        );
        ctx.save_cycle(&cycle)?;
        Ok(Some(cycle))
    }

    /// Move the planned cycle to a later window after a refused start
    ///
    /// Returns `Ok(None)` when nothing is planned.
    pub async fn postpone(&self, ctx: &ControlContext) -> ControlResult<Option<ScheduledCycle>> {
        let Some(mut cycle) = ctx.cycle(self.kind)? else {
            return Ok(None);
        };
        let now = ctx.now();

        if cycle.retry >= self.max_retry {
            debug!("{} cycle already at maximum number of retries", self.kind);
            return Err(ControlError::RetriesExhausted {
                kind: self.kind,
                retry: cycle.retry,
            });
        }

        let first_start = (now + self.retry_interval).max(cycle.first_start);
        if first_start >= cycle.ultimate_start {
            debug!(
                "Postponed {} start of {first_start} would not precede ultimate start",
                self.kind
            );
            return Err(ControlError::RetriesExhausted {
                kind: self.kind,
                retry: cycle.retry,
            });
        }

        let ultimate_start = cycle.ultimate_start;
        let planned_start = ctx
            .peak_production(&self.query(first_start, ultimate_start, cycle.search_order()))
            .await?;

        cycle.replan(first_start, planned_start, ultimate_start);
        cycle.retry += 1;
        info!(
            retry = cycle.retry,
            first_start = %cycle.first_start,
            planned_start = %cycle.planned_start,
            "⏳ Postponing {} cycle",
            self.kind
        );
        ctx.save_cycle(&cycle)?;
        Ok(Some(cycle))
    }

    /// Postpone, or report that the cycle has to start regardless
    ///
    /// Returns `true` when postponing is exhausted and the caller must start.
    pub async fn postpone_or_start_anyway(&self, ctx: &ControlContext) -> ControlResult<bool> {
        match self.postpone(ctx).await {
            Ok(_) => Ok(false),
            Err(ControlError::RetriesExhausted { retry, .. }) => {
                info!(retry, "Cannot postpone {} cycle anymore, starting anyway", self.kind);
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }
}

/// Write the setpoints a starting cycle begins with, returning the value sent to the device
///
/// With stepping the device gets a staged value just above what it would
/// restart at, otherwise the target directly.
pub async fn apply_start_setpoints(
    ctx: &ControlContext,
    timing: &CycleTimingConfig,
    target: f64,
    device_drop: f64,
) -> ControlResult<f64> {
    let stepping = match timing.running_mode {
        RunningMode::Normal => false,
        RunningMode::Stepped => true,
        RunningMode::Auto => {
            let outside = ctx.measurement(MeasurementKind::OutsideTemperature).await?;
            timing
                .running_mode
                .uses_stepping(outside.value, timing.auto_step_max_temp)
        }
    };

    let target = ctx.save_setpoint(SetpointRole::DhwTarget, target)?;
    let first = if stepping {
        let tank = ctx.tank_temperature().await?;
        (tank + device_drop + 1.0).ceil().min(target)
    } else {
        target
    };

    let first = ctx.save_setpoint(SetpointRole::DhwCurrent, first)?;
    debug!(stepping, target, first, "Applying cycle start setpoints");
    ctx.actuate_dhw(first).await?;
    Ok(first)
}
