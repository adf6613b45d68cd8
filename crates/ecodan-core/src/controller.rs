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

use tracing::{debug, info, warn};

use ecodan_types::{
    ControllerConfig, CycleKind, DhwMode, HeatingPlanPoint, ScheduledCycle, SetpointRole,
    setpoint_equals,
};

use crate::admission::LoadAdmission;
use crate::context::ControlContext;
use crate::error::{ControlError, ControlResult};
use crate::heating::HeatingCurvePlanner;
use crate::scheduling::{BufferOutcome, LegionellaService, NormalCycleService, StartOutcome};

/// What the device DHW setpoint says about the running mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeInference {
    Mode(DhwMode),
    /// Setpoint below base: stop whatever is going on
    Stop,
}

/// Infer the DHW mode from the device setpoint
///
/// An active mode is kept as long as the device still holds the current
/// setpoint this controller wrote, so staged ramps are not misread.
pub fn infer_mode(
    config: &ControllerConfig,
    device_dhw: f64,
    heating_water: bool,
    persisted: DhwMode,
    current_setpoint: Option<f64>,
) -> ModeInference {
    if persisted.is_active_cycle()
        && current_setpoint.is_some_and(|current| setpoint_equals(current, device_dhw))
    {
        return ModeInference::Mode(persisted);
    }

    let dhw = &config.dhw;
    let mode = if setpoint_equals(device_dhw, dhw.temp_off) {
        DhwMode::Off
    } else if device_dhw < dhw.temp_base && !setpoint_equals(device_dhw, dhw.temp_base) {
        return ModeInference::Stop;
    } else if setpoint_equals(device_dhw, dhw.temp_base) {
        if heating_water {
            DhwMode::RunningNormal
        } else {
            DhwMode::PendingNormal
        }
    } else if device_dhw <= dhw.temp_buffer {
        DhwMode::RunningBuffer
    } else if setpoint_equals(device_dhw, config.legionella.temp) {
        if heating_water {
            DhwMode::RunningLegionella
        } else {
            DhwMode::PendingLegionella
        }
    } else {
        DhwMode::RunningManual
    };
    ModeInference::Mode(mode)
}

/// Per-tick reconciliation of the DHW and heating circuits
#[derive(Debug)]
pub struct OperatingModeController {
    ctx: ControlContext,
    config: ControllerConfig,
    admission: LoadAdmission,
    normal: NormalCycleService,
    legionella: LegionellaService,
    heating: HeatingCurvePlanner,
}

impl OperatingModeController {
    pub fn new(ctx: ControlContext, config: ControllerConfig) -> Self {
        Self {
            admission: LoadAdmission::new(config.cycle.consumption_stddev_factor),
            normal: NormalCycleService::new(&config),
            legionella: LegionellaService::new(&config),
            heating: HeatingCurvePlanner::new(config.heating.clone()),
            ctx,
            config,
        }
    }

    pub fn context(&self) -> &ControlContext {
        &self.ctx
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn normal(&self) -> &NormalCycleService {
        &self.normal
    }

    pub fn legionella(&self) -> &LegionellaService {
        &self.legionella
    }

    pub fn heating(&self) -> &HeatingCurvePlanner {
        &self.heating
    }

    // ============= Tick =============

    /// One reconciliation pass
    pub async fn evaluate(&mut self) -> ControlResult<()> {
        let ctx = self.ctx.clone();

        self.abort_stale_pending(&ctx).await?;

        self.evaluate_cycle(&ctx, CycleKind::Legionella).await?;
        self.evaluate_cycle(&ctx, CycleKind::Normal).await?;

        self.legionella.update_from_state(&ctx).await?;
        if self.normal.update_from_state(&ctx).await? == BufferOutcome::HandOverToLegionella {
            self.hand_over_to_legionella(&ctx).await?;
        }

        self.legionella.run_deferred_replan(&ctx).await?;
        self.normal.plan(&ctx).await?;
        self.heating.evaluate(&ctx).await?;
        Ok(())
    }

    async fn abort_stale_pending(&mut self, ctx: &ControlContext) -> ControlResult<()> {
        let mode = ctx.dhw_mode()?;
        if !mode.mode.is_pending()
            || mode.last_modified >= ctx.now() - self.config.cycle.pending_timeout()
        {
            return Ok(());
        }

        warn!(
            "Device never picked up {} set at {}, aborting",
            mode.mode, mode.last_modified
        );
        match mode.mode {
            DhwMode::PendingLegionella => self.legionella.stop(ctx).await,
            DhwMode::Off
            | DhwMode::PendingNormal
            | DhwMode::RunningNormal
            | DhwMode::RunningStepped
            | DhwMode::RunningBuffer
            | DhwMode::RunningLegionella
            | DhwMode::RunningManual => self.normal.stop(ctx).await,
        }
    }

    /// Start, re-plan or reschedule one cycle kind
    async fn evaluate_cycle(&mut self, ctx: &ControlContext, kind: CycleKind) -> ControlResult<()> {
        let mode = ctx.dhw_mode()?.mode;
        let eligible = match kind {
            CycleKind::Legionella => !mode.is_legionella(),
            CycleKind::Normal => mode == DhwMode::Off,
        };
        if !eligible {
            return Ok(());
        }
        let Some(cycle) = ctx.cycle(kind)? else {
            return Ok(());
        };

        let now = ctx.now();
        if cycle.is_due(now, self.config.cycle.start_tolerance()) {
            let outcome = match kind {
                CycleKind::Legionella => {
                    self.legionella
                        .start(ctx, &self.admission, false)
                        .await?
                }
                CycleKind::Normal => self.normal.start(ctx, &self.admission).await?,
            };
            debug!("{kind} cycle start: {outcome:?}");
        } else if cycle.ultimate_start < now {
            info!(
                "{kind} cycle missed its ultimate start {}, planning again",
                cycle.ultimate_start
            );
            match kind {
                CycleKind::Legionella => self.legionella.plan(ctx).await?,
                CycleKind::Normal => self.normal.plan(ctx).await?,
            };
        } else if cycle.planned_start < now {
            debug!("{kind} cycle planned start {} passed, rescheduling", cycle.planned_start);
            match kind {
                CycleKind::Legionella => self.legionella.reschedule(ctx).await?,
                CycleKind::Normal => self.normal.reschedule(ctx).await?,
            };
        }
        Ok(())
    }

    async fn hand_over_to_legionella(&mut self, ctx: &ControlContext) -> ControlResult<()> {
        let outcome = self
            .legionella
            .start(ctx, &self.admission, true)
            .await?;
        if outcome == StartOutcome::Started {
            self.normal.finish_hand_over(ctx)?;
        }
        Ok(())
    }

    // ============= Mode inference =============

    /// Re-derive the DHW mode from the device, for manual changes and restarts
    pub async fn set_operating_mode_from_state(&mut self) -> ControlResult<DhwMode> {
        let ctx = self.ctx.clone();
        let (device, status) = tokio::try_join!(ctx.device_setpoint(), ctx.device_status())?;
        let persisted = ctx.dhw_mode()?;
        let current = ctx
            .setpoint(SetpointRole::DhwCurrent)?
            .map(|record| record.value);

        let inference = infer_mode(
            &self.config,
            device.dhw,
            status.is_heating_water(),
            persisted.mode,
            current,
        );
        debug!(device_dhw = device.dhw, ?inference, "Inferred DHW mode from device");

        match inference {
            ModeInference::Stop => {
                info!("Device DHW setpoint {:.1}° below base, stopping", device.dhw);
                self.normal.stop(&ctx).await?;
                Ok(DhwMode::Off)
            }
            ModeInference::Mode(mode) => {
                if mode != persisted.mode {
                    ctx.set_dhw_mode(mode)?;
                }
                Ok(mode)
            }
        }
    }

    // ============= Queries =============

    pub async fn can_start(&self) -> ControlResult<bool> {
        self.admission.can_start(&self.ctx).await
    }

    pub fn next_cycle(&self) -> ControlResult<Option<ScheduledCycle>> {
        self.ctx.store.next_cycle().map_err(ControlError::Store)
    }

    // ============= Periodic jobs =============

    pub async fn reschedule_normal(&self) -> ControlResult<Option<ScheduledCycle>> {
        self.normal.reschedule(&self.ctx).await
    }

    pub async fn reschedule_legionella(&self) -> ControlResult<Option<ScheduledCycle>> {
        self.legionella.reschedule(&self.ctx).await
    }

    pub async fn plan_legionella(&mut self) -> ControlResult<Option<ScheduledCycle>> {
        let ctx = self.ctx.clone();
        self.legionella.plan(&ctx).await
    }

    pub async fn plan_heating(&mut self) -> ControlResult<Vec<HeatingPlanPoint>> {
        let ctx = self.ctx.clone();
        Ok(self.heating.plan(&ctx).await?.to_vec())
    }

    pub async fn check_idling(&mut self) -> ControlResult<Option<f64>> {
        let ctx = self.ctx.clone();
        self.heating.check_idling(&ctx).await
    }

    /// Bring records in line with the device after a restart
    pub async fn startup(&mut self) {
        if let Err(e) = self.set_operating_mode_from_state().await {
            warn!(error = %e, "Could not infer DHW mode at startup");
        }
        if let Err(e) = self.plan_legionella().await {
            warn!(error = %e, "Could not plan legionella cycle at startup");
        }
        if let Err(e) = self.heating.update_from_state(&self.ctx).await {
            warn!(error = %e, "Could not read heating setpoint at startup");
        }
        if let Err(e) = self.plan_heating().await {
            warn!(error = %e, "Could not plan heating curve at startup");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn infer(device: f64, heating_water: bool) -> ModeInference {
        infer_mode(&ControllerConfig::default(), device, heating_water, DhwMode::Off, None)
    }

    #[test]
    fn test_infers_mode_from_device_setpoint() {
        assert_eq!(infer(10.0, false), ModeInference::Mode(DhwMode::Off));
        assert_eq!(infer(40.0, false), ModeInference::Stop);
        assert_eq!(infer(45.0, true), ModeInference::Mode(DhwMode::RunningNormal));
        assert_eq!(infer(45.0, false), ModeInference::Mode(DhwMode::PendingNormal));
        assert_eq!(infer(50.0, true), ModeInference::Mode(DhwMode::RunningBuffer));
        assert_eq!(infer(55.0, true), ModeInference::Mode(DhwMode::RunningBuffer));
        assert_eq!(infer(60.0, true), ModeInference::Mode(DhwMode::RunningLegionella));
        assert_eq!(infer(60.0, false), ModeInference::Mode(DhwMode::PendingLegionella));
        assert_eq!(infer(57.0, true), ModeInference::Mode(DhwMode::RunningManual));
        assert_eq!(infer(65.0, false), ModeInference::Mode(DhwMode::RunningManual));
    }

    #[test]
    fn test_staged_ramp_is_not_misread() {
        let config = ControllerConfig::default();
        assert_eq!(
            infer_mode(&config, 38.0, true, DhwMode::RunningStepped, Some(38.0)),
            ModeInference::Mode(DhwMode::RunningStepped)
        );
        assert_eq!(
            infer_mode(&config, 52.0, true, DhwMode::RunningLegionella, Some(52.0)),
            ModeInference::Mode(DhwMode::RunningLegionella)
        );
        // Someone changed the setpoint by hand
        assert_eq!(
            infer_mode(&config, 52.0, true, DhwMode::RunningStepped, Some(38.0)),
            ModeInference::Mode(DhwMode::RunningBuffer)
        );
    }
}
