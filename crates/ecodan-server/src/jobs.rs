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

//! Periodic triggers driving the controller
//!
//! Every job locks the shared controller for its whole run, so two jobs never
//! overlap and a slow tick delays the next one instead of racing it.

use std::sync::Arc;

use chrono::{DateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use ecodan_core::{ControlResult, OperatingModeController};

pub type SharedController = Arc<Mutex<OperatingModeController>>;

/// When a job fires
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSchedule {
    /// Every `period`, shifted by `offset` from the aligned boundary
    Every { period: TimeDelta, offset: TimeDelta },
    /// At fixed local times of day
    Daily(Vec<NaiveTime>),
}

impl JobSchedule {
    fn every(period: TimeDelta, offset: TimeDelta) -> Self {
        Self::Every { period, offset }
    }

    fn daily(times: &[(u32, u32)]) -> Self {
        Self::Daily(
            times
                .iter()
                .filter_map(|&(hour, minute)| NaiveTime::from_hms_opt(hour, minute, 0))
                .collect(),
        )
    }

    /// First firing strictly after `now`
    pub fn next_after(&self, now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
        match self {
            Self::Every { period, offset } => {
                let period_s = period.num_seconds().max(1);
                let offset_s = offset.num_seconds();
                let slot = (now.timestamp() - offset_s).div_euclid(period_s) + 1;
                DateTime::from_timestamp(slot * period_s + offset_s, 0)
                    .unwrap_or(now + *period)
            }
            Self::Daily(times) => {
                let today = now.with_timezone(&tz).date_naive();
                (0..=1)
                    .filter_map(|days| today.checked_add_days(chrono::Days::new(days)))
                    .flat_map(|date| times.iter().map(move |time| date.and_time(*time)))
                    .filter_map(|local| tz.from_local_datetime(&local).earliest())
                    .map(|at| at.with_timezone(&Utc))
                    .filter(|at| *at > now)
                    .min()
                    .unwrap_or(now + TimeDelta::days(1))
            }
        }
    }
}

/// The controller entry points run on a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Evaluate,
    ModeFromState,
    RescheduleNormal,
    RescheduleLegionella,
    PlanLegionella,
    PlanHeating,
    CheckIdling,
}

impl Job {
    pub const ALL: [Self; 7] = [
        Self::Evaluate,
        Self::ModeFromState,
        Self::RescheduleNormal,
        Self::RescheduleLegionella,
        Self::PlanLegionella,
        Self::PlanHeating,
        Self::CheckIdling,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Evaluate => "evaluate",
            Self::ModeFromState => "mode_from_state",
            Self::RescheduleNormal => "reschedule_normal",
            Self::RescheduleLegionella => "reschedule_legionella",
            Self::PlanLegionella => "plan_legionella",
            Self::PlanHeating => "plan_heating",
            Self::CheckIdling => "check_idling",
        }
    }

    pub fn schedule(self) -> JobSchedule {
        match self {
            // Seconds 15 and 45 of every minute
            Self::Evaluate => JobSchedule::every(TimeDelta::seconds(30), TimeDelta::seconds(15)),
            Self::ModeFromState => JobSchedule::every(TimeDelta::minutes(20), TimeDelta::zero()),
            Self::RescheduleNormal => {
                JobSchedule::every(TimeDelta::hours(1), TimeDelta::minutes(54))
            }
            Self::RescheduleLegionella => {
                JobSchedule::every(TimeDelta::hours(1), TimeDelta::minutes(56))
            }
            Self::PlanLegionella => {
                JobSchedule::daily(&[(4, 0), (8, 0), (12, 0), (16, 0), (20, 0)])
            }
            Self::PlanHeating => JobSchedule::daily(&[(4, 10), (13, 10)]),
            Self::CheckIdling => JobSchedule::every(TimeDelta::minutes(5), TimeDelta::zero()),
        }
    }

    pub async fn run(self, controller: &mut OperatingModeController) -> ControlResult<()> {
        match self {
            Self::Evaluate => controller.evaluate().await,
            Self::ModeFromState => {
                let mode = controller.set_operating_mode_from_state().await?;
                debug!("DHW mode from device state: {mode}");
                Ok(())
            }
            Self::RescheduleNormal => controller.reschedule_normal().await.map(drop),
            Self::RescheduleLegionella => controller.reschedule_legionella().await.map(drop),
            Self::PlanLegionella => controller.plan_legionella().await.map(drop),
            Self::PlanHeating => {
                let points = controller.plan_heating().await?;
                debug!("Heating plan has {} points", points.len());
                Ok(())
            }
            Self::CheckIdling => controller.check_idling().await.map(drop),
        }
    }
}

pub fn spawn_job(job: Job, controller: SharedController, tz: Tz) -> JoinHandle<()> {
    tokio::spawn(async move {
        let schedule = job.schedule();
        info!(job = job.name(), "Job scheduled ({schedule:?})");

        loop {
            let now = Utc::now();
            let next = schedule.next_after(now, tz);
            let wait = (next - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            let mut controller = controller.lock().await;
            if let Err(e) = job.run(&mut controller).await {
                error!(error = %e, job = job.name(), "Job failed");
            }
        }
    })
}

pub fn spawn_all(controller: &SharedController, tz: Tz) -> Vec<JoinHandle<()>> {
    Job::ALL
        .into_iter()
        .map(|job| spawn_job(job, Arc::clone(controller), tz))
        .collect()
}
