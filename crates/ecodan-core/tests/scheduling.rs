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

//! Planning, postponing and starting of DHW cycles against fake collaborators

mod common;

use chrono::{TimeDelta, TimeZone, Utc};

use common::{Harness, t0};
use ecodan_core::{
    ControlError, LegionellaService, LoadAdmission, NormalCycleService, RecordStore, StartOutcome,
};
use ecodan_types::{
    ControllerConfig, CycleKind, DhwMode, RunningMode, ScheduledCycle, SearchOrder, SetpointRole,
};

fn admission() -> LoadAdmission {
    LoadAdmission::new(1.5)
}

fn normal_cycle(planned_in: TimeDelta, ultimate_in: TimeDelta) -> ScheduledCycle {
    ScheduledCycle::new(
        CycleKind::Normal,
        t0() + TimeDelta::minutes(30),
        t0() + planned_in,
        t0() + ultimate_in,
        true,
    )
}

// ---------------------------------------------------------------------------
// Normal cycle planning
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_normal_plan_uses_lead_time_and_max_interval() {
    let h = Harness::new();
    h.forecast.answer_peak(t0() + TimeDelta::hours(3));
    let service = NormalCycleService::new(&ControllerConfig::default());

    let cycle = service.plan(&h.ctx).await.unwrap().unwrap();

    assert_eq!(cycle.first_start, t0() + TimeDelta::minutes(30));
    assert_eq!(cycle.planned_start, t0() + TimeDelta::hours(3));
    assert_eq!(cycle.ultimate_start, t0() + TimeDelta::hours(34));
    assert!(cycle.fast);
    assert_eq!(cycle.retry, 0);
    assert!(cycle.is_window_consistent());
    assert_eq!(h.cycle(CycleKind::Normal), Some(cycle));

    let query = &h.forecast.queries()[0];
    assert_eq!(query.order, SearchOrder::First);
    assert_eq!(query.duration_hours, 2.0);
    assert_eq!(query.min_kwh, 3.0);
}

#[tokio::test]
async fn test_forecast_answer_outside_window_is_clamped() {
    let h = Harness::new();
    h.forecast.answer_peak(t0() - TimeDelta::hours(5));
    let service = NormalCycleService::new(&ControllerConfig::default());

    let cycle = service.plan(&h.ctx).await.unwrap().unwrap();
    assert_eq!(cycle.planned_start, cycle.first_start);
    assert!(cycle.is_window_consistent());
}

#[tokio::test]
async fn test_normal_plan_skipped_while_tank_is_hot_or_already_planned() {
    let h = Harness::new();
    let service = NormalCycleService::new(&ControllerConfig::default());

    h.plant.update(|s| s.tank = 42.0);
    assert_eq!(service.plan(&h.ctx).await.unwrap(), None);
    assert_eq!(h.cycle(CycleKind::Normal), None);

    h.plant.update(|s| s.tank = 38.0);
    let existing = normal_cycle(TimeDelta::hours(2), TimeDelta::hours(10));
    h.put_cycle(&existing);
    assert_eq!(service.plan(&h.ctx).await.unwrap(), None);
    assert_eq!(h.cycle(CycleKind::Normal), Some(existing));

    h.store.delete_cycle(CycleKind::Normal).unwrap();
    h.set_mode(DhwMode::RunningNormal);
    assert_eq!(service.plan(&h.ctx).await.unwrap(), None);
}

#[tokio::test]
async fn test_normal_reschedule_drops_plan_once_tank_is_hot() {
    let h = Harness::new();
    let service = NormalCycleService::new(&ControllerConfig::default());
    h.put_cycle(&normal_cycle(TimeDelta::hours(2), TimeDelta::hours(10)));

    h.plant.update(|s| s.tank = 44.0);
    assert_eq!(service.reschedule(&h.ctx).await.unwrap(), None);
    assert_eq!(h.cycle(CycleKind::Normal), None);
}

#[tokio::test]
async fn test_reschedule_keeps_plan_when_new_start_is_too_close() {
    let h = Harness::new();
    let service = NormalCycleService::new(&ControllerConfig::default());
    let existing = normal_cycle(TimeDelta::hours(2), TimeDelta::hours(10));
    h.put_cycle(&existing);

    h.forecast.answer_peak(t0() + TimeDelta::minutes(10));
    assert_eq!(service.reschedule(&h.ctx).await.unwrap(), None);
    assert_eq!(h.cycle(CycleKind::Normal), Some(existing.clone()));

    h.forecast.answer_peak(t0() + TimeDelta::hours(5));
    let moved = service.reschedule(&h.ctx).await.unwrap().unwrap();
    assert_eq!(moved.planned_start, t0() + TimeDelta::hours(5));
    assert_eq!(moved.first_start, existing.first_start);
    assert_eq!(moved.ultimate_start, existing.ultimate_start);
}

// ---------------------------------------------------------------------------
// Postponing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_postpone_is_bounded_by_max_retry() {
    let h = Harness::new();
    let service = NormalCycleService::new(&ControllerConfig::default());
    h.put_cycle(&normal_cycle(TimeDelta::hours(1), TimeDelta::hours(20)));

    for expected in 1..=3 {
        let cycle = service.postpone(&h.ctx).await.unwrap().unwrap();
        assert_eq!(cycle.retry, expected);
        assert!(cycle.first_start >= t0() + TimeDelta::minutes(15));
        assert!(cycle.is_window_consistent());
    }

    let err = service.postpone(&h.ctx).await.unwrap_err();
    assert!(matches!(
        err,
        ControlError::RetriesExhausted {
            kind: CycleKind::Normal,
            retry: 3
        }
    ));
    assert_eq!(h.cycle(CycleKind::Normal).unwrap().retry, 3);
}

#[tokio::test]
async fn test_postpone_fails_when_window_is_used_up() {
    let h = Harness::new();
    let service = NormalCycleService::new(&ControllerConfig::default());
    h.put_cycle(&ScheduledCycle::new(
        CycleKind::Normal,
        t0() - TimeDelta::hours(1),
        t0(),
        t0() + TimeDelta::minutes(10),
        true,
    ));

    let err = service.postpone(&h.ctx).await.unwrap_err();
    assert!(err.is_retries_exhausted());
    assert_eq!(h.cycle(CycleKind::Normal).unwrap().retry, 0);
}

#[tokio::test]
async fn test_postpone_without_plan_is_a_no_op() {
    let h = Harness::new();
    let service = NormalCycleService::new(&ControllerConfig::default());
    assert_eq!(service.postpone(&h.ctx).await.unwrap(), None);
}

// ---------------------------------------------------------------------------
// Normal start
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_normal_start_writes_base_and_goes_pending() {
    let h = Harness::new();
    let mut service = NormalCycleService::new(&ControllerConfig::default());
    h.put_cycle(&normal_cycle(TimeDelta::zero(), TimeDelta::hours(10)));

    let outcome = service.start(&h.ctx, &admission()).await.unwrap();

    assert_eq!(outcome, StartOutcome::Started);
    assert_eq!(h.mode(), DhwMode::PendingNormal);
    assert_eq!(h.cycle(CycleKind::Normal), None);
    assert_eq!(h.plant.dhw_writes(), vec![45.0]);
    assert_eq!(h.setpoint(SetpointRole::DhwTarget), Some(45.0));
    assert_eq!(h.setpoint(SetpointRole::DhwCurrent), Some(45.0));
}

#[tokio::test]
async fn test_stepped_start_stages_first_setpoint() {
    let h = Harness::new();
    let mut config = ControllerConfig::default();
    config.cycle.running_mode = RunningMode::Stepped;
    let mut service = NormalCycleService::new(&config);

    h.plant.update(|s| s.tank = 32.4);
    service.start(&h.ctx, &admission()).await.unwrap();

    assert_eq!(h.plant.dhw_writes(), vec![39.0]);
    assert_eq!(h.setpoint(SetpointRole::DhwCurrent), Some(39.0));
    assert_eq!(h.setpoint(SetpointRole::DhwTarget), Some(45.0));
}

#[tokio::test]
async fn test_auto_running_mode_steps_only_when_cold_outside() {
    let h = Harness::new();
    let mut config = ControllerConfig::default();
    config.cycle.running_mode = RunningMode::Auto;
    let mut service = NormalCycleService::new(&config);

    h.plant.update(|s| {
        s.tank = 30.0;
        s.outside = 12.0;
    });
    service.start(&h.ctx, &admission()).await.unwrap();
    assert_eq!(h.plant.dhw_writes(), vec![45.0]);

    h.set_mode(DhwMode::Off);
    h.plant.update(|s| s.outside = 2.0);
    service.start(&h.ctx, &admission()).await.unwrap();
    assert_eq!(h.plant.dhw_writes(), vec![45.0, 36.0]);
}

#[tokio::test]
async fn test_running_normal_steps_once_tank_catches_up() {
    let mut config = ControllerConfig::default();
    config.cycle.running_mode = RunningMode::Stepped;
    let service = NormalCycleService::new(&config);

    let h = Harness::new();
    h.set_mode(DhwMode::RunningNormal);
    h.put_setpoint(SetpointRole::DhwCurrent, 50.0);
    h.put_setpoint(SetpointRole::DhwTarget, 55.0);
    h.plant.update(|s| s.tank = 48.5);

    assert_eq!(service.step(&h.ctx).await.unwrap(), Some(51.0));
    assert_eq!(h.mode(), DhwMode::RunningStepped);
    assert_eq!(h.plant.dhw_writes(), vec![51.0]);
    assert_eq!(h.setpoint(SetpointRole::DhwCurrent), Some(51.0));

    // More than buffer_interval below the staged setpoint
    let h = Harness::new();
    h.set_mode(DhwMode::RunningNormal);
    h.put_setpoint(SetpointRole::DhwCurrent, 50.0);
    h.put_setpoint(SetpointRole::DhwTarget, 55.0);
    h.plant.update(|s| s.tank = 47.9);

    assert_eq!(service.step(&h.ctx).await.unwrap(), None);
    assert_eq!(h.mode(), DhwMode::RunningNormal);
    assert!(h.plant.dhw_writes().is_empty());
    assert_eq!(h.setpoint(SetpointRole::DhwCurrent), Some(50.0));
}

#[tokio::test]
async fn test_refused_start_postpones_until_retries_run_out() {
    let h = Harness::new();
    let mut service = NormalCycleService::new(&ControllerConfig::default());
    h.put_cycle(&normal_cycle(TimeDelta::zero(), TimeDelta::hours(20)));
    h.plant.update(|s| s.consumption = 2_000.0);

    for _ in 0..3 {
        let outcome = service.start(&h.ctx, &admission()).await.unwrap();
        assert_eq!(outcome, StartOutcome::Postponed);
        assert_eq!(h.mode(), DhwMode::Off);
    }
    assert_eq!(h.cycle(CycleKind::Normal).unwrap().retry, 3);
    assert!(h.plant.dhw_writes().is_empty());

    // Start anyway
    let outcome = service.start(&h.ctx, &admission()).await.unwrap();
    assert_eq!(outcome, StartOutcome::Started);
    assert_eq!(h.mode(), DhwMode::PendingNormal);
    assert_eq!(h.plant.dhw_writes(), vec![45.0]);
}

#[tokio::test]
async fn test_legionella_due_soon_pre_empts_normal_start() {
    let h = Harness::new();
    let mut service = NormalCycleService::new(&ControllerConfig::default());
    h.put_cycle(&normal_cycle(TimeDelta::zero(), TimeDelta::hours(10)));
    h.put_cycle(&ScheduledCycle::new(
        CycleKind::Legionella,
        t0(),
        t0() + TimeDelta::hours(3),
        t0() + TimeDelta::hours(12),
        false,
    ));

    let outcome = service.start(&h.ctx, &admission()).await.unwrap();

    assert_eq!(outcome, StartOutcome::PreEmpted);
    assert_eq!(h.cycle(CycleKind::Normal), None);
    assert!(h.cycle(CycleKind::Legionella).is_some());
    assert!(h.plant.dhw_writes().is_empty());
    assert_eq!(h.mode(), DhwMode::Off);
}

#[tokio::test]
async fn test_failed_actuation_surfaces_and_keeps_mode() {
    let h = Harness::new();
    let mut service = NormalCycleService::new(&ControllerConfig::default());
    h.put_cycle(&normal_cycle(TimeDelta::zero(), TimeDelta::hours(10)));
    h.plant.update(|s| s.fail_actuation = true);

    let err = service.start(&h.ctx, &admission()).await.unwrap_err();
    assert!(matches!(err, ControlError::Actuation { .. }));
    assert_eq!(h.mode(), DhwMode::Off);
    assert!(h.cycle(CycleKind::Normal).is_some());
}

// ---------------------------------------------------------------------------
// Legionella
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_legionella_plan_latest_before_deadline() {
    let h = Harness::new();
    let mut service = LegionellaService::new(&ControllerConfig::default());

    let cycle = service.plan(&h.ctx).await.unwrap().unwrap();

    // Last run 28 May, due by the end of 4 June, not before 2 June
    let deadline = Utc.with_ymd_and_hms(2025, 6, 4, 23, 59, 59).unwrap();
    assert_eq!(cycle.ultimate_start, deadline);
    assert_eq!(cycle.first_start, deadline - TimeDelta::days(2));
    assert_eq!(cycle.planned_start, deadline);
    assert!(!cycle.fast);
    assert_eq!(h.forecast.queries()[0].order, SearchOrder::Last);
    assert_eq!(h.forecast.queries()[0].duration_hours, 3.0);
}

#[tokio::test]
async fn test_overdue_legionella_is_planned_early_by_tomorrow() {
    let h = Harness::new();
    h.plant.update(|s| s.last_legionella = Utc.with_ymd_and_hms(2025, 5, 20, 8, 0, 0).unwrap());
    let mut service = LegionellaService::new(&ControllerConfig::default());

    let cycle = service.plan(&h.ctx).await.unwrap().unwrap();

    assert_eq!(
        cycle.ultimate_start,
        Utc.with_ymd_and_hms(2025, 6, 3, 23, 59, 59).unwrap()
    );
    assert_eq!(cycle.first_start, t0() + TimeDelta::minutes(30));
    assert_eq!(cycle.planned_start, cycle.first_start);
    assert!(cycle.fast);
}

#[tokio::test]
async fn test_legionella_deadline_later_today_is_not_overdue() {
    let deadline = Utc.with_ymd_and_hms(2025, 6, 4, 23, 59, 59).unwrap();

    // Inside the lead time but not yet passed
    let h = Harness::new();
    h.clock.set(deadline - TimeDelta::minutes(15));
    let mut service = LegionellaService::new(&ControllerConfig::default());
    let cycle = service.plan(&h.ctx).await.unwrap().unwrap();

    assert!(!cycle.fast);
    assert_eq!(h.forecast.queries()[0].order, SearchOrder::Last);
    assert_eq!(h.forecast.queries()[0].end, deadline);

    // Reaching the deadline itself counts as overdue
    let h = Harness::new();
    h.clock.set(deadline);
    let mut service = LegionellaService::new(&ControllerConfig::default());
    let cycle = service.plan(&h.ctx).await.unwrap().unwrap();

    assert!(cycle.fast);
    assert_eq!(h.forecast.queries()[0].order, SearchOrder::First);
    assert_eq!(
        cycle.ultimate_start,
        Utc.with_ymd_and_hms(2025, 6, 5, 23, 59, 59).unwrap()
    );
}

#[tokio::test]
async fn test_legionella_reschedule_extends_window_to_later_deadline() {
    let h = Harness::new();
    let service = LegionellaService::new(&ControllerConfig::default());
    let old_deadline = Utc.with_ymd_and_hms(2025, 6, 3, 23, 59, 59).unwrap();
    h.put_cycle(&ScheduledCycle::new(
        CycleKind::Legionella,
        t0() + TimeDelta::hours(1),
        t0() + TimeDelta::hours(5),
        old_deadline,
        false,
    ));

    h.forecast.answer_peak(t0() + TimeDelta::hours(30));
    let cycle = service.reschedule(&h.ctx).await.unwrap().unwrap();

    let deadline = Utc.with_ymd_and_hms(2025, 6, 4, 23, 59, 59).unwrap();
    assert_eq!(cycle.ultimate_start, deadline);
    assert_eq!(cycle.first_start, deadline - TimeDelta::days(2));
    assert_eq!(cycle.planned_start, t0() + TimeDelta::hours(30));
}

#[tokio::test]
async fn test_legionella_start_clears_both_schedules() {
    let h = Harness::new();
    let mut service = LegionellaService::new(&ControllerConfig::default());
    h.put_cycle(&normal_cycle(TimeDelta::hours(4), TimeDelta::hours(10)));
    h.put_cycle(&ScheduledCycle::new(
        CycleKind::Legionella,
        t0(),
        t0(),
        t0() + TimeDelta::hours(12),
        false,
    ));

    let outcome = service.start(&h.ctx, &admission(), false).await.unwrap();

    assert_eq!(outcome, StartOutcome::Started);
    assert_eq!(h.mode(), DhwMode::PendingLegionella);
    assert_eq!(h.cycle(CycleKind::Normal), None);
    assert_eq!(h.cycle(CycleKind::Legionella), None);
    assert_eq!(h.plant.dhw_writes(), vec![60.0]);
    assert_eq!(service.started_at(), Some(t0()));
}

#[tokio::test]
async fn test_hot_tank_refuses_legionella_unless_forced() {
    let h = Harness::new();
    let mut service = LegionellaService::new(&ControllerConfig::default());
    h.plant.update(|s| s.tank = 56.0);
    h.put_cycle(&ScheduledCycle::new(
        CycleKind::Legionella,
        t0(),
        t0(),
        t0() + TimeDelta::hours(12),
        false,
    ));

    assert!(!service.can_start_legionella(&h.ctx, &admission()).await.unwrap());
    let outcome = service.start(&h.ctx, &admission(), false).await.unwrap();
    assert_eq!(outcome, StartOutcome::Postponed);
    assert_eq!(h.cycle(CycleKind::Legionella).unwrap().retry, 1);

    let outcome = service.start(&h.ctx, &admission(), true).await.unwrap();
    assert_eq!(outcome, StartOutcome::Started);
    assert_eq!(h.mode(), DhwMode::PendingLegionella);
}

#[tokio::test]
async fn test_legionella_stop_defers_replan_by_an_hour() {
    let h = Harness::new();
    let mut service = LegionellaService::new(&ControllerConfig::default());
    h.set_mode(DhwMode::RunningLegionella);

    service.stop(&h.ctx).await.unwrap();
    assert_eq!(h.mode(), DhwMode::Off);
    assert_eq!(h.plant.dhw_writes(), vec![10.0]);
    assert_eq!(service.replan_at(), Some(t0() + TimeDelta::minutes(60)));

    h.clock.advance(TimeDelta::minutes(30));
    assert_eq!(service.run_deferred_replan(&h.ctx).await.unwrap(), None);

    h.clock.advance(TimeDelta::minutes(31));
    assert!(service.run_deferred_replan(&h.ctx).await.unwrap().is_some());
    assert_eq!(service.replan_at(), None);
    assert!(h.cycle(CycleKind::Legionella).is_some());
}

#[tokio::test]
async fn test_stop_outside_legionella_is_ignored() {
    let h = Harness::new();
    let mut service = LegionellaService::new(&ControllerConfig::default());
    h.set_mode(DhwMode::RunningNormal);

    service.stop(&h.ctx).await.unwrap();
    assert_eq!(h.mode(), DhwMode::RunningNormal);
    assert!(h.plant.dhw_writes().is_empty());
    assert_eq!(service.replan_at(), None);
}

#[tokio::test]
async fn test_legionella_follows_device_until_hot() {
    let h = Harness::new();
    let mut service = LegionellaService::new(&ControllerConfig::default());
    service.start(&h.ctx, &admission(), true).await.unwrap();

    h.plant.heating_water(true);
    service.update_from_state(&h.ctx).await.unwrap();
    assert_eq!(h.mode(), DhwMode::RunningLegionella);

    h.plant.update(|s| s.tank = 58.0);
    service.update_from_state(&h.ctx).await.unwrap();
    assert_eq!(h.mode(), DhwMode::RunningLegionella);

    h.plant.update(|s| s.tank = 60.2);
    h.plant.heating_water(false);
    service.update_from_state(&h.ctx).await.unwrap();
    assert_eq!(h.mode(), DhwMode::Off);
    assert_eq!(h.plant.dhw_writes(), vec![60.0, 10.0]);
}

#[tokio::test]
async fn test_legionella_stops_when_device_gives_up() {
    let h = Harness::new();
    let mut service = LegionellaService::new(&ControllerConfig::default());
    h.set_mode(DhwMode::RunningLegionella);
    h.plant.update(|s| s.tank = 55.0);

    h.clock.advance(TimeDelta::hours(3));
    service.update_from_state(&h.ctx).await.unwrap();
    assert_eq!(h.mode(), DhwMode::RunningLegionella);

    h.clock.advance(TimeDelta::hours(1));
    service.update_from_state(&h.ctx).await.unwrap();
    assert_eq!(h.mode(), DhwMode::Off);
}
