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

pub mod config;
pub mod cycle;
pub mod mode;
pub mod setpoint;
pub mod telemetry;

// Re-export common types for convenience
pub use config::{
    ControllerConfig, CycleTimingConfig, DhwConfig, HeatingBufferConfig, HeatingConfig,
    LegionellaConfig, SummerConfig,
};
pub use cycle::{CycleKind, ScheduledCycle, SearchOrder};
pub use mode::{Circuit, DhwMode, OperatingMode, RunningMode};
pub use setpoint::{
    FadeDuring, HeatingPlanPoint, PlanPointKind, SetpointRecord, SetpointRole, round_setpoint,
    setpoint_equals,
};
pub use telemetry::{
    DefrostStatus, DeviceOperatingMode, DeviceSetpoint, DeviceStatus, HeatSource, Measurement,
    MeasurementKind, PeakProductionQuery, PeriodStats, ProductionWeather, TimeRange,
};
