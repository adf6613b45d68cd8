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

pub mod admission;
pub mod cluster;
pub mod context;
pub mod controller;
pub mod error;
pub mod forecast;
pub mod heating;
pub mod memory_store;
pub mod ramp;
pub mod scheduling;
pub mod traits;

pub use admission::LoadAdmission;
pub use cluster::{
    Cluster, ClusterConfig, ClusterSet, ClusteredWindow, ProductionSample, Timeline, Timestamped,
    production_windows,
};
pub use context::ControlContext;
pub use controller::{ModeInference, OperatingModeController, infer_mode};
pub use error::{ControlError, ControlResult};
pub use forecast::{ForecastSample, SampledForecast};
pub use heating::{HeatingCurvePlanner, HeatingInputs, build_heating_plan};
pub use memory_store::MemoryStore;
pub use ramp::{BufferVerdict, PowerSampleWindow, RampConfig, RampController};
pub use scheduling::{
    BufferOutcome, DutyCycleScheduler, LegionellaService, NormalCycleService, StartOutcome,
};
pub use traits::{Actuator, Clock, ForecastSource, RecordStore, SystemClock, TelemetrySource};
