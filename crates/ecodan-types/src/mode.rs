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

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::cycle::CycleKind;

/// Independently controlled thermal subsystem
///
/// Only the hot water tank carries a discrete operating mode, the heating
/// zone is driven by a continuous setpoint curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Circuit {
    Dhw,
}

impl Circuit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dhw => "dhw",
        }
    }
}

impl fmt::Display for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Circuit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dhw" => Ok(Self::Dhw),
            _ => Err(anyhow::anyhow!("Unknown circuit: '{s}'")),
        }
    }
}

/// Operating mode of the domestic hot water circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DhwMode {
    Off,
    PendingNormal,
    RunningNormal,
    RunningStepped,
    RunningBuffer,
    PendingLegionella,
    RunningLegionella,
    /// Device heats water on its own, outside of any planned cycle
    RunningManual,
}

impl DhwMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::PendingNormal => "pending_normal",
            Self::RunningNormal => "running_normal",
            Self::RunningStepped => "running_stepped",
            Self::RunningBuffer => "running_buffer",
            Self::PendingLegionella => "pending_legionella",
            Self::RunningLegionella => "running_legionella",
            Self::RunningManual => "running_manual",
        }
    }

    pub fn all() -> &'static [DhwMode] {
        &[
            Self::Off,
            Self::PendingNormal,
            Self::RunningNormal,
            Self::RunningStepped,
            Self::RunningBuffer,
            Self::PendingLegionella,
            Self::RunningLegionella,
            Self::RunningManual,
        ]
    }

    /// A cycle owned by this controller is pending or running
    pub fn is_active_cycle(self) -> bool {
        !matches!(self, Self::Off | Self::RunningManual)
    }

    pub fn is_pending(self) -> bool {
        matches!(self, Self::PendingNormal | Self::PendingLegionella)
    }

    /// Running states of a normal heat-up, where stepping and buffering apply
    pub fn is_running_normal(self) -> bool {
        matches!(
            self,
            Self::RunningNormal | Self::RunningStepped | Self::RunningBuffer
        )
    }

    pub fn is_legionella(self) -> bool {
        matches!(self, Self::PendingLegionella | Self::RunningLegionella)
    }

    /// Cycle kind owning this mode, `None` when idle or under manual control
    pub fn cycle_kind(self) -> Option<CycleKind> {
        match self {
            Self::PendingNormal | Self::RunningNormal | Self::RunningStepped | Self::RunningBuffer => {
                Some(CycleKind::Normal)
            }
            Self::PendingLegionella | Self::RunningLegionella => Some(CycleKind::Legionella),
            Self::Off | Self::RunningManual => None,
        }
    }
}

impl fmt::Display for DhwMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DhwMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown DHW mode: '{s}'"))
    }
}

/// Persisted operating mode, one live record per circuit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatingMode {
    pub circuit: Circuit,
    pub mode: DhwMode,
    pub last_modified: DateTime<Utc>,
}

impl OperatingMode {
    pub fn new(circuit: Circuit, mode: DhwMode, at: DateTime<Utc>) -> Self {
        Self {
            circuit,
            mode,
            last_modified: at,
        }
    }
}

/// How a cycle drives the DHW setpoint towards its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunningMode {
    /// Jump straight to the target
    #[default]
    Normal,
    /// Stage the setpoint just above the tank temperature and ramp it up
    Stepped,
    /// Stepped while it is cold outside, normal otherwise
    Auto,
}

impl RunningMode {
    /// Whether a cycle starting now should ramp, given the outside temperature
    pub fn uses_stepping(self, outside_temp: f64, auto_step_max_temp: f64) -> bool {
        match self {
            Self::Normal => false,
            Self::Stepped => true,
            Self::Auto => outside_temp <= auto_step_max_temp,
        }
    }
}
