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

/// Round a temperature to the one decimal precision setpoints are stored with
pub fn round_setpoint(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Compare two setpoints as integer hundredths
#[expect(
    clippy::cast_possible_truncation,
    reason = "setpoints are temperatures far below i64 range"
)]
pub fn setpoint_equals(a: f64, b: f64) -> bool {
    (a * 100.0).round() as i64 == (b * 100.0).round() as i64
}

/// Role of a persisted actuator setpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetpointRole {
    /// Live ramp step last written to the tank
    DhwCurrent,
    /// Final value the running DHW cycle heats towards
    DhwTarget,
    /// Setpoint last written to a heating zone
    Heating { zone: u8 },
}

impl SetpointRole {
    /// Natural key used by record stores
    pub fn key(&self) -> String {
        match self {
            Self::DhwCurrent => "dhw_current".to_owned(),
            Self::DhwTarget => "dhw_target".to_owned(),
            Self::Heating { zone } => format!("heating_zone{zone}"),
        }
    }
}

impl fmt::Display for SetpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for SetpointRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dhw_current" => Ok(Self::DhwCurrent),
            "dhw_target" => Ok(Self::DhwTarget),
            other => other
                .strip_prefix("heating_zone")
                .and_then(|zone| zone.parse().ok())
                .map(|zone| Self::Heating { zone })
                .ok_or_else(|| anyhow::anyhow!("Unknown setpoint role: '{s}'")),
        }
    }
}

/// Persisted setpoint, value stored with one decimal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetpointRecord {
    pub role: SetpointRole,
    pub value: f64,
    pub last_modified: DateTime<Utc>,
}

impl SetpointRecord {
    pub fn new(role: SetpointRole, value: f64, at: DateTime<Utc>) -> Self {
        Self {
            role,
            value: round_setpoint(value),
            last_modified: at,
        }
    }

    pub fn equals(&self, value: f64) -> bool {
        setpoint_equals(self.value, value)
    }
}

/// Direction of a heating curve point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanPointKind {
    Raise,
    Drop,
    /// Opportunistic over-heating while surplus solar power is available
    RaiseBuffer,
}

/// One point of the daily heating curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatingPlanPoint {
    pub timestamp: DateTime<Utc>,
    pub setpoint: f64,
    pub kind: PlanPointKind,
}

impl HeatingPlanPoint {
    pub fn new(timestamp: DateTime<Utc>, setpoint: f64, kind: PlanPointKind) -> Self {
        Self {
            timestamp,
            setpoint: round_setpoint(setpoint),
            kind,
        }
    }
}

/// Where the fade period is spent around the production window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FadeDuring {
    /// Both fades happen inside daylight
    Day,
    /// Both fades happen outside daylight
    Night,
    /// Split evenly around sunrise and sunset
    #[default]
    Dusk,
}

impl FadeDuring {
    /// Offsets subtracted from production start and end, in that order
    pub fn offsets(self, period: chrono::TimeDelta) -> (chrono::TimeDelta, chrono::TimeDelta) {
        match self {
            Self::Day => (chrono::TimeDelta::zero(), period),
            Self::Night => (period, chrono::TimeDelta::zero()),
            Self::Dusk => (period / 2, period / 2),
        }
    }
}
