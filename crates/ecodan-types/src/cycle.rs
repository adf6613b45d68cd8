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
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of bounded DHW heating run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleKind {
    /// Regular heat-up of the tank to the base temperature
    Normal,
    /// Anti-legionella disinfection run
    Legionella,
}

impl CycleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Legionella => "legionella",
        }
    }

    /// Short label used by the dashboard feed
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Normal => "♨",
            Self::Legionella => "🌶",
        }
    }
}

impl fmt::Display for CycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CycleKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "normal" => Ok(Self::Normal),
            "legionella" => Ok(Self::Legionella),
            _ => Err(anyhow::anyhow!("Unknown cycle kind: '{s}'")),
        }
    }
}

/// Which admissible window the forecast should return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchOrder {
    First,
    Last,
}

impl SearchOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Last => "last",
        }
    }
}

/// A planned future cycle
///
/// `first_start <= planned_start <= ultimate_start` holds for every value built
/// through [`ScheduledCycle::new`] or updated through
/// [`ScheduledCycle::replan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledCycle {
    pub kind: CycleKind,
    pub first_start: DateTime<Utc>,
    pub planned_start: DateTime<Utc>,
    pub ultimate_start: DateTime<Utc>,
    /// Earliest admissible window was requested
    pub fast: bool,
    pub retry: u32,
}

impl ScheduledCycle {
    /// Build a freshly planned cycle, clamping the forecast answer into the window
    pub fn new(
        kind: CycleKind,
        first_start: DateTime<Utc>,
        planned_start: DateTime<Utc>,
        ultimate_start: DateTime<Utc>,
        fast: bool,
    ) -> Self {
        let ultimate_start = ultimate_start.max(first_start);
        Self {
            kind,
            first_start,
            planned_start: planned_start.clamp(first_start, ultimate_start),
            ultimate_start,
            fast,
            retry: 0,
        }
    }

    /// Move the window and planned start, keeping the ordering invariant
    pub fn replan(
        &mut self,
        first_start: DateTime<Utc>,
        planned_start: DateTime<Utc>,
        ultimate_start: DateTime<Utc>,
    ) {
        self.first_start = first_start;
        self.ultimate_start = ultimate_start.max(first_start);
        self.planned_start = planned_start.clamp(self.first_start, self.ultimate_start);
    }

    pub fn search_order(&self) -> SearchOrder {
        if self.fast {
            SearchOrder::First
        } else {
            SearchOrder::Last
        }
    }

    /// Planned start lies within `tolerance` of `now`, on either side
    pub fn is_due(&self, now: DateTime<Utc>, tolerance: TimeDelta) -> bool {
        (now - self.planned_start).abs() <= tolerance
    }

    pub fn is_window_consistent(&self) -> bool {
        self.first_start <= self.planned_start && self.planned_start <= self.ultimate_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_new_clamps_planned_start_into_window() {
        let early = ScheduledCycle::new(CycleKind::Normal, at(10, 0), at(9, 0), at(18, 0), true);
        assert_eq!(early.planned_start, at(10, 0));
        assert_eq!(early.retry, 0);

        let late = ScheduledCycle::new(CycleKind::Normal, at(10, 0), at(20, 0), at(18, 0), true);
        assert_eq!(late.planned_start, at(18, 0));
        assert!(late.is_window_consistent());
    }

    #[test]
    fn test_new_never_inverts_window() {
        let cycle = ScheduledCycle::new(
            CycleKind::Legionella,
            at(12, 0),
            at(11, 0),
            at(11, 30),
            false,
        );
        assert!(cycle.is_window_consistent());
        assert_eq!(cycle.ultimate_start, at(12, 0));
    }

    #[test]
    fn test_is_due_is_symmetric() {
        let cycle = ScheduledCycle::new(CycleKind::Normal, at(10, 0), at(12, 0), at(18, 0), true);
        let tolerance = TimeDelta::seconds(35);
        assert!(cycle.is_due(at(12, 0), tolerance));
        assert!(cycle.is_due(at(12, 0) + TimeDelta::seconds(35), tolerance));
        assert!(cycle.is_due(at(12, 0) - TimeDelta::seconds(35), tolerance));
        assert!(!cycle.is_due(at(12, 0) + TimeDelta::seconds(36), tolerance));
        assert!(!cycle.is_due(at(12, 0) - TimeDelta::seconds(36), tolerance));
    }

    #[test]
    fn test_search_order_follows_fast_flag() {
        let mut cycle =
            ScheduledCycle::new(CycleKind::Legionella, at(10, 0), at(12, 0), at(18, 0), true);
        assert_eq!(cycle.search_order(), SearchOrder::First);
        cycle.fast = false;
        assert_eq!(cycle.search_order(), SearchOrder::Last);
    }
}
