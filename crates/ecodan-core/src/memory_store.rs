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
use parking_lot::RwLock;
use std::collections::HashMap;

use ecodan_types::{
    Circuit, CycleKind, OperatingMode, ScheduledCycle, SetpointRecord, SetpointRole,
};

use crate::traits::RecordStore;

/// In-process record store keyed by natural key
///
/// Used for dry runs and tests; the server persists to SQLite instead.
#[derive(Debug, Default)]
pub struct MemoryStore {
    modes: RwLock<HashMap<Circuit, OperatingMode>>,
    cycles: RwLock<HashMap<CycleKind, ScheduledCycle>>,
    setpoints: RwLock<HashMap<SetpointRole, SetpointRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn operating_mode(&self, circuit: Circuit) -> Result<Option<OperatingMode>> {
        Ok(self.modes.read().get(&circuit).cloned())
    }

    fn save_operating_mode(&self, mode: &OperatingMode) -> Result<()> {
        self.modes.write().insert(mode.circuit, mode.clone());
        Ok(())
    }

    fn cycle(&self, kind: CycleKind) -> Result<Option<ScheduledCycle>> {
        Ok(self.cycles.read().get(&kind).cloned())
    }

    fn save_cycle(&self, cycle: &ScheduledCycle) -> Result<()> {
        self.cycles.write().insert(cycle.kind, cycle.clone());
        Ok(())
    }

    fn delete_cycle(&self, kind: CycleKind) -> Result<bool> {
        Ok(self.cycles.write().remove(&kind).is_some())
    }

    fn next_cycle(&self) -> Result<Option<ScheduledCycle>> {
        Ok(self
            .cycles
            .read()
            .values()
            .min_by_key(|cycle| cycle.planned_start)
            .cloned())
    }

    fn setpoint(&self, role: SetpointRole) -> Result<Option<SetpointRecord>> {
        Ok(self.setpoints.read().get(&role).cloned())
    }

    fn save_setpoint(&self, record: &SetpointRecord) -> Result<()> {
        self.setpoints.write().insert(record.role, record.clone());
        Ok(())
    }
}
