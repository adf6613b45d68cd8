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

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use ecodan_core::RecordStore;
use ecodan_types::{
    Circuit, CycleKind, DhwMode, OperatingMode, ScheduledCycle, SetpointRecord, SetpointRole,
};

/// SQLite persistence of operating modes, scheduled cycles and setpoints
#[derive(Debug)]
pub struct Database {
    conn: Mutex<rusqlite::Connection>,
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("Invalid stored timestamp: {value}"))
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        let conn = rusqlite::Connection::open(path)
            .with_context(|| format!("Failed to open database: {path}"))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS operating_mode (
                circuit        TEXT PRIMARY KEY,
                mode           TEXT NOT NULL,
                last_modified  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS cycle_schedule (
                kind           TEXT PRIMARY KEY,
                first_start    TEXT NOT NULL,
                planned_start  TEXT NOT NULL,
                ultimate_start TEXT NOT NULL,
                fast           INTEGER NOT NULL DEFAULT 0,
                retry          INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_cycle_planned
                ON cycle_schedule(planned_start);

            CREATE TABLE IF NOT EXISTS setpoint (
                role           TEXT PRIMARY KEY,
                value          REAL NOT NULL,
                last_modified  TEXT NOT NULL
            );",
        )
        .context("Failed to initialize database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, rusqlite::Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database mutex poisoned"))
    }

    fn query_cycle(
        &self,
        sql: &str,
        args: impl rusqlite::Params,
    ) -> Result<Option<ScheduledCycle>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(sql, args, |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, bool>(4)?,
                    row.get::<_, u32>(5)?,
                ))
            })
            .optional()
            .context("Failed to read cycle schedule")?;

        row.map(|(kind, first, planned, ultimate, fast, retry)| {
            Ok(ScheduledCycle {
                kind: kind.parse::<CycleKind>()?,
                first_start: parse_time(&first)?,
                planned_start: parse_time(&planned)?,
                ultimate_start: parse_time(&ultimate)?,
                fast,
                retry,
            })
        })
        .transpose()
    }
}

impl RecordStore for Database {
    fn operating_mode(&self, circuit: Circuit) -> Result<Option<OperatingMode>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT mode, last_modified FROM operating_mode WHERE circuit = ?1",
                params![circuit.as_str()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .context("Failed to read operating mode")?;

        row.map(|(mode, last_modified)| {
            Ok(OperatingMode {
                circuit,
                mode: mode.parse::<DhwMode>()?,
                last_modified: parse_time(&last_modified)?,
            })
        })
        .transpose()
    }

    fn save_operating_mode(&self, mode: &OperatingMode) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO operating_mode (circuit, mode, last_modified)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(circuit) DO UPDATE SET
                mode = excluded.mode,
                last_modified = excluded.last_modified",
            params![
                mode.circuit.as_str(),
                mode.mode.as_str(),
                mode.last_modified.to_rfc3339()
            ],
        )
        .context("Failed to save operating mode")?;
        Ok(())
    }

    fn cycle(&self, kind: CycleKind) -> Result<Option<ScheduledCycle>> {
        self.query_cycle(
            "SELECT kind, first_start, planned_start, ultimate_start, fast, retry
             FROM cycle_schedule WHERE kind = ?1",
            params![kind.as_str()],
        )
    }

    fn save_cycle(&self, cycle: &ScheduledCycle) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO cycle_schedule
                (kind, first_start, planned_start, ultimate_start, fast, retry)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(kind) DO UPDATE SET
                first_start = excluded.first_start,
                planned_start = excluded.planned_start,
                ultimate_start = excluded.ultimate_start,
                fast = excluded.fast,
                retry = excluded.retry",
            params![
                cycle.kind.as_str(),
                cycle.first_start.to_rfc3339(),
                cycle.planned_start.to_rfc3339(),
                cycle.ultimate_start.to_rfc3339(),
                cycle.fast,
                cycle.retry
            ],
        )
        .context("Failed to save cycle schedule")?;
        Ok(())
    }

    fn delete_cycle(&self, kind: CycleKind) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM cycle_schedule WHERE kind = ?1",
                params![kind.as_str()],
            )
            .context("Failed to delete cycle schedule")?;
        Ok(deleted > 0)
    }

    fn next_cycle(&self) -> Result<Option<ScheduledCycle>> {
        // All timestamps are written as UTC RFC 3339, so text order is time order
        self.query_cycle(
            "SELECT kind, first_start, planned_start, ultimate_start, fast, retry
             FROM cycle_schedule ORDER BY planned_start ASC LIMIT 1",
            [],
        )
    }

    fn setpoint(&self, role: SetpointRole) -> Result<Option<SetpointRecord>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT value, last_modified FROM setpoint WHERE role = ?1",
                params![role.key()],
                |row| Ok((row.get::<_, f64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .context("Failed to read setpoint")?;

        row.map(|(value, last_modified)| {
            Ok(SetpointRecord {
                role,
                value,
                last_modified: parse_time(&last_modified)?,
            })
        })
        .transpose()
    }

    fn save_setpoint(&self, record: &SetpointRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO setpoint (role, value, last_modified)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(role) DO UPDATE SET
                value = excluded.value,
                last_modified = excluded.last_modified",
            params![
                record.role.key(),
                record.value,
                record.last_modified.to_rfc3339()
            ],
        )
        .context("Failed to save setpoint")?;
        Ok(())
    }
}
