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

use ecodan_types::CycleKind;
use thiserror::Error;

/// Control core error types
#[derive(Error, Debug)]
pub enum ControlError {
    /// Postponing is no longer possible, callers start the cycle anyway
    #[error("cannot postpone {kind} cycle any further (retry {retry})")]
    RetriesExhausted { kind: CycleKind, retry: u32 },

    #[error("failed to set {target} on the appliance")]
    Actuation {
        target: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("telemetry read failed: {what}")]
    Telemetry {
        what: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("forecast query failed: {what}")]
    Forecast {
        what: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("record store failure")]
    Store(#[source] anyhow::Error),
}

impl ControlError {
    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. })
    }
}

pub type ControlResult<T> = Result<T, ControlError>;
