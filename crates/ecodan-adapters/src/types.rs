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

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::Deserialize;

use crate::errors::{AdapterError, AdapterResult};

/// `{"result": "<iso timestamp>"}` answer of the peak production search
#[derive(Debug, Clone, Deserialize)]
pub struct PeakResult {
    pub result: String,
}

/// Parse an ISO 8601 timestamp, reading values without offset as UTC
pub fn parse_timestamp(value: &str) -> AdapterResult<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| AdapterError::InvalidResponse(format!("Bad timestamp '{value}': {e}")))
}

/// Timestamp as sent in query strings
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, false)
}
