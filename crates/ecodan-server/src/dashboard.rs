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

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::json;
use tracing::error;

use crate::db::Database;
use ecodan_core::RecordStore;
use ecodan_types::{Circuit, DhwMode, ScheduledCycle};

/// Shown when nothing is scheduled
pub const IDLE_LABEL: &str = "⏸";

#[derive(Debug, Clone)]
pub struct DashboardState {
    pub db: Arc<Database>,
    pub tz: Tz,
}

#[derive(Debug, Serialize)]
pub struct NextCycleResponse {
    pub kind: Option<&'static str>,
    pub planned_start: Option<DateTime<Utc>>,
    pub label: String,
}

#[derive(Debug, Serialize)]
pub struct ModeResponse {
    pub circuit: &'static str,
    pub mode: &'static str,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Short label of the next cycle, e.g. `♨ 13:00`, or `🌶 Tue 04:30` when not today
pub fn cycle_label(cycle: &ScheduledCycle, now: DateTime<Utc>, tz: Tz) -> String {
    let local = cycle.planned_start.with_timezone(&tz);
    let format = if local.date_naive() > now.with_timezone(&tz).date_naive() {
        "%a %H:%M"
    } else {
        "%H:%M"
    };
    format!("{} {}", cycle.kind.symbol(), local.format(format))
}

pub fn router(state: DashboardState) -> Router {
    Router::new()
        .route("/", get(health_handler))
        .route("/api/next-cycle", get(next_cycle_handler))
        .route("/api/mode", get(mode_handler))
        .with_state(state)
}

fn internal_error(e: &anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
        .into_response()
}

#[expect(clippy::unused_async, reason = "axum handler must be async")]
pub async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[expect(clippy::unused_async, reason = "axum handler must be async")]
pub async fn next_cycle_handler(State(state): State<DashboardState>) -> Response {
    match state.db.next_cycle() {
        Ok(Some(cycle)) => Json(NextCycleResponse {
            kind: Some(cycle.kind.as_str()),
            planned_start: Some(cycle.planned_start),
            label: cycle_label(&cycle, Utc::now(), state.tz),
        })
        .into_response(),
        Ok(None) => Json(NextCycleResponse {
            kind: None,
            planned_start: None,
            label: IDLE_LABEL.to_owned(),
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to read next cycle");
            internal_error(&e)
        }
    }
}

#[expect(clippy::unused_async, reason = "axum handler must be async")]
pub async fn mode_handler(State(state): State<DashboardState>) -> Response {
    match state.db.operating_mode(Circuit::Dhw) {
        Ok(mode) => Json(ModeResponse {
            circuit: Circuit::Dhw.as_str(),
            mode: mode.as_ref().map_or(DhwMode::Off, |m| m.mode).as_str(),
            last_modified: mode.map(|m| m.last_modified),
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to read operating mode");
            internal_error(&e)
        }
    }
}
