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

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ecodan_adapters::{EcodanActuator, HabTelemetry, ServiceClient, SoleilForecast};
use ecodan_core::{ControlContext, OperatingModeController, SystemClock};
use ecodan_server::config::AppConfig;
use ecodan_server::dashboard::{self, DashboardState};
use ecodan_server::db::Database;
use ecodan_server::jobs;

#[derive(Parser)]
#[command(name = "ecodan-ctrl")]
#[command(about = "Solar-aware hot water and heating control for Ecodan heat pumps", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "ecodan.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "ecodan_ctrl=info,ecodan_server=info,ecodan_core=info,ecodan_adapters=info",
            )
        }))
        .init();

    let cli = Cli::parse();
    info!(path = %cli.config.display(), "Loading configuration");
    let config = AppConfig::from_file(&cli.config)?;
    let tz = config.control.tz()?;

    let db = Arc::new(Database::open(&config.database.path)?);
    info!(path = %config.database.path, "Database opened");

    let ecodan = ServiceClient::new("ecodan", &config.services.ecodan)
        .context("Invalid ecodan service settings")?;
    let hab = ServiceClient::new("hab", &config.services.hab)
        .context("Invalid hab service settings")?;
    let soleil = ServiceClient::new("soleil", &config.services.soleil)
        .context("Invalid soleil service settings")?;

    let ctx = ControlContext {
        store: db.clone(),
        telemetry: Arc::new(HabTelemetry::new(hab)),
        forecast: Arc::new(SoleilForecast::new(soleil)),
        actuator: Arc::new(EcodanActuator::new(ecodan)),
        clock: Arc::new(SystemClock),
        tz,
    };

    let mut controller = OperatingModeController::new(ctx, config.control.clone());
    controller.startup().await;
    let controller = Arc::new(Mutex::new(controller));

    let handles = jobs::spawn_all(&controller, tz);
    info!("Started {} periodic jobs", handles.len());

    let app = dashboard::router(DashboardState {
        db: Arc::clone(&db),
        tz,
    });

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Ecodan control listening on {addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
