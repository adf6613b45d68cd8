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

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::client::ServiceClient;
use crate::errors::AdapterError;
use crate::types::format_timestamp;
use ecodan_core::TelemetrySource;
use ecodan_types::{
    DeviceSetpoint, DeviceStatus, Measurement, MeasurementKind, PeriodStats, TimeRange,
};

fn measurement_path(kind: MeasurementKind) -> &'static str {
    match kind {
        MeasurementKind::TankTemperature => "/dhw/temp",
        MeasurementKind::OutsideTemperature => "/outside/temp",
        MeasurementKind::NetPower => "/power/net/current",
        MeasurementKind::DailyProduction => "/production/daily",
        MeasurementKind::CurrentConsumption => "/consumption/current",
    }
}

/// Telemetry from the home automation bridge
#[derive(Debug, Clone)]
pub struct HabTelemetry {
    client: ServiceClient,
}

impl HabTelemetry {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.client
            .get_json(path, &[])
            .await
            .with_context(|| format!("Failed to read {path} from hab"))
    }
}

#[async_trait]
impl TelemetrySource for HabTelemetry {
    async fn device_status(&self) -> Result<DeviceStatus> {
        let status: DeviceStatus = self.get("/heatpump/status").await?;
        debug!(
            operating_mode = ?status.operating_mode,
            heat_source = ?status.heat_source,
            defrost = ?status.defrost,
            "📊 [HAB] Heat pump status"
        );
        Ok(status)
    }

    async fn device_setpoint(&self) -> Result<DeviceSetpoint> {
        let setpoint: DeviceSetpoint = self.get("/heatpump/setpoint").await?;
        debug!(
            dhw = setpoint.dhw,
            heating = setpoint.heating,
            "📊 [HAB] Heat pump setpoints"
        );
        Ok(setpoint)
    }

    async fn measurement(&self, kind: MeasurementKind) -> Result<Measurement> {
        let measurement: Measurement = self.get(measurement_path(kind)).await?;
        debug!(
            ?kind,
            value = measurement.value,
            unit = %measurement.unit,
            "📊 [HAB] Measurement"
        );
        Ok(measurement)
    }

    async fn consumption_baseline(&self) -> Result<PeriodStats> {
        self.get("/consumption/baseline").await
    }

    async fn house_temperature_stats(
        &self,
        range: Option<TimeRange>,
    ) -> Result<Option<PeriodStats>> {
        let query: Vec<(&str, String)> = range
            .map(|range| {
                vec![
                    ("start", format_timestamp(range.start)),
                    ("end", format_timestamp(range.end)),
                ]
            })
            .unwrap_or_default();

        match self.client.get_optional_json("/house/temp", &query).await {
            Ok(stats) => Ok(stats),
            // Any non-200 answer means no data for the range
            Err(e @ (AdapterError::ApiError { .. } | AdapterError::AuthenticationFailed(_))) => {
                debug!("[HAB] No house temperature available: {e}");
                Ok(None)
            }
            Err(e) => Err(e).context("Failed to read house temperature from hab"),
        }
    }

    async fn last_legionella_start(&self) -> Result<DateTime<Utc>> {
        let last: Measurement = self.get("/legionella/last").await?;
        debug!("[HAB] Last legionella cycle started on {}", last.timestamp);
        Ok(last.timestamp)
    }

    fn name(&self) -> &str {
        "hab"
    }
}
