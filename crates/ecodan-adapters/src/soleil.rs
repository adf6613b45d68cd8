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
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info};

use crate::client::ServiceClient;
use crate::types::{PeakResult, format_timestamp, parse_timestamp};
use ecodan_core::ForecastSource;
use ecodan_types::{PeakProductionQuery, PeriodStats, ProductionWeather, TimeRange};

/// Hour resolution of the peak search
const PEAK_PRECISION: u32 = 1;

/// Hours colder than this are left out of the peak search
const PEAK_MIN_TEMP: i32 = 6;

/// Solar production and weather forecast service
#[derive(Debug, Clone)]
pub struct SoleilForecast {
    client: ServiceClient,
}

impl SoleilForecast {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }

    fn range_query(range: TimeRange) -> Vec<(&'static str, String)> {
        vec![
            ("start", format_timestamp(range.start)),
            ("end", format_timestamp(range.end)),
        ]
    }
}

#[async_trait]
impl ForecastSource for SoleilForecast {
    async fn peak_production(&self, query: &PeakProductionQuery) -> Result<DateTime<Utc>> {
        let params = [
            ("start", format_timestamp(query.start)),
            ("end", format_timestamp(query.end)),
            ("min_kwh", query.min_kwh.to_string()),
            ("peak_duration_h", query.duration_hours.to_string()),
            ("order", query.order.as_str().to_owned()),
            ("precision", PEAK_PRECISION.to_string()),
            ("min_temp", PEAK_MIN_TEMP.to_string()),
        ];
        let answer: PeakResult = self
            .client
            .get_json("/production/peak", &params)
            .await
            .context("Failed to query peak production from soleil")?;
        let peak = parse_timestamp(&answer.result)?;

        info!(
            start = %query.start,
            end = %query.end,
            order = query.order.as_str(),
            "☀️ [SOLEIL] Peak production window starts at {peak}"
        );
        Ok(peak)
    }

    async fn production_bounds(&self, date: NaiveDate, min_power_kw: f64) -> Result<TimeRange> {
        let params = [
            ("date", date.format("%Y-%m-%d").to_string()),
            ("min_kW", min_power_kw.to_string()),
        ];
        let bounds: TimeRange = self
            .client
            .get_json("/production/bounds", &params)
            .await
            .with_context(|| format!("Failed to query production bounds for {date}"))?;
        debug!("[SOLEIL] Production on {date} from {} to {}", bounds.start, bounds.end);
        Ok(bounds)
    }

    async fn temperature_stats(&self, range: TimeRange) -> Result<PeriodStats> {
        let stats: PeriodStats = self
            .client
            .get_json("/temperature/stats", &Self::range_query(range))
            .await
            .context("Failed to query temperature forecast from soleil")?;
        debug!(
            q25 = stats.q25,
            q50 = stats.q50,
            q75 = stats.q75,
            "[SOLEIL] Outside temperature from {} to {}",
            range.start,
            range.end
        );
        Ok(stats)
    }

    async fn production_weather(&self, range: TimeRange) -> Result<ProductionWeather> {
        let weather: ProductionWeather = self
            .client
            .get_json("/production/weather", &Self::range_query(range))
            .await
            .context("Failed to query production weather from soleil")?;
        debug!(
            ratio = weather.ratio,
            expected_kwh = ?weather.expected_kwh,
            "[SOLEIL] Production weather from {} to {}",
            range.start,
            range.end
        );
        Ok(weather)
    }

    fn name(&self) -> &str {
        "soleil"
    }
}
