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

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use chrono_tz::Tz;
use tracing::debug;

use ecodan_types::config::hours;
use ecodan_types::{PeakProductionQuery, PeriodStats, ProductionWeather, SearchOrder, TimeRange};

use crate::cluster::{ClusterConfig, ProductionSample, production_windows};
use crate::traits::ForecastSource;

/// Minimum separation between two candidate production windows
const WINDOW_GAP_HOURS: i64 = 1;

/// Samples below this do not count towards a production window
const DEFAULT_PRODUCTIVE_KW: f64 = 0.5;

/// One forecast sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastSample {
    pub timestamp: DateTime<Utc>,
    pub power_kw: f64,
    /// Production under a clear sky at the same time
    pub clearsky_kw: f64,
    pub temperature: f64,
}

/// Forecast answered from samples held in memory
///
/// Stands in for the forecast service in dry runs and tests.
#[derive(Debug, Clone)]
pub struct SampledForecast {
    samples: Vec<ForecastSample>,
    sample_interval: TimeDelta,
    productive_kw: f64,
    tz: Tz,
}

impl SampledForecast {
    pub fn new(mut samples: Vec<ForecastSample>, sample_interval: TimeDelta, tz: Tz) -> Self {
        samples.sort_by_key(|sample| sample.timestamp);
        Self {
            samples,
            sample_interval,
            productive_kw: DEFAULT_PRODUCTIVE_KW,
            tz,
        }
    }

    #[must_use]
    pub fn with_productive_kw(mut self, productive_kw: f64) -> Self {
        self.productive_kw = productive_kw;
        self
    }

    /// Hourly samples for the common case
    pub fn hourly(samples: Vec<ForecastSample>, tz: Tz) -> Self {
        Self::new(samples, TimeDelta::hours(1), tz)
    }

    fn in_range(&self, range: TimeRange) -> impl Iterator<Item = &ForecastSample> {
        self.samples
            .iter()
            .filter(move |sample| range.contains(sample.timestamp))
    }

    fn sample_hours(&self) -> f64 {
        self.sample_interval.as_seconds_f64() / 3600.0
    }

    /// Best window start for a query, `None` when no window holds enough energy
    pub fn best_window(&self, query: &PeakProductionQuery) -> Option<DateTime<Utc>> {
        let range = TimeRange::new(query.start, query.end);
        let samples: Vec<ProductionSample> = self
            .in_range(range)
            .map(|sample| ProductionSample {
                timestamp: sample.timestamp,
                power_kw: sample.power_kw,
            })
            .collect();

        let config = ClusterConfig {
            max_clusters: samples.len(),
            // A window of N samples spans N - 1 intervals
            max_span: (hours(query.duration_hours) - self.sample_interval).max(TimeDelta::zero()),
            min_gap: TimeDelta::hours(WINDOW_GAP_HOURS),
        };
        let admissible = production_windows(&samples, self.productive_kw, config)
            .into_iter()
            .filter(|window| window.energy_kwh(self.sample_interval) >= query.min_kwh);

        let mut starts = admissible.map(|window| window.range.start);
        match query.order {
            SearchOrder::First => starts.next(),
            SearchOrder::Last => starts.last(),
        }
    }
}

#[async_trait]
impl ForecastSource for SampledForecast {
    async fn peak_production(&self, query: &PeakProductionQuery) -> Result<DateTime<Utc>> {
        if let Some(start) = self.best_window(query) {
            return Ok(start);
        }

        let fallback = match query.order {
            SearchOrder::First => query.start,
            SearchOrder::Last => query.end,
        };
        debug!(
            min_kwh = query.min_kwh,
            "No production window holds enough energy, falling back to {fallback}"
        );
        Ok(fallback)
    }

    async fn production_bounds(&self, date: NaiveDate, min_power_kw: f64) -> Result<TimeRange> {
        let mut productive = self.samples.iter().filter(|sample| {
            sample.timestamp.with_timezone(&self.tz).date_naive() == date
                && sample.power_kw >= min_power_kw
        });

        let Some(first) = productive.next() else {
            bail!("No production above {min_power_kw} kW forecast for {date}");
        };
        let last = productive.last().unwrap_or(first);
        Ok(TimeRange::new(first.timestamp, last.timestamp))
    }

    async fn temperature_stats(&self, range: TimeRange) -> Result<PeriodStats> {
        let values: Vec<f64> = self.in_range(range).map(|sample| sample.temperature).collect();
        if values.is_empty() {
            bail!("No temperature forecast between {} and {}", range.start, range.end);
        }
        Ok(period_stats(range, "°C", values))
    }

    async fn production_weather(&self, range: TimeRange) -> Result<ProductionWeather> {
        let (production, clearsky) = self
            .in_range(range)
            .fold((0.0, 0.0), |(production, clearsky), sample| {
                (production + sample.power_kw, clearsky + sample.clearsky_kw)
            });
        if clearsky <= 0.0 {
            bail!("No clear sky production between {} and {}", range.start, range.end);
        }
        Ok(ProductionWeather {
            ratio: production / clearsky,
            expected_kwh: Some(production * self.sample_hours()),
        })
    }

    fn name(&self) -> &str {
        "sampled-forecast"
    }
}

/// Quantiles by linear interpolation and population standard deviation
pub fn period_stats(range: TimeRange, unit: &str, mut values: Vec<f64>) -> PeriodStats {
    values.sort_by(f64::total_cmp);

    #[expect(
        clippy::cast_precision_loss,
        reason = "sample counts are far below 2^52"
    )]
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;

    PeriodStats {
        start: range.start,
        end: range.end,
        unit: unit.to_owned(),
        q25: quantile(&values, 0.25),
        q50: quantile(&values, 0.5),
        q75: quantile(&values, 0.75),
        stddev: variance.sqrt(),
    }
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    reason = "positions are bounded by the slice length"
)]
fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted {
        [] => f64::NAN,
        [only] => *only,
        _ => {
            let position = q * (sorted.len() - 1) as f64;
            let lower = position.floor() as usize;
            let upper = position.ceil() as usize;
            let fraction = position - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn forecast() -> SampledForecast {
        let profile = [
            (5, 0.0),
            (6, 0.4),
            (7, 1.2),
            (8, 2.0),
            (9, 2.5),
            (10, 0.6),
            (11, 0.6),
            (12, 0.6),
            (13, 2.0),
            (14, 2.0),
            (15, 1.5),
            (16, 0.4),
            (17, 0.0),
        ];
        let samples = profile
            .iter()
            .map(|(hour, power_kw)| ForecastSample {
                timestamp: day() + TimeDelta::hours(*hour),
                power_kw: *power_kw,
                clearsky_kw: 2.5,
                temperature: *hour as f64,
            })
            .collect();
        SampledForecast::hourly(samples, chrono_tz::UTC)
    }

    fn query(order: SearchOrder, min_kwh: f64) -> PeakProductionQuery {
        PeakProductionQuery {
            start: day(),
            end: day() + TimeDelta::hours(23),
            min_kwh,
            duration_hours: 2.0,
            order,
        }
    }

    #[tokio::test]
    async fn test_peak_production_follows_search_order() {
        let forecast = forecast();

        let first = forecast
            .peak_production(&query(SearchOrder::First, 3.0))
            .await
            .unwrap();
        assert_eq!(first, day() + TimeDelta::hours(7));

        let last = forecast
            .peak_production(&query(SearchOrder::Last, 3.0))
            .await
            .unwrap();
        assert_eq!(last, day() + TimeDelta::hours(13));
    }

    #[tokio::test]
    async fn test_peak_production_falls_back_to_query_bound() {
        let forecast = forecast();

        let first = forecast
            .peak_production(&query(SearchOrder::First, 50.0))
            .await
            .unwrap();
        assert_eq!(first, day());

        let last = forecast
            .peak_production(&query(SearchOrder::Last, 50.0))
            .await
            .unwrap();
        assert_eq!(last, day() + TimeDelta::hours(23));
    }

    #[tokio::test]
    async fn test_production_bounds_of_a_day() {
        let bounds = forecast()
            .production_bounds(day().date_naive(), 0.5)
            .await
            .unwrap();
        assert_eq!(bounds.start, day() + TimeDelta::hours(7));
        assert_eq!(bounds.end, day() + TimeDelta::hours(15));

        let missing = forecast()
            .production_bounds(day().date_naive(), 10.0)
            .await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn test_weather_ratio_against_clear_sky() {
        let range = TimeRange::new(day() + TimeDelta::hours(8), day() + TimeDelta::hours(9));
        let weather = forecast().production_weather(range).await.unwrap();
        assert!((weather.ratio - 0.9).abs() < 1e-9);
        assert_eq!(weather.expected_kwh, Some(4.5));
    }

    #[test]
    fn test_period_stats() {
        let range = TimeRange::new(day(), day());
        let stats = period_stats(range, "°C", vec![4.0, 1.0, 3.0, 2.0, 5.0]);
        assert_eq!(stats.q50, 3.0);
        assert_eq!(stats.q25, 2.0);
        assert_eq!(stats.q75, 4.0);
        assert!((stats.stddev - 2.0_f64.sqrt()).abs() < 1e-9);
    }
}
