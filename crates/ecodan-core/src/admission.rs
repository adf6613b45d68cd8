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

use tracing::debug;

use ecodan_types::{MeasurementKind, PeriodStats};

use crate::context::ControlContext;
use crate::error::{ControlError, ControlResult};

/// Load-shedding gate consulted before a cycle starts
#[derive(Debug, Clone, Copy)]
pub struct LoadAdmission {
    pub stddev_factor: f64,
}

impl LoadAdmission {
    pub fn new(stddev_factor: f64) -> Self {
        Self { stddev_factor }
    }

    pub fn threshold(&self, baseline: &PeriodStats) -> f64 {
        baseline.q50 + self.stddev_factor * baseline.stddev
    }

    pub fn admits(&self, baseline: &PeriodStats, current_consumption: f64) -> bool {
        current_consumption <= self.threshold(baseline)
    }

    pub async fn can_start(&self, ctx: &ControlContext) -> ControlResult<bool> {
        let (baseline, current) = tokio::try_join!(
            async {
                ctx.telemetry
                    .consumption_baseline()
                    .await
                    .map_err(|source| ControlError::Telemetry {
                        what: "consumption baseline",
                        source,
                    })
            },
            ctx.measurement(MeasurementKind::CurrentConsumption),
        )?;

        let threshold = self.threshold(&baseline);
        let admitted = current.value <= threshold;
        debug!(
            consumption = current.value,
            threshold, admitted, "Evaluated load admission"
        );
        Ok(admitted)
    }
}
