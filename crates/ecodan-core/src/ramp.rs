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

use ringbuffer::{AllocRingBuffer, RingBuffer};
use tracing::debug;

use ecodan_types::{CycleTimingConfig, DeviceStatus, HeatSource, SetpointRole, round_setpoint};

use crate::context::ControlContext;
use crate::error::ControlResult;

/// Stepping hysteresis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampConfig {
    pub step: f64,
    /// Measured value must be within this of the current step
    pub buffer_interval: f64,
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            step: 1.0,
            buffer_interval: 2.0,
        }
    }
}

impl From<&CycleTimingConfig> for RampConfig {
    fn from(config: &CycleTimingConfig) -> Self {
        Self {
            step: config.step,
            buffer_interval: config.buffer_interval,
        }
    }
}

impl RampConfig {
    pub fn has_caught_up(&self, measured: f64, current: f64) -> bool {
        measured >= current - self.buffer_interval
    }

    /// Next step towards `ceiling`, `None` while the device is still catching up
    pub fn next_step(&self, measured: f64, current: f64, ceiling: f64) -> Option<f64> {
        if self.has_caught_up(measured, current) && current <= ceiling - self.step {
            Some(round_setpoint(current + self.step))
        } else {
            None
        }
    }

    /// Raise the persisted current DHW setpoint one step and push it to the device
    pub async fn advance(
        &self,
        ctx: &ControlContext,
        measured: f64,
        ceiling: f64,
    ) -> ControlResult<Option<f64>> {
        let Some(current) = ctx.setpoint(SetpointRole::DhwCurrent)? else {
            debug!("No current DHW setpoint stored, nothing to step");
            return Ok(None);
        };

        match self.next_step(measured, current.value, ceiling) {
            Some(next) => {
                debug!(
                    "DHW at {measured}° is within {}° of {}°, stepping to {next}°",
                    self.buffer_interval, current.value
                );
                ctx.save_setpoint(SetpointRole::DhwCurrent, next)?;
                ctx.actuate_dhw(next).await?;
                Ok(Some(next))
            }
            None => {
                debug!(
                    "DHW at {measured}° with step {}° towards {ceiling}°, not stepping",
                    current.value
                );
                Ok(None)
            }
        }
    }
}

/// Whether buffering should go on after the latest sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferVerdict {
    Continue,
    Stop,
}

/// Most recent net power samples taken while buffering
#[derive(Debug)]
pub struct PowerSampleWindow {
    samples: AllocRingBuffer<f64>,
}

impl PowerSampleWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: AllocRingBuffer::new(capacity.max(1)),
        }
    }

    pub fn push(&mut self, net_power: f64) {
        let _ = self.samples.push(net_power);
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.samples.is_full()
    }

    pub fn samples(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }

    /// Some sample shows export, or the window has not filled up yet
    pub fn still_exporting(&self) -> bool {
        !self.samples.is_full() || self.samples.iter().any(|sample| *sample <= 0.0)
    }

    /// Push a sample and judge the window
    pub fn record(&mut self, net_power: f64) -> BufferVerdict {
        self.push(net_power);
        if self.still_exporting() {
            BufferVerdict::Continue
        } else {
            BufferVerdict::Stop
        }
    }
}

/// Stepping plus buffering admission and debounce
#[derive(Debug)]
pub struct RampController {
    pub config: RampConfig,
    window: PowerSampleWindow,
}

impl RampController {
    pub fn new(config: RampConfig, window_capacity: usize) -> Self {
        Self {
            config,
            window: PowerSampleWindow::new(window_capacity),
        }
    }

    /// Buffering needs the compressor itself running while exporting
    pub fn may_start_buffering(status: &DeviceStatus, net_power: f64) -> bool {
        status.heat_source == HeatSource::HeatPump && net_power < 0.0
    }

    /// Try to enter buffering, clearing the window on entry
    pub fn enter_buffering(&mut self, status: &DeviceStatus, net_power: f64) -> bool {
        if Self::may_start_buffering(status, net_power) {
            self.window.clear();
            true
        } else {
            false
        }
    }

    pub fn record_power(&mut self, net_power: f64) -> BufferVerdict {
        self.window.record(net_power)
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }

    pub fn window(&self) -> &PowerSampleWindow {
        &self.window
    }
}
