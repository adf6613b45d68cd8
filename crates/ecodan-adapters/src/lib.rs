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

//! HTTP adapters for the heat pump bridge, the home automation bridge and the
//! solar forecast service

pub mod client;
pub mod ecodan;
pub mod errors;
pub mod hab;
pub mod soleil;
pub mod types;

pub use client::{ServiceClient, ServiceEndpoint};
pub use ecodan::EcodanActuator;
pub use errors::{AdapterError, AdapterResult};
pub use hab::HabTelemetry;
pub use soleil::SoleilForecast;
