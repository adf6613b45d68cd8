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

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::Path;

use ecodan_adapters::ServiceEndpoint;
use ecodan_types::ControllerConfig;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub services: ServiceSettings,
    #[serde(default)]
    pub control: ControllerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: String,
}

/// Endpoints of the three external services
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceSettings {
    #[serde(default)]
    pub ecodan: ServiceEndpoint,
    #[serde(default)]
    pub hab: ServiceEndpoint,
    #[serde(default)]
    pub soleil: ServiceEndpoint,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_owned()
}

fn default_port() -> u16 {
    8200
}

fn default_db_path() -> String {
    "./data/ecodan-ctrl.db".to_owned()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl AppConfig {
    /// Load the TOML file, apply environment overrides and validate
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::parse(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse config TOML")
    }

    /// Credentials usually come from the environment rather than the file
    pub fn apply_env_overrides(&mut self) {
        self.services.ecodan.apply_env("ECODAN_API");
        self.services.hab.apply_env("HAB_API");
        self.services.soleil.apply_env("SOLEIL_API");
        if let Ok(path) = std::env::var("ECODAN_DB_PATH") {
            self.database.path = path;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.control.validate()?;

        for (name, endpoint) in [
            ("ecodan", &self.services.ecodan),
            ("hab", &self.services.hab),
            ("soleil", &self.services.soleil),
        ] {
            if endpoint.base_url.is_empty() {
                bail!("services.{name}.base_url must be set");
            }
        }
        if self.database.path.is_empty() {
            bail!("database.path must be set");
        }
        Ok(())
    }
}
