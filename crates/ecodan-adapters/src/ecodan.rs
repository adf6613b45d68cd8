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
use serde_json::json;
use tracing::info;

use crate::client::ServiceClient;
use ecodan_core::Actuator;

/// Writes target temperatures through the Ecodan bridge
#[derive(Debug, Clone)]
pub struct EcodanActuator {
    client: ServiceClient,
}

impl EcodanActuator {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }

    async fn put_target(&self, path: &str, value: f64) -> Result<()> {
        self.client
            .put_json(path, &json!({ "value": value }))
            .await
            .with_context(|| format!("Failed to set {path} to {value}"))
    }
}

#[async_trait]
impl Actuator for EcodanActuator {
    async fn set_dhw_target(&self, value: f64) -> Result<()> {
        info!("🚿 [ECODAN] Setting DHW target tank temperature to {value:.1}°");
        self.put_target("/tank/target_temp", value).await
    }

    async fn set_heating_target(&self, value: f64) -> Result<()> {
        info!("🏠 [ECODAN] Setting heating target temperature to {value:.1}°");
        self.put_target("/house/target_temp", value).await
    }

    fn name(&self) -> &str {
        "ecodan"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ServiceEndpoint;
    use mockito::{Matcher, Server};

    fn actuator(url: String) -> EcodanActuator {
        let endpoint = ServiceEndpoint::new(url, "ctrl", "secret");
        EcodanActuator::new(ServiceClient::new("ecodan", &endpoint).unwrap())
    }

    #[tokio::test]
    async fn test_set_dhw_target() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/tank/target_temp")
            .match_header("authorization", "Basic Y3RybDpzZWNyZXQ=")
            .match_body(Matcher::Json(json!({"value": 45.0})))
            .with_status(200)
            .create_async()
            .await;

        actuator(server.url()).set_dhw_target(45.0).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_set_heating_target() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/house/target_temp")
            .match_body(Matcher::Json(json!({"value": 20.5})))
            .with_status(204)
            .create_async()
            .await;

        actuator(server.url()).set_heating_target(20.5).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_write_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("PUT", "/tank/target_temp")
            .with_status(500)
            .create_async()
            .await;

        let result = actuator(server.url()).set_dhw_target(60.0).await;
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("/tank/target_temp"));
    }
}
