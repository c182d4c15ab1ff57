// restoretool/src/api/mod.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::errors::{RestoreError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("restoretool/", env!("CARGO_PKG_VERSION"));

/// A managed database service as described by the control plane.
#[derive(Debug, Clone, Deserialize)]
pub struct Service {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub pooler_enabled: bool,
}

impl Service {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Resolves a service identifier to its connection coordinates.
#[async_trait]
pub trait ServiceLookup: Send + Sync {
    async fn lookup_service(&self, service_id: &str) -> Result<Service>;
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: &str, token: &str) -> Result<ApiClient> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| RestoreError::Connectivity {
                endpoint: base_url.to_string(),
                reason: err.to_string(),
            })?;
        Ok(ApiClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn service_endpoint(&self, service_id: &str) -> String {
        format!("{}/services/{}", self.base_url, service_id)
    }
}

#[async_trait]
impl ServiceLookup for ApiClient {
    async fn lookup_service(&self, service_id: &str) -> Result<Service> {
        let endpoint = self.service_endpoint(service_id);
        let response = self
            .http
            .get(&endpoint)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|err| RestoreError::Connectivity {
                endpoint: endpoint.clone(),
                reason: err.to_string(),
            })?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(RestoreError::AuthenticationRequired)
            }
            StatusCode::NOT_FOUND => Err(RestoreError::ServiceNotFound(service_id.to_string())),
            status if !status.is_success() => Err(RestoreError::Connectivity {
                endpoint,
                reason: format!("unexpected HTTP status {status}"),
            }),
            _ => response
                .json::<Service>()
                .await
                .map_err(|err| RestoreError::Connectivity {
                    endpoint,
                    reason: format!("invalid response body: {err}"),
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_json_parses_with_optional_fields_absent() -> anyhow::Result<()> {
        let service: Service = serde_json::from_str(
            r#"{"id": "svc-1", "host": "db.example.test", "port": 5432}"#,
        )?;
        assert_eq!(service.id, "svc-1");
        assert_eq!(service.name, None);
        assert_eq!(service.host, "db.example.test");
        assert_eq!(service.port, 5432);
        assert!(!service.pooler_enabled);
        Ok(())
    }

    #[test]
    fn service_json_parses_fully_populated() -> anyhow::Result<()> {
        let service: Service = serde_json::from_str(
            r#"{
                "id": "svc-2",
                "name": "orders-prod",
                "host": "orders.example.test",
                "port": 26432,
                "pooler_enabled": true
            }"#,
        )?;
        assert_eq!(service.display_name(), "orders-prod");
        assert!(service.pooler_enabled);
        Ok(())
    }

    #[test]
    fn display_name_falls_back_to_the_id() {
        let service = Service {
            id: "svc-3".into(),
            name: None,
            host: "h".into(),
            port: 5432,
            pooler_enabled: false,
        };
        assert_eq!(service.display_name(), "svc-3");
    }

    #[test]
    fn endpoint_tolerates_trailing_slash_in_base_url() -> Result<()> {
        let client = ApiClient::new("https://api.example.test/v1/", "tok")?;
        assert_eq!(
            client.service_endpoint("svc-9"),
            "https://api.example.test/v1/services/svc-9"
        );
        Ok(())
    }
}
