//! Dynatrace configuration API client.
//!
//! One [`ConfigClient`] is built at provider configuration time and shared,
//! immutable, by every concurrent handler. The [`ConfigApi`] trait is the seam
//! between CRUD handlers and the wire so handlers can be exercised against a
//! stub (see [`crate::testing::StubConfigApi`]).

use crate::error::{ApiError, ProviderError};
use crate::models::{AlertingProfile, EntityShortRepresentation, ManagementZone};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

/// Path of the configuration API, appended to the environment URL.
pub const CONFIG_API_PATH: &str = "/api/config/v1";

/// Per-entity CRUD calls against the Dynatrace configuration API.
///
/// Every method is a single synchronous round trip; there is no retry,
/// batching, or timeout logic here. Cancellation and timeouts belong to the
/// transport and the host.
#[async_trait]
pub trait ConfigApi: Send + Sync {
    /// Fetch a management zone by identifier.
    async fn get_management_zone(&self, id: &str) -> Result<ManagementZone, ApiError>;

    /// Create a management zone, returning the API-assigned identity.
    async fn create_management_zone(
        &self,
        zone: &ManagementZone,
    ) -> Result<EntityShortRepresentation, ApiError>;

    /// Replace a management zone configuration in full.
    async fn update_management_zone(&self, id: &str, zone: &ManagementZone)
        -> Result<(), ApiError>;

    /// Delete a management zone by identifier.
    async fn delete_management_zone(&self, id: &str) -> Result<(), ApiError>;

    /// Fetch an alerting profile by identifier.
    async fn get_alerting_profile(&self, id: &str) -> Result<AlertingProfile, ApiError>;

    /// Create an alerting profile, returning the API-assigned identity.
    async fn create_alerting_profile(
        &self,
        profile: &AlertingProfile,
    ) -> Result<EntityShortRepresentation, ApiError>;

    /// Replace an alerting profile configuration in full.
    async fn update_alerting_profile(
        &self,
        id: &str,
        profile: &AlertingProfile,
    ) -> Result<(), ApiError>;

    /// Delete an alerting profile by identifier.
    async fn delete_alerting_profile(&self, id: &str) -> Result<(), ApiError>;
}

/// HTTP client for the Dynatrace configuration API v1.
#[derive(Clone)]
pub struct ConfigClient {
    client: reqwest::Client,
    base_url: String,
}

impl ConfigClient {
    /// Creates a new client for the given environment.
    ///
    /// The API token is sent as an `Authorization: Api-Token <token>` header on
    /// every request and is marked sensitive so it never shows up in logs.
    pub fn new(environment_url: &str, api_token: &str) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut auth = HeaderValue::from_str(&format!("Api-Token {}", api_token))
            .map_err(|_| {
                ProviderError::Configuration(
                    "API token contains characters not valid in a header".to_string(),
                )
            })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|err| {
                ProviderError::Configuration(format!("failed to build HTTP client: {}", err))
            })?;

        Ok(Self {
            client,
            base_url: format!("{}{}", environment_url.trim_end_matches('/'), CONFIG_API_PATH),
        })
    }

    /// The resolved base URL, environment URL plus the config API path.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, ApiError> {
        debug!(url = %url, "GET");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| ApiError::Http {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        let body = response.text().await.map_err(|source| ApiError::Http {
            url: url.clone(),
            source,
        })?;
        if !status.is_success() {
            warn!(%status, url = %url, body = %body, "Dynatrace API call failed");
            return Err(ApiError::Status { status, url, body });
        }
        serde_json::from_str(&body).map_err(|source| ApiError::Decode { url, source })
    }

    async fn post_json<B, T>(&self, url: String, payload: &B) -> Result<T, ApiError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        debug!(url = %url, "POST");
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|source| ApiError::Http {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        let body = response.text().await.map_err(|source| ApiError::Http {
            url: url.clone(),
            source,
        })?;
        if !status.is_success() {
            warn!(%status, url = %url, body = %body, "Dynatrace API call failed");
            return Err(ApiError::Status { status, url, body });
        }
        serde_json::from_str(&body).map_err(|source| ApiError::Decode { url, source })
    }

    async fn put_json<B>(&self, url: String, payload: &B) -> Result<(), ApiError>
    where
        B: Serialize + Sync,
    {
        debug!(url = %url, "PUT");
        let response = self
            .client
            .put(&url)
            .json(payload)
            .send()
            .await
            .map_err(|source| ApiError::Http {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, url = %url, body = %body, "Dynatrace API call failed");
            return Err(ApiError::Status { status, url, body });
        }
        Ok(())
    }

    async fn delete(&self, url: String) -> Result<(), ApiError> {
        debug!(url = %url, "DELETE");
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|source| ApiError::Http {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, url = %url, body = %body, "Dynatrace API call failed");
            return Err(ApiError::Status { status, url, body });
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigApi for ConfigClient {
    async fn get_management_zone(&self, id: &str) -> Result<ManagementZone, ApiError> {
        self.get_json(format!("{}/managementZones/{}", self.base_url, id))
            .await
    }

    async fn create_management_zone(
        &self,
        zone: &ManagementZone,
    ) -> Result<EntityShortRepresentation, ApiError> {
        self.post_json(format!("{}/managementZones", self.base_url), zone)
            .await
    }

    async fn update_management_zone(
        &self,
        id: &str,
        zone: &ManagementZone,
    ) -> Result<(), ApiError> {
        self.put_json(format!("{}/managementZones/{}", self.base_url, id), zone)
            .await
    }

    async fn delete_management_zone(&self, id: &str) -> Result<(), ApiError> {
        self.delete(format!("{}/managementZones/{}", self.base_url, id))
            .await
    }

    async fn get_alerting_profile(&self, id: &str) -> Result<AlertingProfile, ApiError> {
        self.get_json(format!("{}/alertingProfiles/{}", self.base_url, id))
            .await
    }

    async fn create_alerting_profile(
        &self,
        profile: &AlertingProfile,
    ) -> Result<EntityShortRepresentation, ApiError> {
        self.post_json(format!("{}/alertingProfiles", self.base_url), profile)
            .await
    }

    async fn update_alerting_profile(
        &self,
        id: &str,
        profile: &AlertingProfile,
    ) -> Result<(), ApiError> {
        self.put_json(format!("{}/alertingProfiles/{}", self.base_url, id), profile)
            .await
    }

    async fn delete_alerting_profile(&self, id: &str) -> Result<(), ApiError> {
        self.delete(format!("{}/alertingProfiles/{}", self.base_url, id))
            .await
    }
}

impl core::fmt::Debug for ConfigClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConfigClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_joins_config_path() {
        let client = ConfigClient::new("https://abc123.live.dynatrace.com", "token").unwrap();
        assert_eq!(
            client.base_url(),
            "https://abc123.live.dynatrace.com/api/config/v1"
        );

        // Trailing slash collapses
        let client = ConfigClient::new("https://abc123.live.dynatrace.com/", "token").unwrap();
        assert_eq!(
            client.base_url(),
            "https://abc123.live.dynatrace.com/api/config/v1"
        );
    }

    #[test]
    fn test_invalid_token_rejected_at_construction() {
        let err = ConfigClient::new("https://abc123.live.dynatrace.com", "tok\nen").unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn test_debug_does_not_leak_token() {
        let client = ConfigClient::new("https://abc123.live.dynatrace.com", "secret-token").unwrap();
        let rendered = format!("{:?}", client);
        assert!(!rendered.contains("secret-token"));
    }
}
