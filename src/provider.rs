//! The Dynatrace provider: configuration resolution and per-type dispatch.

use crate::alerting_profiles;
use crate::client::{ConfigApi, ConfigClient};
use crate::error::ProviderError;
use crate::management_zones;
use crate::schema::{Attribute, Diagnostic, ProviderSchema, Schema};
use crate::server::ProviderService;
use crate::types::{AttributeChange, ImportedResource, PlanResult};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Resource type name for management zones.
pub const RESOURCE_MANAGEMENT_ZONES: &str = "dynatrace_management_zones";
/// Resource type name for alerting profiles.
pub const RESOURCE_ALERTING_PROFILES: &str = "dynatrace_alerting_profiles";
/// Data source type name for alerting profiles.
pub const DATA_SOURCE_ALERTING_PROFILES: &str = "dynatrace_alerting_profiles";

/// Environment variables consulted for the environment URL, in priority order.
const ENV_URL_VARS: [&str; 2] = ["DYNATRACE_ENV_URL", "DT_ENV_URL"];
/// Environment variables consulted for the API token, in priority order.
const API_TOKEN_VARS: [&str; 2] = ["DYNATRACE_API_TOKEN", "DT_API_TOKEN"];

/// The provider served to the plugin host.
///
/// After `configure` succeeds, one immutable API client is shared read-only by
/// every concurrent handler; there is no other shared state.
pub struct DynatraceProvider {
    api: RwLock<Option<Arc<dyn ConfigApi>>>,
}

impl DynatraceProvider {
    /// Create an unconfigured provider.
    pub fn new() -> Self {
        Self {
            api: RwLock::new(None),
        }
    }

    /// Create a provider with a pre-wired API adapter, bypassing `configure`.
    ///
    /// Used by tests to inject a stub adapter.
    pub fn with_api(api: Arc<dyn ConfigApi>) -> Self {
        Self {
            api: RwLock::new(Some(api)),
        }
    }

    async fn api(&self) -> Result<Arc<dyn ConfigApi>, ProviderError> {
        self.api.read().await.clone().ok_or_else(|| {
            ProviderError::Configuration("the provider has not been configured".to_string())
        })
    }
}

impl Default for DynatraceProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a provider setting from explicit configuration or, failing that,
/// from the given environment variables in priority order.
fn resolve_setting(config: &Value, key: &str, env_vars: &[&str]) -> Option<String> {
    if let Some(value) = config.get(key).and_then(Value::as_str) {
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }

    env_vars
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|value| !value.is_empty()))
}

/// Extract the resource identifier from a state tree.
pub(crate) fn state_id(state: &Value) -> Result<String, ProviderError> {
    state
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ProviderError::Internal("state is missing the resource id".to_string()))
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Top-level attribute diff between two state trees. The computed `id` never
/// participates; null and empty collections count as absent.
fn attribute_changes(before: &Value, after: &Value) -> Vec<AttributeChange> {
    let empty = serde_json::Map::new();
    let before_map = before.as_object().unwrap_or(&empty);
    let after_map = after.as_object().unwrap_or(&empty);

    let mut paths: BTreeSet<&str> = before_map
        .keys()
        .chain(after_map.keys())
        .map(String::as_str)
        .collect();
    paths.remove("id");

    let mut changes = Vec::new();
    for path in paths {
        let before_value = before_map.get(path).filter(|v| !is_empty_value(v));
        let after_value = after_map.get(path).filter(|v| !is_empty_value(v));
        match (before_value, after_value) {
            (None, Some(value)) => changes.push(AttributeChange::added(path, value.clone())),
            (Some(value), None) => changes.push(AttributeChange::removed(path, value.clone())),
            (Some(b), Some(a)) if b != a => {
                changes.push(AttributeChange::modified(path, b.clone(), a.clone()))
            },
            _ => {},
        }
    }
    changes
}

#[async_trait::async_trait]
impl ProviderService for DynatraceProvider {
    fn schema(&self) -> ProviderSchema {
        ProviderSchema::new()
            .with_provider_config(
                Schema::v0()
                    .with_attribute(
                        "dt_env_url",
                        Attribute::optional_string().with_description(
                            "The URL of the Dynatrace environment, e.g. \
                             https://<environment-id>.live.dynatrace.com. Falls back to \
                             DYNATRACE_ENV_URL, then DT_ENV_URL.",
                        ),
                    )
                    .with_attribute(
                        "dt_api_token",
                        Attribute::optional_string().sensitive().with_description(
                            "The API token used against the configuration API. Falls back to \
                             DYNATRACE_API_TOKEN, then DT_API_TOKEN.",
                        ),
                    ),
            )
            .with_resource(
                RESOURCE_ALERTING_PROFILES,
                alerting_profiles::resource_schema(),
            )
            .with_resource(
                RESOURCE_MANAGEMENT_ZONES,
                management_zones::resource_schema(),
            )
            .with_data_source(
                DATA_SOURCE_ALERTING_PROFILES,
                alerting_profiles::data_source_schema(),
            )
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let env_url = resolve_setting(&config, "dt_env_url", &ENV_URL_VARS);
        let api_token = resolve_setting(&config, "dt_api_token", &API_TOKEN_VARS);

        let (env_url, api_token) = match (env_url, api_token) {
            (Some(url), Some(token)) => (url, token),
            (url, _) => {
                let missing = if url.is_none() {
                    "dt_env_url"
                } else {
                    "dt_api_token"
                };
                return Ok(vec![Diagnostic::error(format!(
                    "Missing provider configuration: {}",
                    missing
                ))
                .with_detail(
                    "Set it in the provider block or via the DYNATRACE_ENV_URL / \
                     DYNATRACE_API_TOKEN environment variables (DT_ENV_URL / DT_API_TOKEN \
                     are accepted as fallbacks).",
                )
                .with_attribute(missing)]);
            },
        };

        match ConfigClient::new(&env_url, &api_token) {
            Ok(client) => {
                info!(base_url = %client.base_url(), "configured Dynatrace provider");
                *self.api.write().await = Some(Arc::new(client));
                Ok(vec![])
            },
            Err(err) => Ok(vec![
                Diagnostic::error("Invalid provider configuration").with_detail(err.to_string())
            ]),
        }
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        if !self.schema().resources.contains_key(resource_type) {
            return Err(ProviderError::UnknownResource(resource_type.to_string()));
        }

        match prior_state {
            None => {
                let changes = attribute_changes(&Value::Null, &proposed_state);
                Ok(PlanResult::with_changes(proposed_state, changes, false))
            },
            Some(prior) => {
                if proposed_state.is_null() {
                    // Destroy plan
                    let changes = attribute_changes(&prior, &Value::Null);
                    return Ok(PlanResult::with_changes(Value::Null, changes, false));
                }

                let changes = attribute_changes(&prior, &proposed_state);
                if changes.is_empty() {
                    Ok(PlanResult::no_change(prior))
                } else {
                    // Nothing about these resources forces replacement; carry
                    // the identity forward.
                    let mut planned = proposed_state;
                    if let (Some(id), Value::Object(map)) = (prior.get("id"), &mut planned) {
                        map.insert("id".to_string(), id.clone());
                    }
                    Ok(PlanResult::with_changes(planned, changes, false))
                }
            },
        }
    }

    async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let api = self.api().await?;
        match resource_type {
            RESOURCE_MANAGEMENT_ZONES => management_zones::create(api.as_ref(), planned_state).await,
            RESOURCE_ALERTING_PROFILES => {
                alerting_profiles::create(api.as_ref(), planned_state).await
            },
            _ => Err(ProviderError::UnknownResource(resource_type.to_string())),
        }
    }

    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        let api = self.api().await?;
        match resource_type {
            RESOURCE_MANAGEMENT_ZONES => management_zones::read(api.as_ref(), current_state).await,
            RESOURCE_ALERTING_PROFILES => {
                alerting_profiles::read(api.as_ref(), current_state).await
            },
            _ => Err(ProviderError::UnknownResource(resource_type.to_string())),
        }
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let api = self.api().await?;
        match resource_type {
            RESOURCE_MANAGEMENT_ZONES => {
                management_zones::update(api.as_ref(), prior_state, planned_state).await
            },
            RESOURCE_ALERTING_PROFILES => {
                alerting_profiles::update(api.as_ref(), prior_state, planned_state).await
            },
            _ => Err(ProviderError::UnknownResource(resource_type.to_string())),
        }
    }

    async fn delete(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<(), ProviderError> {
        let api = self.api().await?;
        match resource_type {
            RESOURCE_MANAGEMENT_ZONES => {
                management_zones::delete(api.as_ref(), current_state).await
            },
            RESOURCE_ALERTING_PROFILES => {
                alerting_profiles::delete(api.as_ref(), current_state).await
            },
            _ => Err(ProviderError::UnknownResource(resource_type.to_string())),
        }
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        match resource_type {
            RESOURCE_MANAGEMENT_ZONES => {
                let api = self.api().await?;
                let state = management_zones::import(api.as_ref(), id).await?;
                Ok(vec![ImportedResource::new(resource_type, state)])
            },
            _ => Err(ProviderError::Internal(format!(
                "Import not supported for resource type: {}",
                resource_type
            ))),
        }
    }

    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let api = self.api().await?;
        match data_source_type {
            DATA_SOURCE_ALERTING_PROFILES => {
                alerting_profiles::read_data_source(api.as_ref(), config).await
            },
            _ => Err(ProviderError::UnknownResource(data_source_type.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        assert_plan_has_changes, assert_plan_no_changes, ProviderTester, StubConfigApi,
    };
    use serde_json::json;

    fn tester_with_stub() -> (ProviderTester<DynatraceProvider>, Arc<StubConfigApi>) {
        let stub = Arc::new(StubConfigApi::new());
        let provider = DynatraceProvider::with_api(stub.clone());
        (ProviderTester::new(provider), stub)
    }

    #[test]
    fn test_schema_registers_all_types() {
        let provider = DynatraceProvider::new();
        let schema = provider.schema();
        assert!(schema.resources.contains_key(RESOURCE_MANAGEMENT_ZONES));
        assert!(schema.resources.contains_key(RESOURCE_ALERTING_PROFILES));
        assert!(schema
            .data_sources
            .contains_key(DATA_SOURCE_ALERTING_PROFILES));
        assert!(schema.provider.block.attributes["dt_api_token"].flags.sensitive);
    }

    #[test]
    fn test_resolve_setting_precedence() {
        // Explicit configuration wins over the environment
        std::env::set_var("DYNATRACE_ENV_URL", "https://from-specific.example.com");
        std::env::set_var("DT_ENV_URL", "https://from-fallback.example.com");

        let config = json!({"dt_env_url": "https://from-config.example.com"});
        assert_eq!(
            resolve_setting(&config, "dt_env_url", &ENV_URL_VARS).as_deref(),
            Some("https://from-config.example.com")
        );

        // Provider-specific variable wins over the generic fallback
        assert_eq!(
            resolve_setting(&json!({}), "dt_env_url", &ENV_URL_VARS).as_deref(),
            Some("https://from-specific.example.com")
        );

        std::env::remove_var("DYNATRACE_ENV_URL");
        assert_eq!(
            resolve_setting(&json!({}), "dt_env_url", &ENV_URL_VARS).as_deref(),
            Some("https://from-fallback.example.com")
        );

        std::env::remove_var("DT_ENV_URL");
        assert_eq!(resolve_setting(&json!({}), "dt_env_url", &ENV_URL_VARS), None);
    }

    #[tokio::test]
    async fn test_configure_reports_missing_settings() {
        let provider = DynatraceProvider::new();
        let diagnostics = provider
            .configure(json!({"dt_env_url": "https://abc.live.dynatrace.com"}))
            .await
            .unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("dt_api_token"));
    }

    #[tokio::test]
    async fn test_configure_with_explicit_settings() {
        let provider = DynatraceProvider::new();
        let diagnostics = provider
            .configure(json!({
                "dt_env_url": "https://abc.live.dynatrace.com",
                "dt_api_token": "dt0c01.sample"
            }))
            .await
            .unwrap();
        assert!(diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_provider_rejects_operations() {
        let provider = DynatraceProvider::new();
        let err = provider
            .read(RESOURCE_MANAGEMENT_ZONES, json!({"id": "mz-1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_unknown_resource_type() {
        let (tester, _stub) = tester_with_stub();
        let err = tester
            .create("dynatrace_dashboards", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn test_plan_create_has_changes() {
        let (tester, _stub) = tester_with_stub();
        let plan = tester
            .plan_create(RESOURCE_MANAGEMENT_ZONES, json!({"name": "zone-a"}))
            .await
            .unwrap();
        assert_plan_has_changes(&plan);
        assert!(!plan.requires_replace);
    }

    #[tokio::test]
    async fn test_plan_same_state_has_no_changes() {
        let (tester, _stub) = tester_with_stub();
        let state = json!({"id": "mz-1", "name": "zone-a", "rule": []});
        let plan = tester
            .plan_update(RESOURCE_MANAGEMENT_ZONES, state.clone(), state)
            .await
            .unwrap();
        assert_plan_no_changes(&plan);
    }

    #[tokio::test]
    async fn test_plan_treats_null_and_absent_alike() {
        let (tester, _stub) = tester_with_stub();
        let prior = json!({"id": "ap-1", "display_name": "ops", "mz_id": null, "rules": []});
        let proposed = json!({"display_name": "ops"});
        let plan = tester
            .plan_update(RESOURCE_ALERTING_PROFILES, prior, proposed)
            .await
            .unwrap();
        assert_plan_no_changes(&plan);
    }

    #[tokio::test]
    async fn test_plan_carries_id_forward() {
        let (tester, _stub) = tester_with_stub();
        let prior = json!({"id": "mz-1", "name": "zone-a"});
        let proposed = json!({"name": "zone-b"});
        let plan = tester
            .plan_update(RESOURCE_MANAGEMENT_ZONES, prior, proposed)
            .await
            .unwrap();
        assert_plan_has_changes(&plan);
        assert_eq!(plan.planned_state["id"], "mz-1");
    }

    #[tokio::test]
    async fn test_management_zone_lifecycle_through_provider() {
        let (tester, stub) = tester_with_stub();

        let state = tester
            .lifecycle_create(
                RESOURCE_MANAGEMENT_ZONES,
                json!({
                    "name": "zone-a",
                    "rule": [{
                        "type": "HOST",
                        "enabled": true,
                        "propagation_types": ["HOST_TO_SERVICE"],
                        "condition": [{
                            "key": [{"attribute": "HOST_TAGS"}],
                            "comparison_info": [{
                                "operator": "EQUALS",
                                "value": {"value": "prod"},
                                "negate": false,
                                "type": "STRING"
                            }]
                        }]
                    }]
                }),
            )
            .await
            .unwrap();

        let id = state["id"].as_str().unwrap().to_string();
        assert_eq!(state["rule"][0]["condition"][0]["key"][0]["attribute"], "HOST_TAGS");

        tester
            .delete(RESOURCE_MANAGEMENT_ZONES, state)
            .await
            .unwrap();
        assert!(stub.zone(&id).is_none());
    }

    #[tokio::test]
    async fn test_import_management_zone() {
        let (tester, stub) = tester_with_stub();
        stub.put_zone(
            "mz-9",
            crate::models::ManagementZone {
                id: None,
                name: "imported".to_string(),
                rules: vec![],
            },
        );

        let imported = tester
            .import_resource(RESOURCE_MANAGEMENT_ZONES, "mz-9")
            .await
            .unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].state["id"], "mz-9");
        assert_eq!(imported[0].state["name"], "imported");
    }

    #[tokio::test]
    async fn test_import_not_supported_for_alerting_profiles() {
        let (tester, _stub) = tester_with_stub();
        let err = tester
            .import_resource(RESOURCE_ALERTING_PROFILES, "ap-1")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Internal(_)));
    }
}
