//! The `dynatrace_management_zones` resource.
//!
//! Schema declaration, flatten/expand mapping between the host state tree and
//! the typed API structs, and the CRUD handlers wired up by
//! [`crate::provider::DynatraceProvider`].

use crate::client::ConfigApi;
use crate::error::ProviderError;
use crate::models::{ComparisonBasic, ConditionKey, EntityRuleEngineCondition, ManagementZone,
    ManagementZoneRule};
use crate::provider::state_id;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Block, NestedBlock, Schema};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Schema for the management zones resource.
pub(crate) fn resource_schema() -> Schema {
    Schema::v0()
        .with_attribute("id", Attribute::computed_string())
        .with_attribute(
            "name",
            Attribute::required_string().with_description("The name of the management zone."),
        )
        .with_block(
            "rule",
            NestedBlock::list(
                Block::new()
                    .with_description(
                        "A list of rules for management zone usage. Each rule is evaluated \
                         independently of all other rules.",
                    )
                    .with_attribute(
                        "type",
                        Attribute::required_string().with_description(
                            "The type of Dynatrace entities the management zone can be applied to.",
                        ),
                    )
                    .with_attribute(
                        "enabled",
                        Attribute::required_bool().with_description(
                            "The rule is enabled (true) or disabled (false).",
                        ),
                    )
                    .with_attribute(
                        "propagation_types",
                        Attribute::new(
                            AttributeType::set(AttributeType::String),
                            AttributeFlags::optional(),
                        )
                        .with_description(
                            "How to apply the management zone to underlying entities.",
                        ),
                    )
                    .with_block(
                        "condition",
                        NestedBlock::list(
                            Block::new()
                                .with_description(
                                    "A list of matching rules for the management zone. The \
                                     management zone applies only if all conditions are fulfilled.",
                                )
                                .with_block(
                                    "key",
                                    NestedBlock::list(
                                        Block::new()
                                            .with_description(
                                                "The key to identify the data we're matching.",
                                            )
                                            .with_attribute(
                                                "attribute",
                                                Attribute::required_string().with_description(
                                                    "The attribute to be used for comparison.",
                                                ),
                                            )
                                            .with_attribute(
                                                "type",
                                                Attribute::optional_string().with_description(
                                                    "Defines the actual set of fields depending \
                                                     on the value.",
                                                ),
                                            ),
                                    )
                                    .with_min_items(1)
                                    .with_max_items(1),
                                )
                                .with_block(
                                    "comparison_info",
                                    NestedBlock::list(
                                        Block::new()
                                            .with_description(
                                                "Defines how the matching is actually performed: \
                                                 what and how are we comparing.",
                                            )
                                            .with_attribute(
                                                "operator",
                                                Attribute::required_string().with_description(
                                                    "Operator of the comparison. You can reverse \
                                                     it by setting negate to true.",
                                                ),
                                            )
                                            .with_attribute(
                                                "value",
                                                Attribute::new(
                                                    AttributeType::map(AttributeType::String),
                                                    AttributeFlags::optional(),
                                                )
                                                .with_description("The value to compare to."),
                                            )
                                            .with_attribute(
                                                "negate",
                                                Attribute::required_bool().with_description(
                                                    "Reverses the comparison operator. For \
                                                     example it turns the begins with into does \
                                                     not begin with.",
                                                ),
                                            )
                                            .with_attribute(
                                                "type",
                                                Attribute::required_string().with_description(
                                                    "Defines the actual set of fields depending \
                                                     on the value.",
                                                ),
                                            ),
                                    )
                                    .with_min_items(1)
                                    .with_max_items(1),
                                ),
                        ),
                    ),
            ),
        )
}

// ---------------------------------------------------------------------------
// Mapping layer
// ---------------------------------------------------------------------------

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn optional_string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn bool_field(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or_default()
}

/// Expand a state tree into the typed zone. The computed `id` is dropped and
/// never sent upstream.
fn expand_zone(state: &Value) -> ManagementZone {
    ManagementZone {
        id: None,
        name: string_field(state, "name"),
        rules: expand_rules(state.get("rule")),
    }
}

fn expand_rules(value: Option<&Value>) -> Vec<ManagementZoneRule> {
    let Some(Value::Array(rules)) = value else {
        return Vec::new();
    };

    rules
        .iter()
        .map(|rule| ManagementZoneRule {
            rule_type: string_field(rule, "type"),
            enabled: bool_field(rule, "enabled"),
            propagation_types: expand_propagation_types(rule.get("propagation_types")),
            conditions: expand_conditions(rule.get("condition")),
        })
        .collect()
}

/// Set semantics: duplicates collapse and input order is irrelevant.
fn expand_propagation_types(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };

    let set: BTreeSet<String> = items
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();
    set.into_iter().collect()
}

fn expand_conditions(value: Option<&Value>) -> Vec<EntityRuleEngineCondition> {
    let Some(Value::Array(conditions)) = value else {
        return Vec::new();
    };

    conditions
        .iter()
        .map(|condition| EntityRuleEngineCondition {
            key: expand_condition_key(condition.get("key")),
            comparison_info: expand_comparison_info(condition.get("comparison_info")),
        })
        .collect()
}

/// Singleton block: only the first element counts; a missing or null element
/// expands to the zero value.
fn expand_condition_key(value: Option<&Value>) -> ConditionKey {
    let Some(first) = value.and_then(|v| v.get(0)).filter(|v| !v.is_null()) else {
        return ConditionKey::default();
    };

    ConditionKey {
        attribute: string_field(first, "attribute"),
        key_type: optional_string_field(first, "type"),
    }
}

fn expand_comparison_info(value: Option<&Value>) -> ComparisonBasic {
    let Some(first) = value.and_then(|v| v.get(0)).filter(|v| !v.is_null()) else {
        return ComparisonBasic::default();
    };

    let comparison_values = first
        .get("value")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();

    ComparisonBasic {
        operator: string_field(first, "operator"),
        value: comparison_values,
        negate: bool_field(first, "negate"),
        comparison_type: string_field(first, "type"),
    }
}

/// Flatten a typed zone into the state tree under the given identity.
fn flatten_zone(id: &str, zone: &ManagementZone) -> Value {
    json!({
        "id": id,
        "name": zone.name,
        "rule": flatten_rules(&zone.rules),
    })
}

fn flatten_rules(rules: &[ManagementZoneRule]) -> Value {
    Value::Array(
        rules
            .iter()
            .map(|rule| {
                json!({
                    "type": rule.rule_type,
                    "enabled": rule.enabled,
                    "propagation_types": rule.propagation_types,
                    "condition": flatten_conditions(&rule.conditions),
                })
            })
            .collect(),
    )
}

fn flatten_conditions(conditions: &[EntityRuleEngineCondition]) -> Value {
    Value::Array(
        conditions
            .iter()
            .map(|condition| {
                json!({
                    "key": [flatten_condition_key(&condition.key)],
                    "comparison_info": [flatten_comparison_info(&condition.comparison_info)],
                })
            })
            .collect(),
    )
}

fn flatten_condition_key(key: &ConditionKey) -> Value {
    json!({
        "attribute": key.attribute,
        "type": key.key_type,
    })
}

fn flatten_comparison_info(comparison: &ComparisonBasic) -> Value {
    json!({
        "operator": comparison.operator,
        "value": comparison.value,
        "negate": comparison.negate,
        "type": comparison.comparison_type,
    })
}

// ---------------------------------------------------------------------------
// CRUD handlers
// ---------------------------------------------------------------------------

pub(crate) async fn create(
    api: &dyn ConfigApi,
    planned_state: Value,
) -> Result<Value, ProviderError> {
    let zone = expand_zone(&planned_state);
    let created = api.create_management_zone(&zone).await?;
    info!(id = %created.id, name = %zone.name, "created management zone");

    let zone = api.get_management_zone(&created.id).await?;
    Ok(flatten_zone(&created.id, &zone))
}

pub(crate) async fn read(
    api: &dyn ConfigApi,
    current_state: Value,
) -> Result<Value, ProviderError> {
    let id = state_id(&current_state)?;
    match api.get_management_zone(&id).await {
        Ok(zone) => Ok(flatten_zone(&id, &zone)),
        Err(err) if err.is_not_found() => {
            warn!(id = %id, "management zone no longer exists remotely");
            Ok(Value::Null)
        },
        Err(err) => Err(err.into()),
    }
}

pub(crate) async fn update(
    api: &dyn ConfigApi,
    prior_state: Value,
    planned_state: Value,
) -> Result<Value, ProviderError> {
    let id = state_id(&prior_state)?;
    let prior = expand_zone(&prior_state);
    let planned = expand_zone(&planned_state);

    if prior == planned {
        debug!(id = %id, "management zone unchanged, skipping update");
        return Ok(prior_state);
    }

    api.update_management_zone(&id, &planned).await?;
    info!(id = %id, "updated management zone");

    let zone = api.get_management_zone(&id).await?;
    Ok(flatten_zone(&id, &zone))
}

pub(crate) async fn delete(
    api: &dyn ConfigApi,
    current_state: Value,
) -> Result<(), ProviderError> {
    let id = state_id(&current_state)?;
    api.delete_management_zone(&id).await?;
    info!(id = %id, "deleted management zone");
    Ok(())
}

pub(crate) async fn import(api: &dyn ConfigApi, id: &str) -> Result<Value, ProviderError> {
    let zone = api.get_management_zone(id).await?;
    Ok(flatten_zone(id, &zone))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubConfigApi;
    use serde_json::json;

    fn sample_zone() -> ManagementZone {
        ManagementZone {
            id: None,
            name: "zone-a".to_string(),
            rules: vec![ManagementZoneRule {
                rule_type: "HOST".to_string(),
                enabled: true,
                propagation_types: vec!["HOST_TO_SERVICE".to_string()],
                conditions: vec![EntityRuleEngineCondition {
                    key: ConditionKey {
                        attribute: "HOST_TAGS".to_string(),
                        key_type: None,
                    },
                    comparison_info: ComparisonBasic {
                        operator: "EQUALS".to_string(),
                        value: [("value".to_string(), "prod".to_string())].into(),
                        negate: false,
                        comparison_type: "STRING".to_string(),
                    },
                }],
            }],
        }
    }

    #[test]
    fn test_expand_flatten_round_trip() {
        let zone = sample_zone();
        let state = flatten_zone("mz-1", &zone);
        assert_eq!(expand_zone(&state), zone);
    }

    #[test]
    fn test_expand_drops_computed_id() {
        let state = flatten_zone("mz-1", &sample_zone());
        assert_eq!(state["id"], "mz-1");
        assert_eq!(expand_zone(&state).id, None);
    }

    #[test]
    fn test_flatten_empty_rules_is_empty_list() {
        let zone = ManagementZone {
            id: None,
            name: "empty".to_string(),
            rules: vec![],
        };
        assert_eq!(flatten_zone("mz-2", &zone)["rule"], json!([]));
    }

    #[test]
    fn test_expand_missing_rule_list() {
        let zone = expand_zone(&json!({"name": "bare"}));
        assert_eq!(zone.name, "bare");
        assert!(zone.rules.is_empty());
    }

    #[test]
    fn test_propagation_types_have_set_semantics() {
        let expanded = expand_propagation_types(Some(&json!([
            "HOST_TO_SERVICE",
            "HOST_TO_PROCESS_GROUP_INSTANCE",
            "HOST_TO_SERVICE"
        ])));
        assert_eq!(
            expanded,
            vec![
                "HOST_TO_PROCESS_GROUP_INSTANCE".to_string(),
                "HOST_TO_SERVICE".to_string()
            ]
        );

        // Input order is irrelevant
        let reordered = expand_propagation_types(Some(&json!([
            "HOST_TO_PROCESS_GROUP_INSTANCE",
            "HOST_TO_SERVICE"
        ])));
        assert_eq!(expanded, reordered);
    }

    #[test]
    fn test_expand_singleton_defaults() {
        assert_eq!(expand_condition_key(None), ConditionKey::default());
        assert_eq!(expand_condition_key(Some(&json!([]))), ConditionKey::default());
        assert_eq!(
            expand_condition_key(Some(&json!([null]))),
            ConditionKey::default()
        );
        assert_eq!(expand_comparison_info(None), ComparisonBasic::default());
    }

    #[test]
    fn test_resource_schema_shape() {
        let schema = resource_schema();
        assert!(schema.block.attributes["id"].flags.computed);
        assert!(schema.block.attributes["name"].flags.required);
        let rule = &schema.block.blocks["rule"];
        assert!(rule.block.blocks.contains_key("condition"));
        let condition = &rule.block.blocks["condition"];
        assert_eq!(condition.block.blocks["key"].max_items, 1);
        assert_eq!(condition.block.blocks["comparison_info"].max_items, 1);
    }

    #[tokio::test]
    async fn test_create_reads_back_and_sets_id() {
        let api = StubConfigApi::new();
        let state = create(
            &api,
            json!({
                "name": "zone-a",
                "rule": [{
                    "type": "HOST",
                    "enabled": true,
                    "propagation_types": ["HOST_TO_SERVICE", "HOST_TO_SERVICE"],
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

        assert!(state["id"].as_str().unwrap().starts_with("mz-"));
        assert_eq!(state["rule"][0]["condition"][0]["key"][0]["attribute"], "HOST_TAGS");
        assert_eq!(
            state["rule"][0]["propagation_types"],
            json!(["HOST_TO_SERVICE"])
        );
        assert_eq!(
            api.calls(),
            vec!["create_management_zone", "get_management_zone"]
        );
    }

    #[tokio::test]
    async fn test_create_failure_produces_no_state() {
        let api = StubConfigApi::new();
        api.fail_all();
        let err = create(&api, json!({"name": "zone-a"})).await.unwrap_err();
        assert!(matches!(err, ProviderError::Api(_)));
        assert_eq!(api.calls(), vec!["create_management_zone"]);
    }

    #[tokio::test]
    async fn test_read_not_found_returns_null_state() {
        let api = StubConfigApi::new();
        let state = read(&api, json!({"id": "mz-missing", "name": "gone"}))
            .await
            .unwrap();
        assert!(state.is_null());
    }

    #[tokio::test]
    async fn test_update_noop_makes_no_network_calls() {
        let api = StubConfigApi::new();
        api.put_zone("mz-1", sample_zone());
        let prior = flatten_zone("mz-1", &sample_zone());

        let state = update(&api, prior.clone(), prior.clone()).await.unwrap();
        assert_eq!(state, prior);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_sends_one_replace_then_reads() {
        let api = StubConfigApi::new();
        api.put_zone("mz-1", sample_zone());
        let prior = flatten_zone("mz-1", &sample_zone());
        let mut planned = prior.clone();
        planned["name"] = json!("zone-b");

        let state = update(&api, prior, planned).await.unwrap();
        assert_eq!(state["name"], "zone-b");
        assert_eq!(
            api.calls(),
            vec!["update_management_zone", "get_management_zone"]
        );
    }

    #[tokio::test]
    async fn test_delete_failure_keeps_state() {
        let api = StubConfigApi::new();
        api.put_zone("mz-1", sample_zone());
        api.fail_all();
        let err = delete(&api, json!({"id": "mz-1"})).await.unwrap_err();
        assert!(matches!(err, ProviderError::Api(_)));

        api.succeed_all();
        delete(&api, json!({"id": "mz-1"})).await.unwrap();
        assert!(api.zone("mz-1").is_none());
    }

    #[tokio::test]
    async fn test_import_by_identifier() {
        let api = StubConfigApi::new();
        api.put_zone("mz-7", sample_zone());
        let state = import(&api, "mz-7").await.unwrap();
        assert_eq!(state["id"], "mz-7");
        assert_eq!(state["name"], "zone-a");
    }
}
