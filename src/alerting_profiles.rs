//! The `dynatrace_alerting_profiles` resource and data source.
//!
//! Both share one mapping layer; the data source is a read-only lookup by
//! identifier with every attribute computed.

use crate::client::ConfigApi;
use crate::error::ProviderError;
use crate::models::{AlertingCustomEventFilter, AlertingCustomTextFilter, AlertingEventTypeFilter,
    AlertingPredefinedEventFilter, AlertingProfile, AlertingProfileSeverityRule,
    AlertingProfileTagFilter, TagFilter};
use crate::provider::state_id;
use crate::schema::{Attribute, Block, NestedBlock, Schema};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// Resource schemas cap "optional object" blocks at one element; data source
/// schemas leave computed output uncapped.
fn capped(nested: NestedBlock, computed: bool) -> NestedBlock {
    if computed {
        nested
    } else {
        nested.with_max_items(1)
    }
}

fn custom_text_filter_block(computed: bool) -> Block {
    let (bool_attr, string_attr): (fn() -> Attribute, fn() -> Attribute) = if computed {
        (Attribute::computed_bool, Attribute::computed_string)
    } else {
        (Attribute::required_bool, Attribute::required_string)
    };

    Block::new()
        .with_attribute("enabled", bool_attr())
        .with_attribute("value", string_attr())
        .with_attribute("operator", string_attr())
        .with_attribute("negate", bool_attr())
        .with_attribute("case_insensitive", bool_attr())
}

fn severity_rules_block(computed: bool) -> Block {
    let (string_attr, int_attr): (fn() -> Attribute, fn() -> Attribute) = if computed {
        (Attribute::computed_string, Attribute::computed_int64)
    } else {
        (Attribute::required_string, Attribute::required_int64)
    };

    let tag_filter_group = Block::new()
        .with_attribute("include_mode", string_attr())
        .with_block(
            "tag_filter",
            NestedBlock::list(
                Block::new()
                    .with_attribute("context", string_attr())
                    .with_attribute("key", string_attr())
                    .with_attribute(
                        "value",
                        if computed {
                            Attribute::computed_string()
                        } else {
                            Attribute::optional_string()
                        },
                    ),
            ),
        );

    Block::new()
        .with_attribute("severity_level", string_attr())
        .with_attribute("delay_in_minutes", int_attr())
        .with_block(
            "tag_filters",
            capped(NestedBlock::list(tag_filter_group), computed),
        )
}

fn event_type_filters_block(computed: bool) -> Block {
    let (bool_attr, string_attr): (fn() -> Attribute, fn() -> Attribute) = if computed {
        (Attribute::computed_bool, Attribute::computed_string)
    } else {
        (Attribute::required_bool, Attribute::required_string)
    };

    let predefined = Block::new()
        .with_attribute("event_type", string_attr())
        .with_attribute("negate", bool_attr());

    let custom = Block::new()
        .with_block(
            "custom_title_filter",
            capped(
                NestedBlock::list(custom_text_filter_block(computed)),
                computed,
            ),
        )
        .with_block(
            "custom_description_filter",
            capped(
                NestedBlock::list(custom_text_filter_block(computed)),
                computed,
            ),
        );

    Block::new()
        .with_block(
            "predefined_event_filter",
            capped(NestedBlock::list(predefined), computed),
        )
        .with_block(
            "custom_event_filter",
            capped(NestedBlock::list(custom), computed),
        )
}

/// Schema for the alerting profiles resource.
pub(crate) fn resource_schema() -> Schema {
    Schema::v0()
        .with_attribute("id", Attribute::computed_string())
        .with_attribute(
            "display_name",
            Attribute::required_string().with_description("The name of the alerting profile."),
        )
        .with_attribute(
            "mz_id",
            Attribute::optional_string().with_description(
                "The ID of the management zone to which the alerting profile applies.",
            ),
        )
        .with_block("rules", NestedBlock::list(severity_rules_block(false)))
        .with_block(
            "event_type_filters",
            NestedBlock::list(event_type_filters_block(false)),
        )
}

/// Schema for the alerting profiles data source: lookup by id, everything
/// else computed.
pub(crate) fn data_source_schema() -> Schema {
    Schema::v0()
        .with_attribute("id", Attribute::required_string())
        .with_attribute("display_name", Attribute::computed_string())
        .with_attribute("mz_id", Attribute::computed_string())
        .with_block("rules", NestedBlock::list(severity_rules_block(true)))
        .with_block(
            "event_type_filters",
            NestedBlock::list(event_type_filters_block(true)),
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

fn first_element<'a>(value: Option<&'a Value>) -> Option<&'a Value> {
    value.and_then(|v| v.get(0)).filter(|v| !v.is_null())
}

/// Expand a state tree into the typed profile. The computed `id` is dropped
/// and never sent upstream.
fn expand_profile(state: &Value) -> AlertingProfile {
    AlertingProfile {
        id: None,
        display_name: string_field(state, "display_name"),
        mz_id: optional_string_field(state, "mz_id"),
        rules: expand_severity_rules(state.get("rules")),
        event_type_filters: expand_event_type_filters(state.get("event_type_filters")),
    }
}

fn expand_severity_rules(value: Option<&Value>) -> Vec<AlertingProfileSeverityRule> {
    let Some(Value::Array(rules)) = value else {
        return Vec::new();
    };

    rules
        .iter()
        .map(|rule| AlertingProfileSeverityRule {
            severity_level: string_field(rule, "severity_level"),
            tag_filter: expand_tag_filter_group(rule.get("tag_filters")),
            delay_in_minutes: rule
                .get("delay_in_minutes")
                .and_then(Value::as_i64)
                .unwrap_or_default(),
        })
        .collect()
}

fn expand_tag_filter_group(value: Option<&Value>) -> Option<AlertingProfileTagFilter> {
    let first = first_element(value)?;
    Some(AlertingProfileTagFilter {
        include_mode: string_field(first, "include_mode"),
        tag_filters: expand_tag_filters(first.get("tag_filter")),
    })
}

fn expand_tag_filters(value: Option<&Value>) -> Vec<TagFilter> {
    let Some(Value::Array(filters)) = value else {
        return Vec::new();
    };

    filters
        .iter()
        .map(|filter| TagFilter {
            context: string_field(filter, "context"),
            key: string_field(filter, "key"),
            value: optional_string_field(filter, "value"),
        })
        .collect()
}

fn expand_event_type_filters(value: Option<&Value>) -> Vec<AlertingEventTypeFilter> {
    let Some(Value::Array(filters)) = value else {
        return Vec::new();
    };

    filters
        .iter()
        .map(|filter| AlertingEventTypeFilter {
            predefined_event_filter: expand_predefined_filter(
                filter.get("predefined_event_filter"),
            ),
            custom_event_filter: expand_custom_filter(filter.get("custom_event_filter")),
        })
        .collect()
}

fn expand_predefined_filter(value: Option<&Value>) -> Option<AlertingPredefinedEventFilter> {
    let first = first_element(value)?;
    Some(AlertingPredefinedEventFilter {
        event_type: string_field(first, "event_type"),
        negate: bool_field(first, "negate"),
    })
}

fn expand_custom_filter(value: Option<&Value>) -> Option<AlertingCustomEventFilter> {
    let first = first_element(value)?;
    Some(AlertingCustomEventFilter {
        custom_title_filter: expand_custom_text_filter(first.get("custom_title_filter")),
        custom_description_filter: expand_custom_text_filter(
            first.get("custom_description_filter"),
        ),
    })
}

fn expand_custom_text_filter(value: Option<&Value>) -> Option<AlertingCustomTextFilter> {
    let first = first_element(value)?;
    Some(AlertingCustomTextFilter {
        enabled: bool_field(first, "enabled"),
        value: string_field(first, "value"),
        operator: string_field(first, "operator"),
        negate: bool_field(first, "negate"),
        case_insensitive: bool_field(first, "case_insensitive"),
    })
}

/// Flatten a typed profile into the state tree under the given identity.
///
/// Absent optional nested records flatten to empty sequences, the same
/// convention as absent collections.
fn flatten_profile(id: &str, profile: &AlertingProfile) -> Value {
    json!({
        "id": id,
        "display_name": profile.display_name,
        "mz_id": profile.mz_id,
        "rules": flatten_severity_rules(&profile.rules),
        "event_type_filters": flatten_event_type_filters(&profile.event_type_filters),
    })
}

fn flatten_severity_rules(rules: &[AlertingProfileSeverityRule]) -> Value {
    Value::Array(
        rules
            .iter()
            .map(|rule| {
                json!({
                    "severity_level": rule.severity_level,
                    "delay_in_minutes": rule.delay_in_minutes,
                    "tag_filters": flatten_tag_filter_group(rule.tag_filter.as_ref()),
                })
            })
            .collect(),
    )
}

fn flatten_tag_filter_group(group: Option<&AlertingProfileTagFilter>) -> Value {
    let Some(group) = group else {
        return json!([]);
    };

    json!([{
        "include_mode": group.include_mode,
        "tag_filter": flatten_tag_filters(&group.tag_filters),
    }])
}

fn flatten_tag_filters(filters: &[TagFilter]) -> Value {
    Value::Array(
        filters
            .iter()
            .map(|filter| {
                json!({
                    "context": filter.context,
                    "key": filter.key,
                    "value": filter.value,
                })
            })
            .collect(),
    )
}

fn flatten_event_type_filters(filters: &[AlertingEventTypeFilter]) -> Value {
    Value::Array(
        filters
            .iter()
            .map(|filter| {
                json!({
                    "predefined_event_filter":
                        flatten_predefined_filter(filter.predefined_event_filter.as_ref()),
                    "custom_event_filter":
                        flatten_custom_filter(filter.custom_event_filter.as_ref()),
                })
            })
            .collect(),
    )
}

fn flatten_predefined_filter(filter: Option<&AlertingPredefinedEventFilter>) -> Value {
    let Some(filter) = filter else {
        return json!([]);
    };

    json!([{
        "event_type": filter.event_type,
        "negate": filter.negate,
    }])
}

fn flatten_custom_filter(filter: Option<&AlertingCustomEventFilter>) -> Value {
    let Some(filter) = filter else {
        return json!([]);
    };

    json!([{
        "custom_title_filter": flatten_custom_text_filter(filter.custom_title_filter.as_ref()),
        "custom_description_filter":
            flatten_custom_text_filter(filter.custom_description_filter.as_ref()),
    }])
}

fn flatten_custom_text_filter(filter: Option<&AlertingCustomTextFilter>) -> Value {
    let Some(filter) = filter else {
        return json!([]);
    };

    json!([{
        "enabled": filter.enabled,
        "value": filter.value,
        "operator": filter.operator,
        "negate": filter.negate,
        "case_insensitive": filter.case_insensitive,
    }])
}

// ---------------------------------------------------------------------------
// CRUD handlers and data source read
// ---------------------------------------------------------------------------

pub(crate) async fn create(
    api: &dyn ConfigApi,
    planned_state: Value,
) -> Result<Value, ProviderError> {
    let profile = expand_profile(&planned_state);
    let created = api.create_alerting_profile(&profile).await?;
    info!(id = %created.id, display_name = %profile.display_name, "created alerting profile");

    let profile = api.get_alerting_profile(&created.id).await?;
    Ok(flatten_profile(&created.id, &profile))
}

pub(crate) async fn read(
    api: &dyn ConfigApi,
    current_state: Value,
) -> Result<Value, ProviderError> {
    let id = state_id(&current_state)?;
    match api.get_alerting_profile(&id).await {
        Ok(profile) => Ok(flatten_profile(&id, &profile)),
        Err(err) if err.is_not_found() => {
            warn!(id = %id, "alerting profile no longer exists remotely");
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
    let prior = expand_profile(&prior_state);
    let planned = expand_profile(&planned_state);

    if prior == planned {
        debug!(id = %id, "alerting profile unchanged, skipping update");
        return Ok(prior_state);
    }

    api.update_alerting_profile(&id, &planned).await?;
    info!(id = %id, "updated alerting profile");

    let profile = api.get_alerting_profile(&id).await?;
    Ok(flatten_profile(&id, &profile))
}

pub(crate) async fn delete(
    api: &dyn ConfigApi,
    current_state: Value,
) -> Result<(), ProviderError> {
    let id = state_id(&current_state)?;
    api.delete_alerting_profile(&id).await?;
    info!(id = %id, "deleted alerting profile");
    Ok(())
}

/// Read-only lookup by identifier. Unlike the resource read, a remote 404 is
/// an error here: a lookup that misses is a configuration mistake.
pub(crate) async fn read_data_source(
    api: &dyn ConfigApi,
    config: Value,
) -> Result<Value, ProviderError> {
    let id = config
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            ProviderError::Validation("the alerting profile data source requires an id".to_string())
        })?;

    let profile = api.get_alerting_profile(id).await?;
    Ok(flatten_profile(id, &profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubConfigApi;
    use serde_json::json;

    fn sample_profile() -> AlertingProfile {
        AlertingProfile {
            id: None,
            display_name: "ops-critical".to_string(),
            mz_id: Some("mz-42".to_string()),
            rules: vec![
                AlertingProfileSeverityRule {
                    severity_level: "AVAILABILITY".to_string(),
                    tag_filter: Some(AlertingProfileTagFilter {
                        include_mode: "INCLUDE_ANY".to_string(),
                        tag_filters: vec![TagFilter {
                            context: "CONTEXTLESS".to_string(),
                            key: "env".to_string(),
                            value: Some("prod".to_string()),
                        }],
                    }),
                    delay_in_minutes: 5,
                },
                AlertingProfileSeverityRule {
                    severity_level: "ERROR".to_string(),
                    tag_filter: None,
                    delay_in_minutes: 30,
                },
            ],
            event_type_filters: vec![
                AlertingEventTypeFilter {
                    predefined_event_filter: Some(AlertingPredefinedEventFilter {
                        event_type: "OSI_HIGH_CPU".to_string(),
                        negate: true,
                    }),
                    custom_event_filter: None,
                },
                AlertingEventTypeFilter {
                    predefined_event_filter: None,
                    custom_event_filter: Some(AlertingCustomEventFilter {
                        custom_title_filter: Some(AlertingCustomTextFilter {
                            enabled: true,
                            value: "deployment".to_string(),
                            operator: "CONTAINS".to_string(),
                            negate: false,
                            case_insensitive: true,
                        }),
                        custom_description_filter: None,
                    }),
                },
            ],
        }
    }

    #[test]
    fn test_expand_flatten_round_trip() {
        let profile = sample_profile();
        let state = flatten_profile("ap-1", &profile);
        assert_eq!(expand_profile(&state), profile);
    }

    #[test]
    fn test_absent_tag_filter_flattens_to_empty_list() {
        let state = flatten_profile("ap-1", &sample_profile());
        // Rule 1 has a tag filter group, rule 2 does not
        assert_eq!(state["rules"][0]["tag_filters"].as_array().unwrap().len(), 1);
        assert_eq!(state["rules"][1]["tag_filters"], json!([]));
    }

    #[test]
    fn test_absent_nested_filters_flatten_to_empty_lists() {
        let state = flatten_profile("ap-1", &sample_profile());
        let filters = state["event_type_filters"].as_array().unwrap();
        assert_eq!(filters[0]["custom_event_filter"], json!([]));
        assert_eq!(filters[1]["predefined_event_filter"], json!([]));
        // Present custom filter carries an absent description filter
        assert_eq!(
            filters[1]["custom_event_filter"][0]["custom_description_filter"],
            json!([])
        );
    }

    #[test]
    fn test_zero_event_type_filters_read_back_empty() {
        let profile = AlertingProfile {
            id: None,
            display_name: "quiet".to_string(),
            mz_id: None,
            rules: vec![],
            event_type_filters: vec![],
        };
        let state = flatten_profile("ap-2", &profile);
        assert_eq!(state["event_type_filters"], json!([]));
        assert_eq!(state["rules"], json!([]));
        assert_eq!(state["mz_id"], Value::Null);
        assert_eq!(expand_profile(&state), profile);
    }

    #[test]
    fn test_schema_shapes() {
        let resource = resource_schema();
        assert!(resource.block.attributes["display_name"].flags.required);
        assert!(resource.block.attributes["id"].flags.computed);
        let rules = &resource.block.blocks["rules"];
        assert_eq!(rules.block.blocks["tag_filters"].max_items, 1);

        let data_source = data_source_schema();
        assert!(data_source.block.attributes["id"].flags.required);
        assert!(data_source.block.attributes["display_name"].flags.computed);
        let rules = &data_source.block.blocks["rules"];
        assert!(rules.block.attributes["severity_level"].flags.computed);
        assert_eq!(rules.block.blocks["tag_filters"].max_items, 0);
    }

    #[tokio::test]
    async fn test_create_update_delete_lifecycle() {
        let api = StubConfigApi::new();

        let state = create(
            &api,
            json!({
                "display_name": "ops-critical",
                "mz_id": "mz-42",
                "rules": [{
                    "severity_level": "AVAILABILITY",
                    "delay_in_minutes": 5,
                    "tag_filters": [{
                        "include_mode": "INCLUDE_ANY",
                        "tag_filter": [{"context": "CONTEXTLESS", "key": "env", "value": "prod"}]
                    }]
                }]
            }),
        )
        .await
        .unwrap();

        let id = state["id"].as_str().unwrap().to_string();
        assert_eq!(state["display_name"], "ops-critical");
        assert_eq!(state["rules"][0]["delay_in_minutes"], 5);

        // No-op update: zero network calls
        api.clear_calls();
        let unchanged = update(&api, state.clone(), state.clone()).await.unwrap();
        assert_eq!(unchanged, state);
        assert!(api.calls().is_empty());

        // Real update: one replace plus one read
        let mut planned = state.clone();
        planned["display_name"] = json!("ops-major");
        let updated = update(&api, state, planned).await.unwrap();
        assert_eq!(updated["display_name"], "ops-major");
        assert_eq!(
            api.calls(),
            vec!["update_alerting_profile", "get_alerting_profile"]
        );

        delete(&api, updated).await.unwrap();
        assert!(api.profile(&id).is_none());
    }

    #[tokio::test]
    async fn test_data_source_read() {
        let api = StubConfigApi::new();
        api.put_profile("ap-9", sample_profile());

        let state = read_data_source(&api, json!({"id": "ap-9"})).await.unwrap();
        assert_eq!(state["id"], "ap-9");
        assert_eq!(state["display_name"], "ops-critical");
        assert_eq!(state["mz_id"], "mz-42");
    }

    #[tokio::test]
    async fn test_data_source_read_missing_id_is_validation_error() {
        let api = StubConfigApi::new();
        let err = read_data_source(&api, json!({})).await.unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }

    #[tokio::test]
    async fn test_data_source_read_not_found_is_error() {
        let api = StubConfigApi::new();
        let err = read_data_source(&api, json!({"id": "ap-unknown"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Api(_)));
    }
}
