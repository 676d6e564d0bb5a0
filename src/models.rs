//! Typed models for the Dynatrace configuration API v1.
//!
//! Field names and casing mirror the vendor's JSON wire format and are outside
//! this crate's control. Everything derives `PartialEq` so handlers can decide
//! whether an update actually changed anything before touching the network.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Short representation returned by create calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityShortRepresentation {
    /// The API-assigned identifier.
    pub id: String,
    /// The display name, when the API echoes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// An optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A management zone configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagementZone {
    /// The API-assigned identifier; never sent on writes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The name of the management zone.
    pub name: String,
    /// The rules deciding which entities the zone applies to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<ManagementZoneRule>,
}

/// A single management zone rule; each rule is evaluated independently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagementZoneRule {
    /// The type of Dynatrace entities the rule can be applied to.
    #[serde(rename = "type")]
    pub rule_type: String,
    /// Whether the rule is evaluated.
    pub enabled: bool,
    /// How the zone propagates to underlying entities. Set semantics.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub propagation_types: Vec<String>,
    /// The zone applies only if all conditions are fulfilled.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<EntityRuleEngineCondition>,
}

/// A matching condition within a management zone rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRuleEngineCondition {
    /// The key identifying the data being matched.
    pub key: ConditionKey,
    /// How the matching is performed.
    pub comparison_info: ComparisonBasic,
}

/// The key of a rule condition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionKey {
    /// The attribute to be used for comparison.
    pub attribute: String,
    /// Discriminator for the actual set of fields.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub key_type: Option<String>,
}

/// The comparison of a rule condition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonBasic {
    /// Operator of the comparison; reversed by `negate`.
    pub operator: String,
    /// The value to compare to.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub value: HashMap<String, String>,
    /// Reverses the comparison operator.
    pub negate: bool,
    /// Discriminator for the actual set of fields.
    #[serde(rename = "type")]
    pub comparison_type: String,
}

/// An alerting profile configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertingProfile {
    /// The API-assigned identifier; never sent on writes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The display name of the profile.
    pub display_name: String,
    /// The management zone the profile applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mz_id: Option<String>,
    /// Severity rules, evaluated in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<AlertingProfileSeverityRule>,
    /// Event type filters, evaluated in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_type_filters: Vec<AlertingEventTypeFilter>,
}

/// A severity rule of an alerting profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertingProfileSeverityRule {
    /// The severity level to trigger on.
    pub severity_level: String,
    /// Tag filter group scoping the rule, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_filter: Option<AlertingProfileTagFilter>,
    /// Notification delay in minutes.
    pub delay_in_minutes: i64,
}

/// A group of tag filters with an include mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertingProfileTagFilter {
    /// Whether matched tags include or exclude entities.
    pub include_mode: String,
    /// The tag filters, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag_filters: Vec<TagFilter>,
}

/// A single tag filter triple.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagFilter {
    /// The origin of the tag.
    pub context: String,
    /// The key of the tag.
    pub key: String,
    /// The value of the tag, if constrained.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// An event type filter of an alerting profile.
///
/// Exactly one of the two nested filters is populated on real records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertingEventTypeFilter {
    /// A filter on a predefined event type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predefined_event_filter: Option<AlertingPredefinedEventFilter>,
    /// A filter on custom event text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_event_filter: Option<AlertingCustomEventFilter>,
}

/// A predefined event filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertingPredefinedEventFilter {
    /// The event type to filter on.
    pub event_type: String,
    /// Reverses the filter.
    pub negate: bool,
}

/// A custom event filter over title and/or description text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertingCustomEventFilter {
    /// Filter on the event title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_title_filter: Option<AlertingCustomTextFilter>,
    /// Filter on the event description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_description_filter: Option<AlertingCustomTextFilter>,
}

/// A text filter used by custom event filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertingCustomTextFilter {
    /// Whether the filter is evaluated.
    pub enabled: bool,
    /// The text to match against.
    pub value: String,
    /// The match operator.
    pub operator: String,
    /// Reverses the operator.
    pub negate: bool,
    /// Case-insensitive matching.
    pub case_insensitive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_management_zone_wire_format() {
        let body = json!({
            "id": "mz-42",
            "name": "zone-a",
            "rules": [{
                "type": "HOST",
                "enabled": true,
                "propagationTypes": ["HOST_TO_SERVICE"],
                "conditions": [{
                    "key": {"attribute": "HOST_TAGS"},
                    "comparisonInfo": {
                        "operator": "EQUALS",
                        "value": {"value": "prod"},
                        "negate": false,
                        "type": "STRING"
                    }
                }]
            }]
        });

        let zone: ManagementZone = serde_json::from_value(body).unwrap();
        assert_eq!(zone.id.as_deref(), Some("mz-42"));
        assert_eq!(zone.rules[0].rule_type, "HOST");
        assert_eq!(zone.rules[0].conditions[0].key.attribute, "HOST_TAGS");
        assert_eq!(
            zone.rules[0].conditions[0].comparison_info.comparison_type,
            "STRING"
        );
    }

    #[test]
    fn test_management_zone_id_not_serialized_when_absent() {
        let zone = ManagementZone {
            id: None,
            name: "zone-a".to_string(),
            rules: vec![],
        };

        let body = serde_json::to_value(&zone).unwrap();
        assert!(body.get("id").is_none());
        // Empty rule collections are omitted, matching the Go client's omitempty
        assert!(body.get("rules").is_none());
        assert_eq!(body["name"], "zone-a");
    }

    #[test]
    fn test_alerting_profile_wire_format() {
        let body = json!({
            "id": "ap-1",
            "displayName": "ops",
            "mzId": "mz-42",
            "rules": [{
                "severityLevel": "AVAILABILITY",
                "delayInMinutes": 5,
                "tagFilter": {
                    "includeMode": "INCLUDE_ANY",
                    "tagFilters": [{"context": "AWS", "key": "env", "value": "prod"}]
                }
            }],
            "eventTypeFilters": [{
                "predefinedEventFilter": {"eventType": "OSI_HIGH_CPU", "negate": false}
            }]
        });

        let profile: AlertingProfile = serde_json::from_value(body).unwrap();
        assert_eq!(profile.display_name, "ops");
        assert_eq!(profile.rules[0].delay_in_minutes, 5);
        let group = profile.rules[0].tag_filter.as_ref().unwrap();
        assert_eq!(group.include_mode, "INCLUDE_ANY");
        assert_eq!(group.tag_filters[0].value.as_deref(), Some("prod"));
        let filter = &profile.event_type_filters[0];
        assert_eq!(
            filter.predefined_event_filter.as_ref().unwrap().event_type,
            "OSI_HIGH_CPU"
        );
        assert!(filter.custom_event_filter.is_none());
    }

    #[test]
    fn test_profile_without_filters_deserializes_empty() {
        let profile: AlertingProfile =
            serde_json::from_value(json!({"displayName": "quiet"})).unwrap();
        assert!(profile.rules.is_empty());
        assert!(profile.event_type_filters.is_empty());
    }
}
