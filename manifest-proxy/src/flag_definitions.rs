use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// Field names follow the PostHog feature flag REST API. Nothing outside this
// module should know the wire names.

pub const CREATION_CONTEXT: &str = "feature_flags";
pub const EVALUATION_RUNTIME: &str = "server";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct FlagGroupType {
    /// Targeting conditions, passed through untouched.
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub properties: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    /// Group keys this crate doesn't model (`description`, `sort_key`, ...).
    /// Sent back as received.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl FlagGroupType {
    pub fn with_rollout(rollout_percentage: f64) -> Self {
        FlagGroupType {
            rollout_percentage: Some(rollout_percentage),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MultivariateFlagVariant {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub rollout_percentage: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
pub struct MultivariateFlagOptions {
    pub variants: Vec<MultivariateFlagVariant>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct FlagFilters {
    #[serde(default)]
    pub groups: Vec<FlagGroupType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multivariate: Option<MultivariateFlagOptions>,
    #[serde(
        default,
        deserialize_with = "deserialize_payloads",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub payloads: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation_group_type_index: Option<i32>,
    /// Vendor-only configuration such as `super_groups`, `holdout_groups` or
    /// `feature_enrollment`. Never interpreted, always written back.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl FlagFilters {
    /// Variants declared in the multivariate block, in declaration order.
    pub fn get_variants(&self) -> &[MultivariateFlagVariant] {
        self.multivariate
            .as_ref()
            .map(|m| m.variants.as_slice())
            .unwrap_or_default()
    }

    /// Rollout of the first group, the only one the transformer reads.
    pub fn primary_rollout(&self) -> Option<f64> {
        self.groups.first().and_then(|g| g.rollout_percentage)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FeatureFlag {
    pub id: i64,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub name: String,
    pub key: String,
    #[serde(default)]
    pub filters: FlagFilters,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub active: bool,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// One page of `GET /api/projects/:id/feature_flags/`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct FeatureFlagPage {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    #[serde(default)]
    pub results: Vec<FeatureFlag>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CreateFeatureFlagBody {
    pub name: String,
    pub key: String,
    pub filters: FlagFilters,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollout_percentage: Option<u32>,
    pub ensure_experience_continuity: bool,
    pub creation_context: String,
    pub evaluation_runtime: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// PATCH body. Anything left as `None` is omitted, so the vendor keeps its
/// current value for that field.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct UpdateFeatureFlagBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<FlagFilters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl UpdateFeatureFlagBody {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.filters.is_none()
            && self.active.is_none()
            && self.tags.is_none()
    }
}

/// Error body returned by the vendor API, e.g.
/// `{"type": "validation_error", "code": "unique", "detail": "...", "attr": "key"}`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ApiErrorBody {
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub attr: Option<String>,
}

// Payload values are usually JSON-encoded strings, but older flags can carry raw
// JSON values. Those are kept as their JSON text so the rest of the pipeline only
// ever sees strings.
fn deserialize_payloads<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, serde_json::Value>> = Option::deserialize(deserializer)?;

    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, value)| match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect())
}

fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
