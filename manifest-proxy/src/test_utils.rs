use std::collections::BTreeMap;

use serde_json::Value;

use crate::flag_definitions::{
    FeatureFlag, FlagFilters, FlagGroupType, MultivariateFlagOptions, MultivariateFlagVariant,
};
use crate::manifest::{CreateFlagRequest, FlagType, Variants};

pub fn vendor_flag(id: i64, key: &str) -> FeatureFlag {
    FeatureFlag {
        id,
        name: format!("{key} description"),
        key: key.to_string(),
        filters: FlagFilters::default(),
        deleted: false,
        active: true,
        tags: Vec::new(),
        created_at: None,
        updated_at: None,
    }
}

pub fn boolean_flag(active: bool, rollout_percentage: Option<f64>) -> FeatureFlag {
    let mut flag = vendor_flag(1, "boolean-flag");
    flag.active = active;
    flag.filters.groups = vec![FlagGroupType {
        rollout_percentage,
        ..Default::default()
    }];
    flag
}

pub fn multivariate_flag(variants: &[(&str, i64)]) -> FeatureFlag {
    let mut flag = boolean_flag(true, Some(100.0));
    flag.key = "multivariate-flag".to_string();
    flag.filters.multivariate = Some(MultivariateFlagOptions {
        variants: variants
            .iter()
            .map(|(key, weight)| MultivariateFlagVariant {
                key: key.to_string(),
                name: Some(key.to_string()),
                rollout_percentage: *weight,
            })
            .collect(),
    });
    flag
}

pub fn flag_with_payloads(payloads: &[(&str, &str)]) -> FeatureFlag {
    let mut flag = boolean_flag(true, Some(100.0));
    flag.key = "payload-flag".to_string();
    flag.filters.payloads = payloads
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    flag
}

pub fn create_request(key: &str, flag_type: FlagType, default_value: Value) -> CreateFlagRequest {
    CreateFlagRequest {
        key: key.to_string(),
        name: String::new(),
        description: String::new(),
        flag_type,
        default_value,
        variants: Variants::new(),
        expiry: None,
        metadata: BTreeMap::new(),
    }
}
