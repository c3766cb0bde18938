use serde_json::Value;

use crate::config::TypeCoercionConfig;
use crate::flag_definitions::{
    CreateFeatureFlagBody, FeatureFlag, FlagFilters, FlagGroupType, UpdateFeatureFlagBody,
    CREATION_CONTEXT, EVALUATION_RUNTIME,
};
use crate::manifest::{
    CreateFlagRequest, FlagState, FlagType, Manifest, ManifestFlag, UpdateFlagRequest,
};
use crate::transformer::tags::{
    decode_expiry, decode_metadata, encode_expiry, encode_metadata, update_expiry,
    update_metadata,
};
use crate::transformer::type_detection::TypeDetectionChain;
use crate::transformer::variants::{multivariate_options, vendor_variants};

const FULL_ROLLOUT: f64 = 100.0;

pub fn vendor_to_standard(flag: &FeatureFlag, cfg: &TypeCoercionConfig) -> ManifestFlag {
    let (flag_type, default_value) = TypeDetectionChain::new(*cfg).detect(flag);

    ManifestFlag {
        key: flag.key.clone(),
        name: flag.key.clone(),
        description: flag.name.clone(),
        flag_type,
        default_value,
        variants: vendor_variants(flag, cfg),
        state: FlagState::from(flag.active),
        expiry: decode_expiry(&flag.tags),
        metadata: decode_metadata(&flag.tags),
    }
}

/// Builds a manifest from a vendor listing. Soft-deleted records are skipped.
pub fn vendor_to_manifest(flags: &[FeatureFlag], cfg: &TypeCoercionConfig) -> Manifest {
    Manifest {
        flags: flags
            .iter()
            .filter(|flag| !flag.deleted)
            .map(|flag| vendor_to_standard(flag, cfg))
            .collect(),
    }
}

fn boolean_rollout(default_value: bool) -> f64 {
    if default_value {
        FULL_ROLLOUT
    } else {
        0.0
    }
}

fn first_non_empty<'a>(candidates: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    candidates.into_iter().find(|s| !s.trim().is_empty())
}

/// Translates a create request into a vendor body.
///
/// Variants are expected to have passed
/// [`validate_variant_weights`](crate::transformer::validate_variant_weights);
/// their weights are normalized here.
pub fn standard_to_vendor_create(
    request: &CreateFlagRequest,
    default_rollout_percentage: u32,
) -> CreateFeatureFlagBody {
    let name = first_non_empty([
        request.description.as_str(),
        request.name.as_str(),
        request.key.as_str(),
    ])
    .unwrap_or(request.key.as_str())
    .to_string();

    // rollout only gates booleans; typed flags are always served
    let rollout = match (request.flag_type, &request.default_value) {
        (FlagType::Boolean, Value::Bool(default_value)) => boolean_rollout(*default_value),
        (FlagType::Boolean, _) => 0.0,
        _ => FULL_ROLLOUT,
    };

    let filters = FlagFilters {
        groups: vec![FlagGroupType::with_rollout(rollout)],
        multivariate: multivariate_options(&request.variants),
        ..Default::default()
    };

    let mut tags = encode_metadata(&request.metadata);
    if let Some(expiry) = &request.expiry {
        tags.push(encode_expiry(expiry));
    }

    CreateFeatureFlagBody {
        name,
        key: request.key.clone(),
        filters,
        active: true,
        rollout_percentage: Some(default_rollout_percentage),
        ensure_experience_continuity: true,
        creation_context: CREATION_CONTEXT.to_string(),
        evaluation_runtime: EVALUATION_RUNTIME.to_string(),
        tags,
    }
}

/// Merges a partial update against the record it applies to. Fields the
/// request leaves out stay `None` in the body, so the vendor keeps them.
pub fn standard_to_vendor_update(
    request: &UpdateFlagRequest,
    existing: &FeatureFlag,
    cfg: &TypeCoercionConfig,
) -> UpdateFeatureFlagBody {
    let mut body = UpdateFeatureFlagBody {
        name: first_non_empty([
            request.description.as_deref().unwrap_or_default(),
            request.name.as_deref().unwrap_or_default(),
        ])
        .map(str::to_string),
        active: request.state.map(|state| state == FlagState::Enabled),
        ..Default::default()
    };

    if let Some(variants) = &request.variants {
        let mut filters = existing.filters.clone();
        if filters.groups.is_empty() {
            filters.groups.push(FlagGroupType::with_rollout(FULL_ROLLOUT));
        }
        // the multivariate distribution replaces per-group overrides
        for group in filters.groups.iter_mut() {
            group.variant = None;
        }
        filters.multivariate = multivariate_options(variants);

        body.filters = Some(filters);
    }

    if let Some(Value::Bool(default_value)) = &request.default_value {
        let is_boolean = match request.flag_type {
            Some(flag_type) => flag_type == FlagType::Boolean,
            None => TypeDetectionChain::new(*cfg).detect(existing).0 == FlagType::Boolean,
        };

        if is_boolean {
            let filters = body.filters.get_or_insert_with(|| existing.filters.clone());
            match filters.groups.first_mut() {
                Some(group) => group.rollout_percentage = Some(boolean_rollout(*default_value)),
                None => filters
                    .groups
                    .push(FlagGroupType::with_rollout(boolean_rollout(*default_value))),
            }
        }
    }

    if request.metadata.is_some() || request.expiry.is_some() {
        let mut tags = existing.tags.clone();
        if let Some(metadata) = &request.metadata {
            tags = update_metadata(&tags, metadata);
        }
        if let Some(expiry) = &request.expiry {
            tags = update_expiry(&tags, expiry.as_ref());
        }
        body.tags = Some(tags);
    }

    body
}
