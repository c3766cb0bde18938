use serde_json::Value;

use crate::config::TypeCoercionConfig;
use crate::flag_definitions::{FeatureFlag, MultivariateFlagOptions, MultivariateFlagVariant};
use crate::manifest::{Variant, Variants};
use crate::transformer::coercion::{parse_numeric, payload_value};
use crate::transformer::weights::normalize_variant_weights;

/// Reads manifest variants off a vendor record.
///
/// Multivariate flags yield one weighted variant per declared variant. The
/// value comes from the variant's payload when there is one. Without any
/// payloads at all a numeric key reads as a number, otherwise the key itself
/// is the value. Flags with payloads but no multivariate block yield one
/// unweighted variant per payload.
pub fn vendor_variants(flag: &FeatureFlag, cfg: &TypeCoercionConfig) -> Variants {
    let payloads = &flag.filters.payloads;
    let declared = flag.filters.get_variants();

    if !declared.is_empty() {
        return declared
            .iter()
            .map(|variant| {
                let value = match payloads.get(&variant.key) {
                    Some(payload) => payload_value(payload, cfg),
                    None if payloads.is_empty() => parse_numeric(&variant.key)
                        .unwrap_or_else(|| Value::String(variant.key.clone())),
                    None => Value::String(variant.key.clone()),
                };

                (
                    variant.key.clone(),
                    Variant::weighted(value, variant.rollout_percentage),
                )
            })
            .collect();
    }

    payloads
        .iter()
        .map(|(key, payload)| (key.clone(), Variant::new(payload_value(payload, cfg))))
        .collect()
}

/// Builds the vendor multivariate block, normalizing weights on the way.
/// An empty variant map means "no multivariate block".
pub fn multivariate_options(variants: &Variants) -> Option<MultivariateFlagOptions> {
    if variants.is_empty() {
        return None;
    }

    let variants = normalize_variant_weights(variants)
        .into_iter()
        .map(|(key, variant)| MultivariateFlagVariant {
            name: Some(key.clone()),
            rollout_percentage: variant.weight.unwrap_or(0),
            key,
        })
        .collect();

    Some(MultivariateFlagOptions { variants })
}
