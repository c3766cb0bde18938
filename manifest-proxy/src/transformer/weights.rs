use crate::api::FlagError;
use crate::manifest::{Variant, Variants};

pub const TOTAL_WEIGHT: i64 = 100;

/// Rejects inputs the normalizer is not defined for: an empty variant set, or an
/// explicit weight outside 0..=100.
pub fn validate_variant_weights(variants: &Variants) -> Result<(), FlagError> {
    if variants.is_empty() {
        return Err(FlagError::InvalidVariants(
            "variants cannot be empty - at least one variant is required".to_string(),
        ));
    }

    for (key, variant) in variants {
        if let Some(weight) = variant.weight {
            if !(0..=TOTAL_WEIGHT).contains(&weight) {
                return Err(FlagError::InvalidVariants(format!(
                    "weight for variant \"{key}\" must be between 0 and 100, got {weight}"
                )));
            }
        }
    }

    Ok(())
}

/// Returns a copy of `variants` whose weights are all set and sum to exactly 100.
///
/// Which strategy applies depends on how many weights the caller supplied:
///
/// 1. all weights, summing to 100: unchanged
/// 2. no weights: an even split
/// 3. some weights, summing to less than 100: the explicit ones are kept and the
///    rest is split evenly between the others
/// 4. anything else: proportional rescale, with the rounding difference added
///    to the first key
///
/// Even splits hand the remainder out one point at a time in key order, so
/// three variants get 34/33/33. Keys are always visited in sorted order, which
/// makes the result deterministic.
pub fn normalize_variant_weights(variants: &Variants) -> Variants {
    if variants.is_empty() {
        return Variants::new();
    }

    let unweighted = variants.values().filter(|v| v.weight.is_none()).count();
    let total_specified: i64 = variants.values().filter_map(|v| v.weight).sum();

    if unweighted == 0 && total_specified == TOTAL_WEIGHT {
        return variants.clone();
    }

    if unweighted == variants.len() {
        return distribute_equally(variants);
    }

    if unweighted > 0 && total_specified < TOTAL_WEIGHT {
        return distribute_remainder(variants, TOTAL_WEIGHT - total_specified, unweighted);
    }

    normalize_proportionally(variants, total_specified)
}

/// `total` split across `count` slots, larger shares first.
fn even_shares(total: i64, count: usize) -> impl Iterator<Item = i64> {
    let count = count.max(1) as i64;
    let base = total / count;
    let remainder = total % count;

    (0..count).map(move |i| if i < remainder { base + 1 } else { base })
}

fn distribute_equally(variants: &Variants) -> Variants {
    variants
        .iter()
        .zip(even_shares(TOTAL_WEIGHT, variants.len()))
        .map(|((key, variant), weight)| {
            (key.clone(), Variant::weighted(variant.value.clone(), weight))
        })
        .collect()
}

fn distribute_remainder(variants: &Variants, remaining: i64, unweighted: usize) -> Variants {
    let mut shares = even_shares(remaining, unweighted);

    variants
        .iter()
        .map(|(key, variant)| {
            let weight = match variant.weight {
                Some(weight) => weight,
                None => shares.next().unwrap_or(0),
            };
            (key.clone(), Variant::weighted(variant.value.clone(), weight))
        })
        .collect()
}

fn normalize_proportionally(variants: &Variants, total_weight: i64) -> Variants {
    if total_weight <= 0 {
        return distribute_equally(variants);
    }

    let mut normalized: Variants = variants
        .iter()
        .map(|(key, variant)| {
            let weight = variant.weight.unwrap_or(0) * TOTAL_WEIGHT / total_weight;
            (key.clone(), Variant::weighted(variant.value.clone(), weight))
        })
        .collect();

    let calculated: i64 = normalized.values().filter_map(|v| v.weight).sum();
    if calculated != TOTAL_WEIGHT {
        // the whole rounding difference lands on the first key
        if let Some(first) = normalized.values_mut().next() {
            first.weight = Some(first.weight.unwrap_or(0) + TOTAL_WEIGHT - calculated);
        }
    }

    normalized
}
