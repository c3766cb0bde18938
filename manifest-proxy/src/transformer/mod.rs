//! Conversion between vendor feature flags and manifest flags.
//!
//! Reading: vendor record → type detection → variants → tags → manifest flag.
//! Writing: request → weight normalization → tags → vendor create/update body.
//! Everything in here is synchronous and only looks at its arguments.

pub mod coercion;
pub mod flag_conversion;
pub mod tags;
pub mod type_detection;
pub mod variants;
pub mod weights;

pub use flag_conversion::{
    standard_to_vendor_create, standard_to_vendor_update, vendor_to_manifest, vendor_to_standard,
};
pub use type_detection::{TypeDetectionChain, TypeDetector};
pub use weights::{normalize_variant_weights, validate_variant_weights};
