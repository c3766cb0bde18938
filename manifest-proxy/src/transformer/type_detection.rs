use serde_json::Value;

use crate::config::TypeCoercionConfig;
use crate::flag_definitions::FeatureFlag;
use crate::manifest::FlagType;
use crate::transformer::coercion::{
    coerce_boolean, coerce_numeric, parse_json_object, parse_numeric,
};

/// One stage of the detection chain. Stages are tried in order and the first one
/// that recognises the flag decides its manifest type and default value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeDetector {
    /// Any payload that parses as a JSON object makes the flag an object flag.
    PayloadObject,
    /// Payload strings coerced to booleans or numbers, when enabled.
    PayloadCoercion(TypeCoercionConfig),
    /// The first declared multivariate variant decides between integer and string.
    Multivariate,
    /// Everything else is a boolean flag gated by its rollout.
    Boolean,
}

impl TypeDetector {
    pub fn detect(&self, flag: &FeatureFlag) -> Option<(FlagType, Value)> {
        match self {
            TypeDetector::PayloadObject => detect_payload_object(flag),
            TypeDetector::PayloadCoercion(cfg) => detect_payload_coercion(flag, cfg),
            TypeDetector::Multivariate => detect_multivariate(flag),
            TypeDetector::Boolean => Some(detect_boolean(flag)),
        }
    }
}

fn detect_payload_object(flag: &FeatureFlag) -> Option<(FlagType, Value)> {
    flag.filters
        .payloads
        .values()
        .find_map(|payload| parse_json_object(payload))
        .map(|obj| (FlagType::Object, Value::Object(obj)))
}

fn detect_payload_coercion(
    flag: &FeatureFlag,
    cfg: &TypeCoercionConfig,
) -> Option<(FlagType, Value)> {
    if !cfg.coerce_boolean_strings && !cfg.coerce_numeric_strings {
        return None;
    }

    for payload in flag.filters.payloads.values() {
        // boolean is the more specific reading, so it goes first for each payload
        if cfg.coerce_boolean_strings {
            if let Some(b) = coerce_boolean(payload) {
                return Some((FlagType::Boolean, Value::Bool(b)));
            }
        }

        if cfg.coerce_numeric_strings {
            if let Some(n) = coerce_numeric(payload) {
                return Some((FlagType::Integer, n));
            }
        }
    }

    None
}

fn detect_multivariate(flag: &FeatureFlag) -> Option<(FlagType, Value)> {
    let first = flag.filters.get_variants().first()?;

    match parse_numeric(&first.key) {
        Some(n) => Some((FlagType::Integer, n)),
        None => Some((FlagType::String, Value::String(first.key.clone()))),
    }
}

// A 0% rollout on the first group stands for `defaultValue: false`, any
// positive rollout for `true`. A 50% rollout therefore reads back as `true`.
fn detect_boolean(flag: &FeatureFlag) -> (FlagType, Value) {
    if !flag.active {
        return (FlagType::Boolean, Value::Bool(false));
    }

    match flag.filters.primary_rollout() {
        Some(rollout) => (FlagType::Boolean, Value::Bool(rollout > 0.0)),
        None => (FlagType::Boolean, Value::Bool(true)),
    }
}

#[derive(Debug, Clone)]
pub struct TypeDetectionChain {
    detectors: Vec<TypeDetector>,
}

impl TypeDetectionChain {
    pub fn new(cfg: TypeCoercionConfig) -> Self {
        TypeDetectionChain {
            detectors: vec![
                TypeDetector::PayloadObject,
                TypeDetector::PayloadCoercion(cfg),
                TypeDetector::Multivariate,
                TypeDetector::Boolean,
            ],
        }
    }

    pub fn detect(&self, flag: &FeatureFlag) -> (FlagType, Value) {
        self.detectors
            .iter()
            .find_map(|detector| detector.detect(flag))
            // unreachable while Boolean closes the chain
            .unwrap_or((FlagType::Boolean, Value::Bool(false)))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::test_utils::{boolean_flag, flag_with_payloads, multivariate_flag};

    #[test]
    fn test_payload_object_detector() {
        let flag = flag_with_payloads(&[("true", r#"{"theme": "dark"}"#)]);

        assert_eq!(
            TypeDetector::PayloadObject.detect(&flag),
            Some((FlagType::Object, json!({"theme": "dark"})))
        );
    }

    #[test]
    fn test_payload_object_detector_skips_malformed_objects() {
        let flag = flag_with_payloads(&[("a", "{oops}"), ("b", r#"{"ok": true}"#)]);

        assert_eq!(
            TypeDetector::PayloadObject.detect(&flag),
            Some((FlagType::Object, json!({"ok": true})))
        );

        let flag = flag_with_payloads(&[("a", "{oops}")]);
        assert_eq!(TypeDetector::PayloadObject.detect(&flag), None);
    }

    #[test]
    fn test_payload_coercion_detector_is_opt_in() {
        let flag = flag_with_payloads(&[("true", "yes")]);

        assert_eq!(
            TypeDetector::PayloadCoercion(TypeCoercionConfig::default()).detect(&flag),
            None
        );
        assert_eq!(
            TypeDetector::PayloadCoercion(TypeCoercionConfig::all()).detect(&flag),
            Some((FlagType::Boolean, json!(true)))
        );
    }

    #[test]
    fn test_payload_coercion_detector_numeric() {
        let flag = flag_with_payloads(&[("true", " 250 ")]);
        let numbers_only = TypeCoercionConfig {
            coerce_numeric_strings: true,
            coerce_boolean_strings: false,
        };

        assert_eq!(
            TypeDetector::PayloadCoercion(numbers_only).detect(&flag),
            Some((FlagType::Integer, json!(250)))
        );
    }

    #[test]
    fn test_multivariate_detector() {
        let flag = multivariate_flag(&[("control", 50), ("test", 50)]);
        assert_eq!(
            TypeDetector::Multivariate.detect(&flag),
            Some((FlagType::String, json!("control")))
        );

        let flag = multivariate_flag(&[("10", 50), ("20", 50)]);
        assert_eq!(
            TypeDetector::Multivariate.detect(&flag),
            Some((FlagType::Integer, json!(10)))
        );

        // first declared wins even when a later variant carries more weight
        let flag = multivariate_flag(&[("small", 10), ("large", 90)]);
        assert_eq!(
            TypeDetector::Multivariate.detect(&flag),
            Some((FlagType::String, json!("small")))
        );

        assert_eq!(TypeDetector::Multivariate.detect(&boolean_flag(true, Some(100.0))), None);
    }

    #[test]
    fn test_boolean_detector() {
        assert_eq!(
            TypeDetector::Boolean.detect(&boolean_flag(false, Some(100.0))),
            Some((FlagType::Boolean, json!(false)))
        );
        assert_eq!(
            TypeDetector::Boolean.detect(&boolean_flag(true, Some(0.0))),
            Some((FlagType::Boolean, json!(false)))
        );
        assert_eq!(
            TypeDetector::Boolean.detect(&boolean_flag(true, Some(50.0))),
            Some((FlagType::Boolean, json!(true)))
        );
        assert_eq!(
            TypeDetector::Boolean.detect(&boolean_flag(true, None)),
            Some((FlagType::Boolean, json!(true)))
        );
    }

    #[test]
    fn test_chain_prefers_object_over_coercion_and_multivariate() {
        let mut flag = multivariate_flag(&[("control", 50), ("test", 50)]);
        flag.filters.payloads.insert("control".to_string(), "on".to_string());
        flag.filters
            .payloads
            .insert("test".to_string(), r#"{"size": 3}"#.to_string());

        let chain = TypeDetectionChain::new(TypeCoercionConfig::all());

        assert_eq!(chain.detect(&flag), (FlagType::Object, json!({"size": 3})));
    }

    #[test]
    fn test_chain_prefers_coercion_over_multivariate() {
        let mut flag = multivariate_flag(&[("control", 50), ("test", 50)]);
        flag.filters.payloads.insert("control".to_string(), "false".to_string());

        let chain = TypeDetectionChain::new(TypeCoercionConfig::all());
        assert_eq!(chain.detect(&flag), (FlagType::Boolean, json!(false)));

        let chain = TypeDetectionChain::new(TypeCoercionConfig::default());
        assert_eq!(chain.detect(&flag), (FlagType::String, json!("control")));
    }

    #[test]
    fn test_chain_always_answers() {
        let chain = TypeDetectionChain::new(TypeCoercionConfig::default());
        let flag = boolean_flag(true, None);

        assert_eq!(chain.detect(&flag), (FlagType::Boolean, json!(true)));
    }
}
