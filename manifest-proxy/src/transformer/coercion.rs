use serde_json::{Map, Number, Value};

use crate::config::TypeCoercionConfig;

/// Recognises explicit boolean words only. Digit strings never match, so boolean
/// and numeric coercion can't both claim "1".
pub fn coerce_boolean(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => Some(true),
        "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Trims, then parses as a base-10 integer or failing that a finite float.
pub fn coerce_numeric(s: &str) -> Option<Value> {
    parse_numeric(s.trim())
}

/// Same as [`coerce_numeric`] but without trimming. Used for multivariate keys,
/// where " 1" is a label, not a number.
pub fn parse_numeric(s: &str) -> Option<Value> {
    if let Ok(int) = s.parse::<i64>() {
        return Some(Value::Number(int.into()));
    }

    s.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

pub fn looks_like_json_object(s: &str) -> bool {
    let trimmed = s.trim();
    trimmed.starts_with('{') && trimmed.ends_with('}')
}

/// Parses `s` as a JSON object. Anything that is not object-shaped, or fails to
/// parse, is "no match" rather than an error.
pub fn parse_json_object(s: &str) -> Option<Map<String, Value>> {
    if !looks_like_json_object(s) {
        return None;
    }

    match serde_json::from_str::<Map<String, Value>>(s) {
        Ok(obj) => Some(obj),
        Err(e) => {
            tracing::debug!("payload looks like an object but failed to parse: {}", e);
            None
        }
    }
}

/// Applies whichever coercers are enabled, boolean first.
pub fn coerce_scalar(s: &str, cfg: &TypeCoercionConfig) -> Option<Value> {
    if cfg.coerce_boolean_strings {
        if let Some(b) = coerce_boolean(s) {
            return Some(Value::Bool(b));
        }
    }

    if cfg.coerce_numeric_strings {
        if let Some(n) = coerce_numeric(s) {
            return Some(n);
        }
    }

    None
}

/// Best typed reading of a payload string: object, then coerced scalar, then the
/// raw string.
pub fn payload_value(payload: &str, cfg: &TypeCoercionConfig) -> Value {
    if let Some(obj) = parse_json_object(payload) {
        return Value::Object(obj);
    }

    coerce_scalar(payload, cfg).unwrap_or_else(|| Value::String(payload.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case("true", Some(true); "lowercase true")]
    #[test_case("TRUE", Some(true); "uppercase true")]
    #[test_case("Yes", Some(true); "yes")]
    #[test_case("on", Some(true); "on")]
    #[test_case(" false ", Some(false); "padded false")]
    #[test_case("no", Some(false); "no")]
    #[test_case("OFF", Some(false); "off")]
    #[test_case("1", None; "digit one is not boolean")]
    #[test_case("0", None; "digit zero is not boolean")]
    #[test_case("truthy", None; "prefix of a word")]
    #[test_case("", None; "empty")]
    fn test_coerce_boolean(input: &str, expected: Option<bool>) {
        assert_eq!(coerce_boolean(input), expected);
    }

    #[test_case("42", Some(json!(42)); "integer")]
    #[test_case("-7", Some(json!(-7)); "negative integer")]
    #[test_case("  200 ", Some(json!(200)); "padded integer")]
    #[test_case("2.75", Some(json!(2.75)); "float")]
    #[test_case("1e3", Some(json!(1000.0)); "exponent is a float")]
    #[test_case("9223372036854775808", Some(json!(9223372036854775808.0)); "overflowing integer falls back to float")]
    #[test_case("NaN", None; "nan is rejected")]
    #[test_case("inf", None; "infinity is rejected")]
    #[test_case("abc", None; "not a number")]
    #[test_case("", None; "empty")]
    fn test_coerce_numeric(input: &str, expected: Option<Value>) {
        assert_eq!(coerce_numeric(input), expected);
    }

    #[test]
    fn test_parse_numeric_does_not_trim() {
        assert_eq!(parse_numeric("10"), Some(json!(10)));
        assert_eq!(parse_numeric(" 10"), None);
    }

    #[test]
    fn test_parse_json_object() {
        let obj = parse_json_object(r#"  {"color": "red", "size": 2} "#).unwrap();
        assert_eq!(obj.get("color"), Some(&json!("red")));
        assert_eq!(obj.get("size"), Some(&json!(2)));

        assert!(parse_json_object("{not json}").is_none());
        assert!(parse_json_object("[1, 2]").is_none());
        assert!(parse_json_object(r#""{}""#).is_none());
        assert!(parse_json_object("{}").unwrap().is_empty());
    }

    #[test]
    fn test_coerce_scalar_respects_config() {
        assert_eq!(coerce_scalar("true", &TypeCoercionConfig::default()), None);
        assert_eq!(coerce_scalar("12", &TypeCoercionConfig::default()), None);

        let booleans_only = TypeCoercionConfig {
            coerce_boolean_strings: true,
            coerce_numeric_strings: false,
        };
        assert_eq!(coerce_scalar("yes", &booleans_only), Some(json!(true)));
        assert_eq!(coerce_scalar("12", &booleans_only), None);

        let numbers_only = TypeCoercionConfig {
            coerce_boolean_strings: false,
            coerce_numeric_strings: true,
        };
        assert_eq!(coerce_scalar("12", &numbers_only), Some(json!(12)));
        assert_eq!(coerce_scalar("yes", &numbers_only), None);
    }

    #[test]
    fn test_payload_value_falls_back_to_raw_string() {
        let cfg = TypeCoercionConfig::all();

        assert_eq!(payload_value(r#"{"a": 1}"#, &cfg), json!({"a": 1}));
        assert_eq!(payload_value("off", &cfg), json!(false));
        assert_eq!(payload_value("2.5", &cfg), json!(2.5));
        assert_eq!(payload_value("{broken", &cfg), json!("{broken"));
        assert_eq!(payload_value("{broken}", &cfg), json!("{broken}"));
        assert_eq!(payload_value("hello", &cfg), json!("hello"));
    }
}
