use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};

/// Metadata keys that round-trip through vendor tags. Anything else in a request's
/// metadata is dropped, and any other tag on the flag is left alone.
pub const METADATA_KEYS: [&str; 5] = ["created", "domain", "owner", "type", "lifetime"];

pub const EXPIRY_PREFIX: &str = "expiry:";

fn metadata_prefix(tag: &str) -> Option<&'static str> {
    METADATA_KEYS
        .iter()
        .copied()
        .find(|key| tag.strip_prefix(key).is_some_and(|rest| rest.starts_with(':')))
}

/// Encodes whitelisted, non-blank metadata entries as `key:value` tags, in key order.
pub fn encode_metadata(metadata: &BTreeMap<String, String>) -> Vec<String> {
    metadata
        .iter()
        .filter(|(key, _)| METADATA_KEYS.contains(&key.as_str()))
        .filter_map(|(key, value)| {
            let value = value.trim();
            (!value.is_empty()).then(|| format!("{key}:{value}"))
        })
        .collect()
}

/// First tag for a key wins, as with [`decode_expiry`].
pub fn decode_metadata(tags: &[String]) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();

    for tag in tags {
        if let Some(key) = metadata_prefix(tag) {
            let value = &tag[key.len() + 1..];
            if !value.is_empty() {
                metadata
                    .entry(key.to_string())
                    .or_insert_with(|| value.to_string());
            }
        }
    }

    metadata
}

/// Replaces every metadata-owned tag with the encoding of `metadata`. Tags outside
/// the whitelist keep their relative order.
pub fn update_metadata(existing: &[String], metadata: &BTreeMap<String, String>) -> Vec<String> {
    let mut tags: Vec<String> = existing
        .iter()
        .filter(|tag| metadata_prefix(tag).is_none())
        .cloned()
        .collect();

    tags.extend(encode_metadata(metadata));
    tags
}

pub fn encode_expiry(expiry: &DateTime<Utc>) -> String {
    format!(
        "{EXPIRY_PREFIX}{}",
        expiry.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    )
}

/// First `expiry:` tag wins. An unparseable timestamp reads as "no expiry".
pub fn decode_expiry(tags: &[String]) -> Option<DateTime<Utc>> {
    let raw = tags.iter().find_map(|tag| tag.strip_prefix(EXPIRY_PREFIX))?;

    match DateTime::parse_from_rfc3339(raw) {
        Ok(expiry) => Some(expiry.with_timezone(&Utc)),
        Err(e) => {
            tracing::debug!("ignoring malformed expiry tag {}: {}", raw, e);
            None
        }
    }
}

/// Drops any existing expiry tag and, if `expiry` is set, appends the new one.
pub fn update_expiry(existing: &[String], expiry: Option<&DateTime<Utc>>) -> Vec<String> {
    let mut tags: Vec<String> = existing
        .iter()
        .filter(|tag| !tag.starts_with(EXPIRY_PREFIX))
        .cloned()
        .collect();

    if let Some(expiry) = expiry {
        tags.push(encode_expiry(expiry));
    }

    tags
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn tags(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|t| t.to_string()).collect()
    }

    fn metadata(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_encode_metadata_filters_and_sorts() {
        let encoded = encode_metadata(&metadata(&[
            ("owner", "team-a"),
            ("region", "eu"),
            ("domain", "  "),
            ("created", " 2024-01-01 "),
            ("lifetime", "temporary"),
        ]));

        assert_eq!(
            encoded,
            tags(&["created:2024-01-01", "lifetime:temporary", "owner:team-a"])
        );
    }

    #[test]
    fn test_decode_metadata_ignores_unknown_tags() {
        let decoded = decode_metadata(&tags(&[
            "owner:team-a",
            "region:eu",
            "beta",
            "type:release",
            "owner:",
            "ownership:shared",
        ]));

        assert_eq!(
            decoded,
            metadata(&[("owner", "team-a"), ("type", "release")])
        );
    }

    #[test]
    fn test_first_tag_wins_for_repeated_keys() {
        let repeated = tags(&[
            "owner:team-a",
            "expiry:2025-01-01T00:00:00Z",
            "owner:team-b",
            "expiry:2026-01-01T00:00:00Z",
        ]);

        assert_eq!(decode_metadata(&repeated)["owner"], "team-a");
        assert_eq!(
            decode_expiry(&repeated),
            Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_decode_metadata_keeps_colons_in_values() {
        let decoded = decode_metadata(&tags(&["domain:https://example.com"]));

        assert_eq!(decoded["domain"], "https://example.com");
    }

    #[test]
    fn test_update_metadata_replaces_owned_tags_only() {
        let existing = tags(&["owner:team-a", "region:eu", "type:release", "beta"]);
        let updated = update_metadata(&existing, &metadata(&[("owner", "team-b")]));

        assert_eq!(updated, tags(&["region:eu", "beta", "owner:team-b"]));

        let cleared = update_metadata(&existing, &BTreeMap::new());
        assert_eq!(cleared, tags(&["region:eu", "beta"]));
    }

    #[test]
    fn test_expiry_round_trip() {
        let expiry = Utc.with_ymd_and_hms(2025, 12, 31, 0, 0, 0).unwrap();

        assert_eq!(encode_expiry(&expiry), "expiry:2025-12-31T00:00:00Z");
        assert_eq!(decode_expiry(&[encode_expiry(&expiry)]), Some(expiry));
    }

    #[test]
    fn test_decode_expiry_normalizes_offsets_to_utc() {
        let decoded = decode_expiry(&tags(&["expiry:2025-06-01T12:00:00+02:00"]));

        assert_eq!(
            decoded,
            Some(Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_decode_expiry_malformed_or_missing() {
        assert_eq!(decode_expiry(&tags(&["expiry:next tuesday"])), None);
        assert_eq!(decode_expiry(&tags(&["owner:team-a"])), None);
        assert_eq!(decode_expiry(&[]), None);
    }

    #[test]
    fn test_update_expiry_keeps_a_single_tag() {
        let existing = tags(&["expiry:2024-01-01T00:00:00Z", "region:eu"]);
        let expiry = Utc.with_ymd_and_hms(2025, 12, 31, 0, 0, 0).unwrap();

        let updated = update_expiry(&existing, Some(&expiry));
        assert_eq!(updated, tags(&["region:eu", "expiry:2025-12-31T00:00:00Z"]));

        let cleared = update_expiry(&existing, None);
        assert_eq!(cleared, tags(&["region:eu"]));
    }

    #[test]
    fn test_metadata_and_expiry_round_trip_together() {
        let expiry = Utc.with_ymd_and_hms(2025, 12, 31, 0, 0, 0).unwrap();
        let meta = metadata(&[("owner", "team-a")]);

        let existing = tags(&["region:eu"]);
        let with_meta = update_metadata(&existing, &meta);
        let with_both = update_expiry(&with_meta, Some(&expiry));

        assert_eq!(decode_metadata(&with_both), meta);
        assert_eq!(decode_expiry(&with_both), Some(expiry));
        assert!(with_both.contains(&"region:eu".to_string()));
    }
}
