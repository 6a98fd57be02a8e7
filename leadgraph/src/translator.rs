//! Field Translator (C5) — the single authority on the canonical schema
//! exposed to every consumer.
//!
//! Applied at exactly three emission points plus one read path (L1-emit,
//! L2-emit, L3-emit, "get current session") — see
//! [`crate::enrichment::orchestrator`] and
//! [`crate::session_loader`]. Centralizing the map here, and calling
//! [`translate_fields`] rather than reimplementing the mapping at each
//! site, is what keeps those four call sites from drifting out of sync.

use std::sync::LazyLock;

use rustc_hash::FxHashMap;
use serde_json::Value;

/// `source_native_key -> canonical_key`.
static CANONICAL_MAP: LazyLock<FxHashMap<&'static str, &'static str>> = LazyLock::new(|| {
    FxHashMap::from_iter([
        ("company_name", "name"),
        ("business_name", "name"),
        ("legal_name", "legal_name"),
        ("region", "state"),
        ("state", "state"),
        ("city", "city"),
        ("country", "country"),
        ("ai_industry", "industry"),
        ("ai_company_size", "companySize"),
        ("employee_count", "employeeCount"),
        ("founded_year", "foundedYear"),
        ("linkedin_url", "linkedinUrl"),
        ("description", "description"),
        ("phone", "phone"),
        ("address", "address"),
        ("rating", "rating"),
        ("reviews_count", "reviewsCount"),
    ])
});

/// The closed canonical field set (spec section 4.5's table), in no
/// particular order. Used wherever a caller needs every field the
/// confidence-penalty term (section 4.4) might apply to, rather than only
/// the ones a given session happens to populate.
pub const CANONICAL_FIELDS: &[&str] = &[
    "name",
    "legal_name",
    "state",
    "city",
    "country",
    "industry",
    "companySize",
    "employeeCount",
    "foundedYear",
    "linkedinUrl",
    "description",
    "phone",
    "address",
    "rating",
    "reviewsCount",
];

/// Translate one source-native field name into its canonical form.
///
/// Any `ai_*` prefix is stripped, `snake_case` becomes `lowerCamelCase`,
/// and unknown keys pass through unchanged (forward compatibility, but not
/// part of the documented contract).
#[must_use]
pub fn translate_key(raw: &str) -> String {
    if let Some(&canonical) = CANONICAL_MAP.get(raw) {
        return canonical.to_string();
    }
    let stripped = raw.strip_prefix("ai_").unwrap_or(raw);
    snake_to_lower_camel(stripped)
}

fn snake_to_lower_camel(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut capitalize_next = false;
    for ch in s.chars() {
        if ch == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            out.extend(ch.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Translate every key in a field map. A total function on the canonical
/// map, and the identity on unknown keys.
#[must_use]
pub fn translate_fields(fields: &FxHashMap<String, Value>) -> FxHashMap<String, Value> {
    fields
        .iter()
        .map(|(k, v)| (translate_key(k), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_ai_prefix_and_camel_cases() {
        assert_eq!(translate_key("ai_industry"), "industry");
        assert_eq!(translate_key("ai_company_size"), "companySize");
    }

    #[test]
    fn maps_known_source_native_aliases() {
        assert_eq!(translate_key("company_name"), "name");
        assert_eq!(translate_key("region"), "state");
        assert_eq!(translate_key("employee_count"), "employeeCount");
    }

    #[test]
    fn passes_through_unknown_keys_camel_cased() {
        assert_eq!(translate_key("some_future_field"), "someFutureField");
    }

    #[test]
    fn regression_layer3_payload_exactly_matches_canonical_keys() {
        let mut raw = FxHashMap::default();
        raw.insert("company_name".to_string(), json!("X"));
        raw.insert("region".to_string(), json!("SP"));
        raw.insert("ai_industry".to_string(), json!("Tech"));
        raw.insert("employee_count".to_string(), json!(250));

        let translated = translate_fields(&raw);
        assert_eq!(translated.get("name"), Some(&json!("X")));
        assert_eq!(translated.get("state"), Some(&json!("SP")));
        assert_eq!(translated.get("industry"), Some(&json!("Tech")));
        assert_eq!(translated.get("employeeCount"), Some(&json!(250)));
        assert!(!translated.contains_key("company_name"));
        assert!(!translated.contains_key("region"));
        assert!(!translated.keys().any(|k| k.starts_with("ai_")));
    }
}
