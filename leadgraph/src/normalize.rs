//! URL/domain normalization, with the idempotence property
//! `N(N(u)) = N(u)` that every downstream cache key depends on.

/// Normalize a user-supplied URL or bare domain into a canonical domain
/// string: lowercased, `https://` scheme implied (but not stored — callers
/// that need a dereferenceable URL should use [`to_https_url`]), no
/// leading `www.`, no trailing slash.
///
/// This is intentionally idempotent: `normalize_domain(normalize_domain(u))
/// == normalize_domain(u)` for every `u`.
#[must_use]
pub fn normalize_domain(input: &str) -> String {
    let trimmed = input.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let without_www = without_scheme
        .strip_prefix("www.")
        .unwrap_or(without_scheme);
    let without_trailing_slash = without_www.trim_end_matches('/');
    let without_path = without_trailing_slash
        .split_once('/')
        .map_or(without_trailing_slash, |(host, _)| host);
    without_path.to_ascii_lowercase()
}

/// Build a dereferenceable HTTPS URL from a normalized domain, prepending
/// the scheme every adapter expects to see on the wire.
#[must_use]
pub fn to_https_url(domain: &str) -> String {
    format!("https://{}", normalize_domain(domain))
}

/// Deterministic cache key for an enrichment session: `sha256(domain \|
/// email_bucket)`. `email_bucket` buckets by domain only (the part after
/// `@`) so that two requesters at the same company share a cache entry
/// while remaining distinct from unrelated personal emails.
#[must_use]
pub fn enrichment_cache_key(domain: &str, requester_email: &str) -> String {
    use sha2::{Digest, Sha256};

    let normalized_domain = normalize_domain(domain);
    let email_bucket = requester_email
        .rsplit_once('@')
        .map_or_else(|| requester_email.to_ascii_lowercase(), |(_, host)| host.to_ascii_lowercase());

    let mut hasher = Sha256::new();
    hasher.update(normalized_domain.as_bytes());
    hasher.update(b"|");
    hasher.update(email_bucket.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn equivalent_inputs_normalize_identically() {
        let expected = "google.com";
        for input in [
            "google.com",
            "https://google.com",
            "http://google.com",
            "www.google.com",
            "https://www.google.com/",
        ] {
            assert_eq!(normalize_domain(input), expected, "input={input}");
        }
    }

    #[test]
    fn idempotent_on_already_normalized_input() {
        for input in ["google.com", "https://google.com", "www.google.com"] {
            let once = normalize_domain(input);
            let twice = normalize_domain(&once);
            assert_eq!(once, twice);
        }
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent_for_any_ascii_host(s in "[a-zA-Z0-9.\\-]{1,40}") {
            let once = normalize_domain(&s);
            let twice = normalize_domain(&once);
            prop_assert_eq!(once, twice);
        }
    }

    #[test]
    fn cache_key_is_stable_across_url_variants() {
        let a = enrichment_cache_key("google.com", "user@example.com");
        let b = enrichment_cache_key("https://www.google.com/", "user@example.com");
        assert_eq!(a, b);
    }
}
