// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! True-origin resolution for requests arriving through a proxy chain.
//!
//! Forwarding headers are attacker-controlled, so they are distrusted unless
//! the full set a CDN edge hop would attach is present. Resolution never
//! fails; anything malformed degrades to the observed peer address.

use std::collections::HashMap;

use regex::Regex;

/// Headers that must all be present before any override is considered: the
/// generic forwarding address plus the two CDN edge headers.
const REQUIRED_PROXY_HEADERS: [&str; 3] = ["x-forwarded-for", "cf-ray", "cf-connecting-ip"];

pub struct OriginResolver {
    ipv4: Regex,
}

impl OriginResolver {
    pub fn new() -> Self {
        // Dotted quad only, no octet range validation.
        Self {
            ipv4: Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$").unwrap(),
        }
    }

    /// Derive the caller's address from `headers`, keeping `observed` unless
    /// every required proxy header is present and the selected candidate is a
    /// well-formed dotted quad.
    pub fn resolve(&self, headers: &HashMap<String, String>, observed: &str) -> String {
        let lookup = |name: &str| {
            headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        };

        if REQUIRED_PROXY_HEADERS.iter().any(|h| lookup(h).is_none()) {
            return observed.to_string();
        }

        // Guarded above; both lookups are present.
        let connecting_ip = lookup("cf-connecting-ip").unwrap_or(observed);
        let forwarded_for = lookup("x-forwarded-for").unwrap_or(observed);
        let candidate = if connecting_ip != forwarded_for {
            connecting_ip
        } else {
            forwarded_for
        };

        if self.ipv4.is_match(candidate) {
            candidate.to_string()
        } else {
            observed.to_string()
        }
    }
}

impl Default for OriginResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn full_chain(connecting: &str, forwarded: &str) -> HashMap<String, String> {
        headers(&[
            ("X-Forwarded-For", forwarded),
            ("Cf-Ray", "8a1b2c3d4e5f6789-LHR"),
            ("Cf-Connecting-Ip", connecting),
        ])
    }

    #[test]
    fn override_requires_all_three_headers() {
        let resolver = OriginResolver::new();
        let partial = headers(&[("X-Forwarded-For", "198.51.100.9"), ("Cf-Ray", "abc-LHR")]);
        assert_eq!(resolver.resolve(&partial, "10.0.0.1"), "10.0.0.1");
        assert_eq!(resolver.resolve(&HashMap::new(), "10.0.0.1"), "10.0.0.1");
    }

    #[test]
    fn prefers_the_cdn_connecting_ip() {
        let resolver = OriginResolver::new();
        let h = full_chain("198.51.100.9", "203.0.113.44");
        assert_eq!(resolver.resolve(&h, "10.0.0.1"), "198.51.100.9");
    }

    #[test]
    fn identical_candidates_fall_back_to_forwarded_for() {
        let resolver = OriginResolver::new();
        let h = full_chain("198.51.100.9", "198.51.100.9");
        assert_eq!(resolver.resolve(&h, "10.0.0.1"), "198.51.100.9");
    }

    #[test]
    fn malformed_candidate_keeps_observed_address() {
        let resolver = OriginResolver::new();
        for bad in ["not-an-ip", "198.51.100", "198.51.100.9.7", "1234.1.1.1", "198.51.100.9 extra", ""] {
            let h = full_chain(bad, "203.0.113.44");
            assert_eq!(resolver.resolve(&h, "10.0.0.1"), "10.0.0.1", "candidate {bad:?} should be rejected");
        }
    }

    #[test]
    fn no_octet_range_validation_is_applied() {
        // 999.999.999.999 is a syntactically valid dotted quad for this check.
        let resolver = OriginResolver::new();
        let h = full_chain("999.999.999.999", "203.0.113.44");
        assert_eq!(resolver.resolve(&h, "10.0.0.1"), "999.999.999.999");
    }

    #[test]
    fn header_names_match_case_insensitively() {
        let resolver = OriginResolver::new();
        let h = headers(&[
            ("x-forwarded-for", "203.0.113.44"),
            ("CF-RAY", "abc-LHR"),
            ("cf-connecting-ip", "198.51.100.9"),
        ]);
        assert_eq!(resolver.resolve(&h, "10.0.0.1"), "198.51.100.9");
    }
}
