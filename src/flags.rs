// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Indicator corpus: textual flags with threat weights and tag sets.
//!
//! The corpus is a JSON document with two arrays, `payload` (matched against
//! request paths and query strings) and `user_agent` (matched against the
//! User-Agent header). It is loaded once at startup and never mutated, so it
//! can be shared across concurrent classifications without locking.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// What a matched indicator says the caller is trying to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Scan,
    Recon,
    Attack,
    Grab,
    ProxyAttempt,
    Other,
}

impl RequestType {
    /// Parse a tag from its wire name. Unrecognized values fall back to `Other`.
    pub fn from_str(s: &str) -> Self {
        match s {
            "SCAN" => RequestType::Scan,
            "RECON" => RequestType::Recon,
            "ATTACK" => RequestType::Attack,
            "GRAB" => RequestType::Grab,
            "PROXY_ATTEMPT" => RequestType::ProxyAttempt,
            _ => RequestType::Other,
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestType::Scan => write!(f, "SCAN"),
            RequestType::Recon => write!(f, "RECON"),
            RequestType::Attack => write!(f, "ATTACK"),
            RequestType::Grab => write!(f, "GRAB"),
            RequestType::ProxyAttempt => write!(f, "PROXY_ATTEMPT"),
            RequestType::Other => write!(f, "OTHER"),
        }
    }
}

/// The exploit class a matched indicator points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackType {
    Rce,
    Sqli,
    Xss,
    Lfi,
    Rfi,
    WebappVuln,
    Multiple,
    Other,
    None,
}

impl AttackType {
    /// Parse a tag from its wire name. Unrecognized values fall back to `Other`.
    pub fn from_str(s: &str) -> Self {
        match s {
            "RCE" => AttackType::Rce,
            "SQLI" => AttackType::Sqli,
            "XSS" => AttackType::Xss,
            "LFI" => AttackType::Lfi,
            "RFI" => AttackType::Rfi,
            "WEBAPP_VULN" => AttackType::WebappVuln,
            "MULTIPLE" => AttackType::Multiple,
            "NONE" => AttackType::None,
            _ => AttackType::Other,
        }
    }
}

impl fmt::Display for AttackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttackType::Rce => write!(f, "RCE"),
            AttackType::Sqli => write!(f, "SQLI"),
            AttackType::Xss => write!(f, "XSS"),
            AttackType::Lfi => write!(f, "LFI"),
            AttackType::Rfi => write!(f, "RFI"),
            AttackType::WebappVuln => write!(f, "WEBAPP_VULN"),
            AttackType::Multiple => write!(f, "MULTIPLE"),
            AttackType::Other => write!(f, "OTHER"),
            AttackType::None => write!(f, "NONE"),
        }
    }
}

/// One textual indicator. Matching is plain substring containment of `text`
/// inside the target string.
#[derive(Debug, Clone)]
pub struct Flag {
    pub text: String,
    pub score: i64,
    pub request_types: Vec<RequestType>,
    pub attack_types: Option<Vec<AttackType>>,
}

// Deserialization structs for the corpus JSON document.

#[derive(Debug, Deserialize)]
struct CorpusFile {
    payload: Vec<FlagEntry>,
    user_agent: Vec<FlagEntry>,
}

#[derive(Debug, Deserialize)]
struct FlagEntry {
    flag: String,
    score: i64,
    request_types: Vec<String>,
    attack_types: Option<Vec<String>>,
}

/// The loaded indicator corpus, split by what each flag is matched against.
#[derive(Debug, Default)]
pub struct FlagCorpus {
    pub payload_flags: Vec<Flag>,
    pub user_agent_flags: Vec<Flag>,
}

impl FlagCorpus {
    /// Load the corpus from a JSON file.
    ///
    /// A missing file is not fatal (the listener still records and responds,
    /// it just scores without indicator signal), but a file that exists and
    /// fails to parse is an error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!("flag corpus not found at {}, starting with an empty corpus", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read flag corpus: {}", path.display()))?;
        Self::from_document(&content)
            .with_context(|| format!("Failed to parse flag corpus: {}", path.display()))
    }

    /// Parse a corpus from its JSON text.
    pub fn from_document(document: &str) -> Result<Self> {
        let raw: CorpusFile = serde_json::from_str(document)?;
        Ok(Self {
            payload_flags: raw.payload.into_iter().map(convert_entry).collect(),
            user_agent_flags: raw.user_agent.into_iter().map(convert_entry).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.payload_flags.len() + self.user_agent_flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload_flags.is_empty() && self.user_agent_flags.is_empty()
    }
}

fn convert_entry(entry: FlagEntry) -> Flag {
    Flag {
        text: entry.flag,
        score: entry.score,
        request_types: entry.request_types.iter().map(|s| RequestType::from_str(s)).collect(),
        attack_types: entry
            .attack_types
            .map(|types| types.iter().map(|s| AttackType::from_str(s)).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "payload": [
            {"flag": "wp-login", "score": 8, "request_types": ["SCAN"], "attack_types": ["WEBAPP_VULN"]},
            {"flag": "/etc/passwd", "score": 9, "request_types": ["ATTACK"], "attack_types": ["LFI"]}
        ],
        "user_agent": [
            {"flag": "sqlmap", "score": 10, "request_types": ["ATTACK"], "attack_types": ["SQLI"]},
            {"flag": "zgrab", "score": 6, "request_types": ["SCAN", "GRAB"]}
        ]
    }"#;

    #[test]
    fn parses_both_flag_collections() {
        let corpus = FlagCorpus::from_document(SAMPLE).unwrap();
        assert_eq!(corpus.payload_flags.len(), 2);
        assert_eq!(corpus.user_agent_flags.len(), 2);
        assert_eq!(corpus.len(), 4);
        assert!(!corpus.is_empty());
    }

    #[test]
    fn entry_without_attack_types_has_none() {
        let corpus = FlagCorpus::from_document(SAMPLE).unwrap();
        let zgrab = &corpus.user_agent_flags[1];
        assert_eq!(zgrab.text, "zgrab");
        assert!(zgrab.attack_types.is_none());
        assert_eq!(zgrab.request_types, vec![RequestType::Scan, RequestType::Grab]);
    }

    #[test]
    fn unknown_tags_fall_back_to_other() {
        assert_eq!(RequestType::from_str("NOVEL"), RequestType::Other);
        assert_eq!(AttackType::from_str("NOVEL"), AttackType::Other);
    }

    #[test]
    fn tag_display_round_trips_wire_names() {
        for tag in ["SCAN", "RECON", "ATTACK", "GRAB", "PROXY_ATTEMPT", "OTHER"] {
            assert_eq!(RequestType::from_str(tag).to_string(), tag);
        }
        for tag in ["RCE", "SQLI", "XSS", "LFI", "RFI", "WEBAPP_VULN", "MULTIPLE", "OTHER", "NONE"] {
            assert_eq!(AttackType::from_str(tag).to_string(), tag);
        }
    }

    #[test]
    fn missing_file_yields_empty_corpus() {
        let corpus = FlagCorpus::load("/nonexistent/flags.json").unwrap();
        assert!(corpus.is_empty());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{\"payload\": [,]}").unwrap();
        assert!(FlagCorpus::load(file.path()).is_err());
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let corpus = FlagCorpus::load(file.path()).unwrap();
        assert_eq!(corpus.payload_flags[0].score, 8);
    }
}
