// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Threat scoring engine.
//!
//! Classifies a fallthrough request against the indicator corpus: five
//! independent sub-scores (method, URI, query string, body, User-Agent) are
//! averaged into a 0–10 threat level, and every tag emitted by a matched
//! flag is ranked by how often it matched. Pure and total: no I/O, no
//! failure modes, safe to run concurrently against the shared corpus.

use std::cmp::Reverse;

use crate::flags::{AttackType, Flag, FlagCorpus, RequestType};
use crate::request::{Classification, RequestDescriptor, RequestMethod};

/// Sub-score used when a signal is absent entirely (no query string, no
/// User-Agent header).
const NO_SIGNAL_SCORE: f64 = 5.0;
/// Sub-score for a path that exists but matches no indicator.
const UNMATCHED_URI_SCORE: f64 = 6.0;

/// Classify one request against the corpus.
///
/// CONNECT carries no special weight here: it scores through the generic
/// method branch like GET or HEAD.
pub fn classify(req: &RequestDescriptor, corpus: &FlagCorpus) -> Classification {
    let mut request_tags: Vec<RequestType> = Vec::new();
    let mut attack_tags: Vec<AttackType> = Vec::new();

    let ua_score = match req.header("user-agent") {
        Some(ua) => {
            let outcome = match_flags(ua, &corpus.user_agent_flags);
            request_tags.extend_from_slice(&outcome.request_types);
            attack_tags.extend_from_slice(&outcome.attack_types);
            outcome.score
        }
        None => NO_SIGNAL_SCORE,
    };

    let method_score = match req.method {
        RequestMethod::Post | RequestMethod::Put => 10.0,
        RequestMethod::Delete | RequestMethod::Patch | RequestMethod::Pri => 8.0,
        _ => 6.0,
    };

    let uri_score = if req.path == "/" {
        0.0
    } else {
        let outcome = match_flags(&req.path, &corpus.payload_flags);
        if outcome.matched == 0 {
            UNMATCHED_URI_SCORE
        } else {
            request_tags.extend_from_slice(&outcome.request_types);
            attack_tags.extend_from_slice(&outcome.attack_types);
            outcome.score
        }
    };

    let query_score = match req.query.as_deref() {
        Some(query) if !query.is_empty() => {
            let outcome = match_flags(query, &corpus.payload_flags);
            request_tags.extend_from_slice(&outcome.request_types);
            attack_tags.extend_from_slice(&outcome.attack_types);
            outcome.score
        }
        _ => NO_SIGNAL_SCORE,
    };

    let body_score = if req.has_body() { 10.0 } else { 0.0 };

    let mean = (method_score + uri_score + query_score + body_score + ua_score) / 5.0;
    let threat_level = mean.round_ties_even().clamp(0.0, 10.0) as u8;

    let mut request_types = rank_tags(&request_tags);
    if request_types.is_empty() {
        request_types.push(RequestType::Other);
    }

    Classification {
        threat_level,
        request_types,
        attack_types: rank_tags(&attack_tags),
    }
}

struct FlagMatches {
    /// sum(score) / matched, or 0.0 when nothing matched.
    score: f64,
    matched: usize,
    request_types: Vec<RequestType>,
    attack_types: Vec<AttackType>,
}

/// The single scoring primitive: average the scores of every flag whose text
/// is contained in `target`, collecting the tags they emit.
fn match_flags(target: &str, flags: &[Flag]) -> FlagMatches {
    let mut total = 0i64;
    let mut matched = 0usize;
    let mut request_types = Vec::new();
    let mut attack_types = Vec::new();

    for flag in flags {
        if !target.contains(&flag.text) {
            continue;
        }
        total += flag.score;
        matched += 1;
        request_types.extend_from_slice(&flag.request_types);
        if let Some(attacks) = &flag.attack_types {
            attack_types.extend_from_slice(attacks);
        }
    }

    FlagMatches {
        score: if matched > 0 { total as f64 / matched as f64 } else { 0.0 },
        matched,
        request_types,
        attack_types,
    }
}

/// Dedup a tag multiset into a list ordered by descending match frequency.
/// The sort is stable, so equal-frequency tags keep first-appearance order.
fn rank_tags<T: PartialEq + Copy>(raw: &[T]) -> Vec<T> {
    let mut deduped: Vec<T> = Vec::new();
    for tag in raw {
        if !deduped.contains(tag) {
            deduped.push(*tag);
        }
    }
    deduped.sort_by_key(|tag| Reverse(raw.iter().filter(|t| *t == tag).count()));
    deduped
}
