// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Deceptive response decisions.
//!
//! One [`Responder::handle`] call per fallthrough request: resolve the
//! caller's origin, classify, record, then pick a response plan. The record
//! must land in storage before any plan is chosen; a request that cannot be
//! recorded gets no deceptive response at all, only an error back to the
//! HTTP layer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hyper::body::Bytes;
use serde_json::{Map, Value};

use crate::classifier;
use crate::config::TarpitConfig;
use crate::flags::FlagCorpus;
use crate::origin::OriginResolver;
use crate::request::{RemoteHost, RequestDescriptor, RequestMethod};
use crate::store::Store;

/// Marker text repeated to fill each tarpit chunk.
pub const HALT_MARKER: &str = "STOP SCANNING";
/// Suspension between tarpit chunks.
pub const TARPIT_INTERVAL: Duration = Duration::from_secs(1);

/// What the HTTP layer should send back for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePlan {
    /// Plain 404, revealing nothing.
    Reject404,
    /// Serve registered decoy content verbatim with a 200.
    HoneypotReplay(Bytes),
    /// Throttled stream: emit `chunk`, suspend `interval`, repeat up to
    /// `max_chunks` times or until the peer goes away.
    Tarpit {
        chunk: Bytes,
        interval: Duration,
        max_chunks: u32,
    },
    /// 200 with no body.
    Empty200,
}

/// Per-process decision engine. Holds only immutable state, so a single
/// instance serves all request tasks concurrently without locking.
pub struct Responder {
    corpus: Arc<FlagCorpus>,
    store: Arc<dyn Store>,
    resolver: OriginResolver,
    tarpit_enabled: bool,
    max_chunks: u32,
    tarpit_chunk: Bytes,
    port: u16,
}

impl Responder {
    pub fn new(corpus: Arc<FlagCorpus>, store: Arc<dyn Store>, tarpit: &TarpitConfig, port: u16) -> Self {
        // Built once and handed to streams as a refcounted slice.
        let tarpit_chunk = if tarpit.enabled {
            Bytes::from(HALT_MARKER.repeat(1024).repeat(1024))
        } else {
            Bytes::new()
        };
        Self {
            corpus,
            store,
            resolver: OriginResolver::new(),
            tarpit_enabled: tarpit.enabled,
            max_chunks: tarpit.max_chunks,
            tarpit_chunk,
            port,
        }
    }

    /// Classify, record, and decide the response for one fallthrough request.
    ///
    /// Fails only when the insert fails; the HTTP layer maps that to a
    /// generic server error.
    pub async fn handle(
        &self,
        headers: HashMap<String, String>,
        method: &str,
        observed_address: &str,
        path: &str,
        query: Option<String>,
        body: Option<Map<String, Value>>,
    ) -> Result<ResponsePlan> {
        let address = self.resolver.resolve(&headers, observed_address);
        let mut request = RequestDescriptor::new(
            RemoteHost::new(address),
            RequestMethod::from_str(method),
            headers,
            path,
            query,
            body,
            self.port,
        );
        let classification = classifier::classify(&request, &self.corpus);

        // Fail closed: no deceptive response for a record that did not land.
        let id = self
            .store
            .insert_request(&request, &classification)
            .await
            .context("failed to record fallthrough request")?;
        request.request_id = Some(id);

        tracing::info!(
            "request {} from {}: {} {} threat={} tags={}",
            id,
            request.host,
            request.method,
            request.path,
            classification.threat_level,
            classification
                .request_types
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(",")
        );

        if request.is_acceptable() {
            return Ok(ResponsePlan::Reject404);
        }

        if let Some(content) = self.store.honeypot(request.payload_file()).await? {
            tracing::info!("replaying honeypot {} to {}", request.payload_file(), request.host);
            return Ok(ResponsePlan::HoneypotReplay(content));
        }

        if self.tarpit_enabled {
            if self.max_chunks == 0 {
                return Ok(ResponsePlan::Empty200);
            }
            tracing::info!("tarpitting {} for up to {} chunks", request.host, self.max_chunks);
            return Ok(ResponsePlan::Tarpit {
                chunk: self.tarpit_chunk.clone(),
                interval: TARPIT_INTERVAL,
                max_chunks: self.max_chunks,
            });
        }

        Ok(ResponsePlan::Reject404)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Classification;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    /// Minimal store double: canned honeypots, optional insert failure, and
    /// a log of what was inserted.
    struct MockStore {
        honeypots: HashMap<String, Bytes>,
        fail_insert: bool,
        inserted: Mutex<Vec<(String, Classification)>>,
    }

    impl MockStore {
        fn new() -> Self {
            Self {
                honeypots: HashMap::new(),
                fail_insert: false,
                inserted: Mutex::new(Vec::new()),
            }
        }

        fn with_honeypot(mut self, name: &str, content: &str) -> Self {
            self.honeypots.insert(name.to_string(), Bytes::from(content.to_string()));
            self
        }

        fn failing() -> Self {
            Self {
                fail_insert: true,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl Store for MockStore {
        async fn insert_request(
            &self,
            request: &RequestDescriptor,
            classification: &Classification,
        ) -> Result<i64> {
            if self.fail_insert {
                anyhow::bail!("storage unavailable");
            }
            let mut inserted = self.inserted.lock().await;
            inserted.push((request.host.address().to_string(), classification.clone()));
            Ok(inserted.len() as i64)
        }

        async fn honeypot(&self, file_name: &str) -> Result<Option<Bytes>> {
            Ok(self.honeypots.get(file_name).cloned())
        }
    }

    fn responder(store: Arc<MockStore>, enabled: bool, max_chunks: u32) -> Responder {
        Responder::new(
            Arc::new(FlagCorpus::default()),
            store,
            &TarpitConfig { enabled, max_chunks },
            8080,
        )
    }

    #[tokio::test]
    async fn acceptable_request_is_rejected_but_still_recorded() {
        let store = Arc::new(MockStore::new());
        let r = responder(store.clone(), true, 10);
        let plan = r
            .handle(HashMap::new(), "GET", "203.0.113.7", "/", None, None)
            .await
            .unwrap();
        assert_eq!(plan, ResponsePlan::Reject404);

        let inserted = store.inserted.lock().await;
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].1.threat_level, 3);
    }

    #[tokio::test]
    async fn honeypot_replay_takes_precedence_over_tarpit() {
        let store = Arc::new(MockStore::new().with_honeypot("config.php", "dummy"));
        let r = responder(store, true, 10);
        let plan = r
            .handle(HashMap::new(), "GET", "203.0.113.7", "/site/config.php", None, None)
            .await
            .unwrap();
        assert_eq!(plan, ResponsePlan::HoneypotReplay(Bytes::from("dummy")));
    }

    #[tokio::test]
    async fn tarpit_when_halt_mode_is_enabled() {
        let store = Arc::new(MockStore::new());
        let r = responder(store, true, 3);
        let plan = r
            .handle(HashMap::new(), "GET", "203.0.113.7", "/scan-me", None, None)
            .await
            .unwrap();
        match plan {
            ResponsePlan::Tarpit { chunk, interval, max_chunks } => {
                assert_eq!(chunk.len(), HALT_MARKER.len() * 1024 * 1024);
                assert_eq!(interval, Duration::from_secs(1));
                assert_eq!(max_chunks, 3);
            }
            other => panic!("expected tarpit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reject_when_halt_mode_is_disabled() {
        let store = Arc::new(MockStore::new());
        let r = responder(store, false, 10);
        let plan = r
            .handle(HashMap::new(), "GET", "203.0.113.7", "/scan-me", None, None)
            .await
            .unwrap();
        assert_eq!(plan, ResponsePlan::Reject404);
    }

    #[tokio::test]
    async fn zero_chunk_ceiling_degenerates_to_empty_200() {
        let store = Arc::new(MockStore::new());
        let r = responder(store, true, 0);
        let plan = r
            .handle(HashMap::new(), "GET", "203.0.113.7", "/scan-me", None, None)
            .await
            .unwrap();
        assert_eq!(plan, ResponsePlan::Empty200);
    }

    #[tokio::test]
    async fn insert_failure_aborts_without_a_plan() {
        let store = Arc::new(MockStore::failing());
        let r = responder(store.clone(), true, 10);
        let result = r
            .handle(HashMap::new(), "GET", "203.0.113.7", "/scan-me", None, None)
            .await;
        assert!(result.is_err());
        assert!(store.inserted.lock().await.is_empty());
    }

    #[tokio::test]
    async fn recorded_actor_uses_the_resolved_origin() {
        let store = Arc::new(MockStore::new());
        let r = responder(store.clone(), false, 10);
        let headers: HashMap<String, String> = [
            ("X-Forwarded-For", "203.0.113.44"),
            ("Cf-Ray", "8a1b2c3d4e5f6789-LHR"),
            ("Cf-Connecting-Ip", "198.51.100.9"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        r.handle(headers, "GET", "10.0.0.1", "/probe", None, None).await.unwrap();
        let inserted = store.inserted.lock().await;
        assert_eq!(inserted[0].0, "198.51.100.9");
    }
}
