// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Storage boundary for classified requests and honeypot content.
//!
//! The engine only ever talks to the [`Store`] trait: one transactional
//! insert per request, plus honeypot lookups keyed by file name. Durable
//! backends live behind this seam; [`MemoryStore`] is the in-process
//! reference implementation used by the default deployment and the tests.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use hyper::body::Bytes;
use tokio::sync::Mutex;

use crate::request::{Classification, RequestDescriptor};

/// Storage operations the engine depends on.
///
/// Implementations must be `Send + Sync` so they can be stored in an
/// `Arc<dyn Store>` and shared across request tasks. `insert_request` must be
/// all-or-nothing: on error, no partial record may remain visible.
#[async_trait]
pub trait Store: Send + Sync {
    /// Durably record a classified request, returning its assigned id.
    async fn insert_request(
        &self,
        request: &RequestDescriptor,
        classification: &Classification,
    ) -> Result<i64>;

    /// Fetch honeypot content registered under `file_name`, if any.
    async fn honeypot(&self, file_name: &str) -> Result<Option<Bytes>>;
}

/// A request record as kept by [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct StoredRequest {
    pub id: i64,
    pub request: RequestDescriptor,
    pub classification: Classification,
}

/// Per-actor aggregate, keyed by resolved origin address.
#[derive(Debug, Clone)]
pub struct ActorRecord {
    pub request_count: u64,
    pub total_threat: u64,
    pub last_seen: DateTime<Local>,
}

impl ActorRecord {
    /// Mean threat level across everything this actor has sent.
    pub fn average_threat(&self) -> u8 {
        if self.request_count == 0 {
            return 0;
        }
        (self.total_threat / self.request_count) as u8
    }
}

struct Inner {
    requests: VecDeque<StoredRequest>,
    max_requests: usize,
    next_id: i64,
    actors: HashMap<String, ActorRecord>,
    honeypots: HashMap<String, Bytes>,
}

/// In-memory store: a bounded ring buffer of request records (oldest evicted
/// when full), an actor table upserted on every insert, and the honeypot map.
///
/// All state sits behind one lock, so each insert is trivially atomic.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new(max_requests: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                requests: VecDeque::with_capacity(max_requests),
                max_requests,
                next_id: 1,
                actors: HashMap::new(),
                honeypots: HashMap::new(),
            }),
        }
    }

    /// Register decoy content under a file name. The first registration for
    /// a name wins; returns false when the name was already taken.
    pub async fn register_honeypot(&self, file_name: &str, content: impl Into<Bytes>) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.honeypots.contains_key(file_name) {
            return false;
        }
        inner.honeypots.insert(file_name.to_string(), content.into());
        true
    }

    /// Load every regular file in `dir` as honeypot content keyed by its
    /// file name. A missing directory is not an error; the deployment just
    /// runs without decoys.
    pub async fn load_decoys<P: AsRef<Path>>(&self, dir: P) -> Result<usize> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            tracing::warn!("decoy directory {} does not exist, no honeypots registered", dir.display());
            return Ok(0);
        }
        let mut loaded = 0;
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read decoy directory: {}", dir.display()))?;
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let content = std::fs::read(entry.path())
                .with_context(|| format!("Failed to read decoy file: {}", entry.path().display()))?;
            if self.register_honeypot(&name, content).await {
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    /// The most recent `n` records, oldest first.
    pub async fn recent(&self, n: usize) -> Vec<StoredRequest> {
        let inner = self.inner.lock().await;
        let skip = inner.requests.len().saturating_sub(n);
        inner.requests.iter().skip(skip).cloned().collect()
    }

    pub async fn request_count(&self) -> usize {
        self.inner.lock().await.requests.len()
    }

    pub async fn actor_count(&self) -> usize {
        self.inner.lock().await.actors.len()
    }

    pub async fn actor(&self, address: &str) -> Option<ActorRecord> {
        self.inner.lock().await.actors.get(address).cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_request(
        &self,
        request: &RequestDescriptor,
        classification: &Classification,
    ) -> Result<i64> {
        let mut inner = self.inner.lock().await;
        let id = inner.next_id;
        inner.next_id += 1;

        let address = request.host.address().to_string();
        let actor = inner.actors.entry(address).or_insert(ActorRecord {
            request_count: 0,
            total_threat: 0,
            last_seen: request.timestamp,
        });
        actor.request_count += 1;
        actor.total_threat += u64::from(classification.threat_level);
        actor.last_seen = request.timestamp;

        if inner.requests.len() >= inner.max_requests {
            inner.requests.pop_front();
        }
        inner.requests.push_back(StoredRequest {
            id,
            request: request.clone(),
            classification: classification.clone(),
        });
        Ok(id)
    }

    async fn honeypot(&self, file_name: &str) -> Result<Option<Bytes>> {
        Ok(self.inner.lock().await.honeypots.get(file_name).cloned())
    }
}
