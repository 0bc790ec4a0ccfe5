// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Per-client submission counters.
//!
//! A client may submit `max_submissions` times; the counter resets once a
//! full window has passed since its last admitted submission. A limited
//! attempt does not refresh `last_seen`.
//!
//! [`MemoryRateStore`] spreads clients over independently locked shards so
//! updates to one identifier are serialized while other identifiers carry
//! on. It is bounded: expired entries are swept periodically, and a full
//! shard evicts a client before admitting a new one. Clients still under
//! their quota go first, least recent attempt first, so a flood of fresh
//! identifiers cannot reset a client that is currently limited.

use crate::config::RateLimitConfig;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const DEFAULT_SHARDS: usize = 16;

/// Counter state for one client identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateEntry {
    /// Last admitted submission; the window counts from here
    pub last_seen: DateTime<Utc>,
    /// Last attempt, admitted or limited
    pub last_attempt: DateTime<Utc>,
    pub count: u32,
}

/// Result of recording a submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateOutcome {
    /// Attempt counted; `count` submissions so far in this window
    Admitted { count: u32 },
    /// Over the limit until `retry_after` has passed
    Limited { retry_after: Duration },
}

/// Storage for per-client rate state.
///
/// `hit` must be atomic per client identifier.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Current entry for a client, if tracked.
    async fn get(&self, client_id: &str) -> Option<RateEntry>;

    /// Record an attempt at `now` and decide whether it is admitted.
    async fn hit(&self, client_id: &str, now: DateTime<Utc>) -> RateOutcome;

    /// Drop entries whose window has elapsed. Returns how many were removed.
    async fn sweep(&self, now: DateTime<Utc>) -> usize;

    /// Number of tracked clients.
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Bounded in-memory [`RateStore`].
pub struct MemoryRateStore {
    window: Duration,
    max_submissions: u32,
    shard_capacity: usize,
    shards: Vec<Mutex<HashMap<String, RateEntry>>>,
}

impl MemoryRateStore {
    /// Create a store with the default shard count.
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_shards(config, DEFAULT_SHARDS)
    }

    /// Create a store with an explicit shard count.
    ///
    /// Capacity is divided evenly between shards, so the total bound is
    /// `max_tracked_clients` rounded up to a multiple of the shard count.
    pub fn with_shards(config: &RateLimitConfig, shards: usize) -> Self {
        let max_clients = config.max_tracked_clients.max(1);
        let shards = shards.clamp(1, max_clients);

        Self {
            window: config.window(),
            max_submissions: config.max_submissions,
            shard_capacity: max_clients.div_ceil(shards),
            shards: (0..shards).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, client_id: &str) -> &Mutex<HashMap<String, RateEntry>> {
        let mut hasher = DefaultHasher::new();
        client_id.hash(&mut hasher);
        let idx = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }

    fn expired(&self, entry: &RateEntry, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.last_seen) >= self.window
    }

    /// Make room for one new entry in a full shard.
    fn make_room(&self, shard: &mut HashMap<String, RateEntry>, now: DateTime<Utc>) {
        shard.retain(|_, entry| !self.expired(entry, now));
        if shard.len() < self.shard_capacity {
            return;
        }

        let victim = shard
            .iter()
            .min_by_key(|(_, entry)| (entry.count >= self.max_submissions, entry.last_attempt))
            .map(|(id, _)| id.clone());
        if let Some(id) = victim {
            warn!(client_id = %id, capacity = self.shard_capacity, "Rate store shard full, evicting client");
            shard.remove(&id);
        }
    }
}

#[async_trait]
impl RateStore for MemoryRateStore {
    async fn get(&self, client_id: &str) -> Option<RateEntry> {
        self.shard(client_id).lock().await.get(client_id).copied()
    }

    async fn hit(&self, client_id: &str, now: DateTime<Utc>) -> RateOutcome {
        let mut shard = self.shard(client_id).lock().await;

        if let Some(entry) = shard.get_mut(client_id) {
            entry.last_attempt = now;
            let elapsed = now.signed_duration_since(entry.last_seen).max(Duration::zero());
            if elapsed < self.window {
                if entry.count >= self.max_submissions {
                    let retry_after = self.window - elapsed;
                    debug!(%client_id, count = entry.count, retry_after_secs = retry_after.num_seconds(), "Client rate limited");
                    return RateOutcome::Limited { retry_after };
                }
                entry.count += 1;
            } else {
                entry.count = 1;
            }
            entry.last_seen = now;
            return RateOutcome::Admitted { count: entry.count };
        }

        if shard.len() >= self.shard_capacity {
            self.make_room(&mut shard, now);
        }

        if self.max_submissions == 0 {
            return RateOutcome::Limited {
                retry_after: self.window,
            };
        }

        shard.insert(
            client_id.to_string(),
            RateEntry {
                last_seen: now,
                last_attempt: now,
                count: 1,
            },
        );
        RateOutcome::Admitted { count: 1 }
    }

    async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        for shard in &self.shards {
            let mut shard = shard.lock().await;
            let before = shard.len();
            shard.retain(|_, entry| !self.expired(entry, now));
            removed += before - shard.len();
        }
        if removed > 0 {
            debug!(removed, "Swept expired rate entries");
        }
        removed
    }

    async fn len(&self) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.lock().await.len();
        }
        total
    }
}
