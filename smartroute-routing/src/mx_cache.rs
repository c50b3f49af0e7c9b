//! Time-bounded memoisation of MX lookups
//!
//! Every answer is cached for `ttl`, including empty answers produced by a
//! failed lookup, so a nonexistent domain costs one DNS query per TTL window.
//! Concurrent misses for the same domain may both query DNS; the later insert
//! simply replaces the earlier one.
//!
//! Expired entries are never served, but they are only removed from memory by
//! [`MxCache::sweep`], which the service runs on its own, coarser, schedule.

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::dns::MxLookup;

/// Configuration for the MX cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long an answer stays fresh, in seconds. `0` disables caching.
    ///
    /// Default: 3600
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// How often expired entries are swept out of memory, in seconds
    ///
    /// Default: 3600
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// How often cache size and session counts are reported, in seconds.
    /// `0` disables the report.
    ///
    /// Default: 300
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

const fn default_ttl_secs() -> u64 {
    3600
}

const fn default_sweep_interval_secs() -> u64 {
    3600
}

const fn default_stats_interval_secs() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    #[must_use]
    pub const fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}

/// Result of [`MxCache::resolve`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MxAnswer {
    pub hostnames: Arc<[String]>,
    pub from_cache: bool,
}

#[derive(Debug, Clone)]
struct CachedMx {
    hostnames: Arc<[String]>,
    fetched_at: Instant,
}

pub struct MxCache {
    lookup: Arc<dyn MxLookup>,
    entries: DashMap<String, CachedMx>,
    ttl: Duration,
}

impl MxCache {
    /// A zero `ttl` disables caching; every resolve then queries `lookup`.
    pub fn new(lookup: Arc<dyn MxLookup>, ttl: Duration) -> Self {
        Self {
            lookup,
            entries: DashMap::new(),
            ttl,
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// MX hostnames for `domain`, in resolver order.
    ///
    /// Lookup failures of any kind resolve to an empty list.
    pub async fn resolve(&self, domain: &str) -> MxAnswer {
        if self.is_enabled() {
            if let Some(cached) = self.entries.get(domain) {
                if cached.fetched_at.elapsed() < self.ttl {
                    debug!("MX cache hit for {domain}");
                    return MxAnswer {
                        hostnames: Arc::clone(&cached.hostnames),
                        from_cache: true,
                    };
                }
                debug!("MX cache entry expired for {domain}");
            }
        }

        let fetched_at = Instant::now();
        let hostnames: Arc<[String]> = match self.lookup.lookup_mx(domain).await {
            Ok(hosts) => hosts.into(),
            Err(err) => {
                debug!("MX lookup for {domain} failed, treating as empty: {err}");
                Arc::from(Vec::new())
            }
        };

        if self.is_enabled() {
            self.entries.insert(
                domain.to_string(),
                CachedMx {
                    hostnames: Arc::clone(&hostnames),
                    fetched_at,
                },
            );
        }

        MxAnswer {
            hostnames,
            from_cache: false,
        }
    }

    /// Drop every entry older than the TTL, returning how many were removed
    pub fn sweep(&self) -> usize {
        if !self.is_enabled() {
            return 0;
        }

        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.fetched_at.elapsed() < self.ttl);
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            debug!(
                "MX cache sweep removed {removed} expired entries, {} remaining",
                self.entries.len()
            );
        }

        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl std::fmt::Debug for MxCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MxCache")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
