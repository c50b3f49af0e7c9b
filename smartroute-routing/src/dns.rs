//! MX hostname lookups.
//!
//! The router only needs the ordered list of MX exchange hostnames for a
//! domain. [`DnsMxLookup`] asks the system resolver through hickory;
//! [`StaticMxLookup`] answers from a fixed table and never touches the network.

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use ahash::AHashMap;
use async_trait::async_trait;
use hickory_resolver::{
    TokioResolver, config::ResolverOpts, name_server::TokioConnectionProvider,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during MX resolution.
#[derive(Debug, Error)]
pub enum DnsError {
    /// The domain exists but publishes no MX records.
    #[error("No mail servers found for domain: {0}")]
    NoMailServers(String),

    /// Domain does not exist (NXDOMAIN).
    #[error("Domain does not exist: {0}")]
    DomainNotFound(String),

    /// DNS query failed due to network or resolver issues.
    #[error("DNS lookup failed: {0}")]
    LookupFailed(#[from] hickory_resolver::ResolveError),
}

/// Configuration for the DNS resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsConfig {
    /// DNS query timeout in seconds (default: 5)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_timeout_secs() -> u64 {
    5
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Source of MX hostnames for a domain.
///
/// Implementations return exchange hostnames in preference order, lowercased
/// and without the trailing root dot.
#[async_trait]
pub trait MxLookup: Send + Sync {
    /// Look up the MX exchanges for `domain`
    ///
    /// # Errors
    ///
    /// Any failure to produce a hostname list; callers treat every error as
    /// an empty answer.
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<String>, DnsError>;
}

/// MX lookups against the system resolver
#[derive(Debug)]
pub struct DnsMxLookup {
    resolver: TokioResolver,
}

impl DnsMxLookup {
    /// Creates a lookup using the system resolver configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the system DNS configuration cannot be loaded.
    pub fn new(config: &DnsConfig) -> Result<Self, DnsError> {
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(config.timeout_secs);

        let resolver = TokioResolver::builder(TokioConnectionProvider::default())?
            .with_options(opts)
            .build();

        Ok(Self { resolver })
    }
}

#[async_trait]
impl MxLookup for DnsMxLookup {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<String>, DnsError> {
        // Fully qualified, so no search domains are appended
        let fqdn = if domain.ends_with('.') {
            domain.to_string()
        } else {
            format!("{domain}.")
        };

        let lookup = match self.resolver.mx_lookup(fqdn.as_str()).await {
            Ok(lookup) => lookup,
            Err(err) if err.is_nx_domain() => {
                return Err(DnsError::DomainNotFound(domain.to_string()));
            }
            Err(err) if err.is_no_records_found() => {
                return Err(DnsError::NoMailServers(domain.to_string()));
            }
            Err(err) => return Err(DnsError::LookupFailed(err)),
        };

        let mut exchanges: Vec<(u16, String)> = lookup
            .iter()
            .map(|mx| (mx.preference(), normalise(&mx.exchange().to_utf8())))
            .collect();

        // Stable, so equal preferences keep answer order
        exchanges.sort_by_key(|(preference, _)| *preference);

        debug!("Resolved {} MX record(s) for {domain}", exchanges.len());

        Ok(exchanges.into_iter().map(|(_, host)| host).collect())
    }
}

fn normalise(host: &str) -> String {
    host.trim_end_matches('.').to_lowercase()
}

/// MX answers from a fixed in-memory table.
///
/// Domains that are not in the table fail with [`DnsError::DomainNotFound`],
/// the same way a nonexistent domain does against real DNS.
#[derive(Debug, Default)]
pub struct StaticMxLookup {
    records: AHashMap<String, Vec<String>>,
    lookups: AtomicUsize,
}

impl StaticMxLookup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the MX hostnames for `domain`
    #[must_use]
    pub fn with<S: AsRef<str>>(mut self, domain: &str, hosts: impl IntoIterator<Item = S>) -> Self {
        self.records.insert(
            normalise(domain),
            hosts.into_iter().map(|h| normalise(h.as_ref())).collect(),
        );
        self
    }

    /// Number of lookups answered so far, hits and misses alike
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MxLookup for StaticMxLookup {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<String>, DnsError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);

        self.records
            .get(&normalise(domain))
            .cloned()
            .ok_or_else(|| DnsError::DomainNotFound(domain.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_lookup() {
        let lookup = StaticMxLookup::new().with("Example.com.", ["MX1.Example.com.", "mx2.example.com"]);

        let hosts = lookup.lookup_mx("example.com").await.unwrap();
        assert_eq!(hosts, vec!["mx1.example.com", "mx2.example.com"]);

        let missing = lookup.lookup_mx("other.com").await;
        assert!(matches!(missing, Err(DnsError::DomainNotFound(_))));

        assert_eq!(lookup.lookups(), 2);
    }

    #[test]
    fn test_dns_config_defaults() {
        assert_eq!(DnsConfig::default().timeout_secs, 5);
    }

    #[tokio::test]
    #[ignore = "Requires network access"]
    async fn test_mx_lookup_gmail() {
        let lookup = DnsMxLookup::new(&DnsConfig::default()).unwrap();
        let hosts = lookup.lookup_mx("gmail.com").await.unwrap();

        assert!(!hosts.is_empty());
        assert!(hosts.iter().all(|h| !h.ends_with('.')));
        assert!(hosts.iter().any(|h| h.contains("google.com")));
    }

    #[tokio::test]
    #[ignore = "Requires network access"]
    async fn test_domain_not_found() {
        let lookup = DnsMxLookup::new(&DnsConfig::default()).unwrap();
        let result = lookup
            .lookup_mx("this-domain-definitely-does-not-exist-12345.com")
            .await;

        assert!(result.is_err());
    }
}
