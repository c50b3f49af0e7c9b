//! Server lists with normalised target shares
//!
//! A [`Registry`] is an ordered list of servers plus the round-robin cursor.
//! Target fractions are normalised within the registry: the same server
//! declared with share 40 gets a different target fraction in every group it
//! belongs to, and its send count is tracked separately in each of them.

use tracing::debug;

use crate::config::ServerConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct Server {
    pub(crate) name: String,
    pub(crate) address: String,
    share: u32,
    pub(crate) target_fraction: f64,
    pub(crate) current_fraction: f64,
    pub(crate) sent: u64,
}

impl Server {
    fn new(config: &ServerConfig) -> Self {
        Self {
            name: config.name.clone(),
            address: config.address.clone(),
            share: config.share,
            target_fraction: 0.0,
            current_fraction: 0.0,
            sent: 0,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub const fn share(&self) -> u32 {
        self.share
    }

    /// `share / sum(shares)` within the owning registry
    #[must_use]
    pub const fn target_fraction(&self) -> f64 {
        self.target_fraction
    }

    /// Fraction of this registry's selections that went to this server, as of
    /// the last recompute
    #[must_use]
    pub const fn current_fraction(&self) -> f64 {
        self.current_fraction
    }

    #[must_use]
    pub const fn sent(&self) -> u64 {
        self.sent
    }
}

#[derive(Debug, Clone)]
pub struct Registry {
    name: String,
    pub(crate) servers: Vec<Server>,
    /// Index of the last server chosen by the weighted scan
    pub(crate) cursor: Option<usize>,
}

impl Registry {
    /// Build a registry from server definitions, in the given order.
    ///
    /// When every share is zero all target fractions stay at zero.
    #[allow(clippy::cast_precision_loss)]
    pub fn new<'a>(name: impl Into<String>, servers: impl IntoIterator<Item = &'a ServerConfig>) -> Self {
        let name = name.into();
        let mut servers: Vec<Server> = servers.into_iter().map(Server::new).collect();

        let total: u64 = servers.iter().map(|s| u64::from(s.share)).sum();
        if total > 0 {
            for server in &mut servers {
                server.target_fraction = f64::from(server.share) / total as f64;
            }
        }

        for server in &servers {
            debug!(
                "Registry {name}: {} {} share {} target {:.4}",
                server.name, server.address, server.share, server.target_fraction
            );
        }

        Self {
            name,
            servers,
            cursor: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.servers.iter().position(|server| server.name == name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    #[must_use]
    pub fn total_sent(&self) -> u64 {
        self.servers.iter().map(|s| s.sent).sum()
    }

    /// Refresh every server's current fraction from the send counts.
    ///
    /// With nothing sent yet every fraction is zero.
    #[allow(clippy::cast_precision_loss)]
    pub fn recompute_fractions(&mut self) {
        let total = self.total_sent();

        for server in &mut self.servers {
            server.current_fraction = if total == 0 {
                0.0
            } else {
                server.sent as f64 / total as f64
            };
        }
    }
}
