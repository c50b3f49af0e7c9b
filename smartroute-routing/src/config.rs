//! Typed routing configuration
//!
//! The routing section of the configuration file is deserialised into these
//! types as-is, then compiled into the rule table and server registries. Order
//! is preserved everywhere: servers define the round-robin order, groups define
//! the report order, and rules are tried in declaration order.
//!
//! ```ron
//! routing: (
//!     servers: [
//!         (name: "mx1", address: "relay:[10.0.0.1]:25", share: 40),
//!         (name: "mx2", address: "relay:[10.0.0.2]:25", share: 40),
//!         (name: "mx3", address: "relay:[10.0.0.3]:25", share: 20),
//!     ],
//!     groups: [
//!         (name: "good", servers: ["mx1", "mx2", "mx3"]),
//!     ],
//!     rules: [
//!         (key: "default", target: "NO RESULT"),
//!         (key: "example.com", target: "good"),
//!     ],
//! )
//! ```

use serde::{Deserialize, Serialize};

/// A backend server and its configured weight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    /// Transport directive handed back to Postfix verbatim, e.g. `relay:[host]:587`
    pub address: String,
    /// Relative weight, normally 0..=100
    #[serde(default = "default_share")]
    pub share: u32,
}

/// A named subset of the declared servers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    #[serde(default)]
    pub servers: Vec<String>,
}

/// One `key -> target` rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub key: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

const fn default_share() -> u32 {
    100
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, address: impl Into<String>, share: u32) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            share,
        }
    }
}

impl GroupConfig {
    pub fn new<S: Into<String>>(name: impl Into<String>, servers: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            servers: servers.into_iter().map(Into::into).collect(),
        }
    }
}

impl RuleConfig {
    pub fn new(key: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            target: target.into(),
        }
    }
}

impl RoutingConfig {
    /// Look up a declared server by name. The first declaration wins.
    #[must_use]
    pub fn server(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|server| server.name == name)
    }
}
