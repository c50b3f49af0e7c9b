//! Routing decisions for Postfix transport lookups
//!
//! This crate turns a recipient address into a transport directive:
//! - MX hostnames for the recipient domain are resolved through a TTL cache
//! - an ordered rule table maps the address/MX pair to a group, a server, or
//!   the `NO RESULT` sentinel
//! - a weighted scheduler picks one server from the chosen group so that each
//!   server converges on its configured share of the traffic

mod address;
mod config;
mod dns;
mod fleet;
mod mx_cache;
mod registry;
mod router;
mod rules;
mod scheduler;
mod stats;

pub use address::{AddressError, EmailAddress};
pub use config::{GroupConfig, RoutingConfig, RuleConfig, ServerConfig};
pub use dns::{DnsConfig, DnsError, DnsMxLookup, MxLookup, StaticMxLookup};
pub use fleet::{FLEET, ServerRegistry};
pub use mx_cache::{CacheConfig, MxAnswer, MxCache};
pub use registry::{Registry, Server};
pub use router::{Decision, NoResultReason, Router};
pub use rules::{DEFAULT_RULE, MatchKind, NO_RESULT, Rule, RuleMatch, RuleTable, Target};
pub use scheduler::Selection;
pub use stats::{RegistryStats, ServerStats, Snapshot};
