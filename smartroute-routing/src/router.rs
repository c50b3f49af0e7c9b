//! Turning a request key into a transport decision

use smartroute_common::internal;
use tracing::{debug, warn};

use crate::{
    address::EmailAddress,
    config::RoutingConfig,
    fleet::ServerRegistry,
    mx_cache::MxCache,
    rules::{MatchKind, RuleMatch, RuleTable, Target},
    scheduler::Selection,
    stats::Snapshot,
};

/// Why a request was answered with `NO RESULT`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoResultReason {
    /// The key is not a `local@domain` address
    InvalidAddress,
    /// The matching rule targets the `NO RESULT` sentinel
    Sentinel,
    /// The selected registry has no servers to choose from
    EmptyRegistry(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Route(Selection),
    NoResult(NoResultReason),
}

impl Decision {
    /// The transport directive to hand back, if any
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        match self {
            Self::Route(selection) => Some(&selection.address),
            Self::NoResult(_) => None,
        }
    }
}

/// Rule table, registries and MX cache for one running service.
#[derive(Debug)]
pub struct Router {
    rules: RuleTable,
    registries: ServerRegistry,
    mx: MxCache,
}

impl Router {
    pub fn new(config: &RoutingConfig, mx: MxCache) -> Self {
        let rules = RuleTable::compile(&config.rules);
        let registries = ServerRegistry::from_config(config);

        let targets = rules
            .rules()
            .map(|rule| (rule.key(), rule.target()))
            .chain(rules.default_match().map(|m| (m.key, m.target)));

        for (key, target) in targets {
            if let Target::Named(name) = target
                && !registries.is_group(name)
                && !registries.is_server(name)
            {
                warn!("Rule {key} targets unknown group or server {name}, it will use all servers");
            }
        }

        if registries.fleet().lock().is_empty() {
            warn!("No servers are configured, every routed request will get NO RESULT");
        }

        internal!(
            level = INFO,
            "Loaded {} rule(s), {} group(s), MX cache TTL {}s",
            rules.len(),
            registries.groups().count(),
            mx.ttl().as_secs()
        );

        Self {
            rules,
            registries,
            mx,
        }
    }

    /// Decide where mail for `request` should go.
    ///
    /// MX hostnames are tried in resolver order against the rule table and the
    /// first hostname that produces a match decides. Without any match the
    /// default rule applies, and without a default the whole fleet is used.
    pub async fn decide(&self, request: &str) -> Decision {
        let address = match request.parse::<EmailAddress>() {
            Ok(address) => address,
            Err(err) => {
                debug!("Unable to route {request:?}: {err}");
                return Decision::NoResult(NoResultReason::InvalidAddress);
            }
        };

        let answer = self.mx.resolve(address.domain()).await;
        debug!(
            "MX for {} ({}): {:?}",
            address.domain(),
            if answer.from_cache { "cached" } else { "fresh" },
            answer.hostnames
        );

        let matched = answer
            .hostnames
            .iter()
            .find_map(|host| self.rules.find(address.as_str(), host).map(|m| (m, host.as_str())))
            .map(|(m, host)| {
                log_match(&address, &m, Some(host));
                m
            })
            .or_else(|| {
                let fallback = self.rules.default_match();
                if let Some(m) = &fallback {
                    log_match(&address, m, None);
                }
                fallback
            });

        let identifier = match matched.map(|m| m.target) {
            Some(Target::NoResult) => {
                return Decision::NoResult(NoResultReason::Sentinel);
            }
            Some(Target::Named(name)) => Some(name.as_str()),
            Some(Target::Everyone) | None => {
                internal!(
                    level = INFO,
                    "No target for {address}, selecting from all servers"
                );
                None
            }
        };

        let registry = self.registries.resolve_group(identifier);
        let mut registry = registry.lock();

        registry.select_next(identifier).map_or_else(
            || {
                warn!("Registry {} has no servers for {address}", registry.name());
                Decision::NoResult(NoResultReason::EmptyRegistry(registry.name().to_string()))
            },
            |selection| {
                debug!(
                    "Selected {} ({}) from {} for {address}{}",
                    selection.server,
                    selection.address,
                    selection.registry,
                    if selection.pinned { ", pinned" } else { "" }
                );
                Decision::Route(selection)
            },
        )
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.registries.snapshot()
    }

    #[must_use]
    pub const fn mx_cache(&self) -> &MxCache {
        &self.mx
    }

    #[must_use]
    pub const fn rules(&self) -> &RuleTable {
        &self.rules
    }

    #[must_use]
    pub const fn registries(&self) -> &ServerRegistry {
        &self.registries
    }
}

fn log_match(address: &EmailAddress, matched: &RuleMatch<'_>, host: Option<&str>) {
    match (matched.kind, host) {
        (MatchKind::MxHost, Some(host)) => internal!(
            level = INFO,
            "Matched {} on {} {host} -> {}",
            matched.key,
            matched.kind,
            matched.target
        ),
        (MatchKind::Default, _) => internal!(
            level = INFO,
            "No rule matched {address}, using {} -> {}",
            matched.kind,
            matched.target
        ),
        _ => internal!(
            level = INFO,
            "Matched {} on {} {address} -> {}",
            matched.key,
            matched.kind,
            matched.target
        ),
    }
}
