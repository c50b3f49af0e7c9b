//! The fleet registry and its groups
//!
//! Every registry sits behind its own lock, held for the whole
//! recompute-select-increment sequence of a pick, so concurrent requests never
//! choose from a stale view of the counts. Different registries never contend.

use ahash::AHashMap;
use parking_lot::Mutex;
use tracing::warn;

use crate::{
    config::{RoutingConfig, ServerConfig},
    registry::Registry,
    stats::Snapshot,
};

/// Name of the registry holding every declared server
pub const FLEET: &str = "names";

#[derive(Debug)]
pub struct ServerRegistry {
    fleet: Mutex<Registry>,
    groups: Vec<Mutex<Registry>>,
    by_name: AHashMap<String, usize>,
}

impl ServerRegistry {
    /// Build the fleet and every group from configuration.
    ///
    /// Duplicate server names keep their first declaration, and a server
    /// listed twice in one group is a member only once. Group members that
    /// name undeclared servers are skipped, so a group may end up empty.
    #[must_use]
    pub fn from_config(config: &RoutingConfig) -> Self {
        let declared: Vec<&ServerConfig> = config
            .servers
            .iter()
            .filter(|&server| {
                let first = config
                    .server(&server.name)
                    .is_some_and(|first| std::ptr::eq(first, server));
                if !first {
                    warn!("Ignoring duplicate declaration of server {}", server.name);
                }
                first
            })
            .collect();

        let fleet = Mutex::new(Registry::new(FLEET, declared.iter().copied()));

        let mut groups = Vec::with_capacity(config.groups.len());
        let mut by_name = AHashMap::with_capacity(config.groups.len());

        for group in &config.groups {
            if group.name == FLEET || by_name.contains_key(&group.name) {
                warn!("Ignoring duplicate group {}", group.name);
                continue;
            }

            let mut members: Vec<&ServerConfig> = Vec::with_capacity(group.servers.len());
            for name in &group.servers {
                match config.server(name) {
                    None => warn!("Group {} references undeclared server {name}", group.name),
                    Some(_) if members.iter().any(|m| &m.name == name) => {
                        warn!("Group {} lists server {name} more than once", group.name);
                    }
                    Some(member) => members.push(member),
                }
            }

            let registry = Registry::new(group.name.clone(), members);
            if registry.is_empty() {
                warn!("Group {} has no servers", group.name);
            }

            by_name.insert(group.name.clone(), groups.len());
            groups.push(Mutex::new(registry));
        }

        Self {
            fleet,
            groups,
            by_name,
        }
    }

    /// The registry a target identifier selects from.
    ///
    /// A group name selects that group. Anything else, including a server
    /// name or no identifier at all, selects the whole fleet.
    #[must_use]
    pub fn resolve_group(&self, identifier: Option<&str>) -> &Mutex<Registry> {
        identifier
            .and_then(|name| self.by_name.get(name))
            .map_or(&self.fleet, |&index| &self.groups[index])
    }

    #[must_use]
    pub fn is_group(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    #[must_use]
    pub fn is_server(&self, name: &str) -> bool {
        self.fleet.lock().contains(name)
    }

    #[must_use]
    pub const fn fleet(&self) -> &Mutex<Registry> {
        &self.fleet
    }

    /// Every group registry, in configuration order
    pub fn groups(&self) -> impl Iterator<Item = &Mutex<Registry>> {
        self.groups.iter()
    }

    /// Counts and fractions for the fleet followed by every group
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        std::iter::once(&self.fleet)
            .chain(self.groups.iter())
            .map(|registry| registry.lock().stats())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroupConfig;

    fn config() -> RoutingConfig {
        RoutingConfig {
            servers: vec![
                ServerConfig::new("mx1", "relay:[mx1]", 40),
                ServerConfig::new("mx2", "relay:[mx2]", 40),
                ServerConfig::new("mx3", "relay:[mx3]", 20),
                ServerConfig::new("mx4", "relay:[mx4]", 100),
            ],
            groups: vec![
                GroupConfig::new("good", ["mx1", "mx2", "mx3"]),
                GroupConfig::new("bad", ["mx4", "mx1"]),
            ],
            rules: Vec::new(),
        }
    }

    #[test]
    fn test_resolve_group() {
        let registries = ServerRegistry::from_config(&config());

        assert_eq!(registries.resolve_group(Some("good")).lock().name(), "good");
        assert_eq!(registries.resolve_group(Some("bad")).lock().name(), "bad");
        assert_eq!(registries.resolve_group(Some("mx1")).lock().name(), FLEET);
        assert_eq!(registries.resolve_group(Some("nothing")).lock().name(), FLEET);
        assert_eq!(registries.resolve_group(None).lock().name(), FLEET);
    }

    #[test]
    fn test_groups_normalise_independently() {
        let registries = ServerRegistry::from_config(&config());

        let fleet = registries.fleet().lock();
        let mx1_fleet = fleet.servers()[fleet.position("mx1").unwrap()].target_fraction();
        assert!((mx1_fleet - 0.2).abs() < 1e-12);
        drop(fleet);

        let bad = registries.resolve_group(Some("bad")).lock();
        let mx1_bad = bad.servers()[bad.position("mx1").unwrap()].target_fraction();
        assert!((mx1_bad - 40.0 / 140.0).abs() < 1e-12);
    }

    #[test]
    fn test_counts_are_per_registry() {
        let registries = ServerRegistry::from_config(&config());

        registries
            .resolve_group(Some("good"))
            .lock()
            .select_next(Some("mx1"))
            .unwrap();

        let snapshot = registries.snapshot();
        let sent = |registry: &str, server: &str| {
            snapshot
                .registry(registry)
                .and_then(|r| r.servers.iter().find(|s| s.name == server))
                .map(|s| s.sent)
        };

        assert_eq!(sent("good", "mx1"), Some(1));
        assert_eq!(sent(FLEET, "mx1"), Some(0));
        assert_eq!(sent("bad", "mx1"), Some(0));
    }

    #[test]
    fn test_undeclared_members_and_duplicates_are_skipped() {
        let mut config = config();
        config.servers.push(ServerConfig::new("mx1", "relay:[shadow]", 5));
        config.groups.push(GroupConfig::new("ghosts", ["mx8", "mx9"]));
        config.groups.push(GroupConfig::new("good", ["mx4"]));

        let registries = ServerRegistry::from_config(&config);

        assert_eq!(registries.fleet().lock().len(), 4);
        assert!(registries.resolve_group(Some("ghosts")).lock().is_empty());
        assert_eq!(registries.resolve_group(Some("good")).lock().len(), 3);
        assert_eq!(registries.groups().count(), 3);
        assert!(registries.is_group("ghosts"));
        assert!(registries.is_server("mx4"));
        assert!(!registries.is_server("good"));
    }

    #[test]
    fn test_repeated_group_members_count_once() {
        let config = RoutingConfig {
            servers: vec![
                ServerConfig::new("mx1", "relay:[mx1]", 50),
                ServerConfig::new("mx2", "relay:[mx2]", 50),
            ],
            groups: vec![GroupConfig::new("g", ["mx1", "mx1", "mx2", "mx1"])],
            rules: Vec::new(),
        };
        let registries = ServerRegistry::from_config(&config);

        let mut group = registries.resolve_group(Some("g")).lock();
        assert_eq!(group.len(), 2);

        for _ in 0..300 {
            group.select_next(None).unwrap();
        }
        drop(group);

        let snapshot = registries.snapshot();
        let stats = snapshot.registry("g").unwrap();
        let sent: Vec<(&str, u64)> = stats
            .servers
            .iter()
            .map(|s| (s.name.as_str(), s.sent))
            .collect();
        assert_eq!(sent, vec![("mx1", 150), ("mx2", 150)]);
    }

    #[test]
    fn test_snapshot_order() {
        let registries = ServerRegistry::from_config(&config());
        let names: Vec<String> = registries
            .snapshot()
            .registries
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec![FLEET, "good", "bad"]);
    }
}
