//! Point-in-time send statistics
//!
//! The [`Display`](fmt::Display) output is the table logged at shutdown and on
//! the periodic stats interval:
//!
//! ```text
//! All Servers
//!   Name          # Sent |  curr. % / target %
//!     mx1          1,040 |  40.0000 /  40.0000
//! ```

use std::fmt;

use num_format::{Locale, ToFormattedString};
use serde::Serialize;

use crate::{fleet::FLEET, registry::Registry};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerStats {
    pub name: String,
    pub sent: u64,
    pub current_fraction: f64,
    pub target_fraction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryStats {
    pub name: String,
    pub servers: Vec<ServerStats>,
}

impl RegistryStats {
    #[must_use]
    pub fn total_sent(&self) -> u64 {
        self.servers.iter().map(|s| s.sent).sum()
    }

    fn title(&self) -> String {
        if self.name == FLEET {
            "All Servers".to_string()
        } else {
            format!("Group {}", self.name)
        }
    }
}

impl fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title())?;
        writeln!(f, "  Name          # Sent |  curr. % / target %")?;
        for server in &self.servers {
            writeln!(
                f,
                "    {:<10} {:>7} | {:>8.4} / {:>8.4}",
                server.name,
                server.sent.to_formatted_string(&Locale::en),
                server.current_fraction * 100.0,
                server.target_fraction * 100.0
            )?;
        }
        Ok(())
    }
}

/// Statistics for the fleet followed by every group
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub registries: Vec<RegistryStats>,
}

impl Snapshot {
    #[must_use]
    pub fn registry(&self, name: &str) -> Option<&RegistryStats> {
        self.registries.iter().find(|r| r.name == name)
    }
}

impl FromIterator<RegistryStats> for Snapshot {
    fn from_iter<T: IntoIterator<Item = RegistryStats>>(iter: T) -> Self {
        Self {
            registries: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, registry) in self.registries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{registry}")?;
        }
        Ok(())
    }
}

impl Registry {
    /// Counts and fractions as of now, recomputed from the send counts
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> RegistryStats {
        let total = self.total_sent();

        RegistryStats {
            name: self.name().to_string(),
            servers: self
                .servers()
                .iter()
                .map(|server| ServerStats {
                    name: server.name().to_string(),
                    sent: server.sent(),
                    current_fraction: if total == 0 {
                        0.0
                    } else {
                        server.sent() as f64 / total as f64
                    },
                    target_fraction: server.target_fraction(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::ServerConfig;

    fn registry(name: &str) -> Registry {
        let servers = [
            ServerConfig::new("mx1", "relay:[mx1]", 40),
            ServerConfig::new("mx2", "relay:[mx2]", 40),
            ServerConfig::new("mx3", "relay:[mx3]", 20),
        ];
        Registry::new(name, &servers)
    }

    #[test]
    fn test_stats_before_any_sends() {
        let stats = registry(FLEET).stats();
        assert_eq!(stats.total_sent(), 0);
        assert!(stats.servers.iter().all(|s| s.current_fraction == 0.0));
    }

    #[test]
    fn test_table_format() {
        let mut registry = registry(FLEET);
        for _ in 0..5 {
            registry.select_next(None).unwrap();
        }

        let table = registry.stats().to_string();
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines[0], "All Servers");
        assert_eq!(lines[1], "  Name          # Sent |  curr. % / target %");
        assert_eq!(lines[2], "    mx1              2 |  40.0000 /  40.0000");
        assert_eq!(lines[3], "    mx2              2 |  40.0000 /  40.0000");
        assert_eq!(lines[4], "    mx3              1 |  20.0000 /  20.0000");
    }

    #[test]
    fn test_sent_counts_are_grouped() {
        let stats = RegistryStats {
            name: FLEET.to_string(),
            servers: vec![ServerStats {
                name: "mx1".to_string(),
                sent: 12345,
                current_fraction: 1.0,
                target_fraction: 0.4,
            }],
        };

        let table = stats.to_string();
        assert_eq!(
            table.lines().nth(2),
            Some("    mx1         12,345 | 100.0000 /  40.0000")
        );
    }

    #[test]
    fn test_group_title() {
        let table = registry("good").stats().to_string();
        assert!(table.starts_with("Group good\n"));
    }

    #[test]
    fn test_snapshot_display_joins_tables() {
        let snapshot: Snapshot = [registry(FLEET).stats(), registry("good").stats()]
            .into_iter()
            .collect();

        let text = snapshot.to_string();
        assert!(text.contains("All Servers\n"));
        assert!(text.contains("\n\nGroup good\n"));
        assert!(snapshot.registry("good").is_some());
        assert!(snapshot.registry("bad").is_none());
    }
}
