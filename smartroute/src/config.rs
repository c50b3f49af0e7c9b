//! Locating the configuration file and applying command-line overrides

use std::{
    net::IpAddr,
    path::{Path, PathBuf},
};

use crate::controller::SmartRouter;

pub const CONFIG_ENV: &str = "SMARTROUTE_CONFIG";

const DEFAULT_PATHS: [&str; 2] = [
    "./smartroute.config.ron",
    "/etc/smartroute/smartroute.config.ron",
];

/// Find the configuration file using the following precedence:
/// 1. an explicit path from the command line
/// 2. `SMARTROUTE_CONFIG` environment variable
/// 3. ./smartroute.config.ron (current working directory)
/// 4. /etc/smartroute/smartroute.config.ron (system-wide config)
///
/// # Errors
///
/// If an explicitly named file does not exist, or none of the defaults do.
pub fn find_config_file(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        anyhow::bail!("Configuration file does not exist: {}", path.display());
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("{CONFIG_ENV} points to non-existent file: {}", path.display());
    }

    let default_paths: Vec<PathBuf> = DEFAULT_PATHS.iter().map(PathBuf::from).collect();

    for path in &default_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}

/// Settings given on the command line, replacing the file's values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub host: Option<IpAddr>,
    pub port: Option<u16>,
    pub cache_ttl_secs: Option<u64>,
    pub inactivity_secs: Option<u64>,
}

impl Overrides {
    pub fn apply(&self, config: &mut SmartRouter) {
        if let Some(host) = self.host {
            config.listener.socket.set_ip(host);
        }
        if let Some(port) = self.port {
            config.listener.socket.set_port(port);
        }
        if let Some(ttl) = self.cache_ttl_secs {
            config.cache.ttl_secs = ttl;
        }
        if let Some(inactivity) = self.inactivity_secs {
            config.listener.timeouts.inactivity_secs = inactivity;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "()").unwrap();

        assert_eq!(find_config_file(Some(file.path())).unwrap(), file.path());

        let missing = file.path().with_extension("missing");
        assert!(find_config_file(Some(missing.as_path())).is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = SmartRouter::default();

        Overrides {
            host: Some("0.0.0.0".parse().unwrap()),
            port: Some(2525),
            cache_ttl_secs: Some(0),
            inactivity_secs: Some(30),
        }
        .apply(&mut config);

        assert_eq!(config.listener.socket.to_string(), "0.0.0.0:2525");
        assert_eq!(config.cache.ttl_secs, 0);
        assert_eq!(config.listener.timeouts.inactivity_secs, 30);
    }

    #[test]
    fn test_empty_overrides_keep_file_values() {
        let mut config = SmartRouter::from_ron(
            "(listener: (socket: \"10.1.1.1:7000\"), cache: (ttl_secs: 90))",
        )
        .unwrap();

        Overrides::default().apply(&mut config);

        assert_eq!(config.listener.socket.to_string(), "10.1.1.1:7000");
        assert_eq!(config.cache.ttl_secs, 90);
    }
}
