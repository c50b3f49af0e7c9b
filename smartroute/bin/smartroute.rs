#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::{net::IpAddr, path::PathBuf};

use clap::Parser;
use smartroute::{
    SmartRouter,
    config::{Overrides, find_config_file},
};
use smartroute_common::{logging, tracing::metadata::LevelFilter};

/// Weighted MX transport router for Postfix table lookups
#[derive(Parser, Debug)]
#[command(name = "smartroute")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (default: $SMARTROUTE_CONFIG, ./smartroute.config.ron,
    /// /etc/smartroute/smartroute.config.ron)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short = 'H', long)]
    host: Option<IpAddr>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// MX cache TTL in seconds, 0 disables caching
    #[arg(long, value_name = "SECS")]
    cache_ttl: Option<u64>,

    /// Client inactivity timeout in seconds, 0 disables it
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Log decisions and lookups in detail
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    const fn level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::DEBUG
        } else if self.quiet {
            LevelFilter::WARN
        } else {
            LevelFilter::INFO
        }
    }

    const fn overrides(&self) -> Overrides {
        Overrides {
            host: self.host,
            port: self.port,
            cache_ttl_secs: self.cache_ttl,
            inactivity_secs: self.timeout,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.level());

    let config_path = find_config_file(cli.config.as_deref())?;
    let mut smartroute = SmartRouter::load(&config_path)?;
    cli.overrides().apply(&mut smartroute);

    smartroute.run().await
}
