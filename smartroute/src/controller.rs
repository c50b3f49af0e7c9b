use std::{
    net::SocketAddr,
    path::Path,
    sync::{Arc, LazyLock},
};

use anyhow::Context;
use serde::Deserialize;
use smartroute_common::{Signal, internal};
use smartroute_routing::{
    CacheConfig, DnsConfig, DnsMxLookup, MxCache, MxLookup, Router, RoutingConfig, Snapshot,
};
use smartroute_table::{ListenerConfig, SessionGauge, TableServer};
use tokio::sync::broadcast;

use crate::housekeeping::Housekeeping;

/// The whole service, as described by the configuration file
#[derive(Debug, Default, Deserialize)]
pub struct SmartRouter {
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub dns: DnsConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    tokio::signal::ctrl_c().await?;
    internal!(level = WARN, "Forcing shutdown");

    Ok(())
}

impl SmartRouter {
    /// Parse a RON configuration document
    ///
    /// # Errors
    ///
    /// If the document does not describe a valid configuration.
    pub fn from_ron(document: &str) -> anyhow::Result<Self> {
        Ok(ron::from_str(document)?)
    }

    /// Read and parse a configuration file
    ///
    /// # Errors
    ///
    /// If the file cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let document = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        Self::from_ron(&document)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Compile the routing configuration and bind the listener
    ///
    /// # Errors
    ///
    /// If the listener cannot be bound.
    pub async fn bind(self, lookup: Arc<dyn MxLookup>) -> anyhow::Result<Service> {
        let cache = MxCache::new(lookup, self.cache.ttl());
        let router = Arc::new(Router::new(&self.routing, cache));
        let server = TableServer::bind(&self.listener, Arc::clone(&router)).await?;

        if self.cache.ttl().is_zero() {
            internal!(level = INFO, "Listening on {} (no cache)", server.local_addr()?);
        } else {
            internal!(
                level = INFO,
                "Listening on {} (cache {} seconds)",
                server.local_addr()?,
                self.cache.ttl_secs
            );
        }

        Ok(Service {
            server,
            router,
            cache: self.cache,
        })
    }

    /// Run the service against the system resolver until a shutdown signal
    ///
    /// # Errors
    ///
    /// If the resolver cannot be configured or the listener cannot be bound.
    pub async fn run(self) -> anyhow::Result<()> {
        internal!("Controller running");

        let lookup = DnsMxLookup::new(&self.dns).context("Failed to configure DNS resolver")?;
        let service = self.bind(Arc::new(lookup)).await?;
        let router = service.router();

        let ret = tokio::select! {
            r = service.serve(SHUTDOWN_BROADCAST.subscribe()) => {
                r.map(|_| ())
            }
            r = shutdown() => {
                report(&router.snapshot());
                r
            }
        };

        internal!(level = INFO, "Shutting down...");

        ret
    }
}

/// A bound, ready to serve instance
pub struct Service {
    server: TableServer,
    router: Arc<Router>,
    cache: CacheConfig,
}

impl Service {
    /// # Errors
    ///
    /// If the listener socket has no local address.
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.server.local_addr()?)
    }

    pub fn router(&self) -> Arc<Router> {
        Arc::clone(&self.router)
    }

    pub fn session_gauge(&self) -> SessionGauge {
        self.server.session_gauge()
    }

    /// Serve lookups and run housekeeping until `shutdown` fires, then report
    /// and return the final statistics.
    ///
    /// # Errors
    ///
    /// If the listener fails.
    pub async fn serve(self, shutdown: broadcast::Receiver<Signal>) -> anyhow::Result<Snapshot> {
        let housekeeping = Housekeeping::new(
            Arc::clone(&self.router),
            self.server.session_gauge(),
            &self.cache,
        );

        tokio::select! {
            r = self.server.serve(shutdown) => r?,
            () = housekeeping.run() => {}
        }

        let snapshot = self.router.snapshot();
        report(&snapshot);

        Ok(snapshot)
    }
}

/// Log one table per registry
fn report(snapshot: &Snapshot) {
    for registry in &snapshot.registries {
        internal!(level = INFO, "\n{registry}");
    }
}
