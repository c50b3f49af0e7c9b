//! End-to-end test harness for smartroute
//!
//! # Example
//!
//! ```no_run
//! use support::TestHarness;
//!
//! #[tokio::test]
//! async fn test_lookup() {
//!     let harness = TestHarness::builder()
//!         .with_mx("example.com", &["mx.example.com"])
//!         .build(CONFIG)
//!         .await
//!         .unwrap();
//!
//!     assert_eq!(harness.get("user@example.com").await.unwrap(), "500 NO%20RESULT");
//!
//!     harness.shutdown().await.unwrap();
//! }
//! ```

use std::{net::SocketAddr, sync::Arc, time::Duration};

use smartroute::SmartRouter;
use smartroute_common::Signal;
use smartroute_routing::{Router, Snapshot, StaticMxLookup};
use smartroute_table::SessionGauge;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    sync::broadcast,
    task::JoinHandle,
    time::timeout,
};

/// A running service plus the handles needed to drive and stop it
pub struct TestHarness {
    address: SocketAddr,
    router: Arc<Router>,
    sessions: SessionGauge,
    lookup: Arc<StaticMxLookup>,
    shutdown_tx: broadcast::Sender<Signal>,
    handle: JoinHandle<anyhow::Result<Snapshot>>,
}

impl TestHarness {
    #[must_use]
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::default()
    }

    #[must_use]
    #[allow(dead_code)]
    pub const fn address(&self) -> SocketAddr {
        self.address
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    #[must_use]
    #[allow(dead_code)]
    pub fn active_sessions(&self) -> usize {
        self.sessions.active()
    }

    #[must_use]
    #[allow(dead_code)]
    pub fn dns_lookups(&self) -> usize {
        self.lookup.lookups()
    }

    /// Open a new table client connection
    ///
    /// # Errors
    ///
    /// If the service cannot be reached.
    pub async fn connect(&self) -> anyhow::Result<TableClient> {
        Ok(TableClient {
            stream: BufReader::new(TcpStream::connect(self.address).await?),
        })
    }

    /// One lookup on a fresh connection
    ///
    /// # Errors
    ///
    /// If the exchange fails.
    #[allow(dead_code)]
    pub async fn get(&self, key: &str) -> anyhow::Result<String> {
        self.connect().await?.get(key).await
    }

    /// Signal shutdown and wait for the final statistics
    ///
    /// # Errors
    ///
    /// If the service fails or does not stop within 5 seconds.
    pub async fn shutdown(self) -> anyhow::Result<Snapshot> {
        let _ = self.shutdown_tx.send(Signal::Shutdown);
        timeout(Duration::from_secs(5), self.handle).await??
    }
}

#[derive(Default)]
pub struct TestHarnessBuilder {
    lookup: StaticMxLookup,
}

impl TestHarnessBuilder {
    #[must_use]
    pub fn with_mx(mut self, domain: &str, hosts: &[&str]) -> Self {
        self.lookup = self.lookup.with(domain, hosts.iter().copied());
        self
    }

    /// Start the service described by `config`, listening on an ephemeral port
    ///
    /// # Errors
    ///
    /// If the configuration is invalid or the listener cannot be bound.
    pub async fn build(self, config: &str) -> anyhow::Result<TestHarness> {
        let mut smartroute = SmartRouter::from_ron(config)?;
        smartroute.listener.socket = "127.0.0.1:0".parse()?;

        let lookup = Arc::new(self.lookup);
        let service = smartroute.bind(lookup.clone()).await?;

        let address = service.local_addr()?;
        let router = service.router();
        let sessions = service.session_gauge();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(4);
        let handle = tokio::spawn(service.serve(shutdown_rx));

        Ok(TestHarness {
            address,
            router,
            sessions,
            lookup,
            shutdown_tx,
            handle,
        })
    }
}

/// A persistent client connection, like the one Postfix keeps open
pub struct TableClient {
    stream: BufReader<TcpStream>,
}

impl TableClient {
    /// Send `get <key>` and return the reply line without its newline
    ///
    /// # Errors
    ///
    /// If the connection fails or is closed before a reply arrives.
    pub async fn get(&mut self, key: &str) -> anyhow::Result<String> {
        self.send(format!("get {key}\n").as_bytes()).await
    }

    /// Send raw bytes and return the next reply line
    ///
    /// # Errors
    ///
    /// If the connection fails or is closed before a reply arrives.
    pub async fn send(&mut self, request: &[u8]) -> anyhow::Result<String> {
        self.stream.get_mut().write_all(request).await?;

        let mut line = String::new();
        if self.stream.read_line(&mut line).await? == 0 {
            anyhow::bail!("Connection closed before a reply");
        }

        Ok(line.trim_end().to_string())
    }
}
