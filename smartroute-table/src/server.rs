//! TCP listener for table lookups

use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use smartroute_common::{Signal, config::SessionTimeouts, error::ListenerError, internal};
use smartroute_routing::Router;
use tokio::{net::TcpListener, sync::broadcast, task::JoinHandle};

use crate::session::Session;

/// Listener configuration
///
/// ```ron
/// listener: (
///     socket: "127.0.0.1:10099",
///     timeouts: (inactivity_secs: 600),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerConfig {
    #[serde(default = "default_socket")]
    pub socket: SocketAddr,
    #[serde(default)]
    pub timeouts: SessionTimeouts,
}

fn default_socket() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 10099))
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            socket: default_socket(),
            timeouts: SessionTimeouts::default(),
        }
    }
}

/// Number of client sessions currently open
#[derive(Debug, Clone, Default)]
pub struct SessionGauge(Arc<AtomicUsize>);

impl SessionGauge {
    #[must_use]
    pub fn active(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    fn enter(&self) -> SessionGuard {
        self.0.fetch_add(1, Ordering::Relaxed);
        SessionGuard(Arc::clone(&self.0))
    }
}

struct SessionGuard(Arc<AtomicUsize>);

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

pub struct TableServer {
    listener: TcpListener,
    router: Arc<Router>,
    timeouts: SessionTimeouts,
    sessions: SessionGauge,
}

impl TableServer {
    /// Bind the configured socket. Port `0` picks a free port.
    ///
    /// # Errors
    ///
    /// If the socket cannot be bound.
    pub async fn bind(config: &ListenerConfig, router: Arc<Router>) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(config.socket)
            .await
            .map_err(|source| ListenerError::BindFailed {
                address: config.socket.to_string(),
                source,
            })?;

        Ok(Self {
            listener,
            router,
            timeouts: config.timeouts.clone(),
            sessions: SessionGauge::default(),
        })
    }

    /// The address actually bound
    ///
    /// # Errors
    ///
    /// If the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr, ListenerError> {
        self.listener.local_addr().map_err(ListenerError::LocalAddress)
    }

    #[must_use]
    pub fn session_gauge(&self) -> SessionGauge {
        self.sessions.clone()
    }

    /// Accept connections until shutdown, then wait for open sessions.
    ///
    /// Accept failures are logged and do not stop the listener.
    ///
    /// # Errors
    ///
    /// Currently infallible once bound; failures are confined to sessions.
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) -> Result<(), ListenerError> {
        let address = self.local_addr()?;
        internal!(level = INFO, "Serving table lookups on {address}");

        let mut sessions: Vec<JoinHandle<()>> = Vec::new();

        loop {
            tokio::select! {
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown) | Err(broadcast::error::RecvError::Closed) => {
                            internal!(
                                level = INFO,
                                "Listener {address} received shutdown signal, finishing {} session(s) ...",
                                self.sessions.active()
                            );
                            break;
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                    }
                }

                connection = self.listener.accept() => {
                    let (stream, peer) = match connection {
                        Ok(connection) => connection,
                        Err(err) => {
                            internal!(level = ERROR, "{}", ListenerError::AcceptFailed(err));
                            continue;
                        }
                    };

                    sessions.retain(|session| !session.is_finished());

                    let guard = self.sessions.enter();
                    let session = Session::new(stream, peer, Arc::clone(&self.router), self.timeouts.clone());
                    let signal = shutdown.resubscribe();

                    sessions.push(tokio::spawn(async move {
                        let _guard = guard;
                        match session.run(signal).await {
                            Ok(()) => {}
                            Err(err) if err.is_shutdown() => {
                                internal!(level = DEBUG, "Session with {peer} closed for shutdown");
                            }
                            Err(err) if err.is_client_error() => {
                                internal!(level = INFO, "Session with {peer} ended: {err}");
                            }
                            Err(err) => {
                                internal!(level = ERROR, "Session with {peer} failed: {err}");
                            }
                        }
                    }));
                }
            }
        }

        for result in join_all(sessions).await {
            if let Err(err) = result {
                internal!(level = ERROR, "{}", ListenerError::SessionFailed(err));
            }
        }

        internal!(level = INFO, "Listener {address} stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use smartroute_routing::{MxCache, RoutingConfig, StaticMxLookup};
    use tokio::io::AsyncWriteExt;

    use super::*;

    fn router() -> Arc<Router> {
        Arc::new(Router::new(
            &RoutingConfig::default(),
            MxCache::new(Arc::new(StaticMxLookup::new()), Duration::ZERO),
        ))
    }

    fn ephemeral() -> ListenerConfig {
        ListenerConfig {
            socket: "127.0.0.1:0".parse().unwrap(),
            timeouts: SessionTimeouts { inactivity_secs: 0 },
        }
    }

    #[test]
    fn test_listener_config_defaults() {
        let config: ListenerConfig = ron::from_str("()").unwrap();
        assert_eq!(config, ListenerConfig::default());
        assert_eq!(config.socket.to_string(), "127.0.0.1:10099");
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let first = TableServer::bind(&ephemeral(), router()).await.unwrap();
        let taken = ListenerConfig {
            socket: first.local_addr().unwrap(),
            ..ephemeral()
        };

        let err = TableServer::bind(&taken, router()).await.err().unwrap();
        assert!(matches!(err, ListenerError::BindFailed { .. }));
    }

    #[tokio::test]
    async fn test_gauge_tracks_sessions_and_shutdown_waits() {
        let server = Arc::new(TableServer::bind(&ephemeral(), router()).await.unwrap());
        let address = server.local_addr().unwrap();
        let gauge = server.session_gauge();

        let (tx, rx) = broadcast::channel(4);
        let serving = tokio::spawn({
            let server = Arc::clone(&server);
            async move { server.serve(rx).await }
        });

        let mut client = tokio::net::TcpStream::connect(address).await.unwrap();
        client.write_all(b"get *\n").await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while gauge.active() != 1 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        tx.send(Signal::Shutdown).unwrap();
        serving.await.unwrap().unwrap();

        assert_eq!(gauge.active(), 0);
    }
}
