//! UDP responder.

use crate::config::NetworkConfig;
use crate::error::ServerError;
use crate::handler::RequestHandler;
use crate::metrics::Metrics;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Receive buffer size in bytes.
    pub recv_buffer_size: usize,
    /// Metrics instance (if metrics are enabled).
    pub metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("recv_buffer_size", &self.recv_buffer_size)
            .field("metrics_enabled", &self.metrics.is_some())
            .finish()
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            recv_buffer_size: 65535,
            metrics: None,
        }
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns whether metrics are enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics.is_some()
    }
}

impl From<&NetworkConfig> for ServerConfig {
    fn from(network: &NetworkConfig) -> Self {
        Self {
            bind_addr: network.bind_addr,
            recv_buffer_size: network.recv_buffer_size,
            metrics: None,
        }
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub datagrams_received: AtomicU64,
    pub replies_sent: AtomicU64,
    pub errors_total: AtomicU64,
}

/// UDP responder for SLP requests.
pub struct Server {
    config: ServerConfig,
    socket: UdpSocket,
    handler: Arc<RequestHandler>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Binds the responder socket.
    pub async fn bind(config: ServerConfig, handler: RequestHandler) -> Result<Self, ServerError> {
        let handler = match config.metrics {
            Some(ref metrics) => handler.with_metrics(metrics.clone()),
            None => handler,
        };
        let socket = UdpSocket::bind(config.bind_addr).await?;
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            socket,
            handler: Arc::new(handler),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        })
    }

    /// Returns the address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    /// Answers datagrams until [`Server::shutdown`] is called.
    pub async fn run(&self) -> Result<(), ServerError> {
        let mut shutdown_rx = self.shutdown.subscribe();
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(
            "Server listening on {} ({} services)",
            self.local_addr()?,
            self.handler.services().len()
        );

        let mut buf = vec![0u8; self.config.recv_buffer_size];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, peer)) => self.answer(&buf[..len], peer).await,
                        Err(e) => {
                            // ICMP port unreachable from an earlier send surfaces here on some platforms.
                            tracing::warn!("Receive error: {}", e);
                            self.stats.errors_total.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn answer(&self, datagram: &[u8], peer: SocketAddr) {
        if datagram.is_empty() {
            tracing::debug!("[{}] Ignoring empty datagram", peer);
            return;
        }

        self.stats.datagrams_received.fetch_add(1, Ordering::Relaxed);
        if let Some(ref metrics) = self.config.metrics {
            metrics.datagrams_total.inc();
        }
        tracing::trace!("[{}] Received {} bytes: {:02x?}", peer, datagram.len(), datagram);

        let reply = self.handler.handle(datagram);
        match self.socket.send_to(&reply, peer).await {
            Ok(_) => {
                self.stats.replies_sent.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("[{}] Sent {} bytes", peer, reply.len());
            }
            Err(e) => {
                tracing::warn!("[{}] Failed to send reply: {}", peer, e);
                self.stats.errors_total.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Returns the request handler.
    pub fn handler(&self) -> &Arc<RequestHandler> {
        &self.handler
    }
}
