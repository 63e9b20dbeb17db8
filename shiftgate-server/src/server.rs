//! TCP server implementation.

use crate::config::Config;
use crate::error::ServerError;
use crate::router::ProtocolRouter;
use crate::session::Session;
use crate::store::{DataStore, StoreConnector};
use shiftgate_protocol::{write_packet, Decoder, MAX_FRAME_SIZE};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Idle connection timeout.
    pub idle_timeout: Duration,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Largest accepted frame.
    pub max_frame_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], shiftgate_protocol::DEFAULT_PORT)),
            idle_timeout: Duration::from_secs(300),
            max_connections: 1000,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_max_frame_size(mut self, max: u32) -> Self {
        self.max_frame_size = max.min(MAX_FRAME_SIZE);
        self
    }
}

impl From<&Config> for ServerConfig {
    fn from(config: &Config) -> Self {
        Self {
            bind_addr: config.network.bind_addr,
            idle_timeout: config.network.idle_timeout(),
            max_connections: config.network.max_connections,
            max_frame_size: config.frame.max_frame_size(),
        }
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub requests_total: AtomicU64,
    pub errors_total: AtomicU64,
}

/// TCP server for shiftgate.
pub struct Server {
    config: ServerConfig,
    router: Arc<ProtocolRouter>,
    connector: Arc<dyn StoreConnector>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server.
    pub fn new(
        config: ServerConfig,
        router: Arc<ProtocolRouter>,
        connector: Arc<dyn StoreConnector>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            router,
            connector,
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Binds the configured address.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        Ok(TcpListener::bind(self.config.bind_addr).await?)
    }

    /// Binds and runs the server until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accepts connections on `listener` until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        let mut shutdown_rx = self.shutdown.subscribe();
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("Server listening on {}", local_addr);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.accept(stream, addr),
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
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

    /// Spawns the task serving one accepted connection.
    fn accept(&self, stream: TcpStream, addr: SocketAddr) {
        if self.stats.connections_active.load(Ordering::Relaxed)
            >= self.config.max_connections as u64
        {
            tracing::warn!("Connection limit reached, rejecting {}", addr);
            return;
        }

        self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
        self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

        let router = self.router.clone();
        let connector = self.connector.clone();
        let stats = self.stats.clone();
        let config = self.config.clone();
        let mut conn_shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            let result = match connector.connect() {
                Ok(store) => {
                    Self::handle_connection(
                        stream,
                        addr,
                        router,
                        store,
                        &config,
                        &stats,
                        &mut conn_shutdown,
                    )
                    .await
                }
                Err(e) => Err(ServerError::Store(e)),
            };

            match result {
                Ok(()) | Err(ServerError::ShuttingDown) => {}
                Err(ServerError::Protocol(e)) if e.is_transport() => {
                    tracing::warn!("[{}] Closing connection: {}", addr, e);
                    stats.errors_total.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    tracing::debug!("Connection {} error: {}", addr, e);
                    stats.errors_total.fetch_add(1, Ordering::Relaxed);
                }
            }

            stats.connections_active.fetch_sub(1, Ordering::Relaxed);
            tracing::info!("Client disconnected: {}", addr);
        });
    }

    /// Serves one connection: requests are answered one at a time, in order.
    async fn handle_connection(
        mut stream: TcpStream,
        addr: SocketAddr,
        router: Arc<ProtocolRouter>,
        mut store: Box<dyn DataStore>,
        config: &ServerConfig,
        stats: &ServerStats,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        stream.set_nodelay(true).ok();
        let mut session = Session::new(addr);
        tracing::info!("Client connected: {} (session {})", addr, session.id);

        let mut decoder = Decoder::with_max_frame_size(config.max_frame_size);
        let mut buf = [0u8; 8192];

        loop {
            tokio::select! {
                result = stream.read(&mut buf) => {
                    match result {
                        Ok(0) => {
                            tracing::debug!(
                                "[{}] Connection closed by client after {} requests ({:?})",
                                addr,
                                session.request_count(),
                                session.age()
                            );
                            decoder.finish()?;
                            return Ok(());
                        }
                        Ok(n) => {
                            tracing::debug!("[{}] Received {} bytes", addr, n);
                            decoder.extend(&buf[..n]);
                        }
                        Err(e) => {
                            tracing::debug!("[{}] Read error: {}", addr, e);
                            return Err(ServerError::Io(e));
                        }
                    }
                }

                _ = tokio::time::sleep(config.idle_timeout) => {
                    if session.idle_duration() >= config.idle_timeout {
                        tracing::info!("[{}] Idle timeout", addr);
                        return Ok(());
                    }
                }

                _ = shutdown.recv() => {
                    tracing::debug!("[{}] Shutdown signal received", addr);
                    return Err(ServerError::ShuttingDown);
                }
            }

            while let Some(packet) = decoder.decode_packet()? {
                let seq = session.record_request();
                stats.requests_total.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    "[{}] Request #{}: {} text bytes, {} payload bytes",
                    addr,
                    seq,
                    packet.text.len(),
                    packet.payload.len()
                );

                let response = router.dispatch(&packet.text, store.as_mut()).await;

                tracing::info!(
                    "[{}] Response: {} {} (#{})",
                    addr,
                    response.protocol,
                    if response.is_success() { "success" } else { "fail" },
                    seq
                );

                write_packet(&mut stream, &response.to_packet()?).await?;
            }

            if decoder.buffered() > 0 {
                tracing::debug!("[{}] {} bytes awaiting frame completion", addr, decoder.buffered());
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
}
