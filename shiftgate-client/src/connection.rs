//! Connection management.

use crate::error::ClientError;
use shiftgate_protocol::{
    read_packet, write_packet, Packet, RequestEnvelope, ResponseEnvelope, MAX_FRAME_SIZE,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server address.
    pub addr: SocketAddr,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Bound on one send + receive cycle.
    pub request_timeout: Duration,
    /// Largest response frame accepted.
    pub max_frame_size: u32,
}

impl ConnectionConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(7),
            request_timeout: Duration::from_secs(7),
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_frame_size(mut self, max: u32) -> Self {
        self.max_frame_size = max.min(MAX_FRAME_SIZE);
        self
    }
}

/// An open connection. Requests are strictly sequential.
pub struct Connection {
    config: ConnectionConfig,
    stream: TcpStream,
}

impl Connection {
    /// Connects to the server, bounded by the connect timeout.
    pub async fn connect(config: ConnectionConfig) -> Result<Self, ClientError> {
        tracing::debug!("Connecting to {}...", config.addr);

        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(config.addr))
            .await
            .map_err(|_| {
                tracing::debug!("Connection timeout");
                ClientError::ConnectTimeout(config.connect_timeout)
            })?
            .map_err(|e| {
                tracing::debug!("Connection failed: {}", e);
                ClientError::Io(e)
            })?;

        stream.set_nodelay(true).ok();

        Ok(Self { config, stream })
    }

    /// Sends one packet and waits for one packet back.
    pub async fn call(&mut self, packet: &Packet) -> Result<Packet, ClientError> {
        let timeout = self.config.request_timeout;
        let max = self.config.max_frame_size;
        let stream = &mut self.stream;

        let exchange = async move {
            write_packet(stream, packet).await?;
            tracing::debug!("Sent {} text bytes, awaiting response", packet.text.len());
            let response = read_packet(stream, max).await?;
            Ok::<_, ClientError>(response)
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| ClientError::RequestTimeout(timeout))?
    }
}

/// High-level client speaking request/response envelopes.
pub struct Client {
    connection: Connection,
}

impl Client {
    /// Connects a new client.
    pub async fn connect(config: ConnectionConfig) -> Result<Self, ClientError> {
        Ok(Self {
            connection: Connection::connect(config).await?,
        })
    }

    /// Sends a request and parses the response envelope.
    pub async fn send(&mut self, request: &RequestEnvelope) -> Result<ResponseEnvelope, ClientError> {
        let packet = request.to_packet()?;
        let response = self.connection.call(&packet).await?;
        Ok(response.json()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;

    async fn echo_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let packet = read_packet(&mut socket, MAX_FRAME_SIZE).await.unwrap();
            let request = RequestEnvelope::from_text(&packet.text).unwrap();
            let response = ResponseEnvelope::success(request.protocol, "echo")
                .with_data(request.data.unwrap_or_default());
            write_packet(&mut socket, &response.to_packet().unwrap())
                .await
                .unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_client_roundtrip() {
        let addr = echo_server().await;
        let mut client = Client::connect(ConnectionConfig::new(addr)).await.unwrap();

        let request = RequestEnvelope::new("login").with_data(json!({"id": "a"}));
        let response = client.send(&request).await.unwrap();

        assert!(response.is_success());
        assert_eq!(response.protocol, "login");
        assert_eq!(response.data.unwrap()["id"], "a");
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let silent = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let config = ConnectionConfig::new(addr).with_request_timeout(Duration::from_millis(200));
        let mut connection = Connection::connect(config).await.unwrap();
        let result = connection.call(&Packet::new("{}")).await;

        assert!(matches!(result, Err(ClientError::RequestTimeout(_))));
        silent.abort();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = Connection::connect(ConnectionConfig::new(addr)).await;
        assert!(matches!(result, Err(ClientError::Io(_))));
    }
}
