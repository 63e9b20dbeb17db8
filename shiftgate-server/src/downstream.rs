//! Synchronous proxy to the compute engine.
//!
//! Every call opens its own connection, sends one request packet, reads one
//! response packet and drops the socket. Nothing is pooled or reused.
//!
//! Compute engine replies are normalized before handlers see them:
//! 1. the text is parsed as JSON;
//! 2. a JSON string holding JSON is parsed again (double-encoded replies);
//! 3. an object wrapping the real reply under a wrapper key is unwrapped
//!    one level.

use crate::config::DownstreamConfig;
use serde_json::{Map, Value};
use shiftgate_client::{ClientError, Connection, ConnectionConfig};
use shiftgate_protocol::{ProtocolError, RequestEnvelope, RespStatus, ResponseEnvelope};
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Keys under which the compute engine may nest its actual reply.
const WRAPPER_KEYS: &[&str] = &["response_data"];

/// Downstream call failures.
#[derive(Debug, Error)]
pub enum DownstreamError {
    #[error("compute engine request could not be encoded: {0}")]
    EncodeFailed(ProtocolError),

    #[error("compute engine connect failed: {0}")]
    ConnectFailed(ClientError),

    #[error("compute engine transfer failed: {0}")]
    TransferFailed(ClientError),

    #[error("compute engine sent an invalid response: {0}")]
    InvalidResponse(String),
}

/// Proxy to the external compute engine.
#[derive(Debug, Clone)]
pub struct DownstreamProxy {
    addr: SocketAddr,
    connect_timeout: Duration,
    read_timeout: Duration,
    max_frame_size: u32,
    diagnostics_path: Option<PathBuf>,
}

impl DownstreamProxy {
    pub fn new(config: &DownstreamConfig, max_frame_size: u32) -> Self {
        Self {
            addr: config.addr,
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
            max_frame_size,
            diagnostics_path: config.diagnostics_path().map(PathBuf::from),
        }
    }

    /// Sends `request` to the compute engine and returns its normalized reply.
    ///
    /// The returned envelope echoes the request protocol. `resp` is `fail`
    /// only when the engine itself said so; `data` holds the unwrapped reply
    /// object.
    pub async fn call(&self, request: &RequestEnvelope) -> Result<ResponseEnvelope, DownstreamError> {
        let packet = request.to_packet().map_err(DownstreamError::EncodeFailed)?;
        packet
            .header()
            .and_then(|header| header.validate(self.max_frame_size))
            .map_err(DownstreamError::EncodeFailed)?;

        let config = ConnectionConfig::new(self.addr)
            .with_connect_timeout(self.connect_timeout)
            .with_request_timeout(self.read_timeout)
            .with_max_frame_size(self.max_frame_size);

        tracing::info!("Downstream call {} -> {}", request.protocol, self.addr);
        let mut connection = Connection::connect(config)
            .await
            .map_err(DownstreamError::ConnectFailed)?;
        let result = connection.call(&packet).await;
        drop(connection);
        let response = result.map_err(DownstreamError::TransferFailed)?;

        tracing::debug!(
            "Downstream reply: {} text bytes, {} payload bytes",
            response.text.len(),
            response.payload.len()
        );
        self.persist(&response.text).await;

        let reply = normalize_reply(&response.text)?;
        Ok(into_envelope(&request.protocol, reply))
    }

    /// Writes the raw reply for later inspection. Failures are only logged.
    async fn persist(&self, raw: &[u8]) {
        let Some(path) = self.diagnostics_path.clone() else {
            return;
        };
        let raw = raw.to_vec();
        let target = path.clone();
        let result = match tokio::task::spawn_blocking(move || replace_file(&target, &raw)).await {
            Ok(result) => result,
            Err(e) => Err(std::io::Error::other(e)),
        };
        if let Err(e) = result {
            tracing::warn!(
                "Failed to persist downstream response to {}: {}",
                path.display(),
                e
            );
        }
    }
}

/// Replaces `path` with `raw` by renaming a finished temp file over it, so
/// overlapping writers never leave a mix of two replies.
fn replace_file(path: &Path, raw: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(raw)?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Parses and unwraps a raw compute engine reply into its effective object.
pub fn normalize_reply(text: &[u8]) -> Result<Map<String, Value>, DownstreamError> {
    let value: Value =
        serde_json::from_slice(text).map_err(|e| DownstreamError::InvalidResponse(e.to_string()))?;
    let mut object = expect_object(decode_nested(value)?)?;

    if let Some(key) = WRAPPER_KEYS.iter().find(|k| object.contains_key(**k)) {
        if let Some(inner) = object.remove(*key) {
            tracing::debug!("Unwrapping downstream reply from '{}'", key);
            object = expect_object(decode_nested(inner)?)?;
        }
    }

    Ok(object)
}

/// Parses a JSON string that itself carries JSON.
fn decode_nested(value: Value) -> Result<Value, DownstreamError> {
    match value {
        Value::String(inner) => serde_json::from_str(&inner)
            .map_err(|e| DownstreamError::InvalidResponse(e.to_string())),
        other => Ok(other),
    }
}

fn expect_object(value: Value) -> Result<Map<String, Value>, DownstreamError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(DownstreamError::InvalidResponse(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn into_envelope(protocol: &str, reply: Map<String, Value>) -> ResponseEnvelope {
    let failed = reply.get("resp").and_then(Value::as_str) == Some("fail");
    let message = reply
        .get("message")
        .or_else(|| reply.get("error"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    ResponseEnvelope {
        protocol: protocol.to_string(),
        resp: if failed {
            RespStatus::Fail
        } else {
            RespStatus::Success
        },
        message,
        data: Some(Value::Object(reply)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shiftgate_protocol::{read_packet, write_packet, Packet, MAX_FRAME_SIZE};
    use tokio::net::TcpListener;

    /// Fake compute engine answering one request with `reply` as raw text.
    async fn fake_engine(reply: &'static [u8]) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_packet(&mut socket, MAX_FRAME_SIZE).await.unwrap();
            write_packet(&mut socket, &Packet::new(reply)).await.unwrap();
        });
        addr
    }

    fn proxy_for(addr: SocketAddr, diagnostics: Option<PathBuf>) -> DownstreamProxy {
        let config = DownstreamConfig {
            addr,
            connect_timeout_secs: 1,
            read_timeout_secs: 1,
            diagnostics_path: diagnostics.unwrap_or_default(),
        };
        DownstreamProxy::new(&config, MAX_FRAME_SIZE)
    }

    #[test]
    fn test_normalize_plain_object() {
        let reply = normalize_reply(br#"{"resp":"success","data":[]}"#).unwrap();
        assert_eq!(reply["resp"], "success");
    }

    #[test]
    fn test_normalize_double_encoded() {
        let reply = normalize_reply(br#""{\"status\":\"ok\"}""#).unwrap();
        assert_eq!(Value::Object(reply), json!({"status": "ok"}));
    }

    #[test]
    fn test_normalize_wrapper() {
        let reply = normalize_reply(br#"{"response_data": {"schedule": []}}"#).unwrap();
        assert_eq!(Value::Object(reply), json!({"schedule": []}));
    }

    #[test]
    fn test_normalize_double_encoded_wrapper() {
        let reply = normalize_reply(br#"{"response_data": "{\"schedule\": [1]}"}"#).unwrap();
        assert_eq!(Value::Object(reply), json!({"schedule": [1]}));
    }

    #[test]
    fn test_normalize_failures() {
        assert!(matches!(
            normalize_reply(b"{oops"),
            Err(DownstreamError::InvalidResponse(_))
        ));
        assert!(matches!(
            normalize_reply(br#""not json inside""#),
            Err(DownstreamError::InvalidResponse(_))
        ));
        let err = normalize_reply(b"[1,2]").unwrap_err();
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn test_envelope_status() {
        let reply = normalize_reply(br#"{"resp":"fail","message":"infeasible"}"#).unwrap();
        let envelope = into_envelope("py_gen_timetable", reply);
        assert!(!envelope.is_success());
        assert_eq!(envelope.message, "infeasible");

        let reply = normalize_reply(br#"{"error":"solver crashed"}"#).unwrap();
        let envelope = into_envelope("py_gen_timetable", reply);
        assert!(envelope.is_success());
        assert_eq!(envelope.message, "solver crashed");
    }

    #[tokio::test]
    async fn test_call_roundtrip_persists_raw() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("last.json");
        let raw: &'static [u8] = br#"{"response_data": {"schedule": []}}"#;
        let addr = fake_engine(raw).await;

        let proxy = proxy_for(addr, Some(path.clone()));
        let response = proxy
            .call(&RequestEnvelope::new("py_gen_timetable"))
            .await
            .unwrap();

        assert!(response.is_success());
        assert_eq!(response.protocol, "py_gen_timetable");
        assert_eq!(response.data.unwrap(), json!({"schedule": []}));
        assert_eq!(std::fs::read(&path).unwrap(), raw);
    }

    #[tokio::test]
    async fn test_persist_failure_does_not_fail_call() {
        let dir = tempfile::TempDir::new().unwrap();
        let unwritable = dir.path().join("missing-dir").join("last.json");
        let addr = fake_engine(br#"{"status":"ok"}"#).await;

        let proxy = proxy_for(addr, Some(unwritable));
        let response = proxy.call(&RequestEnvelope::new("x")).await.unwrap();
        assert_eq!(response.data.unwrap()["status"], "ok");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overlapping_persists_leave_one_whole_reply() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("last.json");
        let proxy = proxy_for("127.0.0.1:9".parse().unwrap(), Some(path.clone()));
        let large = vec![b'L'; 4 * 1024 * 1024];
        let small = b"small-body".to_vec();

        for _ in 0..25 {
            let (a, b) = (proxy.clone(), proxy.clone());
            let (large_ref, small_ref) = (large.clone(), small.clone());
            let first = tokio::spawn(async move { a.persist(&large_ref).await });
            let second = tokio::spawn(async move { b.persist(&small_ref).await });
            first.await.unwrap();
            second.await.unwrap();

            let written = std::fs::read(&path).unwrap();
            assert!(written == large || written == small, "mixed file of {} bytes", written.len());
        }

        // Only the target file remains; temp files were renamed into place.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_oversized_request_fails_before_connecting() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = DownstreamConfig {
            addr,
            connect_timeout_secs: 1,
            read_timeout_secs: 1,
            diagnostics_path: PathBuf::new(),
        };
        let proxy = DownstreamProxy::new(&config, 64);
        let request = RequestEnvelope::new("py_req_handover_summary")
            .with_data(json!({"input_text": "x".repeat(100)}));

        let err = proxy.call(&request).await.unwrap_err();
        assert!(matches!(err, DownstreamError::EncodeFailed(_)));
        assert!(err.to_string().starts_with("compute engine request could not be encoded"));
    }

    #[tokio::test]
    async fn test_connect_failed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = proxy_for(addr, None).call(&RequestEnvelope::new("x")).await;
        assert!(matches!(result, Err(DownstreamError::ConnectFailed(_))));
    }

    #[tokio::test]
    async fn test_silent_engine_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let engine = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let started = std::time::Instant::now();
        let result = proxy_for(addr, None).call(&RequestEnvelope::new("x")).await;
        assert!(matches!(
            result,
            Err(DownstreamError::TransferFailed(ClientError::RequestTimeout(_)))
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
        engine.abort();
    }

    #[tokio::test]
    async fn test_engine_closes_without_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_packet(&mut socket, MAX_FRAME_SIZE).await.unwrap();
        });

        let result = proxy_for(addr, None).call(&RequestEnvelope::new("x")).await;
        assert!(matches!(result, Err(DownstreamError::TransferFailed(_))));
    }
}
