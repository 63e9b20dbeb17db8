//! Protocol router.
//!
//! Maps a request's `protocol` name to a registered [`Handler`], validates
//! the request `data` against the handler's required fields and turns every
//! outcome into a [`ResponseEnvelope`]. Nothing that reaches the router can
//! close a connection.

use crate::downstream::DownstreamProxy;
use crate::error::HandlerError;
use crate::store::DataStore;
use async_trait::async_trait;
use serde_json::{Map, Value};
use shiftgate_protocol::message::UNKNOWN_PROTOCOL;
use shiftgate_protocol::{ProtocolError, RequestEnvelope, ResponseEnvelope};
use std::collections::HashMap;

pub const MSG_UNKNOWN_PROTOCOL: &str = "unknown protocol";
pub const MSG_MALFORMED_REQUEST: &str = "malformed request";
pub const MSG_MISSING_PARAMETER: &str = "missing required parameter";
pub const MSG_INVALID_JSON: &str = "invalid json";
pub const MSG_MISSING_PROTOCOL: &str = "missing protocol";

/// Collaborators a handler may use for one request.
pub struct HandlerContext<'a> {
    pub store: &'a mut dyn DataStore,
    pub downstream: &'a DownstreamProxy,
}

/// Successful handler result.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerOutput {
    pub message: String,
    pub data: Option<Value>,
}

impl HandlerOutput {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A protocol handler. Handlers keep no state between requests.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Fields that must be present and non-empty in `data`.
    fn required_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Data attached to the fail response when `handle` returns an error.
    fn fail_data(&self) -> Option<Value> {
        None
    }

    async fn handle(
        &self,
        data: &Map<String, Value>,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<HandlerOutput, HandlerError>;
}

/// Registry of protocol handlers.
pub struct ProtocolRouter {
    handlers: HashMap<String, Box<dyn Handler>>,
    downstream: DownstreamProxy,
}

impl ProtocolRouter {
    pub fn new(downstream: DownstreamProxy) -> Self {
        Self {
            handlers: HashMap::new(),
            downstream,
        }
    }

    /// Registers `handler` under `protocol`, replacing any previous one.
    pub fn register(&mut self, protocol: impl Into<String>, handler: impl Handler + 'static) {
        self.handlers.insert(protocol.into(), Box::new(handler));
    }

    pub fn with_handler(mut self, protocol: impl Into<String>, handler: impl Handler + 'static) -> Self {
        self.register(protocol, handler);
        self
    }

    /// Returns whether a handler is registered for `protocol`.
    pub fn contains(&self, protocol: &str) -> bool {
        self.handlers.contains_key(protocol)
    }

    /// Registered protocol names, sorted.
    pub fn protocols(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Parses a request text segment and routes it.
    pub async fn dispatch(&self, text: &[u8], store: &mut dyn DataStore) -> ResponseEnvelope {
        match RequestEnvelope::from_text(text) {
            Ok(request) => self.route(&request, store).await,
            Err(ProtocolError::MissingField(_)) => {
                tracing::warn!("Request without protocol field");
                ResponseEnvelope::fail(UNKNOWN_PROTOCOL, MSG_MISSING_PROTOCOL)
            }
            Err(e) => {
                tracing::warn!("Unparseable request: {}", e);
                ResponseEnvelope::fail(UNKNOWN_PROTOCOL, MSG_INVALID_JSON)
            }
        }
    }

    /// Routes a parsed request to its handler.
    pub async fn route(&self, request: &RequestEnvelope, store: &mut dyn DataStore) -> ResponseEnvelope {
        let protocol = request.protocol.as_str();
        let Some(handler) = self.handlers.get(protocol) else {
            tracing::warn!("Unknown protocol: {}", protocol);
            return ResponseEnvelope::fail(protocol, MSG_UNKNOWN_PROTOCOL);
        };

        let empty = Map::new();
        let required = handler.required_fields();
        let data = match request.data_object() {
            Some(map) => map,
            None if request.data.is_none() && required.is_empty() => &empty,
            None => {
                tracing::debug!("{}: data missing or not an object", protocol);
                return ResponseEnvelope::fail(protocol, MSG_MALFORMED_REQUEST);
            }
        };

        if let Some(field) = required.iter().find(|f| is_blank(data.get(**f))) {
            tracing::debug!("{}: missing required field '{}'", protocol, field);
            return ResponseEnvelope::fail(protocol, MSG_MISSING_PARAMETER);
        }

        let mut ctx = HandlerContext {
            store,
            downstream: &self.downstream,
        };
        match handler.handle(data, &mut ctx).await {
            Ok(output) => {
                let response = ResponseEnvelope::success(protocol, output.message);
                match output.data {
                    Some(data) => response.with_data(data),
                    None => response,
                }
            }
            Err(e) => {
                tracing::warn!("{} failed: {}", protocol, e);
                let response = ResponseEnvelope::fail(protocol, e.to_string());
                match handler.fail_data() {
                    Some(data) => response.with_data(data),
                    None => response,
                }
            }
        }
    }
}

/// Absent, null, and empty-string values count as missing.
fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::DownstreamConfig;
    use crate::store::tests::seeded_store;
    use crate::store::{
        AdminContext, AdminLogin, MemoryStore, ShiftRequest, StaffInfo, StaffLogin, StoreError,
    };
    use serde_json::json;
    use shiftgate_protocol::{RespStatus, MAX_FRAME_SIZE};

    /// Wraps a [`MemoryStore`] and counts every call made through it.
    pub(crate) struct CountingStore {
        pub inner: MemoryStore,
        pub calls: usize,
    }

    impl CountingStore {
        pub(crate) fn new() -> Self {
            Self {
                inner: seeded_store(),
                calls: 0,
            }
        }
    }

    impl DataStore for CountingStore {
        fn login(&mut self, id: &str, pw: &str) -> Result<StaffLogin, StoreError> {
            self.calls += 1;
            self.inner.login(id, pw)
        }

        fn login_admin(&mut self, id: &str, pw: &str) -> Result<AdminLogin, StoreError> {
            self.calls += 1;
            self.inner.login_admin(id, pw)
        }

        fn shift_change_detail(
            &mut self,
            staff_uid: i64,
            year_month: &str,
        ) -> Result<Vec<ShiftRequest>, StoreError> {
            self.calls += 1;
            self.inner.shift_change_detail(staff_uid, year_month)
        }

        fn ask_shift_change(
            &mut self,
            staff_uid: i64,
            date: &str,
            duty_type: &str,
            message: &str,
        ) -> Result<i64, StoreError> {
            self.calls += 1;
            self.inner.ask_shift_change(staff_uid, date, duty_type, message)
        }

        fn cancel_shift_change(&mut self, duty_request_uid: i64) -> Result<ShiftRequest, StoreError> {
            self.calls += 1;
            self.inner.cancel_shift_change(duty_request_uid)
        }

        fn admin_context(
            &mut self,
            admin_uid: i64,
            year_month: &str,
        ) -> Result<AdminContext, StoreError> {
            self.calls += 1;
            self.inner.admin_context(admin_uid, year_month)
        }

        fn staff_by_team(&mut self, team_uid: i64) -> Result<Vec<StaffInfo>, StoreError> {
            self.calls += 1;
            self.inner.staff_by_team(team_uid)
        }

        fn insert_schedule(
            &mut self,
            date: &str,
            staff_uid: i64,
            shift: &str,
        ) -> Result<(), StoreError> {
            self.calls += 1;
            self.inner.insert_schedule(date, staff_uid, shift)
        }
    }

    pub(crate) fn offline_proxy() -> DownstreamProxy {
        DownstreamProxy::new(&DownstreamConfig::default(), MAX_FRAME_SIZE)
    }

    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        fn required_fields(&self) -> &'static [&'static str] {
            &["value"]
        }

        async fn handle(
            &self,
            data: &Map<String, Value>,
            _ctx: &mut HandlerContext<'_>,
        ) -> Result<HandlerOutput, HandlerError> {
            Ok(HandlerOutput::new("echoed").with_data(Value::Object(data.clone())))
        }
    }

    struct Ping;

    #[async_trait]
    impl Handler for Ping {
        async fn handle(
            &self,
            data: &Map<String, Value>,
            _ctx: &mut HandlerContext<'_>,
        ) -> Result<HandlerOutput, HandlerError> {
            Ok(HandlerOutput::new(format!("pong {}", data.len())))
        }
    }

    struct Refuse;

    #[async_trait]
    impl Handler for Refuse {
        fn fail_data(&self) -> Option<Value> {
            Some(json!({"reason": ""}))
        }

        async fn handle(
            &self,
            _data: &Map<String, Value>,
            _ctx: &mut HandlerContext<'_>,
        ) -> Result<HandlerOutput, HandlerError> {
            Err(HandlerError::Rejected("not today".to_string()))
        }
    }

    fn router() -> ProtocolRouter {
        ProtocolRouter::new(offline_proxy())
            .with_handler("echo", Echo)
            .with_handler("ping", Ping)
            .with_handler("refuse", Refuse)
    }

    #[tokio::test]
    async fn test_unknown_protocol() {
        let mut store = CountingStore::new();
        let resp = router().dispatch(br#"{"protocol":"nope"}"#, &mut store).await;
        assert_eq!(resp.protocol, "nope");
        assert_eq!(resp.resp, RespStatus::Fail);
        assert_eq!(resp.message, MSG_UNKNOWN_PROTOCOL);
    }

    #[tokio::test]
    async fn test_invalid_json_and_missing_protocol() {
        let mut store = CountingStore::new();
        let router = router();

        let resp = router.dispatch(b"{oops", &mut store).await;
        assert_eq!(resp.protocol, UNKNOWN_PROTOCOL);
        assert_eq!(resp.message, MSG_INVALID_JSON);

        let resp = router.dispatch(br#"{"data":{}}"#, &mut store).await;
        assert_eq!(resp.protocol, UNKNOWN_PROTOCOL);
        assert_eq!(resp.message, MSG_MISSING_PROTOCOL);
    }

    #[tokio::test]
    async fn test_malformed_data() {
        let mut store = CountingStore::new();
        let router = router();

        let resp = router.dispatch(br#"{"protocol":"echo"}"#, &mut store).await;
        assert_eq!(resp.message, MSG_MALFORMED_REQUEST);

        let resp = router
            .dispatch(br#"{"protocol":"echo","data":[1]}"#, &mut store)
            .await;
        assert_eq!(resp.message, MSG_MALFORMED_REQUEST);
    }

    #[tokio::test]
    async fn test_blank_required_field() {
        let mut store = CountingStore::new();
        let router = router();
        for data in [json!({}), json!({"value": null}), json!({"value": ""})] {
            let request = RequestEnvelope::new("echo").with_data(data);
            let resp = router.route(&request, &mut store).await;
            assert_eq!(resp.message, MSG_MISSING_PARAMETER);
        }

        let request = RequestEnvelope::new("echo").with_data(json!({"value": 0}));
        let resp = router.route(&request, &mut store).await;
        assert!(resp.is_success());
        assert_eq!(resp.data.unwrap(), json!({"value": 0}));
    }

    #[tokio::test]
    async fn test_no_required_fields_accepts_missing_data() {
        let mut store = CountingStore::new();
        let resp = router()
            .route(&RequestEnvelope::new("ping"), &mut store)
            .await;
        assert!(resp.is_success());
        assert_eq!(resp.message, "pong 0");
        assert!(resp.data.is_none());
    }

    #[tokio::test]
    async fn test_handler_error_becomes_fail() {
        let mut store = CountingStore::new();
        let resp = router()
            .route(&RequestEnvelope::new("refuse"), &mut store)
            .await;
        assert_eq!(resp.protocol, "refuse");
        assert_eq!(resp.resp, RespStatus::Fail);
        assert_eq!(resp.message, "not today");
        assert_eq!(resp.data.unwrap(), json!({"reason": ""}));

        // Validation failures never reach the handler, so carry no data.
        let request = RequestEnvelope::new("refuse").with_data(json!([1]));
        let resp = router().route(&request, &mut store).await;
        assert_eq!(resp.message, MSG_MALFORMED_REQUEST);
        assert!(resp.data.is_none());
    }

    #[test]
    fn test_registry() {
        let router = router();
        assert!(router.contains("echo"));
        assert!(!router.contains("nope"));
        assert_eq!(router.protocols(), vec!["echo", "ping", "refuse"]);
    }
}
