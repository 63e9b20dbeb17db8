//! Per-connection session state.

use std::net::SocketAddr;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// A client session. Owned by the task serving its connection.
#[derive(Debug)]
pub struct Session {
    /// Unique session ID.
    pub id: String,

    /// Remote address.
    pub remote_addr: SocketAddr,

    /// Requests answered so far.
    request_count: u64,

    /// Session creation time.
    created_at: Instant,

    /// Last completed request, or creation time.
    last_activity: Instant,
}

impl Session {
    pub fn new(remote_addr: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4().to_string(),
            remote_addr,
            request_count: 0,
            created_at: now,
            last_activity: now,
        }
    }

    /// Records a complete request and returns its sequence number.
    pub fn record_request(&mut self) -> u64 {
        self.request_count += 1;
        self.last_activity = Instant::now();
        self.request_count
    }

    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    /// Time since the last complete request.
    pub fn idle_duration(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Time since the session was created.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}
