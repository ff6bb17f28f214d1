//! The upstream connection pool collaborator (§1, §4.9: out of scope for
//! this crate's own implementation, but the seam the `Destination` route
//! dispatches through).
//!
//! Production pool implementations (real TCP/UDS pools with connection
//! reuse, backoff, TKO tracking) live outside this crate. What's here is
//! the trait the routing core needs, plus a small in-memory `StaticPool`
//! used by tests and by the end-to-end scenarios in the test suite.

use crate::error::PoolError;
use crate::protocol::{Reply, Request};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A human-readable description of a destination, used by
/// `record_destination` during traversal/recording (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationDescriptor {
    pub pool_name: String,
    pub address_family: AddressFamily,
    pub server_index: usize,
}

/// Coarse transport family, enough for diagnostics without depending on
/// any concrete socket type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Inet,
    Inet6,
    Unix,
}

/// A pool of connections to one upstream memcached server (or a sharded
/// group presenting as one). `Destination` routes hold an `Arc<dyn
/// UpstreamPool>` and forward requests to it.
#[async_trait]
pub trait UpstreamPool: Send + Sync {
    /// Sends `request` upstream and returns its reply. Implementations
    /// are expected to do their own retries/backoff internally — this
    /// core never retries at the transport layer (§1 Non-goals).
    async fn send(&self, request: &Request) -> Result<Reply, PoolError>;

    /// Describes this pool for diagnostics/recording.
    fn describe(&self) -> DestinationDescriptor;
}

/// A pool that always returns the same canned reply, or cycles through a
/// scripted sequence. Used by unit and integration tests to stand in for
/// a real upstream.
pub struct StaticPool {
    descriptor: DestinationDescriptor,
    replies: Vec<Reply>,
    cursor: AtomicUsize,
    seen_keys: Mutex<Vec<crate::protocol::Key>>,
    connected: bool,
}

impl StaticPool {
    /// A pool that always replies with `reply`.
    #[must_use]
    pub fn new(pool_name: impl Into<String>, reply: Reply) -> Self {
        Self::scripted(pool_name, vec![reply])
    }

    /// A pool that replies with each entry of `replies` in turn, then
    /// repeats the last entry forever.
    #[must_use]
    pub fn scripted(pool_name: impl Into<String>, replies: Vec<Reply>) -> Self {
        assert!(!replies.is_empty(), "StaticPool needs at least one reply");
        Self {
            descriptor: DestinationDescriptor {
                pool_name: pool_name.into(),
                address_family: AddressFamily::Inet,
                server_index: 0,
            },
            replies,
            cursor: AtomicUsize::new(0),
            seen_keys: Mutex::new(Vec::new()),
            connected: true,
        }
    }

    /// A pool that reports `PoolError::NotConnected` for every request,
    /// exercising the §4.2 "not connected" edge case.
    #[must_use]
    pub fn disconnected(pool_name: impl Into<String>) -> Self {
        Self {
            connected: false,
            ..Self::new(pool_name, Reply::new(crate::protocol::ResultCode::ConnectError))
        }
    }

    /// Keys observed so far, in call order. Used by tests asserting
    /// fan-out reached every child (§8 "AllInitial fan-out").
    #[must_use]
    pub fn seen_keys(&self) -> Vec<crate::protocol::Key> {
        self.seen_keys.lock().expect("seen_keys lock poisoned").clone()
    }
}

#[async_trait]
impl UpstreamPool for StaticPool {
    async fn send(&self, request: &Request) -> Result<Reply, PoolError> {
        if !self.connected {
            return Err(PoolError::NotConnected);
        }
        self.seen_keys
            .lock()
            .expect("seen_keys lock poisoned")
            .push(request.key.clone());
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .get(idx)
            .or_else(|| self.replies.last())
            .expect("StaticPool always has at least one scripted reply")
            .clone();
        Ok(reply)
    }

    fn describe(&self) -> DestinationDescriptor {
        self.descriptor.clone()
    }
}
