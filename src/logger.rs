//! Stats/logging collaborator (§1, §4.8: `on_reply_received` logs a
//! sample via the primary and any additional loggers). Statistics
//! aggregation itself is out of scope; this is the seam.

use crate::domain_types::RequestId;
use crate::protocol::{OperationType, Reply, Request};

/// One successfully-completed request, ready for a stats backend to
/// aggregate.
#[derive(Debug, Clone)]
pub struct ReplySample {
    pub request_id: RequestId,
    pub op: OperationType,
    pub result: crate::protocol::ResultCode,
    pub start_us: i64,
    pub end_us: i64,
}

impl ReplySample {
    #[must_use]
    pub fn latency_us(&self) -> i64 {
        self.end_us - self.start_us
    }
}

/// A sink for completed-request samples. `RequestContext::on_reply_received`
/// (§4.8) calls every logger attached to the context exactly once per
/// reply, in normal mode only.
pub trait ReplyLogger: Send + Sync {
    fn log(&self, sample: &ReplySample, request: &Request, reply: &Reply);
}

/// A logger that discards everything. The default when no logger is
/// configured.
#[derive(Debug, Default)]
pub struct NullLogger;

impl ReplyLogger for NullLogger {
    fn log(&self, _sample: &ReplySample, _request: &Request, _reply: &Reply) {}
}

/// A logger that accumulates samples in memory, for assertions in tests.
#[derive(Debug, Default)]
pub struct CollectingLogger {
    samples: std::sync::Mutex<Vec<ReplySample>>,
}

impl CollectingLogger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn samples(&self) -> Vec<ReplySample> {
        self.samples.lock().expect("samples lock poisoned").clone()
    }
}

impl ReplyLogger for CollectingLogger {
    fn log(&self, sample: &ReplySample, _request: &Request, _reply: &Reply) {
        self.samples
            .lock()
            .expect("samples lock poisoned")
            .push(sample.clone());
    }
}
