//! Small domain primitives, to avoid primitive obsession for the handful
//! of values in the core that are easy to mix up (a raw `u64` request id
//! vs. a raw `u64` worker id, say).

use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A process-monotonic request identifier (§3: "stable 64-bit request id,
/// monotonic per process").
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    From,
    Into
))]
pub struct RequestId(u64);

/// Process-wide counter backing [`RequestId::next`].
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

impl RequestId {
    /// Allocates the next request id. Monotonic within the process, not
    /// meaningful across restarts.
    #[must_use]
    pub fn next() -> Self {
        Self::new(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identifies the worker (OS thread + its single-threaded scheduler, §5)
/// a request is pinned to.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    From,
    Into
))]
pub struct WorkerId(u32);

/// Request priority (§3/§4.8). Only two values exist in the source;
/// modeled as a closed enum rather than an ordered numeric priority since
/// nothing in the spec compares priorities, only branches on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Priority {
    Critical,
    #[default]
    Normal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_monotonic() {
        let a = RequestId::next();
        let b = RequestId::next();
        assert!(b.into_inner() > a.into_inner());
    }
}
