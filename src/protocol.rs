//! The memcached-protocol request/reply data model.
//!
//! The wire codec itself is out of scope for this crate (see the crate-level
//! docs); this module only defines the in-memory values that route handles
//! pass to one another. `Request` and `Reply` are immutable — a decorator
//! that needs to change a key builds a new `Request` rather than mutating
//! the one it was given.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A memcached key. Cheap to clone (backed by `Bytes`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key(Bytes);

impl Key {
    /// Builds a key from any byte-convertible value.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// 64-bit hash of the key, used by `Hash` routing and shadow key-range
    /// gating. Not guaranteed stable across process restarts or builds —
    /// callers needing a portable hash should not rely on this.
    #[must_use]
    pub fn hash64(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.0.hash(&mut hasher);
        hasher.finish()
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self(Bytes::from(s.into_bytes()))
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// The operation family a reply's error-failover classification is looked
/// up under (§4.7 of the spec: separate allow-lists for gets, updates,
/// deletes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationFamily {
    /// Read-only lookups (`get`, `gets`).
    Read,
    /// Writes that create/replace/mutate a value.
    Update,
    /// Deletions.
    Delete,
}

/// Runtime operation tag. A compile-time template-dispatch scheme is
/// possible in other languages; this crate uses a runtime enum plus a
/// per-family classifier table (see `FailoverErrors`), per the spec's
/// design note that no client-visible behavior depends on the choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    Get,
    Gets,
    Set,
    Add,
    Replace,
    Append,
    Prepend,
    Cas,
    Delete,
    Incr,
    Decr,
    Touch,
}

impl OperationType {
    /// Which failover allow-list this operation consults.
    #[must_use]
    pub fn family(self) -> OperationFamily {
        match self {
            Self::Get | Self::Gets => OperationFamily::Read,
            Self::Delete => OperationFamily::Delete,
            Self::Set
            | Self::Add
            | Self::Replace
            | Self::Append
            | Self::Prepend
            | Self::Cas
            | Self::Incr
            | Self::Decr
            | Self::Touch => OperationFamily::Update,
        }
    }

    /// The "no-op success" reply `NullRoute` returns for a write when there
    /// are no children to route to, vs. `notfound` for a read.
    #[must_use]
    pub fn null_route_result(self) -> ResultCode {
        match self.family() {
            OperationFamily::Read => ResultCode::NotFound,
            OperationFamily::Update => ResultCode::Stored,
            OperationFamily::Delete => ResultCode::Deleted,
        }
    }
}

/// An immutable client (or subrequest) request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub op: OperationType,
    pub key: Key,
    pub value: Option<Bytes>,
    pub flags: u32,
    pub exptime: u32,
    pub cas: Option<u64>,
}

impl Request {
    /// Builds a bare read/write request with no flags, expiry or cas token.
    #[must_use]
    pub fn new(op: OperationType, key: impl Into<Key>) -> Self {
        Self {
            op,
            key: key.into(),
            value: None,
            flags: 0,
            exptime: 0,
            cas: None,
        }
    }

    /// Returns a copy of this request with a different key. Used by
    /// decorators (e.g. a key-rewriting route) — never mutates `self`.
    #[must_use]
    pub fn with_key(&self, key: impl Into<Key>) -> Self {
        Self {
            key: key.into(),
            ..self.clone()
        }
    }

    /// Attaches a value payload, returning a new request.
    #[must_use]
    pub fn with_value(&self, value: impl Into<Bytes>) -> Self {
        Self {
            value: Some(value.into()),
            ..self.clone()
        }
    }
}

/// The closed result-code enumeration from §3. Every `route()` call
/// returns exactly one of these via a `Reply`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultCode {
    Found,
    NotFound,
    Stored,
    NotStored,
    Exists,
    Deleted,
    RemoteError,
    LocalError,
    ConnectError,
    ConnectTimeout,
    Timeout,
    Tko,
    Busy,
    TryAgain,
    BadKey,
    Aborted,
    Unknown,
}

/// The coarse partition of result codes used for failover classification
/// and for `AllSync`'s "worst reply" reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResultClass {
    Hit,
    Miss,
    SoftError,
    HardError,
    Unknown,
}

impl ResultCode {
    /// Classifies this result code per §3/§7.
    #[must_use]
    pub fn classify(self) -> ResultClass {
        match self {
            Self::Found | Self::Stored | Self::Deleted => ResultClass::Hit,
            Self::NotFound | Self::NotStored | Self::Exists => ResultClass::Miss,
            Self::RemoteError
            | Self::LocalError
            | Self::ConnectError
            | Self::ConnectTimeout
            | Self::Timeout
            | Self::Tko
            | Self::Busy
            | Self::TryAgain
            | Self::Aborted => ResultClass::SoftError,
            Self::BadKey => ResultClass::HardError,
            Self::Unknown => ResultClass::Unknown,
        }
    }
}

/// An immutable reply. Exactly one is produced per `route()` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub result: ResultCode,
    pub value: Option<Bytes>,
    pub flags: u32,
    pub cas: Option<u64>,
    /// Present only on `local_error`/protocol-error replies; surfaced to
    /// operators for diagnosing misconfiguration (§4.2 `ErrorRoute`).
    pub message: Option<String>,
}

impl Reply {
    /// Builds a bare reply carrying only a result code.
    #[must_use]
    pub fn new(result: ResultCode) -> Self {
        Self {
            result,
            value: None,
            flags: 0,
            cas: None,
            message: None,
        }
    }

    /// Builds a `found` reply carrying a value.
    #[must_use]
    pub fn found(value: impl Into<Bytes>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::new(ResultCode::Found)
        }
    }

    /// Builds a `local_error` reply carrying a diagnostic message.
    #[must_use]
    pub fn local_error(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(ResultCode::LocalError)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_hash_is_stable_within_process() {
        let a = Key::from("foo");
        let b = Key::from("foo");
        assert_eq!(a.hash64(), b.hash64());
    }

    #[test]
    fn request_with_key_does_not_mutate_original() {
        let original = Request::new(OperationType::Get, "k1");
        let rewritten = original.with_key("k2");
        assert_eq!(original.key, Key::from("k1"));
        assert_eq!(rewritten.key, Key::from("k2"));
    }

    #[test]
    fn classify_partitions_match_spec() {
        assert_eq!(ResultCode::NotStored.classify(), ResultClass::Miss);
        assert_eq!(ResultCode::Timeout.classify(), ResultClass::SoftError);
        assert_eq!(ResultCode::BadKey.classify(), ResultClass::HardError);
    }
}
