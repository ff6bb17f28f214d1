//! Failover-error classification (§4.7): three operation-family
//! allow-lists deciding whether a reply should trigger the next child
//! in a `Failover` (or be treated as terminal).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::protocol::{OperationFamily, ResultCode};

/// `should_failover(reply, op)` per §4.7: selects the allow-list for
/// `op`'s family and checks membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverErrors {
    gets: HashSet<ResultCode>,
    updates: HashSet<ResultCode>,
    deletes: HashSet<ResultCode>,
}

impl FailoverErrors {
    /// An empty classifier: nothing ever triggers failover.
    #[must_use]
    pub fn none() -> Self {
        Self {
            gets: HashSet::new(),
            updates: HashSet::new(),
            deletes: HashSet::new(),
        }
    }

    /// The §4.7 defaults: connect/local/remote errors and timeouts
    /// trigger failover for every operation family; hits, misses, and
    /// application-level negatives (`notstored`, etc.) do not.
    #[must_use]
    pub fn defaults() -> Self {
        let triggers: HashSet<ResultCode> = [
            ResultCode::ConnectError,
            ResultCode::ConnectTimeout,
            ResultCode::Timeout,
            ResultCode::Tko,
            ResultCode::LocalError,
            ResultCode::RemoteError,
            ResultCode::Busy,
            ResultCode::TryAgain,
        ]
        .into_iter()
        .collect();
        Self {
            gets: triggers.clone(),
            updates: triggers.clone(),
            deletes: triggers,
        }
    }

    /// Whether `result` should trigger failover for operations in
    /// `family`.
    #[must_use]
    pub fn should_failover(&self, result: ResultCode, family: OperationFamily) -> bool {
        match family {
            OperationFamily::Read => self.gets.contains(&result),
            OperationFamily::Update => self.updates.contains(&result),
            OperationFamily::Delete => self.deletes.contains(&result),
        }
    }
}

impl Default for FailoverErrors {
    fn default() -> Self {
        Self::defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_trigger_on_soft_errors_not_on_application_negatives() {
        let c = FailoverErrors::defaults();
        assert!(c.should_failover(ResultCode::Timeout, OperationFamily::Read));
        assert!(!c.should_failover(ResultCode::NotFound, OperationFamily::Read));
        assert!(!c.should_failover(ResultCode::NotStored, OperationFamily::Update));
        assert!(c.should_failover(ResultCode::ConnectError, OperationFamily::Delete));
    }

    #[test]
    fn none_never_triggers() {
        let c = FailoverErrors::none();
        assert!(!c.should_failover(ResultCode::Timeout, OperationFamily::Read));
    }
}
