//! Terminal routes (§4.2): `Null`, `Error`, `Destination`. None of
//! these have children; their `traverse` either does nothing or
//! records itself.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::context::RequestContext;
use crate::pool::UpstreamPool;
use crate::protocol::{OperationType, Reply, Request};

use super::{RouteHandle, Visitor};

/// Returns a default "no-op success" reply and never touches anything
/// else (§4.2). The empty-children collapse that factories perform
/// (§6: "an empty children list collapses to Null") produces one of
/// these.
pub struct Null;

impl Null {
    #[must_use]
    pub fn new_handle() -> Arc<dyn RouteHandle> {
        Arc::new(Self)
    }
}

#[async_trait]
impl RouteHandle for Null {
    async fn route(&self, _ctx: &Arc<RequestContext>, _request: &Request, op: OperationType) -> Reply {
        Reply::new(op.null_route_result())
    }

    fn traverse(&self, _request: &Request, _op: OperationType, _visitor: &mut dyn Visitor) {}

    fn name(&self) -> &str {
        "Null"
    }
}

/// Surfaces a configured `local_error` on every request routed through
/// it (§4.2, §6 "Configuration errors at tree-build time surface as
/// Error-route instances").
pub struct ErrorRoute {
    message: String,
}

impl ErrorRoute {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Arc<dyn RouteHandle> {
        Arc::new(Self { message: message.into() })
    }
}

#[async_trait]
impl RouteHandle for ErrorRoute {
    async fn route(&self, _ctx: &Arc<RequestContext>, _request: &Request, _op: OperationType) -> Reply {
        Reply::local_error(self.message.clone())
    }

    fn traverse(&self, _request: &Request, _op: OperationType, _visitor: &mut dyn Visitor) {}

    fn name(&self) -> &str {
        "Error"
    }
}

/// Forwards the request to one upstream pool (§4.2). In recording mode,
/// calls the context's destination visitor and returns a synthetic
/// reply instead of dispatching. A pool reporting "not connected"
/// synthesizes `connect_error` without blocking (§4.2 edge case).
pub struct Destination {
    pool: Arc<dyn UpstreamPool>,
    name: String,
}

impl Destination {
    #[must_use]
    pub fn new(name: impl Into<String>, pool: Arc<dyn UpstreamPool>) -> Arc<dyn RouteHandle> {
        Arc::new(Self { pool, name: name.into() })
    }
}

#[async_trait]
impl RouteHandle for Destination {
    async fn route(&self, ctx: &Arc<RequestContext>, request: &Request, _op: OperationType) -> Reply {
        let descriptor = self.pool.describe();
        if ctx.is_recording() {
            ctx.record_destination(&descriptor);
            return Reply::new(crate::protocol::ResultCode::Found);
        }
        match self.pool.send(request).await {
            Ok(reply) => reply,
            Err(crate::error::PoolError::NotConnected) => {
                debug!(pool = %descriptor.pool_name, "pool not connected");
                Reply::new(crate::protocol::ResultCode::ConnectError)
            }
            Err(crate::error::PoolError::Transport(msg)) => Reply::local_error(msg),
        }
    }

    fn traverse(&self, request: &Request, op: OperationType, visitor: &mut dyn Visitor) {
        visitor.visit_destination(&self.pool.describe(), request, op);
    }

    fn name(&self) -> &str {
        &self.name
    }
}
