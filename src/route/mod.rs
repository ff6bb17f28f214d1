//! The route-handle trait and the traversal visitor interface (§4.1,
//! §6). Concrete nodes live in the sibling modules; this module only
//! defines the uniform contract they share.

pub mod all_async;
pub mod all_initial;
pub mod all_majority;
pub mod all_sync;
pub mod failover;
pub mod hash;
pub mod latest;
pub mod random;
pub mod shadow;
pub mod terminal;

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::pool::DestinationDescriptor;
use crate::protocol::{OperationType, Reply, Request};

/// A description of a shard-splitting node, recorded during traversal
/// (§6: "Shard-splitting handles invoke `record_shard_splitter`").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSplitterDescriptor {
    pub name: String,
    pub shard_count: usize,
}

/// The uniform contract every node of the routing tree exposes (§4.1).
///
/// `route` is synchronous from the caller's perspective but may suspend
/// (here: `.await`) at any child call. `traverse` never dispatches or
/// touches `ctx`; it is a best-effort structural walk used by recording
/// and tests, and may over-approximate data-dependent branches (§4.1).
#[async_trait]
pub trait RouteHandle: Send + Sync {
    /// Dispatches `request` and returns exactly one reply.
    async fn route(&self, ctx: &Arc<RequestContext>, request: &Request, op: OperationType) -> Reply;

    /// Visits every child this node's `route` could contact, without
    /// dispatching anything.
    fn traverse(&self, request: &Request, op: OperationType, visitor: &mut dyn Visitor);

    /// A stable short identifier used in diagnostics and config (§4.1).
    fn name(&self) -> &str;
}

/// The visitor interface used by `traverse` (§4.1, §6). A parent node
/// calls `visit_child` for each child it holds before recursing into
/// that child's own `traverse`; terminal nodes additionally call
/// `visit_destination`/`visit_shard_splitter` on themselves.
pub trait Visitor {
    /// Called once per child encountered, before recursing into it.
    fn visit_child(&mut self, handle: &Arc<dyn RouteHandle>, request: &Request, op: OperationType);

    /// Called when traversal reaches a terminal `Destination`.
    fn visit_destination(&mut self, descriptor: &DestinationDescriptor, request: &Request, op: OperationType);

    /// Called when traversal reaches a shard-splitting node (e.g. `Hash`).
    fn visit_shard_splitter(&mut self, descriptor: &ShardSplitterDescriptor, request: &Request, op: OperationType);
}

/// A [`Visitor`] that forwards destination/shard-splitter sightings to a
/// recording [`RequestContext`] (§4.8 `record_destination`,
/// `record_shard_splitter`). This is what `SharedContext`-in-recording-mode
/// dispatch uses under the hood: `root.traverse(req, op, &mut
/// RecordingVisitor::new(&ctx))` visits every child the real `route()`
/// call could reach, regardless of short-circuiting, which is why a
/// recording traversal of a two-child `Failover` records both children
/// (§8 scenario 6) even though a `route()` call on the same tree might
/// only reach the first.
pub struct RecordingVisitor<'a> {
    ctx: &'a RequestContext,
}

impl<'a> RecordingVisitor<'a> {
    #[must_use]
    pub fn new(ctx: &'a RequestContext) -> Self {
        Self { ctx }
    }
}

impl<'a> Visitor for RecordingVisitor<'a> {
    fn visit_child(&mut self, _handle: &Arc<dyn RouteHandle>, _request: &Request, _op: OperationType) {}

    fn visit_destination(&mut self, descriptor: &DestinationDescriptor, _request: &Request, _op: OperationType) {
        self.ctx.record_destination(descriptor);
    }

    fn visit_shard_splitter(
        &mut self,
        descriptor: &ShardSplitterDescriptor,
        _request: &Request,
        _op: OperationType,
    ) {
        self.ctx.record_shard_splitter(descriptor);
    }
}

/// Runs a best-effort structural recording pass over `root`, per §6/§8
/// scenario 6. Touches no upstream transport and never calls
/// `send_reply`.
pub fn record_traversal(ctx: &RequestContext, root: &Arc<dyn RouteHandle>, request: &Request, op: OperationType) {
    let mut visitor = RecordingVisitor::new(ctx);
    root.traverse(request, op, &mut visitor);
}

/// Walks `children`, visiting each and recursing into its own
/// traversal — the shared body every fan-out composite's `traverse`
/// uses.
pub(crate) fn traverse_children(
    children: &[Arc<dyn RouteHandle>],
    request: &Request,
    op: OperationType,
    visitor: &mut dyn Visitor,
) {
    for child in children {
        visitor.visit_child(child, request, op);
        child.traverse(request, op, visitor);
    }
}
