//! The shadow route (§4.5): a decorator wrapping a normal child and a
//! list of shadow children, each gated by a hot-updatable key-hash
//! range. Shadow traffic never affects the client-visible reply and
//! never holds up client latency.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::protocol::{OperationType, Reply, Request};

use super::{RouteHandle, Visitor};

/// The hot-updatable gating parameters for one shadow child (§4.5). A
/// shadow key's hash must satisfy `lo <= H(key) < hi` for the request
/// to be mirrored. The spec notes a 128-bit atomic/seqlock would
/// suffice since reads only need to observe *some* recent consistent
/// pair; this crate uses a plain `Mutex<(u64, u64)>` for the same
/// correctness at the cost of a lock per read (see DESIGN.md).
pub struct ShadowSettings {
    range: Mutex<(u64, u64)>,
}

impl ShadowSettings {
    /// # Panics
    /// Panics if `lo > hi` — callers should validate ranges at
    /// config-load time (`RouteBuildError::InvalidShadowRange`)
    /// instead of constructing one directly with a bad range.
    #[must_use]
    pub fn new(lo: u64, hi: u64) -> Arc<Self> {
        assert!(lo <= hi, "shadow key range must satisfy lo <= hi");
        Arc::new(Self { range: Mutex::new((lo, hi)) })
    }

    /// Updates the gating range for subsequent requests only (§4.5).
    pub fn set_key_range(&self, lo: u64, hi: u64) {
        *self.range.lock().expect("shadow range lock poisoned") = (lo, hi);
    }

    #[must_use]
    pub fn contains(&self, hash: u64) -> bool {
        let (lo, hi) = *self.range.lock().expect("shadow range lock poisoned");
        lo <= hash && hash < hi
    }
}

/// Hook for transforming the request sent to a shadow child, and for
/// observing its (discarded) reply. The default policy does neither.
pub trait ShadowPolicy: Send + Sync {
    fn transform(&self, request: &Request) -> Request {
        request.clone()
    }

    fn on_shadow_reply(&self, _shadow_name: &str, _reply: &Reply) {}
}

/// The `"default"` shadow policy from §6's config shorthand.
pub struct DefaultShadowPolicy;

impl ShadowPolicy for DefaultShadowPolicy {}

pub struct Shadow {
    normal: Arc<dyn RouteHandle>,
    shadows: Vec<(Arc<dyn RouteHandle>, Arc<ShadowSettings>)>,
    policy: Arc<dyn ShadowPolicy>,
}

impl Shadow {
    #[must_use]
    pub fn new(
        normal: Arc<dyn RouteHandle>,
        shadows: Vec<(Arc<dyn RouteHandle>, Arc<ShadowSettings>)>,
        policy: Arc<dyn ShadowPolicy>,
    ) -> Arc<dyn RouteHandle> {
        Arc::new(Self { normal, shadows, policy })
    }
}

#[async_trait]
impl RouteHandle for Shadow {
    async fn route(&self, ctx: &Arc<RequestContext>, request: &Request, op: OperationType) -> Reply {
        let hash = request.key.hash64();
        for (shadow, settings) in &self.shadows {
            if !settings.contains(hash) {
                continue;
            }
            let shadow = Arc::clone(shadow);
            let shadow_request = self.policy.transform(request);
            let policy = Arc::clone(&self.policy);
            let shadow_name = shadow.name().to_string();
            let ctx_for_spawn = Arc::clone(ctx);
            ctx.spawn_background(async move {
                let reply = shadow.route(&ctx_for_spawn, &shadow_request, op).await;
                policy.on_shadow_reply(&shadow_name, &reply);
            });
        }
        self.normal.route(ctx, request, op).await
    }

    fn traverse(&self, request: &Request, op: OperationType, visitor: &mut dyn Visitor) {
        visitor.visit_child(&self.normal, request, op);
        self.normal.traverse(request, op, visitor);
        for (shadow, _settings) in &self.shadows {
            // Gating is data-dependent (depends on the key's hash at
            // dispatch time); traversal over-approximates by visiting
            // every shadow regardless of its current range (§4.1, §4.5
            // "Shadow keys are included in the request context's
            // recording visitor when recording").
            visitor.visit_child(shadow, request, op);
            shadow.traverse(request, op, visitor);
        }
    }

    fn name(&self) -> &str {
        "Shadow"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ConfigSnapshot, OwnedContext, Worker};
    use crate::domain_types::{Priority, WorkerId};
    use crate::pool::{StaticPool, UpstreamPool};
    use crate::protocol::ResultCode;
    use crate::route::terminal::{Destination, Null};

    async fn run_and_drain(
        route: Arc<dyn RouteHandle>,
        request: Request,
    ) -> Reply {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = std::sync::Mutex::new(Some(tx));
        let (worker, _loop) = Worker::spawn(WorkerId::from(0));
        let owned = OwnedContext::create(
            worker,
            request.clone(),
            |_| {},
            move || {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(());
                }
            },
            Priority::Normal,
        );
        let ctx = owned
            .process(Arc::new(ConfigSnapshot { version: 1, root: Null::new_handle() }))
            .unwrap();
        let reply = route.route(&ctx.as_arc(), &request, OperationType::Get).await;
        ctx.send_reply(reply.clone());
        rx.await.unwrap();
        reply
    }

    #[tokio::test]
    async fn shadow_gated_off_never_dispatches() {
        let normal_pool = Arc::new(StaticPool::new("normal", Reply::found("a")));
        let shadow_pool_a = Arc::new(StaticPool::new("shadow_a", Reply::new(ResultCode::Found)));
        let shadow_pool_b = Arc::new(StaticPool::new("shadow_b", Reply::new(ResultCode::Found)));
        let normal = Destination::new("normal", Arc::clone(&normal_pool) as Arc<dyn UpstreamPool>);
        let shadow_a = Destination::new("shadow_a", Arc::clone(&shadow_pool_a) as Arc<dyn UpstreamPool>);
        let shadow_b = Destination::new("shadow_b", Arc::clone(&shadow_pool_b) as Arc<dyn UpstreamPool>);

        // index_range=[0,1] but the key-range gate excludes every hash
        // (an empty [0, 0) interval): shadows never fire.
        let settings_a = ShadowSettings::new(0, 0);
        let settings_b = ShadowSettings::new(0, 0);
        let route = Shadow::new(
            normal,
            vec![(shadow_a, Arc::clone(&settings_a)), (shadow_b, Arc::clone(&settings_b))],
            Arc::new(DefaultShadowPolicy),
        );

        let request = Request::new(OperationType::Get, "key");
        let reply = run_and_drain(Arc::clone(&route), request.clone()).await;
        assert_eq!(reply.value.as_deref(), Some(&b"a"[..]));
        assert!(shadow_pool_a.seen_keys().is_empty());
        assert!(shadow_pool_b.seen_keys().is_empty());

        settings_a.set_key_range(0, u64::MAX);
        settings_b.set_key_range(0, u64::MAX);
        let reply = run_and_drain(route, request.clone()).await;
        assert_eq!(reply.value.as_deref(), Some(&b"a"[..]), "client reply is unaffected by shadows");
        assert_eq!(shadow_pool_a.seen_keys(), vec![request.key.clone()]);
        assert_eq!(shadow_pool_b.seen_keys(), vec![request.key.clone()]);
    }

    #[tokio::test]
    async fn shadow_non_interference_matches_bare_child() {
        let pool = Arc::new(StaticPool::new("normal", Reply::found("v")));
        let bare = Destination::new("normal", Arc::clone(&pool) as Arc<dyn UpstreamPool>);
        let bare_reply = run_and_drain(bare, Request::new(OperationType::Get, "k")).await;

        let pool2 = Arc::new(StaticPool::new("normal", Reply::found("v")));
        let wrapped = Shadow::new(
            Destination::new("normal", pool2 as Arc<dyn UpstreamPool>),
            vec![],
            Arc::new(DefaultShadowPolicy),
        );
        let wrapped_reply = run_and_drain(wrapped, Request::new(OperationType::Get, "k")).await;

        assert_eq!(bare_reply, wrapped_reply);
    }
}
