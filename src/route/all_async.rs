//! The all-async route (§4.6): parallel fan-out, return Null
//! immediately; the context retains ownership until every child
//! completes in the background.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::protocol::{OperationType, Reply, Request};

use super::{traverse_children, RouteHandle, Visitor};

pub struct AllAsync {
    children: Vec<Arc<dyn RouteHandle>>,
}

impl AllAsync {
    #[must_use]
    pub fn new(children: Vec<Arc<dyn RouteHandle>>) -> Arc<dyn RouteHandle> {
        Arc::new(Self { children })
    }
}

#[async_trait]
impl RouteHandle for AllAsync {
    async fn route(&self, ctx: &Arc<RequestContext>, request: &Request, op: OperationType) -> Reply {
        for child in &self.children {
            let child = Arc::clone(child);
            let request = request.clone();
            let ctx_for_spawn = Arc::clone(ctx);
            ctx.spawn_background(async move {
                child.route(&ctx_for_spawn, &request, op).await;
            });
        }
        Reply::new(op.null_route_result())
    }

    fn traverse(&self, request: &Request, op: OperationType, visitor: &mut dyn Visitor) {
        traverse_children(&self.children, request, op, visitor);
    }

    fn name(&self) -> &str {
        "AllAsync"
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

    #[tokio::test]
    async fn returns_null_immediately_but_reaches_every_child() {
        let a = Arc::new(StaticPool::new("a", Reply::new(ResultCode::Found)));
        let b = Arc::new(StaticPool::new("b", Reply::new(ResultCode::Found)));
        let route = AllAsync::new(vec![
            Destination::new("a", Arc::clone(&a) as Arc<dyn UpstreamPool>),
            Destination::new("b", Arc::clone(&b) as Arc<dyn UpstreamPool>),
        ]);

        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = std::sync::Mutex::new(Some(tx));
        let (worker, _loop) = Worker::spawn(WorkerId::from(0));
        let owned = OwnedContext::create(
            worker,
            Request::new(OperationType::Get, "k"),
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

        let reply = route.route(&ctx.as_arc(), &Request::new(OperationType::Get, "k"), OperationType::Get).await;
        assert_eq!(reply.result, ResultCode::NotFound);
        ctx.send_reply(reply);
        rx.await.unwrap();
        assert_eq!(a.seen_keys().len(), 1);
        assert_eq!(b.seen_keys().len(), 1);
    }
}
