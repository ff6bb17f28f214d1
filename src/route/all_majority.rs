//! The all-majority route (§4.6): parallel fan-out, return the mode
//! reply, breaking ties toward the first child.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use crate::context::RequestContext;
use crate::protocol::{OperationType, Reply, Request, ResultCode};

use super::{traverse_children, RouteHandle, Visitor};

pub struct AllMajority {
    children: Vec<Arc<dyn RouteHandle>>,
}

impl AllMajority {
    #[must_use]
    pub fn new(children: Vec<Arc<dyn RouteHandle>>) -> Arc<dyn RouteHandle> {
        Arc::new(Self { children })
    }
}

#[async_trait]
impl RouteHandle for AllMajority {
    async fn route(&self, ctx: &Arc<RequestContext>, request: &Request, op: OperationType) -> Reply {
        if self.children.is_empty() {
            return Reply::new(op.null_route_result());
        }
        let futures = self.children.iter().map(|child| child.route(ctx, request, op));
        let replies = join_all(futures).await;

        let mut counts: HashMap<ResultCode, usize> = HashMap::new();
        for reply in &replies {
            *counts.entry(reply.result).or_insert(0) += 1;
        }
        let max_count = *counts.values().max().expect("non-empty children produce at least one reply");
        replies
            .into_iter()
            .find(|r| counts[&r.result] == max_count)
            .expect("at least one reply attains the max count")
    }

    fn traverse(&self, request: &Request, op: OperationType, visitor: &mut dyn Visitor) {
        traverse_children(&self.children, request, op, visitor);
    }

    fn name(&self) -> &str {
        "AllMajority"
    }
}
