//! The JSON routing-tree factory (§6). Deserializes a declarative
//! configuration into a tree of [`crate::route::RouteHandle`]s, and
//! applies the factory collapse rules ("an empty children list
//! collapses to Null; a single-child failover collapses to the child
//! itself").
//!
//! The wire codec and the pool/config *loader* (watching a file, diffing
//! generations) are out of scope (§1); what lives here is the JSON
//! *decoding* of one snapshot into a tree, which the crate does own
//! (§1's scope note on this point).

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::classifier::FailoverErrors;
use crate::error::RouteBuildError;
use crate::pool::UpstreamPool;
use crate::route::all_async::AllAsync;
use crate::route::all_initial::AllInitial;
use crate::route::all_majority::AllMajority;
use crate::route::all_sync::AllSync;
use crate::route::failover::Failover;
use crate::route::hash::Hash;
use crate::route::shadow::{DefaultShadowPolicy, Shadow, ShadowPolicy, ShadowSettings};
use crate::route::terminal::{Destination, ErrorRoute, Null};
use crate::route::RouteHandle;

/// A parsed (but not yet built) route configuration node. Deserializes
/// either a tagged object (`{"type": "...", ...}`) or — per §6 — a bare
/// JSON array, which this crate treats as `FailoverRoute` shorthand
/// (matching the convention that an array standing in for a route
/// handle is an ordered failover list; see DESIGN.md for why the other
/// composites can't share this shorthand unambiguously).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RouteConfig {
    Bare(Vec<RouteConfig>),
    Tagged(TaggedRouteConfig),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum TaggedRouteConfig {
    FailoverRoute {
        children: Vec<RouteConfig>,
        #[serde(default)]
        failover_errors: Option<FailoverErrors>,
    },
    AllInitialRoute {
        children: Vec<RouteConfig>,
    },
    AllSyncRoute {
        children: Vec<RouteConfig>,
    },
    AllAsyncRoute {
        children: Vec<RouteConfig>,
    },
    AllMajorityRoute {
        children: Vec<RouteConfig>,
    },
    HashRoute {
        children: Vec<RouteConfig>,
    },
    RandomRoute {
        children: Vec<RouteConfig>,
    },
    NullRoute,
    ErrorRoute {
        message: String,
    },
    DestinationRoute {
        pool: String,
    },
    ShadowRoute {
        normal: Box<RouteConfig>,
        shadows: Vec<ShadowEntryConfig>,
        #[serde(default)]
        shadow_policy: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
pub struct ShadowEntryConfig {
    pub target: RouteConfig,
    #[serde(default)]
    pub index_range: Option<[u64; 2]>,
    #[serde(default)]
    pub key_fraction_range: Option<[f64; 2]>,
}

/// The pools a `DestinationRoute` config can refer to by name.
pub type PoolRegistry = HashMap<String, Arc<dyn UpstreamPool>>;

/// Builds a route tree from a parsed [`RouteConfig`], resolving
/// `DestinationRoute { pool }` entries against `pools`.
///
/// # Errors
/// Returns `RouteBuildError::UnknownPool` if a destination names a pool
/// not present in `pools`, or `InvalidShadowRange`/`InvalidKeyFractionRange`
/// if a shadow entry's range is malformed.
pub fn build(config: &RouteConfig, pools: &PoolRegistry) -> Result<Arc<dyn RouteHandle>, RouteBuildError> {
    match config {
        RouteConfig::Bare(children) => build_failover(children, None, pools),
        RouteConfig::Tagged(tagged) => build_tagged(tagged, pools),
    }
}

/// Parses `json` and builds it in one step.
///
/// # Errors
/// See [`build`]; additionally returns `RouteBuildError::MalformedConfig`
/// if `json` does not parse.
pub fn from_json(json: &str, pools: &PoolRegistry) -> Result<Arc<dyn RouteHandle>, RouteBuildError> {
    let parsed: RouteConfig = serde_json::from_str(json)?;
    build(&parsed, pools)
}

fn build_tagged(tagged: &TaggedRouteConfig, pools: &PoolRegistry) -> Result<Arc<dyn RouteHandle>, RouteBuildError> {
    match tagged {
        TaggedRouteConfig::FailoverRoute { children, failover_errors } => {
            build_failover(children, failover_errors.clone(), pools)
        }
        TaggedRouteConfig::AllInitialRoute { children } => {
            let built = build_all(children, pools)?;
            Ok(if built.is_empty() { Null::new_handle() } else { AllInitial::new(built) })
        }
        TaggedRouteConfig::AllSyncRoute { children } => {
            let built = build_all(children, pools)?;
            Ok(if built.is_empty() { Null::new_handle() } else { AllSync::new(built) })
        }
        TaggedRouteConfig::AllAsyncRoute { children } => {
            let built = build_all(children, pools)?;
            Ok(if built.is_empty() { Null::new_handle() } else { AllAsync::new(built) })
        }
        TaggedRouteConfig::AllMajorityRoute { children } => {
            let built = build_all(children, pools)?;
            Ok(if built.is_empty() { Null::new_handle() } else { AllMajority::new(built) })
        }
        TaggedRouteConfig::HashRoute { children } => {
            let built = build_all(children, pools)?;
            Ok(if built.is_empty() { Null::new_handle() } else { Hash::new(built) })
        }
        TaggedRouteConfig::RandomRoute { children } => {
            let built = build_all(children, pools)?;
            Ok(if built.is_empty() { Null::new_handle() } else { crate::route::random::Random::new(built) })
        }
        TaggedRouteConfig::NullRoute => Ok(Null::new_handle()),
        TaggedRouteConfig::ErrorRoute { message } => Ok(ErrorRoute::new(message.clone())),
        TaggedRouteConfig::DestinationRoute { pool } => {
            let handle = pools.get(pool).cloned().ok_or_else(|| RouteBuildError::UnknownPool(pool.clone()))?;
            Ok(Destination::new(pool.clone(), handle))
        }
        TaggedRouteConfig::ShadowRoute { normal, shadows, shadow_policy } => {
            let normal_handle = build(normal, pools)?;
            let mut built_shadows = Vec::with_capacity(shadows.len());
            for entry in shadows {
                let target = build(&entry.target, pools)?;
                let (lo, hi) = shadow_range(entry)?;
                built_shadows.push((target, ShadowSettings::new(lo, hi)));
            }
            let policy: Arc<dyn ShadowPolicy> = match shadow_policy.as_deref() {
                None | Some("default") => Arc::new(DefaultShadowPolicy),
                Some(other) => return Err(RouteBuildError::UnknownRouteType(format!("shadow_policy:{other}"))),
            };
            Ok(Shadow::new(normal_handle, built_shadows, policy))
        }
    }
}

fn shadow_range(entry: &ShadowEntryConfig) -> Result<(u64, u64), RouteBuildError> {
    if let Some([lo, hi]) = entry.key_fraction_range {
        if !(0.0..=1.0).contains(&lo) || !(0.0..=1.0).contains(&hi) || lo > hi {
            return Err(RouteBuildError::InvalidKeyFractionRange { lo, hi });
        }
        let max = u64::MAX as f64;
        return Ok(((lo * max) as u64, (hi * max) as u64));
    }
    // index_range is reserved for sharded-pool indexing in the source
    // system; this crate's ShadowSettings gates purely on key hash
    // (§4.5), so a bare index_range with no key_fraction_range means
    // "shadow everything" (the widest possible range).
    if entry.index_range.is_some() {
        return Ok((0, u64::MAX));
    }
    Err(RouteBuildError::InvalidShadowRange { lo: 0, hi: 0 })
}

fn build_all(children: &[RouteConfig], pools: &PoolRegistry) -> Result<Vec<Arc<dyn RouteHandle>>, RouteBuildError> {
    children.iter().map(|c| build(c, pools)).collect()
}

/// Builds a `Failover` (or bare-array shorthand), applying the §6
/// collapse rules: zero children -> `Null`, exactly one -> the child
/// itself, peeling the `Failover` layer away entirely.
fn build_failover(
    children: &[RouteConfig],
    errors: Option<FailoverErrors>,
    pools: &PoolRegistry,
) -> Result<Arc<dyn RouteHandle>, RouteBuildError> {
    let built = build_all(children, pools)?;
    match built.len() {
        0 => Ok(Null::new_handle()),
        1 => Ok(built.into_iter().next().expect("len checked above")),
        _ => Ok(Failover::new(built, errors.unwrap_or_default())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::StaticPool;
    use crate::protocol::{OperationType, Request, ResultCode};

    fn pools_with(names: &[&str]) -> PoolRegistry {
        names
            .iter()
            .map(|n| {
                let pool: Arc<dyn UpstreamPool> = Arc::new(StaticPool::new(*n, crate::protocol::Reply::new(ResultCode::Found)));
                ((*n).to_string(), pool)
            })
            .collect()
    }

    #[test]
    fn bare_array_is_failover_shorthand() {
        let pools = pools_with(&["a", "b"]);
        let json = r#"[
            {"type": "DestinationRoute", "pool": "a"},
            {"type": "DestinationRoute", "pool": "b"}
        ]"#;
        let route = from_json(json, &pools).unwrap();
        assert_eq!(route.name(), "Failover");
    }

    #[test]
    fn single_child_failover_collapses_to_child() {
        let pools = pools_with(&["a"]);
        let json = r#"{"type": "FailoverRoute", "children": [{"type": "DestinationRoute", "pool": "a"}]}"#;
        let route = from_json(json, &pools).unwrap();
        assert_eq!(route.name(), "a");
    }

    #[test]
    fn empty_children_collapses_to_null() {
        let pools = pools_with(&[]);
        let json = r#"{"type": "FailoverRoute", "children": []}"#;
        let route = from_json(json, &pools).unwrap();
        assert_eq!(route.name(), "Null");
    }

    #[test]
    fn unknown_pool_is_an_error() {
        let pools = pools_with(&[]);
        let json = r#"{"type": "DestinationRoute", "pool": "missing"}"#;
        let err = from_json(json, &pools).unwrap_err();
        assert!(matches!(err, RouteBuildError::UnknownPool(name) if name == "missing"));
    }

    #[tokio::test]
    async fn shadow_route_builds_with_key_fraction_range() {
        let pools = pools_with(&["normal", "shadow"]);
        let json = r#"{
            "type": "ShadowRoute",
            "normal": {"type": "DestinationRoute", "pool": "normal"},
            "shadows": [{"target": {"type": "DestinationRoute", "pool": "shadow"}, "key_fraction_range": [0.0, 1.0]}]
        }"#;
        let route = from_json(json, &pools).unwrap();
        assert_eq!(route.name(), "Shadow");
        let (worker, _loop) = crate::context::Worker::spawn(crate::domain_types::WorkerId::from(0));
        let owned = crate::context::OwnedContext::create(
            worker,
            Request::new(OperationType::Get, "k"),
            |_| {},
            || {},
            crate::domain_types::Priority::Normal,
        );
        let ctx = owned
            .process(Arc::new(crate::context::ConfigSnapshot { version: 1, root: Arc::clone(&route) }))
            .unwrap();
        let reply = route.route(&ctx.as_arc(), &Request::new(OperationType::Get, "k"), OperationType::Get).await;
        assert_eq!(reply.result, ResultCode::Found);
    }
}
