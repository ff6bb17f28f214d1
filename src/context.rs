//! The per-request context (§3, §4.8): the object carried by reference
//! through every route handle invocation and every subrequest fiber it
//! spawns.
//!
//! The source models "normal vs. recording" as a tagged union with a
//! boolean discriminator and warns that its layout "relies on never
//! accessing the wrong arm" (§9 Open Questions). This module replaces
//! that with an explicit `Mode` enum, so the wrong arm simply cannot be
//! reached.
//!
//! "Fiber" (§5) is realized here as a `tokio` task; "the worker's main
//! stack" (§4.8 destruction hop, §9 Design Notes) is realized as a
//! dedicated task draining a queue — a `post-to-worker-queue primitive`,
//! per the spec's own suggestion, rather than anything stack-related.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::domain_types::{Priority, RequestId, WorkerId};
use crate::error::ContextError;
use crate::logger::{ReplyLogger, ReplySample};
use crate::pool::DestinationDescriptor;
use crate::protocol::{OperationType, Reply, Request};
use crate::route::{RouteHandle, ShardSplitterDescriptor};

/// A job handed to a worker's main task: either the `request_complete`
/// callback for a just-finished context, or a context's own teardown
/// (§4.8 "destruction is hopped to the main stack before running its
/// destructor").
type MainJob = Box<dyn FnOnce() + Send>;

/// The owner of a single-threaded scheduler (§5: "each worker owns a
/// single-threaded cooperative fiber scheduler"). In this crate a
/// "fiber" is a `tokio` task, so the worker's only remaining job is
/// hosting the main-stack queue that context completion and teardown
/// hop to.
pub struct Worker {
    id: WorkerId,
    main_tx: mpsc::UnboundedSender<MainJob>,
}

impl Worker {
    /// Spawns a worker with its main-task loop already running. Returns
    /// the worker handle and the loop's `JoinHandle`, so callers can
    /// drain it on shutdown (§5 "a worker shutdown drains outstanding
    /// fibers before final teardown").
    #[must_use]
    pub fn spawn(id: WorkerId) -> (Arc<Self>, JoinHandle<()>) {
        let (main_tx, mut main_rx) = mpsc::unbounded_channel::<MainJob>();
        let worker = Arc::new(Self { id, main_tx });
        let loop_handle = tokio::spawn(async move {
            while let Some(job) = main_rx.recv().await {
                job();
            }
        });
        (worker, loop_handle)
    }

    #[must_use]
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Posts a job to run on this worker's main task rather than
    /// whichever fiber happens to be dropping the last reference.
    fn post_main(&self, job: MainJob) {
        // The receiver only disappears once the worker itself has shut
        // down; at that point there is nowhere left to run completion
        // jobs, so dropping them is correct.
        let _ = self.main_tx.send(job);
    }
}

/// The immutable configuration snapshot a context pins for its entire
/// life (§3 invariant 5: "reclaiming a superseded configuration is
/// delayed until all in-flight contexts observing it are gone").
pub struct ConfigSnapshot {
    pub version: u64,
    pub root: Arc<dyn RouteHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextState {
    New,
    Processing,
    Replied,
    Completed,
}

struct NormalState {
    enqueue_reply: Box<dyn Fn(Reply) + Send + Sync>,
    request_complete: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    loggers: Vec<Arc<dyn ReplyLogger>>,
}

struct RecordingState {
    on_destination: Option<Box<dyn Fn(&DestinationDescriptor) + Send + Sync>>,
    on_shard_splitter: Option<Box<dyn Fn(&ShardSplitterDescriptor) + Send + Sync>>,
}

enum Mode {
    Normal(NormalState),
    Recording(RecordingState),
}

/// The central per-request entity (§3, §4.8). Always held behind an
/// `Arc`; [`OwnedContext`] and [`SharedContext`] are thin typestate
/// wrappers that make the `New`-only `process()` transition and the
/// shared-from-then-on lifetime a compile-time property instead of a
/// runtime check.
pub struct RequestContext {
    id: RequestId,
    worker: Arc<Worker>,
    original_request: Option<Request>,
    priority: Priority,
    user_ip: String,
    failover_disabled: bool,
    config: OnceLock<Arc<ConfigSnapshot>>,
    state: Mutex<ContextState>,
    reply_slot: Mutex<Option<Reply>>,
    outstanding: AtomicUsize,
    mode: Mode,
    teardown: Mutex<Option<MainJob>>,
}

impl RequestContext {
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.id
    }

    /// The originating client connection/request identifier. The wire
    /// front-end that would hand this out is out of scope (§1), so this
    /// crate treats it as an alias of `request_id`.
    #[must_use]
    pub fn sender_id(&self) -> RequestId {
        self.id
    }

    #[must_use]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    #[must_use]
    pub fn failover_disabled(&self) -> bool {
        self.failover_disabled
    }

    #[must_use]
    pub fn user_ip(&self) -> &str {
        &self.user_ip
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        matches!(self.mode, Mode::Recording(_))
    }

    /// The request that created this context, if any. Recording
    /// contexts (§4.8 `create_recording`) are not tied to one request.
    #[must_use]
    pub fn original_request(&self) -> Option<&Request> {
        self.original_request.as_ref()
    }

    /// The route tree this context was processed against. Fails with
    /// `ContextError::NotAvailable` on a recording context, or one not
    /// yet processed.
    pub fn proxy_route(&self) -> Result<Arc<dyn RouteHandle>, ContextError> {
        if self.is_recording() {
            return Err(ContextError::NotAvailable);
        }
        self.config
            .get()
            .map(|c| Arc::clone(&c.root))
            .ok_or(ContextError::NotAvailable)
    }

    /// The configuration snapshot pinned by this context.
    pub fn proxy_config(&self) -> Result<Arc<ConfigSnapshot>, ContextError> {
        if self.is_recording() {
            return Err(ContextError::NotAvailable);
        }
        self.config.get().cloned().ok_or(ContextError::NotAvailable)
    }

    /// Stores `reply` if no reply has been stored yet, and invokes the
    /// `enqueue_reply` callback exactly once (§4.8, invariant 2). Must
    /// not be called on a recording context.
    pub fn send_reply(&self, reply: Reply) {
        let Mode::Normal(normal) = &self.mode else {
            panic!("send_reply must not be called on a recording context");
        };
        {
            let mut slot = self.reply_slot.lock().expect("reply slot poisoned");
            if slot.is_some() {
                return;
            }
            *slot = Some(reply.clone());
        }
        {
            let mut state = self.state.lock().expect("state lock poisoned");
            *state = ContextState::Replied;
        }
        trace!(request_id = %self.id, result = ?reply.result, "sending reply");
        (normal.enqueue_reply)(reply);
        self.maybe_complete(normal);
    }

    /// Invokes the destination visitor in recording mode; no-op in
    /// normal mode (§4.8, §6).
    pub fn record_destination(&self, descriptor: &DestinationDescriptor) {
        if let Mode::Recording(rec) = &self.mode {
            if let Some(cb) = &rec.on_destination {
                cb(descriptor);
            }
        }
    }

    /// Invokes the shard-splitter visitor in recording mode; no-op in
    /// normal mode (§4.8, §6).
    pub fn record_shard_splitter(&self, descriptor: &ShardSplitterDescriptor) {
        if let Mode::Recording(rec) = &self.mode {
            if let Some(cb) = &rec.on_shard_splitter {
                cb(descriptor);
            }
        }
    }

    /// Logs a completed-request sample via every attached logger.
    /// No-op in recording mode (§4.8).
    pub fn on_reply_received(
        &self,
        request: &Request,
        reply: &Reply,
        start_us: i64,
        end_us: i64,
        op: OperationType,
    ) {
        if let Mode::Normal(normal) = &self.mode {
            let sample = ReplySample {
                request_id: self.id,
                op,
                result: reply.result,
                start_us,
                end_us,
            };
            for logger in &normal.loggers {
                logger.log(&sample, request, reply);
            }
        }
    }

    /// Runs `fut` on a background fiber held alive by this context's
    /// shared ownership (§4.4 AllInitial, §4.5 Shadow, §4.6 AllAsync).
    /// The context cannot reach `Completed` until every such fiber
    /// finishes, even after the client-visible reply has already gone
    /// out.
    pub fn spawn_background<F>(self: &Arc<Self>, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let ctx = Arc::clone(self);
        tokio::spawn(async move {
            fut.await;
            let remaining = ctx.outstanding.fetch_sub(1, Ordering::SeqCst) - 1;
            trace!(request_id = %ctx.id, remaining, "background fiber finished");
            if let Mode::Normal(normal) = &ctx.mode {
                ctx.maybe_complete(normal);
            }
        })
    }

    fn maybe_complete(&self, normal: &NormalState) {
        let mut state = self.state.lock().expect("state lock poisoned");
        if *state == ContextState::Replied && self.outstanding.load(Ordering::SeqCst) == 0 {
            *state = ContextState::Completed;
            drop(state);
            if let Some(cb) = normal
                .request_complete
                .lock()
                .expect("request_complete poisoned")
                .take()
            {
                debug!(request_id = %self.id, "context completed, posting request_complete");
                self.worker.post_main(cb);
            }
        }
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        if let Some(job) = self.teardown.lock().expect("teardown poisoned").take() {
            self.worker.post_main(job);
        }
    }
}

/// A context under exclusive ownership, between `create` and `process`
/// (§3 Lifecycle). Not `Clone`: there is exactly one owner until it is
/// converted to shared.
pub struct OwnedContext(Arc<RequestContext>);

impl OwnedContext {
    /// Constructs a normal-mode context under exclusive ownership
    /// (§4.8 `create`). `enqueue_reply` and `request_complete` are each
    /// invoked exactly once, `enqueue_reply` first.
    pub fn create(
        worker: Arc<Worker>,
        request: Request,
        enqueue_reply: impl Fn(Reply) + Send + Sync + 'static,
        request_complete: impl FnOnce() + Send + 'static,
        priority: Priority,
    ) -> Self {
        Self(Arc::new(RequestContext {
            id: RequestId::next(),
            worker,
            original_request: Some(request),
            priority,
            user_ip: String::new(),
            failover_disabled: false,
            config: OnceLock::new(),
            state: Mutex::new(ContextState::New),
            reply_slot: Mutex::new(None),
            outstanding: AtomicUsize::new(0),
            mode: Mode::Normal(NormalState {
                enqueue_reply: Box::new(enqueue_reply),
                request_complete: Mutex::new(Some(Box::new(request_complete))),
                loggers: Vec::new(),
            }),
            teardown: Mutex::new(None),
        }))
    }

    /// Attaches the client's source IP, for diagnostics (§3).
    #[must_use]
    pub fn with_user_ip(mut self, ip: impl Into<String>) -> Self {
        Arc::get_mut(&mut self.0)
            .expect("OwnedContext has exactly one owner before process()")
            .user_ip = ip.into();
        self
    }

    /// Disables failover for this request (§4.3: "only child 0 is
    /// contacted" when set).
    #[must_use]
    pub fn with_failover_disabled(mut self, disabled: bool) -> Self {
        Arc::get_mut(&mut self.0)
            .expect("OwnedContext has exactly one owner before process()")
            .failover_disabled = disabled;
        self
    }

    /// Attaches a logger that will be called once per completed request
    /// via `on_reply_received`.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn ReplyLogger>) -> Self {
        let inner = Arc::get_mut(&mut self.0)
            .expect("OwnedContext has exactly one owner before process()");
        if let Mode::Normal(normal) = &mut inner.mode {
            normal.loggers.push(logger);
        }
        self
    }

    /// Attaches the configuration snapshot and converts ownership to
    /// shared (§4.8 `process`). Pins `config` alive for the context's
    /// remaining lifetime (§3 invariant 5).
    ///
    /// # Errors
    /// Returns `ContextError::AlreadyProcessed` if this context's
    /// `OnceLock` was somehow already populated. In practice this is
    /// unreachable through the typestate API — `process` consumes
    /// `self` by value — but the `Result` return is kept so the
    /// operation matches §4.8's documented failure mode.
    pub fn process(self, config: Arc<ConfigSnapshot>) -> Result<SharedContext, ContextError> {
        self.0
            .config
            .set(config)
            .map_err(|_| ContextError::AlreadyProcessed)?;
        *self.0.state.lock().expect("state lock poisoned") = ContextState::Processing;
        Ok(SharedContext(self.0))
    }
}

/// A context under shared ownership: the client-visible dispatch path
/// and every subrequest fiber each hold a clone (§3 Lifecycle).
#[derive(Clone)]
pub struct SharedContext(Arc<RequestContext>);

impl SharedContext {
    /// Directly constructs a recording context (§4.8
    /// `create_recording`). No configuration is needed: recording never
    /// dispatches to upstream transport.
    #[must_use]
    pub fn create_recording(
        worker: Arc<Worker>,
        on_destination: Option<Box<dyn Fn(&DestinationDescriptor) + Send + Sync>>,
        on_shard_splitter: Option<Box<dyn Fn(&ShardSplitterDescriptor) + Send + Sync>>,
    ) -> Self {
        Self::create_recording_inner(worker, on_destination, on_shard_splitter, None)
    }

    /// As `create_recording`, but signals `baton` when the context is
    /// destroyed (§4.8 `create_recording_notify`).
    #[must_use]
    pub fn create_recording_notify(
        worker: Arc<Worker>,
        baton: Arc<Notify>,
        on_destination: Option<Box<dyn Fn(&DestinationDescriptor) + Send + Sync>>,
        on_shard_splitter: Option<Box<dyn Fn(&ShardSplitterDescriptor) + Send + Sync>>,
    ) -> Self {
        Self::create_recording_inner(worker, on_destination, on_shard_splitter, Some(baton))
    }

    fn create_recording_inner(
        worker: Arc<Worker>,
        on_destination: Option<Box<dyn Fn(&DestinationDescriptor) + Send + Sync>>,
        on_shard_splitter: Option<Box<dyn Fn(&ShardSplitterDescriptor) + Send + Sync>>,
        baton: Option<Arc<Notify>>,
    ) -> Self {
        let teardown: Option<MainJob> = baton.map(|baton| -> MainJob { Box::new(move || baton.notify_one()) });
        Self(Arc::new(RequestContext {
            id: RequestId::next(),
            worker,
            original_request: None,
            priority: Priority::Normal,
            user_ip: String::new(),
            failover_disabled: false,
            config: OnceLock::new(),
            state: Mutex::new(ContextState::New),
            reply_slot: Mutex::new(None),
            outstanding: AtomicUsize::new(0),
            mode: Mode::Recording(RecordingState {
                on_destination,
                on_shard_splitter,
            }),
            teardown: Mutex::new(teardown),
        }))
    }

    #[must_use]
    pub fn as_arc(&self) -> Arc<RequestContext> {
        Arc::clone(&self.0)
    }
}

impl std::ops::Deref for SharedContext {
    type Target = RequestContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::Deref for OwnedContext {
    type Target = RequestContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
