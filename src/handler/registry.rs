//! Handler registry for dispatching messages by method name.
//!
//! Registration happens on a mutable [`HandlerRegistry`] while the host is
//! being composed. Starting the host freezes it into an immutable
//! handler table that the read loop shares through `Arc`.
//!
//! Handlers are stored type-erased: the wrappers below decode `params` into
//! the handler's parameter type and build its typed context before calling it.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::context::{EventContext, RequestContext, Responder};
use crate::codec::JsonCodec;
use crate::error::{DispatchError, HostError, Result};
use crate::protocol::{EventType, RequestType};

/// Result type for handler functions.
pub type HandlerResult = Result<()>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Type-erased request handler.
pub(crate) trait RequestHandler: Send + Sync + 'static {
    fn call(
        &self,
        params: Option<Value>,
        responder: Responder,
        events: EventContext,
    ) -> BoxFuture<'static, HandlerResult>;
}

/// Type-erased event handler.
pub(crate) trait EventHandler: Send + Sync + 'static {
    fn call(&self, params: Option<Value>, events: EventContext) -> BoxFuture<'static, HandlerResult>;
}

/// Registration options for request handlers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerOptions {
    /// Run on the worker pool instead of blocking the read loop.
    pub parallel: bool,
    /// Replace an existing registration instead of failing.
    pub override_existing: bool,
}

impl HandlerOptions {
    /// Serial, non-overriding (the default).
    pub fn serial() -> Self {
        Self::default()
    }

    /// Parallel-capable, non-overriding.
    pub fn parallel() -> Self {
        Self {
            parallel: true,
            override_existing: false,
        }
    }

    /// Same options, but replace any existing handler.
    pub fn replacing(self) -> Self {
        Self {
            override_existing: true,
            ..self
        }
    }
}

fn failed(e: HostError) -> BoxFuture<'static, HandlerResult> {
    Box::pin(async move { Err(e) })
}

/// Run the synchronous part of an async handler (everything before its
/// future exists). A panic there becomes `HandlerPanicked` instead of
/// unwinding into the read loop.
fn guarded<Fut>(method: &'static str, call: impl FnOnce() -> Fut) -> BoxFuture<'static, HandlerResult>
where
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    match std::panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(fut) => Box::pin(fut),
        Err(_) => {
            tracing::error!(method, "handler panicked before returning a future");
            failed(DispatchError::HandlerPanicked(method.to_string()).into())
        }
    }
}

/// Map a blocking task's join error to a dispatch error.
fn join_failure(method: &str, e: tokio::task::JoinError) -> HostError {
    if e.is_panic() {
        DispatchError::HandlerPanicked(method.to_string()).into()
    } else {
        DispatchError::HandlerFailed {
            method: method.to_string(),
            reason: e.to_string(),
        }
        .into()
    }
}

/// Async request handler taking `P` and answering with `R`.
struct AsyncRequest<F, P, R, Fut> {
    method: &'static str,
    handler: F,
    _types: PhantomData<fn(P, R) -> Fut>,
}

impl<F, P, R, Fut> RequestHandler for AsyncRequest<F, P, R, Fut>
where
    F: Fn(P, RequestContext<R>) -> Fut + Send + Sync + 'static,
    P: DeserializeOwned + Send + 'static,
    R: Serialize + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(
        &self,
        params: Option<Value>,
        responder: Responder,
        events: EventContext,
    ) -> BoxFuture<'static, HandlerResult> {
        let parsed: P = match JsonCodec::decode_params(self.method, params) {
            Ok(v) => v,
            Err(e) => return failed(e),
        };

        let ctx = RequestContext::new(responder, events);
        guarded(self.method, || (self.handler)(parsed, ctx))
    }
}

/// Synchronous request handler, run on the blocking thread pool.
struct SyncRequest<F, P, R> {
    method: &'static str,
    handler: Arc<F>,
    _types: PhantomData<fn(P, R)>,
}

impl<F, P, R> RequestHandler for SyncRequest<F, P, R>
where
    F: Fn(P, RequestContext<R>) -> HandlerResult + Send + Sync + 'static,
    P: DeserializeOwned + Send + 'static,
    R: Serialize + 'static,
{
    fn call(
        &self,
        params: Option<Value>,
        responder: Responder,
        events: EventContext,
    ) -> BoxFuture<'static, HandlerResult> {
        let parsed: P = match JsonCodec::decode_params(self.method, params) {
            Ok(v) => v,
            Err(e) => return failed(e),
        };

        let handler = self.handler.clone();
        let method = self.method;
        let ctx = RequestContext::new(responder, events);
        Box::pin(async move {
            match tokio::task::spawn_blocking(move || handler(parsed, ctx)).await {
                Ok(result) => result,
                Err(e) => Err(join_failure(method, e)),
            }
        })
    }
}

/// Async event handler.
struct AsyncEvent<F, P, Fut> {
    method: &'static str,
    handler: F,
    _types: PhantomData<fn(P) -> Fut>,
}

impl<F, P, Fut> EventHandler for AsyncEvent<F, P, Fut>
where
    F: Fn(P, EventContext) -> Fut + Send + Sync + 'static,
    P: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, params: Option<Value>, events: EventContext) -> BoxFuture<'static, HandlerResult> {
        let parsed: P = match JsonCodec::decode_params(self.method, params) {
            Ok(v) => v,
            Err(e) => return failed(e),
        };

        guarded(self.method, || (self.handler)(parsed, events))
    }
}

/// Synchronous event handler, run on the blocking thread pool.
struct SyncEvent<F, P> {
    method: &'static str,
    handler: Arc<F>,
    _types: PhantomData<fn(P)>,
}

impl<F, P> EventHandler for SyncEvent<F, P>
where
    F: Fn(P, EventContext) -> HandlerResult + Send + Sync + 'static,
    P: DeserializeOwned + Send + 'static,
{
    fn call(&self, params: Option<Value>, events: EventContext) -> BoxFuture<'static, HandlerResult> {
        let parsed: P = match JsonCodec::decode_params(self.method, params) {
            Ok(v) => v,
            Err(e) => return failed(e),
        };

        let handler = self.handler.clone();
        let method = self.method;
        Box::pin(async move {
            match tokio::task::spawn_blocking(move || handler(parsed, events)).await {
                Ok(result) => result,
                Err(e) => Err(join_failure(method, e)),
            }
        })
    }
}

/// Entry for a registered request method.
pub(crate) struct RequestEntry {
    /// The handler function.
    pub(crate) handler: Box<dyn RequestHandler>,
    /// Whether it may run on the worker pool.
    pub(crate) parallel: bool,
}

/// Entry for a registered event method.
pub(crate) struct EventEntry {
    /// The handler function.
    pub(crate) handler: Box<dyn EventHandler>,
}

/// Mutable registry used while composing the host.
#[derive(Default)]
pub struct HandlerRegistry {
    /// Request handlers by method name.
    requests: HashMap<String, RequestEntry>,
    /// Event handlers by method name.
    events: HashMap<String, EventEntry>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synchronous request handler.
    ///
    /// The handler runs on tokio's blocking thread pool.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::HandlerExists`] if the method is taken and
    /// `options.override_existing` is false.
    pub fn set_request_handler<P, R, F>(
        &mut self,
        descriptor: &RequestType<P, R>,
        handler: F,
        options: HandlerOptions,
    ) -> Result<()>
    where
        F: Fn(P, RequestContext<R>) -> HandlerResult + Send + Sync + 'static,
        P: DeserializeOwned + Send + 'static,
        R: Serialize + 'static,
    {
        let method = descriptor.method();
        let handler = SyncRequest {
            method,
            handler: Arc::new(handler),
            _types: PhantomData,
        };
        self.insert_request(method, Box::new(handler), options)
    }

    /// Register an async request handler.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::HandlerExists`] if the method is taken and
    /// `options.override_existing` is false.
    pub fn set_async_request_handler<P, R, F, Fut>(
        &mut self,
        descriptor: &RequestType<P, R>,
        handler: F,
        options: HandlerOptions,
    ) -> Result<()>
    where
        F: Fn(P, RequestContext<R>) -> Fut + Send + Sync + 'static,
        P: DeserializeOwned + Send + 'static,
        R: Serialize + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let method = descriptor.method();
        let handler = AsyncRequest {
            method,
            handler,
            _types: PhantomData,
        };
        self.insert_request(method, Box::new(handler), options)
    }

    /// Register a synchronous event handler.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::HandlerExists`] if the method is taken and
    /// `override_existing` is false.
    pub fn set_event_handler<P, F>(
        &mut self,
        descriptor: &EventType<P>,
        handler: F,
        override_existing: bool,
    ) -> Result<()>
    where
        F: Fn(P, EventContext) -> HandlerResult + Send + Sync + 'static,
        P: DeserializeOwned + Send + 'static,
    {
        let method = descriptor.method();
        let handler = SyncEvent {
            method,
            handler: Arc::new(handler),
            _types: PhantomData,
        };
        self.insert_event(method, Box::new(handler), override_existing)
    }

    /// Register an async event handler.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::HandlerExists`] if the method is taken and
    /// `override_existing` is false.
    pub fn set_async_event_handler<P, F, Fut>(
        &mut self,
        descriptor: &EventType<P>,
        handler: F,
        override_existing: bool,
    ) -> Result<()>
    where
        F: Fn(P, EventContext) -> Fut + Send + Sync + 'static,
        P: DeserializeOwned + Send + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let method = descriptor.method();
        let handler = AsyncEvent {
            method,
            handler,
            _types: PhantomData,
        };
        self.insert_event(method, Box::new(handler), override_existing)
    }

    fn insert_request(
        &mut self,
        method: &str,
        handler: Box<dyn RequestHandler>,
        options: HandlerOptions,
    ) -> Result<()> {
        if !options.override_existing && self.requests.contains_key(method) {
            return Err(HostError::HandlerExists(method.to_string()));
        }
        self.requests.insert(
            method.to_string(),
            RequestEntry {
                handler,
                parallel: options.parallel,
            },
        );
        Ok(())
    }

    fn insert_event(
        &mut self,
        method: &str,
        handler: Box<dyn EventHandler>,
        override_existing: bool,
    ) -> Result<()> {
        if !override_existing && self.events.contains_key(method) {
            return Err(HostError::HandlerExists(method.to_string()));
        }
        self.events
            .insert(method.to_string(), EventEntry { handler });
        Ok(())
    }

    /// Whether a request handler is registered for `method`.
    pub fn has_request_handler(&self, method: &str) -> bool {
        self.requests.contains_key(method)
    }

    /// Whether an event handler is registered for `method`.
    pub fn has_event_handler(&self, method: &str) -> bool {
        self.events.contains_key(method)
    }

    /// Freeze into the immutable table used by the read loop.
    pub(crate) fn freeze(self) -> HandlerTable {
        HandlerTable {
            requests: self.requests,
            events: self.events,
        }
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("requests", &self.requests.keys().collect::<Vec<_>>())
            .field("events", &self.events.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Immutable handler table shared by the read loop.
pub(crate) struct HandlerTable {
    requests: HashMap<String, RequestEntry>,
    events: HashMap<String, EventEntry>,
}

impl HandlerTable {
    /// Get the request entry for `method`.
    pub(crate) fn request(&self, method: &str) -> Option<&RequestEntry> {
        self.requests.get(method)
    }

    /// Get the event entry for `method`.
    pub(crate) fn event(&self, method: &str) -> Option<&EventEntry> {
        self.events.get(method)
    }
}
