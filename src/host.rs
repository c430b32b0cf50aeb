//! Service host builder and running host.
//!
//! The [`ServiceHostBuilder`] collects handlers, lifecycle tasks, shared
//! services and configuration. Starting it consumes the builder, so the
//! handler table can no longer change:
//! 1. Validate configuration
//! 2. Register the built-in `initialize`/`shutdown`/`exit`/`version`
//! 3. Freeze the handler table
//! 4. Spawn the writer task and the read loop
//!
//! # Example
//!
//! ```no_run
//! use jsonrpc_host::handler::HandlerOptions;
//! use jsonrpc_host::protocol::RequestType;
//! use jsonrpc_host::ServiceHost;
//!
//! const ECHO: RequestType<String, String> = RequestType::new("echo");
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut builder = ServiceHost::builder().protocol_version("1.0.0");
//!     builder.set_async_request_handler(
//!         &ECHO,
//!         |text, ctx| async move { ctx.send_result(&text) },
//!         HandlerOptions::parallel(),
//!     )?;
//!
//!     let host = builder.start_stdio()?;
//!     host.wait_for_exit().await?;
//!     Ok(())
//! }
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::codec::TextEncoding;
use crate::config::HostConfig;
use crate::control::{
    register_builtins, InitializeParams, InitializeTask, Lifecycle, ServiceHostState, ShutdownTask,
};
use crate::dispatcher::Dispatcher;
use crate::error::{HostError, Result};
use crate::handler::pending::PendingRequests;
use crate::handler::{
    BoxFuture, EventContext, HandlerOptions, HandlerRegistry, HandlerResult, RequestContext,
};
use crate::protocol::{EventType, FrameReader, RequestType};
use crate::transport::{split_stream, stdio};
use crate::writer::spawn_writer_task;

/// Builder for configuring and starting a service host.
///
/// Hosted services receive `&mut ServiceHostBuilder` during composition
/// (see [`ExtensionProvider`](crate::extensibility::ExtensionProvider)).
pub struct ServiceHostBuilder {
    registry: HandlerRegistry,
    config: HostConfig,
    initialize_tasks: Vec<InitializeTask>,
    shutdown_tasks: Vec<ShutdownTask>,
    /// Shared dependencies keyed by type.
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ServiceHostBuilder {
    /// Create a builder with the default configuration.
    pub fn new() -> Self {
        Self::with_config(HostConfig::default())
    }

    /// Create a builder with the given configuration.
    pub fn with_config(config: HostConfig) -> Self {
        Self {
            registry: HandlerRegistry::new(),
            config,
            initialize_tasks: Vec::new(),
            shutdown_tasks: Vec::new(),
            services: HashMap::new(),
        }
    }

    /// Current configuration.
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Registered handlers.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Set the string answered by `version`.
    pub fn protocol_version(mut self, version: impl Into<String>) -> Self {
        self.config.protocol_version = version.into();
        self
    }

    /// Set the bound on waiting for shutdown tasks.
    ///
    /// Default: 120 seconds
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Set the maximum number of concurrently running parallel handlers.
    ///
    /// When this limit is reached, the read loop waits for a free slot.
    /// Default: 256
    pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.config.max_concurrent_handlers = limit;
        self
    }

    /// Set the largest accepted `Content-Length`.
    ///
    /// Default: 256 MiB
    pub fn max_content_length(mut self, limit: usize) -> Self {
        self.config.max_content_length = limit;
        self
    }

    /// Set the content text encoding.
    ///
    /// Default: UTF-8
    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.config.encoding = encoding;
        self
    }

    /// Set the capabilities object returned by `initialize`.
    pub fn capabilities(mut self, capabilities: Value) -> Self {
        self.config.capabilities = capabilities;
        self
    }

    /// Register a synchronous request handler (runs on the blocking pool).
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
    ) -> Result<&mut Self>
    where
        F: Fn(P, RequestContext<R>) -> HandlerResult + Send + Sync + 'static,
        P: DeserializeOwned + Send + 'static,
        R: Serialize + 'static,
    {
        self.registry
            .set_request_handler(descriptor, handler, options)?;
        Ok(self)
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
    ) -> Result<&mut Self>
    where
        F: Fn(P, RequestContext<R>) -> Fut + Send + Sync + 'static,
        P: DeserializeOwned + Send + 'static,
        R: Serialize + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry
            .set_async_request_handler(descriptor, handler, options)?;
        Ok(self)
    }

    /// Register a synchronous event handler (runs on the blocking pool).
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
    ) -> Result<&mut Self>
    where
        F: Fn(P, EventContext) -> HandlerResult + Send + Sync + 'static,
        P: DeserializeOwned + Send + 'static,
    {
        self.registry
            .set_event_handler(descriptor, handler, override_existing)?;
        Ok(self)
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
    ) -> Result<&mut Self>
    where
        F: Fn(P, EventContext) -> Fut + Send + Sync + 'static,
        P: DeserializeOwned + Send + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry
            .set_async_event_handler(descriptor, handler, override_existing)?;
        Ok(self)
    }

    /// Register a callback run when `initialize` arrives.
    ///
    /// All initialize tasks run concurrently; the host moves to `Running`
    /// once every one of them succeeded.
    pub fn register_initialize_task<F, Fut>(&mut self, task: F) -> &mut Self
    where
        F: Fn(InitializeParams, EventContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.initialize_tasks.push(Box::new(move |params, events| {
            Box::pin(task(params, events)) as BoxFuture<'static, HandlerResult>
        }));
        self
    }

    /// Register a callback run when `shutdown` arrives.
    ///
    /// All shutdown tasks run concurrently; tasks still running when the
    /// shutdown timeout elapses are abandoned.
    pub fn register_shutdown_task<F, Fut>(&mut self, task: F) -> &mut Self
    where
        F: Fn(EventContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.shutdown_tasks.push(Box::new(move |events| {
            Box::pin(task(events)) as BoxFuture<'static, HandlerResult>
        }));
        self
    }

    /// Make a shared dependency available to hosted services.
    ///
    /// A second value of the same type replaces the first.
    pub fn provide<T: Send + Sync + 'static>(&mut self, service: Arc<T>) -> &mut Self {
        self.services.insert(TypeId::of::<T>(), service);
        self
    }

    /// Look up a shared dependency by type.
    pub fn service<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let service = self.services.get(&TypeId::of::<T>())?.clone();
        service.downcast::<T>().ok()
    }

    /// Start the host over an arbitrary reader/writer pair.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Config`] if the configuration is invalid.
    pub fn start<R, W>(self, reader: R, writer: W) -> Result<ServiceHost>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.config.validate()?;

        let Self {
            mut registry,
            config,
            initialize_tasks,
            shutdown_tasks,
            ..
        } = self;

        let lifecycle = Arc::new(Lifecycle::new(
            initialize_tasks,
            shutdown_tasks,
            config.shutdown_timeout,
        ));
        register_builtins(
            &mut registry,
            &lifecycle,
            config.protocol_version.clone(),
            config.capabilities.clone(),
        )?;
        let table = Arc::new(registry.freeze());

        let (writer, writer_task) =
            spawn_writer_task(writer, config.encoding, lifecycle.exit_token().clone());
        let pending = Arc::new(PendingRequests::new());
        let frames = FrameReader::with_options(reader, config.encoding, config.max_content_length);

        let dispatcher = Dispatcher::new(
            table,
            lifecycle.clone(),
            writer.clone(),
            pending.clone(),
            config.max_concurrent_handlers,
        );

        lifecycle.transition(ServiceHostState::Initializing);
        let read_task = tokio::spawn(dispatcher.run(frames));

        tracing::info!(
            version = %config.protocol_version,
            encoding = config.encoding.name(),
            "service host started"
        );

        Ok(ServiceHost {
            lifecycle,
            events: EventContext::new(writer, pending),
            read_task,
            writer_task,
        })
    }

    /// Start the host over a duplex stream.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Config`] if the configuration is invalid.
    pub fn start_with_stream<S>(self, stream: S) -> Result<ServiceHost>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = split_stream(stream);
        self.start(reader, writer)
    }

    /// Start the host over process stdin/stdout.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Config`] if the configuration is invalid.
    pub fn start_stdio(self) -> Result<ServiceHost> {
        let (stdin, stdout) = stdio();
        self.start(stdin, stdout)
    }
}

impl Default for ServiceHostBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServiceHostBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHostBuilder")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("initialize_tasks", &self.initialize_tasks.len())
            .field("shutdown_tasks", &self.shutdown_tasks.len())
            .field("services", &self.services.len())
            .finish()
    }
}

/// A running service host.
///
/// Use [`events`](Self::events) to talk to the peer outside any handler.
/// Use [`wait_for_exit`](Self::wait_for_exit) to block until the host stops.
pub struct ServiceHost {
    lifecycle: Arc<Lifecycle>,
    events: EventContext,
    read_task: JoinHandle<Result<()>>,
    writer_task: JoinHandle<Result<()>>,
}

impl ServiceHost {
    /// Create a new host builder.
    pub fn builder() -> ServiceHostBuilder {
        ServiceHostBuilder::new()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServiceHostState {
        self.lifecycle.state()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ServiceHostState> {
        self.lifecycle.subscribe()
    }

    /// Sender for events and outbound requests.
    pub fn events(&self) -> EventContext {
        self.events.clone()
    }

    /// Stop immediately, as if `exit` had been received.
    pub fn exit(&self) {
        self.lifecycle.exit();
    }

    /// Wait until the read loop and the writer task have finished.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped the host: a framing or I/O error on
    /// input (including end of stream before `exit`), or a write failure.
    pub async fn wait_for_exit(self) -> Result<()> {
        let read = self.read_task.await;
        let write = self.writer_task.await;

        let read = read.map_err(|e| HostError::handler(format!("read loop failed: {}", e)))?;
        let write = write.map_err(|e| HostError::handler(format!("writer task failed: {}", e)))?;

        tracing::info!("service host stopped");
        read.and(write)
    }
}

impl std::fmt::Debug for ServiceHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHost")
            .field("state", &self.state())
            .finish()
    }
}
