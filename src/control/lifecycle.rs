//! Host lifecycle state machine and the built-in methods that drive it.
//!
//! ```text
//! Uninitialized ─start()─► Initializing ─initialize─► Running ─shutdown─► ShuttingDown ─► Stopped
//!                                         exit (from any state) ─────────────────────────► Stopped
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::init::{InitializeParams, InitializeResult, EXIT, INITIALIZE, SHUTDOWN, VERSION};
use crate::error::{DispatchError, HostError, Result};
use crate::handler::{BoxFuture, EventContext, HandlerOptions, HandlerRegistry, HandlerResult};

/// Lifecycle state of a service host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceHostState {
    /// Built but not started.
    Uninitialized,
    /// Started, waiting for `initialize`.
    Initializing,
    /// `initialize` completed.
    Running,
    /// `shutdown` received, shutdown tasks running.
    ShuttingDown,
    /// Shutdown finished or `exit` received.
    Stopped,
}

impl ServiceHostState {
    /// Whether new requests are dispatched in this state.
    pub fn accepts_requests(self) -> bool {
        !matches!(self, Self::ShuttingDown | Self::Stopped)
    }
}

impl fmt::Display for ServiceHostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::ShuttingDown => "shutting down",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Callback run when `initialize` arrives.
pub type InitializeTask =
    Box<dyn Fn(InitializeParams, EventContext) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Callback run when `shutdown` arrives.
pub type ShutdownTask = Box<dyn Fn(EventContext) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Shared lifecycle state of one host.
pub(crate) struct Lifecycle {
    state: watch::Sender<ServiceHostState>,
    initialize_tasks: Vec<InitializeTask>,
    shutdown_tasks: Vec<ShutdownTask>,
    shutdown_timeout: Duration,
    exit: CancellationToken,
}

impl Lifecycle {
    pub(crate) fn new(
        initialize_tasks: Vec<InitializeTask>,
        shutdown_tasks: Vec<ShutdownTask>,
        shutdown_timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(ServiceHostState::Uninitialized);
        Self {
            state,
            initialize_tasks,
            shutdown_tasks,
            shutdown_timeout,
            exit: CancellationToken::new(),
        }
    }

    pub(crate) fn state(&self) -> ServiceHostState {
        *self.state.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ServiceHostState> {
        self.state.subscribe()
    }

    /// Token cancelled by `exit`.
    pub(crate) fn exit_token(&self) -> &CancellationToken {
        &self.exit
    }

    pub(crate) fn transition(&self, to: ServiceHostState) {
        let from = self.state.send_replace(to);
        if from != to {
            tracing::info!(%from, %to, "host state changed");
        }
    }

    /// Run every initialize task concurrently and wait for all of them.
    ///
    /// Moves to `Running` only if every task succeeded.
    pub(crate) async fn initialize(
        &self,
        params: InitializeParams,
        events: EventContext,
    ) -> HandlerResult {
        let handles: Vec<JoinHandle<HandlerResult>> = self
            .initialize_tasks
            .iter()
            .map(|task| tokio::spawn(task(params.clone(), events.clone())))
            .collect();

        let mut failure = None;
        for handle in handles {
            let outcome = match handle.await {
                Ok(result) => result,
                Err(_) => Err(DispatchError::HandlerPanicked(INITIALIZE.method().into()).into()),
            };
            if let Err(e) = outcome {
                tracing::warn!(error = %e, "initialize task failed");
                failure.get_or_insert(e);
            }
        }

        match failure {
            Some(e) => Err(e),
            None => {
                self.transition(ServiceHostState::Running);
                Ok(())
            }
        }
    }

    /// Enter `ShuttingDown`. Called before the shutdown future is spawned so
    /// the next frame already sees the new state.
    pub(crate) fn begin_shutdown(&self) {
        self.transition(ServiceHostState::ShuttingDown);
    }

    /// Run shutdown tasks, bounded by the shutdown timeout, then stop.
    ///
    /// Tasks still running at the deadline are detached, not aborted.
    pub(crate) async fn shutdown(&self, events: EventContext) {
        let handles: Vec<JoinHandle<HandlerResult>> = self
            .shutdown_tasks
            .iter()
            .map(|task| tokio::spawn(task(events.clone())))
            .collect();
        let count = handles.len();

        let all = async {
            for handle in handles {
                match handle.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::warn!(error = %e, "shutdown task failed"),
                    Err(e) => tracing::warn!(error = %e, "shutdown task panicked"),
                }
            }
        };

        if tokio::time::timeout(self.shutdown_timeout, all).await.is_err() {
            tracing::warn!(
                tasks = count,
                timeout = ?self.shutdown_timeout,
                "shutdown tasks did not finish in time, abandoning them"
            );
        }

        self.transition(ServiceHostState::Stopped);
    }

    /// Force `Stopped` and stop the read and write loops.
    pub(crate) fn exit(&self) {
        self.transition(ServiceHostState::Stopped);
        self.exit.cancel();
    }
}

/// Register `initialize`, `shutdown`, `exit` and `version`.
///
/// Built-ins replace any handler registered under the same names.
pub(crate) fn register_builtins(
    registry: &mut HandlerRegistry,
    lifecycle: &Arc<Lifecycle>,
    version: String,
    capabilities: Value,
) -> Result<()> {
    let lc = lifecycle.clone();
    registry.set_async_request_handler(
        &INITIALIZE,
        move |params, ctx| {
            let lc = lc.clone();
            let capabilities = capabilities.clone();
            async move {
                lc.initialize(params, ctx.events().clone()).await?;
                ctx.send_result(&InitializeResult { capabilities })
            }
        },
        HandlerOptions::serial().replacing(),
    )?;

    let lc = lifecycle.clone();
    registry.set_async_request_handler(
        &SHUTDOWN,
        move |_params, ctx| {
            lc.begin_shutdown();
            let lc = lc.clone();
            async move {
                lc.shutdown(ctx.events().clone()).await;
                ctx.send_result(&())
            }
        },
        HandlerOptions::parallel().replacing(),
    )?;

    let lc = lifecycle.clone();
    registry.set_async_event_handler(
        &EXIT,
        move |_params, _events| {
            lc.exit();
            std::future::ready(Ok::<(), HostError>(()))
        },
        true,
    )?;

    registry.set_async_request_handler(
        &VERSION,
        move |_params, ctx| std::future::ready(ctx.send_result(&version)),
        HandlerOptions::serial().replacing(),
    )?;

    Ok(())
}
