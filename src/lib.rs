//! # jsonrpc-host
//!
//! JSON-RPC 2.0 service host over `Content-Length` framed byte streams.
//!
//! A host reads framed messages from one stream (stdin by default), routes
//! requests and events to registered handlers, and writes responses, events
//! and outbound requests to another (stdout by default).
//!
//! ## Architecture
//!
//! - **Read loop**: one task reads frames and dispatches them; serial
//!   handlers are awaited in arrival order, parallel ones run on worker tasks
//! - **Writer task**: the only writer to the output stream, batching whole
//!   frames in enqueue order
//! - **Lifecycle**: built-in `initialize`, `shutdown`, `exit` and `version`
//!
//! ## Example
//!
//! ```no_run
//! use jsonrpc_host::handler::HandlerOptions;
//! use jsonrpc_host::protocol::{EventType, RequestType};
//! use jsonrpc_host::{EventSender, ServiceHost};
//!
//! const COUNT: RequestType<u32, u32> = RequestType::new("count");
//! const TICK: EventType<u32> = EventType::new("tick");
//!
//! #[tokio::main]
//! async fn main() -> jsonrpc_host::Result<()> {
//!     jsonrpc_host::logging::init_logging("jsonrpc_host=info")?;
//!
//!     let mut builder = ServiceHost::builder().protocol_version("1.0.0");
//!     builder.set_async_request_handler(
//!         &COUNT,
//!         |n, ctx| async move {
//!             for i in 0..n {
//!                 ctx.send_event(&TICK, &i)?;
//!             }
//!             ctx.send_result(&n)
//!         },
//!         HandlerOptions::parallel(),
//!     )?;
//!
//!     builder.start_stdio()?.wait_for_exit().await
//! }
//! ```

pub mod codec;
pub mod config;
pub mod control;
pub mod error;
pub mod extensibility;
pub mod handler;
pub mod host;
pub mod logging;
pub mod protocol;
pub mod transport;
pub mod writer;

mod dispatcher;

pub use config::HostConfig;
pub use control::ServiceHostState;
pub use error::{HostError, Result};
pub use extensibility::{ExtensionProvider, HostedService};
pub use handler::{EventContext, EventSender, HandlerOptions, RequestContext};
pub use host::{ServiceHost, ServiceHostBuilder};
