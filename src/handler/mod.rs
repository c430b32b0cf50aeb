//! Handler module - registration and the objects handlers work with.
//!
//! Provides:
//! - [`HandlerRegistry`] - maps method names to handlers
//! - [`RequestContext`] - answers one request exactly once
//! - [`EventContext`] / [`EventSender`] - events and outbound requests
//!
//! # Example
//!
//! ```
//! use jsonrpc_host::handler::{HandlerOptions, HandlerRegistry};
//! use jsonrpc_host::protocol::RequestType;
//!
//! const ECHO: RequestType<String, String> = RequestType::new("echo");
//!
//! let mut registry = HandlerRegistry::new();
//! registry
//!     .set_async_request_handler(
//!         &ECHO,
//!         |text, ctx| async move { ctx.send_result(&text) },
//!         HandlerOptions::parallel(),
//!     )
//!     .unwrap();
//! assert!(registry.has_request_handler("echo"));
//! ```

mod context;
pub(crate) mod pending;
mod registry;

pub use context::{EventContext, EventSender, RequestContext};
pub(crate) use context::Responder;
pub use registry::{BoxFuture, HandlerOptions, HandlerRegistry, HandlerResult};
pub(crate) use registry::HandlerTable;
