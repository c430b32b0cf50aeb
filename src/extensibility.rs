//! Composition of independently written services into one host.
//!
//! A [`HostedService`] registers its handlers and lifecycle tasks on a
//! [`ServiceHostBuilder`]. The [`ExtensionProvider`] collects services and
//! applies them to the builder in insertion order; it plays no part once the
//! host has started.
//!
//! # Example
//!
//! ```
//! use jsonrpc_host::extensibility::{ExtensionProvider, HostedService};
//! use jsonrpc_host::handler::HandlerOptions;
//! use jsonrpc_host::protocol::RequestType;
//! use jsonrpc_host::{Result, ServiceHostBuilder};
//!
//! const PING: RequestType<(), String> = RequestType::new("ping");
//!
//! struct Ping;
//!
//! impl HostedService for Ping {
//!     fn initialize_service(&self, host: &mut ServiceHostBuilder) -> Result<()> {
//!         host.set_request_handler(&PING, |_, ctx| ctx.send_result(&"pong".into()), HandlerOptions::serial())?;
//!         Ok(())
//!     }
//! }
//!
//! let mut provider = ExtensionProvider::new();
//! provider.add_service(Ping);
//!
//! let mut builder = ServiceHostBuilder::new();
//! provider.initialize_services(&mut builder).unwrap();
//! assert!(builder.registry().has_request_handler("ping"));
//! ```

use crate::error::Result;
use crate::host::ServiceHostBuilder;

/// A unit of functionality that contributes handlers to a host.
pub trait HostedService: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Register handlers and lifecycle tasks on the builder.
    ///
    /// Shared dependencies are available through
    /// [`ServiceHostBuilder::service`].
    fn initialize_service(&self, host: &mut ServiceHostBuilder) -> Result<()>;
}

/// Ordered collection of hosted services.
#[derive(Default)]
pub struct ExtensionProvider {
    services: Vec<Box<dyn HostedService>>,
}

impl ExtensionProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a service.
    pub fn add_service<S: HostedService + 'static>(&mut self, service: S) -> &mut Self {
        self.services.push(Box::new(service));
        self
    }

    /// Append a service, builder style.
    pub fn with_service<S: HostedService + 'static>(mut self, service: S) -> Self {
        self.add_service(service);
        self
    }

    /// Call [`HostedService::initialize_service`] on every service in
    /// insertion order.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first service error.
    pub fn initialize_services(&self, host: &mut ServiceHostBuilder) -> Result<()> {
        for service in &self.services {
            tracing::debug!(service = service.name(), "initializing hosted service");
            service.initialize_service(host)?;
        }
        Ok(())
    }

    /// Number of services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether no services were added.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl std::fmt::Debug for ExtensionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.services.iter().map(|s| s.name()).collect();
        f.debug_struct("ExtensionProvider")
            .field("services", &names)
            .finish()
    }
}
