//! Echo Host - a stdio service host composed from a hosted service.
//!
//! This demo shows:
//! - Composing a host from a [`HostedService`] with [`ExtensionProvider`]
//! - A parallel request handler that reports progress with events
//! - Logging to stderr while stdout carries the protocol
//!
//! # Talking to it by hand
//!
//! ```text
//! $ cargo run --example echo_host
//! Content-Length: 68
//!
//! {"jsonrpc":"2.0","id":"1","method":"echo","params":{"message":"hi"}}
//! ```

use std::time::Duration;

use jsonrpc_host::handler::HandlerOptions;
use jsonrpc_host::protocol::{EventType, RequestType};
use jsonrpc_host::{EventSender, ExtensionProvider, HostedService, ServiceHost, ServiceHostBuilder};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Input of the echo method.
#[derive(Deserialize, Debug)]
struct EchoInput {
    message: String,
    #[serde(default)]
    repeat: u32,
}

/// Output of the echo method.
#[derive(Serialize, Debug)]
struct EchoOutput {
    echo: String,
}

/// Progress event emitted while echoing.
#[derive(Serialize, Debug)]
struct Progress {
    done: u32,
    total: u32,
}

const ECHO: RequestType<EchoInput, EchoOutput> = RequestType::new("echo");
const PROGRESS: EventType<Progress> = EventType::new("echo/progress");

struct EchoService;

impl HostedService for EchoService {
    fn name(&self) -> &str {
        "echo"
    }

    fn initialize_service(&self, host: &mut ServiceHostBuilder) -> jsonrpc_host::Result<()> {
        host.set_async_request_handler(
            &ECHO,
            |input, ctx| async move {
                let total = input.repeat.max(1);
                let mut echo = String::new();
                for done in 1..=total {
                    echo.push_str(&input.message);
                    ctx.send_event(&PROGRESS, &Progress { done, total })?;
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                ctx.send_result(&EchoOutput { echo })
            },
            HandlerOptions::parallel(),
        )?;

        host.register_shutdown_task(|_events| async {
            tracing::info!("echo service shutting down");
            Ok(())
        });
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    jsonrpc_host::logging::init_logging("jsonrpc_host=info,echo_host=info")?;

    let provider = ExtensionProvider::new().with_service(EchoService);

    let mut builder = ServiceHost::builder()
        .protocol_version(env!("CARGO_PKG_VERSION"))
        .capabilities(json!({"echo": {"progress": true}}));
    provider.initialize_services(&mut builder)?;

    let host = builder.start_stdio()?;
    host.wait_for_exit().await?;

    Ok(())
}
