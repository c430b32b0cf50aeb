//! Process stdin/stdout endpoints.
//!
//! # Important
//!
//! - **stdout**: framed messages only
//! - **stderr**: logs (see [`init_logging`](crate::logging::init_logging))
//! - **Never use `println!`** in a hosted service: it corrupts the stream

use tokio::io::{Stdin, Stdout};

/// Reader and writer halves of the process standard streams.
pub type Stdio = (Stdin, Stdout);

/// Handles to process stdin (input frames) and stdout (output frames).
pub fn stdio() -> Stdio {
    (tokio::io::stdin(), tokio::io::stdout())
}
