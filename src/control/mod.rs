//! Control plane - lifecycle state machine and built-in methods.
//!
//! Every host answers four methods itself:
//!
//! | method       | kind    | effect                                           |
//! |--------------|---------|--------------------------------------------------|
//! | `initialize` | request | runs initialize tasks, moves to `Running`         |
//! | `shutdown`   | request | runs shutdown tasks (bounded), moves to `Stopped` |
//! | `exit`       | event   | closes the stream immediately                    |
//! | `version`    | request | answers the configured protocol version          |

mod init;
mod lifecycle;

pub use init::{ClientInfo, InitializeParams, InitializeResult, EXIT, INITIALIZE, SHUTDOWN, VERSION};
pub use lifecycle::{InitializeTask, ServiceHostState, ShutdownTask};
pub(crate) use lifecycle::{register_builtins, Lifecycle};
