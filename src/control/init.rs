//! Payloads and descriptors of the built-in methods.
//!
//! # Example
//!
//! ```
//! use jsonrpc_host::control::InitializeParams;
//!
//! let params: InitializeParams = serde_json::from_str(r#"{"processId": 12, "rootUri": null}"#).unwrap();
//! assert_eq!(params.process_id, Some(12));
//! assert!(params.root_uri.is_none());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::{EventType, RequestType};

/// `initialize` request: first request of a session.
pub const INITIALIZE: RequestType<InitializeParams, InitializeResult> =
    RequestType::new("initialize");

/// `shutdown` request: run shutdown tasks, then answer `null`.
pub const SHUTDOWN: RequestType<Value, ()> = RequestType::new("shutdown");

/// `exit` event: stop reading and writing immediately.
pub const EXIT: EventType<Value> = EventType::new("exit");

/// `version` request: answer the configured protocol version.
pub const VERSION: RequestType<Value, String> = RequestType::new("version");

/// Peer information sent with `initialize`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientInfo {
    /// Peer name.
    pub name: String,
    /// Peer version, if reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Params of the `initialize` request. Every member is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InitializeParams {
    /// Process id of the peer.
    pub process_id: Option<u32>,
    /// Peer name and version.
    pub client_info: Option<ClientInfo>,
    /// Workspace root as a path.
    pub root_path: Option<String>,
    /// Workspace root as a URI.
    pub root_uri: Option<String>,
    /// Capabilities the peer declares.
    pub capabilities: Option<Value>,
    /// Free-form options for hosted services.
    pub initialization_options: Option<Value>,
    /// Requested trace level.
    pub trace: Option<String>,
}

/// Result of the `initialize` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeResult {
    /// Capabilities the host declares.
    pub capabilities: Value,
}
