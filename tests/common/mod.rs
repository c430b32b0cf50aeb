//! Test peer talking to a host over an in-memory duplex pipe.

#![allow(dead_code)]

use std::time::Duration;

use jsonrpc_host::error::FrameError;
use jsonrpc_host::protocol::{build_frame, FrameReader, Message};
use jsonrpc_host::{ServiceHost, ServiceHostBuilder};
use serde_json::Value;
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// The other end of a host connection.
pub struct Peer {
    writer: WriteHalf<DuplexStream>,
    reader: FrameReader<ReadHalf<DuplexStream>>,
}

/// Start `builder` over a duplex pipe and return the host and its peer.
pub fn connect(builder: ServiceHostBuilder) -> (ServiceHost, Peer) {
    let (peer_side, host_side) = tokio::io::duplex(64 * 1024);
    let host = builder.start_with_stream(host_side).unwrap();
    let (reader, writer) = tokio::io::split(peer_side);
    let peer = Peer {
        writer,
        reader: FrameReader::new(reader),
    };
    (host, peer)
}

impl Peer {
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    pub async fn send(&mut self, message: &Message) {
        let text = message.serialize().unwrap();
        self.send_raw(&build_frame(text.as_bytes())).await;
    }

    pub async fn request(&mut self, id: &str, method: &str, params: Option<Value>) {
        self.send(&Message::request(method, id, params)).await;
    }

    pub async fn notify(&mut self, method: &str, params: Option<Value>) {
        self.send(&Message::event(method, params)).await;
    }

    pub async fn recv(&mut self) -> Message {
        let text = tokio::time::timeout(RECV_TIMEOUT, self.reader.read_message())
            .await
            .expect("timed out waiting for the host")
            .unwrap();
        Message::deserialize(&text).unwrap()
    }

    /// Assert the host closed its output stream cleanly.
    pub async fn expect_closed(&mut self) {
        let read = tokio::time::timeout(RECV_TIMEOUT, self.reader.read_message())
            .await
            .expect("timed out waiting for end of stream");
        assert!(
            matches!(read, Err(FrameError::UnexpectedEof { buffered: 0 })),
            "expected end of stream, got {:?}",
            read
        );
    }

    /// Close the host's input stream.
    pub async fn close_input(&mut self) {
        self.writer.shutdown().await.unwrap();
    }
}

/// Result value of a Response, panicking on anything else.
pub fn result_of(message: &Message) -> &Value {
    match message {
        Message::Response { result, .. } => result,
        other => panic!("expected response, got {:?}", other),
    }
}

/// Error code of a ResponseError, panicking on anything else.
pub fn error_code_of(message: &Message) -> i32 {
    match message {
        Message::ResponseError { error, .. } => error.code,
        other => panic!("expected error response, got {:?}", other),
    }
}
