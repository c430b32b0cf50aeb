//! Read loop: frame -> message -> handler.
//!
//! One task owns the [`FrameReader`] and processes frames in arrival order:
//!
//! - requests are looked up in the frozen handler table; serial handlers are
//!   awaited before the next frame is read, parallel ones are spawned once a
//!   worker permit is free
//! - events run serially; their failures are only logged
//! - responses complete outbound requests waiting in the pending table
//!
//! Handler failures, panics and bad params become error responses. Content
//! that does not decode in the configured encoding is dropped. Other framing
//! errors and end of stream stop the host. `exit` also interrupts waits on
//! serial handlers and worker slots; handlers still running are detached.

use std::sync::Arc;

use serde_json::Value;
use tokio::io::AsyncRead;
use tokio::sync::Semaphore;
use tokio::task::JoinError;

use crate::control::{Lifecycle, ServiceHostState};
use crate::error::{DispatchError, FrameError, HostError, MessageError, Result};
use crate::handler::pending::{PendingRequests, Reply};
use crate::handler::{EventContext, HandlerResult, HandlerTable, Responder};
use crate::protocol::{ErrorBody, FrameReader, Message, MessageId};
use crate::writer::WriterHandle;

/// Routes inbound messages for one connection.
pub(crate) struct Dispatcher {
    table: Arc<HandlerTable>,
    lifecycle: Arc<Lifecycle>,
    writer: WriterHandle,
    pending: Arc<PendingRequests>,
    /// Bounds concurrently running parallel handlers.
    semaphore: Arc<Semaphore>,
}

impl Dispatcher {
    pub(crate) fn new(
        table: Arc<HandlerTable>,
        lifecycle: Arc<Lifecycle>,
        writer: WriterHandle,
        pending: Arc<PendingRequests>,
        max_concurrent_handlers: usize,
    ) -> Self {
        Self {
            table,
            lifecycle,
            writer,
            pending,
            semaphore: Arc::new(Semaphore::new(max_concurrent_handlers)),
        }
    }

    /// Main read loop. Returns when `exit` arrives or the stream fails.
    ///
    /// On return the host is `Stopped`, the writer is told to close the
    /// output stream, and outbound requests still waiting are failed.
    pub(crate) async fn run<R: AsyncRead + Unpin>(self, mut reader: FrameReader<R>) -> Result<()> {
        let exit = self.lifecycle.exit_token().clone();

        let result = loop {
            let read = tokio::select! {
                biased;
                _ = exit.cancelled() => break Ok(()),
                read = reader.read_message() => read,
            };

            match read {
                Ok(text) => self.dispatch_text(&text).await,
                Err(e @ FrameError::Decode { .. }) => {
                    // The frame was consumed whole; only its content is bad.
                    tracing::warn!(error = %e, "dropping undecodable message");
                }
                Err(FrameError::UnexpectedEof { buffered: 0 })
                    if self.lifecycle.state() == ServiceHostState::Stopped =>
                {
                    tracing::debug!("input closed after shutdown");
                    break Ok(());
                }
                Err(e) => {
                    tracing::error!(error = %e, "read loop stopped");
                    break Err(HostError::Frame(e));
                }
            }
        };

        self.lifecycle.exit();
        self.pending.close();
        result
    }

    fn events(&self) -> EventContext {
        EventContext::new(self.writer.clone(), self.pending.clone())
    }

    /// Decode one frame's content and route it.
    async fn dispatch_text(&self, text: &str) {
        let message = match Message::deserialize(text) {
            Ok(m) => m,
            Err(e) => {
                self.reject_envelope(text, e);
                return;
            }
        };

        match message {
            Message::Request { id, method, params } => {
                self.dispatch_request(id, method, params).await
            }
            Message::Event { method, params } => self.dispatch_event(method, params).await,
            Message::Response { id, result } => self.complete(id, Ok(result)),
            Message::ResponseError { id, error } => self.complete(id, Err(error)),
        }
    }

    /// Answer a malformed message when an id can be recovered.
    fn reject_envelope(&self, text: &str, error: MessageError) {
        let id = match &error {
            MessageError::MissingMethod { id } => Some(id.clone()),
            _ => Message::recover_id(text),
        };

        tracing::warn!(error = %error, id = ?id, "invalid message");

        if let Some(id) = id {
            let body = ErrorBody::new(error.error_code(), error.to_string());
            self.send_error(id, body);
        }
    }

    async fn dispatch_request(&self, id: MessageId, method: String, params: Option<Value>) {
        let state = self.lifecycle.state();
        if !state.accepts_requests() {
            tracing::debug!(%method, %id, %state, "rejecting request");
            self.send_error(id, DispatchError::ShuttingDown(method).to_error_body());
            return;
        }

        let Some(entry) = self.table.request(&method) else {
            tracing::warn!(%method, %id, "no handler registered");
            self.send_error(id, DispatchError::MethodNotFound(method).to_error_body());
            return;
        };

        tracing::debug!(%method, %id, parallel = entry.parallel, "dispatching request");
        let responder = Responder::new(id, self.writer.clone());

        let exit = self.lifecycle.exit_token();

        if entry.parallel {
            // Wait for a worker slot; the read loop stalls while the pool is full.
            let permit = tokio::select! {
                permit = self.semaphore.clone().acquire_owned() => permit,
                _ = exit.cancelled() => return,
            };
            let Ok(permit) = permit else {
                return;
            };

            let fut = entry.handler.call(params, responder.clone(), self.events());
            let handle = tokio::spawn(fut);
            tokio::spawn(async move {
                // Permit is held until the handler completes
                let _permit = permit;
                finish_request(&method, &responder, handle.await);
            });
        } else {
            let fut = entry.handler.call(params, responder.clone(), self.events());
            let handle = tokio::spawn(fut);
            tokio::select! {
                outcome = handle => finish_request(&method, &responder, outcome),
                _ = exit.cancelled() => {
                    tracing::debug!(%method, id = %responder.id(), "exit while serial handler runs, detaching it");
                }
            }
        }
    }

    async fn dispatch_event(&self, method: String, params: Option<Value>) {
        let Some(entry) = self.table.event(&method) else {
            tracing::debug!(%method, "no handler for event, ignoring");
            return;
        };

        tracing::debug!(%method, "dispatching event");
        let fut = entry.handler.call(params, self.events());
        let handle = tokio::spawn(fut);
        let outcome = tokio::select! {
            outcome = handle => outcome,
            _ = self.lifecycle.exit_token().cancelled() => return,
        };
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(%method, error = %e, "event handler failed"),
            Err(e) => tracing::error!(%method, error = %e, "event handler panicked"),
        }
    }

    /// Deliver a response to the outbound request waiting for it.
    fn complete(&self, id: MessageId, reply: Reply) {
        if !self.pending.complete(&id, reply) {
            tracing::warn!(%id, "response for unknown request, dropping");
        }
    }

    fn send_error(&self, id: MessageId, body: ErrorBody) {
        if let Err(e) = self.writer.send_message(&Message::response_error(id, body)) {
            tracing::warn!(error = %e, "could not send error response");
        }
    }
}

/// Turn a handler outcome into an error response if nothing was sent yet.
fn finish_request(
    method: &str,
    responder: &Responder,
    outcome: std::result::Result<HandlerResult, JoinError>,
) {
    let error = match outcome {
        Ok(Ok(())) => {
            if !responder.has_responded() {
                tracing::warn!(method, id = %responder.id(), "handler returned without responding");
            }
            return;
        }
        Ok(Err(e)) => {
            tracing::debug!(method, id = %responder.id(), error = %e, "handler failed");
            e.to_error_body(method)
        }
        Err(e) if e.is_panic() => {
            tracing::error!(method, id = %responder.id(), "handler panicked");
            DispatchError::HandlerPanicked(method.to_string()).to_error_body()
        }
        Err(e) => DispatchError::HandlerFailed {
            method: method.to_string(),
            reason: e.to_string(),
        }
        .to_error_body(),
    };

    if responder.has_responded() {
        tracing::warn!(method, id = %responder.id(), "handler failed after responding");
        return;
    }

    if let Err(e) = responder.send_error_body(error) {
        tracing::warn!(method, error = %e, "could not send error response");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TextEncoding;
    use crate::handler::{HandlerOptions, HandlerRegistry, RequestContext};
    use crate::protocol::{build_frame, error_codes, RequestType};
    use crate::writer::spawn_writer_task;
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, DuplexStream};

    const FAIL: RequestType<Value, ()> = RequestType::new("fail");
    const SILENT: RequestType<Value, ()> = RequestType::new("silent");

    struct Harness {
        input: DuplexStream,
        output: FrameReader<DuplexStream>,
        lifecycle: Arc<Lifecycle>,
        task: tokio::task::JoinHandle<Result<()>>,
    }

    fn harness(registry: HandlerRegistry) -> Harness {
        let (input, host_in) = tokio::io::duplex(8192);
        let (host_out, output) = tokio::io::duplex(8192);

        let lifecycle = Arc::new(Lifecycle::new(Vec::new(), Vec::new(), Duration::from_secs(1)));
        lifecycle.transition(ServiceHostState::Running);
        let (writer, _writer_task) =
            spawn_writer_task(host_out, TextEncoding::Utf8, lifecycle.exit_token().clone());
        let dispatcher = Dispatcher::new(
            Arc::new(registry.freeze()),
            lifecycle.clone(),
            writer,
            Arc::new(PendingRequests::new()),
            4,
        );
        let task = tokio::spawn(dispatcher.run(FrameReader::new(host_in)));

        Harness {
            input,
            output: FrameReader::new(output),
            lifecycle,
            task,
        }
    }

    impl Harness {
        async fn send(&mut self, text: &str) {
            self.input.write_all(&build_frame(text.as_bytes())).await.unwrap();
        }

        async fn recv(&mut self) -> Message {
            Message::deserialize(&self.output.read_message().await.unwrap()).unwrap()
        }
    }

    fn error_code(message: &Message) -> i32 {
        match message {
            Message::ResponseError { error, .. } => error.code,
            other => panic!("expected error response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_handler_error_becomes_internal_error() {
        let mut registry = HandlerRegistry::new();
        registry
            .set_request_handler(&FAIL, |_, _ctx| Err(HostError::handler("nope")), HandlerOptions::serial())
            .unwrap();
        let mut h = harness(registry);

        h.send(r#"{"jsonrpc":"2.0","id":"1","method":"fail"}"#).await;
        let reply = h.recv().await;

        assert_eq!(reply.id().map(MessageId::as_str), Some("1"));
        assert_eq!(error_code(&reply), error_codes::INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn test_rpc_error_body_passed_through() {
        let mut registry = HandlerRegistry::new();
        registry
            .set_request_handler(
                &FAIL,
                |_, _ctx: RequestContext<()>| Err(HostError::Rpc(ErrorBody::new(-1, "custom"))),
                HandlerOptions::serial(),
            )
            .unwrap();
        let mut h = harness(registry);

        h.send(r#"{"jsonrpc":"2.0","id":"1","method":"fail"}"#).await;
        assert_eq!(error_code(&h.recv().await), -1);
    }

    #[tokio::test]
    async fn test_silent_handler_gets_no_reply() {
        let mut registry = HandlerRegistry::new();
        registry
            .set_request_handler(&SILENT, |_, _ctx| Ok(()), HandlerOptions::serial())
            .unwrap();
        registry
            .set_request_handler(&FAIL, |_, _ctx| Err(HostError::handler("x")), HandlerOptions::serial())
            .unwrap();
        let mut h = harness(registry);

        h.send(r#"{"jsonrpc":"2.0","id":"1","method":"silent"}"#).await;
        h.send(r#"{"jsonrpc":"2.0","id":"2","method":"fail"}"#).await;

        // First frame out belongs to the second request.
        assert_eq!(h.recv().await.id().map(MessageId::as_str), Some("2"));
    }

    #[tokio::test]
    async fn test_malformed_envelope_answered_and_loop_continues() {
        let mut h = harness(HandlerRegistry::new());

        h.send(r#"{"jsonrpc":"2.0","id":"5"}"#).await;
        assert_eq!(error_code(&h.recv().await), error_codes::INVALID_REQUEST);

        h.send(r#"{"id":"6","method":"x"}"#).await;
        assert_eq!(error_code(&h.recv().await), error_codes::INVALID_REQUEST);

        h.send(r#"{"jsonrpc":"2.0","id":"7","method":"missing"}"#).await;
        assert_eq!(error_code(&h.recv().await), error_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_requests_rejected_while_shutting_down() {
        let mut h = harness(HandlerRegistry::new());
        h.lifecycle.begin_shutdown();

        h.send(r#"{"jsonrpc":"2.0","id":"1","method":"anything"}"#).await;
        let reply = h.recv().await;

        assert_eq!(error_code(&reply), error_codes::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_response_is_dropped() {
        let mut h = harness(HandlerRegistry::new());

        h.send(r#"{"jsonrpc":"2.0","id":"host-99","result":1}"#).await;
        h.send(r#"{"jsonrpc":"2.0","id":"1","method":"missing"}"#).await;

        assert_eq!(h.recv().await.id().map(MessageId::as_str), Some("1"));
    }

    #[tokio::test]
    async fn test_eof_stops_host_with_error() {
        let h = harness(HandlerRegistry::new());
        let lifecycle = h.lifecycle.clone();
        drop(h.input);

        let result = h.task.await.unwrap();
        assert!(matches!(
            result,
            Err(HostError::Frame(FrameError::UnexpectedEof { .. }))
        ));
        assert_eq!(lifecycle.state(), ServiceHostState::Stopped);
    }
}
