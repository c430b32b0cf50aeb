//! Context objects handed to handlers.
//!
//! - [`RequestContext`] - answers one request, exactly once
//! - [`EventContext`] - sends events (any number, from any thread) and
//!   outbound requests to the peer
//!
//! # Example
//!
//! ```ignore
//! fn open(params: OpenParams, ctx: RequestContext<OpenResult>) -> HandlerResult {
//!     ctx.events().send_event(&PROGRESS, &Progress { percent: 50 })?;
//!     ctx.send_result(&OpenResult { ok: true })
//! }
//! ```

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::pending::{PendingGuard, PendingRequests};
use crate::codec::JsonCodec;
use crate::error::{HostError, Result};
use crate::protocol::{error_codes, ErrorBody, EventType, Message, MessageId, RequestType};
use crate::writer::WriterHandle;

/// Something that can send events to the peer.
pub trait EventSender {
    /// Send an event with an untyped payload.
    fn send_event_value(&self, method: &str, params: Option<Value>) -> Result<()>;

    /// Send a typed event.
    ///
    /// # Errors
    ///
    /// - [`HostError::Json`] if `params` cannot be serialized
    /// - [`HostError::ConnectionClosed`] if the host has stopped writing
    fn send_event<P: Serialize>(&self, descriptor: &EventType<P>, params: &P) -> Result<()>
    where
        Self: Sized,
    {
        let params = JsonCodec::encode(params)?;
        self.send_event_value(descriptor.method(), Some(params))
    }
}

/// Sends events and outbound requests to the peer.
///
/// Cheap to clone; may outlive the request it was handed to.
#[derive(Clone, Debug)]
pub struct EventContext {
    writer: WriterHandle,
    pending: Arc<PendingRequests>,
}

impl EventContext {
    pub(crate) fn new(writer: WriterHandle, pending: Arc<PendingRequests>) -> Self {
        Self { writer, pending }
    }

    /// Send a request to the peer and wait for its response.
    ///
    /// The id is generated by the host.
    ///
    /// # Errors
    ///
    /// - [`HostError::Rpc`] if the peer answers with an error
    /// - [`HostError::Message`] if the result does not decode into `R`
    /// - [`HostError::ConnectionClosed`] if the host stops before a reply arrives
    pub async fn send_request<P, R>(&self, descriptor: &RequestType<P, R>, params: &P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = JsonCodec::encode(params)?;
        let (id, reply) = self.pending.register()?;
        let _guard = PendingGuard::new(&self.pending, id.clone());

        let message = Message::request(descriptor.method(), id.clone(), Some(params));
        self.writer.send_message(&message)?;
        tracing::debug!(method = descriptor.method(), %id, "sent outbound request");

        match reply.await {
            Ok(Ok(result)) => JsonCodec::decode(result),
            Ok(Err(error)) => Err(HostError::Rpc(error)),
            Err(_) => Err(HostError::ConnectionClosed),
        }
    }

    #[cfg(test)]
    pub(crate) fn writer(&self) -> &WriterHandle {
        &self.writer
    }
}

impl EventSender for EventContext {
    fn send_event_value(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.writer.send_message(&Message::event(method, params))
    }
}

/// Untyped half of a request context, shared with the dispatcher.
///
/// Whoever flips `responded` first owns the single reply.
#[derive(Clone, Debug)]
pub(crate) struct Responder {
    id: MessageId,
    responded: Arc<AtomicBool>,
    writer: WriterHandle,
}

impl Responder {
    pub(crate) fn new(id: MessageId, writer: WriterHandle) -> Self {
        Self {
            id,
            responded: Arc::new(AtomicBool::new(false)),
            writer,
        }
    }

    pub(crate) fn id(&self) -> &MessageId {
        &self.id
    }

    pub(crate) fn has_responded(&self) -> bool {
        self.responded.load(Ordering::Acquire)
    }

    fn claim(&self) -> Result<()> {
        self.responded
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| HostError::AlreadyResponded(self.id.clone()))
    }

    pub(crate) fn send_result_value(&self, result: Value) -> Result<()> {
        self.claim()?;
        self.writer
            .send_message(&Message::response(self.id.clone(), result))
    }

    pub(crate) fn send_error_body(&self, error: ErrorBody) -> Result<()> {
        self.claim()?;
        self.writer
            .send_message(&Message::response_error(self.id.clone(), error))
    }
}

/// Context for answering one request whose result type is `R`.
///
/// Exactly one of [`send_result`](Self::send_result),
/// [`send_error`](Self::send_error) or
/// [`send_error_body`](Self::send_error_body) succeeds; later calls return
/// [`HostError::AlreadyResponded`] and send nothing. Clones share that rule.
pub struct RequestContext<R> {
    responder: Responder,
    events: EventContext,
    _result: PhantomData<fn(R)>,
}

impl<R> Clone for RequestContext<R> {
    fn clone(&self) -> Self {
        Self {
            responder: self.responder.clone(),
            events: self.events.clone(),
            _result: PhantomData,
        }
    }
}

impl<R> std::fmt::Debug for RequestContext<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("id", self.responder.id())
            .field("responded", &self.responder.has_responded())
            .finish()
    }
}

impl<R> RequestContext<R> {
    pub(crate) fn new(responder: Responder, events: EventContext) -> Self {
        Self {
            responder,
            events,
            _result: PhantomData,
        }
    }

    /// Id of the request being answered.
    #[inline]
    pub fn id(&self) -> &MessageId {
        self.responder.id()
    }

    /// Whether a reply has already been sent.
    #[inline]
    pub fn has_responded(&self) -> bool {
        self.responder.has_responded()
    }

    /// Event sender for this connection.
    #[inline]
    pub fn events(&self) -> &EventContext {
        &self.events
    }

    /// Send an error response with code `-32603`.
    pub fn send_error(&self, message: impl Into<String>) -> Result<()> {
        self.send_error_body(ErrorBody::new(error_codes::INTERNAL_ERROR, message))
    }

    /// Send an error response with a caller-chosen body.
    pub fn send_error_body(&self, error: ErrorBody) -> Result<()> {
        self.responder.send_error_body(error)
    }
}

impl<R: Serialize> RequestContext<R> {
    /// Send the successful response.
    ///
    /// # Errors
    ///
    /// - [`HostError::Json`] if `result` cannot be serialized (nothing is sent
    ///   and the context stays unanswered)
    /// - [`HostError::AlreadyResponded`] on a second reply
    pub fn send_result(&self, result: &R) -> Result<()> {
        let value = JsonCodec::encode(result)?;
        self.responder.send_result_value(value)
    }
}

impl<R> EventSender for RequestContext<R> {
    fn send_event_value(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.events.send_event_value(method, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TextEncoding;
    use crate::protocol::FrameReader;
    use crate::writer::spawn_writer_task;
    use serde_json::json;
    use tokio::io::DuplexStream;
    use tokio_util::sync::CancellationToken;

    const PROGRESS: EventType<u32> = EventType::new("progress");
    const ASK: RequestType<String, bool> = RequestType::new("client/ask");

    fn setup() -> (EventContext, Arc<PendingRequests>, FrameReader<DuplexStream>) {
        let (client, server) = tokio::io::duplex(8192);
        let (writer, _task) = spawn_writer_task(client, TextEncoding::Utf8, CancellationToken::new());
        let pending = Arc::new(PendingRequests::new());
        let events = EventContext::new(writer, pending.clone());
        (events, pending, FrameReader::new(server))
    }

    async fn next(reader: &mut FrameReader<DuplexStream>) -> Message {
        Message::deserialize(&reader.read_message().await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_send_result_once() {
        let (events, _pending, mut reader) = setup();
        let responder = Responder::new(MessageId::from("1"), events.writer().clone());
        let ctx: RequestContext<String> = RequestContext::new(responder, events);

        ctx.send_result(&"done".to_string()).unwrap();
        assert!(ctx.has_responded());

        let second = ctx.clone().send_error("too late");
        assert!(matches!(second, Err(HostError::AlreadyResponded(id)) if id.as_str() == "1"));

        assert_eq!(next(&mut reader).await, Message::response("1", json!("done")));
    }

    #[tokio::test]
    async fn test_send_error_uses_internal_error_code() {
        let (events, _pending, mut reader) = setup();
        let responder = Responder::new(MessageId::from("2"), events.writer().clone());
        let ctx: RequestContext<()> = RequestContext::new(responder, events);

        ctx.send_error("broken").unwrap();

        let message = next(&mut reader).await;
        assert_eq!(
            message,
            Message::response_error("2", ErrorBody::new(error_codes::INTERNAL_ERROR, "broken"))
        );
    }

    #[tokio::test]
    async fn test_events_any_number_of_times() {
        let (events, _pending, mut reader) = setup();

        for i in 0..3 {
            events.send_event(&PROGRESS, &i).unwrap();
        }

        for i in 0..3 {
            assert_eq!(next(&mut reader).await, Message::event("progress", Some(json!(i))));
        }
    }

    #[tokio::test]
    async fn test_send_request_resolves_on_response() {
        let (events, pending, mut reader) = setup();

        let call = tokio::spawn({
            let events = events.clone();
            async move { events.send_request(&ASK, &"sure?".to_string()).await }
        });

        let request = next(&mut reader).await;
        assert_eq!(request.method(), Some("client/ask"));
        let id = request.id().cloned().unwrap();
        assert!(pending.complete(&id, Ok(json!(true))));

        assert!(call.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn test_abandoned_send_request_leaves_no_entry() {
        let (events, pending, mut reader) = setup();

        let param = "x".to_string();
        let call = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            events.send_request(&ASK, &param),
        );
        assert!(call.await.is_err());

        let id = next(&mut reader).await.id().cloned().unwrap();
        assert_eq!(pending.len(), 0);
        assert!(!pending.complete(&id, Ok(json!(true))));
    }

    #[tokio::test]
    async fn test_send_request_error_reply() {
        let (events, pending, mut reader) = setup();

        let call = tokio::spawn({
            let events = events.clone();
            async move { events.send_request(&ASK, &"x".to_string()).await }
        });

        let id = next(&mut reader).await.id().cloned().unwrap();
        pending.complete(&id, Err(ErrorBody::new(-1, "declined")));

        match call.await.unwrap() {
            Err(HostError::Rpc(body)) => assert_eq!(body.message, "declined"),
            other => panic!("expected rpc error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_request_fails_when_closed() {
        let (events, pending, mut reader) = setup();

        let call = tokio::spawn({
            let events = events.clone();
            async move { events.send_request(&ASK, &"x".to_string()).await }
        });

        next(&mut reader).await;
        pending.close();

        assert!(matches!(call.await.unwrap(), Err(HostError::ConnectionClosed)));
    }
}
