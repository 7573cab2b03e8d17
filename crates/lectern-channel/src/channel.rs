//! Request/response correlation, events, and subscriptions over a message port.
//!
//! A [`CorrelationChannel`] owns one end of a [`MessagePort`] and runs a
//! receive pump that routes every inbound frame:
//!
//! - `response` frames with a `correlationId` resolve the matching in-flight
//!   call; unmatched ones are logged and dropped
//! - `response` frames with a `subscriptionId` are streamed to the local
//!   [`Subscription`] they belong to
//! - request frames (any other kind with a `correlationId`) run the handler
//!   registered for that kind and send exactly one response back, an error
//!   payload if the handler failed or none is registered
//! - notification frames (no `correlationId`) run the handler and answer
//!   nothing
//!
//! Both ends of a conversation use this same type. Subscription bookkeeping
//! is built in on the serving side: inbound `subscribe` requests are granted
//! without a handler, and [`CorrelationChannel::push_to_subscribers`] fans a
//! payload out to every open stream for a topic.
//!
//! Request handlers run as their own tasks, concurrent with the pump, so a
//! handler parked at an asynchronous boundary (a media call waiting on a
//! player that has not reported ready, say) never holds up the frames behind
//! it; correlation ids keep the out-of-order responses sorted. Notification
//! handlers and subscription deliveries stay on the pump in wire order, so a
//! notification handler must not await inbound traffic of its own channel.

use crate::port::MessagePort;
use futures::future::BoxFuture;
use futures::FutureExt;
use lectern_core::payload::{
    from_payload, to_payload, ErrorPayload, SubscribeArgs, SubscriptionGrant, UnsubscribeArgs,
};
use lectern_core::{
    ChannelConfig, CorrelationId, Envelope, LecternError, MessageKind, Payload, Result,
    SubscriptionId,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Async handler for one message kind. Receives the request payload and
/// produces the response payload.
pub type RequestHandler = Arc<dyn Fn(Payload) -> BoxFuture<'static, Result<Payload>> + Send + Sync>;

/// Hook run on the pump when a call resolves successfully, before the caller
/// is woken. Used to install subscription delivery routes in frame order.
type ResolveHook = Box<dyn FnOnce(&Payload) + Send>;

/// One in-flight request awaiting its response.
struct PendingCall {
    issued_at: Instant,
    responder: oneshot::Sender<Result<Payload>>,
    on_success: Option<ResolveHook>,
}

/// State shared between the channel handle, its pump task, and subscriptions.
///
/// Every mutex here guards plain map bookkeeping and is never held across an
/// await point.
struct ChannelShared {
    port: Arc<dyn MessagePort>,
    config: ChannelConfig,
    /// Calls awaiting a response, by correlation id.
    pending: StdMutex<HashMap<CorrelationId, PendingCall>>,
    /// Handlers for inbound requests and notifications, one per kind.
    handlers: StdMutex<HashMap<MessageKind, RequestHandler>>,
    /// Local delivery routes for streams this end has subscribed to.
    streams: StdMutex<HashMap<SubscriptionId, mpsc::UnboundedSender<Payload>>>,
    /// Streams granted to the peer, by id, with the topic they carry.
    topics: StdMutex<HashMap<SubscriptionId, String>>,
    closed: AtomicBool,
}

/// Bidirectional correlation channel over a message port.
///
/// Dropping the channel closes it: the pump stops and every in-flight call
/// resolves with a cancellation error.
pub struct CorrelationChannel {
    shared: Arc<ChannelShared>,
    pump: StdMutex<Option<JoinHandle<()>>>,
}

impl CorrelationChannel {
    /// Take ownership of a port endpoint and start the receive pump.
    ///
    /// Must be called within a tokio runtime.
    pub fn bind<P: MessagePort + 'static>(port: P, config: ChannelConfig) -> Self {
        let shared = Arc::new(ChannelShared {
            port: Arc::new(port),
            config,
            pending: StdMutex::new(HashMap::new()),
            handlers: StdMutex::new(HashMap::new()),
            streams: StdMutex::new(HashMap::new()),
            topics: StdMutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });
        let pump = tokio::spawn(ChannelShared::run_pump(Arc::clone(&shared)));
        Self {
            shared,
            pump: StdMutex::new(Some(pump)),
        }
    }

    /// Send a request and wait for its response, up to the configured call
    /// timeout.
    pub async fn call(&self, kind: MessageKind, payload: Payload) -> Result<Payload> {
        let timeout = self.shared.config.call_timeout;
        self.shared.call(kind, payload, timeout, None).await
    }

    /// Send a request and wait for its response, up to `timeout`.
    ///
    /// On timeout the pending entry is discarded; a response that arrives
    /// later is dropped with a log line, never delivered to a different call.
    pub async fn call_with_timeout(
        &self,
        kind: MessageKind,
        payload: Payload,
        timeout: Duration,
    ) -> Result<Payload> {
        self.shared.call(kind, payload, timeout, None).await
    }

    /// Send a fire-and-forget envelope. No correlation id, no response.
    pub async fn emit(&self, kind: MessageKind, payload: Payload) -> Result<()> {
        if kind.is_response() {
            return Err(LecternError::protocol("cannot emit a response envelope"));
        }
        self.shared.send(&Envelope::event(kind, payload)).await
    }

    /// Register the handler for one message kind, replacing any previous one.
    ///
    /// For a request kind the handler runs as its own task and may park at
    /// asynchronous boundaries without holding up other inbound traffic. For
    /// a notification kind it runs on the receive pump, in wire order, and
    /// must not await inbound traffic of this same channel. `subscribe` and
    /// `unsubscribe` are answered by built-in bookkeeping and never reach a
    /// registered handler.
    pub fn on<F, Fut>(&self, kind: MessageKind, handler: F)
    where
        F: Fn(Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Payload>> + Send + 'static,
    {
        let handler: RequestHandler = Arc::new(move |payload| handler(payload).boxed());
        if lock(&self.shared.handlers).insert(kind, handler).is_some() {
            tracing::debug!(kind = %kind, "request handler replaced");
        }
    }

    /// Subscribe to a topic served by the peer.
    ///
    /// The delivery route is installed on the pump before the grant response
    /// resolves, so a push sent right behind the grant frame is not lost.
    pub async fn subscribe(&self, topic: impl Into<String>) -> Result<Subscription> {
        let topic = topic.into();
        let args = to_payload(&SubscribeArgs {
            event: topic.clone(),
        })?;

        let (deliver, deliveries) = mpsc::unbounded_channel();
        let hook: ResolveHook = {
            let weak = Arc::downgrade(&self.shared);
            Box::new(move |payload: &Payload| {
                let Some(shared) = weak.upgrade() else { return };
                if let Ok(grant) = from_payload::<SubscriptionGrant>(payload) {
                    lock(&shared.streams).insert(grant.subscription_id, deliver);
                }
            })
        };

        let timeout = self.shared.config.call_timeout;
        let response = self
            .shared
            .call(MessageKind::Subscribe, args, timeout, Some(hook))
            .await?;
        let grant: SubscriptionGrant = from_payload(&response)?;

        tracing::debug!(subscription_id = %grant.subscription_id, topic = %topic, "subscribed");
        Ok(Subscription {
            id: grant.subscription_id,
            topic,
            deliveries,
            shared: Arc::downgrade(&self.shared),
            active: true,
        })
    }

    /// Push a payload to every peer stream subscribed to `topic`. Returns how
    /// many streams were served.
    ///
    /// Deliveries to one stream always arrive in push order.
    pub async fn push_to_subscribers(&self, topic: &str, payload: Payload) -> Result<usize> {
        let targets: Vec<SubscriptionId> = lock(&self.shared.topics)
            .iter()
            .filter(|(_, granted)| granted.as_str() == topic)
            .map(|(id, _)| *id)
            .collect();

        let mut delivered = 0;
        for subscription_id in targets {
            let envelope = Envelope::stream(subscription_id, payload.clone());
            self.shared.send(&envelope).await?;
            delivered += 1;
        }
        Ok(delivered)
    }

    /// Number of peer streams currently open for `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        lock(&self.shared.topics)
            .values()
            .filter(|granted| granted.as_str() == topic)
            .count()
    }

    /// Number of calls currently awaiting a response.
    pub fn pending_call_count(&self) -> usize {
        lock(&self.shared.pending).len()
    }

    /// Whether the channel has been closed or its port has gone away.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Close the channel: stop the pump, resolve every in-flight call with a
    /// cancellation error, and drop all subscription state. Idempotent.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(pump) = lock(&self.pump).take() {
            pump.abort();
        }
        self.shared.invalidate("channel closed");
        tracing::debug!(port = self.shared.port.port_kind(), "channel closed");
    }
}

impl Drop for CorrelationChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for CorrelationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationChannel")
            .field("port", &self.shared.port.port_kind())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl ChannelShared {
    async fn send(&self, envelope: &Envelope) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LecternError::cancelled(format!(
                "channel closed; {} not sent",
                envelope.kind
            )));
        }
        let frame = envelope.encode()?;
        tracing::trace!(kind = %envelope.kind, port = self.port.port_kind(), "frame out");
        self.port.send(frame).await
    }

    async fn call(
        &self,
        kind: MessageKind,
        payload: Payload,
        timeout: Duration,
        on_success: Option<ResolveHook>,
    ) -> Result<Payload> {
        if !kind.expects_response() {
            return Err(LecternError::protocol(format!(
                "{kind} is one-way; emit it instead of calling"
            )));
        }

        let (envelope, correlation_id) = Envelope::request(kind, payload);
        let (responder, outcome) = oneshot::channel();
        lock(&self.pending).insert(
            correlation_id,
            PendingCall {
                issued_at: Instant::now(),
                responder,
                on_success,
            },
        );

        if let Err(err) = self.send(&envelope).await {
            lock(&self.pending).remove(&correlation_id);
            return Err(err);
        }

        match tokio::time::timeout(timeout, outcome).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(LecternError::cancelled(format!(
                "channel closed while awaiting {kind}"
            ))),
            Err(_) => {
                if let Some(stale) = lock(&self.pending).remove(&correlation_id) {
                    tracing::debug!(
                        kind = %kind,
                        waited_ms = stale.issued_at.elapsed().as_millis() as u64,
                        "call timed out"
                    );
                }
                Err(LecternError::timeout(format!(
                    "{kind} after {}ms",
                    timeout.as_millis()
                )))
            }
        }
    }

    async fn run_pump(shared: Arc<ChannelShared>) {
        loop {
            let Some(frame) = shared.port.recv().await else {
                break;
            };
            match Envelope::decode(&frame) {
                Ok(envelope) => Self::dispatch(&shared, envelope).await,
                Err(err) => {
                    tracing::warn!(error = %err, "dropping malformed frame");
                }
            }
        }
        tracing::debug!(port = shared.port.port_kind(), "message port closed");
        shared.closed.store(true, Ordering::SeqCst);
        shared.invalidate("message port closed");
    }

    async fn dispatch(shared: &Arc<ChannelShared>, envelope: Envelope) {
        if envelope.kind.is_response() {
            // Envelope::decode has already checked that one of the two ids
            // is present.
            if let Some(subscription_id) = envelope.subscription_id {
                shared.deliver_stream(subscription_id, envelope.payload);
            } else if let Some(correlation_id) = envelope.correlation_id {
                shared.resolve_call(correlation_id, envelope.payload);
            }
            return;
        }

        match envelope.correlation_id {
            Some(correlation_id) => {
                // Off the pump: a handler parked at an asynchronous boundary
                // must not hold up the frames behind it. Responses pair by
                // correlation id, so completion order is free.
                let shared = Arc::clone(shared);
                tokio::spawn(async move {
                    shared
                        .handle_request(envelope.kind, correlation_id, envelope.payload)
                        .await;
                });
            }
            None => {
                shared
                    .handle_notification(envelope.kind, envelope.payload)
                    .await;
            }
        }
    }

    fn resolve_call(&self, correlation_id: CorrelationId, payload: Payload) {
        let Some(call) = lock(&self.pending).remove(&correlation_id) else {
            tracing::debug!(%correlation_id, "late or unknown response dropped");
            return;
        };

        let outcome = classify_response(payload);
        if let (Ok(payload), Some(hook)) = (&outcome, call.on_success) {
            hook(payload);
        }
        if call.responder.send(outcome).is_err() {
            tracing::debug!(
                %correlation_id,
                waited_ms = call.issued_at.elapsed().as_millis() as u64,
                "caller gone before response arrived"
            );
        }
    }

    fn deliver_stream(&self, subscription_id: SubscriptionId, payload: Payload) {
        let mut streams = lock(&self.streams);
        let delivered = match streams.get(&subscription_id) {
            Some(route) => route.send(payload).is_ok(),
            None => {
                tracing::debug!(%subscription_id, "delivery for inactive stream dropped");
                return;
            }
        };
        if !delivered {
            streams.remove(&subscription_id);
            tracing::debug!(%subscription_id, "stream receiver gone; route removed");
        }
    }

    async fn handle_request(
        &self,
        kind: MessageKind,
        correlation_id: CorrelationId,
        payload: Payload,
    ) {
        let outcome = match kind {
            MessageKind::Subscribe => self.grant_subscription(&payload),
            MessageKind::Unsubscribe => self.revoke_subscription(&payload),
            _ => match self.handler_for(kind) {
                Some(handler) => handler(payload).await,
                None => Err(LecternError::capability_unavailable(format!(
                    "no handler registered for {kind}"
                ))),
            },
        };

        let response_payload = match outcome {
            Ok(payload) => payload,
            Err(err) => {
                tracing::debug!(kind = %kind, error = %err, "request failed");
                ErrorPayload::from_error(&err).into_payload()
            }
        };

        let response = Envelope::response(correlation_id, response_payload);
        if let Err(err) = self.send(&response).await {
            tracing::warn!(kind = %kind, error = %err, "could not send response");
        }
    }

    async fn handle_notification(&self, kind: MessageKind, payload: Payload) {
        match self.handler_for(kind) {
            Some(handler) => {
                if let Err(err) = handler(payload).await {
                    tracing::warn!(kind = %kind, error = %err, "notification handler failed");
                }
            }
            None => tracing::debug!(kind = %kind, "unhandled notification dropped"),
        }
    }

    fn grant_subscription(&self, payload: &Payload) -> Result<Payload> {
        let args: SubscribeArgs = from_payload(payload)?;
        let subscription_id = SubscriptionId::new();
        lock(&self.topics).insert(subscription_id, args.event.clone());
        tracing::debug!(%subscription_id, topic = %args.event, "subscription granted");
        to_payload(&SubscriptionGrant { subscription_id })
    }

    /// Revoking an already-closed stream is a success, not an error.
    fn revoke_subscription(&self, payload: &Payload) -> Result<Payload> {
        let args: UnsubscribeArgs = from_payload(payload)?;
        if lock(&self.topics).remove(&args.subscription_id).is_some() {
            tracing::debug!(subscription_id = %args.subscription_id, "subscription revoked");
        }
        Ok(Payload::new())
    }

    fn handler_for(&self, kind: MessageKind) -> Option<RequestHandler> {
        lock(&self.handlers).get(&kind).cloned()
    }

    fn invalidate(&self, reason: &'static str) {
        let pending: Vec<(CorrelationId, PendingCall)> =
            lock(&self.pending).drain().collect();
        for (correlation_id, call) in pending {
            tracing::debug!(%correlation_id, reason, "rejecting in-flight call");
            let _ = call.responder.send(Err(LecternError::cancelled(reason)));
        }
        lock(&self.streams).clear();
        lock(&self.topics).clear();
    }
}

/// Distinguish success responses from error responses by the `error` key.
fn classify_response(payload: Payload) -> Result<Payload> {
    if !payload.contains_key("error") {
        return Ok(payload);
    }
    match from_payload::<ErrorPayload>(&payload) {
        Ok(failure) => Err(failure.into_error()),
        Err(_) => Err(LecternError::protocol(
            "error response with malformed error payload",
        )),
    }
}

/// One open subscription stream on the consuming side.
///
/// Dropping the handle stops local delivery; [`Subscription::unsubscribe`]
/// additionally closes the stream on the serving side.
pub struct Subscription {
    id: SubscriptionId,
    topic: String,
    deliveries: mpsc::UnboundedReceiver<Payload>,
    shared: Weak<ChannelShared>,
    active: bool,
}

impl Subscription {
    /// Identifier assigned by the serving side.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Topic this stream carries.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next delivery. `None` once the stream is closed, whether
    /// by unsubscribing or by channel teardown.
    pub async fn next(&mut self) -> Option<Payload> {
        self.deliveries.recv().await
    }

    /// Take an already-delivered payload without waiting.
    pub fn try_next(&mut self) -> Option<Payload> {
        self.deliveries.try_recv().ok()
    }

    /// Close the stream on both sides. Safe to call any number of times;
    /// repeated calls do nothing.
    pub async fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        lock(&shared.streams).remove(&self.id);

        let args = UnsubscribeArgs {
            subscription_id: self.id,
        };
        let revoke = match to_payload(&args) {
            Ok(payload) => {
                shared
                    .call(
                        MessageKind::Unsubscribe,
                        payload,
                        shared.config.call_timeout,
                        None,
                    )
                    .await
            }
            Err(err) => Err(err),
        };
        if let Err(err) = revoke {
            tracing::debug!(subscription_id = %self.id, error = %err, "unsubscribe not acknowledged");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        // Best effort: stop local delivery. The serving side keeps the grant
        // until an explicit unsubscribe or channel teardown.
        if let Some(shared) = self.shared.upgrade() {
            lock(&shared.streams).remove(&self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("active", &self.active)
            .finish()
    }
}

/// These mutexes guard map bookkeeping only and are never held across an
/// await, so a poisoned lock just means a panic elsewhere; the map itself is
/// still coherent.
fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
