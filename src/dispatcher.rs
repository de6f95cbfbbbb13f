//! The push connection of a session.
//!
//! [`EventDispatcher::run`] keeps one connection alive, reconnecting with
//! capped exponential backoff until [`EventDispatcher::close`] is called.
//! Inbound frames are decoded here; only valid [`InboundEvent`]s are
//! forwarded to the session worker, in arrival order.

use crate::config::ReconnectPolicy;
use crate::error::TransportError;
use crate::transport::{Transport, TransportEvent, TransportFactory};
use chatcore::MalformedEventError;
use chatcore::protocol::{InboundEvent, OutboundEnvelope, decode_inbound};
use chatcore::types::ConnectionState;
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::{Mutex, Notify, mpsc, watch};

/// What the dispatcher reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DispatcherEvent {
    StateChanged(ConnectionState),
    Inbound(InboundEvent),
}

pub struct EventDispatcher {
    factory: Arc<dyn TransportFactory>,
    url: String,
    policy: ReconnectPolicy,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    state_tx: watch::Sender<ConnectionState>,
    is_running: AtomicBool,
    local_close: AtomicBool,
    shutdown_notifier: Notify,
    reconnect_attempts: AtomicU32,
}

impl EventDispatcher {
    pub fn new(factory: Arc<dyn TransportFactory>, url: String, policy: ReconnectPolicy) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        Self {
            factory,
            url,
            policy,
            transport: Mutex::new(None),
            state_tx,
            is_running: AtomicBool::new(false),
            local_close: AtomicBool::new(false),
            shutdown_notifier: Notify::new(),
            reconnect_attempts: AtomicU32::new(0),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn is_closed_locally(&self) -> bool {
        self.local_close.load(Ordering::Relaxed)
    }

    async fn set_state(&self, state: ConnectionState, sink: &mpsc::Sender<DispatcherEvent>) {
        if self.is_closed_locally() {
            return;
        }
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(target: "Dispatcher", "Connection {previous} -> {state}");
            let _ = sink.send(DispatcherEvent::StateChanged(state)).await;
        }
    }

    pub(crate) async fn run(self: Arc<Self>, sink: mpsc::Sender<DispatcherEvent>) {
        if self.is_running.swap(true, Ordering::SeqCst) {
            warn!(target: "Dispatcher", "Dispatcher `run` called while already running.");
            return;
        }
        let _running = scopeguard::guard((), |_| {
            self.is_running.store(false, Ordering::Relaxed);
        });

        // The state starts out as `Connecting`, so the first transition below
        // is silent. Announce it here.
        if !self.is_closed_locally() {
            let _ = sink
                .send(DispatcherEvent::StateChanged(self.state()))
                .await;
        }

        while !self.is_closed_locally() {
            self.set_state(ConnectionState::Connecting, &sink).await;

            let connected = tokio::select! {
                biased;
                _ = self.shutdown_notifier.notified() => break,
                result = self.factory.create_transport(&self.url) => result,
            };

            match connected {
                Ok((transport, events)) => {
                    *self.transport.lock().await = Some(transport.clone());
                    self.read_events_loop(events, &sink).await;
                    self.transport.lock().await.take();
                    transport.disconnect().await;
                }
                Err(e) => {
                    warn!(target: "Dispatcher", "{}", TransportError::Connect(e));
                }
            }

            if self.is_closed_locally() {
                break;
            }
            self.set_state(ConnectionState::Closed, &sink).await;

            let attempt = self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
            let delay = self.policy.delay_for(attempt);
            info!(
                target: "Dispatcher",
                "Will attempt to reconnect in {:?} (attempt {})",
                delay,
                attempt + 1
            );
            tokio::select! {
                biased;
                _ = self.shutdown_notifier.notified() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!(target: "Dispatcher", "Dispatcher run loop has shut down.");
    }

    async fn read_events_loop(
        &self,
        mut events: mpsc::Receiver<TransportEvent>,
        sink: &mpsc::Sender<DispatcherEvent>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_notifier.notified() => return,
                event = events.recv() => match event {
                    Some(TransportEvent::Connected) => {
                        self.reconnect_attempts.store(0, Ordering::Relaxed);
                        info!(target: "Dispatcher", "Connected");
                        self.set_state(ConnectionState::Open, sink).await;
                    }
                    Some(TransportEvent::TextReceived(text)) => {
                        let Some(event) = classify(&text) else {
                            continue;
                        };
                        if self.is_closed_locally() {
                            return;
                        }
                        if sink.send(DispatcherEvent::Inbound(event)).await.is_err() {
                            debug!(target: "Dispatcher", "Session dropped, closing read loop");
                            return;
                        }
                    }
                    Some(TransportEvent::Disconnected) | None => {
                        if !self.is_closed_locally() {
                            warn!(target: "Dispatcher", "{}", TransportError::Closed);
                        }
                        return;
                    }
                },
            }
        }
    }

    /// Writes one envelope. Fails fast unless the connection is open.
    pub async fn send(&self, envelope: &OutboundEnvelope) -> Result<(), TransportError> {
        let state = self.state();
        if !state.is_open() {
            return Err(TransportError::NotOpen(state));
        }
        let transport = self
            .transport
            .lock()
            .await
            .clone()
            .ok_or(TransportError::NotOpen(state))?;
        let text = envelope.encode()?;
        debug!(target: "Session/Send", "--> {}", envelope.type_name());
        transport.send(&text).await.map_err(TransportError::Send)
    }

    /// Closes the connection for good. Goes through `Closing` to `Closed`
    /// and reports neither to the owner.
    pub async fn close(&self) {
        if self.local_close.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state_tx.send_replace(ConnectionState::Closing);
        self.shutdown_notifier.notify_one();
        let transport = self.transport.lock().await.take();
        if let Some(transport) = transport {
            transport.disconnect().await;
        }
        self.state_tx.send_replace(ConnectionState::Closed);
        info!(target: "Dispatcher", "Connection closed locally");
    }
}

fn classify(text: &str) -> Option<InboundEvent> {
    match decode_inbound(text) {
        Ok(event) => {
            debug!(target: "Session/Recv", "<-- {}", event.type_name());
            Some(event)
        }
        Err(MalformedEventError::UnknownType(event_type)) => {
            warn!(target: "Dispatcher", "Dropping event of unknown type `{event_type}`");
            None
        }
        Err(e) => {
            warn!(target: "Dispatcher", "Dropping malformed event: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransportFactory;
    use async_trait::async_trait;
    use std::time::Duration;
    use uuid::Uuid;

    fn dispatcher(factory: Arc<dyn TransportFactory>) -> Arc<EventDispatcher> {
        Arc::new(EventDispatcher::new(
            factory,
            "ws://test/ws/chat/?token=t".to_string(),
            ReconnectPolicy::default(),
        ))
    }

    async fn expect_state(rx: &mut mpsc::Receiver<DispatcherEvent>, state: ConnectionState) {
        assert_eq!(rx.recv().await, Some(DispatcherEvent::StateChanged(state)));
    }

    #[tokio::test]
    async fn test_send_fails_fast_when_not_open() {
        let dispatcher = dispatcher(Arc::new(MockTransportFactory::new()));
        assert_eq!(dispatcher.state(), ConnectionState::Connecting);
        let result = dispatcher
            .send(&OutboundEnvelope::ReadReceiptConfirmation {
                message_id: "1".into(),
            })
            .await;
        assert!(matches!(
            result,
            Err(TransportError::NotOpen(ConnectionState::Connecting))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_forwards_valid_events_and_reconnects_after_drop() {
        let factory = Arc::new(MockTransportFactory::new());
        let dispatcher = dispatcher(factory.clone());
        let (sink, mut rx) = mpsc::channel(16);
        let run = tokio::spawn(dispatcher.clone().run(sink));

        expect_state(&mut rx, ConnectionState::Connecting).await;
        expect_state(&mut rx, ConnectionState::Open).await;

        let (transport, server) = factory.latest().unwrap();
        let peer = Uuid::new_v4();
        server
            .send(TransportEvent::TextReceived("{not json".into()))
            .await
            .unwrap();
        server
            .send(TransportEvent::TextReceived(r#"{"type":"poke"}"#.into()))
            .await
            .unwrap();
        server
            .send(TransportEvent::TextReceived(format!(
                r#"{{"type":"typing_indicator","sender_id":"{peer}"}}"#
            )))
            .await
            .unwrap();
        assert_eq!(
            rx.recv().await,
            Some(DispatcherEvent::Inbound(InboundEvent::TypingIndicator {
                sender_id: peer
            }))
        );

        dispatcher
            .send(&OutboundEnvelope::ChatMessage {
                content: "hi".into(),
                room_id: None,
            })
            .await
            .unwrap();
        assert_eq!(
            transport.sent.lock().unwrap().as_slice(),
            [r#"{"type":"chat_message","content":"hi"}"#]
        );

        server.send(TransportEvent::Disconnected).await.unwrap();
        expect_state(&mut rx, ConnectionState::Closed).await;
        expect_state(&mut rx, ConnectionState::Connecting).await;
        expect_state(&mut rx, ConnectionState::Open).await;
        assert_eq!(factory.connections.lock().unwrap().len(), 2);

        dispatcher.close().await;
        run.await.unwrap();
        assert_eq!(dispatcher.state(), ConnectionState::Closed);
        assert!(rx.try_recv().is_err(), "nothing reported after close");
    }

    struct RefusingFactory {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl TransportFactory for RefusingFactory {
        async fn create_transport(
            &self,
            _url: &str,
        ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("connection refused"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failures_back_off_exponentially() {
        let factory = Arc::new(RefusingFactory {
            attempts: AtomicU32::new(0),
        });
        let dispatcher = dispatcher(factory.clone());
        let (sink, _rx) = mpsc::channel(64);
        let run = tokio::spawn(dispatcher.clone().run(sink));

        // Attempts at t = 0, 1, 3 and 7 seconds.
        tokio::time::sleep(Duration::from_millis(7500)).await;
        assert_eq!(factory.attempts.load(Ordering::SeqCst), 4);

        dispatcher.close().await;
        run.await.unwrap();
        assert_eq!(factory.attempts.load(Ordering::SeqCst), 4);
    }
}
