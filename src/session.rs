//! The session handle and the worker task that owns all session state.
//!
//! Every mutation and every read goes through one command queue drained by a
//! single worker, so no two state changes interleave. Network waits (the
//! push connection, REST fetches, typing timers) run in their own tasks and
//! post their results back to the worker.

use crate::config::SessionConfig;
use crate::dispatcher::{DispatcherEvent, EventDispatcher};
use crate::error::SessionError;
use crate::http::{HttpClient, UreqHttpClient};
use crate::snapshot::{FetchError, SnapshotIngestor};
use crate::transport::{TokioWebSocketTransportFactory, TransportFactory};
use crate::typing::{TypingExpired, TypingRegistry};
use chatcore::ValidationError;
use chatcore::credentials::Credentials;
use chatcore::protocol::{InboundEvent, IncomingMessage, OutboundEnvelope};
use chatcore::store::{ApplyOutcome, ConversationStore};
use chatcore::types::events::{CoreEventBus, Event, EventHandler, Notification};
use chatcore::types::{ConnectionState, Conversation, ConversationId, Message, Snapshot, User, UserId};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Result of opening a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedConversation {
    pub conversation: Conversation,
    /// Room the push connection uses for this conversation.
    pub room_id: String,
}

enum Command {
    Refresh,
    Select {
        id: ConversationId,
        reply: oneshot::Sender<SelectedConversation>,
    },
    PrepareSend {
        content: String,
        reply: oneshot::Sender<Result<OutboundEnvelope, ValidationError>>,
    },
    Conversations(oneshot::Sender<Vec<Conversation>>),
    Messages(ConversationId, oneshot::Sender<Vec<Message>>),
    TypingIndicators(oneshot::Sender<HashMap<UserId, Instant>>),
    Users(oneshot::Sender<Vec<User>>),
    Search(String, oneshot::Sender<Vec<Conversation>>),
    Shutdown(oneshot::Sender<()>),
}

pub struct Session {
    self_id: UserId,
    commands: mpsc::Sender<Command>,
    dispatcher: Arc<EventDispatcher>,
    ingestor: Arc<SnapshotIngestor>,
    event_bus: CoreEventBus,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    pub fn self_id(&self) -> UserId {
        self.self_id
    }

    /// Handlers added here see events from the next one dispatched on.
    pub fn event_bus(&self) -> &CoreEventBus {
        &self.event_bus
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.dispatcher.state()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)
    }

    /// All conversations, most recently active first.
    pub async fn conversations(&self) -> Result<Vec<Conversation>, SessionError> {
        self.request(Command::Conversations).await
    }

    pub async fn messages(&self, id: &ConversationId) -> Result<Vec<Message>, SessionError> {
        let id = id.clone();
        self.request(|reply| Command::Messages(id, reply)).await
    }

    /// Peers currently typing, with the instant their indicator lapses.
    pub async fn typing_indicators(&self) -> Result<HashMap<UserId, Instant>, SessionError> {
        self.request(Command::TypingIndicators).await
    }

    pub async fn users(&self) -> Result<Vec<User>, SessionError> {
        self.request(Command::Users).await
    }

    pub async fn search(&self, query: &str) -> Result<Vec<Conversation>, SessionError> {
        let query = query.to_string();
        self.request(|reply| Command::Search(query, reply)).await
    }

    /// Makes `id` the open conversation, creating it if needed, and clears
    /// its unread count.
    pub async fn select_conversation(
        &self,
        id: ConversationId,
    ) -> Result<SelectedConversation, SessionError> {
        self.request(|reply| Command::Select { id, reply }).await
    }

    /// Sends `content` to the open conversation. The message shows up in the
    /// store when the server echoes it back.
    pub async fn send_message(&self, content: &str) -> Result<(), SessionError> {
        if content.trim().is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }
        let content = content.to_string();
        let envelope = self
            .request(|reply| Command::PrepareSend { content, reply })
            .await??;
        self.dispatcher.send(&envelope).await?;
        Ok(())
    }

    pub async fn notify_typing(&self) -> Result<(), SessionError> {
        let envelope = OutboundEnvelope::TypingIndicator {
            sender_id: self.self_id,
        };
        self.dispatcher.send(&envelope).await?;
        Ok(())
    }

    /// Re-fetches the snapshot. A fetch already in flight absorbs the call.
    pub async fn retry(&self) -> Result<(), SessionError> {
        self.commands
            .send(Command::Refresh)
            .await
            .map_err(|_| SessionError::Closed)
    }

    pub async fn send_friendship_request(&self, to: UserId) -> Result<String, SessionError> {
        Ok(self.ingestor.send_friendship_request(to).await?)
    }

    /// Stops typing timers and closes the connection. No events are
    /// dispatched once this returns. Calling it again is a no-op.
    pub async fn close(&self) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Shutdown(reply)).await.is_ok() {
            let _ = done.await;
        }
        let worker = self
            .worker
            .lock()
            .expect("mutex should not be poisoned")
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(target: "Session", "Session worker ended abnormally: {e}");
            }
        }
        self.dispatcher.close().await;
    }
}

#[derive(Default)]
pub struct SessionBuilder {
    config: SessionConfig,
    transport_factory: Option<Arc<dyn TransportFactory>>,
    http_client: Option<Arc<dyn HttpClient>>,
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl SessionBuilder {
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_transport_factory<F>(mut self, factory: F) -> Self
    where
        F: TransportFactory + 'static,
    {
        self.transport_factory = Some(Arc::new(factory));
        self
    }

    pub fn with_http_client<C>(mut self, client: C) -> Self
    where
        C: HttpClient + 'static,
    {
        self.http_client = Some(Arc::new(client));
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn on_event<F>(self, handler: F) -> Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.with_event_handler(Arc::new(handler))
    }

    /// Starts the session: dials the push connection and fetches the
    /// snapshot in the background.
    pub async fn open(self, credentials: Credentials) -> Result<Arc<Session>, SessionError> {
        let config = self.config;
        let transport_factory = self
            .transport_factory
            .unwrap_or_else(|| Arc::new(TokioWebSocketTransportFactory::new()));
        let http_client = self
            .http_client
            .unwrap_or_else(|| Arc::new(UreqHttpClient::new()));

        let event_bus = CoreEventBus::new();
        for handler in self.handlers {
            event_bus.add_handler(handler);
        }

        let self_id = credentials.user_id;
        let dispatcher = Arc::new(EventDispatcher::new(
            transport_factory,
            config.push_url(&credentials.token),
            config.reconnect.clone(),
        ));
        let ingestor = Arc::new(SnapshotIngestor::new(
            http_client,
            config.api_base_url.clone(),
            credentials,
        ));

        let buffer = config.command_buffer.max(1);
        let (commands_tx, commands_rx) = mpsc::channel(buffer);
        let (dispatcher_tx, dispatcher_rx) = mpsc::channel(buffer);
        let (snapshot_tx, snapshot_rx) = mpsc::channel(1);
        let (typing, expired_rx) = TypingRegistry::new(config.typing_timeout);

        let worker = SessionWorker {
            self_id,
            store: ConversationStore::new(self_id),
            typing,
            event_bus: event_bus.clone(),
            dispatcher: dispatcher.clone(),
            ingestor: ingestor.clone(),
            snapshot_tx,
            fetch_in_flight: false,
            has_been_open: false,
        };
        let worker = tokio::spawn(worker.run(commands_rx, dispatcher_rx, expired_rx, snapshot_rx));
        tokio::spawn(dispatcher.clone().run(dispatcher_tx));

        commands_tx
            .send(Command::Refresh)
            .await
            .map_err(|_| SessionError::Closed)?;
        info!(target: "Session", "Session opened for {self_id}");

        Ok(Arc::new(Session {
            self_id,
            commands: commands_tx,
            dispatcher,
            ingestor,
            event_bus,
            worker: Mutex::new(Some(worker)),
        }))
    }
}

struct SessionWorker {
    self_id: UserId,
    store: ConversationStore,
    typing: TypingRegistry,
    event_bus: CoreEventBus,
    dispatcher: Arc<EventDispatcher>,
    ingestor: Arc<SnapshotIngestor>,
    snapshot_tx: mpsc::Sender<Result<Snapshot, FetchError>>,
    fetch_in_flight: bool,
    has_been_open: bool,
}

impl SessionWorker {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut dispatcher_events: mpsc::Receiver<DispatcherEvent>,
        mut typing_expired: mpsc::UnboundedReceiver<TypingExpired>,
        mut snapshots: mpsc::Receiver<Result<Snapshot, FetchError>>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown(reply)) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        return;
                    }
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = dispatcher_events.recv() => self.handle_dispatcher_event(event),
                Some(expired) = typing_expired.recv() => self.handle_typing_expired(expired),
                Some(result) = snapshots.recv() => self.handle_snapshot(result),
            }
        }
        debug!(target: "Session", "Session handle dropped, shutting down worker");
        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        self.typing.cancel_all();
        self.dispatcher.close().await;
        info!(target: "Session", "Session closed");
    }

    fn emit(&self, event: Event) {
        self.event_bus.dispatch(&event);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Refresh => self.refresh(),
            Command::Select { id, reply } => {
                let conversation = self.store.select(id.clone()).clone();
                let room_id = self.store.room_id_for(&id);
                debug!(target: "Session", "Opened {id} (room {room_id})");
                self.emit(Event::ConversationUpdated(id));
                let _ = reply.send(SelectedConversation {
                    conversation,
                    room_id,
                });
            }
            Command::PrepareSend { content, reply } => {
                let envelope = match self.store.active() {
                    Some(id) => Ok(OutboundEnvelope::ChatMessage {
                        content,
                        room_id: Some(self.store.room_id_for(id)),
                    }),
                    None => Err(ValidationError::NoActiveConversation),
                };
                let _ = reply.send(envelope);
            }
            Command::Conversations(reply) => {
                let _ = reply.send(self.store.get());
            }
            Command::Messages(id, reply) => {
                let _ = reply.send(self.store.messages(&id));
            }
            Command::TypingIndicators(reply) => {
                let _ = reply.send(self.typing.indicators());
            }
            Command::Users(reply) => {
                let _ = reply.send(self.store.users());
            }
            Command::Search(query, reply) => {
                let _ = reply.send(self.store.search(&query));
            }
            // Handled in `run`, which needs to stop the loop.
            Command::Shutdown(reply) => {
                let _ = reply.send(());
            }
        }
    }

    fn refresh(&mut self) {
        if self.fetch_in_flight {
            debug!(target: "Snapshot", "Snapshot fetch already in flight");
            return;
        }
        self.fetch_in_flight = true;
        let ingestor = self.ingestor.clone();
        let results = self.snapshot_tx.clone();
        tokio::spawn(async move {
            let result = ingestor.fetch().await;
            let _ = results.send(result).await;
        });
    }

    fn handle_snapshot(&mut self, result: Result<Snapshot, FetchError>) {
        self.fetch_in_flight = false;
        match result {
            Ok(snapshot) => {
                let summary = self.store.ingest_snapshot(snapshot);
                info!(
                    target: "Snapshot",
                    "Loaded {} conversations ({} new), {} users",
                    summary.created + summary.updated,
                    summary.created,
                    summary.users
                );
                self.emit(Event::SnapshotLoaded {
                    created: summary.created,
                    updated: summary.updated,
                    users: summary.users,
                });
            }
            Err(e) => {
                warn!(target: "Snapshot", "Keeping previous state: {e}");
                self.emit(Event::SnapshotFailed(e.to_string()));
            }
        }
    }

    fn handle_dispatcher_event(&mut self, event: DispatcherEvent) {
        match event {
            DispatcherEvent::StateChanged(state) => {
                if state.is_open() {
                    // Catch up on whatever arrived while we were away.
                    if self.has_been_open {
                        self.refresh();
                    }
                    self.has_been_open = true;
                }
                self.emit(Event::ConnectionStateChanged(state));
            }
            DispatcherEvent::Inbound(event) => self.handle_inbound(event),
        }
    }

    fn handle_inbound(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::Message(incoming) => {
                let delivered = self.apply_message(&incoming, false).is_some();
                let sender = incoming.message.sender_id;
                if sender != self.self_id {
                    // Redeliveries are confirmed again; the first confirmation
                    // may have been lost with the old connection.
                    if delivered {
                        self.send_in_background(OutboundEnvelope::ReadReceiptConfirmation {
                            message_id: incoming.message.id.clone(),
                        });
                    }
                    self.stop_typing(sender);
                }
            }
            InboundEvent::NewMessageNotification(incoming) => {
                let Some(ApplyOutcome::Applied { conversation, .. }) =
                    self.apply_message(&incoming, true)
                else {
                    return;
                };
                if incoming.message.is_from(&self.self_id) || self.store.is_active(&conversation) {
                    return;
                }
                let name = incoming
                    .sender_first_name
                    .clone()
                    .filter(|name| !name.is_empty())
                    .or_else(|| {
                        self.store
                            .conversation(&conversation)
                            .map(|c| c.display_name.clone())
                    })
                    .unwrap_or_else(|| incoming.message.sender_id.to_string());
                self.emit(Event::Notification(Notification {
                    conversation: Some(conversation),
                    text: format!("New message from {name}"),
                }));
            }
            InboundEvent::TypingIndicator { sender_id } => {
                if sender_id == self.self_id {
                    return;
                }
                let started = self.typing.set_typing(sender_id);
                self.store.set_typing(sender_id, true);
                if started {
                    self.emit(Event::TypingChanged {
                        peer: sender_id,
                        typing: true,
                    });
                }
            }
            InboundEvent::MessageReceived { message_id } => {
                match self.store.mark_receipt(&message_id) {
                    Some(conversation) => self.emit(Event::ReceiptUpdated {
                        conversation,
                        message_id,
                    }),
                    None => debug!(target: "Session/Recv", "Receipt for unknown or read message {message_id}"),
                }
            }
            InboundEvent::StatusNotify {
                user_id,
                online,
                first_name,
            } => {
                self.store.set_status(user_id, online);
                debug!(
                    target: "Session/Recv",
                    "{} is {}",
                    first_name.unwrap_or_else(|| user_id.to_string()),
                    if online { "online" } else { "offline" }
                );
                self.emit(Event::PresenceChanged {
                    user: user_id,
                    online,
                });
            }
        }
    }

    /// Returns `None` for rejected messages.
    fn apply_message(
        &mut self,
        incoming: &IncomingMessage,
        is_notification: bool,
    ) -> Option<ApplyOutcome> {
        match self.store.apply_message(incoming, is_notification) {
            Ok(ApplyOutcome::Applied {
                conversation,
                created,
            }) => {
                if created {
                    self.emit(Event::ConversationCreated(conversation.clone()));
                }
                self.emit(Event::ConversationUpdated(conversation.clone()));
                Some(ApplyOutcome::Applied {
                    conversation,
                    created,
                })
            }
            Ok(ApplyOutcome::Duplicate) => {
                debug!(target: "Session/Recv", "Ignoring duplicate message {}", incoming.message.id);
                Some(ApplyOutcome::Duplicate)
            }
            Err(e) => {
                warn!(target: "Session/Recv", "Dropping message {}: {e}", incoming.message.id);
                None
            }
        }
    }

    fn stop_typing(&mut self, peer: UserId) {
        if self.typing.clear(&peer) {
            self.store.set_typing(peer, false);
            self.emit(Event::TypingChanged {
                peer,
                typing: false,
            });
        }
    }

    fn handle_typing_expired(&mut self, expired: TypingExpired) {
        if self.typing.expire(expired) {
            self.store.set_typing(expired.peer, false);
            self.emit(Event::TypingChanged {
                peer: expired.peer,
                typing: false,
            });
        }
    }

    fn send_in_background(&self, envelope: OutboundEnvelope) {
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            if let Err(e) = dispatcher.send(&envelope).await {
                warn!(target: "Session/Send", "Failed to send {}: {e}", envelope.type_name());
            }
        });
    }
}
