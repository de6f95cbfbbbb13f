use super::connection::ConnectionState;
use super::conversation::ConversationId;
use super::user::UserId;
use serde::Serialize;
use std::sync::{Arc, RwLock};

pub trait EventHandler: Send + Sync {
    fn handle_event(&self, event: &Event);
}

/// Closures are handlers too, which keeps tests and small embedders terse.
impl<F> EventHandler for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn handle_event(&self, event: &Event) {
        self(event)
    }
}

#[derive(Default, Clone)]
pub struct CoreEventBus {
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
}

impl CoreEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&self, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .expect("RwLock should not be poisoned")
            .push(handler);
    }

    /// Returns true if there are any event handlers registered.
    pub fn has_handlers(&self) -> bool {
        !self
            .handlers
            .read()
            .expect("RwLock should not be poisoned")
            .is_empty()
    }

    pub fn dispatch(&self, event: &Event) {
        for handler in self
            .handlers
            .read()
            .expect("RwLock should not be poisoned")
            .iter()
        {
            handler.handle_event(event);
        }
    }
}

/// Something the rendering layer should surface to the user, e.g. a toast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub conversation: Option<ConversationId>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Event {
    ConnectionStateChanged(ConnectionState),

    ConversationCreated(ConversationId),
    ConversationUpdated(ConversationId),
    ReceiptUpdated {
        conversation: ConversationId,
        message_id: String,
    },

    TypingChanged {
        peer: UserId,
        typing: bool,
    },
    PresenceChanged {
        user: UserId,
        online: bool,
    },
    Notification(Notification),

    SnapshotLoaded {
        created: usize,
        updated: usize,
        users: usize,
    },
    /// The snapshot could not be fetched; previous state is still shown and
    /// `Session::retry` may be called.
    SnapshotFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_bus_dispatches_to_every_handler_in_order() {
        let bus = CoreEventBus::new();
        assert!(!bus.has_handlers());

        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let seen = seen.clone();
            bus.add_handler(Arc::new(move |event: &Event| {
                seen.lock().unwrap().push((tag, event.clone()));
            }));
        }
        assert!(bus.has_handlers());

        bus.dispatch(&Event::ConnectionStateChanged(ConnectionState::Open));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "first");
        assert_eq!(seen[1].0, "second");
        assert_eq!(
            seen[0].1,
            Event::ConnectionStateChanged(ConnectionState::Open)
        );
    }
}
