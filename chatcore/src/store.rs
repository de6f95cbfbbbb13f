//! The in-memory conversation list and message history of one session.

use crate::error::MalformedEventError;
use crate::protocol::IncomingMessage;
use crate::room_id::derive_room_id;
use crate::types::{
    Conversation, ConversationId, Message, PartnerRecord, RoomRecord, Snapshot, User, UserId,
};
use indexmap::IndexMap;
use log::debug;
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotSummary {
    pub created: usize,
    pub updated: usize,
    pub users: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The message id was already stored; nothing changed.
    Duplicate,
    Applied {
        conversation: ConversationId,
        created: bool,
    },
}

#[derive(Debug, Clone)]
struct ConversationEntry {
    conversation: Conversation,
    /// Keyed by message id, in arrival order.
    messages: IndexMap<String, Message>,
}

impl ConversationEntry {
    fn new(conversation: Conversation) -> Self {
        Self {
            conversation,
            messages: IndexMap::new(),
        }
    }
}

pub struct ConversationStore {
    self_id: UserId,
    conversations: HashMap<ConversationId, ConversationEntry>,
    users: HashMap<UserId, User>,
    message_index: HashMap<String, ConversationId>,
    active: Option<ConversationId>,
}

impl ConversationStore {
    pub fn new(self_id: UserId) -> Self {
        Self {
            self_id,
            conversations: HashMap::new(),
            users: HashMap::new(),
            message_index: HashMap::new(),
            active: None,
        }
    }

    pub fn self_id(&self) -> UserId {
        self.self_id
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// All conversations, most recently active first.
    pub fn get(&self) -> Vec<Conversation> {
        let mut list: Vec<Conversation> = self
            .conversations
            .values()
            .map(|entry| entry.conversation.clone())
            .collect();
        list.sort_by(recency);
        list
    }

    pub fn conversation(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.get(id).map(|entry| &entry.conversation)
    }

    /// Message history of `id` in arrival order.
    pub fn messages(&self, id: &ConversationId) -> Vec<Message> {
        self.conversations
            .get(id)
            .map(|entry| entry.messages.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn user(&self, id: &UserId) -> Option<&User> {
        self.users.get(id)
    }

    /// The user directory without the session's own user, sorted by name.
    pub fn users(&self) -> Vec<User> {
        let mut users: Vec<User> = self
            .users
            .values()
            .filter(|u| u.id != self.self_id)
            .cloned()
            .collect();
        users.sort_by_key(|u| (u.display_name().to_lowercase(), u.id));
        users
    }

    /// Case-insensitive display-name filter over [`get`](Self::get).
    pub fn search(&self, query: &str) -> Vec<Conversation> {
        let needle = query.trim().to_lowercase();
        self.get()
            .into_iter()
            .filter(|c| c.display_name.to_lowercase().contains(&needle))
            .collect()
    }

    pub fn active(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    pub fn is_active(&self, id: &ConversationId) -> bool {
        self.active.as_ref() == Some(id)
    }

    /// The push-side room that carries messages for `id`.
    pub fn room_id_for(&self, id: &ConversationId) -> String {
        match id {
            ConversationId::User(peer) => derive_room_id(&self.self_id, peer).hyphenated().to_string(),
            ConversationId::Room(room) => room.clone(),
        }
    }

    pub fn ingest_snapshot(&mut self, snapshot: Snapshot) -> SnapshotSummary {
        let mut summary = SnapshotSummary {
            users: snapshot.users.len(),
            ..Default::default()
        };
        for user in snapshot.users {
            self.users.insert(user.id, user);
        }
        for partner in snapshot.partners {
            if self.upsert_partner(partner) {
                summary.created += 1;
            } else {
                summary.updated += 1;
            }
        }
        for room in snapshot.rooms {
            if self.upsert_room(room) {
                summary.created += 1;
            } else {
                summary.updated += 1;
            }
        }
        debug!(
            target: "Store",
            "Snapshot ingested: {} created, {} updated, {} users",
            summary.created, summary.updated, summary.users
        );
        summary
    }

    /// Returns true if the conversation was created.
    fn upsert_partner(&mut self, record: PartnerRecord) -> bool {
        let id = ConversationId::User(record.id);
        let name = if record.first_name.is_empty() {
            self.directory_name(&record.id)
        } else {
            record.first_name
        };
        let unread = if self.is_active(&id) {
            Some(0)
        } else {
            record.unread_count
        };

        let created = !self.conversations.contains_key(&id);
        let online = match record.is_online {
            Some(online) => Some(online),
            None if created => Some(self.users.get(&record.id).is_some_and(|u| u.is_online)),
            None => None,
        };
        let entry = self
            .conversations
            .entry(id.clone())
            .or_insert_with(|| ConversationEntry::new(Conversation::new(id.clone(), name.clone())));
        let conversation = &mut entry.conversation;
        conversation.display_name = name;
        if record.photo.is_some() {
            conversation.photo = record.photo;
        }
        // Fields the record leaves out keep their live value.
        if let Some(online) = online {
            conversation.is_online = online;
        }
        if let Some(unread) = unread {
            conversation.unread_count = unread;
        }
        if let Some(last) = record.last_message {
            self.index_snapshot_message(&id, last);
        }
        created
    }

    fn upsert_room(&mut self, record: RoomRecord) -> bool {
        let id = ConversationId::Room(record.id.clone());
        let name = if record.name.is_empty() {
            record.id
        } else {
            record.name
        };
        let unread = if self.is_active(&id) {
            Some(0)
        } else {
            record.unread_count
        };

        let created = !self.conversations.contains_key(&id);
        let entry = self
            .conversations
            .entry(id.clone())
            .or_insert_with(|| ConversationEntry::new(Conversation::new(id.clone(), name.clone())));
        let conversation = &mut entry.conversation;
        conversation.display_name = name;
        if record.photo.is_some() {
            conversation.photo = record.photo;
        }
        if let Some(unread) = unread {
            conversation.unread_count = unread;
        }
        if let Some(last) = record.last_message {
            self.index_snapshot_message(&id, last);
        }
        created
    }

    fn index_snapshot_message(&mut self, id: &ConversationId, message: Message) {
        let Some(entry) = self.conversations.get_mut(id) else {
            return;
        };
        entry.conversation.offer_last_message(&message);
        if !self.message_index.contains_key(&message.id) {
            self.message_index.insert(message.id.clone(), id.clone());
            entry.messages.insert(message.id.clone(), message);
        }
    }

    /// Stores a pushed message. Applying the same message id twice is a no-op.
    pub fn apply_message(
        &mut self,
        incoming: &IncomingMessage,
        is_notification: bool,
    ) -> Result<ApplyOutcome, MalformedEventError> {
        let message = &incoming.message;
        if message.id.trim().is_empty() {
            return Err(MalformedEventError::InvalidField {
                field: "id",
                reason: "message id is empty".to_string(),
            });
        }
        let id = incoming.conversation_id(&self.self_id)?;
        if self.message_index.contains_key(&message.id) {
            return Ok(ApplyOutcome::Duplicate);
        }

        let created = !self.conversations.contains_key(&id);
        if created {
            let conversation = self.new_conversation_for(&id, incoming);
            self.conversations
                .insert(id.clone(), ConversationEntry::new(conversation));
        }

        let counts_as_unread =
            is_notification && !self.is_active(&id) && !message.is_from(&self.self_id);
        if let Some(entry) = self.conversations.get_mut(&id) {
            entry.messages.insert(message.id.clone(), message.clone());
            entry.conversation.offer_last_message(message);
            if counts_as_unread {
                entry.conversation.unread_count += 1;
            }
        }
        self.message_index.insert(message.id.clone(), id.clone());

        Ok(ApplyOutcome::Applied {
            conversation: id,
            created,
        })
    }

    fn new_conversation_for(&self, id: &ConversationId, incoming: &IncomingMessage) -> Conversation {
        match id {
            ConversationId::User(peer) => {
                let directory = self.users.get(peer);
                let from_peer = incoming.message.sender_id == *peer;
                let hinted_name = incoming
                    .sender_first_name
                    .clone()
                    .filter(|name| from_peer && !name.is_empty());
                let name = hinted_name.unwrap_or_else(|| self.directory_name(peer));
                let mut conversation = Conversation::new(id.clone(), name);
                conversation.photo = incoming
                    .sender_photo
                    .clone()
                    .filter(|_| from_peer)
                    .or_else(|| directory.and_then(|u| u.photo.clone()));
                conversation.is_online = directory.is_some_and(|u| u.is_online);
                conversation
            }
            ConversationId::Room(room) => Conversation::new(id.clone(), room.clone()),
        }
    }

    fn directory_name(&self, id: &UserId) -> String {
        self.users
            .get(id)
            .map(User::display_name)
            .unwrap_or_else(|| id.to_string())
    }

    /// Marks a message as read by its recipient. Returns the owning
    /// conversation when the flag actually changed.
    pub fn mark_receipt(&mut self, message_id: &str) -> Option<ConversationId> {
        let id = self.message_index.get(message_id)?.clone();
        let entry = self.conversations.get_mut(&id)?;
        let message = entry.messages.get_mut(message_id)?;
        if message.read_receipt {
            return None;
        }
        message.read_receipt = true;
        if let Some(last) = entry.conversation.last_message.as_mut() {
            if last.id == message_id {
                last.read_receipt = true;
            }
        }
        Some(id)
    }

    /// Returns whether the count was non-zero.
    pub fn clear_unread(&mut self, id: &ConversationId) -> bool {
        match self.conversations.get_mut(id) {
            Some(entry) => std::mem::take(&mut entry.conversation.unread_count) > 0,
            None => false,
        }
    }

    pub fn set_status(&mut self, user: UserId, online: bool) -> Option<ConversationId> {
        if let Some(entry) = self.users.get_mut(&user) {
            entry.is_online = online;
        }
        let id = ConversationId::User(user);
        let entry = self.conversations.get_mut(&id)?;
        entry.conversation.is_online = online;
        Some(id)
    }

    /// Sets the typing flag shown on `peer`'s conversation. Returns whether
    /// it changed.
    pub fn set_typing(&mut self, peer: UserId, typing: bool) -> bool {
        match self.conversations.get_mut(&ConversationId::User(peer)) {
            Some(entry) if entry.conversation.typing != typing => {
                entry.conversation.typing = typing;
                true
            }
            _ => false,
        }
    }

    /// Opens `id`, creating it from the directory if it is not listed yet.
    pub fn select(&mut self, id: ConversationId) -> &Conversation {
        if !self.conversations.contains_key(&id) {
            let conversation = match &id {
                ConversationId::User(peer) => {
                    let mut conversation = Conversation::new(id.clone(), self.directory_name(peer));
                    if let Some(user) = self.users.get(peer) {
                        conversation.photo = user.photo.clone();
                        conversation.is_online = user.is_online;
                    }
                    conversation
                }
                ConversationId::Room(room) => Conversation::new(id.clone(), room.clone()),
            };
            self.conversations
                .insert(id.clone(), ConversationEntry::new(conversation));
        }
        self.active = Some(id.clone());
        let entry = self
            .conversations
            .entry(id)
            .or_insert_with_key(|id| ConversationEntry::new(Conversation::new(id.clone(), "")));
        entry.conversation.unread_count = 0;
        &entry.conversation
    }
}

fn recency(a: &Conversation, b: &Conversation) -> Ordering {
    let a_ts = a.last_message.as_ref().map(|m| m.timestamp);
    let b_ts = b.last_message.as_ref().map(|m| m.timestamp);
    b_ts.cmp(&a_ts)
        .then_with(|| a.display_name.to_lowercase().cmp(&b.display_name.to_lowercase()))
        .then_with(|| a.id.cmp(&b.id))
}
