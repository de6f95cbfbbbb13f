use super::message::Message;
use super::user::UserId;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConversationKind {
    Individual,
    Group,
}

/// Key of a conversation.
///
/// One-to-one chats are keyed by the peer's user id, group rooms by the
/// server-assigned room id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum ConversationId {
    User(UserId),
    Room(String),
}

impl ConversationId {
    pub fn kind(&self) -> ConversationKind {
        match self {
            ConversationId::User(_) => ConversationKind::Individual,
            ConversationId::Room(_) => ConversationKind::Group,
        }
    }

    pub fn peer(&self) -> Option<UserId> {
        match self {
            ConversationId::User(id) => Some(*id),
            ConversationId::Room(_) => None,
        }
    }

    /// Interprets a UI-supplied identifier: anything that parses as a UUID
    /// names a peer, everything else names a room.
    pub fn parse(raw: &str) -> Self {
        match Uuid::parse_str(raw.trim()) {
            Ok(id) => ConversationId::User(id),
            Err(_) => ConversationId::Room(raw.trim().to_string()),
        }
    }
}

impl From<UserId> for ConversationId {
    fn from(id: UserId) -> Self {
        ConversationId::User(id)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationId::User(id) => write!(f, "{id}"),
            ConversationId::Room(id) => write!(f, "room:{id}"),
        }
    }
}

/// A direct chat or group room as shown in the conversation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub kind: ConversationKind,
    pub display_name: String,
    pub photo: Option<String>,
    pub is_online: bool,
    pub last_message: Option<Message>,
    pub unread_count: u32,
    pub typing: bool,
}

impl Conversation {
    pub fn new(id: ConversationId, display_name: impl Into<String>) -> Self {
        Self {
            kind: id.kind(),
            id,
            display_name: display_name.into(),
            photo: None,
            is_online: false,
            last_message: None,
            unread_count: 0,
            typing: false,
        }
    }

    /// Replaces `last_message` unless `candidate` is older than the current
    /// one. Returns whether it was replaced.
    pub(crate) fn offer_last_message(&mut self, candidate: &Message) -> bool {
        let newer = match &self.last_message {
            Some(current) => candidate.timestamp >= current.timestamp,
            None => true,
        };
        if newer {
            self.last_message = Some(candidate.clone());
        }
        newer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_conversation_id() {
        let peer = Uuid::new_v4();
        assert_eq!(
            ConversationId::parse(&peer.to_string()),
            ConversationId::User(peer)
        );
        assert_eq!(
            ConversationId::parse(" general "),
            ConversationId::Room("general".to_string())
        );
        assert_eq!(ConversationId::Room("7".into()).kind(), ConversationKind::Group);
        assert_eq!(ConversationId::User(peer).peer(), Some(peer));
    }
}
