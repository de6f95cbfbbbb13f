//! JSON envelopes exchanged over the push connection.
//!
//! Inbound envelopes are `{ "type": ..., ...fields }`. The backend nests the
//! fields under a `message` object; envelopes that carry them at the top
//! level are accepted too.

use crate::error::MalformedEventError;
use crate::types::message::{Message, id_string, optional_id_string};
use crate::types::{ConversationId, UserId};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CHAT_MESSAGE: &str = "chat_message";
pub const MESSAGE: &str = "message";
pub const TYPING_INDICATOR: &str = "typing_indicator";
pub const MESSAGE_RECEIVED: &str = "message_received";
pub const NEW_MESSAGE_NOTIFICATION: &str = "new_message_notification";
pub const STATUS_NOTIFY: &str = "status_notify";
pub const READ_RECEIPT_CONFIRMATION: &str = "read_receipt_confirmation";

/// A message as delivered by a push event, plus the sender details the
/// backend attaches so an unknown conversation can be named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub message: Message,
    /// Set for messages posted to a group room.
    pub room_id: Option<String>,
    pub sender_first_name: Option<String>,
    pub sender_photo: Option<String>,
}

impl IncomingMessage {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            room_id: None,
            sender_first_name: None,
            sender_photo: None,
        }
    }

    /// The conversation this message belongs to, seen from `self_id`.
    ///
    /// Direct messages belong to the other party (the sender if we received
    /// it, the receiver if we sent it), even when they also carry the derived
    /// 1:1 room id. Only messages without a receiver belong to their room.
    pub fn conversation_id(&self, self_id: &UserId) -> Result<ConversationId, MalformedEventError> {
        let msg = &self.message;
        match (msg.receiver_id, &self.room_id) {
            (Some(receiver), _) if receiver == *self_id => Ok(ConversationId::User(msg.sender_id)),
            (Some(receiver), _) => Ok(ConversationId::User(receiver)),
            (None, Some(room)) => Ok(ConversationId::Room(room.clone())),
            (None, None) if msg.sender_id != *self_id => Ok(ConversationId::User(msg.sender_id)),
            (None, None) => Err(MalformedEventError::MissingField("receiver_id")),
        }
    }
}

/// A validated inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Message(IncomingMessage),
    TypingIndicator { sender_id: UserId },
    MessageReceived { message_id: String },
    NewMessageNotification(IncomingMessage),
    StatusNotify {
        user_id: UserId,
        online: bool,
        first_name: Option<String>,
    },
}

impl InboundEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            InboundEvent::Message(_) => MESSAGE,
            InboundEvent::TypingIndicator { .. } => TYPING_INDICATOR,
            InboundEvent::MessageReceived { .. } => MESSAGE_RECEIVED,
            InboundEvent::NewMessageNotification(_) => NEW_MESSAGE_NOTIFICATION,
            InboundEvent::StatusNotify { .. } => STATUS_NOTIFY,
        }
    }
}

#[derive(Deserialize)]
struct MessageFields {
    #[serde(deserialize_with = "id_string")]
    id: String,
    sender_id: UserId,
    #[serde(default)]
    receiver_id: Option<UserId>,
    #[serde(default, deserialize_with = "optional_id_string")]
    room_id: Option<String>,
    content: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    read_receipt: bool,
    #[serde(default)]
    sender_first_name: Option<String>,
    #[serde(default)]
    photo: Option<String>,
}

impl From<MessageFields> for IncomingMessage {
    fn from(f: MessageFields) -> Self {
        IncomingMessage {
            message: Message {
                id: f.id,
                sender_id: f.sender_id,
                receiver_id: f.receiver_id,
                content: f.content,
                timestamp: f.timestamp,
                read_receipt: f.read_receipt,
            },
            room_id: f.room_id,
            sender_first_name: f.sender_first_name,
            sender_photo: f.photo,
        }
    }
}

#[derive(Deserialize)]
struct TypingFields {
    sender_id: UserId,
}

#[derive(Deserialize)]
struct ReceiptFields {
    #[serde(deserialize_with = "id_string")]
    message_id: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StatusValue {
    Flag(bool),
    Text(String),
}

#[derive(Deserialize)]
struct StatusFields {
    #[serde(alias = "user_id")]
    sender_id: UserId,
    status: StatusValue,
    #[serde(default, alias = "first_name")]
    user_first_name: Option<String>,
}

fn parse_status(value: StatusValue) -> Result<bool, MalformedEventError> {
    match value {
        StatusValue::Flag(online) => Ok(online),
        StatusValue::Text(text) => match text.to_ascii_lowercase().as_str() {
            "online" | "true" | "active" => Ok(true),
            "offline" | "false" | "away" | "inactive" => Ok(false),
            _ => Err(MalformedEventError::InvalidField {
                field: "status",
                reason: format!("unknown status `{text}`"),
            }),
        },
    }
}

fn fields<T: DeserializeOwned>(
    event_type: &'static str,
    payload: Value,
) -> Result<T, MalformedEventError> {
    serde_json::from_value(payload)
        .map_err(|source| MalformedEventError::InvalidPayload { event_type, source })
}

fn incoming(event_type: &'static str, payload: Value) -> Result<IncomingMessage, MalformedEventError> {
    let msg: IncomingMessage = fields::<MessageFields>(event_type, payload)?.into();
    if msg.message.id.trim().is_empty() {
        return Err(MalformedEventError::InvalidField {
            field: "id",
            reason: "message id is empty".to_string(),
        });
    }
    Ok(msg)
}

/// Parses and validates one inbound text frame.
pub fn decode_inbound(text: &str) -> Result<InboundEvent, MalformedEventError> {
    let value: Value = serde_json::from_str(text).map_err(MalformedEventError::InvalidJson)?;
    let Value::Object(mut envelope) = value else {
        return Err(MalformedEventError::NotAnObject);
    };
    let event_type = match envelope.get("type") {
        Some(Value::String(t)) => t.clone(),
        Some(_) => {
            return Err(MalformedEventError::InvalidField {
                field: "type",
                reason: "expected a string".to_string(),
            });
        }
        None => return Err(MalformedEventError::MissingField("type")),
    };

    let payload = match envelope.remove("message") {
        Some(nested @ Value::Object(_)) => nested,
        Some(other) => {
            envelope.insert("message".to_string(), other);
            Value::Object(envelope)
        }
        None => Value::Object(envelope),
    };

    match event_type.as_str() {
        MESSAGE => Ok(InboundEvent::Message(incoming(MESSAGE, payload)?)),
        NEW_MESSAGE_NOTIFICATION => Ok(InboundEvent::NewMessageNotification(incoming(
            NEW_MESSAGE_NOTIFICATION,
            payload,
        )?)),
        TYPING_INDICATOR => {
            let f: TypingFields = fields(TYPING_INDICATOR, payload)?;
            Ok(InboundEvent::TypingIndicator {
                sender_id: f.sender_id,
            })
        }
        MESSAGE_RECEIVED => {
            let f: ReceiptFields = fields(MESSAGE_RECEIVED, payload)?;
            if f.message_id.trim().is_empty() {
                return Err(MalformedEventError::InvalidField {
                    field: "message_id",
                    reason: "message id is empty".to_string(),
                });
            }
            Ok(InboundEvent::MessageReceived {
                message_id: f.message_id,
            })
        }
        STATUS_NOTIFY => {
            let f: StatusFields = fields(STATUS_NOTIFY, payload)?;
            Ok(InboundEvent::StatusNotify {
                user_id: f.sender_id,
                online: parse_status(f.status)?,
                first_name: f.user_first_name,
            })
        }
        _ => Err(MalformedEventError::UnknownType(event_type)),
    }
}

/// Envelopes this client writes to the push connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEnvelope {
    ChatMessage {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        room_id: Option<String>,
    },
    TypingIndicator {
        sender_id: UserId,
    },
    ReadReceiptConfirmation {
        message_id: String,
    },
}

impl OutboundEnvelope {
    pub fn type_name(&self) -> &'static str {
        match self {
            OutboundEnvelope::ChatMessage { .. } => CHAT_MESSAGE,
            OutboundEnvelope::TypingIndicator { .. } => TYPING_INDICATOR,
            OutboundEnvelope::ReadReceiptConfirmation { .. } => READ_RECEIPT_CONFIRMATION,
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const ALICE: &str = "6f1c2b7e-2a4b-4f5e-9c1d-5e6f7a8b9c01";
    const BOB: &str = "6f1c2b7e-2a4b-4f5e-9c1d-5e6f7a8b9c02";

    fn alice() -> Uuid {
        Uuid::parse_str(ALICE).unwrap()
    }

    fn bob() -> Uuid {
        Uuid::parse_str(BOB).unwrap()
    }

    #[test]
    fn test_decode_nested_message() {
        let frame = format!(
            r#"{{"type":"message","message":{{"id":17,"sender_id":"{BOB}","receiver_id":"{ALICE}","content":"hey","timestamp":"2024-05-01T10:00:00Z","sender_first_name":"Bob"}}}}"#
        );
        let InboundEvent::Message(msg) = decode_inbound(&frame).unwrap() else {
            panic!("expected a message event");
        };
        assert_eq!(msg.message.id, "17");
        assert_eq!(msg.message.sender_id, bob());
        assert_eq!(msg.sender_first_name.as_deref(), Some("Bob"));
        assert_eq!(
            msg.conversation_id(&alice()).unwrap(),
            ConversationId::User(bob())
        );
    }

    #[test]
    fn test_decode_flat_envelope() {
        let frame = format!(r#"{{"type":"typing_indicator","sender_id":"{BOB}"}}"#);
        assert_eq!(
            decode_inbound(&frame).unwrap(),
            InboundEvent::TypingIndicator { sender_id: bob() }
        );
    }

    #[test]
    fn test_decode_receipt_and_status() {
        let receipt = r#"{"type":"message_received","message":{"message_id":"m-1"}}"#;
        assert_eq!(
            decode_inbound(receipt).unwrap(),
            InboundEvent::MessageReceived {
                message_id: "m-1".into()
            }
        );

        let status = format!(
            r#"{{"type":"status_notify","message":{{"sender_id":"{BOB}","status":"Offline","user_first_name":"Bob"}}}}"#
        );
        assert_eq!(
            decode_inbound(&status).unwrap(),
            InboundEvent::StatusNotify {
                user_id: bob(),
                online: false,
                first_name: Some("Bob".into()),
            }
        );

        let flag = format!(r#"{{"type":"status_notify","user_id":"{BOB}","status":true}}"#);
        assert!(matches!(
            decode_inbound(&flag).unwrap(),
            InboundEvent::StatusNotify { online: true, .. }
        ));
    }

    #[test]
    fn test_decode_group_notification() {
        let frame = format!(
            r#"{{"type":"new_message_notification","message":{{"id":"g1","sender_id":"{BOB}","room_id":12,"content":"all hands","timestamp":"2024-05-01T10:00:00+02:00"}}}}"#
        );
        let InboundEvent::NewMessageNotification(msg) = decode_inbound(&frame).unwrap() else {
            panic!("expected a notification");
        };
        assert_eq!(
            msg.conversation_id(&alice()).unwrap(),
            ConversationId::Room("12".into())
        );
    }

    #[test]
    fn test_decode_rejects_malformed_frames() {
        assert!(matches!(
            decode_inbound("not json"),
            Err(MalformedEventError::InvalidJson(_))
        ));
        assert!(matches!(
            decode_inbound("[1,2]"),
            Err(MalformedEventError::NotAnObject)
        ));
        assert!(matches!(
            decode_inbound(r#"{"message":{}}"#),
            Err(MalformedEventError::MissingField("type"))
        ));
        assert!(matches!(
            decode_inbound(r#"{"type":"reaction"}"#),
            Err(MalformedEventError::UnknownType(t)) if t == "reaction"
        ));
        assert!(matches!(
            decode_inbound(r#"{"type":"chat_message","content":"x"}"#),
            Err(MalformedEventError::UnknownType(_))
        ));
        assert!(matches!(
            decode_inbound(r#"{"type":"typing_indicator","message":{}}"#),
            Err(MalformedEventError::InvalidPayload { event_type: "typing_indicator", .. })
        ));
        let empty_id = format!(
            r#"{{"type":"message","id":"","sender_id":"{BOB}","content":"x","timestamp":"2024-05-01T10:00:00Z"}}"#
        );
        assert!(matches!(
            decode_inbound(&empty_id),
            Err(MalformedEventError::InvalidField { field: "id", .. })
        ));
        let bad_status = format!(r#"{{"type":"status_notify","sender_id":"{BOB}","status":"busy"}}"#);
        assert!(matches!(
            decode_inbound(&bad_status),
            Err(MalformedEventError::InvalidField { field: "status", .. })
        ));
    }

    #[test]
    fn test_conversation_id_for_outgoing_message() {
        let mut msg = IncomingMessage::new(Message {
            id: "1".into(),
            sender_id: alice(),
            receiver_id: Some(bob()),
            content: "hi".into(),
            timestamp: Utc::now(),
            read_receipt: false,
        });
        assert_eq!(
            msg.conversation_id(&alice()).unwrap(),
            ConversationId::User(bob())
        );

        msg.message.receiver_id = None;
        assert!(matches!(
            msg.conversation_id(&alice()),
            Err(MalformedEventError::MissingField("receiver_id"))
        ));
    }

    #[test]
    fn test_direct_message_with_room_id_belongs_to_peer() {
        let room = crate::room_id::derive_room_id(&alice(), &bob()).to_string();
        let mut msg = IncomingMessage::new(Message {
            id: "1".into(),
            sender_id: bob(),
            receiver_id: Some(alice()),
            content: "hi".into(),
            timestamp: Utc::now(),
            read_receipt: false,
        });
        msg.room_id = Some(room.clone());
        assert_eq!(
            msg.conversation_id(&alice()).unwrap(),
            ConversationId::User(bob())
        );

        msg.message.receiver_id = None;
        assert_eq!(
            msg.conversation_id(&alice()).unwrap(),
            ConversationId::Room(room)
        );
    }

    #[test]
    fn test_encode_outbound() {
        let send = OutboundEnvelope::ChatMessage {
            content: "hello".into(),
            room_id: None,
        };
        assert_eq!(send.encode().unwrap(), r#"{"type":"chat_message","content":"hello"}"#);

        let typing = OutboundEnvelope::TypingIndicator { sender_id: alice() };
        assert_eq!(
            typing.encode().unwrap(),
            format!(r#"{{"type":"typing_indicator","sender_id":"{ALICE}"}}"#)
        );

        let receipt = OutboundEnvelope::ReadReceiptConfirmation {
            message_id: "m-1".into(),
        };
        assert_eq!(
            receipt.encode().unwrap(),
            r#"{"type":"read_receipt_confirmation","message_id":"m-1"}"#
        );
        assert_eq!(receipt.type_name(), READ_RECEIPT_CONFIRMATION);
    }
}
