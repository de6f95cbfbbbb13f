use super::user::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A chat message.
///
/// Identity is `id`. Everything except `read_receipt` is immutable once
/// stored; `read_receipt` goes from `false` to `true` at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub sender_id: UserId,
    #[serde(default)]
    pub receiver_id: Option<UserId>,
    #[serde(default)]
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read_receipt: bool,
}

impl Message {
    pub fn is_from(&self, user: &UserId) -> bool {
        self.sender_id == *user
    }
}

/// Identifiers arrive as JSON strings from some endpoints and as integer
/// primary keys from others.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

pub(crate) fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(RawId::deserialize(deserializer)?.into())
}

pub(crate) fn optional_id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawId>::deserialize(deserializer)?.map(Into::into))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_numeric_and_string_ids_normalise() {
        let sender = Uuid::new_v4();
        let numeric = format!(
            r#"{{"id": 42, "sender_id": "{sender}", "content": "hi", "timestamp": "2024-05-01T10:00:00Z"}}"#
        );
        let textual = format!(
            r#"{{"id": "42", "sender_id": "{sender}", "content": "hi", "timestamp": "2024-05-01T10:00:00Z"}}"#
        );
        let a: Message = serde_json::from_str(&numeric).unwrap();
        let b: Message = serde_json::from_str(&textual).unwrap();
        assert_eq!(a.id, "42");
        assert_eq!(a, b);
        assert!(!a.read_receipt);
        assert_eq!(a.receiver_id, None);
    }
}
