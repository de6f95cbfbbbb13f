use super::message::{Message, id_string};
use super::user::{User, UserId};
use serde::Deserialize;

/// A one-to-one conversation as listed by the conversations endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PartnerRecord {
    pub id: UserId,
    #[serde(default, alias = "display_name", alias = "name")]
    pub first_name: String,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub is_online: Option<bool>,
    #[serde(default)]
    pub last_message: Option<Message>,
    #[serde(default)]
    pub unread_count: Option<u32>,
}

/// A group room as listed by the chatrooms endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoomRecord {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, alias = "display_name", alias = "first_name")]
    pub name: String,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub last_message: Option<Message>,
    #[serde(default)]
    pub unread_count: Option<u32>,
}

/// Body of `GET conversations`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartnersResponse {
    #[serde(default)]
    pub partners: Vec<PartnerRecord>,
}

/// The three REST lists, fetched as a unit.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub partners: Vec<PartnerRecord>,
    pub rooms: Vec<RoomRecord>,
    pub users: Vec<User>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partner_record_accepts_name_aliases() {
        let json = r#"{
            "partners": [
                {"id": "6f1c2b7e-2a4b-4f5e-9c1d-111111111111", "first_name": "Ana", "unread_count": 2},
                {"id": "6f1c2b7e-2a4b-4f5e-9c1d-222222222222", "display_name": "Ben"}
            ]
        }"#;
        let parsed: PartnersResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.partners.len(), 2);
        assert_eq!(parsed.partners[0].first_name, "Ana");
        assert_eq!(parsed.partners[0].unread_count, Some(2));
        assert_eq!(parsed.partners[1].first_name, "Ben");
        assert_eq!(parsed.partners[1].is_online, None);
        assert_eq!(parsed.partners[1].unread_count, None);
    }

    #[test]
    fn test_room_record_numeric_id() {
        let rooms: Vec<RoomRecord> =
            serde_json::from_str(r#"[{"id": 9, "name": "Climbing"}]"#).unwrap();
        assert_eq!(rooms[0].id, "9");
        assert_eq!(rooms[0].name, "Climbing");
    }
}
