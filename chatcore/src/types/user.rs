use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;

/// An entry of the user directory.
///
/// Everything except `is_online` is fixed for the life of a session;
/// presence events flip `is_online` with last-write-wins semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub is_online: bool,
}

impl User {
    pub fn display_name(&self) -> String {
        if self.first_name.is_empty() {
            self.id.to_string()
        } else {
            self.first_name.clone()
        }
    }
}
