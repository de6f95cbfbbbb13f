//! REST side of the session: the snapshot lists and friendship requests.

use crate::http::{HttpClient, HttpRequest};
use chatcore::credentials::Credentials;
use chatcore::types::snapshot::PartnersResponse;
use chatcore::types::{RoomRecord, Snapshot, User, UserId};
use log::{debug, warn};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;

pub const CONVERSATIONS_PATH: &str = "/chatMeetUp/conversations/";
pub const CHATROOMS_PATH: &str = "/chatMeetUp/chatrooms/";
pub const USERS_PATH: &str = "/api/auth/users";
pub const FRIENDSHIP_PATH: &str = "/chatMeetUp/friendship/";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: &'static str, status: u16 },
    #[error("could not decode {endpoint} response: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct FriendshipResponse {
    #[serde(default)]
    message: String,
}

pub struct SnapshotIngestor {
    http_client: Arc<dyn HttpClient>,
    api_base_url: String,
    credentials: Credentials,
}

impl SnapshotIngestor {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        api_base_url: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            http_client,
            api_base_url: api_base_url.into(),
            credentials,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &'static str) -> Result<T, FetchError> {
        let request = HttpRequest::get(self.url(endpoint))
            .with_header("Authorization", self.credentials.bearer_header());
        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|source| FetchError::Request { endpoint, source })?;
        if !response.is_success() {
            return Err(FetchError::Status {
                endpoint,
                status: response.status_code,
            });
        }
        response
            .json()
            .map_err(|source| FetchError::Decode { endpoint, source })
    }

    /// Fetches conversations, rooms and users together. Any failure fails
    /// the whole snapshot.
    pub async fn fetch(&self) -> Result<Snapshot, FetchError> {
        let (partners, rooms, users) = tokio::try_join!(
            self.get_json::<PartnersResponse>(CONVERSATIONS_PATH),
            self.get_json::<Vec<RoomRecord>>(CHATROOMS_PATH),
            self.get_json::<Vec<User>>(USERS_PATH),
        )
        .inspect_err(|e| warn!(target: "Snapshot", "Snapshot fetch failed: {e}"))?;

        debug!(
            target: "Snapshot",
            "Fetched {} partners, {} rooms, {} users",
            partners.partners.len(),
            rooms.len(),
            users.len()
        );
        Ok(Snapshot {
            partners: partners.partners,
            rooms,
            users,
        })
    }

    /// Asks the backend to connect us with `to`. Returns the server's message.
    pub async fn send_friendship_request(&self, to: UserId) -> Result<String, FetchError> {
        let endpoint = FRIENDSHIP_PATH;
        let request = HttpRequest::post(self.url(endpoint))
            .with_header("Authorization", self.credentials.bearer_header())
            .with_json(&serde_json::json!({ "to_user_id": to }))
            .map_err(|source| FetchError::Decode { endpoint, source })?;
        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|source| FetchError::Request { endpoint, source })?;
        if !response.is_success() {
            return Err(FetchError::Status {
                endpoint,
                status: response.status_code,
            });
        }
        let body: FriendshipResponse = response
            .json()
            .map_err(|source| FetchError::Decode { endpoint, source })?;
        Ok(body.message)
    }
}
