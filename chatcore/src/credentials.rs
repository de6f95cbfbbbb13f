use crate::types::UserId;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("token is empty")]
    Empty,
    #[error("token is not a JWT")]
    NotAJwt,
    #[error("token payload is not base64url: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("token claims are invalid: {0}")]
    Claims(#[from] serde_json::Error),
}

/// Bearer credential for one authenticated session.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub user_id: UserId,
}

#[derive(Deserialize)]
struct Claims {
    user_id: UserId,
}

impl Credentials {
    pub fn new(token: impl Into<String>, user_id: UserId) -> Self {
        Self {
            token: token.into(),
            user_id,
        }
    }

    /// Reads the `user_id` claim out of a JWT access token.
    ///
    /// The signature is not checked; the backend does that on every request.
    pub fn from_token(token: impl Into<String>) -> Result<Self, CredentialsError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(CredentialsError::Empty);
        }
        let mut segments = token.split('.');
        let payload = match (segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_)) => payload,
            _ => return Err(CredentialsError::NotAJwt),
        };
        let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
        let claims: Claims = serde_json::from_slice(&decoded)?;
        Ok(Self {
            user_id: claims.user_id,
            token,
        })
    }

    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}
