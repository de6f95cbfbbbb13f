//! Keeps a local, observable copy of a user's chat conversations in sync with
//! a REST snapshot and a push connection.
//!
//! Open a [`Session`] with [`Session::builder`], register observers with
//! `on_event`, and read state through the session's query methods.

pub use chatcore::{credentials, protocol, room_id, store, time};

pub mod types {
    pub use chatcore::types::*;
}

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod session;
pub mod snapshot;
pub mod transport;
pub mod typing;

#[cfg(test)]
pub mod test_utils;

pub use config::{ReconnectPolicy, SessionConfig};
pub use credentials::Credentials;
pub use error::{SessionError, TransportError};
pub use session::{SelectedConversation, Session, SessionBuilder};
pub use snapshot::FetchError;
pub use chatcore::{MalformedEventError, ValidationError};
