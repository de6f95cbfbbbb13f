use thiserror::Error;

/// An inbound event that could not be turned into an [`InboundEvent`].
///
/// These are logged and dropped by the dispatcher; they never reach the
/// store and never stop the session.
///
/// [`InboundEvent`]: crate::protocol::InboundEvent
#[derive(Debug, Error)]
pub enum MalformedEventError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("envelope is not a JSON object")]
    NotAnObject,
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("unrecognized event type `{0}`")]
    UnknownType(String),
    #[error("invalid `{event_type}` payload: {source}")]
    InvalidPayload {
        event_type: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// A caller-supplied value rejected before anything is sent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("message content is empty")]
    EmptyContent,
    #[error("no conversation is open")]
    NoActiveConversation,
}
