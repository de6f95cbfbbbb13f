pub mod connection;
pub mod conversation;
pub mod events;
pub mod message;
pub mod snapshot;
pub mod user;

pub use connection::ConnectionState;
pub use conversation::{Conversation, ConversationId, ConversationKind};
pub use message::Message;
pub use snapshot::{PartnerRecord, RoomRecord, Snapshot};
pub use user::{User, UserId};
