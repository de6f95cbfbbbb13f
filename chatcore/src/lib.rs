//! Platform-independent conversation synchronization logic.
//!
//! Nothing in this crate performs I/O. The runtime crate drives these types
//! from its session worker and plugs concrete transports into the traits in
//! [`net`].

pub mod credentials;
pub mod error;
pub mod net;
pub mod protocol;
pub mod room_id;
pub mod store;
pub mod time;
pub mod types;

pub use error::{MalformedEventError, ValidationError};
pub use room_id::derive_room_id;
pub use store::ConversationStore;
