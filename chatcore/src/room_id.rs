//! Room identifiers for one-to-one chats.
//!
//! Both participants compute the same id offline, so there is no round-trip
//! and no race to create the room. The id is the bitwise XOR of the two user
//! ids, rendered as a canonical, fixed-width UUID.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("`{0}` is not a UUID")]
pub struct RoomIdError(pub String);

/// Derives the room shared by `a` and `b`. Commutative; `derive_room_id(a, a)`
/// is the nil UUID.
pub fn derive_room_id(a: &Uuid, b: &Uuid) -> Uuid {
    Uuid::from_u128(a.as_u128() ^ b.as_u128())
}

/// String form of [`derive_room_id`]. Accepts hyphenated or bare 32-digit
/// hex input and always returns 36 characters in 8-4-4-4-12 grouping.
pub fn derive_room_id_str(a: &str, b: &str) -> Result<String, RoomIdError> {
    let a = parse_user_id(a)?;
    let b = parse_user_id(b)?;
    Ok(derive_room_id(&a, &b).hyphenated().to_string())
}

fn parse_user_id(raw: &str) -> Result<Uuid, RoomIdError> {
    let digits: String = raw.chars().filter(|c| *c != '-').collect();
    if digits.len() != 32 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(RoomIdError(raw.to_string()));
    }
    u128::from_str_radix(&digits, 16)
        .map(Uuid::from_u128)
        .map_err(|_| RoomIdError(raw.to_string()))
}
