//! ID generation utilities.

use rand::{Rng, distributions::Uniform};
use ulid::Ulid;

/// Length of a room join code.
pub const ROOM_CODE_LEN: usize = 6;

const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// ID generator for entities.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new ULID-based ID.
    ///
    /// ULIDs are:
    /// - Lexicographically sortable
    /// - Monotonically increasing within the same millisecond
    /// - Shorter than UUIDs when represented as strings
    #[must_use]
    pub fn generate(&self) -> String {
        Ulid::new().to_string().to_lowercase()
    }

    /// Generate a human-shareable room join code.
    ///
    /// Codes are [`ROOM_CODE_LEN`] upper-case alphanumeric characters. They are
    /// not guaranteed unique; callers check the store and retry on collision.
    #[must_use]
    pub fn generate_room_code(&self) -> String {
        let mut rng = rand::thread_rng();
        let dist = Uniform::from(0..ROOM_CODE_ALPHABET.len());
        (0..ROOM_CODE_LEN)
            .map(|_| char::from(ROOM_CODE_ALPHABET[rng.sample(dist)]))
            .collect()
    }
}
