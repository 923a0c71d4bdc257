//! Session configuration.

/// Room used when an envelope carries no `roomId`.
pub const DEFAULT_ROOM: &str = "general";

/// Undecryptable chats kept per room while waiting for a key.
pub const DEFAULT_MAX_PENDING_PER_ROOM: usize = 256;

/// Per-session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Local username; key shares addressed to anyone else are dropped and no
    /// share is ever sent to this name.
    pub username: String,
    /// Room assumed for envelopes without a `roomId`.
    pub default_room: String,
    /// Bound on the per-room queue of chats awaiting a key. Oldest entries
    /// are evicted first; zero disables the queue.
    pub max_pending_per_room: usize,
}

impl SessionConfig {
    /// Defaults for the given user.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            default_room: DEFAULT_ROOM.to_string(),
            max_pending_per_room: DEFAULT_MAX_PENDING_PER_ROOM,
        }
    }

    /// Override the default room.
    #[must_use]
    pub fn with_default_room(mut self, room_id: impl Into<String>) -> Self {
        self.default_room = room_id.into();
        self
    }

    /// Override the pending queue bound.
    #[must_use]
    pub fn with_max_pending_per_room(mut self, limit: usize) -> Self {
        self.max_pending_per_room = limit;
        self
    }
}
