/// Application name
pub const APP_NAME: &str = "Parley";

/// Prefix of every private per-user notifier channel (`user.{id}`).
pub const USER_CHANNEL_PREFIX: &str = "user.";

/// Maximum text length of a single message, in characters.
pub const MAX_CONTENT_CHARS: usize = 10_000;

/// Maximum attachment size in bytes (50 MiB)
pub const MAX_ATTACHMENT_SIZE: usize = 50 * 1024 * 1024;

/// Default number of timeline items per page.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Header carrying the authenticated actor id, set by the auth proxy.
pub const ACTOR_HEADER: &str = "x-user-id";

// Conversation-list placeholders.
pub const PREVIEW_UNSENT: &str = "This message was deleted";
pub const PREVIEW_IMAGE: &str = "📷 Image";
pub const PREVIEW_VIDEO: &str = "🎥 Video";
pub const PREVIEW_VOICE: &str = "🎤 Voice message";
pub const PREVIEW_FILE: &str = "📎 Attachment";
