use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }
    };
}

row_id!(
    /// User identity as supplied by the auth collaborator. Never minted here.
    UserId
);
row_id!(ConversationId);
row_id!(MessageId);
row_id!(CallId);

impl UserId {
    /// Name of the user's private notifier channel.
    pub fn channel(&self) -> String {
        format!("{}{}", crate::constants::USER_CHANNEL_PREFIX, self.0)
    }

    /// Inverse of [`UserId::channel`].
    pub fn from_channel(channel: &str) -> Result<Self, ProtocolError> {
        channel
            .strip_prefix(crate::constants::USER_CHANNEL_PREFIX)
            .and_then(|rest| rest.parse().ok())
            .ok_or_else(|| ProtocolError::InvalidChannel(channel.to_string()))
    }
}

/// The unordered participant pair of a conversation, stored as (low, high).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ParticipantPair {
    low: UserId,
    high: UserId,
}

impl ParticipantPair {
    /// Canonicalize `(a, b)`. Returns `None` when both ids are equal.
    pub fn new(a: UserId, b: UserId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn low(&self) -> UserId {
        self.low
    }

    pub fn high(&self) -> UserId {
        self.high
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.low == user || self.high == user
    }

    /// The participant that is not `user`, if `user` is a participant.
    pub fn other(&self, user: UserId) -> Option<UserId> {
        if user == self.low {
            Some(self.high)
        } else if user == self.high {
            Some(self.low)
        } else {
            None
        }
    }

    pub fn both(&self) -> [UserId; 2] {
        [self.low, self.high]
    }
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Initiated,
    Answered,
    Rejected,
    Missed,
    Cancelled,
    Ended,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Answered => "answered",
            Self::Rejected => "rejected",
            Self::Missed => "missed",
            Self::Cancelled => "cancelled",
            Self::Ended => "ended",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Missed | Self::Cancelled | Self::Ended
        )
    }

    /// Statuses a receiver has to acknowledge (counted as unseen until then).
    pub fn needs_acknowledgement(&self) -> bool {
        matches!(self, Self::Missed | Self::Rejected | Self::Cancelled)
    }

    /// Whether the state machine allows `self -> next` in one step.
    pub fn can_become(&self, next: CallStatus) -> bool {
        match self {
            Self::Initiated => matches!(
                next,
                Self::Answered | Self::Rejected | Self::Missed | Self::Cancelled
            ),
            Self::Answered => next == Self::Ended,
            Self::Rejected | Self::Missed | Self::Cancelled | Self::Ended => false,
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallStatus {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initiated" => Ok(Self::Initiated),
            "answered" => Ok(Self::Answered),
            "rejected" => Ok(Self::Rejected),
            "missed" => Ok(Self::Missed),
            "cancelled" => Ok(Self::Cancelled),
            "ended" => Ok(Self::Ended),
            other => Err(ProtocolError::UnknownVariant {
                kind: "call status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    #[default]
    Audio,
    Video,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl FromStr for CallKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            other => Err(ProtocolError::UnknownVariant {
                kind: "call kind",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Attachments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Video,
    Voice,
    File,
}

impl AttachmentKind {
    /// Classify an attachment by its mime type prefix.
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            Self::Image
        } else if mime.starts_with("video/") {
            Self::Video
        } else if mime.starts_with("audio/") {
            Self::Voice
        } else {
            Self::File
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Voice => "voice",
            Self::File => "file",
        }
    }
}

impl FromStr for AttachmentKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "voice" => Ok(Self::Voice),
            "file" => Ok(Self::File),
            other => Err(ProtocolError::UnknownVariant {
                kind: "attachment kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Reference to an attachment held by the storage collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    /// Path or URL returned by the storage collaborator.
    pub path: String,
    pub kind: AttachmentKind,
    pub mime_type: String,
}
