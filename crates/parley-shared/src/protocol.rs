use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::types::{CallId, CallKind, ConversationId, MessageId, UserId};
use crate::views::{ActivityPreview, CallSnapshot, MessageView};

/// Every event pushed to a user channel.
///
/// Signaling payloads (SDP offer/answer, ICE candidates) are opaque JSON and
/// are relayed untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// A message arrived. Pushed to the receiver only.
    #[serde(rename = "message.sent")]
    MessageSent(MessageView),

    /// The receiver has seen a message. Pushed to the sender.
    #[serde(rename = "message.seen")]
    MessageSeen {
        message_id: MessageId,
        conversation_id: ConversationId,
    },

    /// The sender retracted a message for everyone.
    #[serde(rename = "message.unsent")]
    MessageUnsent {
        message_id: MessageId,
        conversation_id: ConversationId,
    },

    /// The recipient's last visible item changed because of a deletion.
    /// `new_last_message == None` means nothing remains visible.
    #[serde(rename = "message.deleted")]
    MessageDeleted {
        message_id: MessageId,
        conversation_id: ConversationId,
        actor: UserId,
        new_last_message: Option<ActivityPreview>,
    },

    #[serde(rename = "conversation.deleted")]
    ConversationDeleted { conversation_id: ConversationId },

    /// Ringing signal, pushed to the receiver.
    #[serde(rename = "call.initiated")]
    CallInitiated {
        call_id: CallId,
        caller_id: UserId,
        receiver_id: UserId,
        caller_name: String,
        call_type: CallKind,
        offer: serde_json::Value,
    },

    #[serde(rename = "call.answered")]
    CallAnswered {
        call_id: CallId,
        caller_id: UserId,
        receiver_id: UserId,
        answer: serde_json::Value,
    },

    #[serde(rename = "call.rejected")]
    CallRejected {
        call_id: CallId,
        caller_id: UserId,
        receiver_id: UserId,
    },

    /// Hang-up signal, pushed to the participant that did not end the call.
    #[serde(rename = "call.ended")]
    CallEnded {
        call_id: CallId,
        caller_id: UserId,
        receiver_id: UserId,
        ended_by: UserId,
    },

    #[serde(rename = "call.history.updated")]
    CallHistoryUpdated(CallSnapshot),

    #[serde(rename = "call.deleted")]
    CallDeleted {
        call_id: CallId,
        conversation_id: ConversationId,
        new_last_message: Option<ActivityPreview>,
    },

    #[serde(rename = "ice.candidate")]
    IceCandidate {
        from: UserId,
        candidate: serde_json::Value,
    },
}

impl ServerEvent {
    /// Catalogue name of the event, as published on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageSent(_) => "message.sent",
            Self::MessageSeen { .. } => "message.seen",
            Self::MessageUnsent { .. } => "message.unsent",
            Self::MessageDeleted { .. } => "message.deleted",
            Self::ConversationDeleted { .. } => "conversation.deleted",
            Self::CallInitiated { .. } => "call.initiated",
            Self::CallAnswered { .. } => "call.answered",
            Self::CallRejected { .. } => "call.rejected",
            Self::CallEnded { .. } => "call.ended",
            Self::CallHistoryUpdated(_) => "call.history.updated",
            Self::CallDeleted { .. } => "call.deleted",
            Self::IceCandidate { .. } => "ice.candidate",
        }
    }

    /// Conversation the event refers to, when it refers to one.
    pub fn conversation_id(&self) -> Option<ConversationId> {
        match self {
            Self::MessageSent(m) => Some(m.conversation_id),
            Self::MessageSeen { conversation_id, .. }
            | Self::MessageUnsent { conversation_id, .. }
            | Self::MessageDeleted { conversation_id, .. }
            | Self::ConversationDeleted { conversation_id }
            | Self::CallDeleted { conversation_id, .. } => Some(*conversation_id),
            Self::CallHistoryUpdated(c) => Some(c.conversation_id),
            Self::CallInitiated { .. }
            | Self::CallAnswered { .. }
            | Self::CallRejected { .. }
            | Self::CallEnded { .. }
            | Self::IceCandidate { .. } => None,
        }
    }

    /// Whether the event is live call signaling rather than conversation state.
    pub fn is_signal(&self) -> bool {
        matches!(
            self,
            Self::CallInitiated { .. }
                | Self::CallAnswered { .. }
                | Self::CallRejected { .. }
                | Self::CallEnded { .. }
                | Self::IceCandidate { .. }
        )
    }
}

/// One delivery on a user channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    /// Unique per publish; lets subscribers spot duplicate deliveries.
    pub id: Uuid,
    pub channel: String,
    pub payload: ServerEvent,
}

impl Envelope {
    pub fn new(recipient: UserId, payload: ServerEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: recipient.channel(),
            payload,
        }
    }

    pub fn recipient(&self) -> Result<UserId, ProtocolError> {
        UserId::from_channel(&self.channel)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_wire_shape_uses_catalogue_names() {
        let event = ServerEvent::MessageDeleted {
            message_id: MessageId(5),
            conversation_id: ConversationId(2),
            actor: UserId(1),
            new_last_message: None,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.name());
        assert_eq!(json["data"]["message_id"], 5);
        assert!(json["data"]["new_last_message"].is_null());
    }

    #[test]
    fn envelope_decodes_from_frame() {
        let envelope = Envelope::new(
            UserId(7),
            ServerEvent::IceCandidate {
                from: UserId(3),
                candidate: serde_json::json!({ "candidate": "candidate:1 1 udp 2122260223" }),
            },
        );

        let text = envelope.to_json().unwrap();
        let decoded = Envelope::from_json(&text).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(decoded.recipient().unwrap(), UserId(7));
        assert!(decoded.payload.is_signal());
        assert_eq!(decoded.payload.conversation_id(), None);
    }
}
