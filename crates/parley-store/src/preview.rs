//! Conversation-list previews of timeline items.

use parley_shared::constants::{
    PREVIEW_FILE, PREVIEW_IMAGE, PREVIEW_UNSENT, PREVIEW_VIDEO, PREVIEW_VOICE,
};
use parley_shared::types::{AttachmentKind, CallStatus, UserId};
use parley_shared::views::ActivityPreview;

use crate::models::{CallRecord, Message};
use crate::timeline::TimelineItem;

/// Describe `item` in one short line as seen by `viewer`.
pub fn format_activity_preview(item: &TimelineItem, viewer: UserId) -> ActivityPreview {
    match item {
        TimelineItem::Message(message) => ActivityPreview {
            item: item.item_ref(),
            content: message_preview(message),
            created_at: message.created_at,
            is_mine: message.sender_id == viewer,
            is_read: message.seen,
        },
        TimelineItem::Call(call) => ActivityPreview {
            item: item.item_ref(),
            content: call_preview(call, viewer),
            created_at: call.created_at,
            is_mine: call.caller_id == viewer,
            is_read: call.is_seen,
        },
    }
}

fn message_preview(message: &Message) -> String {
    if message.unsent {
        return PREVIEW_UNSENT.to_string();
    }

    if let Some(content) = message.content.as_deref().filter(|c| !c.is_empty()) {
        return content.to_string();
    }

    match message.attachment.as_ref().map(|a| a.kind) {
        Some(AttachmentKind::Image) => PREVIEW_IMAGE.to_string(),
        Some(AttachmentKind::Video) => PREVIEW_VIDEO.to_string(),
        Some(AttachmentKind::Voice) => PREVIEW_VOICE.to_string(),
        Some(AttachmentKind::File) => PREVIEW_FILE.to_string(),
        None => String::new(),
    }
}

/// Call phrasing depends on the status and on which side of the call the
/// viewer was.
fn call_preview(call: &CallRecord, viewer: UserId) -> String {
    let outgoing = call.caller_id == viewer;

    match (call.status, outgoing) {
        (CallStatus::Missed, true) => "📞 Outgoing call (unanswered)".to_string(),
        (CallStatus::Missed, false) => "📞 Missed call".to_string(),
        (CallStatus::Cancelled, true) => "📞 Cancelled call".to_string(),
        (CallStatus::Cancelled, false) => "📞 Missed call".to_string(),
        (CallStatus::Rejected, true) => "📞 Call declined".to_string(),
        (CallStatus::Rejected, false) => "📞 Declined call".to_string(),
        (CallStatus::Answered | CallStatus::Ended, true) => {
            format!("📞 Outgoing call ({})", format_duration(call.duration.unwrap_or(0)))
        }
        (CallStatus::Answered | CallStatus::Ended, false) => {
            format!("📞 Incoming call ({})", format_duration(call.duration.unwrap_or(0)))
        }
        (CallStatus::Initiated, true) => "📞 Outgoing call".to_string(),
        (CallStatus::Initiated, false) => "📞 Incoming call".to_string(),
    }
}

/// `mm:ss`; minutes keep counting past the hour.
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
