//! Request and response bodies of the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CallId, CallKind, UserId};
use crate::views::{ActivityPreview, CallSnapshot};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateCallRequest {
    pub receiver_id: UserId,
    pub call_type: CallKind,
    #[serde(default)]
    pub offer: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerCallRequest {
    pub call_id: CallId,
    #[serde(default)]
    pub answer: serde_json::Value,
}

/// Body of reject, missed and end requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRequest {
    pub call_id: CallId,
    /// Only read by `/calls/end`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceCandidateRequest {
    pub receiver_id: UserId,
    pub candidate: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRequest {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRequest {
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadMoreQuery {
    pub before: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Whether an idempotent operation changed anything.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangedResponse {
    pub changed: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CountResponse {
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallResponse {
    pub changed: bool,
    pub call: CallSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeletionResponse {
    pub hidden: bool,
    pub purged: bool,
    pub new_last_message: Option<ActivityPreview>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
