//! Call lifecycle and signaling relay.
//!
//! ```text
//! initiated ──answer──▶ answered ──end──▶ ended
//!     │
//!     ├──reject──────────▶ rejected
//!     ├──end (caller)────▶ cancelled
//!     └──end (receiver) / missed / expiry ──▶ missed
//! ```

use chrono::{DateTime, Duration, Utc};
use parley_shared::protocol::ServerEvent;
use parley_shared::types::{CallId, CallKind, CallStatus, ConversationId, UserId};
use parley_shared::views::{CallSnapshot, ItemRef};
use parley_store::{CallRecord, CallTransition, Database, NewCall};
use tracing::{debug, info};

use crate::engine::{load_call, participant_conversation, require_user, Engine};
use crate::error::{EngineError, Result};
use crate::messages::refresh_last_activity;
use crate::notifier::Outbox;
use crate::DeletionOutcome;

/// Result of a call transition request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// The record moved to a new status.
    Changed(CallSnapshot),
    /// The record was already past the requested transition; nothing was
    /// written and nothing was published.
    Unchanged(CallSnapshot),
}

impl CallOutcome {
    pub fn snapshot(&self) -> &CallSnapshot {
        match self {
            Self::Changed(s) | Self::Unchanged(s) => s,
        }
    }

    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallAction {
    Answer,
    Reject,
    End { duration: Option<i64> },
    Miss,
}

fn authorize(call: &CallRecord, actor: UserId, action: CallAction) -> Result<()> {
    let allowed = match action {
        CallAction::Answer | CallAction::Reject | CallAction::Miss => actor == call.receiver_id,
        CallAction::End { .. } => call.involves(actor),
    };
    if allowed {
        Ok(())
    } else {
        Err(EngineError::unauthorized(format!(
            "user {actor} may not {action:?} call {}",
            call.id
        )))
    }
}

/// Decide the next state of `call`. Returns `Conflict` when the current
/// status does not allow `action`.
fn plan_transition(
    call: &CallRecord,
    actor: UserId,
    action: CallAction,
    now: DateTime<Utc>,
) -> Result<CallTransition> {
    let to = match (call.status, action) {
        (CallStatus::Initiated, CallAction::Answer) => CallStatus::Answered,
        (CallStatus::Initiated, CallAction::Reject) => CallStatus::Rejected,
        (CallStatus::Initiated, CallAction::Miss) => CallStatus::Missed,
        (CallStatus::Initiated, CallAction::End { .. }) if actor == call.caller_id => {
            CallStatus::Cancelled
        }
        (CallStatus::Initiated, CallAction::End { .. }) => CallStatus::Missed,
        (CallStatus::Answered, CallAction::End { .. }) => CallStatus::Ended,
        (status, _) => {
            return Err(EngineError::Conflict(format!(
                "call {} is already {status}",
                call.id
            )))
        }
    };

    let (ended_at, duration) = match action {
        CallAction::Answer => (None, None),
        CallAction::Reject | CallAction::Miss => (Some(now), None),
        CallAction::End { duration } => {
            let elapsed = (now - call.started_at).num_seconds().max(0);
            (Some(now), Some(duration.unwrap_or(elapsed)))
        }
    };

    Ok(CallTransition {
        from: call.status,
        to,
        ended_at,
        duration,
        is_seen: matches!(to, CallStatus::Answered | CallStatus::Ended) || call.is_seen,
    })
}

/// Apply one transition inside an open transaction. The outbox carries the
/// history broadcast to both participants when the record changed.
fn apply_transition(
    db: &Database,
    call: &CallRecord,
    actor: UserId,
    action: CallAction,
    now: DateTime<Utc>,
) -> Result<(CallOutcome, Outbox)> {
    let transition = match plan_transition(call, actor, action, now) {
        Ok(transition) => transition,
        Err(EngineError::Conflict(reason)) => {
            debug!(call = %call.id, %reason, "call transition ignored");
            return Ok((CallOutcome::Unchanged(db.call_snapshot(call)?), Outbox::new()));
        }
        Err(e) => return Err(e),
    };

    if !db.transition_call(call.id, &transition)? {
        let current = load_call(db, call.id)?;
        debug!(call = %call.id, status = %current.status, "call changed concurrently");
        return Ok((CallOutcome::Unchanged(db.call_snapshot(&current)?), Outbox::new()));
    }
    db.set_last_activity(call.conversation_id, now)?;

    let snapshot = db.call_snapshot(&load_call(db, call.id)?)?;
    let mut outbox = Outbox::new();
    outbox.push(call.caller_id, ServerEvent::CallHistoryUpdated(snapshot.clone()));
    outbox.push(call.receiver_id, ServerEvent::CallHistoryUpdated(snapshot.clone()));

    info!(
        call = %call.id,
        from = %transition.from,
        to = %transition.to,
        "call status changed"
    );
    Ok((CallOutcome::Changed(snapshot), outbox))
}

impl Engine {
    /// Place a call. `offer` is the caller's SDP offer, relayed untouched.
    pub async fn initiate_call(
        &self,
        caller: UserId,
        receiver: UserId,
        kind: CallKind,
        offer: serde_json::Value,
    ) -> Result<CallSnapshot> {
        if caller == receiver {
            return Err(EngineError::validation("cannot call yourself"));
        }
        let now = self.now();

        let (snapshot, outbox) = self.atomically(|db| {
            require_user(db, receiver)?;
            if db.is_blocked_between(caller, receiver)? {
                return Err(EngineError::unauthorized("cannot call this user"));
            }

            let conversation = db.find_or_create_conversation(caller, receiver, now)?;
            let call = db.insert_call(&NewCall {
                conversation_id: conversation.id,
                caller_id: caller,
                receiver_id: receiver,
                kind,
                created_at: now,
            })?;
            db.set_last_activity(conversation.id, call.created_at)?;

            let snapshot = db.call_snapshot(&call)?;
            let mut outbox = Outbox::new();
            outbox.push(
                receiver,
                ServerEvent::CallInitiated {
                    call_id: call.id,
                    caller_id: caller,
                    receiver_id: receiver,
                    caller_name: snapshot.caller.name.clone(),
                    call_type: kind,
                    offer,
                },
            );
            outbox.push(caller, ServerEvent::CallHistoryUpdated(snapshot.clone()));
            outbox.push(receiver, ServerEvent::CallHistoryUpdated(snapshot.clone()));
            Ok((snapshot, outbox))
        })?;

        info!(call = %snapshot.id, caller = %caller, receiver = %receiver, "call initiated");
        self.publish(outbox).await;
        Ok(snapshot)
    }

    /// The receiver picks up. `answer` is relayed to the caller.
    pub async fn answer_call(
        &self,
        actor: UserId,
        call: CallId,
        answer: serde_json::Value,
    ) -> Result<CallOutcome> {
        let now = self.now();
        let (outcome, outbox) = self.atomically(|db| {
            let record = load_call(db, call)?;
            authorize(&record, actor, CallAction::Answer)?;

            let (outcome, mut outbox) = apply_transition(db, &record, actor, CallAction::Answer, now)?;
            if outcome.is_changed() {
                outbox.push(
                    record.caller_id,
                    ServerEvent::CallAnswered {
                        call_id: record.id,
                        caller_id: record.caller_id,
                        receiver_id: record.receiver_id,
                        answer,
                    },
                );
            }
            Ok((outcome, outbox))
        })?;

        self.publish(outbox).await;
        Ok(outcome)
    }

    pub async fn reject_call(&self, actor: UserId, call: CallId) -> Result<CallOutcome> {
        let now = self.now();
        let (outcome, outbox) = self.atomically(|db| {
            let record = load_call(db, call)?;
            authorize(&record, actor, CallAction::Reject)?;

            let (outcome, mut outbox) = apply_transition(db, &record, actor, CallAction::Reject, now)?;
            if outcome.is_changed() {
                outbox.push(
                    record.caller_id,
                    ServerEvent::CallRejected {
                        call_id: record.id,
                        caller_id: record.caller_id,
                        receiver_id: record.receiver_id,
                    },
                );
            }
            Ok((outcome, outbox))
        })?;

        self.publish(outbox).await;
        Ok(outcome)
    }

    /// Hang up. Before an answer this cancels (caller) or misses (receiver)
    /// the call. `duration` overrides the computed one.
    pub async fn end_call(
        &self,
        actor: UserId,
        call: CallId,
        duration: Option<i64>,
    ) -> Result<CallOutcome> {
        if duration.is_some_and(|d| d < 0) {
            return Err(EngineError::validation("duration must not be negative"));
        }

        let now = self.now();
        let (outcome, outbox) = self.atomically(|db| {
            let record = load_call(db, call)?;
            let action = CallAction::End { duration };
            authorize(&record, actor, action)?;

            let (outcome, mut outbox) = apply_transition(db, &record, actor, action, now)?;
            if outcome.is_changed() {
                let other = if actor == record.caller_id {
                    record.receiver_id
                } else {
                    record.caller_id
                };
                outbox.push(
                    other,
                    ServerEvent::CallEnded {
                        call_id: record.id,
                        caller_id: record.caller_id,
                        receiver_id: record.receiver_id,
                        ended_by: actor,
                    },
                );
            }
            Ok((outcome, outbox))
        })?;

        self.publish(outbox).await;
        Ok(outcome)
    }

    /// The receiver's ring timer ran out.
    pub async fn mark_missed(&self, actor: UserId, call: CallId) -> Result<CallOutcome> {
        let now = self.now();
        let (outcome, outbox) = self.atomically(|db| {
            let record = load_call(db, call)?;
            authorize(&record, actor, CallAction::Miss)?;
            apply_transition(db, &record, actor, CallAction::Miss, now)
        })?;

        self.publish(outbox).await;
        Ok(outcome)
    }

    /// Relay an ICE candidate. No store access.
    pub async fn share_ice_candidate(
        &self,
        from: UserId,
        to: UserId,
        candidate: serde_json::Value,
    ) -> Result<()> {
        if from == to {
            return Err(EngineError::validation("cannot relay a candidate to yourself"));
        }
        debug!(from = %from, to = %to, "relaying ICE candidate");
        self.notifier
            .notify(to, ServerEvent::IceCandidate { from, candidate })
            .await;
        Ok(())
    }

    /// Acknowledge every missed, rejected or cancelled call `viewer` received
    /// in `conversation`. Returns how many records changed.
    pub async fn mark_calls_seen_in_conversation(
        &self,
        viewer: UserId,
        conversation: ConversationId,
    ) -> Result<usize> {
        let (marked, outbox) = self.atomically(|db| {
            let conversation = participant_conversation(db, conversation, viewer)?;

            let mut marked = 0;
            let mut outbox = Outbox::new();
            for call in db.unseen_calls_for(conversation.id, viewer)? {
                if !db.mark_call_seen(call.id)? {
                    continue;
                }
                marked += 1;

                let snapshot = db.call_snapshot(&load_call(db, call.id)?)?;
                outbox.push(call.caller_id, ServerEvent::CallHistoryUpdated(snapshot.clone()));
                outbox.push(call.receiver_id, ServerEvent::CallHistoryUpdated(snapshot));
            }
            Ok((marked, outbox))
        })?;

        if marked > 0 {
            debug!(conversation = %conversation, viewer = %viewer, marked, "calls acknowledged");
        }
        self.publish(outbox).await;
        Ok(marked)
    }

    /// Hide a call record for `actor` only.
    pub async fn delete_call_for_me(&self, actor: UserId, call: CallId) -> Result<DeletionOutcome> {
        let now = self.now();

        let (outcome, outbox) = self.atomically(|db| {
            let record = load_call(db, call)?;
            if !record.involves(actor) {
                return Err(EngineError::unauthorized(format!(
                    "user {actor} was not part of call {call}"
                )));
            }
            let conversation = participant_conversation(db, record.conversation_id, actor)?;

            let mut outbox = Outbox::new();
            if record.deleted_by.contains(&actor) {
                return Ok((DeletionOutcome::default(), outbox));
            }

            let previous_last = db.last_visible_item(conversation.id, actor)?;
            db.hide_call_for(record.id, actor, now)?;

            let mut outcome = DeletionOutcome {
                hidden: true,
                ..DeletionOutcome::default()
            };

            let mut hidden = record.clone();
            hidden.deleted_by.insert(actor);
            if hidden.is_hidden_from_all() {
                db.purge_call(record.id)?;
                outcome.purged = true;
            }

            let was_last = previous_last
                .map(|item| item.item_ref() == ItemRef::Call(record.id))
                .unwrap_or(false);
            if was_last {
                outcome.was_last = true;
                outcome.new_last_message = refresh_last_activity(db, &conversation, actor)?;
                outbox.push(
                    actor,
                    ServerEvent::CallDeleted {
                        call_id: record.id,
                        conversation_id: conversation.id,
                        new_last_message: outcome.new_last_message.clone(),
                    },
                );
            }
            Ok((outcome, outbox))
        })?;

        if outcome.hidden {
            info!(call = %call, actor = %actor, purged = outcome.purged, "call deleted for user");
        }
        self.publish(outbox).await;
        Ok(outcome)
    }

    /// Mark every call still ringing after `ring_timeout` as missed. Returns
    /// how many records changed.
    pub async fn expire_stale_calls(&self, ring_timeout: Duration) -> Result<usize> {
        let now = self.now();
        let cutoff = now - ring_timeout;

        let (expired, outbox) = self.atomically(|db| {
            let mut expired = 0;
            let mut outbox = Outbox::new();
            for call in db.ringing_calls_before(cutoff)? {
                let (outcome, events) =
                    apply_transition(db, &call, call.receiver_id, CallAction::Miss, now)?;
                if outcome.is_changed() {
                    expired += 1;
                    for (recipient, event) in events {
                        outbox.push(recipient, event);
                    }
                }
            }
            Ok((expired, outbox))
        })?;

        if expired > 0 {
            info!(expired, "stale calls marked missed");
        }
        self.publish(outbox).await;
        Ok(expired)
    }
}
