//! Message operations: send, seen, delete-for-me, unsend, delete conversation.

use chrono::{DateTime, Utc};
use parley_shared::protocol::ServerEvent;
use parley_shared::types::{Attachment, AttachmentKind, ConversationId, MessageId, UserId};
use parley_shared::views::{ActivityPreview, ItemRef, MessageView};
use parley_store::{format_activity_preview, Conversation, Database, NewMessage};
use tracing::{debug, info, warn};

use crate::engine::{load_message, participant_conversation, require_user, Engine};
use crate::error::{EngineError, Result};
use crate::notifier::Outbox;
use crate::storage::{attachment_path, Upload};

/// What a delete-for-me did, from the actor's point of view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionOutcome {
    /// `false` when the actor had already hidden the item.
    pub hidden: bool,
    /// The row is gone for good because both participants hid it.
    pub purged: bool,
    /// The item was the actor's last visible one.
    pub was_last: bool,
    /// The actor's new last visible item, when `was_last`.
    pub new_last_message: Option<ActivityPreview>,
}

impl Engine {
    /// Send a message from `sender` to `receiver`, creating their
    /// conversation on first contact. Returns the sender's view of the
    /// stored message.
    pub async fn send_message(
        &self,
        sender: UserId,
        receiver: UserId,
        content: Option<String>,
        upload: Option<Upload>,
    ) -> Result<MessageView> {
        let content = content.filter(|c| !c.trim().is_empty());
        self.validate_message(sender, receiver, content.as_deref(), upload.as_ref())?;

        let now = self.now();

        let Some(upload) = upload else {
            let (view, outbox) = self.atomically(|db| {
                require_user(db, receiver)?;
                let conversation = db.find_or_create_conversation(sender, receiver, now)?;
                insert_message(db, &conversation, sender, receiver, content, None, now)
            })?;
            self.publish(outbox).await;
            return Ok(view);
        };

        // The blob path needs the conversation id, and the upload must not
        // happen while the store is locked. A conversation opened here is
        // dropped again if the send fails.
        let (conversation, created) = self.atomically(|db| {
            require_user(db, receiver)?;
            if let Some(existing) = db.find_conversation_between(sender, receiver)? {
                return Ok((existing, false));
            }
            Ok((db.find_or_create_conversation(sender, receiver, now)?, true))
        })?;

        let suggested = attachment_path(conversation.id, &upload.file_name);
        let kind = AttachmentKind::from_mime(&upload.mime_type);
        let path = match self.blobs.store(upload.bytes, &suggested).await {
            Ok(path) => path,
            Err(e) => {
                if created {
                    self.forget_empty_conversation(conversation.id);
                }
                return Err(e.into());
            }
        };
        let attachment = Attachment {
            path: path.clone(),
            kind,
            mime_type: upload.mime_type,
        };

        let now = self.now();
        let inserted = self.atomically(|db| {
            insert_message(db, &conversation, sender, receiver, content, Some(attachment), now)
        });

        match inserted {
            Ok((view, outbox)) => {
                self.publish(outbox).await;
                Ok(view)
            }
            Err(e) => {
                self.discard_blob(&path).await;
                if created {
                    self.forget_empty_conversation(conversation.id);
                }
                Err(e)
            }
        }
    }

    /// Undo the lazy creation of `conversation` after a failed first send.
    /// Leaves it alone once anything else landed in it.
    fn forget_empty_conversation(&self, conversation: ConversationId) {
        match self.atomically(|db| Ok(db.delete_conversation_if_empty(conversation)?)) {
            Ok(true) => debug!(conversation = %conversation, "empty conversation dropped"),
            Ok(false) => {}
            Err(e) => warn!(conversation = %conversation, error = %e, "failed to drop empty conversation"),
        }
    }

    fn validate_message(
        &self,
        sender: UserId,
        receiver: UserId,
        content: Option<&str>,
        upload: Option<&Upload>,
    ) -> Result<()> {
        if sender == receiver {
            return Err(EngineError::validation("cannot send a message to yourself"));
        }
        if content.is_none() && upload.is_none() {
            return Err(EngineError::validation(
                "a message needs content or an attachment",
            ));
        }
        if let Some(content) = content {
            if content.chars().count() > self.config.max_content_chars {
                return Err(EngineError::validation(format!(
                    "content exceeds {} characters",
                    self.config.max_content_chars
                )));
            }
        }
        if let Some(upload) = upload {
            if upload.bytes.is_empty() {
                return Err(EngineError::validation("attachment is empty"));
            }
            if upload.bytes.len() > self.config.max_attachment_size {
                return Err(EngineError::validation(format!(
                    "attachment exceeds {} bytes",
                    self.config.max_attachment_size
                )));
            }
        }
        Ok(())
    }

    /// The receiver has read `message`. Returns `true` if this call flipped
    /// the flag.
    pub async fn mark_seen(&self, viewer: UserId, message: MessageId) -> Result<bool> {
        let (changed, outbox) = self.atomically(|db| {
            let row = load_message(db, message)?;
            participant_conversation(db, row.conversation_id, viewer)?;

            let mut outbox = Outbox::new();
            if row.sender_id == viewer || row.seen {
                return Ok((false, outbox));
            }
            if !db.mark_message_seen(row.id)? {
                return Ok((false, outbox));
            }

            outbox.push(
                row.sender_id,
                ServerEvent::MessageSeen {
                    message_id: row.id,
                    conversation_id: row.conversation_id,
                },
            );
            Ok((true, outbox))
        })?;

        if changed {
            debug!(message = %message, viewer = %viewer, "message seen");
        }
        self.publish(outbox).await;
        Ok(changed)
    }

    /// Hide `message` for `actor` only.
    pub async fn delete_for_me(&self, actor: UserId, message: MessageId) -> Result<DeletionOutcome> {
        let now = self.now();

        let (outcome, orphaned_blob, outbox) = self.atomically(|db| {
            let row = load_message(db, message)?;
            let conversation = participant_conversation(db, row.conversation_id, actor)?;

            let mut outbox = Outbox::new();
            if row.deleted_by.contains(&actor) {
                return Ok((DeletionOutcome::default(), None, outbox));
            }

            let previous_last = db.last_visible_item(conversation.id, actor)?;
            db.hide_message_for(row.id, actor, now)?;

            let mut outcome = DeletionOutcome {
                hidden: true,
                ..DeletionOutcome::default()
            };

            let mut orphaned_blob = None;
            let mut deleted_by = row.deleted_by.clone();
            deleted_by.insert(actor);
            if conversation.participants.both().iter().all(|u| deleted_by.contains(u)) {
                db.purge_message(row.id)?;
                outcome.purged = true;
                orphaned_blob = row.attachment.as_ref().map(|a| a.path.clone());
            }

            let was_last = previous_last
                .map(|item| item.item_ref() == ItemRef::Message(row.id))
                .unwrap_or(false);
            if was_last {
                outcome.was_last = true;
                outcome.new_last_message = refresh_last_activity(db, &conversation, actor)?;
                outbox.push(
                    actor,
                    ServerEvent::MessageDeleted {
                        message_id: row.id,
                        conversation_id: conversation.id,
                        actor,
                        new_last_message: outcome.new_last_message.clone(),
                    },
                );
            }

            Ok((outcome, orphaned_blob, outbox))
        })?;

        if outcome.hidden {
            info!(message = %message, actor = %actor, purged = outcome.purged, "message deleted for user");
        }
        self.publish(outbox).await;
        if let Some(path) = orphaned_blob {
            self.discard_blob(&path).await;
        }
        Ok(outcome)
    }

    /// Retract `message` for everyone. Only its sender may do this; a second
    /// unsend is a no-op returning `false`.
    pub async fn unsend(&self, actor: UserId, message: MessageId) -> Result<bool> {
        let now = self.now();

        let (changed, orphaned_blob, outbox) = self.atomically(|db| {
            let row = load_message(db, message)?;
            if row.sender_id != actor {
                return Err(EngineError::unauthorized(format!(
                    "user {actor} did not send message {message}"
                )));
            }

            let mut outbox = Outbox::new();
            if row.unsent {
                return Ok((false, None, outbox));
            }

            let conversation = participant_conversation(db, row.conversation_id, actor)?;
            let was_last = db
                .latest_message(conversation.id)?
                .map(|latest| latest.id == row.id)
                .unwrap_or(false);

            if !db.unsend_message(row.id, now)? {
                return Ok((false, None, outbox));
            }
            if was_last {
                db.set_last_activity(conversation.id, now)?;
            }

            for user in conversation.participants.both() {
                outbox.push(
                    user,
                    ServerEvent::MessageUnsent {
                        message_id: row.id,
                        conversation_id: conversation.id,
                    },
                );
            }

            // "Last visible" differs per participant, so each gets their own.
            if was_last {
                for user in conversation.participants.both() {
                    let new_last = db
                        .last_visible_item(conversation.id, user)?
                        .map(|item| format_activity_preview(&item, user));
                    outbox.push(
                        user,
                        ServerEvent::MessageDeleted {
                            message_id: row.id,
                            conversation_id: conversation.id,
                            actor,
                            new_last_message: new_last,
                        },
                    );
                }
            }

            let orphaned_blob = row.attachment.as_ref().map(|a| a.path.clone());
            Ok((true, orphaned_blob, outbox))
        })?;

        if changed {
            info!(message = %message, actor = %actor, "message unsent");
        }
        self.publish(outbox).await;
        if let Some(path) = orphaned_blob {
            self.discard_blob(&path).await;
        }
        Ok(changed)
    }

    /// Hide every message of `conversation` for `actor`. The other
    /// participant's view is untouched. Returns how many messages were newly
    /// hidden.
    pub async fn delete_conversation(&self, actor: UserId, conversation: ConversationId) -> Result<usize> {
        let now = self.now();

        let (hidden, orphaned_blobs, outbox) = self.atomically(|db| {
            let conversation = participant_conversation(db, conversation, actor)?;

            let mut hidden = 0;
            let mut orphaned_blobs = Vec::new();
            for message in db.messages_in_conversation(conversation.id)? {
                if message.deleted_by.contains(&actor) {
                    continue;
                }
                db.hide_message_for(message.id, actor, now)?;
                hidden += 1;

                let mut deleted_by = message.deleted_by.clone();
                deleted_by.insert(actor);
                if conversation.participants.both().iter().all(|u| deleted_by.contains(u)) {
                    db.purge_message(message.id)?;
                    if let Some(attachment) = message.attachment {
                        orphaned_blobs.push(attachment.path);
                    }
                }
            }

            let mut outbox = Outbox::new();
            outbox.push(
                actor,
                ServerEvent::ConversationDeleted {
                    conversation_id: conversation.id,
                },
            );
            Ok((hidden, orphaned_blobs, outbox))
        })?;

        info!(conversation = %conversation, actor = %actor, hidden, "conversation deleted for user");
        self.publish(outbox).await;
        for path in orphaned_blobs {
            self.discard_blob(&path).await;
        }
        Ok(hidden)
    }
}

fn insert_message(
    db: &Database,
    conversation: &Conversation,
    sender: UserId,
    receiver: UserId,
    content: Option<String>,
    attachment: Option<Attachment>,
    now: DateTime<Utc>,
) -> Result<(MessageView, Outbox)> {
    let message = db.insert_message(&NewMessage {
        conversation_id: conversation.id,
        sender_id: sender,
        content,
        attachment,
        created_at: now,
    })?;
    db.set_last_activity(conversation.id, message.created_at)?;

    let mut outbox = Outbox::new();
    outbox.push(receiver, ServerEvent::MessageSent(db.message_view(&message, receiver)?));

    info!(
        message = %message.id,
        conversation = %conversation.id,
        sender = %sender,
        "message sent"
    );
    Ok((db.message_view(&message, sender)?, outbox))
}

/// After `viewer` lost their last visible item: move the conversation's
/// activity to the new last item and describe it. With nothing left the
/// activity timestamp stays where it was.
pub(crate) fn refresh_last_activity(
    db: &Database,
    conversation: &Conversation,
    viewer: UserId,
) -> Result<Option<ActivityPreview>> {
    match db.last_visible_item(conversation.id, viewer)? {
        Some(item) => {
            db.set_last_activity(conversation.id, item.created_at())?;
            Ok(Some(format_activity_preview(&item, viewer)))
        }
        None => Ok(None),
    }
}
