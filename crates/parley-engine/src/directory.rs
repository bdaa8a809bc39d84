//! User directory and blocking.

use parley_shared::types::UserId;
use parley_shared::views::{BlockedUser, UserSummary};
use tracing::{debug, info};

use crate::engine::{require_user, Engine};
use crate::error::{EngineError, Result};

impl Engine {
    /// Create or refresh the actor's directory entry.
    pub async fn upsert_profile(
        &self,
        actor: UserId,
        name: &str,
        avatar: Option<&str>,
    ) -> Result<UserSummary> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::validation("display name must not be empty"));
        }

        let now = self.now();
        let user = self.atomically(|db| Ok(db.upsert_user(actor, name, avatar, now)?))?;
        info!(user = %actor, "profile updated");
        Ok(user.summary())
    }

    /// Record that `actor` just did something. Unknown actors are ignored.
    pub async fn touch_user(&self, actor: UserId) -> Result<bool> {
        let now = self.now();
        self.atomically(|db| Ok(db.touch_user(actor, now)?))
    }

    pub async fn get_user(&self, id: UserId) -> Result<UserSummary> {
        self.read(|db| {
            require_user(db, id)?;
            Ok(db.user_summary(id)?)
        })
    }

    /// Returns `false` when `user` was already blocked.
    pub async fn block(&self, actor: UserId, user: UserId) -> Result<bool> {
        if actor == user {
            return Err(EngineError::validation("cannot block yourself"));
        }

        let now = self.now();
        let blocked = self.atomically(|db| {
            require_user(db, user)?;
            Ok(db.block_user(actor, user, now)?)
        })?;

        if blocked {
            info!(actor = %actor, blocked = %user, "user blocked");
        } else {
            debug!(actor = %actor, blocked = %user, "already blocked");
        }
        Ok(blocked)
    }

    /// Returns `false` when `user` was not blocked.
    pub async fn unblock(&self, actor: UserId, user: UserId) -> Result<bool> {
        let removed = self.atomically(|db| Ok(db.unblock_user(actor, user)?))?;
        if removed {
            info!(actor = %actor, unblocked = %user, "user unblocked");
        }
        Ok(removed)
    }

    pub async fn list_blocked(&self, actor: UserId) -> Result<Vec<BlockedUser>> {
        self.read(|db| {
            db.blocks_by(actor)?
                .into_iter()
                .map(|block| -> Result<BlockedUser> {
                    Ok(BlockedUser {
                        user: db.user_summary(block.blocked_id)?,
                        blocked_at: block.created_at,
                    })
                })
                .collect()
        })
    }
}
