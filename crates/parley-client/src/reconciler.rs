//! Applies the user's event stream to local state.
//!
//! One reconciler runs per connected client. It fetches a snapshot through
//! its [`Backend`] (`Syncing`), then folds every envelope from the user's
//! channel into that snapshot (`Live`). Events that cannot be applied
//! cleanly are discarded; the next explicit fetch repairs the view.

use parley_shared::protocol::{Envelope, ServerEvent};
use parley_shared::types::{ConversationId, UserId};
use parley_shared::views::{ItemRef, TimelineEntry};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::error::{ClientError, Result};
use crate::events::{Applied, EnvelopeWindow, SignalQueue};
use crate::state::{call_needs_ack, ActiveConversation, Inbox, Phase};

pub struct Reconciler<B: Backend> {
    backend: B,
    phase: Phase,
    inbox: Inbox,
    active: Option<ActiveConversation>,
    window: EnvelopeWindow,
    signals: SignalQueue,
}

impl<B: Backend> Reconciler<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            phase: Phase::Disconnected,
            inbox: Inbox::default(),
            active: None,
            window: EnvelopeWindow::default(),
            signals: SignalQueue::new(),
        }
    }

    pub fn user(&self) -> UserId {
        self.backend.user()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    pub fn active(&self) -> Option<&ActiveConversation> {
        self.active.as_ref()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Call signaling received since the last call.
    pub fn take_signals(&mut self) -> Vec<ServerEvent> {
        self.signals.drain(..).collect()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Fetch the conversation list (and the open conversation, if any) and go
    /// live.
    pub async fn sync(&mut self) -> Result<()> {
        self.phase = Phase::Syncing;
        if let Err(e) = self.resync().await {
            self.phase = Phase::Disconnected;
            return Err(e);
        }
        self.phase = Phase::Live;
        info!(user = %self.user(), conversations = self.inbox.rows().len(), "reconciler live");
        Ok(())
    }

    async fn resync(&mut self) -> Result<()> {
        self.refresh_inbox().await?;

        let Some(open) = self.active.as_ref() else {
            return Ok(());
        };
        let scrolled_up = open.scrolled_up;
        let opened = self.backend.open_conversation(open.id).await?;

        let mut active = ActiveConversation::from_opened(opened);
        active.scrolled_up = scrolled_up;
        if scrolled_up {
            let user = self.backend.user();
            active.pending_seen = active.unseen_incoming(user).into_iter().collect();
            active.pending_count = active.pending_seen.len();
        }
        self.active = Some(active);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.phase = Phase::Disconnected;
        debug!(user = %self.user(), "reconciler disconnected");
    }

    /// Full page reload. Counts as reaching the bottom: every unseen item
    /// loaded is acknowledged at once, whatever was pending.
    pub async fn hard_reload(&mut self) -> Result<usize> {
        self.sync().await?;
        if self.active.is_none() {
            return Ok(0);
        }
        self.acknowledge_loaded().await
    }

    // -----------------------------------------------------------------------
    // View actions
    // -----------------------------------------------------------------------

    /// Open `conversation`. A freshly opened view sits at the bottom, so its
    /// unseen items are acknowledged right away.
    pub async fn open(&mut self, conversation: ConversationId) -> Result<()> {
        let opened = self.backend.open_conversation(conversation).await?;
        self.active = Some(ActiveConversation::from_opened(opened));
        self.acknowledge_loaded().await?;
        Ok(())
    }

    pub fn close(&mut self) {
        self.active = None;
    }

    /// Scroll position report from the view. Returns how many items were
    /// acknowledged.
    pub async fn set_scrolled_up(&mut self, scrolled_up: bool) -> Result<usize> {
        if scrolled_up {
            let active = self.active.as_mut().ok_or(ClientError::NoActiveConversation)?;
            active.scrolled_up = true;
            return Ok(0);
        }
        self.reach_bottom().await
    }

    /// The user reached the newest item: flush everything that piled up while
    /// scrolled up.
    pub async fn reach_bottom(&mut self) -> Result<usize> {
        let active = self.active.as_mut().ok_or(ClientError::NoActiveConversation)?;
        active.scrolled_up = false;
        active.pending_count = 0;
        let pending: Vec<_> = std::mem::take(&mut active.pending_seen).into_iter().collect();
        let calls = std::mem::take(&mut active.pending_calls);
        let conversation = active.id;

        for id in &pending {
            self.backend.mark_seen(*id).await?;
            if let Some(message) = active.message_mut(*id) {
                message.is_read = true;
            }
        }
        let mut flushed = pending.len();
        if calls {
            flushed += self.backend.mark_calls_seen(conversation).await?;
        }

        if flushed > 0 {
            debug!(conversation = %conversation, flushed, "pending items acknowledged");
            self.refresh_inbox().await?;
        }
        Ok(flushed)
    }

    /// Fetch the page before the oldest loaded item.
    pub async fn load_older(&mut self) -> Result<usize> {
        let active = self.active.as_mut().ok_or(ClientError::NoActiveConversation)?;
        let Some(cursor) = active.cursor().filter(|_| active.has_more) else {
            return Ok(0);
        };

        let page = self.backend.load_more(active.id, cursor).await?;
        let before = active.timeline.len();
        active.prepend(page);
        Ok(active.timeline.len() - before)
    }

    async fn acknowledge_loaded(&mut self) -> Result<usize> {
        let user = self.backend.user();
        let active = self.active.as_mut().ok_or(ClientError::NoActiveConversation)?;
        active.scrolled_up = false;
        active.pending_seen.clear();
        active.pending_count = 0;
        active.pending_calls = false;

        let unseen = active.unseen_incoming(user);
        for id in &unseen {
            self.backend.mark_seen(*id).await?;
            if let Some(message) = active.message_mut(*id) {
                message.is_read = true;
            }
        }
        let mut acknowledged = unseen.len();
        if active.has_unseen_calls(user) {
            acknowledged += self.backend.mark_calls_seen(active.id).await?;
        }

        if acknowledged > 0 {
            self.refresh_inbox().await?;
        }
        Ok(acknowledged)
    }

    async fn refresh_inbox(&mut self) -> Result<()> {
        let rows = self.backend.list_conversations().await?;
        self.inbox.replace(rows);
        Ok(())
    }

    fn leave_if_active(&mut self, conversation: ConversationId) -> Applied {
        if self.active.as_ref().is_some_and(|a| a.id == conversation) {
            self.active = None;
            info!(conversation = %conversation, "open conversation is gone");
            Applied::LeftConversation
        } else {
            Applied::Updated
        }
    }

    fn active_for(&mut self, conversation: ConversationId) -> Option<&mut ActiveConversation> {
        self.active.as_mut().filter(|a| a.id == conversation)
    }

    // -----------------------------------------------------------------------
    // Event application
    // -----------------------------------------------------------------------

    /// Consume envelopes until the channel closes.
    pub async fn run(&mut self, mut events: mpsc::UnboundedReceiver<Envelope>) {
        while let Some(envelope) = events.recv().await {
            let name = envelope.payload.name();
            match self.apply(envelope).await {
                Ok(applied) => debug!(event = name, ?applied, "event applied"),
                Err(e) => warn!(event = name, error = %e, "failed to apply event"),
            }
        }
        self.disconnect();
    }

    pub async fn apply(&mut self, envelope: Envelope) -> Result<Applied> {
        if self.phase != Phase::Live {
            return Ok(Applied::Discarded);
        }
        match envelope.recipient() {
            Ok(recipient) if recipient == self.user() => {}
            _ => {
                warn!(channel = %envelope.channel, "event for another channel");
                return Ok(Applied::Discarded);
            }
        }
        if !self.window.record(envelope.id) {
            return Ok(Applied::Duplicate);
        }

        let user = self.user();
        match envelope.payload {
            ServerEvent::MessageSent(view) => {
                let conversation = view.conversation_id;
                let id = view.id;
                let incoming = view.sender.id != user;

                if let Some(active) = self.active.as_mut().filter(|a| a.id == conversation) {
                    if active.contains(ItemRef::Message(id)) {
                        return Ok(Applied::Duplicate);
                    }
                    active.upsert(TimelineEntry::Message(view));

                    if incoming && active.scrolled_up {
                        active.pending_seen.insert(id);
                        active.pending_count += 1;
                    } else if incoming {
                        self.backend.mark_seen(id).await?;
                        if let Some(message) = active.message_mut(id) {
                            message.is_read = true;
                        }
                    }
                }
                self.refresh_inbox().await?;
                Ok(Applied::Updated)
            }

            ServerEvent::MessageSeen {
                message_id,
                conversation_id,
            } => {
                self.inbox.mark_read(conversation_id, message_id);
                if let Some(active) = self.active_for(conversation_id) {
                    match active.message_mut(message_id) {
                        Some(message) => message.is_read = true,
                        None => return Ok(Applied::Discarded),
                    }
                }
                Ok(Applied::Updated)
            }

            ServerEvent::MessageUnsent {
                message_id,
                conversation_id,
            } => {
                let mut applied = Applied::Updated;
                if let Some(active) = self.active_for(conversation_id) {
                    match active.message_mut(message_id) {
                        Some(message) => {
                            message.unsent = true;
                            message.content = None;
                            message.attachment = None;
                        }
                        None => applied = Applied::Discarded,
                    }
                }
                self.refresh_inbox().await?;
                Ok(applied)
            }

            ServerEvent::MessageDeleted {
                message_id,
                conversation_id,
                new_last_message,
                ..
            } => {
                if new_last_message.is_none() {
                    self.inbox.remove(conversation_id);
                    return Ok(self.leave_if_active(conversation_id));
                }

                let mut applied = Applied::Updated;
                if let Some(active) = self.active_for(conversation_id) {
                    // Unsent messages stay in place as a placeholder.
                    match active.message_mut(message_id).map(|message| message.unsent) {
                        Some(false) => {
                            active.remove(ItemRef::Message(message_id));
                        }
                        Some(true) => {}
                        None => applied = Applied::Discarded,
                    }
                }
                self.refresh_inbox().await?;
                Ok(applied)
            }

            ServerEvent::ConversationDeleted { conversation_id } => {
                self.inbox.remove(conversation_id);
                Ok(self.leave_if_active(conversation_id))
            }

            ServerEvent::CallHistoryUpdated(snapshot) => {
                let conversation = snapshot.conversation_id;
                let needs_ack = call_needs_ack(&snapshot, user);

                if let Some(active) = self.active.as_mut().filter(|a| a.id == conversation) {
                    let already_pending = active
                        .call(snapshot.id)
                        .is_some_and(|previous| call_needs_ack(previous, user));
                    active.upsert(TimelineEntry::Call(snapshot));

                    if needs_ack && active.scrolled_up {
                        if !already_pending {
                            active.pending_count += 1;
                        }
                        active.pending_calls = true;
                    } else if needs_ack {
                        self.backend.mark_calls_seen(conversation).await?;
                    }
                }
                self.refresh_inbox().await?;
                Ok(Applied::Updated)
            }

            ServerEvent::CallDeleted {
                call_id,
                conversation_id,
                new_last_message,
            } => {
                if new_last_message.is_none() {
                    self.inbox.remove(conversation_id);
                    return Ok(self.leave_if_active(conversation_id));
                }

                let mut applied = Applied::Updated;
                if let Some(active) = self.active_for(conversation_id) {
                    if !active.remove(ItemRef::Call(call_id)) {
                        applied = Applied::Discarded;
                    }
                }
                self.refresh_inbox().await?;
                Ok(applied)
            }

            signal @ (ServerEvent::CallInitiated { .. }
            | ServerEvent::CallAnswered { .. }
            | ServerEvent::CallRejected { .. }
            | ServerEvent::CallEnded { .. }
            | ServerEvent::IceCandidate { .. }) => {
                self.signals.push_back(signal);
                Ok(Applied::Signal)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use parley_engine::{Engine, InProcessHub, ManualClock, MemoryStorage};
    use parley_shared::types::{CallKind, MessageId};
    use parley_store::Database;
    use serde_json::json;

    use super::*;
    use crate::backend::LocalBackend;

    const ADA: UserId = UserId(1);
    const BRIAN: UserId = UserId(2);
    const CLARA: UserId = UserId(3);

    struct Fixture {
        engine: Engine,
        hub: InProcessHub,
        clock: Arc<ManualClock>,
    }

    impl Fixture {
        fn new() -> Self {
            let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
            let db = Database::open_in_memory().unwrap();
            db.upsert_user(ADA, "Ada", None, start).unwrap();
            db.upsert_user(BRIAN, "Brian", None, start).unwrap();
            db.upsert_user(CLARA, "Clara", None, start).unwrap();

            let hub = InProcessHub::new();
            let clock = Arc::new(ManualClock::new(start));
            let engine = Engine::new(db, Arc::new(hub.clone()), Arc::new(MemoryStorage::new()))
                .with_clock(clock.clone());
            Self { engine, hub, clock }
        }

        fn tick(&self) {
            self.clock.advance(chrono::Duration::seconds(1));
        }

        async fn send(&self, text: &str) -> MessageId {
            self.tick();
            self.engine
                .send_message(ADA, BRIAN, Some(text.into()), None)
                .await
                .unwrap()
                .id
        }

        async fn brian(&self) -> (Reconciler<LocalBackend>, mpsc::UnboundedReceiver<Envelope>) {
            let rx = self.hub.subscribe(BRIAN);
            let mut reconciler = Reconciler::new(LocalBackend::new(self.engine.clone(), BRIAN));
            reconciler.sync().await.unwrap();
            (reconciler, rx)
        }
    }

    /// Apply everything queued, including events produced while applying.
    async fn pump(
        reconciler: &mut Reconciler<LocalBackend>,
        rx: &mut mpsc::UnboundedReceiver<Envelope>,
    ) -> Vec<Applied> {
        let mut applied = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            applied.push(reconciler.apply(envelope).await.unwrap());
        }
        applied
    }

    async fn open_first(reconciler: &mut Reconciler<LocalBackend>) -> ConversationId {
        let id = reconciler.inbox().rows()[0].id;
        reconciler.open(id).await.unwrap();
        id
    }

    #[tokio::test]
    async fn events_before_sync_are_discarded() {
        let f = Fixture::new();
        let mut reconciler = Reconciler::new(LocalBackend::new(f.engine.clone(), BRIAN));
        assert_eq!(reconciler.phase(), Phase::Disconnected);

        let envelope = Envelope::new(
            BRIAN,
            ServerEvent::ConversationDeleted {
                conversation_id: ConversationId(1),
            },
        );
        assert_eq!(reconciler.apply(envelope).await.unwrap(), Applied::Discarded);

        f.send("hello").await;
        reconciler.sync().await.unwrap();
        assert_eq!(reconciler.phase(), Phase::Live);
        assert_eq!(reconciler.inbox().rows().len(), 1);
        assert_eq!(reconciler.inbox().unread_total(), 1);
    }

    #[tokio::test]
    async fn scrolled_up_messages_wait_for_the_bottom() {
        let f = Fixture::new();
        f.send("first").await;
        let (mut brian, mut rx) = f.brian().await;
        let conversation = open_first(&mut brian).await;
        assert_eq!(brian.inbox().get(conversation).unwrap().unread_count, 0);

        let mut ada_rx = f.hub.subscribe(ADA);
        brian.set_scrolled_up(true).await.unwrap();
        f.send("second").await;
        f.send("third").await;
        assert_eq!(pump(&mut brian, &mut rx).await, vec![Applied::Updated, Applied::Updated]);

        let active = brian.active().unwrap();
        assert_eq!(active.pending_count, 2);
        assert_eq!(active.timeline.len(), 3);
        assert_eq!(brian.inbox().get(conversation).unwrap().unread_count, 2);
        let seen_events = ada_rx.try_recv();
        assert!(seen_events.is_err(), "nothing may be marked seen while scrolled up");

        assert_eq!(brian.set_scrolled_up(false).await.unwrap(), 2);
        let active = brian.active().unwrap();
        assert_eq!(active.pending_count, 0);
        assert!(active.pending_seen.is_empty());
        assert!(active.unseen_incoming(BRIAN).is_empty());
        assert_eq!(brian.inbox().get(conversation).unwrap().unread_count, 0);

        let mut seen = 0;
        while let Ok(envelope) = ada_rx.try_recv() {
            assert_eq!(envelope.payload.name(), "message.seen");
            seen += 1;
        }
        assert_eq!(seen, 2);
    }

    #[tokio::test]
    async fn messages_at_the_bottom_are_seen_immediately() {
        let f = Fixture::new();
        f.send("first").await;
        let (mut brian, mut rx) = f.brian().await;
        let conversation = open_first(&mut brian).await;

        f.send("second").await;
        pump(&mut brian, &mut rx).await;

        let active = brian.active().unwrap();
        assert_eq!(active.pending_count, 0);
        assert!(active.unseen_incoming(BRIAN).is_empty());
        assert_eq!(brian.inbox().get(conversation).unwrap().unread_count, 0);
    }

    #[tokio::test]
    async fn hard_reload_acknowledges_everything_loaded() {
        let f = Fixture::new();
        f.send("first").await;
        let (mut brian, mut rx) = f.brian().await;
        let conversation = open_first(&mut brian).await;

        brian.set_scrolled_up(true).await.unwrap();
        f.send("second").await;
        pump(&mut brian, &mut rx).await;
        assert_eq!(brian.active().unwrap().pending_count, 1);

        let acknowledged = brian.hard_reload().await.unwrap();
        assert_eq!(acknowledged, 1);
        let active = brian.active().unwrap();
        assert!(!active.scrolled_up);
        assert_eq!(active.pending_count, 0);
        assert_eq!(brian.inbox().get(conversation).unwrap().unread_count, 0);
    }

    #[tokio::test]
    async fn duplicate_delivery_is_ignored() {
        let f = Fixture::new();
        f.send("first").await;
        let (mut brian, mut rx) = f.brian().await;
        open_first(&mut brian).await;

        f.send("second").await;
        let envelope = rx.try_recv().unwrap();
        assert_eq!(brian.apply(envelope.clone()).await.unwrap(), Applied::Updated);
        assert_eq!(brian.apply(envelope).await.unwrap(), Applied::Duplicate);
        assert_eq!(brian.active().unwrap().timeline.len(), 2);
    }

    #[tokio::test]
    async fn unknown_items_are_discarded() {
        let f = Fixture::new();
        f.send("first").await;
        let (mut brian, _rx) = f.brian().await;
        let conversation = open_first(&mut brian).await;

        let stray = Envelope::new(
            BRIAN,
            ServerEvent::MessageSeen {
                message_id: MessageId(999),
                conversation_id: conversation,
            },
        );
        assert_eq!(brian.apply(stray).await.unwrap(), Applied::Discarded);

        let foreign = Envelope::new(ADA, ServerEvent::ConversationDeleted { conversation_id: conversation });
        assert_eq!(brian.apply(foreign).await.unwrap(), Applied::Discarded);
        assert!(brian.active().is_some());
    }

    #[tokio::test]
    async fn deleting_the_last_item_elsewhere_leaves_the_view() {
        let f = Fixture::new();
        let only = f.send("only").await;
        let (mut brian, mut rx) = f.brian().await;
        let conversation = open_first(&mut brian).await;

        // Same user, another device.
        f.engine.delete_for_me(BRIAN, only).await.unwrap();
        assert_eq!(pump(&mut brian, &mut rx).await, vec![Applied::LeftConversation]);
        assert!(brian.active().is_none());
        assert!(brian.inbox().get(conversation).is_none());
    }

    #[tokio::test]
    async fn deleting_an_older_last_item_updates_preview() {
        let f = Fixture::new();
        f.send("older").await;
        let newer = f.send("newer").await;
        let (mut brian, mut rx) = f.brian().await;
        let conversation = open_first(&mut brian).await;

        f.engine.delete_for_me(BRIAN, newer).await.unwrap();
        assert_eq!(pump(&mut brian, &mut rx).await, vec![Applied::Updated]);

        let active = brian.active().unwrap();
        assert_eq!(active.timeline.len(), 1);
        let preview = brian.inbox().get(conversation).unwrap().last_message.clone().unwrap();
        assert_eq!(preview.content, "older");
    }

    #[tokio::test]
    async fn inbox_follows_activity_order_after_a_deletion() {
        let f = Fixture::new();
        f.send("older").await;
        f.tick();
        f.engine
            .send_message(CLARA, BRIAN, Some("from clara".into()), None)
            .await
            .unwrap();
        let newest = f.send("newest").await;
        let (mut brian, mut rx) = f.brian().await;
        let with_ada = brian.inbox().rows()[0].id;
        brian.open(with_ada).await.unwrap();

        f.engine.delete_for_me(BRIAN, newest).await.unwrap();
        assert_eq!(pump(&mut brian, &mut rx).await, vec![Applied::Updated]);

        let expected = f.engine.list_conversations(BRIAN).await.unwrap();
        assert_eq!(brian.inbox().rows(), expected.as_slice());
        assert_eq!(brian.inbox().rows()[1].id, with_ada);
        let preview = brian.inbox().get(with_ada).unwrap().last_message.clone().unwrap();
        assert_eq!(preview.content, "older");
    }

    #[tokio::test]
    async fn deletion_of_an_unloaded_message_is_discarded() {
        let f = Fixture::new();
        let first = f.send("first").await;
        let (mut brian, _rx) = f.brian().await;
        let conversation = open_first(&mut brian).await;
        let preview = brian.inbox().get(conversation).unwrap().last_message.clone().unwrap();
        assert_eq!(preview.item, ItemRef::Message(first));

        let stray = Envelope::new(
            BRIAN,
            ServerEvent::MessageDeleted {
                message_id: MessageId(999),
                conversation_id: conversation,
                actor: BRIAN,
                new_last_message: Some(preview),
            },
        );
        assert_eq!(brian.apply(stray).await.unwrap(), Applied::Discarded);
        assert_eq!(brian.active().unwrap().timeline.len(), 1);
        assert!(brian.inbox().get(conversation).is_some());
    }

    #[tokio::test]
    async fn conversation_deleted_leaves_the_view() {
        let f = Fixture::new();
        f.send("hi").await;
        let (mut brian, mut rx) = f.brian().await;
        let conversation = open_first(&mut brian).await;

        f.engine.delete_conversation(BRIAN, conversation).await.unwrap();
        assert_eq!(pump(&mut brian, &mut rx).await, vec![Applied::LeftConversation]);
        assert!(brian.active().is_none());
        assert!(brian.inbox().rows().is_empty());
    }

    #[tokio::test]
    async fn unsend_masks_the_local_copy() {
        let f = Fixture::new();
        let oops = f.send("oops").await;
        let (mut brian, mut rx) = f.brian().await;
        open_first(&mut brian).await;

        f.engine.unsend(ADA, oops).await.unwrap();
        let applied = pump(&mut brian, &mut rx).await;
        assert_eq!(applied, vec![Applied::Updated, Applied::Updated]);

        let active = brian.active().unwrap();
        assert_eq!(active.timeline.len(), 1);
        match &active.timeline[0] {
            TimelineEntry::Message(m) => {
                assert!(m.unsent);
                assert!(m.content.is_none());
            }
            other => panic!("unexpected entry {other:?}"),
        }
    }

    #[tokio::test]
    async fn call_signals_are_queued() {
        let f = Fixture::new();
        let (mut brian, mut rx) = f.brian().await;

        f.engine
            .initiate_call(ADA, BRIAN, CallKind::Video, json!({ "sdp": "v=0" }))
            .await
            .unwrap();
        assert_eq!(
            pump(&mut brian, &mut rx).await,
            vec![Applied::Signal, Applied::Updated]
        );

        let signals = brian.take_signals();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].name(), "call.initiated");
        assert!(brian.take_signals().is_empty());
        assert_eq!(brian.inbox().rows().len(), 1);
    }

    #[tokio::test]
    async fn missed_call_in_open_view_is_acknowledged() {
        let f = Fixture::new();
        f.send("call you later").await;
        let (mut brian, mut rx) = f.brian().await;
        let conversation = open_first(&mut brian).await;

        f.tick();
        let call = f
            .engine
            .initiate_call(ADA, BRIAN, CallKind::Audio, json!({}))
            .await
            .unwrap();
        f.engine.mark_missed(BRIAN, call.id).await.unwrap();
        pump(&mut brian, &mut rx).await;

        let active = brian.active().unwrap();
        assert!(!active.has_unseen_calls(BRIAN));
        assert_eq!(brian.inbox().get(conversation).unwrap().unread_count, 0);
    }

    #[tokio::test]
    async fn call_missed_while_scrolled_up_is_counted_once() {
        let f = Fixture::new();
        f.send("call you later").await;
        let (mut brian, mut rx) = f.brian().await;
        let conversation = open_first(&mut brian).await;
        brian.set_scrolled_up(true).await.unwrap();

        f.tick();
        let call = f
            .engine
            .initiate_call(ADA, BRIAN, CallKind::Audio, json!({}))
            .await
            .unwrap();
        pump(&mut brian, &mut rx).await;
        let active = brian.active().unwrap();
        assert_eq!(active.pending_count, 0);
        assert!(!active.pending_calls);

        f.engine.mark_missed(BRIAN, call.id).await.unwrap();
        pump(&mut brian, &mut rx).await;
        let active = brian.active().unwrap();
        assert_eq!(active.pending_count, 1);
        assert!(active.pending_calls);
        assert!(active.has_unseen_calls(BRIAN));

        let missed = active.call(call.id).cloned().unwrap();
        let again = Envelope::new(BRIAN, ServerEvent::CallHistoryUpdated(missed));
        brian.apply(again).await.unwrap();
        assert_eq!(brian.active().unwrap().pending_count, 1);

        assert_eq!(brian.set_scrolled_up(false).await.unwrap(), 1);
        pump(&mut brian, &mut rx).await;
        let active = brian.active().unwrap();
        assert_eq!(active.pending_count, 0);
        assert!(!active.has_unseen_calls(BRIAN));
        assert_eq!(brian.inbox().get(conversation).unwrap().unread_count, 0);
    }

    #[tokio::test]
    async fn older_pages_are_prepended() {
        let f = Fixture::new();
        let engine = f.engine.clone().with_config(parley_engine::EngineConfig {
            page_size: 2,
            ..Default::default()
        });
        for text in ["a", "b", "c"] {
            f.send(text).await;
        }

        let mut brian = Reconciler::new(LocalBackend::new(engine, BRIAN));
        brian.sync().await.unwrap();
        open_first(&mut brian).await;
        assert_eq!(brian.active().unwrap().timeline.len(), 2);

        assert_eq!(brian.load_older().await.unwrap(), 1);
        let active = brian.active().unwrap();
        assert_eq!(active.timeline.len(), 3);
        assert!(!active.has_more);
        assert_eq!(brian.load_older().await.unwrap(), 0);
    }
}
