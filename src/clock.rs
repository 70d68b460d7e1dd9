use crate::config::EngineConfig;
use crate::game::SessionId;
use crate::notice::Notice;
use crate::player::AccountId;
use crate::transport::{MessageHandle, Transport};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Identifies one armed instance of a session's clock. A firing whose
/// generation no longer matches the clock is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClockTag {
    pub session_id: SessionId,
    pub generation: u64,
}

/// Countdown message of one turn-slot. Once the slot is cancelled, a message
/// that is still on its way gets deleted by the task that sent it.
#[derive(Debug, Default)]
struct Progress {
    handle: Option<MessageHandle>,
    cancelled: bool,
}

/// Per-session turn timer: one deadline task and one countdown task, both
/// tagged with the current generation.
#[derive(Debug, Default)]
pub struct TurnClock {
    generation: u64,
    deadline_task: Option<JoinHandle<()>>,
    countdown_task: Option<JoinHandle<()>>,
    progress: Arc<Mutex<Progress>>,
}

impl TurnClock {
    pub fn new() -> Self {
        TurnClock::default()
    }

    /// Start a fresh turn-slot for `player`, cancelling whatever was armed
    /// before. `on_deadline` runs once the turn limit elapses unless the
    /// clock is disarmed or re-armed first.
    pub fn arm<F, Fut>(
        &mut self,
        session_id: SessionId,
        player: AccountId,
        config: &EngineConfig,
        transport: Arc<dyn Transport>,
        on_deadline: F,
    ) -> ClockTag
    where
        F: FnOnce(ClockTag) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel_tasks();
        self.generation += 1;
        let tag = ClockTag { session_id, generation: self.generation };

        let limit = config.turn_limit();
        self.deadline_task = Some(tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            on_deadline(tag).await;
        }));

        self.progress = Arc::new(Mutex::new(Progress::default()));
        self.countdown_task = Some(tokio::spawn(run_countdown(
            transport,
            player,
            tag,
            config.countdown_delay(),
            config.countdown_ticks,
            self.progress.clone(),
        )));
        tag
    }

    /// Cancel both tasks and invalidate any firing already in flight. Safe to
    /// call on a clock that is not armed.
    pub fn disarm(&mut self) {
        self.cancel_tasks();
        self.generation += 1;
    }

    /// Called from the deadline task itself. Returns false for a stale tag.
    /// The deadline handle is dropped rather than aborted since the caller is
    /// that very task.
    pub fn mark_fired(&mut self, tag: ClockTag) -> bool {
        if tag.generation != self.generation || self.deadline_task.is_none() {
            return false;
        }
        self.deadline_task.take();
        if let Some(handle) = self.countdown_task.take() {
            handle.abort();
        }
        self.lock_progress().cancelled = true;
        true
    }

    /// Hands over the countdown message of the last armed slot, if one was
    /// sent, so the caller can remove it.
    pub fn take_progress_message(&mut self) -> Option<MessageHandle> {
        self.lock_progress().handle.take()
    }

    fn lock_progress(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel_tasks(&mut self) {
        if let Some(handle) = self.deadline_task.take() {
            handle.abort();
        }
        if let Some(handle) = self.countdown_task.take() {
            handle.abort();
        }
        self.lock_progress().cancelled = true;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_armed(&self) -> bool {
        self.deadline_task.is_some()
    }
}

impl Drop for TurnClock {
    fn drop(&mut self) {
        self.cancel_tasks();
    }
}

/// Waits out the quiet part of the turn, then posts one progress message and
/// edits it once a second. Delivery failures only get logged.
async fn run_countdown(
    transport: Arc<dyn Transport>,
    player: AccountId,
    tag: ClockTag,
    delay: Duration,
    ticks: u32,
    progress: Arc<Mutex<Progress>>,
) {
    tokio::time::sleep(delay).await;
    let mut handle: Option<MessageHandle> = None;
    for remaining in (1..=ticks).rev() {
        let text = Notice::Countdown { remaining }.text();
        match handle {
            Some(h) => {
                if let Err(err) = transport.edit(h, &text, &[]).await {
                    debug!(session_id = %tag.session_id, generation = tag.generation, %err, "countdown edit failed");
                }
            }
            None => {
                // Detached so an abort cannot lose a message already on its way.
                let post = tokio::spawn(post_countdown(transport.clone(), player, tag, text, progress.clone()));
                handle = post.await.ok().flatten();
            }
        }
        if remaining > 1 {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

async fn post_countdown(
    transport: Arc<dyn Transport>,
    player: AccountId,
    tag: ClockTag,
    text: String,
    progress: Arc<Mutex<Progress>>,
) -> Option<MessageHandle> {
    let handle = match transport.send(player, &text, &[]).await {
        Ok(handle) => handle,
        Err(err) => {
            debug!(session_id = %tag.session_id, generation = tag.generation, %err, "countdown send failed");
            return None;
        }
    };
    let cancelled = {
        let mut progress = progress.lock().unwrap_or_else(PoisonError::into_inner);
        if !progress.cancelled {
            progress.handle = Some(handle);
        }
        progress.cancelled
    };
    if !cancelled {
        return Some(handle);
    }
    debug!(session_id = %tag.session_id, generation = tag.generation, "countdown outlived its turn, removing");
    if let Err(err) = transport.delete(handle).await {
        debug!(session_id = %tag.session_id, generation = tag.generation, %err, "countdown delete failed");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::{Choice, Mailbox};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use uuid::Uuid;

    fn recorder() -> (Arc<AtomicUsize>, Arc<AtomicU64>) {
        (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicU64::new(0)))
    }

    fn arm_recording(
        clock: &mut TurnClock,
        session_id: SessionId,
        mailbox: Arc<Mailbox>,
        fired: Arc<AtomicUsize>,
        last_generation: Arc<AtomicU64>,
    ) -> ClockTag {
        clock.arm(session_id, 1, &EngineConfig::default(), mailbox, move |tag| async move {
            fired.fetch_add(1, Ordering::SeqCst);
            last_generation.store(tag.generation, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires_once_with_tag() {
        let mailbox = Arc::new(Mailbox::new());
        let mut clock = TurnClock::new();
        let (fired, last) = recorder();
        let session_id = Uuid::new_v4();

        let tag = arm_recording(&mut clock, session_id, mailbox, fired.clone(), last.clone());
        assert_eq!(tag.generation, 1);
        assert!(clock.is_armed());

        tokio::time::sleep(Duration::from_secs(19)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(last.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_cancels_and_bumps_generation() {
        let mailbox = Arc::new(Mailbox::new());
        let mut clock = TurnClock::new();
        let (fired, last) = recorder();

        arm_recording(&mut clock, Uuid::new_v4(), mailbox.clone(), fired.clone(), last);
        clock.disarm();
        assert_eq!(clock.generation(), 2);
        assert!(!clock.is_armed());

        // idempotent
        clock.disarm();
        assert!(!clock.is_armed());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(mailbox.messages_for(1).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_supersedes_previous_slot() {
        let mailbox = Arc::new(Mailbox::new());
        let mut clock = TurnClock::new();
        let (fired, last) = recorder();
        let session_id = Uuid::new_v4();

        let first = arm_recording(&mut clock, session_id, mailbox.clone(), fired.clone(), last.clone());
        tokio::time::sleep(Duration::from_secs(10)).await;
        let second = arm_recording(&mut clock, session_id, mailbox, fired.clone(), last.clone());
        assert!(second.generation > first.generation);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(last.load(Ordering::SeqCst), second.generation);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_sends_once_then_edits() {
        let mailbox = Arc::new(Mailbox::new());
        let mut clock = TurnClock::new();
        let (fired, last) = recorder();
        arm_recording(&mut clock, Uuid::new_v4(), mailbox.clone(), fired, last);

        tokio::time::sleep(Duration::from_millis(11_500)).await;
        assert!(mailbox.messages_for(1).is_empty());

        tokio::time::sleep(Duration::from_secs(1)).await;
        let msgs = mailbox.messages_for(1);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].text, "You have 7 seconds left!");

        tokio::time::sleep(Duration::from_secs(7)).await;
        let msgs = mailbox.messages_for(1);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].text, "You have 1 second left!");
        assert_eq!(msgs[0].edits, 6);
        assert_eq!(clock.take_progress_message(), Some(msgs[0].handle));
        assert_eq!(clock.take_progress_message(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_failure_does_not_stop_deadline() {
        let mailbox = Arc::new(Mailbox::new());
        mailbox.set_unreachable(1, true);
        let mut clock = TurnClock::new();
        let (fired, last) = recorder();
        arm_recording(&mut clock, Uuid::new_v4(), mailbox, fired.clone(), last);

        tokio::time::sleep(Duration::from_secs(21)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mark_fired_rejects_stale_tag() {
        let mailbox = Arc::new(Mailbox::new());
        let mut clock = TurnClock::new();
        let (fired, last) = recorder();
        let session_id = Uuid::new_v4();

        let old = arm_recording(&mut clock, session_id, mailbox.clone(), fired.clone(), last.clone());
        let current = arm_recording(&mut clock, session_id, mailbox, fired, last);

        assert!(!clock.mark_fired(old));
        assert!(clock.is_armed());
        assert!(clock.mark_fired(current));
        assert!(!clock.is_armed());
        // a second firing of the same tag finds nothing armed
        assert!(!clock.mark_fired(current));
    }

    /// Delivers through a mailbox after a fixed delay on every send.
    struct SlowSend {
        inner: Arc<Mailbox>,
        delay: Duration,
    }

    #[async_trait]
    impl Transport for SlowSend {
        async fn send(&self, recipient: AccountId, text: &str, choices: &[Vec<Choice>]) -> Result<MessageHandle, TransportError> {
            tokio::time::sleep(self.delay).await;
            self.inner.send(recipient, text, choices).await
        }

        async fn edit(&self, handle: MessageHandle, text: &str, choices: &[Vec<Choice>]) -> Result<(), TransportError> {
            self.inner.edit(handle, text, choices).await
        }

        async fn delete(&self, handle: MessageHandle) -> Result<(), TransportError> {
            self.inner.delete(handle).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_in_flight_when_disarmed_is_removed() {
        let mailbox = Arc::new(Mailbox::new());
        let slow = Arc::new(SlowSend { inner: mailbox.clone(), delay: Duration::from_secs(2) });
        let mut clock = TurnClock::new();
        clock.arm(Uuid::new_v4(), 1, &EngineConfig::default(), slow, |_| async {});

        // the first tick is sent at 12s and lands at 14s
        tokio::time::sleep(Duration::from_secs(13)).await;
        clock.disarm();
        assert_eq!(clock.take_progress_message(), None);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(mailbox.sent_to(1), vec!["You have 7 seconds left!".to_string()]);
        assert!(mailbox.messages_for(1).is_empty());
    }
}
