use crate::error::TransportError;
use crate::intent::Intent;
use crate::player::AccountId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub type MessageHandle = u64;

/// A button offered under a message. Pressing it sends `intent` back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub label: String,
    pub intent: Intent,
}

impl Choice {
    pub fn new(label: impl Into<String>, intent: Intent) -> Choice {
        Choice { label: label.into(), intent }
    }
}

/// Rows of buttons, rendered top to bottom.
pub type Keyboard = Vec<Vec<Choice>>;

/// Outbound side of the messaging client. Implementations must accept edits
/// and deletes of handles that no longer exist; they may report an error,
/// which the engine ignores.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, recipient: AccountId, text: &str, choices: &[Vec<Choice>]) -> Result<MessageHandle, TransportError>;
    async fn edit(&self, handle: MessageHandle, text: &str, choices: &[Vec<Choice>]) -> Result<(), TransportError>;
    async fn delete(&self, handle: MessageHandle) -> Result<(), TransportError>;
}

/// A message as currently shown in a recipient's chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxMessage {
    pub handle: MessageHandle,
    pub text: String,
    pub choices: Keyboard,
    pub edits: u32,
}

/// Messages kept per recipient, both live and in the sent log.
pub const DEFAULT_MAILBOX_LIMIT: usize = 64;

/// One recipient's chat: live messages by handle and the texts most
/// recently sent.
#[derive(Default)]
struct Chat {
    live: BTreeMap<MessageHandle, MailboxMessage>,
    sent: VecDeque<String>,
}

#[derive(Default)]
struct MailboxInner {
    next_handle: MessageHandle,
    chats: HashMap<AccountId, Chat>,
    owners: HashMap<MessageHandle, AccountId>,
    unreachable: HashSet<AccountId>,
}

/// In-process transport: keeps each recipient's latest messages so they can
/// be polled over HTTP or inspected in tests. Past `limit` messages per
/// recipient the oldest are dropped, as a chat scrolls them away.
pub struct Mailbox {
    limit: usize,
    inner: Mutex<MailboxInner>,
}

impl Default for Mailbox {
    fn default() -> Self {
        Mailbox::with_limit(DEFAULT_MAILBOX_LIMIT)
    }
}

impl Mailbox {
    pub fn new() -> Self {
        Mailbox::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Mailbox {
            limit: limit.max(1),
            inner: Mutex::new(MailboxInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MailboxInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Live messages for a recipient, oldest first.
    pub fn messages_for(&self, recipient: AccountId) -> Vec<MailboxMessage> {
        self.lock()
            .chats
            .get(&recipient)
            .map(|chat| chat.live.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Text of the latest messages sent to a recipient, in order, deleted
    /// ones included. Edits are not.
    pub fn sent_to(&self, recipient: AccountId) -> Vec<String> {
        self.lock()
            .chats
            .get(&recipient)
            .map(|chat| chat.sent.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, handle: MessageHandle) -> Option<MailboxMessage> {
        let inner = self.lock();
        let owner = inner.owners.get(&handle)?;
        inner.chats.get(owner)?.live.get(&handle).cloned()
    }

    /// Make every send to `recipient` fail, as when a user blocks the bot.
    pub fn set_unreachable(&self, recipient: AccountId, unreachable: bool) {
        let mut inner = self.lock();
        if unreachable {
            inner.unreachable.insert(recipient);
        } else {
            inner.unreachable.remove(&recipient);
        }
    }
}

#[async_trait]
impl Transport for Mailbox {
    async fn send(&self, recipient: AccountId, text: &str, choices: &[Vec<Choice>]) -> Result<MessageHandle, TransportError> {
        let mut inner = self.lock();
        if inner.unreachable.contains(&recipient) {
            return Err(TransportError::Unreachable(recipient));
        }
        inner.next_handle += 1;
        let handle = inner.next_handle;
        let message = MailboxMessage {
            handle,
            text: text.to_string(),
            choices: choices.to_vec(),
            edits: 0,
        };

        let chat = inner.chats.entry(recipient).or_default();
        chat.sent.push_back(message.text.clone());
        if chat.sent.len() > self.limit {
            chat.sent.pop_front();
        }
        chat.live.insert(handle, message);
        let evicted = if chat.live.len() > self.limit {
            chat.live.pop_first().map(|(old, _)| old)
        } else {
            None
        };
        if let Some(old) = evicted {
            inner.owners.remove(&old);
        }
        inner.owners.insert(handle, recipient);
        Ok(handle)
    }

    async fn edit(&self, handle: MessageHandle, text: &str, choices: &[Vec<Choice>]) -> Result<(), TransportError> {
        let mut inner = self.lock();
        let inner = &mut *inner;
        let msg = inner
            .owners
            .get(&handle)
            .and_then(|owner| inner.chats.get_mut(owner))
            .and_then(|chat| chat.live.get_mut(&handle))
            .ok_or(TransportError::UnknownMessage(handle))?;
        msg.text = text.to_string();
        msg.choices = choices.to_vec();
        msg.edits += 1;
        Ok(())
    }

    async fn delete(&self, handle: MessageHandle) -> Result<(), TransportError> {
        let mut inner = self.lock();
        let owner = inner.owners.remove(&handle).ok_or(TransportError::UnknownMessage(handle))?;
        inner
            .chats
            .get_mut(&owner)
            .and_then(|chat| chat.live.remove(&handle))
            .map(|_| ())
            .ok_or(TransportError::UnknownMessage(handle))
    }
}
