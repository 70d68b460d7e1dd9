//! Matchmaking, challenge handshake, turn clock and session engine for
//! two-player tic-tac-toe played through a chat bot.
//!
//! Players meet in a waiting room, challenge one another, and play on a
//! 3x3 board with a 20 second limit per move. When the limit passes, the
//! engine moves into a random empty cell for the player and play goes on.
//!
//! ## Example usage
//! ```
//! use std::sync::Arc;
//! use tictactoe_lobby::{EngineConfig, Intent, Mailbox, MemoryIdentityStore, PlayerHandle, SessionManager};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let mailbox = Arc::new(Mailbox::new());
//! let manager = SessionManager::new(EngineConfig::default(), mailbox.clone(), Arc::new(MemoryIdentityStore::new()));
//!
//! let alice = PlayerHandle::new(1, "Alice");
//! let bob = PlayerHandle::new(2, "Bob");
//! manager.handle(bob.clone(), Intent::JoinWaiting).await;
//! manager.handle(alice.clone(), Intent::IssueChallenge { target: 2 }).await;
//! manager.handle(bob, Intent::ConfirmChallenge).await;
//!
//! assert!(manager.session_of(1).is_some());
//! assert_eq!(mailbox.sent_to(1).last().unwrap(), "Choose your symbol:");
//! # });
//! ```

pub mod challenges;
pub mod clock;
pub mod config;
pub mod error;
pub mod game;
pub mod identity;
pub mod intent;
pub mod notice;
pub mod player;
pub mod registry;
pub mod session_manager;
pub mod transport;
pub mod validation;

#[cfg(feature = "server")]
pub mod http;
#[cfg(feature = "server")]
pub mod sqlite_store;

#[cfg(test)]
mod tests;

pub use challenges::{Challenge, ChallengeCoordinator, ChallengeId, ChallengeState};
pub use clock::{ClockTag, TurnClock};
pub use config::{ConfigError, EngineConfig};
pub use error::{LobbyError, StoreError, TransportError};
pub use game::{Board, GameSession, Mark, Outcome, SessionId, SessionState};
pub use identity::{IdentityStore, MemoryIdentityStore};
pub use intent::Intent;
pub use notice::Notice;
pub use player::{AccountId, PlayerHandle};
pub use registry::MatchRegistry;
pub use session_manager::{SessionManager, SessionSnapshot};
pub use transport::{Choice, Keyboard, Mailbox, MailboxMessage, MessageHandle, Transport};
