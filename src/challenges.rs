use crate::error::LobbyError;
use crate::player::{AccountId, PlayerHandle};
use crate::registry::MatchRegistry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub type ChallengeId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeState {
    Pending,
    Confirmed,
    Denied,
    Expired,
}

/// A proposal from one player to another. Lives in the coordinator table only
/// while pending; the terminal state is stamped on the value handed back.
#[derive(Debug)]
pub struct Challenge {
    pub id: ChallengeId,
    pub challenger: PlayerHandle,
    pub target: PlayerHandle,
    pub state: ChallengeState,
    expiry_handle: Option<JoinHandle<()>>,
}

impl Challenge {
    pub fn involves(&self, player: AccountId) -> bool {
        self.challenger.id == player || self.target.id == player
    }
}

/// Confirm/deny handshake between a challenger and a waiting target.
#[derive(Debug, Default)]
pub struct ChallengeCoordinator {
    challenges: HashMap<ChallengeId, Challenge>,
}

impl ChallengeCoordinator {
    pub fn new() -> Self {
        ChallengeCoordinator { challenges: HashMap::new() }
    }

    /// Create a pending challenge and arm its expiry timer. `on_expire` runs
    /// after `timeout` with the challenge id; it is aborted if the challenge
    /// is answered first. Neither player leaves the waiting room yet.
    pub fn issue<F, Fut>(
        &mut self,
        registry: &MatchRegistry,
        challenger: PlayerHandle,
        target: AccountId,
        timeout: Duration,
        on_expire: F,
    ) -> Result<&Challenge, LobbyError>
    where
        F: FnOnce(ChallengeId) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.pending_for(challenger.id).is_some() {
            return Err(LobbyError::Busy);
        }
        if target == challenger.id || self.pending_for(target).is_some() {
            return Err(LobbyError::TargetUnavailable);
        }
        let target = registry.get(target).cloned().ok_or(LobbyError::TargetUnavailable)?;

        let challenge_id = Uuid::new_v4();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            on_expire(challenge_id).await;
        });

        let challenge = self.challenges.entry(challenge_id).or_insert(Challenge {
            id: challenge_id,
            challenger,
            target,
            state: ChallengeState::Pending,
            expiry_handle: Some(handle),
        });
        Ok(&*challenge)
    }

    /// The target accepts. Both players leave the waiting room; the caller
    /// builds the game from the returned challenge.
    pub fn confirm(&mut self, registry: &mut MatchRegistry, target: AccountId) -> Result<Challenge, LobbyError> {
        self.answer(registry, target, ChallengeState::Confirmed)
    }

    /// The target declines. Neither player goes back to the waiting room.
    pub fn deny(&mut self, registry: &mut MatchRegistry, target: AccountId) -> Result<Challenge, LobbyError> {
        self.answer(registry, target, ChallengeState::Denied)
    }

    /// Called by the expiry task. A challenge already answered is gone from
    /// the table, so a late firing finds nothing and returns `None`.
    pub fn expire(&mut self, registry: &mut MatchRegistry, challenge_id: ChallengeId) -> Option<Challenge> {
        let mut challenge = self.challenges.remove(&challenge_id)?;
        // The expiry task is the caller; dropping the handle detaches it.
        challenge.expiry_handle.take();
        challenge.state = ChallengeState::Expired;
        registry.remove(challenge.challenger.id);
        registry.remove(challenge.target.id);
        Some(challenge)
    }

    fn answer(&mut self, registry: &mut MatchRegistry, target: AccountId, outcome: ChallengeState) -> Result<Challenge, LobbyError> {
        let challenge_id = self
            .challenges
            .values()
            .find(|c| c.target.id == target)
            .map(|c| c.id)
            .ok_or(LobbyError::NoPendingChallenge)?;
        let mut challenge = self.challenges.remove(&challenge_id).ok_or(LobbyError::NoPendingChallenge)?;
        if let Some(handle) = challenge.expiry_handle.take() {
            handle.abort();
        }
        challenge.state = outcome;
        registry.remove(challenge.challenger.id);
        registry.remove(challenge.target.id);
        Ok(challenge)
    }

    /// The pending challenge a player takes part in, on either side.
    pub fn pending_for(&self, player: AccountId) -> Option<&Challenge> {
        self.challenges.values().find(|c| c.involves(player))
    }

    pub fn len(&self) -> usize {
        self.challenges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty()
    }
}
