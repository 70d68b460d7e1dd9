use crate::error::LobbyError;
use crate::player::{AccountId, PlayerHandle};

/// The waiting room: players looking for an opponent, kept in join order.
#[derive(Debug, Default)]
pub struct MatchRegistry {
    waiting: Vec<PlayerHandle>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        MatchRegistry { waiting: Vec::new() }
    }

    pub fn join(&mut self, player: PlayerHandle) -> Result<(), LobbyError> {
        if self.contains(player.id) {
            return Err(LobbyError::AlreadyWaiting);
        }
        self.waiting.push(player);
        Ok(())
    }

    pub fn leave(&mut self, player: AccountId) -> Result<(), LobbyError> {
        if self.remove(player).is_none() {
            return Err(LobbyError::NotWaiting);
        }
        Ok(())
    }

    /// Silent removal, used when a handshake takes a player out of the room.
    pub fn remove(&mut self, player: AccountId) -> Option<PlayerHandle> {
        let idx = self.waiting.iter().position(|p| p.id == player)?;
        Some(self.waiting.remove(idx))
    }

    pub fn contains(&self, player: AccountId) -> bool {
        self.waiting.iter().any(|p| p.id == player)
    }

    pub fn get(&self, player: AccountId) -> Option<&PlayerHandle> {
        self.waiting.iter().find(|p| p.id == player)
    }

    /// Snapshot of everyone else in the room, skipping players the caller
    /// reports as engaged.
    pub fn list<F>(&self, excluding: AccountId, is_engaged: F) -> Vec<PlayerHandle>
    where
        F: Fn(AccountId) -> bool,
    {
        self.waiting
            .iter()
            .filter(|p| p.id != excluding && !is_engaged(p.id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}
