use serde::{Deserialize, Serialize};

/// Numeric account id assigned by the messaging platform.
pub type AccountId = u64;

/// A player as seen by the engine: stable account id plus the name shown to
/// other players.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerHandle {
    pub id: AccountId,
    pub name: String,
}

impl PlayerHandle {
    pub fn new(id: AccountId, name: impl Into<String>) -> PlayerHandle {
        PlayerHandle { id, name: name.into() }
    }
}
