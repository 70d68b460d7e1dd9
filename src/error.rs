use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Expected, non-fatal conditions raised by lobby and game operations.
/// The `Display` text is what the player is shown.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum LobbyError {
    #[error("You are already in the waiting room.")]
    AlreadyWaiting,
    #[error("You are not in the waiting room.")]
    NotWaiting,
    #[error("The selected player is no longer available.")]
    TargetUnavailable,
    #[error("There is no challenge waiting for your answer.")]
    NoPendingChallenge,
    #[error("It is not your turn!")]
    NotYourTurn,
    #[error("That cell is already taken!")]
    CellOccupied,
    #[error("That cell does not exist.")]
    InvalidCell,
    #[error("You are already busy with another challenge or game.")]
    Busy,
    #[error("Only the player who started the game picks the symbol.")]
    NotChallenger,
    #[error("The symbols have already been chosen.")]
    SymbolAlreadyChosen,
    #[error("The game has not started yet.")]
    NotInProgress,
    #[error("You are not playing a game right now.")]
    NotInSession,
    #[error("No player with that id was found.")]
    PlayerNotFound,
    #[error("Something went wrong, please try again.")]
    LockError,
}

/// Failures reported by a [`Transport`](crate::transport::Transport). The engine
/// logs and ignores all of them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("message {0} does not exist")]
    UnknownMessage(u64),
    #[error("recipient {0} cannot be reached")]
    Unreachable(u64),
}

/// Failures from an identity store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("account id {0} cannot be encoded as a short id")]
    Encoding(u64),
    #[error("internal lock error")]
    LockError,
}

#[cfg(feature = "server")]
impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntest::test_case;

    #[test_case("AlreadyWaiting")]
    #[test_case("NotWaiting")]
    #[test_case("TargetUnavailable")]
    #[test_case("NoPendingChallenge")]
    #[test_case("NotYourTurn")]
    #[test_case("CellOccupied")]
    fn lobby_error_display_is_a_sentence(variant_name: &str) {
        let err = match variant_name {
            "AlreadyWaiting" => LobbyError::AlreadyWaiting,
            "NotWaiting" => LobbyError::NotWaiting,
            "TargetUnavailable" => LobbyError::TargetUnavailable,
            "NoPendingChallenge" => LobbyError::NoPendingChallenge,
            "NotYourTurn" => LobbyError::NotYourTurn,
            "CellOccupied" => LobbyError::CellOccupied,
            _ => unreachable!(),
        };
        let msg = err.to_string();
        assert!(msg.ends_with('.') || msg.ends_with('!'), "LobbyError::{} should read as a sentence, got: {}", variant_name, msg);
    }

    #[test]
    fn lobby_error_serde_roundtrip() {
        let json = serde_json::to_string(&LobbyError::CellOccupied).unwrap();
        let back: LobbyError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, LobbyError::CellOccupied);
    }

    #[test]
    fn transport_error_mentions_handle() {
        assert_eq!(TransportError::UnknownMessage(7).to_string(), "message 7 does not exist");
    }
}
