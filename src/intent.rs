use crate::game::Mark;
use crate::player::AccountId;
use serde::{Deserialize, Serialize};

/// Everything a player can ask of the engine. The parsing layer turns chat
/// commands and button presses into one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intent {
    Start,
    JoinWaiting,
    LeaveWaiting,
    ListPlayers,
    IssueChallenge { target: AccountId },
    ConfirmChallenge,
    DenyChallenge,
    ChooseSymbol { mark: Mark },
    MakeMove { cell: usize },
    SearchPlayerById { short_id: String },
}
