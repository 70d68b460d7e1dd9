use crate::challenges::ChallengeState;
use crate::error::LobbyError;
use crate::game::{Board, Mark, CELLS};
use crate::intent::Intent;
use crate::player::PlayerHandle;
use crate::transport::{Choice, Keyboard};

const EMPTY_CELL: &str = "\u{2B1C}";

/// Outbound notification, rendered to plain text plus buttons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    MainMenu { waiting: bool, short_id: Option<String> },
    JoinedWaiting,
    LeftWaiting,
    Rejected { error: LobbyError, waiting: bool },
    WaitingRoomEmpty { waiting: bool },
    PlayerList(Vec<PlayerHandle>),
    PlayerFound { player: PlayerHandle, available: bool },
    ChallengeSent { target: String },
    ChallengeReceived { challenger: String },
    ChallengeClosed { other: String, state: ChallengeState },
    GameStarting { opponent: String, initiated: bool },
    ChooseSymbol,
    OpponentChoosing { challenger: String },
    SymbolTimedOut,
    SymbolAssigned { mark: Mark },
    Board { board: Board, your_turn: bool },
    Countdown { remaining: u32 },
    TimedOut { was_your_turn: bool },
    Winner { name: String, board: Board },
    Draw { board: Board },
    BackToMenu,
}

fn menu(waiting: bool) -> Keyboard {
    let room = if waiting {
        Choice::new("Leave the waiting room", Intent::LeaveWaiting)
    } else {
        Choice::new("Go to the waiting room", Intent::JoinWaiting)
    };
    vec![vec![room], vec![Choice::new("Find a player", Intent::ListPlayers)]]
}

/// Three text rows, empty cells shown as white squares.
pub fn render_board(board: &Board) -> String {
    board
        .chunks(3)
        .map(|row| row.iter().map(|c| c.map_or(EMPTY_CELL, Mark::symbol)).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

fn board_keyboard(board: &Board) -> Keyboard {
    (0..CELLS)
        .collect::<Vec<_>>()
        .chunks(3)
        .map(|row| {
            row.iter()
                .map(|&cell| Choice::new(board[cell].map_or(EMPTY_CELL, Mark::symbol), Intent::MakeMove { cell }))
                .collect()
        })
        .collect()
}

impl Notice {
    pub fn text(&self) -> String {
        match self {
            Notice::MainMenu { short_id, .. } => {
                let mut text = "Hi! This is tic-tac-toe. Go to the waiting room or find a player.".to_string();
                if let Some(id) = short_id {
                    text.push_str(&format!("\nYour player id: {}", id));
                }
                text
            }
            Notice::JoinedWaiting => "You joined the waiting room.".to_string(),
            Notice::LeftWaiting => "You left the waiting room.".to_string(),
            Notice::Rejected { error, .. } => error.to_string(),
            Notice::WaitingRoomEmpty { .. } => "The waiting room is empty.".to_string(),
            Notice::PlayerList(_) => "Choose a player to start a game with:".to_string(),
            Notice::PlayerFound { player, available: true } => format!("Found {}.", player.name),
            Notice::PlayerFound { player, available: false } => {
                format!("{} is not looking for a game right now.", player.name)
            }
            Notice::ChallengeSent { target } => format!("Waiting for {} to answer...", target),
            Notice::ChallengeReceived { challenger } => format!("{} invites you to a game.", challenger),
            Notice::ChallengeClosed { other, state } => match state {
                ChallengeState::Expired => format!("The invitation with {} expired.", other),
                _ => format!("The invitation with {} was declined.", other),
            },
            Notice::GameStarting { opponent, initiated: true } => format!("Starting a game with {}.", opponent),
            Notice::GameStarting { opponent, initiated: false } => format!("{} started a game with you.", opponent),
            Notice::ChooseSymbol => "Choose your symbol:".to_string(),
            Notice::OpponentChoosing { challenger } => format!("{} is choosing a symbol...", challenger),
            Notice::SymbolTimedOut => "Time is up! Your symbol was picked at random.".to_string(),
            Notice::SymbolAssigned { mark } => format!("Your symbol is {}.", mark),
            Notice::Board { your_turn: true, .. } => "Your move.".to_string(),
            Notice::Board { your_turn: false, .. } => "Opponent's move.".to_string(),
            Notice::Countdown { remaining: 1 } => "You have 1 second left!".to_string(),
            Notice::Countdown { remaining } => format!("You have {} seconds left!", remaining),
            Notice::TimedOut { was_your_turn: true } => "Time is up! The move passes to your opponent.".to_string(),
            Notice::TimedOut { was_your_turn: false } => {
                "Your opponent did not move in time. Now it is your move.".to_string()
            }
            Notice::Winner { name, board } => format!("{} wins!\n\n{}", name, render_board(board)),
            Notice::Draw { board } => format!("Draw!\n\n{}", render_board(board)),
            Notice::BackToMenu => "You are back in the main menu.".to_string(),
        }
    }

    pub fn keyboard(&self) -> Keyboard {
        match self {
            Notice::MainMenu { waiting, .. } | Notice::WaitingRoomEmpty { waiting } => menu(*waiting),
            Notice::Rejected { error, waiting } => match error {
                LobbyError::AlreadyWaiting | LobbyError::NotWaiting | LobbyError::TargetUnavailable => menu(*waiting),
                _ => Vec::new(),
            },
            Notice::JoinedWaiting => menu(true),
            Notice::LeftWaiting | Notice::BackToMenu | Notice::ChallengeClosed { .. } => menu(false),
            Notice::PlayerList(players) => players
                .iter()
                .map(|p| vec![Choice::new(p.name.clone(), Intent::IssueChallenge { target: p.id })])
                .collect(),
            Notice::PlayerFound { player, available: true } => {
                vec![vec![Choice::new("Invite to a game", Intent::IssueChallenge { target: player.id })]]
            }
            Notice::ChallengeReceived { .. } => vec![vec![
                Choice::new("Accept", Intent::ConfirmChallenge),
                Choice::new("Decline", Intent::DenyChallenge),
            ]],
            Notice::ChooseSymbol => Mark::ALL
                .iter()
                .map(|&mark| vec![Choice::new(mark.symbol(), Intent::ChooseSymbol { mark })])
                .collect(),
            Notice::Board { board, .. } => board_keyboard(board),
            _ => Vec::new(),
        }
    }
}
