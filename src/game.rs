use crate::error::LobbyError;
use crate::player::{AccountId, PlayerHandle};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type SessionId = Uuid;

pub const CELLS: usize = 9;

const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mark {
    Mark1,
    Mark2,
}

impl Mark {
    pub fn other(self) -> Mark {
        match self {
            Mark::Mark1 => Mark::Mark2,
            Mark::Mark2 => Mark::Mark1,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Mark::Mark1 => "\u{274C}",
            Mark::Mark2 => "\u{2B55}",
        }
    }

    pub const ALL: [Mark; 2] = [Mark::Mark1, Mark::Mark2];
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// A cell is either empty or carries one mark.
pub type Board = [Option<Mark>; CELLS];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    AwaitingSymbol,
    InProgress,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "mark", rename_all = "snake_case")]
pub enum Outcome {
    Win(Mark),
    Draw,
}

/// Returns the mark owning a complete line, if any.
pub fn winner_of(board: &Board) -> Option<Mark> {
    LINES.iter().find_map(|&[a, b, c]| match (board[a], board[b], board[c]) {
        (Some(x), Some(y), Some(z)) if x == y && y == z => Some(x),
        _ => None,
    })
}

/// Board and turn state for one two-player game. Seat 0 is always the
/// challenger, who moves first whatever mark they pick.
#[derive(Debug, Clone)]
pub struct GameSession {
    players: [PlayerHandle; 2],
    board: Board,
    turn: usize,
    marks: Option<[Mark; 2]>,
    state: SessionState,
}

impl GameSession {
    pub fn new(challenger: PlayerHandle, opponent: PlayerHandle) -> GameSession {
        GameSession {
            players: [challenger, opponent],
            board: [None; CELLS],
            turn: 0,
            marks: None,
            state: SessionState::AwaitingSymbol,
        }
    }

    pub fn get_state(&self) -> SessionState {
        self.state
    }

    pub fn get_board(&self) -> &Board {
        &self.board
    }

    pub fn get_players(&self) -> &[PlayerHandle; 2] {
        &self.players
    }

    pub fn challenger(&self) -> &PlayerHandle {
        &self.players[0]
    }

    /// The player whose turn-slot is open.
    pub fn get_turn(&self) -> &PlayerHandle {
        &self.players[self.turn]
    }

    pub fn opponent_of(&self, player: AccountId) -> Option<&PlayerHandle> {
        self.seat_of(player).map(|seat| &self.players[1 - seat])
    }

    pub fn mark_of(&self, player: AccountId) -> Option<Mark> {
        let seat = self.seat_of(player)?;
        self.marks.map(|marks| marks[seat])
    }

    pub fn player_with_mark(&self, mark: Mark) -> Option<&PlayerHandle> {
        let marks = self.marks?;
        marks.iter().position(|&m| m == mark).map(|seat| &self.players[seat])
    }

    pub fn empty_cells(&self) -> Vec<usize> {
        (0..CELLS).filter(|&i| self.board[i].is_none()).collect()
    }

    fn seat_of(&self, player: AccountId) -> Option<usize> {
        self.players.iter().position(|p| p.id == player)
    }

    /// Lets the challenger pick a mark. The opponent gets the other one and
    /// the challenger keeps the first turn.
    pub fn assign_symbol(&mut self, initiator: AccountId, choice: Mark) -> Result<(), LobbyError> {
        if self.state != SessionState::AwaitingSymbol {
            return Err(LobbyError::SymbolAlreadyChosen);
        }
        if initiator != self.players[0].id {
            return Err(LobbyError::NotChallenger);
        }
        self.marks = Some([choice, choice.other()]);
        self.turn = 0;
        self.state = SessionState::InProgress;
        Ok(())
    }

    /// Picks a random mark for a challenger who let the choice run out.
    /// Returns `None` once the symbols are already settled.
    pub fn force_symbol<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Mark> {
        let choice = *Mark::ALL.choose(rng)?;
        let challenger = self.challenger().id;
        self.assign_symbol(challenger, choice).ok()?;
        Some(choice)
    }

    pub fn apply_move(&mut self, player: AccountId, cell: usize) -> Result<(), LobbyError> {
        if self.state != SessionState::InProgress {
            return Err(LobbyError::NotInProgress);
        }
        if cell >= CELLS {
            return Err(LobbyError::InvalidCell);
        }
        if player != self.players[self.turn].id {
            return Err(LobbyError::NotYourTurn);
        }
        if self.board[cell].is_some() {
            return Err(LobbyError::CellOccupied);
        }
        self.place(cell);
        Ok(())
    }

    /// Moves for the current player into a random empty cell. Returns the
    /// chosen cell, or `None` when there is nothing to fill.
    pub fn force_move<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<usize> {
        if self.state != SessionState::InProgress {
            return None;
        }
        let cell = *self.empty_cells().choose(rng)?;
        self.place(cell);
        Some(cell)
    }

    fn place(&mut self, cell: usize) {
        let mark = self.marks.map(|marks| marks[self.turn]);
        self.board[cell] = mark;
    }

    pub fn evaluate_winner(&self) -> Option<Mark> {
        winner_of(&self.board)
    }

    pub fn is_draw(&self) -> bool {
        self.evaluate_winner().is_none() && self.board.iter().all(Option::is_some)
    }

    pub fn advance_turn(&mut self) {
        self.turn = 1 - self.turn;
    }

    /// Post-move evaluation shared by manual and forced moves: finishes the
    /// game on a win or draw, otherwise hands the turn over.
    pub fn settle(&mut self) -> Option<Outcome> {
        let outcome = match self.evaluate_winner() {
            Some(mark) => Some(Outcome::Win(mark)),
            None if self.is_draw() => Some(Outcome::Draw),
            None => None,
        };
        match outcome {
            Some(_) => self.state = SessionState::Finished,
            None => self.advance_turn(),
        }
        outcome
    }
}
