use crate::challenges::{ChallengeCoordinator, ChallengeId, ChallengeState};
use crate::clock::{ClockTag, TurnClock};
use crate::config::EngineConfig;
use crate::error::{LobbyError, StoreError};
use crate::game::{Board, GameSession, Mark, Outcome, SessionId, SessionState};
use crate::identity::IdentityStore;
use crate::intent::Intent;
use crate::notice::Notice;
use crate::player::{AccountId, PlayerHandle};
use crate::registry::MatchRegistry;
use crate::transport::{MessageHandle, Transport};
use crate::validation::display_name_or_fallback;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Everything that lives outside a single game: the waiting room, pending
/// challenges and which player sits in which session.
#[derive(Debug, Default)]
struct Lobby {
    registry: MatchRegistry,
    challenges: ChallengeCoordinator,
    seated: HashMap<AccountId, SessionId>,
}

impl Lobby {
    fn is_engaged(&self, player: AccountId) -> bool {
        self.seated.contains_key(&player) || self.challenges.pending_for(player).is_some()
    }
}

/// Game plus clocks, mutated only under the slot mutex.
#[derive(Debug)]
struct SessionSlot {
    game: GameSession,
    clock: TurnClock,
    /// Runs out the challenger's symbol choice; gone once the game starts.
    symbol_deadline: Option<JoinHandle<()>>,
}

struct SessionEntry {
    slot: Mutex<SessionSlot>,
    /// Board message per player: sent once, edited afterwards. The async
    /// lock keeps edits for one session in order.
    boards: tokio::sync::Mutex<HashMap<AccountId, MessageHandle>>,
}

/// Side effects collected under the locks and delivered after they are
/// released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outbound {
    Notify { to: AccountId, notice: Notice },
    RefreshBoard { session_id: SessionId, player: AccountId },
    Delete(MessageHandle),
}

impl Outbound {
    fn notify(to: AccountId, notice: Notice) -> Outbound {
        Outbound::Notify { to, notice }
    }
}

/// Read-only view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub players: [PlayerHandle; 2],
    pub marks: [Option<Mark>; 2],
    pub board: Board,
    pub state: SessionState,
    pub turn: AccountId,
    pub clock_generation: u64,
    pub clock_armed: bool,
}

/// Owns the lobby and every active session. Cheap to clone; clones share
/// state.
#[derive(Clone)]
pub struct SessionManager {
    config: EngineConfig,
    transport: Arc<dyn Transport>,
    identity: Arc<dyn IdentityStore>,
    lobby: Arc<Mutex<Lobby>>,
    sessions: Arc<RwLock<HashMap<SessionId, Arc<SessionEntry>>>>,
}

impl SessionManager {
    pub fn new(config: EngineConfig, transport: Arc<dyn Transport>, identity: Arc<dyn IdentityStore>) -> Self {
        SessionManager {
            config,
            transport,
            identity,
            lobby: Arc::new(Mutex::new(Lobby::default())),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Single entry point for inbound intents. Rejections reach the player
    /// as a notice; nothing is returned to the caller.
    #[instrument(skip(self, player), fields(player = player.id))]
    pub async fn handle(&self, player: PlayerHandle, intent: Intent) {
        let player = PlayerHandle::new(player.id, display_name_or_fallback(&player.name));
        let effects = match self.route(&player, intent) {
            Ok(effects) => effects,
            Err(error) => {
                debug!(%error, "intent rejected");
                let waiting = self.is_waiting(player.id);
                vec![Outbound::notify(player.id, Notice::Rejected { error, waiting })]
            }
        };
        self.dispatch(effects).await;
    }

    fn route(&self, player: &PlayerHandle, intent: Intent) -> Result<Vec<Outbound>, LobbyError> {
        match intent {
            Intent::Start => Ok(self.start(player)),
            Intent::JoinWaiting => self.join_waiting(player),
            Intent::LeaveWaiting => self.leave_waiting(player),
            Intent::ListPlayers => self.list_players(player),
            Intent::IssueChallenge { target } => self.issue_challenge(player, target),
            Intent::ConfirmChallenge => self.confirm_challenge(player),
            Intent::DenyChallenge => self.deny_challenge(player),
            Intent::ChooseSymbol { mark } => self.after_symbol_chosen(player, mark),
            Intent::MakeMove { cell } => self.on_move_intent(player, cell),
            Intent::SearchPlayerById { short_id } => self.search(player, &short_id),
        }
    }

    fn lock_lobby(&self) -> Result<MutexGuard<'_, Lobby>, LobbyError> {
        self.lobby.lock().map_err(|_| LobbyError::LockError)
    }

    fn entry(&self, session_id: SessionId) -> Option<Arc<SessionEntry>> {
        self.sessions.read().ok()?.get(&session_id).cloned()
    }

    fn start(&self, player: &PlayerHandle) -> Vec<Outbound> {
        let short_id = match self.identity.resolve_or_create(player.id, &player.name) {
            Ok(short_id) => Some(short_id),
            Err(err) => {
                warn!(player = player.id, %err, "identity store unavailable");
                None
            }
        };
        let waiting = self.is_waiting(player.id);
        vec![Outbound::notify(player.id, Notice::MainMenu { waiting, short_id })]
    }

    fn join_waiting(&self, player: &PlayerHandle) -> Result<Vec<Outbound>, LobbyError> {
        let mut lobby = self.lock_lobby()?;
        if lobby.seated.contains_key(&player.id) {
            return Err(LobbyError::Busy);
        }
        if !lobby.registry.contains(player.id) && lobby.challenges.pending_for(player.id).is_some() {
            return Err(LobbyError::Busy);
        }
        lobby.registry.join(player.clone())?;
        info!(player = player.id, waiting = lobby.registry.len(), "joined waiting room");
        Ok(vec![Outbound::notify(player.id, Notice::JoinedWaiting)])
    }

    fn leave_waiting(&self, player: &PlayerHandle) -> Result<Vec<Outbound>, LobbyError> {
        let mut lobby = self.lock_lobby()?;
        if lobby.registry.contains(player.id) && lobby.challenges.pending_for(player.id).is_some() {
            return Err(LobbyError::Busy);
        }
        lobby.registry.leave(player.id)?;
        info!(player = player.id, waiting = lobby.registry.len(), "left waiting room");
        Ok(vec![Outbound::notify(player.id, Notice::LeftWaiting)])
    }

    fn list_players(&self, player: &PlayerHandle) -> Result<Vec<Outbound>, LobbyError> {
        let lobby = self.lock_lobby()?;
        let others = lobby.registry.list(player.id, |id| lobby.is_engaged(id));
        let notice = if others.is_empty() {
            Notice::WaitingRoomEmpty { waiting: lobby.registry.contains(player.id) }
        } else {
            Notice::PlayerList(others)
        };
        Ok(vec![Outbound::notify(player.id, notice)])
    }

    fn issue_challenge(&self, player: &PlayerHandle, target: AccountId) -> Result<Vec<Outbound>, LobbyError> {
        let mut guard = self.lock_lobby()?;
        let lobby = &mut *guard;
        if lobby.seated.contains_key(&player.id) {
            return Err(LobbyError::Busy);
        }
        if lobby.seated.contains_key(&target) {
            return Err(LobbyError::TargetUnavailable);
        }
        let mgr = self.clone();
        let challenge = lobby.challenges.issue(
            &lobby.registry,
            player.clone(),
            target,
            self.config.challenge_timeout(),
            move |challenge_id| async move {
                let effects = mgr.challenge_expired(challenge_id);
                mgr.dispatch(effects).await;
            },
        )?;
        info!(challenge_id = %challenge.id, challenger = player.id, target_player = target, "challenge issued");
        Ok(vec![
            Outbound::notify(player.id, Notice::ChallengeSent { target: challenge.target.name.clone() }),
            Outbound::notify(target, Notice::ChallengeReceived { challenger: player.name.clone() }),
        ])
    }

    /// Runs from the challenge's expiry task. Does nothing once the challenge
    /// has been answered.
    pub(crate) fn challenge_expired(&self, challenge_id: ChallengeId) -> Vec<Outbound> {
        let Ok(mut guard) = self.lobby.lock() else {
            warn!(%challenge_id, "lobby lock poisoned, expiry dropped");
            return Vec::new();
        };
        let lobby = &mut *guard;
        let Some(challenge) = lobby.challenges.expire(&mut lobby.registry, challenge_id) else {
            debug!(%challenge_id, "expiry after answer ignored");
            return Vec::new();
        };
        info!(%challenge_id, "challenge expired");
        closed_notices(&challenge.challenger, &challenge.target, ChallengeState::Expired)
    }

    fn confirm_challenge(&self, player: &PlayerHandle) -> Result<Vec<Outbound>, LobbyError> {
        let mut guard = self.lock_lobby()?;
        let lobby = &mut *guard;
        let challenge = lobby.challenges.confirm(&mut lobby.registry, player.id)?;
        let session_id = self.create_session(lobby, challenge.challenger.clone(), challenge.target.clone())?;
        info!(challenge_id = %challenge.id, %session_id, "challenge confirmed");

        let (challenger, target) = (challenge.challenger, challenge.target);
        Ok(vec![
            Outbound::notify(challenger.id, Notice::GameStarting { opponent: target.name.clone(), initiated: true }),
            Outbound::notify(target.id, Notice::GameStarting { opponent: challenger.name.clone(), initiated: false }),
            Outbound::notify(challenger.id, Notice::ChooseSymbol),
            Outbound::notify(target.id, Notice::OpponentChoosing { challenger: challenger.name }),
        ])
    }

    fn deny_challenge(&self, player: &PlayerHandle) -> Result<Vec<Outbound>, LobbyError> {
        let mut guard = self.lock_lobby()?;
        let lobby = &mut *guard;
        let challenge = lobby.challenges.deny(&mut lobby.registry, player.id)?;
        info!(challenge_id = %challenge.id, "challenge denied");
        Ok(closed_notices(&challenge.challenger, &challenge.target, ChallengeState::Denied))
    }

    /// New session in AwaitingSymbol. The turn clock starts once a symbol is
    /// chosen; until then only the symbol deadline runs.
    fn create_session(&self, lobby: &mut Lobby, challenger: PlayerHandle, target: PlayerHandle) -> Result<SessionId, LobbyError> {
        let session_id = Uuid::new_v4();
        let (a, b) = (challenger.id, target.id);
        let mgr = self.clone();
        let timeout = self.config.symbol_timeout();
        let symbol_deadline = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let effects = mgr.symbol_deadline_reached(session_id);
            mgr.dispatch(effects).await;
        });
        let entry = Arc::new(SessionEntry {
            slot: Mutex::new(SessionSlot {
                game: GameSession::new(challenger, target),
                clock: TurnClock::new(),
                symbol_deadline: Some(symbol_deadline),
            }),
            boards: tokio::sync::Mutex::new(HashMap::new()),
        });
        let mut sessions = self.sessions.write().map_err(|_| LobbyError::LockError)?;
        sessions.insert(session_id, entry);
        lobby.seated.insert(a, session_id);
        lobby.seated.insert(b, session_id);
        Ok(session_id)
    }

    fn seated_entry(&self, player: AccountId) -> Result<(SessionId, Arc<SessionEntry>), LobbyError> {
        let session_id = self.session_of(player).ok_or(LobbyError::NotInSession)?;
        let entry = self.entry(session_id).ok_or(LobbyError::NotInSession)?;
        Ok((session_id, entry))
    }

    fn after_symbol_chosen(&self, player: &PlayerHandle, mark: Mark) -> Result<Vec<Outbound>, LobbyError> {
        let (session_id, entry) = self.seated_entry(player.id)?;
        let mut slot = entry.slot.lock().map_err(|_| LobbyError::LockError)?;
        slot.game.assign_symbol(player.id, mark)?;
        if let Some(handle) = slot.symbol_deadline.take() {
            handle.abort();
        }
        info!(%session_id, player = player.id, ?mark, "symbol chosen");
        Ok(self.symbols_settled(session_id, &mut slot))
    }

    /// Runs from the symbol deadline task. Picks the challenger's mark at
    /// random unless a choice got there first.
    pub(crate) fn symbol_deadline_reached(&self, session_id: SessionId) -> Vec<Outbound> {
        let Some(entry) = self.entry(session_id) else {
            return Vec::new();
        };
        let Ok(mut slot) = entry.slot.lock() else {
            warn!(%session_id, "session lock poisoned, symbol deadline dropped");
            return Vec::new();
        };
        // The caller is the deadline task; dropping the handle detaches it.
        slot.symbol_deadline.take();
        let Some(mark) = slot.game.force_symbol(&mut rand::thread_rng()) else {
            debug!(%session_id, "symbol deadline after choice ignored");
            return Vec::new();
        };
        let challenger = slot.game.challenger().id;
        info!(%session_id, player = challenger, ?mark, "symbol choice timed out, picked at random");

        let mut effects = vec![Outbound::notify(challenger, Notice::SymbolTimedOut)];
        effects.extend(self.symbols_settled(session_id, &mut slot));
        effects
    }

    /// Announces both marks, shows the board and starts the first turn.
    fn symbols_settled(&self, session_id: SessionId, slot: &mut SessionSlot) -> Vec<Outbound> {
        let mut effects = Vec::new();
        for p in slot.game.get_players().clone() {
            if let Some(mark) = slot.game.mark_of(p.id) {
                effects.push(Outbound::notify(p.id, Notice::SymbolAssigned { mark }));
            }
        }
        effects.extend(board_refresh(session_id, &slot.game));
        self.arm_clock(session_id, slot);
        effects
    }

    fn on_move_intent(&self, player: &PlayerHandle, cell: usize) -> Result<Vec<Outbound>, LobbyError> {
        let (session_id, entry) = self.seated_entry(player.id)?;
        let mut slot = entry.slot.lock().map_err(|_| LobbyError::LockError)?;
        slot.game.apply_move(player.id, cell)?;
        slot.clock.disarm();
        debug!(%session_id, player = player.id, cell, "move applied");

        let mut effects: Vec<Outbound> = slot.clock.take_progress_message().map(Outbound::Delete).into_iter().collect();
        effects.extend(self.after_move(session_id, &mut slot));
        Ok(effects)
    }

    /// Runs from the deadline task. A tag that no longer matches the clock
    /// or a session no longer in progress means a move got there first.
    pub(crate) fn deadline_reached(&self, tag: ClockTag) -> Vec<Outbound> {
        let Some(entry) = self.entry(tag.session_id) else {
            debug!(session_id = %tag.session_id, generation = tag.generation, "deadline for closed session ignored");
            return Vec::new();
        };
        let Ok(mut slot) = entry.slot.lock() else {
            warn!(session_id = %tag.session_id, "session lock poisoned, deadline dropped");
            return Vec::new();
        };
        if slot.game.get_state() != SessionState::InProgress || !slot.clock.mark_fired(tag) {
            debug!(session_id = %tag.session_id, generation = tag.generation, "stale deadline ignored");
            return Vec::new();
        }

        let mover = slot.game.get_turn().clone();
        let Some(cell) = slot.game.force_move(&mut rand::thread_rng()) else {
            return Vec::new();
        };
        info!(session_id = %tag.session_id, generation = tag.generation, player = mover.id, cell, "turn timed out, forced move");

        let mut effects: Vec<Outbound> = slot.clock.take_progress_message().map(Outbound::Delete).into_iter().collect();
        effects.push(Outbound::notify(mover.id, Notice::TimedOut { was_your_turn: true }));
        if let Some(opponent) = slot.game.opponent_of(mover.id) {
            effects.push(Outbound::notify(opponent.id, Notice::TimedOut { was_your_turn: false }));
        }
        effects.extend(self.after_move(tag.session_id, &mut slot));
        effects
    }

    /// Post-move evaluation shared by manual and forced moves.
    fn after_move(&self, session_id: SessionId, slot: &mut SessionSlot) -> Vec<Outbound> {
        match slot.game.settle() {
            Some(outcome) => self.finalize(session_id, slot, outcome),
            None => {
                self.arm_clock(session_id, slot);
                board_refresh(session_id, &slot.game)
            }
        }
    }

    fn arm_clock(&self, session_id: SessionId, slot: &mut SessionSlot) {
        let mover = slot.game.get_turn().id;
        let mgr = self.clone();
        let tag = slot.clock.arm(session_id, mover, &self.config, self.transport.clone(), move |tag| async move {
            let effects = mgr.deadline_reached(tag);
            mgr.dispatch(effects).await;
        });
        debug!(%session_id, generation = tag.generation, player = mover, "clock armed");
    }

    /// Ends the session. Only the first call for a session has any effect.
    fn finalize(&self, session_id: SessionId, slot: &mut SessionSlot, outcome: Outcome) -> Vec<Outbound> {
        slot.clock.disarm();
        let mut effects: Vec<Outbound> = slot.clock.take_progress_message().map(Outbound::Delete).into_iter().collect();

        let players = slot.game.get_players().clone();
        {
            let Ok(mut lobby) = self.lobby.lock() else {
                warn!(%session_id, "lobby lock poisoned, session left open");
                return effects;
            };
            let Ok(mut sessions) = self.sessions.write() else {
                warn!(%session_id, "session table lock poisoned, session left open");
                return effects;
            };
            if sessions.remove(&session_id).is_none() {
                debug!(%session_id, "session already finalized");
                return effects;
            }
            for p in &players {
                if lobby.seated.get(&p.id) == Some(&session_id) {
                    lobby.seated.remove(&p.id);
                }
            }
        }

        let board = *slot.game.get_board();
        let announcement = match outcome {
            Outcome::Win(mark) => {
                let name = slot
                    .game
                    .player_with_mark(mark)
                    .map(|p| p.name.clone())
                    .unwrap_or_default();
                info!(%session_id, winner = %name, "session won");
                Notice::Winner { name, board }
            }
            Outcome::Draw => {
                info!(%session_id, "session drawn");
                Notice::Draw { board }
            }
        };
        for p in &players {
            effects.push(Outbound::notify(p.id, announcement.clone()));
        }
        for p in &players {
            effects.push(Outbound::notify(p.id, Notice::BackToMenu));
        }
        effects
    }

    async fn dispatch(&self, effects: Vec<Outbound>) {
        for effect in effects {
            match effect {
                Outbound::Notify { to, notice } => {
                    if let Err(err) = self.transport.send(to, &notice.text(), &notice.keyboard()).await {
                        debug!(recipient = to, %err, "notice not delivered");
                    }
                }
                Outbound::RefreshBoard { session_id, player } => self.refresh_board(session_id, player).await,
                Outbound::Delete(handle) => {
                    if let Err(err) = self.transport.delete(handle).await {
                        debug!(handle, %err, "delete failed");
                    }
                }
            }
        }
    }

    /// Shows the current board to one player, editing their board message
    /// when there is one.
    async fn refresh_board(&self, session_id: SessionId, player: AccountId) {
        let Some(entry) = self.entry(session_id) else {
            return;
        };
        let mut boards = entry.boards.lock().await;
        let notice = {
            let Ok(slot) = entry.slot.lock() else {
                return;
            };
            if slot.game.get_state() != SessionState::InProgress {
                return;
            }
            Notice::Board {
                board: *slot.game.get_board(),
                your_turn: slot.game.get_turn().id == player,
            }
        };
        let (text, keyboard) = (notice.text(), notice.keyboard());

        if let Some(&handle) = boards.get(&player) {
            match self.transport.edit(handle, &text, &keyboard).await {
                Ok(()) => return,
                Err(err) => debug!(%session_id, recipient = player, %err, "board edit failed, sending a new one"),
            }
        }
        match self.transport.send(player, &text, &keyboard).await {
            Ok(handle) => {
                boards.insert(player, handle);
            }
            Err(err) => debug!(%session_id, recipient = player, %err, "board not delivered"),
        }
    }

    fn lookup(&self, short_id: &str) -> Result<Option<(AccountId, String)>, StoreError> {
        let Some(account) = self.identity.lookup_account_by_short_id(short_id)? else {
            return Ok(None);
        };
        Ok(self.identity.lookup_name_by_short_id(short_id)?.map(|name| (account, name)))
    }

    fn search(&self, player: &PlayerHandle, short_id: &str) -> Result<Vec<Outbound>, LobbyError> {
        let (account, name) = match self.lookup(short_id) {
            Ok(Some(hit)) => hit,
            Ok(None) => return Err(LobbyError::PlayerNotFound),
            Err(err) => {
                warn!(%err, "identity lookup failed");
                return Err(LobbyError::PlayerNotFound);
            }
        };
        let lobby = self.lock_lobby()?;
        let available = account != player.id && lobby.registry.contains(account) && !lobby.is_engaged(account);
        let found = PlayerHandle::new(account, name);
        Ok(vec![Outbound::notify(player.id, Notice::PlayerFound { player: found, available })])
    }

    pub fn is_waiting(&self, player: AccountId) -> bool {
        self.lobby.lock().map(|lobby| lobby.registry.contains(player)).unwrap_or(false)
    }

    pub fn has_pending_challenge(&self, player: AccountId) -> bool {
        self.lobby
            .lock()
            .map(|lobby| lobby.challenges.pending_for(player).is_some())
            .unwrap_or(false)
    }

    pub fn session_of(&self, player: AccountId) -> Option<SessionId> {
        self.lobby.lock().ok()?.seated.get(&player).copied()
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn snapshot(&self, session_id: SessionId) -> Option<SessionSnapshot> {
        let entry = self.entry(session_id)?;
        let slot = entry.slot.lock().ok()?;
        let players = slot.game.get_players().clone();
        Some(SessionSnapshot {
            session_id,
            marks: [slot.game.mark_of(players[0].id), slot.game.mark_of(players[1].id)],
            players,
            board: *slot.game.get_board(),
            state: slot.game.get_state(),
            turn: slot.game.get_turn().id,
            clock_generation: slot.clock.generation(),
            clock_armed: slot.clock.is_armed(),
        })
    }
}

fn board_refresh(session_id: SessionId, game: &GameSession) -> Vec<Outbound> {
    game.get_players()
        .iter()
        .map(|p| Outbound::RefreshBoard { session_id, player: p.id })
        .collect()
}

fn closed_notices(challenger: &PlayerHandle, target: &PlayerHandle, state: ChallengeState) -> Vec<Outbound> {
    vec![
        Outbound::notify(challenger.id, Notice::ChallengeClosed { other: target.name.clone(), state }),
        Outbound::notify(target.id, Notice::ChallengeClosed { other: challenger.name.clone(), state }),
    ]
}
