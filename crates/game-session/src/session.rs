//! The game session controller.
//!
//! `GameSession` owns the live position and the move log and is the only
//! thing that mutates them. Human input (selection, move attempts, promotion
//! choices) and the opponent policy both go through the same apply path,
//! which appends a [`MoveRecord`], rebuilds the replay index, plays a sound
//! and decides whether the opponent moves next.
//!
//! The opponent never moves synchronously. Scheduling issues an
//! [`OpponentTicket`] stamped with the current epoch; whoever drives the
//! session (see `driver`) redeems it with [`GameSession::play_opponent_move`]
//! after the cosmetic delay. Reset and load bump the epoch, so a ticket that
//! outlives its game is ignored.

use std::iter;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chess_core::pgn::write_transcript;
use chess_core::{
    repetition_key, Color, GameStatus, LegalMove, MoveRequest, Role, RulesEngine, RulesError,
    Square,
};
use tracing::{debug, error, info, warn};

use crate::audio::{AudioSink, SoundEvent};
use crate::config::{Difficulty, GameMode, SessionConfig};
use crate::error::{RecordError, ReplayError};
use crate::policy::PriorityPolicy;
use crate::record::{from_record, RestoredGame, SavedRecord};
use crate::replay::{move_pairs, Displayed, Jump, MovePair, MoveRecord, ReplayIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingSelection,
    PieceSelected,
    PromotionPending,
    OpponentThinking,
}

/// The selected square and the legal moves leaving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub square: Square,
    pub destinations: Vec<LegalMove>,
}

/// A promotion move waiting for the player's choice of piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingPromotion {
    pub from: Square,
    pub to: Square,
    pub side: Color,
}

/// Permission for one delayed opponent move, valid for a single epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpponentTicket {
    epoch: u64,
}

impl OpponentTicket {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Why an input was ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    OpponentThinking,
    ViewingHistory,
    GameOver,
    PromotionPending,
    NotYourTurn,
    NotYourPiece,
    NothingSelected,
    NoPromotionPending,
    IllegalDestination,
    Illegal(RulesError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    Selected(Square),
    Rejected(Rejection),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The move was applied; carries its SAN.
    Played(String),
    PromotionPending(PendingPromotion),
    Deselected,
    Reselected(Square),
    Rejected(Rejection),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Select(SelectOutcome),
    Move(MoveOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpponentOutcome {
    Played(String),
    /// The ticket belongs to an earlier epoch or was already used.
    Stale,
    /// History is on screen; the move is re-issued on return to live.
    Deferred,
    NoMove,
    /// The engine refused every legal move. A fresh ticket is pending.
    Failed(RulesError),
}

pub struct GameSession<E: RulesEngine> {
    engine: E,
    config: SessionConfig,
    policy: PriorityPolicy,
    audio: Arc<dyn AudioSink>,

    base: E::Position,
    live: E::Position,
    log: Vec<MoveRecord<E::Position>>,
    replay: ReplayIndex<E::Position>,

    selection: Option<Selection>,
    pending_promotion: Option<PendingPromotion>,
    opponent_thinking: bool,
    pending_ticket: Option<OpponentTicket>,
    epoch: u64,
    created_at: DateTime<Utc>,
}

impl<E: RulesEngine> GameSession<E> {
    pub fn new(engine: E, config: SessionConfig, audio: Arc<dyn AudioSink>) -> Self {
        let base = engine.initial_position();
        let mut session = Self {
            policy: PriorityPolicy::new(config.difficulty),
            live: base.clone(),
            base,
            engine,
            config,
            audio,
            log: Vec::new(),
            replay: ReplayIndex::new(),
            selection: None,
            pending_promotion: None,
            opponent_thinking: false,
            pending_ticket: None,
            epoch: 0,
            created_at: Utc::now(),
        };
        session.schedule_opponent();
        session
    }

    /// Replace the opponent policy, e.g. with a seeded one.
    pub fn with_policy(mut self, policy: PriorityPolicy) -> Self {
        self.config.difficulty = policy.difficulty();
        self.policy = policy;
        self
    }

    // Accessors

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn mode(&self) -> GameMode {
        self.config.mode
    }

    pub fn base_position(&self) -> &E::Position {
        &self.base
    }

    pub fn live_position(&self) -> &E::Position {
        &self.live
    }

    pub fn displayed(&self) -> Displayed {
        self.replay.displayed()
    }

    /// The position the board should show.
    pub fn displayed_position(&self) -> &E::Position {
        self.replay.displayed_position(&self.live)
    }

    pub fn replay(&self) -> &ReplayIndex<E::Position> {
        &self.replay
    }

    pub fn move_log(&self) -> &[MoveRecord<E::Position>] {
        &self.log
    }

    pub fn move_pairs(&self) -> Vec<MovePair<'_, E::Position>> {
        move_pairs(&self.log)
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// Destination squares of the current selection.
    pub fn legal_destinations(&self) -> Vec<Square> {
        self.selection
            .as_ref()
            .map(|s| s.destinations.iter().map(|m| m.to).collect())
            .unwrap_or_default()
    }

    pub fn pending_promotion(&self) -> Option<PendingPromotion> {
        self.pending_promotion
    }

    pub fn is_opponent_thinking(&self) -> bool {
        self.opponent_thinking
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn turn(&self) -> Color {
        self.engine.turn(&self.live)
    }

    pub fn fen(&self) -> String {
        self.engine.to_fen(&self.live)
    }

    /// Movetext of the game, with a FEN header when the base is not the
    /// standard start.
    pub fn transcript(&self) -> String {
        let base_fen = self.engine.to_fen(&self.base);
        let sans: Vec<String> = self.log.iter().map(|r| r.san.clone()).collect();
        write_transcript(Some(&base_fen), &sans)
    }

    /// The move that produced the displayed position.
    pub fn last_move(&self) -> Option<(Square, Square)> {
        let record = match self.replay.displayed() {
            Displayed::Live => self.log.last(),
            Displayed::Ply(i) => self.log.get(i),
        }?;
        Some((record.request.from, record.request.to))
    }

    pub fn can_navigate_back(&self) -> bool {
        self.replay.can_navigate_back()
    }

    pub fn can_navigate_forward(&self) -> bool {
        self.replay.can_navigate_forward()
    }

    pub fn phase(&self) -> Phase {
        if self.opponent_thinking {
            Phase::OpponentThinking
        } else if self.pending_promotion.is_some() {
            Phase::PromotionPending
        } else if self.selection.is_some() {
            Phase::PieceSelected
        } else {
            Phase::AwaitingSelection
        }
    }

    /// Game status of the live position, including threefold repetition.
    pub fn status(&self) -> GameStatus {
        match self.engine.status(&self.live) {
            GameStatus::Playing if self.is_threefold_repetition() => GameStatus::Draw,
            status => status,
        }
    }

    pub fn is_game_over(&self) -> bool {
        self.status().is_over()
    }

    fn is_threefold_repetition(&self) -> bool {
        let key = repetition_key(&self.engine.to_fen(&self.live));
        let occurrences = iter::once(&self.base)
            .chain(self.log.iter().map(|r| &r.position))
            .filter(|p| repetition_key(&self.engine.to_fen(p)) == key)
            .count();
        occurrences >= 3
    }

    pub fn status_text(&self) -> String {
        let turn = self.turn();
        let policy_side = self.config.policy_side();
        match self.status() {
            GameStatus::Checkmate => {
                let winner = turn.other();
                match policy_side {
                    Some(side) if side == winner => "AI wins!".to_string(),
                    Some(_) => "You win!".to_string(),
                    None => format!("Checkmate! {} wins!", side_name(winner)),
                }
            }
            GameStatus::Stalemate => "Stalemate! Game is a draw.".to_string(),
            GameStatus::Draw => "Draw!".to_string(),
            GameStatus::Playing if self.engine.is_check(&self.live) => match policy_side {
                Some(side) if side == turn => "AI is in check!".to_string(),
                Some(_) => "You are in check!".to_string(),
                None => format!("{} is in check!", side_name(turn)),
            },
            GameStatus::Playing if self.opponent_thinking => "AI is thinking...".to_string(),
            GameStatus::Playing => "Game in progress".to_string(),
        }
    }

    pub fn turn_text(&self) -> String {
        let turn = self.turn();
        match self.config.policy_side() {
            Some(side) if side == turn => "AI turn".to_string(),
            Some(_) => "Your turn".to_string(),
            None => side_name(turn).to_string(),
        }
    }

    // Human input

    fn gate(&self) -> Result<(), Rejection> {
        if self.opponent_thinking {
            return Err(Rejection::OpponentThinking);
        }
        if !self.replay.displayed().is_live() {
            return Err(Rejection::ViewingHistory);
        }
        if self.is_game_over() {
            return Err(Rejection::GameOver);
        }
        if self.pending_promotion.is_some() {
            return Err(Rejection::PromotionPending);
        }
        if self.config.policy_side() == Some(self.turn()) {
            return Err(Rejection::NotYourTurn);
        }
        Ok(())
    }

    fn is_own_piece(&self, square: Square) -> bool {
        self.engine
            .piece_at(&self.live, square)
            .is_some_and(|p| p.color == self.turn())
    }

    pub fn select_square(&mut self, square: Square) -> SelectOutcome {
        self.select(square, true)
    }

    fn select(&mut self, square: Square, with_sound: bool) -> SelectOutcome {
        if let Err(rejection) = self.gate() {
            return SelectOutcome::Rejected(rejection);
        }
        if !self.is_own_piece(square) {
            self.audio.emit(SoundEvent::Illegal);
            return SelectOutcome::Rejected(Rejection::NotYourPiece);
        }

        let destinations = self.engine.legal_moves(&self.live, Some(square));
        self.selection = Some(Selection {
            square,
            destinations,
        });
        if with_sound {
            self.audio.emit(SoundEvent::Selection);
        }
        SelectOutcome::Selected(square)
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    /// Move the selected piece to `to`.
    pub fn attempt_move(&mut self, to: Square) -> MoveOutcome {
        if let Err(rejection) = self.gate() {
            return MoveOutcome::Rejected(rejection);
        }
        let Some(selection) = self.selection.as_ref() else {
            return MoveOutcome::Rejected(Rejection::NothingSelected);
        };

        if selection.square == to {
            self.selection = None;
            return MoveOutcome::Deselected;
        }

        let from = selection.square;
        let candidates: Vec<&LegalMove> =
            selection.destinations.iter().filter(|m| m.to == to).collect();

        let Some(first) = candidates.first() else {
            if self.is_own_piece(to) {
                self.select(to, true);
                return MoveOutcome::Reselected(to);
            }
            self.selection = None;
            self.audio.emit(SoundEvent::Illegal);
            return MoveOutcome::Deselected;
        };

        if candidates.iter().any(|m| m.is_promotion()) {
            let pending = PendingPromotion {
                from,
                to,
                side: self.turn(),
            };
            self.pending_promotion = Some(pending);
            debug!(%from, %to, "promotion pending");
            return MoveOutcome::PromotionPending(pending);
        }

        let request = first.request();
        match self.apply(request) {
            Ok(san) => MoveOutcome::Played(san),
            Err(e) => {
                warn!(%request, error = %e, "engine rejected a listed move");
                self.selection = None;
                MoveOutcome::Rejected(Rejection::Illegal(e))
            }
        }
    }

    /// Select when nothing is selected, otherwise attempt a move.
    pub fn click(&mut self, square: Square) -> ClickOutcome {
        if self.selection.is_some() {
            ClickOutcome::Move(self.attempt_move(square))
        } else {
            ClickOutcome::Select(self.select_square(square))
        }
    }

    /// Drag-and-drop: pick up `from` and drop it on `to`.
    pub fn drop_piece(&mut self, from: Square, to: Square) -> MoveOutcome {
        if let SelectOutcome::Rejected(rejection) = self.select(from, false) {
            return MoveOutcome::Rejected(rejection);
        }
        if !self.legal_destinations().contains(&to) {
            self.selection = None;
            self.audio.emit(SoundEvent::Illegal);
            return MoveOutcome::Rejected(Rejection::IllegalDestination);
        }
        self.attempt_move(to)
    }

    /// Complete a pending promotion with `role`.
    pub fn resolve_promotion(&mut self, role: Role) -> MoveOutcome {
        let Some(pending) = self.pending_promotion else {
            return MoveOutcome::Rejected(Rejection::NoPromotionPending);
        };

        let request = MoveRequest::new(pending.from, pending.to).with_promotion(role);
        match self.apply(request) {
            Ok(san) => MoveOutcome::Played(san),
            Err(e) => {
                debug!(%request, "promotion choice rejected");
                self.audio.emit(SoundEvent::Illegal);
                MoveOutcome::Rejected(Rejection::Illegal(e))
            }
        }
    }

    pub fn cancel_promotion(&mut self) {
        if self.pending_promotion.take().is_some() {
            debug!("promotion cancelled");
        }
        self.selection = None;
    }

    // Apply path

    fn apply(&mut self, request: MoveRequest) -> Result<String, RulesError> {
        let move_number = self.engine.fullmove_number(&self.live);
        let side = self.engine.turn(&self.live);
        let applied = self.engine.apply_move(&self.live, &request)?;

        self.live = applied.position.clone();
        self.log.push(MoveRecord {
            san: applied.san.clone(),
            move_number,
            side,
            request: applied.played.request(),
            captured: applied.played.captured,
            position: applied.position,
        });
        if let Err(e) = self.replay.rebuild(&self.engine, &self.base, &self.log) {
            error!(error = %e, "replay index out of sync with move log");
        }

        self.selection = None;
        self.pending_promotion = None;

        let sound = self.sound_for(&applied.played);
        self.audio.emit(sound);
        debug!(ply = self.log.len() - 1, san = %applied.san, "move applied");

        self.schedule_opponent();
        Ok(applied.san)
    }

    fn sound_for(&self, played: &LegalMove) -> SoundEvent {
        match self.status() {
            GameStatus::Checkmate => SoundEvent::Checkmate,
            GameStatus::Stalemate | GameStatus::Draw => SoundEvent::Stalemate,
            GameStatus::Playing if self.engine.is_check(&self.live) => SoundEvent::Check,
            GameStatus::Playing if played.is_promotion() => SoundEvent::Promotion,
            GameStatus::Playing if played.is_capture() => SoundEvent::Capture,
            GameStatus::Playing => SoundEvent::Move,
        }
    }

    // Opponent

    fn schedule_opponent(&mut self) {
        let Some(side) = self.config.policy_side() else {
            return;
        };
        if self.opponent_thinking
            || !self.replay.displayed().is_live()
            || self.turn() != side
            || self.is_game_over()
        {
            return;
        }

        self.opponent_thinking = true;
        self.pending_ticket = Some(OpponentTicket { epoch: self.epoch });
        debug!(epoch = self.epoch, "opponent move scheduled");
    }

    /// Hand out the ticket issued by the last state change, if any.
    pub fn take_opponent_ticket(&mut self) -> Option<OpponentTicket> {
        self.pending_ticket.take()
    }

    pub fn play_opponent_move(&mut self, ticket: OpponentTicket) -> OpponentOutcome {
        if ticket.epoch != self.epoch || !self.opponent_thinking {
            debug!(ticket = ticket.epoch, epoch = self.epoch, "stale opponent ticket");
            return OpponentOutcome::Stale;
        }
        self.opponent_thinking = false;
        self.pending_ticket = None;

        if !self.replay.displayed().is_live() {
            debug!(epoch = self.epoch, "opponent move deferred while viewing history");
            return OpponentOutcome::Deferred;
        }

        let Some(mv) = self.policy.choose_move(&self.engine, &self.live) else {
            return OpponentOutcome::NoMove;
        };
        let request = mv.request();
        let err = match self.apply(request) {
            Ok(san) => return OpponentOutcome::Played(san),
            Err(e) => e,
        };
        error!(%request, error = %err, "opponent move rejected by engine");

        let others: Vec<MoveRequest> = self
            .engine
            .legal_moves(&self.live, None)
            .iter()
            .map(LegalMove::request)
            .filter(|other| *other != request)
            .collect();
        for other in others {
            if let Ok(san) = self.apply(other) {
                warn!(%other, "opponent fell back to another legal move");
                return OpponentOutcome::Played(san);
            }
        }

        // Nothing applied. Issue a fresh ticket so the driver can retry.
        self.schedule_opponent();
        OpponentOutcome::Failed(err)
    }

    // Navigation

    /// Change the displayed ply. Leaving live drops the selection and any
    /// pending promotion; returning to live lets a deferred opponent move
    /// be scheduled again.
    pub fn go_to(&mut self, jump: Jump) -> Result<Displayed, ReplayError> {
        let displayed = self.replay.go_to(jump).inspect_err(|e| {
            debug!(error = %e, "navigation rejected");
        })?;

        match displayed {
            Displayed::Live => self.schedule_opponent(),
            Displayed::Ply(_) => {
                self.selection = None;
                if self.pending_promotion.take().is_some() {
                    debug!("promotion cancelled by navigation");
                }
            }
        }
        Ok(displayed)
    }

    // Whole-game transitions

    fn cancel_opponent(&mut self) {
        self.epoch += 1;
        self.opponent_thinking = false;
        self.pending_ticket = None;
    }

    /// Start a new game from the initial position.
    pub fn reset(&mut self) {
        self.cancel_opponent();
        self.base = self.engine.initial_position();
        self.live = self.base.clone();
        self.log.clear();
        self.replay = ReplayIndex::new();
        self.selection = None;
        self.pending_promotion = None;
        self.created_at = Utc::now();

        self.audio.emit(SoundEvent::GameStart);
        info!(epoch = self.epoch, "new game");
        self.schedule_opponent();
    }

    /// Replace the game with a restored one.
    pub fn load(&mut self, restored: RestoredGame<E::Position>) {
        self.cancel_opponent();
        self.config.mode = restored.mode;
        self.base = restored.base;
        self.live = restored.live;
        self.log = restored.log;
        self.replay = ReplayIndex::new();
        if let Err(e) = self.replay.rebuild(&self.engine, &self.base, &self.log) {
            warn!(error = %e, "restored move log does not replay");
        }
        self.selection = None;
        self.pending_promotion = None;
        if let Some(created_at) = restored.created_at {
            self.created_at = created_at;
        }

        info!(epoch = self.epoch, plies = self.log.len(), "game loaded");
        self.schedule_opponent();
    }

    pub fn load_record(&mut self, record: &SavedRecord) -> Result<(), RecordError> {
        let restored = from_record(&self.engine, record)?;
        self.load(restored);
        Ok(())
    }

    /// Switch between human-vs-policy and human-vs-human without
    /// restarting the game.
    pub fn set_mode(&mut self, mode: GameMode) {
        if self.config.mode == mode {
            return;
        }
        self.cancel_opponent();
        self.config.mode = mode;
        info!(?mode, "game mode changed");
        self.schedule_opponent();
    }

    pub fn set_difficulty(&mut self, difficulty: Difficulty) {
        self.config.difficulty = difficulty;
        self.policy.set_difficulty(difficulty);
    }
}

pub(crate) fn side_name(color: Color) -> &'static str {
    match color {
        Color::White => "White",
        Color::Black => "Black",
    }
}
