//! Capability interface over a chess rules engine.
//!
//! The session layer never inspects positions directly; everything it needs
//! (legal moves, applying a move, game-over predicates, FEN and SAN) goes
//! through [`RulesEngine`]. Squares, roles and colors are shakmaty's plain
//! value types and are used as shared vocabulary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use shakmaty::{Color, Piece, Role, Square};
use thiserror::Error;

/// Errors raised by a rules engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RulesError {
    #[error("Illegal move: {0}")]
    IllegalMove(MoveRequest),

    #[error("Invalid square: {0}")]
    InvalidSquare(String),

    #[error("Invalid FEN '{fen}': {reason}")]
    InvalidFen { fen: String, reason: String },

    #[error("Invalid SAN '{san}': {reason}")]
    InvalidSan { san: String, reason: String },
}

/// A move as requested by a player: from-square, to-square and an optional
/// promotion role. Castling is requested as the king's two-square step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MoveRequest {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Role>,
}

impl MoveRequest {
    pub fn new(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            promotion: None,
        }
    }

    pub fn with_promotion(mut self, role: Role) -> Self {
        self.promotion = Some(role);
        self
    }
}

impl fmt::Display for MoveRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(role) = self.promotion {
            write!(f, "{}", role.char())?;
        }
        Ok(())
    }
}

/// Parses coordinate notation such as `e2e4` or `e7e8q`.
impl FromStr for MoveRequest {
    type Err = RulesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !s.is_ascii() || (s.len() != 4 && s.len() != 5) {
            return Err(RulesError::InvalidSquare(s.to_string()));
        }

        let from = parse_square(&s[0..2])?;
        let to = parse_square(&s[2..4])?;
        let promotion = match s[4..].chars().next() {
            None => None,
            Some(c) => Some(
                Role::from_char(c.to_ascii_lowercase())
                    .ok_or_else(|| RulesError::InvalidSquare(s.to_string()))?,
            ),
        };

        Ok(Self {
            from,
            to,
            promotion,
        })
    }
}

/// Parse an algebraic square name ("e4").
pub fn parse_square(text: &str) -> Result<Square, RulesError> {
    text.parse::<Square>()
        .map_err(|_| RulesError::InvalidSquare(text.to_string()))
}

/// A legal move together with the flags the session and the policy need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegalMove {
    pub from: Square,
    /// Destination as the player sees it (the king's square for castling).
    pub to: Square,
    pub role: Role,
    pub captured: Option<Role>,
    pub promotion: Option<Role>,
    pub is_castle: bool,
    pub is_en_passant: bool,
}

impl LegalMove {
    pub fn request(&self) -> MoveRequest {
        MoveRequest {
            from: self.from,
            to: self.to,
            promotion: self.promotion,
        }
    }

    pub fn is_capture(&self) -> bool {
        self.captured.is_some()
    }

    pub fn is_promotion(&self) -> bool {
        self.promotion.is_some()
    }
}

/// Result of applying a move: the new position plus what was played.
#[derive(Debug, Clone)]
pub struct Applied<P> {
    pub position: P,
    /// SAN including the check/mate suffix.
    pub san: String,
    pub played: LegalMove,
}

/// Game status as stored with saved games.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Playing,
    Checkmate,
    Stalemate,
    Draw,
}

impl GameStatus {
    pub fn is_over(self) -> bool {
        self != GameStatus::Playing
    }
}

/// Everything the session layer asks of a chess rules engine.
///
/// Implementations must treat positions as values: `apply_move` returns a new
/// position and leaves its input untouched.
pub trait RulesEngine {
    type Position: Clone + fmt::Debug;

    fn initial_position(&self) -> Self::Position;

    /// Legal moves for the side to move, optionally only those leaving `from`.
    fn legal_moves(&self, pos: &Self::Position, from: Option<Square>) -> Vec<LegalMove>;

    fn apply_move(
        &self,
        pos: &Self::Position,
        mv: &MoveRequest,
    ) -> Result<Applied<Self::Position>, RulesError>;

    fn turn(&self, pos: &Self::Position) -> Color;

    fn piece_at(&self, pos: &Self::Position, square: Square) -> Option<Piece>;

    /// Fullmove counter (starts at 1, incremented after Black moves).
    fn fullmove_number(&self, pos: &Self::Position) -> u32;

    fn is_check(&self, pos: &Self::Position) -> bool;

    fn is_checkmate(&self, pos: &Self::Position) -> bool;

    fn is_stalemate(&self, pos: &Self::Position) -> bool;

    /// Draw by rules visible in the position alone (stalemate, insufficient
    /// material, fifty-move rule). Repetition needs history and is left to
    /// the caller.
    fn is_draw(&self, pos: &Self::Position) -> bool;

    fn to_fen(&self, pos: &Self::Position) -> String;

    fn from_fen(&self, fen: &str) -> Result<Self::Position, RulesError>;

    /// Resolve a SAN token ("Nf3", "exd8=Q+") against a position.
    fn resolve_san(&self, pos: &Self::Position, san: &str) -> Result<MoveRequest, RulesError>;

    fn status(&self, pos: &Self::Position) -> GameStatus {
        if self.is_checkmate(pos) {
            GameStatus::Checkmate
        } else if self.is_stalemate(pos) {
            GameStatus::Stalemate
        } else if self.is_draw(pos) {
            GameStatus::Draw
        } else {
            GameStatus::Playing
        }
    }

    fn is_game_over(&self, pos: &Self::Position) -> bool {
        self.status(pos).is_over()
    }
}

/// Strip move counters from a FEN, keeping placement, side, castling and
/// en passant. Two positions with the same key count as a repetition.
pub fn repetition_key(fen: &str) -> String {
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}
