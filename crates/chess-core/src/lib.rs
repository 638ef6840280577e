//! Chess rules vocabulary for the play session.
//!
//! `rules` defines the capability interface the session talks to, `standard`
//! implements it on top of shakmaty, and `pgn` reads and writes the move
//! transcripts stored with saved games.

pub mod pgn;
pub mod rules;
pub mod standard;

pub use rules::{
    parse_square, repetition_key, Applied, GameStatus, LegalMove, MoveRequest, RulesEngine,
    RulesError,
};
pub use standard::StandardRules;

pub use shakmaty::{Chess, Color, Piece, Role, Square};
