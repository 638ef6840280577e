//! Session error types

use chess_core::pgn::TranscriptError;
use chess_core::RulesError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    #[error("Ply {index} out of range (log has {len} plies)")]
    OutOfRange { index: usize, len: usize },

    #[error("Replay failed at ply {ply}: {source}")]
    Replay {
        ply: usize,
        #[source]
        source: RulesError,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Saved game has neither a usable position nor a usable transcript ({fen}; {transcript})")]
    Unrestorable {
        fen: RulesError,
        transcript: TranscriptError,
    },
}
