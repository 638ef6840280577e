//! Chess play session.
//!
//! `session` holds the game state and the input workflow, `replay` the
//! per-ply position cache behind history navigation, `policy` the opponent,
//! and `record` the mapping to and from saved games. `driver` wraps a session
//! for async hosts and adds the opponent's thinking delay.

pub mod audio;
pub mod config;
pub mod driver;
pub mod error;
pub mod policy;
pub mod record;
pub mod replay;
pub mod session;

pub use config::{Difficulty, GameMode, SessionConfig};
pub use driver::SessionHandle;
pub use error::{RecordError, ReplayError};
pub use policy::PriorityPolicy;
pub use record::{default_name, from_record, to_record, LastMove, RestoredGame, SavedRecord};
pub use replay::{move_pairs, Displayed, Jump, MovePair, MoveRecord, ReplayIndex};
pub use session::{
    ClickOutcome, GameSession, MoveOutcome, OpponentOutcome, OpponentTicket, PendingPromotion,
    Phase, Rejection, SelectOutcome, Selection,
};
