//! Mapping between a session and its storable record.
//!
//! A [`SavedRecord`] keeps both the FEN of the live position and the move
//! transcript. Restoring prefers the transcript, because it brings the move
//! log back; when the transcript cannot be replayed, or replays to a
//! different position than the FEN says, the game is restored from the FEN
//! alone with an empty log. Nothing here touches storage.

use chrono::{DateTime, Utc};
use chess_core::pgn::{load_transcript, TranscriptError};
use chess_core::{repetition_key, Color, GameStatus, MoveRequest, RulesEngine};
use serde::{Deserialize, Serialize};
use tracing::warn;
use validator::Validate;

use crate::config::{color_tag, GameMode};
use crate::error::RecordError;
use crate::replay::MoveRecord;
use crate::session::{side_name, GameSession};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMove {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SavedRecord {
    #[validate(length(min = 1))]
    pub id: String,

    #[validate(length(min = 1, max = 100))]
    pub name: String,

    #[validate(length(min = 1))]
    pub fen: String,

    #[serde(default)]
    pub pgn: String,

    pub game_mode: GameMode,

    #[serde(with = "color_tag")]
    pub current_turn: Color,

    pub game_status: GameStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_move: Option<LastMove>,

    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,

    /// Plies played.
    pub move_count: usize,

    /// Seconds since the game started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent: Option<i64>,
}

impl SavedRecord {
    /// One-line status as shown in the saved games list.
    pub fn status_summary(&self) -> String {
        match self.game_status {
            GameStatus::Checkmate => {
                format!("Checkmate ({} wins)", side_name(self.current_turn.other()))
            }
            GameStatus::Stalemate => "Stalemate".to_string(),
            GameStatus::Draw => "Draw".to_string(),
            GameStatus::Playing => format!("{} to move", side_name(self.current_turn)),
        }
    }
}

/// "Game 14:05 (vs AI)"
pub fn default_name(mode: GameMode, now: DateTime<Utc>) -> String {
    let opponent = match mode {
        GameMode::HumanVsPolicy => "vs AI",
        GameMode::HumanVsHuman => "vs Player",
    };
    format!("Game {} ({})", now.format("%H:%M"), opponent)
}

pub fn to_record<E: RulesEngine>(
    session: &GameSession<E>,
    name: Option<&str>,
    id: &str,
    now: DateTime<Utc>,
) -> SavedRecord {
    let name = match name.map(str::trim) {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => default_name(session.mode(), now),
    };
    let last_move = session.move_log().last().map(|r| LastMove {
        from: r.request.from.to_string(),
        to: r.request.to.to_string(),
    });

    SavedRecord {
        id: id.to_string(),
        name,
        fen: session.fen(),
        pgn: session.transcript(),
        game_mode: session.mode(),
        current_turn: session.turn(),
        game_status: session.status(),
        last_move,
        created_at: session.created_at(),
        last_modified: now,
        move_count: session.move_log().len(),
        time_spent: Some((now - session.created_at()).num_seconds().max(0)),
    }
}

/// Everything needed to put a saved game back into a session.
#[derive(Debug, Clone)]
pub struct RestoredGame<P> {
    pub base: P,
    pub live: P,
    pub log: Vec<MoveRecord<P>>,
    pub mode: GameMode,
    pub created_at: Option<DateTime<Utc>>,
}

impl<P: Clone> RestoredGame<P> {
    /// A game set up at `position` with no moves played.
    pub fn from_position(position: P, mode: GameMode) -> Self {
        Self {
            base: position.clone(),
            live: position,
            log: Vec::new(),
            mode,
            created_at: None,
        }
    }
}

pub fn from_record<E: RulesEngine>(
    engine: &E,
    record: &SavedRecord,
) -> Result<RestoredGame<E::Position>, RecordError> {
    let transcript = load_transcript(engine, &record.pgn);
    let fen_position = engine.from_fen(&record.fen);

    let restored = match (transcript, fen_position) {
        (Ok(t), Ok(position))
            if repetition_key(&engine.to_fen(&t.position))
                == repetition_key(&engine.to_fen(&position)) =>
        {
            replay_moves(engine, t.start.clone(), &t.moves)
                .map(|(live, log)| RestoredGame {
                    base: t.start,
                    live,
                    log,
                    mode: record.game_mode,
                    created_at: None,
                })
                .unwrap_or_else(|e| {
                    warn!(id = %record.id, error = %e, "transcript replay failed, restoring from FEN");
                    RestoredGame::from_position(position, record.game_mode)
                })
        }
        (Ok(t), Err(fen)) => {
            warn!(id = %record.id, error = %fen, "unreadable FEN, restoring from transcript");
            let (live, log) = replay_moves(engine, t.start.clone(), &t.moves)
                .map_err(|transcript| RecordError::Unrestorable { fen, transcript })?;
            RestoredGame {
                base: t.start,
                live,
                log,
                mode: record.game_mode,
                created_at: None,
            }
        }
        (Ok(_), Ok(position)) => {
            warn!(id = %record.id, "transcript disagrees with FEN, restoring from FEN");
            RestoredGame::from_position(position, record.game_mode)
        }
        (Err(e), Ok(position)) => {
            warn!(id = %record.id, error = %e, "unreadable transcript, restoring from FEN");
            RestoredGame::from_position(position, record.game_mode)
        }
        (Err(transcript), Err(fen)) => {
            return Err(RecordError::Unrestorable { fen, transcript });
        }
    };

    Ok(RestoredGame {
        created_at: Some(record.created_at),
        ..restored
    })
}

/// Apply `moves` from `start`, producing the move log.
fn replay_moves<E: RulesEngine>(
    engine: &E,
    start: E::Position,
    moves: &[MoveRequest],
) -> Result<(E::Position, Vec<MoveRecord<E::Position>>), TranscriptError> {
    let mut position = start;
    let mut log = Vec::with_capacity(moves.len());

    for (ply, request) in moves.iter().enumerate() {
        let move_number = engine.fullmove_number(&position);
        let side = engine.turn(&position);
        let applied = engine
            .apply_move(&position, request)
            .map_err(|source| TranscriptError::IllegalMove {
                ply,
                san: request.to_string(),
                source,
            })?;
        position = applied.position;
        log.push(MoveRecord {
            san: applied.san,
            move_number,
            side,
            request: applied.played.request(),
            captured: applied.played.captured,
            position: position.clone(),
        });
    }

    Ok((position, log))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SilentAudio;
    use crate::config::SessionConfig;
    use chess_core::{Square, StandardRules};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn pvp_session(moves: &[&str]) -> GameSession<StandardRules> {
        let config = SessionConfig {
            mode: GameMode::HumanVsHuman,
            ..SessionConfig::default()
        };
        let mut session = GameSession::new(StandardRules::new(), config, Arc::new(SilentAudio));
        for uci in moves {
            let request: MoveRequest = uci.parse().unwrap();
            session.drop_piece(request.from, request.to);
        }
        session
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_to_record_fields() {
        let session = pvp_session(&["e2e4", "e7e5", "g1f3"]);
        let record = to_record(&session, None, "game_1", noon());

        assert_eq!(record.name, "Game 12:30 (vs Player)");
        assert_eq!(record.fen, session.fen());
        assert_eq!(record.pgn, "1. e4 e5 2. Nf3");
        assert_eq!(record.current_turn, Color::Black);
        assert_eq!(record.game_status, GameStatus::Playing);
        assert_eq!(record.move_count, 3);
        assert_eq!(
            record.last_move,
            Some(LastMove {
                from: "g1".into(),
                to: "f3".into()
            })
        );
        assert_eq!(record.last_modified, noon());
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_record_json_shape() {
        let session = pvp_session(&["e2e4"]);
        let record = to_record(&session, Some("Opening"), "game_1", noon());
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["gameMode"], "pvp");
        assert_eq!(json["currentTurn"], "b");
        assert_eq!(json["gameStatus"], "playing");
        assert_eq!(json["moveCount"], 1);
        assert_eq!(json["lastMove"]["from"], "e2");
        assert!(json.get("createdAt").is_some());

        let back: SavedRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_round_trip_restores_log_and_position() {
        let rules = StandardRules::new();
        let session = pvp_session(&["e2e4", "e7e5", "g1f3", "b8c6"]);
        let record = to_record(&session, None, "game_1", noon());

        let restored = from_record(&rules, &record).unwrap();
        assert_eq!(rules.to_fen(&restored.live), session.fen());
        assert_eq!(restored.log.len(), 4);
        assert_eq!(restored.log[3].san, "Nc6");
        assert_eq!(restored.log[3].move_number, 2);
        assert_eq!(restored.mode, GameMode::HumanVsHuman);
        assert_eq!(restored.created_at, Some(record.created_at));
    }

    #[test]
    fn test_custom_start_round_trip() {
        let rules = StandardRules::new();
        let mut session = pvp_session(&[]);
        let position = rules.from_fen("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1").unwrap();
        session.load(RestoredGame::from_position(position, GameMode::HumanVsHuman));
        session.drop_piece(Square::E2, Square::E4);

        let record = to_record(&session, None, "game_1", noon());
        let restored = from_record(&rules, &record).unwrap();
        assert_eq!(restored.log.len(), 1);
        assert_eq!(rules.to_fen(&restored.base), "4k3/8/8/8/8/8/4P3/4K3 w - - 0 1");
    }

    #[test]
    fn test_bad_transcript_falls_back_to_fen() {
        let rules = StandardRules::new();
        let session = pvp_session(&["e2e4", "e7e5"]);
        let mut record = to_record(&session, None, "game_1", noon());
        record.pgn = "1. e4 Ke2".into();

        let restored = from_record(&rules, &record).unwrap();
        assert!(restored.log.is_empty());
        assert_eq!(rules.to_fen(&restored.live), record.fen);
        assert_eq!(rules.to_fen(&restored.base), record.fen);
    }

    #[test]
    fn test_mismatched_transcript_falls_back_to_fen() {
        let rules = StandardRules::new();
        let session = pvp_session(&["d2d4", "d7d5"]);
        let mut record = to_record(&session, None, "game_1", noon());
        record.pgn = "1. e4 e5".into();

        let restored = from_record(&rules, &record).unwrap();
        assert!(restored.log.is_empty());
        assert_eq!(rules.to_fen(&restored.live), session.fen());
    }

    #[test]
    fn test_unreadable_fen_uses_transcript() {
        let rules = StandardRules::new();
        let session = pvp_session(&["e2e4"]);
        let mut record = to_record(&session, None, "game_1", noon());
        record.fen = "garbage".into();

        let restored = from_record(&rules, &record).unwrap();
        assert_eq!(restored.log.len(), 1);
    }

    #[test]
    fn test_nothing_usable_is_an_error() {
        let rules = StandardRules::new();
        let session = pvp_session(&[]);
        let mut record = to_record(&session, None, "game_1", noon());
        record.fen = "garbage".into();
        record.pgn = "1. e5".into();

        assert!(matches!(
            from_record(&rules, &record),
            Err(RecordError::Unrestorable { .. })
        ));
    }

    #[test]
    fn test_status_summary() {
        let session = pvp_session(&["f2f3", "e7e5", "g2g4", "d8h4"]);
        let record = to_record(&session, None, "game_1", noon());
        assert_eq!(record.status_summary(), "Checkmate (Black wins)");

        let record = to_record(&pvp_session(&["e2e4"]), None, "game_2", noon());
        assert_eq!(record.status_summary(), "Black to move");
    }

    #[test]
    fn test_validation_rejects_empty_fen() {
        let session = pvp_session(&[]);
        let mut record = to_record(&session, None, "game_1", noon());
        record.fen = String::new();
        assert!(record.validate().is_err());
    }

    #[test]
    fn test_default_name_for_policy_mode() {
        assert_eq!(default_name(GameMode::HumanVsPolicy, noon()), "Game 12:30 (vs AI)");
    }
}
