#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chess_core::{Chess, MoveRequest, RulesEngine, StandardRules};
use game_session::audio::RecordingAudio;
use game_session::{
    Difficulty, GameMode, GameSession, MoveOutcome, MoveRecord, PriorityPolicy, SessionConfig,
};
use tracing_subscriber::EnvFilter;

/// Install a test-writer subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn ai_config(delay_ms: u64) -> SessionConfig {
    SessionConfig {
        opponent_delay_ms: delay_ms,
        ..SessionConfig::default()
    }
}

pub fn pvp_config() -> SessionConfig {
    SessionConfig {
        mode: GameMode::HumanVsHuman,
        ..SessionConfig::default()
    }
}

/// A session with a seeded opponent and an audio recorder.
pub fn new_session(config: SessionConfig) -> (GameSession<StandardRules>, Arc<RecordingAudio>) {
    init_tracing();
    let audio = Arc::new(RecordingAudio::new());
    let session = GameSession::new(StandardRules::new(), config, audio.clone())
        .with_policy(PriorityPolicy::seeded(Difficulty::Easy, 2024));
    (session, audio)
}

/// Play a move given in coordinate notation through the click workflow.
pub fn play(session: &mut GameSession<StandardRules>, uci: &str) -> MoveOutcome {
    let request: MoveRequest = uci.parse().expect("valid coordinate move");
    session.drop_piece(request.from, request.to)
}

/// Replay the log from `base` with a fresh engine.
pub fn fold_log(base: &Chess, log: &[MoveRecord<Chess>]) -> Chess {
    let rules = StandardRules::new();
    log.iter().fold(base.clone(), |position, record| {
        rules
            .apply_move(&position, &record.request)
            .expect("logged move replays")
            .position
    })
}

/// Unique scratch directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("chess-play-{name}-{}-{nanos}", std::process::id()))
}
