//! Move transcript (PGN movetext) writing and parsing, regex-based.
//!
//! Transcripts are what saved games keep next to the FEN: `1. e4 e5 2. Nf3`.
//! Games that did not start from the standard position carry `SetUp`/`FEN`
//! headers so they can be replayed from the right base.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::rules::{MoveRequest, RulesEngine, RulesError};

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[(\w+)\s+"([^"]*)"\]"#).expect("valid header regex"));
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^}]*\}|;[^\n]*").expect("valid comment regex"));
static VARIATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^()]*\)").expect("valid variation regex"));
static MOVE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.(\.\.)?$").expect("valid move number regex"));
static SAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[KQRBN]?[a-h]?[1-8]?x?[a-h][1-8](?:=[QRBN])?|O-O-O|O-O|0-0-0|0-0)[+#]?[!?]*$")
        .expect("valid san regex")
});

/// The transcript could not be turned back into moves.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("Invalid FEN header: {0}")]
    BadStart(RulesError),

    #[error("Unreadable token '{token}' at ply {ply}")]
    BadToken { ply: usize, token: String },

    #[error("Illegal move '{san}' at ply {ply}: {source}")]
    IllegalMove {
        ply: usize,
        san: String,
        #[source]
        source: RulesError,
    },
}

/// A parsed transcript: the base position and the moves replayed from it.
#[derive(Debug, Clone)]
pub struct LoadedTranscript<P> {
    pub start: P,
    /// FEN of `start` when the transcript carried a custom start.
    pub start_fen: Option<String>,
    pub moves: Vec<MoveRequest>,
    pub sans: Vec<String>,
    pub position: P,
}

/// Write SAN moves as numbered movetext.
///
/// `start_fen` is emitted as a `SetUp`/`FEN` header pair when it is not the
/// standard starting position; numbering continues from that FEN.
pub fn write_transcript(start_fen: Option<&str>, sans: &[String]) -> String {
    let mut out = String::new();
    let (mut number, mut white_to_move) = (1u32, true);

    if let Some(fen) = start_fen.filter(|f| f.trim() != STANDARD_START_FEN) {
        out.push_str("[SetUp \"1\"]\n");
        out.push_str(&format!("[FEN \"{}\"]\n\n", fen.trim()));

        let fields: Vec<&str> = fen.split_whitespace().collect();
        white_to_move = fields.get(1).map(|side| *side != "b").unwrap_or(true);
        number = fields
            .get(5)
            .and_then(|n| n.parse().ok())
            .unwrap_or(1);
    }

    let mut tokens: Vec<String> = Vec::with_capacity(sans.len() + sans.len() / 2 + 1);
    for (i, san) in sans.iter().enumerate() {
        if white_to_move {
            tokens.push(format!("{number}."));
        } else if i == 0 {
            tokens.push(format!("{number}..."));
        }
        tokens.push(san.clone());

        if !white_to_move {
            number += 1;
        }
        white_to_move = !white_to_move;
    }

    out.push_str(&tokens.join(" "));
    out
}

/// Parse a transcript and replay it with `engine`.
///
/// Every movetext token must be a move number, a result marker, a NAG, or a
/// SAN move legal in the position reached so far.
pub fn load_transcript<E: RulesEngine>(
    engine: &E,
    text: &str,
) -> Result<LoadedTranscript<E::Position>, TranscriptError> {
    let start_fen = extract_header(text, "FEN");
    let start = match start_fen.as_deref() {
        Some(fen) => engine.from_fen(fen).map_err(TranscriptError::BadStart)?,
        None => engine.initial_position(),
    };

    let mut position = start.clone();
    let mut moves = Vec::new();
    let mut sans = Vec::new();

    for token in movetext_tokens(text) {
        if is_move_number(&token) || is_result(&token) || token.starts_with('$') {
            continue;
        }
        let ply = moves.len();
        let token = strip_move_number_prefix(&token);
        if token.is_empty() {
            continue;
        }

        if !SAN_RE.is_match(token) {
            return Err(TranscriptError::BadToken {
                ply,
                token: token.to_string(),
            });
        }

        // Ranks never contain a zero, so only castling is affected.
        let san = token.trim_end_matches(['!', '?']).replace('0', "O");
        let request = engine
            .resolve_san(&position, &san)
            .map_err(|source| TranscriptError::IllegalMove {
                ply,
                san: token.to_string(),
                source,
            })?;
        let applied = engine
            .apply_move(&position, &request)
            .map_err(|source| TranscriptError::IllegalMove {
                ply,
                san: token.to_string(),
                source,
            })?;

        position = applied.position;
        moves.push(request);
        sans.push(applied.san);
    }

    Ok(LoadedTranscript {
        start,
        start_fen,
        moves,
        sans,
        position,
    })
}

/// Movetext split into whitespace tokens, with headers, comments and
/// variations removed.
fn movetext_tokens(text: &str) -> Vec<String> {
    let no_headers = HEADER_RE.replace_all(text, "");
    let no_comments = COMMENT_RE.replace_all(&no_headers, " ");

    // Nested variations collapse from the inside out.
    let mut body = no_comments.into_owned();
    while VARIATION_RE.is_match(&body) {
        body = VARIATION_RE.replace_all(&body, " ").into_owned();
    }

    body.split_whitespace().map(str::to_string).collect()
}

fn is_move_number(token: &str) -> bool {
    MOVE_NUMBER_RE.is_match(token)
}

fn is_result(token: &str) -> bool {
    matches!(token, "1-0" | "0-1" | "1/2-1/2" | "*")
}

/// "1.e4" and "12...Nf6" written without a space.
fn strip_move_number_prefix(token: &str) -> &str {
    match token.rfind('.') {
        Some(idx) if token[..idx].chars().all(|c| c.is_ascii_digit() || c == '.') => {
            &token[idx + 1..]
        }
        _ => token,
    }
}

/// Extract a string value from a PGN header.
pub fn extract_header(pgn: &str, header_name: &str) -> Option<String> {
    HEADER_RE
        .captures_iter(pgn)
        .find(|cap| &cap[1] == header_name)
        .map(|cap| cap[2].to_string())
        .filter(|value| !value.is_empty())
}
