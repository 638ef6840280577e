//! Standard chess rules backed by shakmaty.

use shakmaty::fen::Fen;
use shakmaty::san::{San, SanPlus};
use shakmaty::{
    CastlingMode, Chess, Color, EnPassantMode, File, Move, Piece, Position, Square,
};

use crate::rules::{Applied, LegalMove, MoveRequest, RulesEngine, RulesError};

/// Orthodox chess. Stateless; positions are `shakmaty::Chess` values.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardRules;

impl StandardRules {
    pub fn new() -> Self {
        Self
    }
}

/// Where the moving king lands for castling; the plain target otherwise.
fn destination(mv: &Move) -> Square {
    match mv {
        Move::Castle { king, rook } => {
            let file = if rook.file() > king.file() { File::G } else { File::C };
            Square::from_coords(file, king.rank())
        }
        other => other.to(),
    }
}

fn describe(mv: &Move) -> Option<LegalMove> {
    let from = mv.from()?;
    Some(LegalMove {
        from,
        to: destination(mv),
        role: mv.role(),
        captured: mv.capture(),
        promotion: mv.promotion(),
        is_castle: mv.is_castle(),
        is_en_passant: mv.is_en_passant(),
    })
}

fn matches_request(mv: &Move, req: &MoveRequest) -> bool {
    mv.from() == Some(req.from) && destination(mv) == req.to && mv.promotion() == req.promotion
}

impl RulesEngine for StandardRules {
    type Position = Chess;

    fn initial_position(&self) -> Chess {
        Chess::default()
    }

    fn legal_moves(&self, pos: &Chess, from: Option<Square>) -> Vec<LegalMove> {
        pos.legal_moves()
            .iter()
            .filter(|mv| from.is_none() || mv.from() == from)
            .filter_map(describe)
            .collect()
    }

    fn apply_move(&self, pos: &Chess, req: &MoveRequest) -> Result<Applied<Chess>, RulesError> {
        let legals = pos.legal_moves();
        let mv = legals
            .iter()
            .find(|mv| matches_request(mv, req))
            .ok_or(RulesError::IllegalMove(*req))?;
        let played = describe(mv).ok_or(RulesError::IllegalMove(*req))?;

        let mut san = San::from_move(pos, mv.clone()).to_string();
        let mut next = pos.clone();
        next.play_unchecked(mv.clone());

        if next.is_checkmate() {
            san.push('#');
        } else if next.is_check() {
            san.push('+');
        }

        Ok(Applied {
            position: next,
            san,
            played,
        })
    }

    fn turn(&self, pos: &Chess) -> Color {
        pos.turn()
    }

    fn piece_at(&self, pos: &Chess, square: Square) -> Option<Piece> {
        pos.board().piece_at(square)
    }

    fn fullmove_number(&self, pos: &Chess) -> u32 {
        pos.fullmoves().get()
    }

    fn is_check(&self, pos: &Chess) -> bool {
        pos.is_check()
    }

    fn is_checkmate(&self, pos: &Chess) -> bool {
        pos.is_checkmate()
    }

    fn is_stalemate(&self, pos: &Chess) -> bool {
        pos.is_stalemate()
    }

    fn is_draw(&self, pos: &Chess) -> bool {
        pos.is_stalemate() || pos.is_insufficient_material() || pos.halfmoves() >= 100
    }

    fn to_fen(&self, pos: &Chess) -> String {
        Fen::from_position(pos, EnPassantMode::Legal).to_string()
    }

    fn from_fen(&self, text: &str) -> Result<Chess, RulesError> {
        let fen: Fen = text.trim().parse().map_err(|e| RulesError::InvalidFen {
            fen: text.to_string(),
            reason: format!("{e}"),
        })?;
        fen.into_position::<Chess>(CastlingMode::Standard)
            .map_err(|e| RulesError::InvalidFen {
                fen: text.to_string(),
                reason: format!("{e}"),
            })
    }

    fn resolve_san(&self, pos: &Chess, text: &str) -> Result<MoveRequest, RulesError> {
        let san: SanPlus = text.trim().parse().map_err(|e| RulesError::InvalidSan {
            san: text.to_string(),
            reason: format!("{e}"),
        })?;
        let mv = san.san.to_move(pos).map_err(|e| RulesError::InvalidSan {
            san: text.to_string(),
            reason: format!("{e}"),
        })?;
        describe(&mv)
            .map(|legal| legal.request())
            .ok_or_else(|| RulesError::InvalidSan {
                san: text.to_string(),
                reason: "not a board move".to_string(),
            })
    }
}
