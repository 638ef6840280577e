//! Opponent move selection.
//!
//! A shallow priority rule over the legal move list, no search:
//! queen promotions first, then captures, then anything, each tier picked
//! uniformly at random.

use chess_core::{LegalMove, Role, RulesEngine};
use rand::prelude::IndexedRandom;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::Difficulty;

pub struct PriorityPolicy {
    difficulty: Difficulty,
    rng: StdRng,
}

impl PriorityPolicy {
    pub fn new(difficulty: Difficulty) -> Self {
        Self {
            difficulty,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic policy for tests and replays.
    pub fn seeded(difficulty: Difficulty, seed: u64) -> Self {
        Self {
            difficulty,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn set_difficulty(&mut self, difficulty: Difficulty) {
        self.difficulty = difficulty;
    }

    /// Pick a move for the side to move; `None` when there is no legal move.
    pub fn choose_move<E: RulesEngine>(
        &mut self,
        engine: &E,
        position: &E::Position,
    ) -> Option<LegalMove> {
        let moves = engine.legal_moves(position, None);
        choose(&moves, self.difficulty, &mut self.rng).cloned()
    }
}

/// Apply the tiers to an already generated move list.
pub fn choose<'a, R: Rng + ?Sized>(
    moves: &'a [LegalMove],
    difficulty: Difficulty,
    rng: &mut R,
) -> Option<&'a LegalMove> {
    if difficulty == Difficulty::Easy {
        let queen_promotions: Vec<&LegalMove> = moves
            .iter()
            .filter(|m| m.promotion == Some(Role::Queen))
            .collect();
        if let Some(mv) = queen_promotions.choose(rng) {
            return Some(*mv);
        }

        let captures: Vec<&LegalMove> = moves.iter().filter(|m| m.is_capture()).collect();
        if let Some(mv) = captures.choose(rng) {
            return Some(*mv);
        }
    }

    moves.choose(rng)
}
