//! Per-ply position cache and history navigation.
//!
//! The index holds the position after every logged move, rebuilt from the
//! base position each time the log changes. It also tracks which position the
//! board is showing: `Displayed::Live` or a specific ply. Navigation never
//! touches the log or the live position.

use chess_core::{Color, MoveRequest, Role, RulesEngine};

use crate::error::ReplayError;

/// One applied move.
#[derive(Debug, Clone)]
pub struct MoveRecord<P> {
    pub san: String,
    /// Fullmove number of the pair this ply belongs to.
    pub move_number: u32,
    pub side: Color,
    pub request: MoveRequest,
    pub captured: Option<Role>,
    /// Position after the move.
    pub position: P,
}

/// What the board is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Displayed {
    #[default]
    Live,
    Ply(usize),
}

impl Displayed {
    pub fn is_live(self) -> bool {
        self == Displayed::Live
    }
}

/// Navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jump {
    Ply(usize),
    First,
    Prev,
    Next,
    Last,
    Live,
}

#[derive(Debug, Clone)]
pub struct ReplayIndex<P> {
    positions: Vec<P>,
    displayed: Displayed,
}

impl<P> Default for ReplayIndex<P> {
    fn default() -> Self {
        Self {
            positions: Vec::new(),
            displayed: Displayed::Live,
        }
    }
}

impl<P: Clone> ReplayIndex<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute every ply's position by replaying the log from `base`.
    ///
    /// On failure the cache keeps the plies before the failing one.
    pub fn rebuild<E>(&mut self, engine: &E, base: &P, log: &[MoveRecord<P>]) -> Result<(), ReplayError>
    where
        E: RulesEngine<Position = P>,
    {
        self.positions.clear();
        self.positions.reserve(log.len());

        let mut position = base.clone();
        let mut outcome = Ok(());
        for (ply, record) in log.iter().enumerate() {
            match engine.apply_move(&position, &record.request) {
                Ok(applied) => {
                    position = applied.position;
                    self.positions.push(position.clone());
                }
                Err(source) => {
                    outcome = Err(ReplayError::Replay { ply, source });
                    break;
                }
            }
        }

        if let Displayed::Ply(i) = self.displayed {
            if i >= self.positions.len() {
                self.displayed = Displayed::Live;
            }
        }
        outcome
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn position_at(&self, ply: usize) -> Option<&P> {
        self.positions.get(ply)
    }

    pub fn displayed(&self) -> Displayed {
        self.displayed
    }

    /// The position to render: a cached ply, or `live` when showing live.
    pub fn displayed_position<'a>(&'a self, live: &'a P) -> &'a P {
        match self.displayed {
            Displayed::Live => live,
            Displayed::Ply(i) => self.positions.get(i).unwrap_or(live),
        }
    }

    /// Move the display. Out-of-range plies are rejected and leave the
    /// display where it was; relative jumps with nowhere to go are no-ops.
    pub fn go_to(&mut self, jump: Jump) -> Result<Displayed, ReplayError> {
        let len = self.positions.len();
        let next = match (jump, self.displayed) {
            (Jump::Ply(index), _) if index >= len => {
                return Err(ReplayError::OutOfRange { index, len });
            }
            (Jump::Ply(index), _) => Displayed::Ply(index),

            (Jump::First, current) => {
                if len > 0 {
                    Displayed::Ply(0)
                } else {
                    current
                }
            }

            (Jump::Prev, Displayed::Ply(i)) if i > 0 => Displayed::Ply(i - 1),
            // The last ply shows the same board as live, so step past it.
            (Jump::Prev, Displayed::Live) if len >= 2 => Displayed::Ply(len - 2),
            (Jump::Prev, current) => current,

            (Jump::Next, Displayed::Ply(i)) if i + 1 < len => Displayed::Ply(i + 1),
            (Jump::Next, Displayed::Ply(_)) => Displayed::Live,
            (Jump::Next, Displayed::Live) => Displayed::Live,

            (Jump::Last, _) | (Jump::Live, _) => Displayed::Live,
        };

        self.displayed = next;
        Ok(next)
    }

    pub fn can_navigate_back(&self) -> bool {
        !self.positions.is_empty() && self.displayed != Displayed::Ply(0)
    }

    pub fn can_navigate_forward(&self) -> bool {
        !self.displayed.is_live()
    }
}

/// A numbered row of the move list: White's ply and Black's reply.
#[derive(Debug, Clone, Copy)]
pub struct MovePair<'a, P> {
    pub number: u32,
    pub white: Option<(usize, &'a MoveRecord<P>)>,
    pub black: Option<(usize, &'a MoveRecord<P>)>,
}

/// Group the log into numbered pairs, keeping each ply's index for
/// `Jump::Ply`. A game starting with Black to move opens with a pair that
/// has no White ply.
pub fn move_pairs<P>(log: &[MoveRecord<P>]) -> Vec<MovePair<'_, P>> {
    let mut pairs: Vec<MovePair<'_, P>> = Vec::with_capacity(log.len() / 2 + 1);

    for (index, record) in log.iter().enumerate() {
        let starts_pair = match pairs.last() {
            None => true,
            Some(last) => record.side == Color::White || last.number != record.move_number,
        };
        if starts_pair {
            pairs.push(MovePair {
                number: record.move_number,
                white: None,
                black: None,
            });
        }

        if let Some(pair) = pairs.last_mut() {
            match record.side {
                Color::White => pair.white = Some((index, record)),
                Color::Black => pair.black = Some((index, record)),
            }
        }
    }

    pairs
}
