//! Async wrapper that gives the opponent its thinking delay.
//!
//! Every call locks the session, forwards the input, and then looks for an
//! opponent ticket. If one was issued, a task sleeps for the configured delay
//! and redeems it. Reset and load bump the session epoch, so a task that
//! wakes up after either finds its ticket stale.

use std::sync::Arc;
use std::time::Duration;

use chess_core::{Role, RulesEngine, Square};
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::{Difficulty, GameMode};
use crate::error::{RecordError, ReplayError};
use crate::record::SavedRecord;
use crate::replay::{Displayed, Jump};
use crate::session::{
    ClickOutcome, GameSession, MoveOutcome, OpponentOutcome, OpponentTicket, SelectOutcome,
};

pub struct SessionHandle<E: RulesEngine> {
    inner: Arc<Mutex<GameSession<E>>>,
    delay: Duration,
}

impl<E: RulesEngine> Clone for SessionHandle<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            delay: self.delay,
        }
    }
}

impl<E> SessionHandle<E>
where
    E: RulesEngine + Send + 'static,
    E::Position: Send + 'static,
{
    /// Wrap a session, using its configured opponent delay.
    ///
    /// Must be called inside a tokio runtime if the session already has an
    /// opponent move scheduled.
    pub fn new(mut session: GameSession<E>) -> Self {
        let delay = session.config().opponent_delay();
        let ticket = session.take_opponent_ticket();
        let handle = Self {
            inner: Arc::new(Mutex::new(session)),
            delay,
        };
        if let Some(ticket) = ticket {
            handle.spawn_opponent(ticket);
        }
        handle
    }

    /// Direct access for reads. Tickets issued through the guard wait for
    /// the next wrapped call or [`SessionHandle::resume_opponent`].
    pub async fn lock(&self) -> MutexGuard<'_, GameSession<E>> {
        self.inner.lock().await
    }

    pub async fn select_square(&self, square: Square) -> SelectOutcome {
        self.inner.lock().await.select_square(square)
    }

    pub async fn attempt_move(&self, to: Square) -> (MoveOutcome, Option<JoinHandle<OpponentOutcome>>) {
        let mut session = self.inner.lock().await;
        let outcome = session.attempt_move(to);
        let task = self.dispatch(&mut session);
        (outcome, task)
    }

    pub async fn click(&self, square: Square) -> (ClickOutcome, Option<JoinHandle<OpponentOutcome>>) {
        let mut session = self.inner.lock().await;
        let outcome = session.click(square);
        let task = self.dispatch(&mut session);
        (outcome, task)
    }

    pub async fn drop_piece(
        &self,
        from: Square,
        to: Square,
    ) -> (MoveOutcome, Option<JoinHandle<OpponentOutcome>>) {
        let mut session = self.inner.lock().await;
        let outcome = session.drop_piece(from, to);
        let task = self.dispatch(&mut session);
        (outcome, task)
    }

    pub async fn resolve_promotion(
        &self,
        role: Role,
    ) -> (MoveOutcome, Option<JoinHandle<OpponentOutcome>>) {
        let mut session = self.inner.lock().await;
        let outcome = session.resolve_promotion(role);
        let task = self.dispatch(&mut session);
        (outcome, task)
    }

    pub async fn cancel_promotion(&self) {
        self.inner.lock().await.cancel_promotion();
    }

    pub async fn clear_selection(&self) {
        self.inner.lock().await.clear_selection();
    }

    /// Switch modes; turning the policy on during its turn starts it thinking.
    pub async fn set_mode(&self, mode: GameMode) -> Option<JoinHandle<OpponentOutcome>> {
        let mut session = self.inner.lock().await;
        session.set_mode(mode);
        self.dispatch(&mut session)
    }

    pub async fn set_difficulty(&self, difficulty: Difficulty) {
        self.inner.lock().await.set_difficulty(difficulty);
    }

    /// Spawn the opponent for any ticket still waiting, such as the retry
    /// ticket left behind by [`OpponentOutcome::Failed`].
    pub async fn resume_opponent(&self) -> Option<JoinHandle<OpponentOutcome>> {
        let mut session = self.inner.lock().await;
        self.dispatch(&mut session)
    }

    pub async fn go_to(
        &self,
        jump: Jump,
    ) -> Result<(Displayed, Option<JoinHandle<OpponentOutcome>>), ReplayError> {
        let mut session = self.inner.lock().await;
        let displayed = session.go_to(jump)?;
        let task = self.dispatch(&mut session);
        Ok((displayed, task))
    }

    pub async fn reset(&self) -> Option<JoinHandle<OpponentOutcome>> {
        let mut session = self.inner.lock().await;
        session.reset();
        self.dispatch(&mut session)
    }

    pub async fn load_record(
        &self,
        record: &SavedRecord,
    ) -> Result<Option<JoinHandle<OpponentOutcome>>, RecordError> {
        let mut session = self.inner.lock().await;
        session.load_record(record)?;
        Ok(self.dispatch(&mut session))
    }

    fn dispatch(&self, session: &mut GameSession<E>) -> Option<JoinHandle<OpponentOutcome>> {
        session
            .take_opponent_ticket()
            .map(|ticket| self.spawn_opponent(ticket))
    }

    fn spawn_opponent(&self, ticket: OpponentTicket) -> JoinHandle<OpponentOutcome> {
        let inner = Arc::clone(&self.inner);
        let delay = self.delay;
        debug!(epoch = ticket.epoch(), delay_ms = delay.as_millis() as u64, "opponent task spawned");

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut session = inner.lock().await;
            session.play_opponent_move(ticket)
        })
    }
}
