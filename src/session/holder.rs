use super::Session;
use crate::core::{ExecutorMode, Result};
use crate::transaction::HolderState;
use crate::translate::ErrorTranslator;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The session bound to the current transaction for one factory.
///
/// The reference count tracks acquisitions; reaching zero does not close the
/// session. Closing is driven by transaction completion through the
/// `CompletionListener`.
pub struct SessionHolder {
    session: Arc<dyn Session>,
    executor_mode: ExecutorMode,
    translator: Option<Arc<dyn ErrorTranslator>>,
    state: HolderState,
}

impl SessionHolder {
    pub fn new(
        session: Arc<dyn Session>,
        executor_mode: ExecutorMode,
        translator: Option<Arc<dyn ErrorTranslator>>,
    ) -> Self {
        Self {
            session,
            executor_mode,
            translator,
            state: HolderState::new(),
        }
    }

    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    pub fn executor_mode(&self) -> ExecutorMode {
        self.executor_mode
    }

    pub fn translator(&self) -> Option<&Arc<dyn ErrorTranslator>> {
        self.translator.as_ref()
    }

    pub fn requested(&self) -> usize {
        self.state.requested()
    }

    pub fn released(&self) -> Result<usize> {
        self.state.released()
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    pub fn reference_count(&self) -> usize {
        self.state.reference_count()
    }

    pub fn set_synchronized_with_transaction(&self, synchronized: bool) {
        self.state.set_synchronized_with_transaction(synchronized);
    }

    pub fn is_synchronized_with_transaction(&self) -> bool {
        self.state.is_synchronized_with_transaction()
    }

    /// Timeout hint, copied from the transaction's connection holder
    pub fn set_deadline(&self, deadline: Option<Instant>) {
        self.state.set_deadline(deadline);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.state.deadline()
    }

    pub fn time_to_live(&self) -> Option<Duration> {
        self.state.time_to_live()
    }

    pub fn reset(&self) {
        self.state.reset();
    }
}

impl std::fmt::Debug for SessionHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHolder")
            .field("session", &self.session)
            .field("executor_mode", &self.executor_mode)
            .field("has_translator", &self.translator.is_some())
            .field("reference_count", &self.reference_count())
            .field("synchronized", &self.is_synchronized_with_transaction())
            .finish()
    }
}
