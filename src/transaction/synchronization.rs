use crate::core::Result;
use async_trait::async_trait;

/// Order value for synchronizations that don't care when they run
pub const LOWEST_PRECEDENCE: i32 = i32::MAX;

/// Order of the connection-level synchronization. Anything that has to
/// flush through the connection before it commits must sort below this.
pub const CONNECTION_SYNCHRONIZATION_ORDER: i32 = 1000;

/// Outcome reported to `after_completion`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Committed,
    RolledBack,
    /// Heuristic outcome or a failure inside the commit itself
    Unknown,
}

impl std::fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletionStatus::Committed => write!(f, "COMMITTED"),
            CompletionStatus::RolledBack => write!(f, "ROLLED_BACK"),
            CompletionStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Callbacks invoked by the transaction manager at suspend, resume,
/// pre-commit, pre-completion and post-completion points.
///
/// Synchronizations run in ascending `order()`. `before_completion` and
/// `after_completion` may be called from a different thread than the one
/// that registered the synchronization.
#[async_trait]
pub trait TransactionSynchronization: Send + Sync {
    fn order(&self) -> i32 {
        LOWEST_PRECEDENCE
    }

    async fn suspend(&self) -> Result<()> {
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        Ok(())
    }

    /// Errors abort the commit
    async fn before_commit(&self, _read_only: bool) -> Result<()> {
        Ok(())
    }

    /// Runs before commit or rollback; errors are logged, not propagated
    async fn before_completion(&self) -> Result<()> {
        Ok(())
    }

    /// Runs after commit or rollback; errors are logged, not propagated
    async fn after_completion(&self, _status: CompletionStatus) -> Result<()> {
        Ok(())
    }
}
