//! Contains the sync API. The blocking [`TransactionalSession`] trait and
//! [`TransactionExecutor::execute_with_retries_sync`](crate::TransactionExecutor::execute_with_retries_sync)
//! are always available; the blocking [`ClientSession`] requires the `sync` feature.

mod executor;
#[cfg(feature = "sync")]
mod session;


use tokio_util::sync::CancellationToken;

use crate::{error::Result, options::TransactionOptions, session::TransactionState};

#[cfg(feature = "sync")]
pub use session::ClientSession;

#[cfg(feature = "sync")]
pub(crate) static TOKIO_RUNTIME: std::sync::LazyLock<tokio::runtime::Runtime> =
    std::sync::LazyLock::new(|| match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => panic!("Error occurred when starting the underlying async runtime: {}", err),
    });

/// A session that transactions can be run on, with blocking methods. See
/// [`crate::TransactionalSession`] for the async equivalent.
pub trait TransactionalSession {
    /// Starts a new transaction with the given options. `None` means the session's defaults
    /// apply.
    fn start_transaction(&mut self, options: Option<TransactionOptions>) -> Result<()>;

    /// Commits the transaction that is currently active on this session.
    fn commit_transaction(&mut self, cancellation: &CancellationToken) -> Result<()>;

    /// Aborts the transaction that is currently active on this session.
    fn abort_transaction(&mut self, cancellation: &CancellationToken) -> Result<()>;

    /// The current state of this session's transaction.
    fn transaction_state(&self) -> &TransactionState;

    /// Whether this session is currently in a transaction.
    fn in_transaction(&self) -> bool {
        matches!(
            self.transaction_state(),
            TransactionState::Starting | TransactionState::InProgress
        )
    }
}
