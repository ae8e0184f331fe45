use tokio_util::sync::CancellationToken;

use super::TransactionalSession;
use crate::{
    clock::Clock,
    error::Result,
    executor::{run_with_retries, TransactionExecutor},
    options::TransactionOptions,
};

impl<C: Clock> TransactionExecutor<C> {
    /// Starts a transaction on `session`, runs `callback`, and commits the transaction, blocking
    /// the current thread until done. Retries happen exactly as for
    /// [`execute_with_retries`](TransactionExecutor::execute_with_retries).
    pub fn execute_with_retries_sync<S, R, F>(
        &self,
        session: &mut S,
        mut callback: F,
        options: impl Into<Option<TransactionOptions>>,
        cancellation: &CancellationToken,
    ) -> Result<R>
    where
        S: TransactionalSession + ?Sized,
        F: FnMut(&mut S, &CancellationToken) -> Result<R>,
    {
        let options = options.into();
        run_with_retries!(
            self,
            session,
            session.start_transaction(options.clone()),
            callback(&mut *session, cancellation),
            session.abort_transaction(cancellation),
            session.commit_transaction(cancellation),
        )
    }
}
