use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{TransactionalSession, TOKIO_RUNTIME};
use crate::{
    bson::Document,
    error::Result,
    operation::OperationExecutor,
    options::{SessionOptions, TransactionOptions},
    session::TransactionState,
    ClientSession as AsyncClientSession,
    TransactionExecutor,
};

/// A MongoDB client session with a blocking API. Every method drives the equivalent method of
/// the async [`ClientSession`](crate::ClientSession) to completion on a runtime owned by this
/// crate.
///
/// `ClientSession` instances are not thread safe or fork safe. They can only be used by one thread
/// or process at a time.
#[derive(Debug)]
pub struct ClientSession {
    pub(crate) async_client_session: AsyncClientSession,
}

impl From<AsyncClientSession> for ClientSession {
    fn from(async_client_session: AsyncClientSession) -> Self {
        Self {
            async_client_session,
        }
    }
}

impl ClientSession {
    /// Creates a new session that sends its commands through `executor`.
    pub fn new(
        executor: Arc<dyn OperationExecutor>,
        options: impl Into<Option<SessionOptions>>,
    ) -> Self {
        AsyncClientSession::new(executor, options).into()
    }

    /// The id of this session.
    pub fn id(&self) -> &Document {
        self.async_client_session.id()
    }

    /// The number of the most recently started transaction.
    pub fn txn_number(&self) -> i64 {
        self.async_client_session.txn_number()
    }

    /// Runs `body` as a command against the database `db` in this session. If a transaction is
    /// active, the command becomes part of it.
    pub fn run_command(
        &mut self,
        db: impl AsRef<str>,
        body: Document,
        cancellation: &CancellationToken,
    ) -> Result<Document> {
        TOKIO_RUNTIME.block_on(self.async_client_session.run_command(db, body, cancellation))
    }

    /// Starts a transaction, runs the given callback, and commits or aborts the transaction,
    /// retrying as described on [`TransactionExecutor`].
    ///
    /// Errors from commands inside the callback MUST be returned from it; otherwise the
    /// transaction will be committed regardless.
    pub fn with_transaction<R, F>(
        &mut self,
        callback: F,
        options: impl Into<Option<TransactionOptions>>,
    ) -> Result<R>
    where
        F: FnMut(&mut ClientSession, &CancellationToken) -> Result<R>,
    {
        TransactionExecutor::new().execute_with_retries_sync(
            self,
            callback,
            options,
            &CancellationToken::new(),
        )
    }
}

impl TransactionalSession for ClientSession {
    fn start_transaction(&mut self, options: Option<TransactionOptions>) -> Result<()> {
        TOKIO_RUNTIME.block_on(self.async_client_session.start_transaction(options))
    }

    fn commit_transaction(&mut self, cancellation: &CancellationToken) -> Result<()> {
        TOKIO_RUNTIME.block_on(self.async_client_session.commit_transaction(cancellation))
    }

    fn abort_transaction(&mut self, cancellation: &CancellationToken) -> Result<()> {
        TOKIO_RUNTIME.block_on(self.async_client_session.abort_transaction(cancellation))
    }

    fn transaction_state(&self) -> &TransactionState {
        crate::TransactionalSession::transaction_state(&self.async_client_session)
    }
}
