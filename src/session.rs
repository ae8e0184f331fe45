//! Client sessions and the transaction state machine they carry.


use std::sync::Arc;

use derive_more::Display;
use derive_where::derive_where;
use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    bson::{doc, spec::BinarySubtype, Binary, Bson, Document},
    error::{Error, Result, TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT},
    executor::TransactionExecutor,
    operation::{handle_command_response, AbortTransaction, Command, CommitTransaction, OperationExecutor},
    options::{SessionOptions, TransactionOptions},
    trace::transaction_debug,
    BoxFuture,
};

/// The lifecycle stage of the transaction on a session.
#[derive(Clone, Debug, Display, PartialEq)]
#[non_exhaustive]
pub enum TransactionState {
    /// No transaction has been started on the session.
    None,

    /// A transaction has been started but no operation has been sent in it yet.
    Starting,

    /// At least one operation has been sent in the transaction.
    InProgress,

    /// The transaction has been committed.
    #[display("Committed")]
    Committed {
        /// Whether any data was committed when commit_transaction was initially called. This is
        /// required to determine whether a commitTransaction command should be run if the user
        /// calls commit_transaction again.
        data_committed: bool,
    },

    /// The transaction has been aborted.
    Aborted,
}

/// A session that transactions can be run on. The
/// [`TransactionExecutor`](crate::TransactionExecutor) drives a transaction entirely through this
/// interface.
///
/// Implementations own the transaction lifecycle: `start_transaction` must move the state to
/// [`TransactionState::Starting`], and `commit_transaction`/`abort_transaction` must move it out
/// of [`TransactionState::Starting`]/[`TransactionState::InProgress`].
pub trait TransactionalSession: Send {
    /// Starts a new transaction with the given options. `None` means the session's defaults
    /// apply.
    fn start_transaction(&mut self, options: Option<TransactionOptions>) -> BoxFuture<'_, Result<()>>;

    /// Commits the transaction that is currently active on this session.
    fn commit_transaction<'a>(
        &'a mut self,
        cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>>;

    /// Aborts the transaction that is currently active on this session.
    fn abort_transaction<'a>(
        &'a mut self,
        cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>>;

    /// The current state of this session's transaction.
    fn transaction_state(&self) -> &TransactionState;

    /// Whether this session is currently in a transaction, i.e. one has been started and not yet
    /// committed or aborted.
    fn in_transaction(&self) -> bool {
        matches!(
            self.transaction_state(),
            TransactionState::Starting | TransactionState::InProgress
        )
    }
}

#[derive(Debug, Default)]
pub(crate) struct Transaction {
    pub(crate) state: TransactionState,
    pub(crate) options: Option<TransactionOptions>,
    pub(crate) recovery_token: Option<Document>,
}

impl Default for TransactionState {
    fn default() -> Self {
        Self::None
    }
}

impl Transaction {
    fn start(&mut self, options: Option<TransactionOptions>) {
        self.state = TransactionState::Starting;
        self.options = options;
        self.recovery_token = None;
    }

    fn commit(&mut self, data_committed: bool) {
        self.state = TransactionState::Committed { data_committed };
    }

    fn abort(&mut self) {
        self.state = TransactionState::Aborted;
        self.options = None;
    }

    fn reset(&mut self) {
        self.state = TransactionState::None;
        self.options = None;
        self.recovery_token = None;
    }
}

/// A MongoDB client session. This struct represents a logical session used for ordering sequential
/// operations and for running transactions. Commands are sent through the
/// [`OperationExecutor`] the session was created with.
///
/// `ClientSession` instances are not thread safe or fork safe. They can only be used by one thread
/// or process at a time.
///
/// ## Transactions
/// To begin a transaction, call [`ClientSession::start_transaction`]; every command run with
/// [`ClientSession::run_command`] until the transaction is committed or aborted is part of it.
/// [`ClientSession::with_transaction`] runs a callback in a transaction and takes care of
/// retrying on transient errors.
#[derive_where(Debug)]
pub struct ClientSession {
    #[derive_where(skip)]
    executor: Arc<dyn OperationExecutor>,
    id: Document,
    options: Option<SessionOptions>,
    txn_number: i64,
    pub(crate) transaction: Transaction,
}

impl ClientSession {
    /// Creates a new session that sends its commands through `executor`. The session id is
    /// generated client side.
    pub fn new(
        executor: Arc<dyn OperationExecutor>,
        options: impl Into<Option<SessionOptions>>,
    ) -> Self {
        let binary = Bson::Binary(Binary {
            subtype: BinarySubtype::Uuid,
            bytes: Uuid::new_v4().as_bytes().to_vec(),
        });
        Self {
            executor,
            id: doc! { "id": binary },
            options: options.into(),
            txn_number: 0,
            transaction: Default::default(),
        }
    }

    /// The id of this session.
    pub fn id(&self) -> &Document {
        &self.id
    }

    /// The options used to create this session.
    pub fn options(&self) -> Option<&SessionOptions> {
        self.options.as_ref()
    }

    /// The number of the most recently started transaction.
    pub fn txn_number(&self) -> i64 {
        self.txn_number
    }

    fn default_transaction_options(&self) -> Option<&TransactionOptions> {
        self.options
            .as_ref()
            .and_then(|options| options.default_transaction_options.as_ref())
    }

    /// Starts a new transaction on this session. Options that are not set are taken from the
    /// session's `default_transaction_options`.
    ///
    /// Errors returned from commands executed within a transaction may include a
    /// [`crate::error::TRANSIENT_TRANSACTION_ERROR`] label. This label indicates that the entire
    /// transaction can be retried with a reasonable expectation that it will succeed.
    pub async fn start_transaction(
        &mut self,
        options: impl Into<Option<TransactionOptions>>,
    ) -> Result<()> {
        if self
            .options
            .as_ref()
            .and_then(|o| o.snapshot)
            .unwrap_or(false)
        {
            return Err(Error::transaction(
                "Transactions are not supported in snapshot sessions",
            ));
        }
        if self.in_transaction() {
            return Err(Error::transaction("transaction already in progress"));
        }
        if !self.executor.supports_transactions().await? {
            return Err(Error::transaction(
                "Transactions are not supported by this deployment",
            ));
        }

        let options = match options.into() {
            Some(mut options) => {
                if let Some(defaults) = self.default_transaction_options() {
                    options.merge_defaults(defaults);
                }
                Some(options)
            }
            None => self.default_transaction_options().cloned(),
        };
        if let Some(write_concern) = options.as_ref().and_then(|o| o.write_concern.as_ref()) {
            write_concern.validate()?;
            if !write_concern.is_acknowledged() {
                return Err(Error::transaction(
                    "transactions do not support unacknowledged write concerns",
                ));
            }
        }

        self.txn_number += 1;
        self.transaction.start(options);
        transaction_debug!(txn_number = self.txn_number, "transaction started");
        Ok(())
    }

    /// Runs `body` as a command against the database `db` in this session. If a transaction is
    /// active, the command becomes part of it.
    pub async fn run_command(
        &mut self,
        db: impl AsRef<str>,
        body: Document,
        cancellation: &CancellationToken,
    ) -> Result<Document> {
        let name = match body.keys().next() {
            Some(name) => name.clone(),
            None => {
                return Err(Error::invalid_argument(
                    "an empty document cannot be run as a command",
                ))
            }
        };
        if matches!(
            self.transaction.state,
            TransactionState::Committed { .. } | TransactionState::Aborted
        ) {
            self.transaction.reset();
        }

        let mut command = Command::new(name, db.as_ref().to_string(), body);
        command.set_session(&self.id);
        let in_transaction = self.in_transaction();
        if in_transaction {
            command.set_txn_number(self.txn_number);
            command.set_autocommit();
            if self.transaction.state == TransactionState::Starting {
                command.set_start_transaction();
                if let Some(read_concern) = self
                    .transaction
                    .options
                    .as_ref()
                    .and_then(|o| o.read_concern.as_ref())
                {
                    command.set_read_concern(read_concern)?;
                }
                self.transaction.state = TransactionState::InProgress;
            }
        }

        let result = self
            .executor
            .execute_command(command, cancellation)
            .await
            .and_then(handle_command_response);
        match result {
            Ok(response) => {
                if in_transaction {
                    if let Ok(token) = response.get_document("recoveryToken") {
                        self.transaction.recovery_token = Some(token.clone());
                    }
                }
                Ok(response)
            }
            Err(mut error) => {
                if in_transaction && (error.is_network_error() || error.is_server_selection_error())
                {
                    error.add_label(TRANSIENT_TRANSACTION_ERROR);
                }
                Err(error)
            }
        }
    }

    /// Commits the transaction that is currently active on this session.
    ///
    /// This method may return an error with a [`crate::error::UNKNOWN_TRANSACTION_COMMIT_RESULT`]
    /// label. This label indicates that it is unknown whether the commit has satisfied the write
    /// concern associated with the transaction. If an error with this label is returned, it is
    /// safe to retry the commit until the write concern is satisfied or an error without the label
    /// is returned.
    pub async fn commit_transaction(&mut self, cancellation: &CancellationToken) -> Result<()> {
        match self.transaction.state {
            TransactionState::None => Err(Error::transaction("no transaction started")),
            TransactionState::Aborted => Err(Error::transaction(
                "Cannot call commitTransaction after calling abortTransaction",
            )),
            TransactionState::Starting => {
                self.transaction.commit(false);
                Ok(())
            }
            TransactionState::InProgress => {
                let commit_transaction = CommitTransaction::new(
                    self.transaction.options.clone(),
                    self.transaction.recovery_token.clone(),
                );
                self.transaction.commit(true);
                self.execute_commit(commit_transaction, cancellation).await
            }
            TransactionState::Committed {
                data_committed: true,
            } => {
                let mut commit_transaction = CommitTransaction::new(
                    self.transaction.options.clone(),
                    self.transaction.recovery_token.clone(),
                );
                commit_transaction.update_for_retry();
                self.execute_commit(commit_transaction, cancellation).await
            }
            TransactionState::Committed {
                data_committed: false,
            } => Ok(()),
        }
    }

    async fn execute_commit(
        &mut self,
        commit_transaction: CommitTransaction,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        let command = self.transaction_command(commit_transaction.build()?);
        self.executor
            .execute_command(command, cancellation)
            .await
            .and_then(|response| commit_transaction.handle_response(response))
            .map_err(|mut error| {
                if error.should_add_unknown_commit_result_label() {
                    error.remove_label(TRANSIENT_TRANSACTION_ERROR);
                    error.add_label(UNKNOWN_TRANSACTION_COMMIT_RESULT);
                }
                error
            })
    }

    /// Aborts the transaction that is currently active on this session. Any error returned by the
    /// server in response to the abortTransaction command is ignored.
    pub async fn abort_transaction(&mut self, cancellation: &CancellationToken) -> Result<()> {
        match self.transaction.state {
            TransactionState::None => Err(Error::transaction("no transaction started")),
            TransactionState::Committed { .. } => Err(Error::transaction(
                "Cannot call abortTransaction after calling commitTransaction",
            )),
            TransactionState::Aborted => {
                Err(Error::transaction("cannot call abortTransaction twice"))
            }
            TransactionState::Starting => {
                self.transaction.abort();
                Ok(())
            }
            TransactionState::InProgress => {
                let write_concern = self
                    .transaction
                    .options
                    .as_ref()
                    .and_then(|options| options.write_concern.clone());
                let abort_transaction =
                    AbortTransaction::new(write_concern, self.transaction.recovery_token.take());
                self.transaction.abort();
                let result = match abort_transaction.build() {
                    Ok(command) => {
                        let command = self.transaction_command(command);
                        self.executor
                            .execute_command(command, cancellation)
                            .await
                            .and_then(|response| abort_transaction.handle_response(response))
                    }
                    Err(error) => Err(error),
                };
                if let Err(_error) = result {
                    transaction_debug!(error = %_error, "ignoring abortTransaction failure");
                }
                Ok(())
            }
        }
    }

    /// Starts a transaction, runs the given callback, and commits or aborts the transaction,
    /// retrying as described on [`TransactionExecutor`].
    ///
    /// If a command inside the callback fails, it may cause the transaction on the server to be
    /// aborted. If the callback does not return that error, the transaction will be committed
    /// and the commit will fail, so errors from commands inside the callback MUST be returned
    /// from it.
    pub async fn with_transaction<R, F>(
        &mut self,
        callback: F,
        options: impl Into<Option<TransactionOptions>>,
    ) -> Result<R>
    where
        F: for<'b> FnMut(&'b mut ClientSession, &'b CancellationToken) -> BoxFuture<'b, Result<R>>,
    {
        TransactionExecutor::new()
            .execute_with_retries(self, callback, options, &CancellationToken::new())
            .await
    }

    fn transaction_command(&self, mut command: Command) -> Command {
        command.set_session(&self.id);
        command.set_txn_number(self.txn_number);
        command.set_autocommit();
        command
    }
}

impl TransactionalSession for ClientSession {
    fn start_transaction(&mut self, options: Option<TransactionOptions>) -> BoxFuture<'_, Result<()>> {
        ClientSession::start_transaction(self, options).boxed()
    }

    fn commit_transaction<'a>(
        &'a mut self,
        cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>> {
        ClientSession::commit_transaction(self, cancellation).boxed()
    }

    fn abort_transaction<'a>(
        &'a mut self,
        cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>> {
        ClientSession::abort_transaction(self, cancellation).boxed()
    }

    fn transaction_state(&self) -> &TransactionState {
        &self.transaction.state
    }
}
