//! The convenient transaction API: runs a callback inside a transaction, retrying the whole
//! transaction on transient errors and the commit alone when its outcome is unknown.


use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::{
    clock::{Clock, SystemClock},
    error::{Error, Result, TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT},
    options::TransactionOptions,
    session::TransactionalSession,
    trace::transaction_debug,
    BoxFuture,
};

/// The amount of time after which the [`TransactionExecutor`] stops retrying a transaction or
/// its commit.
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(120);

/// The outcome of a single invocation of the user callback.
pub(crate) enum CallbackOutcome<R> {
    WithResult(R),
    ShouldRetryTransaction,
}

/// What to do after a commitTransaction attempt failed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum CommitRetry {
    /// Issue commitTransaction again without rerunning the callback.
    Commit,
    /// Start the transaction over and rerun the callback.
    Transaction,
    /// Return the error to the caller.
    None,
}

/// Runs callbacks inside transactions, retrying them according to the error labels the server
/// and the session attach to failures.
///
/// Errors returned from the callback that carry a
/// [`TRANSIENT_TRANSACTION_ERROR`](crate::error::TRANSIENT_TRANSACTION_ERROR) label cause the
/// transaction to be aborted (if still open) and the callback to be run again in a new
/// transaction. Commit errors that carry an
/// [`UNKNOWN_TRANSACTION_COMMIT_RESULT`](crate::error::UNKNOWN_TRANSACTION_COMMIT_RESULT) label
/// cause only the commit to be retried. No retries of either kind happen once the configured
/// timeout (120 seconds by default) has elapsed since the first attempt began; the last error is
/// then returned unchanged.
///
/// If the callback returns an error, the transaction is aborted before the error is classified.
/// Should the abort itself fail, that failure is returned in place of the callback's error.
///
/// ```no_run
/// # use futures_util::FutureExt;
/// # use mongodb_txn::{bson::doc, error::Result, ClientSession, TransactionExecutor};
/// # use tokio_util::sync::CancellationToken;
/// # async fn run(mut session: ClientSession) -> Result<()> {
/// let executor = TransactionExecutor::new();
/// let token = CancellationToken::new();
/// let inserted = executor
///     .execute_with_retries(
///         &mut session,
///         |session, token| {
///             async move {
///                 session
///                     .run_command("test", doc! { "insert": "coll", "documents": [{ "x": 1 }] }, token)
///                     .await?;
///                 Ok(1)
///             }
///             .boxed()
///         },
///         None,
///         &token,
///     )
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct TransactionExecutor<C = SystemClock> {
    clock: C,
    timeout: Duration,
}

impl TransactionExecutor {
    /// Creates an executor that measures its retry budget with the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for TransactionExecutor {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! run_with_retries {
    (
        $executor:expr,
        $session:expr,
        $start_transaction:expr,
        $callback:expr,
        $abort_transaction:expr,
        $commit_transaction:expr,
    ) => {{
        use $crate::executor::{CallbackOutcome, CommitRetry};

        let executor = $executor;
        let start = executor.now();

        'transaction: loop {
            $start_transaction?;
            let outcome = match $callback {
                Ok(value) => CallbackOutcome::WithResult(value),
                Err(error) => {
                    if $session.in_transaction() {
                        $abort_transaction?;
                    }
                    if executor.should_retry_transaction(&error, start) {
                        CallbackOutcome::ShouldRetryTransaction
                    } else {
                        return Err(error);
                    }
                }
            };
            let result = match outcome {
                CallbackOutcome::WithResult(result) => result,
                CallbackOutcome::ShouldRetryTransaction => continue 'transaction,
            };
            if !$session.in_transaction() {
                return Ok(result);
            }
            'commit: loop {
                match $commit_transaction {
                    Ok(()) => return Ok(result),
                    Err(error) => match executor.commit_retry(&error, start) {
                        CommitRetry::Commit => continue 'commit,
                        CommitRetry::Transaction => continue 'transaction,
                        CommitRetry::None => return Err(error),
                    },
                }
            }
        }
    }};
}
pub(crate) use run_with_retries;

impl<C: Clock> TransactionExecutor<C> {
    /// Creates an executor that measures its retry budget with the given clock.
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            timeout: DEFAULT_TRANSACTION_TIMEOUT,
        }
    }

    /// Sets the amount of time after which retries stop. Defaults to
    /// [`DEFAULT_TRANSACTION_TIMEOUT`].
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The amount of time after which retries stop.
    pub fn transaction_timeout(&self) -> Duration {
        self.timeout
    }

    /// Starts a transaction on `session`, runs `callback`, and commits the transaction, retrying
    /// as described in the [type-level documentation](TransactionExecutor).
    ///
    /// `options` are passed unchanged to every
    /// [`start_transaction`](TransactionalSession::start_transaction) call. `cancellation` is
    /// handed to the callback and to every commit and abort; the executor itself never checks
    /// it, so a cancelled operation surfaces as an ordinary error and is only retried if it
    /// carries a retryable label.
    ///
    /// If the callback commits or aborts the transaction itself, its result is returned without
    /// a further commit.
    pub async fn execute_with_retries<S, R, F>(
        &self,
        session: &mut S,
        mut callback: F,
        options: impl Into<Option<TransactionOptions>>,
        cancellation: &CancellationToken,
    ) -> Result<R>
    where
        S: TransactionalSession + ?Sized,
        F: for<'b> FnMut(&'b mut S, &'b CancellationToken) -> BoxFuture<'b, Result<R>>,
    {
        let options = options.into();
        run_with_retries!(
            self,
            session,
            session.start_transaction(options.clone()).await,
            callback(&mut *session, cancellation).await,
            session.abort_transaction(cancellation).await,
            session.commit_transaction(cancellation).await,
        )
    }

    pub(crate) fn now(&self) -> Instant {
        self.clock.now()
    }

    fn is_expired(&self, start: Instant, now: Instant) -> bool {
        now.saturating_duration_since(start) >= self.timeout
    }

    /// Whether a failed callback should cause the transaction to be started over.
    pub(crate) fn should_retry_transaction(&self, error: &Error, start: Instant) -> bool {
        if !error.contains_label(TRANSIENT_TRANSACTION_ERROR) {
            return false;
        }
        if self.is_expired(start, self.now()) {
            transaction_debug!(
                error = %error,
                "transaction timeout elapsed, not retrying transaction"
            );
            return false;
        }
        transaction_debug!(error = %error, "retrying transaction after transient error");
        true
    }

    /// Decides how to proceed after commitTransaction failed with `error`.
    pub(crate) fn commit_retry(&self, error: &Error, start: Instant) -> CommitRetry {
        let now = self.now();
        let expired = self.is_expired(start, now);
        if expired
            && (error.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
                || error.contains_label(TRANSIENT_TRANSACTION_ERROR))
        {
            transaction_debug!(
                error = %error,
                "transaction timeout elapsed, not retrying commit"
            );
        }
        if error.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
            && !expired
            && !error.is_max_time_ms_expired_error()
        {
            transaction_debug!(error = %error, "retrying commit with unknown result");
            CommitRetry::Commit
        } else if error.contains_label(TRANSIENT_TRANSACTION_ERROR) && !expired {
            transaction_debug!(error = %error, "retrying transaction after transient commit error");
            CommitRetry::Transaction
        } else {
            CommitRetry::None
        }
    }
}
