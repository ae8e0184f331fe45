#[cfg(feature = "tracing-unstable")]
pub(crate) mod trace;

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::{Duration, Instant},
};

use futures_util::{future, FutureExt};
use tokio_util::sync::CancellationToken;

use crate::{
    bson::{doc, Document},
    clock::Clock,
    error::{
        CommandError,
        Error,
        ErrorKind,
        Result,
        WriteConcernError,
        WriteFailure,
        TRANSIENT_TRANSACTION_ERROR,
        UNKNOWN_TRANSACTION_COMMIT_RESULT,
    },
    operation::{Command, OperationExecutor},
    options::TransactionOptions,
    session::{TransactionState, TransactionalSession},
    BoxFuture,
};

/// Creates a command error with the given code and labels.
pub(crate) fn labeled_error(code: i32, labels: &[&str]) -> Error {
    Error::new(
        ErrorKind::Command(CommandError {
            code,
            code_name: "TestError".to_string(),
            message: format!("test error {}", code),
        }),
        Some(labels.iter().map(|label| label.to_string())),
    )
}

/// A WriteConflict error as returned by the server inside a transaction.
pub(crate) fn transient_error() -> Error {
    labeled_error(112, &[TRANSIENT_TRANSACTION_ERROR])
}

pub(crate) fn network_error() -> Error {
    ErrorKind::from(std::io::ErrorKind::ConnectionReset).into()
}

/// A commit failure whose outcome on the server is unknown.
pub(crate) fn unknown_commit_result_error() -> Error {
    let mut error = network_error();
    error.add_label(UNKNOWN_TRANSACTION_COMMIT_RESULT);
    error
}

/// A MaxTimeMSExpired write concern error labeled as having an unknown commit result.
pub(crate) fn max_time_ms_expired_error() -> Error {
    Error::new(
        ErrorKind::Write(WriteFailure::WriteConcernError(WriteConcernError {
            code: 50,
            code_name: "MaxTimeMSExpired".to_string(),
            message: "operation exceeded time limit".to_string(),
            details: None,
            labels: Vec::new(),
        })),
        Some(vec![UNKNOWN_TRANSACTION_COMMIT_RESULT.to_string()]),
    )
}

/// A clock that returns a scripted sequence of offsets from a fixed starting instant. Once the
/// script runs out, the last offset is repeated.
#[derive(Debug)]
pub(crate) struct MockClock {
    base: Instant,
    offsets: Mutex<VecDeque<Duration>>,
    last: Mutex<Duration>,
    reads: AtomicUsize,
}

impl MockClock {
    pub(crate) fn new(offsets: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            base: Instant::now(),
            offsets: Mutex::new(offsets.into_iter().collect()),
            last: Mutex::new(Duration::ZERO),
            reads: AtomicUsize::new(0),
        }
    }

    pub(crate) fn from_secs(offsets: impl IntoIterator<Item = u64>) -> Self {
        Self::new(offsets.into_iter().map(Duration::from_secs))
    }

    /// The number of times `now` has been called.
    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock().unwrap();
        if let Some(offset) = self.offsets.lock().unwrap().pop_front() {
            *last = offset;
        }
        self.base + *last
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum SessionEvent {
    Start,
    Callback,
    Abort,
    Commit,
}

/// A session with scripted results for each transaction operation. Operations without a
/// scripted result succeed.
#[derive(Debug, Default)]
pub(crate) struct MockSession {
    state: TransactionState,
    events: Vec<SessionEvent>,
    start_options: Vec<Option<TransactionOptions>>,
    commit_results: VecDeque<Result<()>>,
    abort_results: VecDeque<Result<()>>,
}

impl MockSession {
    pub(crate) fn new() -> Self {
        Default::default()
    }

    pub(crate) fn commit_results(mut self, results: impl IntoIterator<Item = Result<()>>) -> Self {
        self.commit_results = results.into_iter().collect();
        self
    }

    pub(crate) fn abort_results(mut self, results: impl IntoIterator<Item = Result<()>>) -> Self {
        self.abort_results = results.into_iter().collect();
        self
    }

    pub(crate) fn events(&self) -> &[SessionEvent] {
        &self.events
    }

    pub(crate) fn count(&self, event: SessionEvent) -> usize {
        self.events.iter().filter(|e| **e == event).count()
    }

    pub(crate) fn start_options(&self) -> &[Option<TransactionOptions>] {
        &self.start_options
    }

    /// Records an invocation of a transaction callback.
    pub(crate) fn record_callback(&mut self) {
        self.events.push(SessionEvent::Callback);
    }

    /// Marks the transaction as having an operation sent in it.
    pub(crate) fn mark_in_progress(&mut self) {
        self.state = TransactionState::InProgress;
    }

    /// Moves the transaction to the given state without recording an event, as if user code
    /// committed or aborted it.
    pub(crate) fn set_state(&mut self, state: TransactionState) {
        self.state = state;
    }

    fn start(&mut self, options: Option<TransactionOptions>) -> Result<()> {
        self.events.push(SessionEvent::Start);
        self.start_options.push(options);
        self.state = TransactionState::Starting;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.events.push(SessionEvent::Commit);
        self.state = TransactionState::Committed {
            data_committed: true,
        };
        self.commit_results.pop_front().unwrap_or(Ok(()))
    }

    fn abort(&mut self) -> Result<()> {
        self.events.push(SessionEvent::Abort);
        self.state = TransactionState::Aborted;
        self.abort_results.pop_front().unwrap_or(Ok(()))
    }
}

impl TransactionalSession for MockSession {
    fn start_transaction(&mut self, options: Option<TransactionOptions>) -> BoxFuture<'_, Result<()>> {
        future::ready(self.start(options)).boxed()
    }

    fn commit_transaction<'a>(
        &'a mut self,
        _cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>> {
        future::ready(self.commit()).boxed()
    }

    fn abort_transaction<'a>(
        &'a mut self,
        _cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>> {
        future::ready(self.abort()).boxed()
    }

    fn transaction_state(&self) -> &TransactionState {
        &self.state
    }
}

impl crate::sync::TransactionalSession for MockSession {
    fn start_transaction(&mut self, options: Option<TransactionOptions>) -> Result<()> {
        self.start(options)
    }

    fn commit_transaction(&mut self, _cancellation: &CancellationToken) -> Result<()> {
        self.commit()
    }

    fn abort_transaction(&mut self, _cancellation: &CancellationToken) -> Result<()> {
        self.abort()
    }

    fn transaction_state(&self) -> &TransactionState {
        &self.state
    }
}

/// An `OperationExecutor` that records the commands it is given and replies with scripted
/// responses, defaulting to `{ ok: 1 }`.
#[derive(Debug)]
pub(crate) struct MockExecutor {
    supports_transactions: bool,
    commands: Mutex<Vec<Command>>,
    responses: Mutex<VecDeque<Result<Document>>>,
}

impl MockExecutor {
    pub(crate) fn new() -> Self {
        Self {
            supports_transactions: true,
            commands: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn without_transaction_support() -> Self {
        Self {
            supports_transactions: false,
            ..Self::new()
        }
    }

    pub(crate) fn push_response(&self, response: Result<Document>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub(crate) fn commands(&self) -> Vec<Command> {
        self.commands.lock().unwrap().clone()
    }

    pub(crate) fn command_names(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|command| command.name.clone())
            .collect()
    }
}

impl OperationExecutor for MockExecutor {
    fn supports_transactions(&self) -> BoxFuture<'_, Result<bool>> {
        future::ready(Ok(self.supports_transactions)).boxed()
    }

    fn execute_command<'a>(
        &'a self,
        command: Command,
        _cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Document>> {
        self.commands.lock().unwrap().push(command);
        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(doc! { "ok": 1 }));
        future::ready(response).boxed()
    }
}
