use futures_util::{future, FutureExt};
use tokio_util::sync::CancellationToken;
use tracing::Level;

use crate::{
    executor::TransactionExecutor,
    test::{transient_error, unknown_commit_result_error, MockClock, MockSession, TracingHandler},
    trace::TRANSACTION_TRACING_EVENT_TARGET,
};

#[test]
fn retry_decisions_are_traced() {
    let handler = TracingHandler::new(Level::DEBUG);
    let _guard = handler.set_as_default();

    let executor = TransactionExecutor::with_clock(MockClock::from_secs([0]));
    let mut session = MockSession::new().commit_results([Err(unknown_commit_result_error())]);
    let mut attempts = 0;
    futures::executor::block_on(executor.execute_with_retries(
        &mut session,
        |_, _| {
            attempts += 1;
            let result = if attempts == 1 {
                Err(transient_error())
            } else {
                Ok(())
            };
            future::ready(result).boxed()
        },
        None,
        &CancellationToken::new(),
    ))
    .unwrap();

    let messages: Vec<String> = handler
        .events_for_target(TRANSACTION_TRACING_EVENT_TARGET)
        .into_iter()
        .inspect(|event| assert_eq!(event.level, Level::DEBUG))
        .filter_map(|event| event.message().map(ToString::to_string))
        .collect();
    assert_eq!(
        messages,
        vec![
            "retrying transaction after transient error",
            "retrying commit with unknown result",
        ]
    );
}

#[test]
fn timeout_is_traced() {
    let handler = TracingHandler::new(Level::DEBUG);
    let _guard = handler.set_as_default();

    let executor = TransactionExecutor::with_clock(MockClock::from_secs([0, 200]));
    let mut session = MockSession::new();
    let error = futures::executor::block_on(executor.execute_with_retries(
        &mut session,
        |_, _| future::ready(Err::<(), _>(transient_error())).boxed(),
        None,
        &CancellationToken::new(),
    ))
    .unwrap_err();

    let events = handler.events_for_target(TRANSACTION_TRACING_EVENT_TARGET);
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].message(),
        Some("transaction timeout elapsed, not retrying transaction")
    );
    assert!(events[0].fields.contains_key("error"));
    assert_eq!(error.code(), Some(112));
}
