//! Tracing support. Events are only emitted when the `tracing-unstable` feature is enabled.

#[cfg(all(test, feature = "tracing-unstable"))]
mod test;

#[cfg_attr(not(feature = "tracing-unstable"), allow(dead_code))]
pub(crate) const TRANSACTION_TRACING_EVENT_TARGET: &str = "mongodb_txn::transaction";

/// Emits a DEBUG event under the transaction tracing target.
macro_rules! transaction_debug {
    ($($arg:tt)+) => {{
        #[cfg(feature = "tracing-unstable")]
        {
            tracing::debug!(
                target: $crate::trace::TRANSACTION_TRACING_EVENT_TARGET,
                $($arg)+
            );
        }
    }};
}
pub(crate) use transaction_debug;
