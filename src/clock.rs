//! Time sources used to budget transaction retries.

use std::{sync::Arc, time::Instant};

/// A source of monotonic time. The [`TransactionExecutor`](crate::TransactionExecutor) reads it
/// once when a transaction begins and once at every retry decision, so a custom implementation
/// can drive retry timing deterministically.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Instant;
}

/// A [`Clock`] backed by [`Instant::now`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}
