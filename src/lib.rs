//! This crate contains the convenient transaction API for MongoDB sessions: a
//! [`TransactionExecutor`] that runs a unit of work inside a multi-document transaction and
//! transparently retries it according to the error labels the server attaches to failures.
//!
//! Selecting servers and sending commands over the wire is the job of the core driver, reached
//! through the [`OperationExecutor`] trait. This crate decides which transaction commands to send
//! and when to retry them.
//!
//! # Retry behavior
//!
//! - An error returned from the unit of work that carries the
//!   [`TRANSIENT_TRANSACTION_ERROR`](error::TRANSIENT_TRANSACTION_ERROR) label aborts the
//!   transaction and runs the unit of work again in a fresh transaction.
//! - A commit error that carries the
//!   [`UNKNOWN_TRANSACTION_COMMIT_RESULT`](error::UNKNOWN_TRANSACTION_COMMIT_RESULT) label only
//!   retries the commit, since committing twice is a no-op on the server. Commit errors reporting
//!   that the server ran out of time (`MaxTimeMSExpired`) are never retried.
//! - No retries happen once [`DEFAULT_TRANSACTION_TIMEOUT`] (or the timeout configured on the
//!   executor) has passed since the first attempt started; the last error is returned unchanged.
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use futures_util::FutureExt;
//! use mongodb_txn::{
//!     bson::doc,
//!     error::Result,
//!     options::{ReadConcern, TransactionOptions, WriteConcern},
//!     ClientSession,
//!     OperationExecutor,
//! };
//!
//! # async fn run(executor: Arc<dyn OperationExecutor>) -> Result<()> {
//! let mut session = ClientSession::new(executor, None);
//! let options = TransactionOptions::builder()
//!     .read_concern(ReadConcern::majority())
//!     .write_concern(WriteConcern::majority())
//!     .build();
//! session
//!     .with_transaction(
//!         |session, token| {
//!             async move {
//!                 session
//!                     .run_command("bank", doc! { "update": "accounts", "updates": [] }, token)
//!                     .await?;
//!                 Ok(())
//!             }
//!             .boxed()
//!         },
//!         options,
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Feature flags
//!
//! | Feature            | Description                                                              | Default |
//! |:-------------------|:-------------------------------------------------------------------------|:--------|
//! | `sync`             | Expose a blocking [`sync::ClientSession`] driven by an internal runtime. | no      |
//! | `tracing-unstable` | Emit [`tracing`](https://docs.rs/tracing) events for retry decisions.    | no      |

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use ::bson;

mod bson_util;
pub mod clock;
mod concern;
pub mod error;
mod executor;
mod operation;
pub mod options;
mod serde_util;
mod session;
pub mod sync;
mod trace;

pub use futures_util::future::BoxFuture;
pub use tokio_util::sync::CancellationToken;

pub use crate::{
    clock::{Clock, SystemClock},
    executor::{TransactionExecutor, DEFAULT_TRANSACTION_TIMEOUT},
    operation::{Command, OperationExecutor},
    session::{ClientSession, TransactionState, TransactionalSession},
};
