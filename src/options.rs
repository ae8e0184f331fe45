//! Contains all of the types needed to specify options to sessions and transactions.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use typed_builder::TypedBuilder;

pub use crate::concern::{Acknowledgment, ReadConcern, ReadConcernLevel, WriteConcern};
use crate::serde_util;

/// Contains the options that can be used for a transaction.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder, PartialEq)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct TransactionOptions {
    /// The read concern to use for the transaction. Sent on the first command of the
    /// transaction.
    pub read_concern: Option<ReadConcern>,

    /// The write concern to use when committing or aborting a transaction.
    pub write_concern: Option<WriteConcern>,

    /// The maximum amount of time to allow a single commitTransaction to run.
    #[serde(
        serialize_with = "serde_util::serialize_duration_option_as_int_millis",
        deserialize_with = "serde_util::deserialize_duration_option_from_u64_millis",
        rename = "maxCommitTimeMS",
        default
    )]
    pub max_commit_time: Option<Duration>,
}

impl TransactionOptions {
    /// Fills in any unset fields of these options from `defaults`.
    pub(crate) fn merge_defaults(&mut self, defaults: &TransactionOptions) {
        if self.read_concern.is_none() {
            self.read_concern = defaults.read_concern.clone();
        }
        if self.write_concern.is_none() {
            self.write_concern = defaults.write_concern.clone();
        }
        if self.max_commit_time.is_none() {
            self.max_commit_time = defaults.max_commit_time;
        }
    }
}

/// Contains the options that can be used to create a new
/// [`ClientSession`](crate::ClientSession).
#[derive(Clone, Debug, Default, Deserialize, TypedBuilder, PartialEq)]
#[builder(field_defaults(default, setter(into)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct SessionOptions {
    /// The default options to use for transactions started on this session.
    ///
    /// Any field left unset in the options passed to
    /// [`ClientSession::start_transaction`](crate::ClientSession::start_transaction) is taken from
    /// these defaults.
    pub default_transaction_options: Option<TransactionOptions>,

    /// If true, all read operations performed using this session will be read from the same
    /// snapshot. Snapshot sessions do not support transactions.
    ///
    /// Defaults to false.
    pub snapshot: Option<bool>,
}
