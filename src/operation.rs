//! The commands this crate sends and the interface to the layer that sends them.

mod abort_transaction;
mod commit_transaction;


use std::fmt::Debug;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::{
    bson::{self, Document},
    bson_util,
    error::{CommandError, Error, ErrorKind, Result, WriteConcernError, WriteFailure},
    options::{ReadConcern, WriteConcern},
    BoxFuture,
};

pub(crate) use abort_transaction::AbortTransaction;
pub(crate) use commit_transaction::CommitTransaction;

/// The layer that selects a server, sends a command over the wire, and returns the server's
/// reply. Implemented by the core driver; this crate only decides which commands to send.
pub trait OperationExecutor: Send + Sync {
    /// Whether the deployment supports transactions.
    fn supports_transactions(&self) -> BoxFuture<'_, Result<bool>>;

    /// Executes `command` and returns the raw reply. Failures to obtain a reply (network errors,
    /// server selection errors, cancellation) are returned as errors; replies with `ok: 0` are
    /// returned as-is and interpreted by the caller.
    fn execute_command<'a>(
        &'a self,
        command: Command,
        cancellation: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Document>>;
}

/// A command to be sent to the server.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct Command {
    /// The name of the command.
    pub name: String,

    /// The database the command is run against.
    pub target_db: String,

    /// The command document.
    pub body: Document,
}

impl Command {
    pub(crate) fn new(name: impl ToString, target_db: impl ToString, body: Document) -> Self {
        Self {
            name: name.to_string(),
            target_db: target_db.to_string(),
            body,
        }
    }

    pub(crate) fn set_session(&mut self, lsid: &Document) {
        self.body.insert("lsid", lsid.clone());
    }

    pub(crate) fn set_txn_number(&mut self, txn_number: i64) {
        self.body.insert("txnNumber", txn_number);
    }

    pub(crate) fn set_autocommit(&mut self) {
        self.body.insert("autocommit", false);
    }

    pub(crate) fn set_start_transaction(&mut self) {
        self.body.insert("startTransaction", true);
    }

    pub(crate) fn set_read_concern(&mut self, read_concern: &ReadConcern) -> Result<()> {
        self.body
            .insert("readConcern", bson::to_bson(read_concern)?);
        Ok(())
    }

    pub(crate) fn set_write_concern(&mut self, write_concern: Option<&WriteConcern>) -> Result<()> {
        if let Some(write_concern) = write_concern {
            if !write_concern.is_empty() {
                self.body
                    .insert("writeConcern", bson::to_bson(write_concern)?);
            }
        }
        Ok(())
    }

    pub(crate) fn set_recovery_token(&mut self, recovery_token: Option<&Document>) {
        if let Some(token) = recovery_token {
            self.body.insert("recoveryToken", token.clone());
        }
    }
}

#[derive(Debug, Deserialize)]
struct CommandErrorBody {
    #[serde(flatten)]
    command_error: CommandError,

    #[serde(rename = "errorLabels")]
    error_labels: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct WriteConcernOnlyBody {
    #[serde(rename = "writeConcernError")]
    write_concern_error: Option<WriteConcernError>,

    #[serde(rename = "errorLabels")]
    labels: Option<Vec<String>>,
}

impl WriteConcernOnlyBody {
    fn validate(self) -> Result<()> {
        match self.write_concern_error {
            Some(wc_error) => Err(Error::new(
                ErrorKind::Write(WriteFailure::WriteConcernError(wc_error)),
                self.labels,
            )),
            None => Ok(()),
        }
    }
}

/// Converts a reply with `ok: 0` into a command error carrying the reply's error labels.
pub(crate) fn handle_command_response(response: Document) -> Result<Document> {
    if bson_util::is_ok(response.get("ok")) {
        return Ok(response);
    }
    match bson::from_document::<CommandErrorBody>(response) {
        Ok(body) => Err(Error::new(
            ErrorKind::Command(body.command_error),
            body.error_labels,
        )),
        Err(e) => Err(Error::invalid_response(format!(
            "failed to parse command error: {}",
            e
        ))),
    }
}

/// Validates the reply to a command whose only possible failure besides `ok: 0` is a write
/// concern error.
pub(crate) fn handle_write_concern_response(response: Document) -> Result<()> {
    let response = handle_command_response(response)?;
    let body: WriteConcernOnlyBody = bson::from_document(response)?;
    body.validate()
}
