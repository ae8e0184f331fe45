use crate::{
    bson::{doc, Document},
    error::Result,
    operation::{handle_write_concern_response, Command},
    options::{TransactionOptions, WriteConcern},
};

pub(crate) struct CommitTransaction {
    options: Option<TransactionOptions>,
    recovery_token: Option<Document>,
}

impl CommitTransaction {
    pub(crate) const NAME: &'static str = "commitTransaction";

    pub(crate) fn new(
        options: Option<TransactionOptions>,
        recovery_token: Option<Document>,
    ) -> Self {
        Self {
            options,
            recovery_token,
        }
    }

    pub(crate) fn build(&self) -> Result<Command> {
        let mut command = Command::new(Self::NAME, "admin", doc! { Self::NAME: 1 });
        command.set_write_concern(self.write_concern())?;
        if let Some(max_commit_time) = self.options.as_ref().and_then(|o| o.max_commit_time) {
            command.body.insert(
                "maxTimeMS",
                i64::try_from(max_commit_time.as_millis()).unwrap_or(i64::MAX),
            );
        }
        command.set_recovery_token(self.recovery_token.as_ref());
        Ok(command)
    }

    pub(crate) fn handle_response(&self, response: Document) -> Result<()> {
        handle_write_concern_response(response)
    }

    fn write_concern(&self) -> Option<&WriteConcern> {
        self.options
            .as_ref()
            .and_then(|opts| opts.write_concern.as_ref())
    }

    // Updates the write concern to use w: majority and a w_timeout of 10000 if w_timeout is not
    // already set. The write concern on a commitTransaction command should be updated if a
    // commit is being retried internally or by the user.
    pub(crate) fn update_for_retry(&mut self) {
        let options = self
            .options
            .get_or_insert_with(|| TransactionOptions::builder().build());
        options
            .write_concern
            .get_or_insert_with(WriteConcern::default)
            .upgrade_for_commit_retry();
    }
}
