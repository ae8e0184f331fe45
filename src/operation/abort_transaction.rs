use crate::{
    bson::{doc, Document},
    error::Result,
    operation::{handle_write_concern_response, Command},
    options::WriteConcern,
};

pub(crate) struct AbortTransaction {
    write_concern: Option<WriteConcern>,
    recovery_token: Option<Document>,
}

impl AbortTransaction {
    pub(crate) const NAME: &'static str = "abortTransaction";

    pub(crate) fn new(write_concern: Option<WriteConcern>, recovery_token: Option<Document>) -> Self {
        Self {
            write_concern,
            recovery_token,
        }
    }

    pub(crate) fn build(&self) -> Result<Command> {
        let mut command = Command::new(Self::NAME, "admin", doc! { Self::NAME: 1 });
        command.set_write_concern(self.write_concern.as_ref())?;
        command.set_recovery_token(self.recovery_token.as_ref());
        Ok(command)
    }

    pub(crate) fn handle_response(&self, response: Document) -> Result<()> {
        handle_write_concern_response(response)
    }
}
