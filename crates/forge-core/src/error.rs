use thiserror::Error;

use crate::domain::WorkerId;

#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("worker not registered: {0}")]
    UnknownWorker(WorkerId),

    #[error("worker {0} is inactive")]
    Inactive(WorkerId),

    #[error("mailbox of {0} is closed")]
    MailboxClosed(WorkerId),

    #[error("activity sink: {0}")]
    Activity(String),
}
