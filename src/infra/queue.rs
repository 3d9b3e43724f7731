use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use crate::infra::mailer::EmailMessage;

/// Bounded hand-off between request handlers and the mail dispatcher.
/// Enqueueing never blocks; a full or closed queue drops the message with a warning.
#[derive(Clone)]
pub struct MailQueue {
    sender: mpsc::Sender<EmailMessage>,
}

impl MailQueue {
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<EmailMessage>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    pub fn enqueue(&self, message: EmailMessage) -> bool {
        match self.sender.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                warn!(subject = %message.subject, "mail queue full, dropping email");
                false
            }
            Err(TrySendError::Closed(message)) => {
                warn!(subject = %message.subject, "mail queue closed, dropping email");
                false
            }
        }
    }
}
