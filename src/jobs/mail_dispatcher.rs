use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::infra::mailer::{EmailMessage, Mailer};

const FAILURE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug)]
pub struct DeliveryFailure {
    pub subject: String,
    pub error: anyhow::Error,
}

pub struct MailDispatcher {
    worker: JoinHandle<()>,
    failure_log: JoinHandle<()>,
}

impl MailDispatcher {
    /// Runs until every `MailQueue` handle has been dropped.
    pub fn spawn(receiver: mpsc::Receiver<EmailMessage>, mailer: Arc<dyn Mailer>) -> Self {
        let (failures_tx, failures_rx) = mpsc::channel(FAILURE_CHANNEL_CAPACITY);
        let worker = tokio::spawn(deliver(receiver, mailer, failures_tx));
        let failure_log = tokio::spawn(log_failures(failures_rx));
        Self {
            worker,
            failure_log,
        }
    }

    /// Waits for queued mail to drain after the queue is closed.
    pub async fn shutdown(self) {
        if let Err(err) = self.worker.await {
            warn!(error = ?err, "mail dispatcher worker panicked");
        }
        if let Err(err) = self.failure_log.await {
            warn!(error = ?err, "mail failure log task panicked");
        }
    }
}

async fn deliver(
    mut receiver: mpsc::Receiver<EmailMessage>,
    mailer: Arc<dyn Mailer>,
    failures: mpsc::Sender<DeliveryFailure>,
) {
    info!("mail dispatcher started");
    while let Some(message) = receiver.recv().await {
        match mailer.send(&message).await {
            Ok(()) => debug!(subject = %message.subject, "email delivered"),
            Err(error) => {
                let failure = DeliveryFailure {
                    subject: message.subject,
                    error,
                };
                if let Err(mpsc::error::TrySendError::Full(failure)) = failures.try_send(failure) {
                    warn!(
                        error = ?failure.error,
                        subject = %failure.subject,
                        "email delivery failed"
                    );
                }
            }
        }
    }
    info!("mail dispatcher stopped");
}

async fn log_failures(mut failures: mpsc::Receiver<DeliveryFailure>) {
    while let Some(failure) = failures.recv().await {
        warn!(
            error = ?failure.error,
            subject = %failure.subject,
            "email delivery failed"
        );
    }
}
