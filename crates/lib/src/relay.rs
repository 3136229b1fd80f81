//! Conversation relay: turns one admitted message into one reply through the session.
//!
//! A single worker task owns the [`Session`] and drains a bounded FIFO queue, so exactly one
//! exchange is in flight against the provider and exchanges run in admission order. Callers get
//! the reply back through a oneshot and deliver it themselves.

use crate::channels::{ChannelHandle, InboundMessage, OutboundMessage, TypingGuard};
use crate::session::Session;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Reply sent in place of the model's answer when an exchange fails.
pub const APOLOGY: &str = "Sorry, something went wrong while processing your message.";

/// Owns the session and runs exchanges against it.
pub struct ConversationRelay {
    session: Session,
    channel: Arc<dyn ChannelHandle>,
    reply_timeout: Duration,
}

struct Job {
    message: InboundMessage,
    reply_tx: oneshot::Sender<OutboundMessage>,
}

/// Returned by [`RelayHandle::submit`] once the worker has stopped.
#[derive(Debug, thiserror::Error)]
#[error("relay worker has stopped")]
pub struct RelayClosed;

/// Sending side of the relay queue. The worker stops once every handle is dropped and the
/// queued exchanges have run.
#[derive(Clone)]
pub struct RelayHandle {
    tx: mpsc::Sender<Job>,
}

impl RelayHandle {
    /// Queue a message. Order of `submit` calls is the order of exchanges.
    pub async fn submit(
        &self,
        message: InboundMessage,
    ) -> Result<oneshot::Receiver<OutboundMessage>, RelayClosed> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Job { message, reply_tx })
            .await
            .map_err(|_| RelayClosed)?;
        Ok(reply_rx)
    }
}

impl ConversationRelay {
    pub fn new(session: Session, channel: Arc<dyn ChannelHandle>, reply_timeout: Duration) -> Self {
        Self {
            session,
            channel,
            reply_timeout,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    /// Run one exchange. Never fails: provider errors and timeouts become the apology, and the
    /// session keeps its last consistent history.
    pub async fn handle(&mut self, message: &InboundMessage) -> OutboundMessage {
        let _typing = TypingGuard::start(self.channel.clone(), message.chat_id);
        log::info!(
            "session {}: sending request to {}...",
            self.session.label(),
            self.session.model()
        );
        match self.session.send_turn(&message.text, self.reply_timeout).await {
            Ok(reply) => {
                log::info!("session {}: response: {:?}", self.session.label(), reply);
                OutboundMessage {
                    chat_id: message.chat_id,
                    text: reply,
                }
            }
            Err(e) => {
                log::error!(
                    "session {}: exchange for chat {} failed: {}",
                    self.session.label(),
                    message.chat_id,
                    e
                );
                OutboundMessage {
                    chat_id: message.chat_id,
                    text: APOLOGY.to_string(),
                }
            }
        }
    }

    /// Move the relay into its worker task. The task yields the session when it stops.
    pub fn spawn(self, queue_capacity: usize) -> (RelayHandle, JoinHandle<Session>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let worker = tokio::spawn(run_worker(self, rx));
        (RelayHandle { tx }, worker)
    }
}

async fn run_worker(mut relay: ConversationRelay, mut rx: mpsc::Receiver<Job>) -> Session {
    while let Some(job) = rx.recv().await {
        let reply = relay.handle(&job.message).await;
        if job.reply_tx.send(reply).is_err() {
            log::debug!("relay: reply for chat {} has no receiver", job.message.chat_id);
        }
    }
    log::debug!("relay: queue closed, worker stopping");
    relay.into_session()
}
