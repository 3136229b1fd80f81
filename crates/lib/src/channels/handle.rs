//! Transport seam: the operations the relay and the bot loop need from a channel.

use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("channel api error: {0}")]
    Api(String),
}

/// Handle to a running channel (stop, send message, typing hint).
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Channel id (e.g. "telegram").
    fn id(&self) -> &str;
    /// Stop the channel connector.
    fn stop(&self);
    /// Send a text message to a chat.
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ChannelError>;
    /// Show a "typing" hint in a chat. Default does nothing.
    async fn send_typing(&self, _chat_id: i64) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// Keeps a channel connected for as long as the guard lives; stops it on drop, whatever the exit path.
pub struct ConnectionGuard {
    channel: Arc<dyn ChannelHandle>,
}

impl ConnectionGuard {
    pub fn new(channel: Arc<dyn ChannelHandle>) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &Arc<dyn ChannelHandle> {
        &self.channel
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.channel.stop();
        log::info!("{} channel: connection released", self.channel.id());
    }
}
