//! Scoped typing indicator: refreshed in the background until the guard is dropped.

use crate::channels::handle::ChannelHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Telegram clears the typing status after about five seconds.
const TYPING_REFRESH: Duration = Duration::from_secs(4);

/// Fire-and-forget typing hint. Failures are logged and never reach the caller.
pub struct TypingGuard {
    task: JoinHandle<()>,
}

impl TypingGuard {
    pub fn start(channel: Arc<dyn ChannelHandle>, chat_id: i64) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TYPING_REFRESH);
            loop {
                ticker.tick().await;
                if let Err(e) = channel.send_typing(chat_id).await {
                    log::debug!("{}: typing hint for chat {} failed: {}", channel.id(), chat_id, e);
                }
            }
        });
        Self { task }
    }
}

impl Drop for TypingGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}
