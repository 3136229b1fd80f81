//! Telegram channel: getMe, long-poll getUpdates, sendMessage and sendChatAction via Bot API.

use crate::channels::handle::{ChannelError, ChannelHandle};
use crate::channels::inbound::{Direction, InboundEvent};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const LONG_POLL_TIMEOUT: u64 = 30;
const RETRY_DELAY: Duration = Duration::from_secs(2);
/// sendMessage rejects longer texts. Telegram counts UTF-16 code units.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Bot API envelope: `{ "ok": bool, "result": T, "description": "..." }`.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram update payload (getUpdates result item).
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl TelegramUser {
    pub fn display_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        }
    }
}

/// Map an update to a transport event. Updates without a text message or without a sender
/// carry nothing the relay can answer and yield `None`. Messages sent by the bot itself are
/// outgoing.
pub fn update_to_event(update: &TelegramUpdate, bot_id: Option<i64>) -> Option<InboundEvent> {
    let msg = update.message.as_ref()?;
    let text = msg.text.as_ref()?;
    let from = msg.from.as_ref()?;
    let direction = if Some(from.id) == bot_id {
        Direction::Outgoing
    } else {
        Direction::Incoming
    };
    Some(InboundEvent {
        sender_id: from.id,
        direction,
        text: text.clone(),
        chat_id: msg.chat.id,
    })
}

/// Split `text` into pieces sendMessage accepts, preferring to break after a newline.
pub fn split_message(text: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let mut units = 0;
        let mut end = rest.len();
        let mut last_newline = None;
        for (i, c) in rest.char_indices() {
            if units + c.len_utf16() > MAX_MESSAGE_LEN {
                end = i;
                break;
            }
            units += c.len_utf16();
            if c == '\n' {
                last_newline = Some(i + 1);
            }
        }
        if end < rest.len() {
            if let Some(cut) = last_newline {
                end = cut;
            }
        }
        let (chunk, tail) = rest.split_at(end);
        chunks.push(chunk);
        rest = tail;
    }
    chunks
}

/// Telegram channel connector: long-polls for updates and sends replies via sendMessage.
pub struct TelegramChannel {
    id: String,
    token: String,
    api_base: String,
    running: AtomicBool,
    stopped: Notify,
    /// Filled by `get_me`; 0 until then.
    bot_id: AtomicI64,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(token: impl Into<String>, api_base: Option<String>) -> Self {
        let api_base = api_base
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| TELEGRAM_API_BASE.to_string());
        Self {
            id: "telegram".to_string(),
            token: token.into(),
            api_base,
            running: AtomicBool::new(false),
            stopped: Notify::new(),
            bot_id: AtomicI64::new(0),
            client: reqwest::Client::new(),
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn bot_id(&self) -> Option<i64> {
        match self.bot_id.load(Ordering::SeqCst) {
            0 => None,
            id => Some(id),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, ChannelError> {
        let res = self
            .client
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChannelError::Api(format!("{} failed: {} {}", method, status, body)));
        }
        let data: ApiResponse<T> = res.json().await?;
        if !data.ok {
            return Err(ChannelError::Api(format!(
                "{} returned ok: false ({})",
                method,
                data.description.unwrap_or_default()
            )));
        }
        data.result
            .ok_or_else(|| ChannelError::Api(format!("{} returned no result", method)))
    }

    /// Verify the token and remember the bot's own user id.
    pub async fn get_me(&self) -> Result<TelegramUser, ChannelError> {
        let me: TelegramUser = self.call("getMe", serde_json::json!({})).await?;
        self.bot_id.store(me.id, Ordering::SeqCst);
        Ok(me)
    }

    /// Call Telegram getUpdates. Returns (updates, next_offset).
    async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout: u64,
    ) -> Result<(Vec<TelegramUpdate>, Option<i64>), ChannelError> {
        let mut body = serde_json::json!({ "timeout": timeout, "allowed_updates": ["message"] });
        if let Some(off) = offset {
            body["offset"] = serde_json::Value::from(off);
        }
        let updates: Vec<TelegramUpdate> = self.call("getUpdates", body).await?;
        let next_offset = updates.iter().map(|u| u.update_id).max().map(|id| id + 1);
        Ok((updates, next_offset))
    }

    /// Offset just past the newest pending update, so messages sent while the relay was down are
    /// not answered on startup. Tried twice; after that the backlog is polled like new messages.
    async fn skip_backlog(&self) -> Option<i64> {
        for attempt in 1..=2 {
            match self.get_updates(Some(-1), 0).await {
                Ok((_, next)) => return next,
                Err(e) if attempt == 1 => {
                    log::warn!("telegram: could not skip pending updates, retrying: {}", e);
                    tokio::select! {
                        _ = tokio::time::sleep(RETRY_DELAY) => {},
                        _ = self.stopped.notified() => return None,
                    }
                }
                Err(e) => {
                    log::warn!(
                        "telegram: could not skip pending updates, messages queued while offline will be answered: {}",
                        e
                    );
                }
            }
        }
        None
    }

    /// Start the getUpdates long-poll loop and forward events. Returns a handle to await on shutdown.
    pub fn start_inbound(self: Arc<Self>, inbound_tx: mpsc::Sender<InboundEvent>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("telegram channel: starting getUpdates long-poll loop");
        tokio::spawn(async move {
            run_get_updates_loop(self, inbound_tx).await;
        })
    }

    /// Send a text message to a chat via sendMessage API. Texts over `MAX_MESSAGE_LEN` go out as
    /// several messages, in order; the first failure stops the rest.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ChannelError> {
        for chunk in split_message(text) {
            let body = serde_json::json!({ "chat_id": chat_id, "text": chunk });
            let _: serde_json::Value = self.call("sendMessage", body).await?;
        }
        Ok(())
    }

    /// Show "typing…" in a chat via sendChatAction API.
    pub async fn send_typing(&self, chat_id: i64) -> Result<(), ChannelError> {
        let body = serde_json::json!({ "chat_id": chat_id, "action": "typing" });
        let _: bool = self.call("sendChatAction", body).await?;
        Ok(())
    }
}

async fn run_get_updates_loop(channel: Arc<TelegramChannel>, inbound_tx: mpsc::Sender<InboundEvent>) {
    let mut offset = channel.skip_backlog().await;
    while channel.running() {
        let polled = tokio::select! {
            res = channel.get_updates(offset, LONG_POLL_TIMEOUT) => res,
            _ = channel.stopped.notified() => break,
        };
        match polled {
            Ok((updates, next)) => {
                if next.is_some() {
                    offset = next;
                }
                for u in &updates {
                    let Some(event) = update_to_event(u, channel.bot_id()) else {
                        continue;
                    };
                    if inbound_tx.send(event).await.is_err() {
                        log::debug!("telegram: inbound channel closed, stopping loop");
                        return;
                    }
                }
            }
            Err(e) => {
                log::debug!("telegram getUpdates error: {}", e);
                tokio::select! {
                    _ = tokio::time::sleep(RETRY_DELAY) => {},
                    _ = channel.stopped.notified() => break,
                }
            }
        }
    }
    log::info!("telegram channel: getUpdates loop stopped");
}

#[async_trait]
impl ChannelHandle for TelegramChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        // notify_one keeps a permit when the loop is between polls.
        self.stopped.notify_one();
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ChannelError> {
        TelegramChannel::send_message(self, chat_id, text).await
    }

    async fn send_typing(&self, chat_id: i64) -> Result<(), ChannelError> {
        TelegramChannel::send_typing(self, chat_id).await
    }
}
