//! Bot control loop: Telegram events → inbound filter → relay → Telegram replies.

use crate::channels::{
    ChannelHandle, ConnectionGuard, InboundEvent, InboundFilter, OutboundMessage, TelegramChannel,
};
use crate::config::RelaySettings;
use crate::llm::GeminiClient;
use crate::relay::{ConversationRelay, APOLOGY};
use crate::session::Session;
use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;

/// Open the session, log in to Telegram and relay messages until a shutdown signal.
/// Session or login failures are returned before any message is accepted.
pub async fn run_bot(settings: RelaySettings) -> Result<()> {
    let provider = Arc::new(GeminiClient::new(
        settings.gemini_api_key.clone(),
        settings.gemini_base_url.clone(),
    ));
    let session = Session::open(
        provider,
        &settings.gemini_model,
        &settings.seed_prompt,
        settings.session_name.clone(),
    )
    .await
    .context("initializing gemini session")?;

    let telegram = Arc::new(TelegramChannel::new(
        settings.bot_token.clone(),
        settings.telegram_api_base.clone(),
    ));
    log::info!("client is starting...");
    let me = telegram.get_me().await.context("logging in to telegram")?;
    log::info!("logged in as: {} (ID: {})", me.display_name(), me.id);

    let guard = ConnectionGuard::new(telegram.clone());
    let (event_tx, event_rx) = mpsc::channel::<InboundEvent>(settings.queue_capacity);
    let poller = telegram.clone().start_inbound(event_tx);
    log::info!(
        "relay is active and waiting for messages from user with ID: {}",
        settings.target_user_id
    );

    let channel: Arc<dyn ChannelHandle> = telegram;
    let relay = ConversationRelay::new(session, channel.clone(), settings.reply_timeout);
    let session = serve(
        event_rx,
        InboundFilter::new(settings.target_user_id),
        relay,
        channel,
        settings.queue_capacity,
        settings.drain_timeout,
        shutdown_signal(),
    )
    .await;
    if let Some(session) = session {
        log::info!(
            "session {} closed after {} exchange(s)",
            session.label(),
            session.exchanges()
        );
    }

    drop(guard);
    if let Err(e) = poller.await {
        log::debug!("telegram poller ended abnormally: {}", e);
    }
    log::info!("relay stopped");
    Ok(())
}

/// Admit events, queue them on the relay in arrival order, and deliver each reply from its own
/// task. A reply that cannot be delivered is replaced by the apology. Stops when `shutdown`
/// completes or the event stream ends, then lets queued exchanges finish within
/// `drain_timeout`. Returns the session unless the worker had to be abandoned.
pub async fn serve<F>(
    mut events: mpsc::Receiver<InboundEvent>,
    filter: InboundFilter,
    relay: ConversationRelay,
    channel: Arc<dyn ChannelHandle>,
    queue_capacity: usize,
    drain_timeout: Duration,
    shutdown: F,
) -> Option<Session>
where
    F: Future<Output = ()>,
{
    let (handle, worker) = relay.spawn(queue_capacity);
    let worker_abort = worker.abort_handle();
    let mut deliveries = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                log::info!("shutdown signal received, draining queued messages");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else {
                    log::info!("inbound stream ended");
                    break;
                };
                let Some(message) = filter.admit(event) else {
                    continue;
                };
                log::info!("received message from target user: {:?}", message.text);
                // A full queue must not hold off shutdown.
                let submitted = tokio::select! {
                    r = handle.submit(message) => r,
                    _ = &mut shutdown => {
                        log::info!("shutdown signal received while the queue was full, dropping the waiting message");
                        break;
                    }
                };
                match submitted {
                    Ok(reply_rx) => {
                        deliveries.spawn(deliver(channel.clone(), reply_rx));
                    }
                    Err(e) => {
                        log::error!("{}", e);
                        break;
                    }
                }
            }
            Some(done) = deliveries.join_next(), if !deliveries.is_empty() => {
                if let Err(e) = done {
                    log::warn!("delivery task failed: {}", e);
                }
            }
        }
    }
    drop(handle);

    let drain = async {
        let session = worker.await;
        while deliveries.join_next().await.is_some() {}
        session
    };
    match tokio::time::timeout(drain_timeout, drain).await {
        Ok(Ok(session)) => Some(session),
        Ok(Err(e)) => {
            log::error!("relay worker failed: {}", e);
            None
        }
        Err(_) => {
            log::warn!("abandoning in-flight exchanges after {:?}", drain_timeout);
            worker_abort.abort();
            None
        }
    }
}

async fn deliver(channel: Arc<dyn ChannelHandle>, reply_rx: oneshot::Receiver<OutboundMessage>) {
    let Ok(reply) = reply_rx.await else {
        log::debug!("relay dropped a reply before delivery");
        return;
    };
    let Err(e) = channel.send_message(reply.chat_id, &reply.text).await else {
        return;
    };
    log::warn!("{}: delivering reply to chat {} failed: {}", channel.id(), reply.chat_id, e);
    if reply.text == APOLOGY {
        return;
    }
    if let Err(e) = channel.send_message(reply.chat_id, APOLOGY).await {
        log::warn!("{}: apology to chat {} failed too: {}", channel.id(), reply.chat_id, e);
    }
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
