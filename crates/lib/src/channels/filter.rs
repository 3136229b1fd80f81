//! Inbound filter: only incoming messages from the configured counterpart reach the relay.

use crate::channels::inbound::{Direction, InboundEvent, InboundMessage};
use chrono::Utc;

/// Admits events from a single counterpart.
#[derive(Debug, Clone, Copy)]
pub struct InboundFilter {
    target_user_id: i64,
}

impl InboundFilter {
    pub fn new(target_user_id: i64) -> Self {
        Self { target_user_id }
    }

    pub fn target_user_id(&self) -> i64 {
        self.target_user_id
    }

    /// Returns the normalized message when the event is an incoming message from the
    /// counterpart. Anything else is dropped without further action.
    pub fn admit(&self, event: InboundEvent) -> Option<InboundMessage> {
        if event.sender_id != self.target_user_id || event.direction != Direction::Incoming {
            log::debug!(
                "inbound: discarding {:?} event from {} in chat {}",
                event.direction,
                event.sender_id,
                event.chat_id
            );
            return None;
        }
        Some(InboundMessage {
            sender_id: event.sender_id,
            chat_id: event.chat_id,
            text: event.text,
            received_at: Utc::now(),
        })
    }
}
