//! Messages crossing the transport boundary: raw inbound events, admitted messages, and replies.

use chrono::{DateTime, Utc};

/// Whether the transport saw the message arrive or leave this account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// A raw event from the transport, before admission.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub sender_id: i64,
    pub direction: Direction,
    pub text: String,
    pub chat_id: i64,
}

/// A message from the counterpart that passed the inbound filter.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub sender_id: i64,
    pub chat_id: i64,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

/// A reply to be delivered to the chat the triggering message came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub chat_id: i64,
    pub text: String,
}
