//! Communication channels (Telegram).
//!
//! The channel produces raw inbound events; the filter admits the counterpart's messages; replies
//! and typing hints go back out through [`ChannelHandle`].

mod filter;
mod handle;
mod inbound;
mod telegram;
mod typing;

pub use filter::InboundFilter;
pub use handle::{ChannelError, ChannelHandle, ConnectionGuard};
pub use inbound::{Direction, InboundEvent, InboundMessage, OutboundMessage};
pub use telegram::{update_to_event, TelegramChannel, TelegramUpdate, TelegramUser};
pub use typing::TypingGuard;
