//! Relay core library: relays one Telegram counterpart's messages to a Gemini conversation and
//! sends the replies back.

pub mod bot;
pub mod channels;
pub mod config;
pub mod llm;
pub mod relay;
pub mod session;
