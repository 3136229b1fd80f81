//! Conversation session: the seeded turn history the relay sends to the model.
//!
//! A session starts with the persona preamble and a fixed acknowledgment. Afterwards the history
//! only grows by complete exchanges: a user turn and the model turn that answered it are
//! committed together, so the length is always `2 + 2k`.

use crate::llm::{ChatProvider, ProviderError};
use std::sync::Arc;
use std::time::Duration;

/// Model turn seeded after the persona preamble.
pub const SEED_ACKNOWLEDGMENT: &str = "Ok, I understand my role. I'm ready.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

/// A single entry in the history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Startup failure: the provider rejected the model or the credentials. Fatal.
#[derive(Debug, thiserror::Error)]
pub enum InitializationError {
    #[error("model {model:?} is not usable: {source}")]
    Rejected {
        model: String,
        #[source]
        source: ProviderError,
    },
    #[error("model name is empty")]
    EmptyModel,
}

/// Failure of one exchange. Recoverable; the history is left as it was.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("no reply within {0:?}")]
    Timeout(Duration),
}

/// The one conversation the relay holds with the model.
pub struct Session {
    label: String,
    model: String,
    history: Vec<Turn>,
    provider: Arc<dyn ChatProvider>,
}

impl Session {
    /// Check the model with the provider and seed the history.
    pub async fn open(
        provider: Arc<dyn ChatProvider>,
        model: &str,
        seed_prompt: &str,
        label: impl Into<String>,
    ) -> Result<Self, InitializationError> {
        let model = model.trim();
        if model.is_empty() {
            return Err(InitializationError::EmptyModel);
        }
        provider
            .check_model(model)
            .await
            .map_err(|source| InitializationError::Rejected {
                model: model.to_string(),
                source,
            })?;
        let session = Self {
            label: label.into(),
            model: model.to_string(),
            history: vec![Turn::user(seed_prompt), Turn::model(SEED_ACKNOWLEDGMENT)],
            provider,
        };
        log::info!("session {}: model {} initialized", session.label, session.model);
        Ok(session)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Never true for an opened session; the seed pair is always present.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Number of completed exchanges since the seed pair.
    pub fn exchanges(&self) -> usize {
        self.history.len().saturating_sub(2) / 2
    }

    /// Send `text` as the next user turn and wait at most `timeout` for the reply.
    ///
    /// The user turn is pushed for the request and popped again unless the reply arrives, so on
    /// any error (including timeout, which drops the request future) the history is unchanged.
    pub async fn send_turn(&mut self, text: &str, timeout: Duration) -> Result<String, ExchangeError> {
        self.history.push(Turn::user(text));
        let result = tokio::time::timeout(
            timeout,
            self.provider.generate(&self.model, &self.history),
        )
        .await;
        let reply = match result {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                self.history.pop();
                return Err(ExchangeError::Provider(e));
            }
            Err(_) => {
                self.history.pop();
                return Err(ExchangeError::Timeout(timeout));
            }
        };
        if reply.trim().is_empty() {
            self.history.pop();
            return Err(ExchangeError::Provider(ProviderError::EmptyReply));
        }
        self.history.push(Turn::model(reply.clone()));
        Ok(reply)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("label", &self.label)
            .field("model", &self.model)
            .field("turns", &self.history.len())
            .finish()
    }
}
