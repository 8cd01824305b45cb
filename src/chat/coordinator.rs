//! Chat turn coordinator.
//!
//! Takes a prompt, submits it to the loaded session, and reports the
//! response together with token and throughput statistics. Failures are
//! converted to results at this boundary; nothing panics past it.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chat::estimate::estimate_tokens;
use crate::chat::stats::ChatStats;
use crate::config::Config;
use crate::llama::{LlamaError, PromptOutcome, SamplingOptions};
use crate::model::controller::ModelSlot;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("No model is loaded")]
    ModelNotLoaded,

    #[error(transparent)]
    Llama(#[from] LlamaError),
}

/// Generation lifecycle notifications, advisory for UI progress display.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    GenerationStart,
    GenerationComplete(ChatStats),
    GenerationError(String),
}

/// A completed chat turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub response: String,
    pub stats: ChatStats,
}

/// The chat turn coordinator.
pub struct ChatCoordinator {
    slot: Arc<ModelSlot>,
    config: Arc<Config>,
    events_tx: broadcast::Sender<ChatEvent>,
}

impl ChatCoordinator {
    pub fn new(
        slot: Arc<ModelSlot>,
        config: Arc<Config>,
        events_tx: broadcast::Sender<ChatEvent>,
    ) -> Self {
        Self {
            slot,
            config,
            events_tx,
        }
    }

    /// Run one chat turn against the loaded session.
    pub async fn send_message(&self, text: &str) -> Result<ChatTurn, ChatError> {
        let turn_id = Uuid::new_v4();
        info!(%turn_id, chars = text.chars().count(), "Chat turn");

        let mut session_guard = self.slot.session().lock().await;
        let Some(session) = session_guard.as_mut() else {
            warn!(%turn_id, "Rejecting chat turn: no model loaded");
            self.emit(ChatEvent::GenerationError(
                ChatError::ModelNotLoaded.to_string(),
            ));
            return Err(ChatError::ModelNotLoaded);
        };

        let estimated_prompt_tokens = estimate_tokens(text);
        self.emit(ChatEvent::GenerationStart);
        let started = Instant::now();

        // Call variant picked by the session's capability flag, fixed at
        // session construction.
        let options = session.supports_sampling_options().then(|| SamplingOptions {
            temperature: self.config.chat.temperature,
            max_tokens: self.config.chat.max_tokens,
        });
        let outcome = match session.prompt(text, options).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(%turn_id, error = %err, "Generation failed");
                self.emit(ChatEvent::GenerationError(err.to_string()));
                return Err(err.into());
            }
        };
        let time_taken_ms = started.elapsed().as_millis() as u64;

        // Engine-reported usage counts are authoritative; the heuristic only
        // covers plain-text outcomes.
        let (response, prompt_tokens, completion_tokens) = match outcome {
            PromptOutcome::WithUsage {
                text,
                prompt_tokens,
                completion_tokens,
            } => {
                debug!(%turn_id, prompt_tokens, completion_tokens, "Using engine-reported usage");
                (text, prompt_tokens, completion_tokens)
            }
            PromptOutcome::Plain(text) => {
                let completion_tokens = estimate_tokens(&text);
                (text, estimated_prompt_tokens, completion_tokens)
            }
        };

        let stats = ChatStats::new(prompt_tokens, completion_tokens, time_taken_ms);
        info!(
            %turn_id,
            time_taken_ms,
            total_tokens = stats.total_tokens,
            prompt_tokens = stats.prompt_tokens,
            completion_tokens = stats.completion_tokens,
            tokens_per_second = stats.tokens_per_second,
            "Chat turn complete"
        );
        self.emit(ChatEvent::GenerationComplete(stats.clone()));

        Ok(ChatTurn { response, stats })
    }

    fn emit(&self, event: ChatEvent) {
        // Nobody listening is fine; the events are advisory.
        let _ = self.events_tx.send(event);
    }
}
