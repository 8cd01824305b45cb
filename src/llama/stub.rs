//! Simulated inference runtime.
//!
//! Stands in for the native llama.cpp binding so the daemon can be developed
//! and integration-tested without compiling the C library. Behavior knobs
//! (canned reply, usage reporting, per-step failure injection, step delay)
//! cover the code paths the real engine can take, and a shared [`StubLog`]
//! records every acquisition, dispose, and prompt call.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{
    ContextHandle, ContextParams, EngineHandle, LlamaError, LlamaRuntime, ModelHandle,
    ModelParams, PromptOutcome, SamplingOptions, SequenceHandle, SessionHandle,
};

/// The four acquisition steps of a model load, for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStep {
    EngineInit,
    ModelLoad,
    ContextCreate,
    SessionCreate,
}

/// Call log shared between a [`StubRuntime`] and its handles.
#[derive(Debug, Default)]
pub struct StubLog {
    pub engine_inits: AtomicUsize,
    pub model_loads: AtomicUsize,
    pub context_creates: AtomicUsize,
    pub session_creates: AtomicUsize,
    pub model_disposes: AtomicUsize,
    pub context_disposes: AtomicUsize,

    /// Options passed to each prompt call, in order.
    pub prompt_options: Mutex<Vec<Option<SamplingOptions>>>,
}

impl StubLog {
    /// Total acquisition calls across all four steps.
    pub fn acquisitions(&self) -> usize {
        self.engine_inits.load(Ordering::SeqCst)
            + self.model_loads.load(Ordering::SeqCst)
            + self.context_creates.load(Ordering::SeqCst)
            + self.session_creates.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
struct StubConfig {
    reply: String,
    usage: Option<(u32, u32)>,
    fail_at: Option<LoadStep>,
    step_delay: Option<Duration>,
    supports_sampling_options: bool,
    failing_prompt: bool,
    failing_dispose: bool,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            reply: "[stub reply]".to_string(),
            usage: None,
            fail_at: None,
            step_delay: None,
            supports_sampling_options: true,
            failing_prompt: false,
            failing_dispose: false,
        }
    }
}

/// Simulated llama runtime.
pub struct StubRuntime {
    config: StubConfig,
    log: Arc<StubLog>,
}

impl StubRuntime {
    pub fn new() -> Self {
        Self {
            config: StubConfig::default(),
            log: Arc::new(StubLog::default()),
        }
    }

    /// Fail the given acquisition step with a simulated engine error.
    pub fn failing_at(step: LoadStep) -> Self {
        let mut runtime = Self::new();
        runtime.config.fail_at = Some(step);
        runtime
    }

    /// Canned text returned by every prompt call.
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.config.reply = reply.into();
        self
    }

    /// Report authoritative usage counts from prompt calls
    /// ([`PromptOutcome::WithUsage`] instead of [`PromptOutcome::Plain`]).
    pub fn with_usage(mut self, prompt_tokens: u32, completion_tokens: u32) -> Self {
        self.config.usage = Some((prompt_tokens, completion_tokens));
        self
    }

    /// Sleep this long at each acquisition step, keeping a load in flight
    /// long enough for concurrent callers to observe it.
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.config.step_delay = Some(delay);
        self
    }

    /// Sessions report that sampling options are not honored.
    pub fn without_sampling_options(mut self) -> Self {
        self.config.supports_sampling_options = false;
        self
    }

    /// Every prompt call fails.
    pub fn with_failing_prompt(mut self) -> Self {
        self.config.failing_prompt = true;
        self
    }

    /// Every dispose call fails.
    pub fn with_failing_dispose(mut self) -> Self {
        self.config.failing_dispose = true;
        self
    }

    pub fn log(&self) -> Arc<StubLog> {
        self.log.clone()
    }
}

impl Default for StubRuntime {
    fn default() -> Self {
        Self::new()
    }
}

async fn step_delay(config: &StubConfig) {
    if let Some(delay) = config.step_delay {
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl LlamaRuntime for StubRuntime {
    async fn engine_init(&self) -> Result<Box<dyn EngineHandle>, LlamaError> {
        self.log.engine_inits.fetch_add(1, Ordering::SeqCst);
        step_delay(&self.config).await;
        if self.config.fail_at == Some(LoadStep::EngineInit) {
            return Err(LlamaError::InitFailed("simulated init failure".to_string()));
        }
        Ok(Box::new(StubEngine {
            config: self.config.clone(),
            log: self.log.clone(),
        }))
    }

    async fn create_session(
        &self,
        _sequence: Box<dyn SequenceHandle>,
    ) -> Result<Box<dyn SessionHandle>, LlamaError> {
        self.log.session_creates.fetch_add(1, Ordering::SeqCst);
        step_delay(&self.config).await;
        if self.config.fail_at == Some(LoadStep::SessionCreate) {
            return Err(LlamaError::SessionFailed(
                "simulated session failure".to_string(),
            ));
        }
        Ok(Box::new(StubSession {
            config: self.config.clone(),
            log: self.log.clone(),
        }))
    }
}

struct StubEngine {
    config: StubConfig,
    log: Arc<StubLog>,
}

#[async_trait]
impl EngineHandle for StubEngine {
    async fn load_model(&self, _params: ModelParams) -> Result<Box<dyn ModelHandle>, LlamaError> {
        self.log.model_loads.fetch_add(1, Ordering::SeqCst);
        step_delay(&self.config).await;
        if self.config.fail_at == Some(LoadStep::ModelLoad) {
            return Err(LlamaError::ModelLoadFailed(
                "simulated model load failure".to_string(),
            ));
        }
        Ok(Box::new(StubModel {
            config: self.config.clone(),
            log: self.log.clone(),
        }))
    }
}

struct StubModel {
    config: StubConfig,
    log: Arc<StubLog>,
}

#[async_trait]
impl ModelHandle for StubModel {
    async fn create_context(
        &self,
        params: ContextParams,
    ) -> Result<Box<dyn ContextHandle>, LlamaError> {
        self.log.context_creates.fetch_add(1, Ordering::SeqCst);
        step_delay(&self.config).await;
        if self.config.fail_at == Some(LoadStep::ContextCreate) {
            return Err(LlamaError::ContextFailed(
                "simulated context failure".to_string(),
            ));
        }
        Ok(Box::new(StubContext {
            n_ctx: params.n_ctx,
            config: self.config.clone(),
            log: self.log.clone(),
        }))
    }

    fn dispose(&mut self) -> Result<(), LlamaError> {
        self.log.model_disposes.fetch_add(1, Ordering::SeqCst);
        if self.config.failing_dispose {
            return Err(LlamaError::DisposeFailed(
                "simulated model dispose failure".to_string(),
            ));
        }
        Ok(())
    }
}

struct StubContext {
    n_ctx: u32,
    config: StubConfig,
    log: Arc<StubLog>,
}

impl ContextHandle for StubContext {
    fn sequence(&mut self) -> Result<Box<dyn SequenceHandle>, LlamaError> {
        Ok(Box::new(StubSequence))
    }

    fn n_ctx(&self) -> u32 {
        self.n_ctx
    }

    fn dispose(&mut self) -> Result<(), LlamaError> {
        self.log.context_disposes.fetch_add(1, Ordering::SeqCst);
        if self.config.failing_dispose {
            return Err(LlamaError::DisposeFailed(
                "simulated context dispose failure".to_string(),
            ));
        }
        Ok(())
    }
}

struct StubSequence;

impl SequenceHandle for StubSequence {}

struct StubSession {
    config: StubConfig,
    log: Arc<StubLog>,
}

#[async_trait]
impl SessionHandle for StubSession {
    fn supports_sampling_options(&self) -> bool {
        self.config.supports_sampling_options
    }

    async fn prompt(
        &mut self,
        _text: &str,
        options: Option<SamplingOptions>,
    ) -> Result<PromptOutcome, LlamaError> {
        self.log.prompt_options.lock().unwrap().push(options);
        if self.config.failing_prompt {
            return Err(LlamaError::GenerationFailed(
                "simulated generation failure".to_string(),
            ));
        }
        let text = self.config.reply.clone();
        Ok(match self.config.usage {
            Some((prompt_tokens, completion_tokens)) => PromptOutcome::WithUsage {
                text,
                prompt_tokens,
                completion_tokens,
            },
            None => PromptOutcome::Plain(text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_acquisition_chain() {
        let runtime = StubRuntime::new();
        let log = runtime.log();

        let engine = runtime.engine_init().await.unwrap();
        let mut model = engine.load_model(ModelParams::default()).await.unwrap();
        let mut context = model
            .create_context(ContextParams {
                n_ctx: 2048,
                ..ContextParams::default()
            })
            .await
            .unwrap();
        assert_eq!(context.n_ctx(), 2048);

        let sequence = context.sequence().unwrap();
        let mut session = runtime.create_session(sequence).await.unwrap();
        assert!(session.supports_sampling_options());

        let outcome = session.prompt("hi", None).await.unwrap();
        assert_eq!(outcome.text(), "[stub reply]");

        context.dispose().unwrap();
        model.dispose().unwrap();
        assert_eq!(log.acquisitions(), 4);
        assert_eq!(log.model_disposes.load(Ordering::SeqCst), 1);
        assert_eq!(log.context_disposes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_injection_stops_the_chain() {
        let runtime = StubRuntime::failing_at(LoadStep::ModelLoad);
        let engine = runtime.engine_init().await.unwrap();
        let err = engine.load_model(ModelParams::default()).await.err().unwrap();
        assert!(matches!(err, LlamaError::ModelLoadFailed(_)));
    }

    #[tokio::test]
    async fn usage_reporting_switches_the_outcome_variant() {
        let runtime = StubRuntime::new().with_reply("hello").with_usage(2, 1);
        let engine = runtime.engine_init().await.unwrap();
        let mut model = engine.load_model(ModelParams::default()).await.unwrap();
        let mut context = model.create_context(ContextParams::default()).await.unwrap();
        let mut session = runtime
            .create_session(context.sequence().unwrap())
            .await
            .unwrap();

        let outcome = session.prompt("hi", None).await.unwrap();
        assert_eq!(
            outcome,
            PromptOutcome::WithUsage {
                text: "hello".to_string(),
                prompt_tokens: 2,
                completion_tokens: 1,
            }
        );
    }
}
