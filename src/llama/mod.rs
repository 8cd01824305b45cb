//! Adapter boundary to the native llama.cpp-style inference engine.
//!
//! Nothing else in the crate touches the engine directly: the controller and
//! chat coordinator consume the capability traits defined here and the opaque
//! handles they produce. A native binding implements these traits in
//! production builds; the [`stub`] module provides a simulated runtime for
//! development and testing without the native library.

pub mod stub;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlamaError {
    #[error("Engine initialization failed: {0}")]
    InitFailed(String),

    #[error("Failed to load model: {0}")]
    ModelLoadFailed(String),

    #[error("Context creation failed: {0}")]
    ContextFailed(String),

    #[error("Session creation failed: {0}")]
    SessionFailed(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Dispose failed: {0}")]
    DisposeFailed(String),
}

/// Model parameters (mirrors llama_model_params).
#[derive(Debug, Clone)]
pub struct ModelParams {
    /// Path to the GGUF/BIN model file.
    pub path: PathBuf,

    /// Number of GPU layers to offload (-1 = all).
    pub n_gpu_layers: i32,

    /// Use memory mapping for the model file.
    pub use_mmap: bool,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            n_gpu_layers: -1, // all layers
            use_mmap: true,
        }
    }
}

/// Context parameters (mirrors llama_context_params).
#[derive(Debug, Clone)]
pub struct ContextParams {
    /// Context size in tokens.
    pub n_ctx: u32,

    /// Batch size for prompt processing.
    pub n_batch: u32,

    /// Number of threads for computation.
    pub n_threads: u32,
}

impl Default for ContextParams {
    fn default() -> Self {
        Self {
            n_ctx: 4096,
            n_batch: 512,
            n_threads: 4,
        }
    }
}

/// Sampling options for a single prompt call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingOptions {
    pub temperature: f64,

    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

/// Outcome of a prompt call, resolved once at the adapter boundary.
///
/// Engines that report token accounting return [`PromptOutcome::WithUsage`];
/// everything else returns plain text and the caller falls back to its own
/// estimate. Downstream code matches on the variant instead of probing the
/// result shape.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptOutcome {
    Plain(String),
    WithUsage {
        text: String,
        prompt_tokens: u32,
        completion_tokens: u32,
    },
}

impl PromptOutcome {
    pub fn text(&self) -> &str {
        match self {
            PromptOutcome::Plain(text) => text,
            PromptOutcome::WithUsage { text, .. } => text,
        }
    }
}

/// Entry point into the inference library.
#[async_trait]
pub trait LlamaRuntime: Send + Sync {
    /// Initialize the inference engine (llama_backend_init).
    async fn engine_init(&self) -> Result<Box<dyn EngineHandle>, LlamaError>;

    /// Create a chat session bound to a context sequence.
    async fn create_session(
        &self,
        sequence: Box<dyn SequenceHandle>,
    ) -> Result<Box<dyn SessionHandle>, LlamaError>;
}

/// An initialized inference runtime instance.
#[async_trait]
pub trait EngineHandle: Send + Sync {
    async fn load_model(&self, params: ModelParams) -> Result<Box<dyn ModelHandle>, LlamaError>;
}

/// A loaded model.
#[async_trait]
pub trait ModelHandle: Send + Sync {
    async fn create_context(
        &self,
        params: ContextParams,
    ) -> Result<Box<dyn ContextHandle>, LlamaError>;

    /// Release native model memory.
    fn dispose(&mut self) -> Result<(), LlamaError>;
}

/// An inference context created from a loaded model.
pub trait ContextHandle: Send + Sync {
    /// The context's default sequence, consumed by
    /// [`LlamaRuntime::create_session`].
    fn sequence(&mut self) -> Result<Box<dyn SequenceHandle>, LlamaError>;

    /// Context size in tokens.
    fn n_ctx(&self) -> u32;

    /// Release native context memory (frees the KV cache).
    fn dispose(&mut self) -> Result<(), LlamaError>;
}

/// Opaque token position stream within a context.
pub trait SequenceHandle: Send + Sync {}

/// A chat session accepting prompts and returning generated text.
#[async_trait]
pub trait SessionHandle: Send + Sync {
    /// Whether [`prompt`](Self::prompt) honors [`SamplingOptions`].
    ///
    /// Fixed at session construction; callers pick their call variant from
    /// this flag instead of probing with a failed call.
    fn supports_sampling_options(&self) -> bool;

    async fn prompt(
        &mut self,
        text: &str,
        options: Option<SamplingOptions>,
    ) -> Result<PromptOutcome, LlamaError>;
}
