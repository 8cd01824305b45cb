//! Model lifecycle controller.
//!
//! Owns the record of engine handles (engine, model, context, session) and
//! enforces the load/unload state machine: at most one model loaded, no
//! concurrent and no stacked loads, and no partial handle set left behind
//! by a failed load.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::llama::{
    ContextHandle, ContextParams, EngineHandle, LlamaError, LlamaRuntime, ModelHandle,
    ModelParams, SessionHandle,
};
use crate::model::catalog::{self, ModelFile};

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("A model load is already in progress")]
    AlreadyLoading,

    #[error("A model is already loaded; unload it first")]
    AlreadyLoaded,

    #[error("Model file not found: {0}")]
    FileNotFound(String),

    #[error("No model is loaded")]
    ModelNotLoaded,

    #[error(transparent)]
    Llama(#[from] LlamaError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Load progress notification, emitted before each acquisition step and
/// once on completion.
#[derive(Debug, Clone, Serialize)]
pub struct LoadProgress {
    /// Human-readable stage label.
    pub stage: &'static str,

    /// Completion percentage: 0, 25, 50, 75, 100.
    pub progress: u8,
}

const STAGE_ENGINE: &str = "Initializing engine";
const STAGE_MODEL: &str = "Loading model file";
const STAGE_CONTEXT: &str = "Creating context";
const STAGE_SESSION: &str = "Initializing chat session";
const STAGE_DONE: &str = "Load complete";

/// Point-in-time lifecycle snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub is_loading: bool,
    pub is_loaded: bool,
    pub model_path: Option<String>,
    pub error: Option<String>,
}

/// Loaded-model details reported by [`ModelController::model_info`].
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    /// Model file name.
    pub name: String,

    /// Context size in tokens.
    pub context_size: u32,
}

/// Result of a successful load.
#[derive(Debug, Clone, Serialize)]
pub struct LoadedModel {
    /// Model file name.
    pub model: String,

    /// Wall-clock load time in milliseconds.
    pub elapsed_ms: u64,
}

#[derive(Default)]
struct ModelState {
    is_loading: bool,
    is_loaded: bool,
    model_path: Option<PathBuf>,
    error: Option<String>,
    engine: Option<Box<dyn EngineHandle>>,
    model: Option<Box<dyn ModelHandle>>,
    context: Option<Box<dyn ContextHandle>>,
}

/// Shared record of lifecycle flags and engine handles.
///
/// Single-writer discipline: only [`ModelController`] mutates the record;
/// the chat coordinator reads the flags and borrows the session. The state
/// mutex is synchronous and never held across an await. The session sits
/// behind its own async mutex so a long-running generation does not block
/// status reads.
pub struct ModelSlot {
    state: StdMutex<ModelState>,
    session: Mutex<Option<Box<dyn SessionHandle>>>,
}

impl ModelSlot {
    pub fn new() -> Self {
        Self {
            state: StdMutex::new(ModelState::default()),
            session: Mutex::new(None),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().unwrap().is_loaded
    }

    pub(crate) fn session(&self) -> &Mutex<Option<Box<dyn SessionHandle>>> {
        &self.session
    }
}

impl Default for ModelSlot {
    fn default() -> Self {
        Self::new()
    }
}

struct Acquired {
    engine: Box<dyn EngineHandle>,
    model: Box<dyn ModelHandle>,
    context: Box<dyn ContextHandle>,
    session: Box<dyn SessionHandle>,
}

/// The model lifecycle controller.
pub struct ModelController {
    runtime: Arc<dyn LlamaRuntime>,
    config: Arc<Config>,
    slot: Arc<ModelSlot>,
    progress_tx: broadcast::Sender<LoadProgress>,
}

impl ModelController {
    pub fn new(
        runtime: Arc<dyn LlamaRuntime>,
        config: Arc<Config>,
        slot: Arc<ModelSlot>,
        progress_tx: broadcast::Sender<LoadProgress>,
    ) -> Self {
        Self {
            runtime,
            config,
            slot,
            progress_tx,
        }
    }

    /// Scan the configured models directory, creating it when absent.
    pub fn list_available_models(&self) -> Result<Vec<ModelFile>, ControllerError> {
        Ok(catalog::list_models(&self.config.model.models_dir)?)
    }

    /// The configured models directory.
    pub fn models_directory(&self) -> &Path {
        &self.config.model.models_dir
    }

    /// Pure snapshot of the current lifecycle state.
    pub fn status(&self) -> ModelStatus {
        let state = self.slot.state.lock().unwrap();
        ModelStatus {
            is_loading: state.is_loading,
            is_loaded: state.is_loaded,
            model_path: state
                .model_path
                .as_ref()
                .map(|p| p.display().to_string()),
            error: state.error.clone(),
        }
    }

    /// Name and context size of the loaded model.
    pub fn model_info(&self) -> Result<ModelInfo, ControllerError> {
        let state = self.slot.state.lock().unwrap();
        if !state.is_loaded {
            return Err(ControllerError::ModelNotLoaded);
        }
        let name = state
            .model_path
            .as_deref()
            .map(file_name)
            .unwrap_or_else(|| "unknown".to_string());
        let context_size = state
            .context
            .as_ref()
            .map(|c| c.n_ctx())
            .unwrap_or(self.config.model.context_size);
        Ok(ModelInfo { name, context_size })
    }

    /// Load the model at `path` through the four acquisition steps.
    ///
    /// Rejected while a load is in progress or a model is loaded; the caller
    /// must unload first, there is no implicit replace. On a step failure
    /// the handles acquired so far are disposed best-effort and the state
    /// record ends up exactly as it started, with the failure recorded.
    pub async fn load_model(&self, path: &Path) -> Result<LoadedModel, ControllerError> {
        let started = Instant::now();
        info!(path = %path.display(), "Loading model");

        {
            let mut state = self.slot.state.lock().unwrap();
            if state.is_loading {
                warn!("Rejecting load: a load is already in progress");
                return Err(ControllerError::AlreadyLoading);
            }
            if state.is_loaded {
                warn!("Rejecting load: a model is already loaded");
                return Err(ControllerError::AlreadyLoaded);
            }
            if !path.exists() {
                return Err(ControllerError::FileNotFound(path.display().to_string()));
            }
            // Accepted: flip the guard before any await so concurrent
            // attempts are rejected immediately instead of queued.
            state.is_loading = true;
            state.error = None;
        }

        match self.acquire(path).await {
            Ok(acquired) => {
                // Install the session before flipping is_loaded so a chat
                // turn arriving in between cannot observe a loaded state
                // with no session.
                *self.slot.session.lock().await = Some(acquired.session);
                {
                    let mut state = self.slot.state.lock().unwrap();
                    state.engine = Some(acquired.engine);
                    state.model = Some(acquired.model);
                    state.context = Some(acquired.context);
                    state.model_path = Some(path.to_path_buf());
                    state.is_loading = false;
                    state.is_loaded = true;
                }
                self.emit(LoadProgress {
                    stage: STAGE_DONE,
                    progress: 100,
                });

                let elapsed_ms = started.elapsed().as_millis() as u64;
                info!(elapsed_ms, "Model loaded");
                Ok(LoadedModel {
                    model: file_name(path),
                    elapsed_ms,
                })
            }
            Err(err) => {
                {
                    let mut state = self.slot.state.lock().unwrap();
                    state.is_loading = false;
                    state.error = Some(err.to_string());
                }
                warn!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %err,
                    "Model load failed"
                );
                Err(err.into())
            }
        }
    }

    /// The four sequential acquisition steps. On a step failure the handles
    /// from earlier steps are disposed before the error is returned, so no
    /// partial set can leak.
    async fn acquire(&self, path: &Path) -> Result<Acquired, LlamaError> {
        if let Ok(meta) = fs::metadata(path) {
            info!(
                size_mb = meta.len() as f64 / 1024.0 / 1024.0,
                "Model file size"
            );
        }

        self.emit(LoadProgress {
            stage: STAGE_ENGINE,
            progress: 0,
        });
        let engine = self.runtime.engine_init().await?;

        self.emit(LoadProgress {
            stage: STAGE_MODEL,
            progress: 25,
        });
        let mut model = engine
            .load_model(ModelParams {
                path: path.to_path_buf(),
                n_gpu_layers: self.config.model.n_gpu_layers,
                ..ModelParams::default()
            })
            .await?;

        self.emit(LoadProgress {
            stage: STAGE_CONTEXT,
            progress: 50,
        });
        let mut context = match model
            .create_context(ContextParams {
                n_ctx: self.config.model.context_size,
                ..ContextParams::default()
            })
            .await
        {
            Ok(context) => context,
            Err(err) => {
                dispose_model(model.as_mut());
                return Err(err);
            }
        };

        self.emit(LoadProgress {
            stage: STAGE_SESSION,
            progress: 75,
        });
        let sequence = match context.sequence() {
            Ok(sequence) => sequence,
            Err(err) => {
                dispose_context(context.as_mut());
                dispose_model(model.as_mut());
                return Err(err);
            }
        };
        let session = match self.runtime.create_session(sequence).await {
            Ok(session) => session,
            Err(err) => {
                dispose_context(context.as_mut());
                dispose_model(model.as_mut());
                return Err(err);
            }
        };

        Ok(Acquired {
            engine,
            model,
            context,
            session,
        })
    }

    /// Release the context and model handles and reset the record.
    ///
    /// Dispose failures are logged, never surfaced. Calling this with no
    /// model loaded is a no-op success.
    pub async fn unload_model(&self) -> Result<(), ControllerError> {
        info!("Unloading model");
        let mut session = self.slot.session.lock().await; // waits out an in-flight generation

        let (model, context, previous) = {
            let mut state = self.slot.state.lock().unwrap();
            if state.is_loading {
                return Err(ControllerError::AlreadyLoading);
            }
            let model = state.model.take();
            let context = state.context.take();
            let previous = state.model_path.take();
            *state = ModelState::default();
            (model, context, previous)
        };
        *session = None;
        drop(session);

        if let Some(mut context) = context {
            dispose_context(context.as_mut());
        }
        if let Some(mut model) = model {
            dispose_model(model.as_mut());
        }

        match previous {
            Some(path) => info!(previous = %path.display(), "Model unloaded"),
            None => debug!("Unload with no model loaded"),
        }
        Ok(())
    }

    fn emit(&self, progress: LoadProgress) {
        debug!(stage = progress.stage, progress = progress.progress, "Load progress");
        // Nobody listening is fine; progress is advisory.
        let _ = self.progress_tx.send(progress);
    }
}

fn dispose_context(context: &mut dyn ContextHandle) {
    if let Err(err) = context.dispose() {
        warn!(error = %err, "Context dispose failed");
    }
}

fn dispose_model(model: &mut dyn ModelHandle) {
    if let Err(err) = model.dispose() {
        warn!(error = %err, "Model dispose failed");
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llama::stub::StubRuntime;

    fn controller(runtime: StubRuntime) -> (ModelController, broadcast::Receiver<LoadProgress>) {
        let (progress_tx, progress_rx) = broadcast::channel(16);
        let controller = ModelController::new(
            Arc::new(runtime),
            Arc::new(Config::default()),
            Arc::new(ModelSlot::new()),
            progress_tx,
        );
        (controller, progress_rx)
    }

    fn fake_model_file(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("test.gguf");
        fs::write(&path, b"gguf").unwrap();
        path
    }

    #[tokio::test]
    async fn test_load_reports_progress_sequence() {
        let tmp = tempfile::tempdir().unwrap();
        let path = fake_model_file(&tmp);
        let (controller, mut progress_rx) = controller(StubRuntime::new());

        let loaded = controller.load_model(&path).await.unwrap();
        assert_eq!(loaded.model, "test.gguf");

        let mut seen = Vec::new();
        while let Ok(p) = progress_rx.try_recv() {
            seen.push(p.progress);
        }
        assert_eq!(seen, vec![0, 25, 50, 75, 100]);

        let status = controller.status();
        assert!(status.is_loaded);
        assert!(!status.is_loading);
        assert_eq!(status.model_path.as_deref(), Some(path.to_str().unwrap()));
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn test_file_not_found_leaves_state_at_rest() {
        let (controller, _rx) = controller(StubRuntime::new());
        let err = controller
            .load_model(Path::new("/models/x.gguf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::FileNotFound(_)));

        let status = controller.status();
        assert!(!status.is_loading);
        assert!(!status.is_loaded);
    }

    #[tokio::test]
    async fn test_model_info_requires_loaded_model() {
        let tmp = tempfile::tempdir().unwrap();
        let path = fake_model_file(&tmp);
        let (controller, _rx) = controller(StubRuntime::new());

        assert!(matches!(
            controller.model_info(),
            Err(ControllerError::ModelNotLoaded)
        ));

        controller.load_model(&path).await.unwrap();
        let info = controller.model_info().unwrap();
        assert_eq!(info.name, "test.gguf");
        assert_eq!(info.context_size, 4096);
    }
}
