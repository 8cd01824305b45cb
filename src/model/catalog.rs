//! Models-directory scanning.
//!
//! The daemon keeps model files in a single configured directory. The scan
//! recognizes the two file formats the engine accepts and reports
//! name/path/size triples; a missing directory is created rather than
//! reported as an error, so a fresh install sees an empty catalog.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

/// Recognized model file extensions.
pub const MODEL_EXTENSIONS: [&str; 2] = ["gguf", "bin"];

/// One entry in the models directory.
#[derive(Debug, Clone, Serialize)]
pub struct ModelFile {
    /// File name, e.g. "qwen2.5-7b-q4.gguf".
    pub name: String,

    /// Absolute path.
    pub path: PathBuf,

    /// File size in bytes.
    pub size: u64,
}

/// Default models directory: `$HOME/.moss/models`, overridable with
/// `MOSS_MODELS_DIR`.
pub fn default_models_dir() -> PathBuf {
    if let Ok(from_env) = std::env::var("MOSS_MODELS_DIR") {
        let trimmed = from_env.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".moss")
        .join("models")
}

fn is_model_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| MODEL_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// List the model files in `dir`, creating the directory when absent.
///
/// A newly created or empty directory yields an empty list, not an error.
pub fn list_models(dir: &Path) -> io::Result<Vec<ModelFile>> {
    if !dir.exists() {
        warn!(dir = %dir.display(), "Models directory missing, creating it");
        fs::create_dir_all(dir)?;
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !is_model_file(&path) || !path.is_file() {
            continue;
        }
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };
        let size = entry.metadata()?.len();
        files.push(ModelFile { name, path, size });
    }

    // Directory order is platform-dependent.
    files.sort_by(|a, b| a.name.cmp(&b.name));

    info!(dir = %dir.display(), count = files.len(), "Scanned models directory");
    debug!(?files, "Model catalog");
    Ok(files)
}
