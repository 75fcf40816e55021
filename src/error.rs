use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to load OCR models: {0}")]
    Runtime(#[from] ort::Error),
    #[error("failed to read dictionary {path}: {source}")]
    Dictionary {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure of a single OCR call. Never fatal to a batch.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("inference failed: {0}")]
    Inference(#[from] ort::Error),
    #[error("unexpected model output: {0}")]
    Output(String),
    #[error("no captured OCR output at {path}: {source}")]
    MissingReplay {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("captured OCR output at {path} is not valid JSON: {source}")]
    InvalidReplay {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl OcrError {
    pub fn output(message: impl Into<String>) -> Self {
        Self::Output(message.into())
    }
}
