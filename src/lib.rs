use std::path::{Path, PathBuf};

use tracing::instrument;

pub mod backend;
pub mod classify;
pub mod coord;
pub mod engine;
mod error;
pub mod format;
pub mod paragraph;

pub use backend::{OcrBackend, ReplayBackend};
pub use classify::{extract_messages, ClassifiedMessage, Speaker};
pub use coord::flatten_coord;
pub use engine::{DetectionOptions, PaddleEngine, PaddleEngineBuilder};
pub use error::{Error, OcrError, Result};
pub use format::format_transcript;
pub use paragraph::{group_paragraphs, Paragraph, PARAGRAPH_GAP};

pub use ort as runtime;

pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

const OUTPUT_PREFIX: &str = "OCR_output";

pub struct ChatOcrBuilder {
    lang: Option<String>,
    output_dir: PathBuf,
    engine: PaddleEngineBuilder,
}

impl ChatOcrBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Language of the screenshots, picks the recognition model. Overrides
    /// the language of the engine builder; unset, the engine's applies.
    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    /// Directory receiving saved transcripts. Created on build.
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = path.into();
        self
    }

    /// Engine settings beyond the language, such as model paths or threads.
    pub fn engine(mut self, engine: PaddleEngineBuilder) -> Self {
        self.engine = engine;
        self
    }

    /// Loads the PaddleOCR models for the configured language.
    #[instrument(skip(self), fields(lang = ?self.lang))]
    pub fn build(self) -> Result<ChatOcr<PaddleEngine>> {
        let engine = self.engine_builder().build()?;
        ChatOcr::new(engine, self.output_dir)
    }

    fn engine_builder(&self) -> PaddleEngineBuilder {
        match &self.lang {
            Some(lang) => self.engine.clone().lang(lang.clone()),
            None => self.engine.clone(),
        }
    }

    pub fn build_with_backend<B: OcrBackend>(self, backend: B) -> Result<ChatOcr<B>> {
        ChatOcr::new(backend, self.output_dir)
    }
}

impl Default for ChatOcrBuilder {
    fn default() -> Self {
        Self {
            lang: None,
            output_dir: PathBuf::from(OUTPUT_PREFIX),
            engine: PaddleEngineBuilder::default(),
        }
    }
}

/// Turns folders of chat screenshots into speaker-tagged transcripts.
pub struct ChatOcr<B> {
    backend: B,
    output_dir: PathBuf,
}

impl<B: OcrBackend> ChatOcr<B> {
    pub fn new(backend: B, output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir).map_err(|source| Error::OutputDir {
            path: output_dir.clone(),
            source,
        })?;
        Ok(Self {
            backend,
            output_dir,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Reads every screenshot in `img_dir` and concatenates their transcripts
    /// in directory listing order.
    ///
    /// Unreadable images and failed OCR calls only shrink the transcript. With
    /// `save_file` the trimmed transcript is also written to a timestamped
    /// file in the output directory.
    #[instrument(
        skip(self, img_dir),
        fields(dir = %img_dir.as_ref().display(), backend = self.backend.name())
    )]
    pub fn process_images(&self, img_dir: impl AsRef<Path>, save_file: bool) -> String {
        let images = image_files(img_dir.as_ref());
        log::info!("Found images: {:?}", file_names(&images));

        let mut transcript = String::new();
        for path in &images {
            if let Some(text) = self.process_image(path) {
                transcript.push_str(&text);
            }
        }

        if save_file {
            match self.save_transcript(&transcript) {
                Ok(path) => log::info!("OCR result saved to {}", path.display()),
                Err(err) => log::error!("Failed to save OCR result: {err}"),
            }
        }
        transcript
    }

    /// Transcript of a single screenshot, `None` when it cannot be decoded.
    #[instrument(skip(self))]
    pub fn process_image(&self, path: &Path) -> Option<String> {
        log::info!("Processing image {}", path.display());
        let image = match image::open(path) {
            Ok(image) => image,
            Err(err) => {
                log::warn!("Failed to read {}, skipping: {err}", path.display());
                return None;
            }
        };
        let half_width = f64::from(image.width()) / 2.0;

        let messages = match self.backend.ocr(path, &image, true) {
            Ok(result) => extract_messages(&result, half_width),
            Err(err) => {
                log::warn!("OCR failed for {}: {err}", path.display());
                Vec::new()
            }
        };
        Some(format_transcript(&group_paragraphs(messages)))
    }

    /// Writes `transcript`, trimmed, to `OCR_output_<YYYYMMDD_HHMMSS>.txt`.
    pub fn save_transcript(&self, transcript: &str) -> Result<PathBuf> {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = self
            .output_dir
            .join(format!("{OUTPUT_PREFIX}_{timestamp}.txt"));
        std::fs::create_dir_all(&self.output_dir)?;
        std::fs::write(&path, transcript.trim())?;
        Ok(path)
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Image files directly inside `dir`, in listing order. An unreadable
/// directory counts as empty.
pub fn image_files(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| is_image_file(path))
            .collect(),
        Err(err) => {
            log::error!("Could not list {}: {err}", dir.display());
            Vec::new()
        }
    }
}

fn file_names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .filter_map(|path| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}

/// Names of the subdirectories of `dir`. Errors are logged and give an
/// empty list.
pub fn list_folders(dir: impl AsRef<Path>) -> Vec<String> {
    let dir = dir.as_ref();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            log::error!("Could not list {}: {err}", dir.display());
            return Vec::new();
        }
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect()
}
