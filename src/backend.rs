use std::path::Path;

use image::DynamicImage;
use serde_json::Value;

use crate::error::OcrError;

/// Something that can turn a screenshot into raw OCR detections.
///
/// Results use the PaddleOCR layout: one list per submitted image, holding
/// `[polygon, [text, confidence]]` entries. Implementations are free to return
/// partially malformed data, the message extraction copes with it.
pub trait OcrBackend {
    fn name(&self) -> &'static str;

    fn ocr(
        &self,
        path: &Path,
        image: &DynamicImage,
        classify_orientation: bool,
    ) -> Result<Value, OcrError>;
}

impl<B: OcrBackend + ?Sized> OcrBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn ocr(
        &self,
        path: &Path,
        image: &DynamicImage,
        classify_orientation: bool,
    ) -> Result<Value, OcrError> {
        (**self).ocr(path, image, classify_orientation)
    }
}

/// Serves OCR output captured earlier, read from a `.json` file stored next
/// to each image (`chat_01.png` → `chat_01.json`).
#[derive(Debug, Default, Clone, Copy)]
pub struct ReplayBackend;

impl ReplayBackend {
    pub fn capture_path(image_path: &Path) -> std::path::PathBuf {
        image_path.with_extension("json")
    }
}

impl OcrBackend for ReplayBackend {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn ocr(&self, path: &Path, _: &DynamicImage, _: bool) -> Result<Value, OcrError> {
        let capture = Self::capture_path(path);
        let raw = std::fs::read_to_string(&capture).map_err(|source| OcrError::MissingReplay {
            path: capture.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| OcrError::InvalidReplay {
            path: capture,
            source,
        })
    }
}
