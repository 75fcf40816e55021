//! PaddleOCR models run through ONNX Runtime.
//!
//! The pipeline is the usual three stages: a DBNet detector finds text
//! regions, an optional classifier flips upside-down crops and a CRNN
//! recogniser reads each crop.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use ort::{ExecutionProviderDispatch, GraphOptimizationLevel, Session, SessionBuilder};
use serde_json::{json, Value};
use tracing::instrument;

use crate::{backend::OcrBackend, error::OcrError, Result};

mod detector;
pub mod geometry;
mod orientation;
mod recognizer;

pub use detector::{Detector, TextRegion};
pub use orientation::{Orientation, OrientationClassifier};
pub use recognizer::{Recognizer, TextLine};

const DEFAULT_DET_MODEL: &str = "models/ch_PP-OCRv4_det_infer/ch_PP-OCRv4_det_infer.onnx";
const DEFAULT_CLS_MODEL: &str =
    "models/ch_ppocr_mobile_v2.0_cls_infer/ch_ppocr_mobile_v2.0_cls_infer.onnx";
const CHINESE_DICTIONARY: &str = "models/ppocr_keys_v1.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionProvider {
    Default,
    #[cfg(feature = "cuda")]
    Cuda,
}

const DEFAULT_PROVIDERS: &[ExecutionProvider] = &[
    #[cfg(feature = "cuda")]
    ExecutionProvider::Cuda,
    ExecutionProvider::Default,
];

pub(crate) fn session_builder(
    threads: usize,
    providers: &[ExecutionProvider],
) -> ort::Result<SessionBuilder> {
    let providers = providers
        .iter()
        .filter_map(|provider| -> Option<ExecutionProviderDispatch> {
            match provider {
                ExecutionProvider::Default => None,
                #[cfg(feature = "cuda")]
                ExecutionProvider::Cuda => Some(ort::CUDAExecutionProvider::default().build()),
            }
        });
    Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_parallel_execution(true)?
        .with_inter_threads(threads)?
        .with_intra_threads(threads)?
        .with_execution_providers(providers)
}

/// Thresholds of the text detector.
#[derive(Debug, Clone, Copy)]
pub struct DetectionOptions {
    /// Probability above which a map cell counts as text.
    pub box_threshold: f32,
    /// Minimum mean probability for a candidate box to be kept.
    pub box_score_threshold: f32,
    pub unclip_ratio: f32,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            box_threshold: 0.3,
            box_score_threshold: 0.5,
            unclip_ratio: 1.6,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaddleEngineBuilder {
    lang: String,
    threads: usize,
    det_path: Option<PathBuf>,
    cls_path: Option<Option<PathBuf>>,
    rec_paths: Option<(PathBuf, PathBuf)>,
    max_side_len: u32,
    most_angle: bool,
    options: DetectionOptions,
    execution_providers: Vec<ExecutionProvider>,
}

impl PaddleEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Language tag selecting the default recognition model and dictionary.
    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn det_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.det_path = Some(path.into());
        self
    }

    pub fn cls_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.cls_path = Some(Some(path.into()));
        self
    }

    /// Skips orientation classification entirely.
    pub fn without_cls_model(mut self) -> Self {
        self.cls_path = Some(None);
        self
    }

    pub fn rec_model(
        mut self,
        model_path: impl Into<PathBuf>,
        keys_path: impl Into<PathBuf>,
    ) -> Self {
        self.rec_paths = Some((model_path.into(), keys_path.into()));
        self
    }

    pub fn max_side_len(mut self, max_side_len: u32) -> Self {
        self.max_side_len = max_side_len;
        self
    }

    /// Rotates every crop of an image the way the majority is oriented.
    pub fn most_angle(mut self, most_angle: bool) -> Self {
        self.most_angle = most_angle;
        self
    }

    pub fn detection_options(mut self, options: DetectionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_execution_providers(
        mut self,
        providers: impl IntoIterator<Item = ExecutionProvider>,
    ) -> Self {
        self.execution_providers = providers.into_iter().collect();
        self
    }

    pub fn lang_tag(&self) -> &str {
        &self.lang
    }

    fn model_paths(&self) -> ModelPaths {
        let det = self
            .det_path
            .clone()
            .unwrap_or_else(|| DEFAULT_DET_MODEL.into());
        let cls = match &self.cls_path {
            Some(path) => path.clone(),
            None => Some(DEFAULT_CLS_MODEL.into()),
        };
        let (rec, keys) = self
            .rec_paths
            .clone()
            .unwrap_or_else(|| default_rec_paths(&self.lang));
        ModelPaths {
            det,
            cls,
            rec,
            keys,
        }
    }

    #[instrument(skip(self), fields(lang = %self.lang))]
    pub fn build(self) -> Result<PaddleEngine> {
        let paths = self.model_paths();
        log::debug!("Loading OCR models: {paths:?}");
        let providers = &self.execution_providers;
        Ok(PaddleEngine {
            detector: Detector::init(&paths.det, self.threads, providers)?,
            classifier: paths
                .cls
                .as_deref()
                .map(|path| OrientationClassifier::init(path, self.threads, providers))
                .transpose()?,
            recognizer: Recognizer::init(&paths.rec, &paths.keys, self.threads, providers)?,
            max_side_len: self.max_side_len,
            most_angle: self.most_angle,
            options: self.options,
        })
    }
}

impl Default for PaddleEngineBuilder {
    fn default() -> Self {
        Self {
            lang: "ch".to_string(),
            threads: 4,
            det_path: None,
            cls_path: None,
            rec_paths: None,
            max_side_len: 1024,
            most_angle: false,
            options: DetectionOptions::default(),
            execution_providers: DEFAULT_PROVIDERS.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ModelPaths {
    det: PathBuf,
    cls: Option<PathBuf>,
    rec: PathBuf,
    keys: PathBuf,
}

fn default_rec_paths(lang: &str) -> (PathBuf, PathBuf) {
    let name = format!("{lang}_PP-OCRv4_rec_infer");
    let model = Path::new("models").join(&name).join(format!("{name}.onnx"));
    let keys = if lang == "ch" {
        PathBuf::from(CHINESE_DICTIONARY)
    } else {
        Path::new("models").join(format!("{lang}_dict.txt"))
    };
    (model, keys)
}

/// One region read by the engine.
#[derive(Debug, Clone)]
pub struct Recognition {
    pub region: TextRegion,
    pub line: TextLine,
}

/// Loaded PaddleOCR models. Sessions are created once and reused for every
/// image.
pub struct PaddleEngine {
    detector: Detector,
    classifier: Option<OrientationClassifier>,
    recognizer: Recognizer,
    max_side_len: u32,
    most_angle: bool,
    options: DetectionOptions,
}

impl PaddleEngine {
    #[instrument(skip(self, image))]
    pub fn recognize(
        &self,
        image: &DynamicImage,
        classify_orientation: bool,
    ) -> Result<Vec<Recognition>, OcrError> {
        let scale = geometry::Scale::fit(image.width(), image.height(), self.max_side_len);
        let regions = self.detector.find_regions(image, scale, &self.options)?;

        let (regions, mut crops): (Vec<_>, Vec<_>) = regions
            .into_iter()
            .filter_map(|region| {
                let crop = geometry::crop(image, &region.rect)?;
                Some((region, crop))
            })
            .unzip();
        log::debug!("Detected {} text regions", regions.len());

        if let Some(classifier) = self.classifier.as_ref().filter(|_| classify_orientation) {
            let orientations = classifier.classify(&crops, self.most_angle)?;
            for (crop, orientation) in crops.iter_mut().zip(orientations) {
                if orientation == Orientation::UpsideDown {
                    *crop = crop.rotate180();
                }
            }
        }

        let lines = self.recognizer.recognize(&crops)?;
        Ok(regions
            .into_iter()
            .zip(lines)
            .map(|(region, line)| Recognition { region, line })
            .collect())
    }
}

/// Lays recognitions out the way PaddleOCR reports a single image:
/// `[[ [[x, y] x4], [text, confidence] ], ...]` wrapped in a one-image list.
pub fn to_paddle_layout(recognitions: &[Recognition]) -> Value {
    let lines = recognitions
        .iter()
        .map(|it| {
            json!([
                geometry::corners(&it.region.rect),
                [it.line.text, it.line.confidence()]
            ])
        })
        .collect::<Vec<_>>();
    json!([lines])
}

impl OcrBackend for PaddleEngine {
    fn name(&self) -> &'static str {
        "paddle-onnx"
    }

    fn ocr(
        &self,
        _path: &Path,
        image: &DynamicImage,
        classify_orientation: bool,
    ) -> Result<Value, OcrError> {
        let recognitions = self.recognize(image, classify_orientation)?;
        Ok(to_paddle_layout(&recognitions))
    }
}
