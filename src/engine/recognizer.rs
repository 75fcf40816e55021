use std::path::Path;

use float_ord::FloatOrd;
use image::{imageops::FilterType, DynamicImage};
use ndarray::{ArrayView2, Axis, Ix2};
use ort::{inputs, Session};
use tracing::instrument;

use super::{geometry::normalize_chw, session_builder, ExecutionProvider};
use crate::error::{Error, OcrError};

const INPUT_HEIGHT: u32 = 48;

const MEAN_VALUES: [f32; 3] = [0.5, 0.5, 0.5];
const NORM_VALUES: [f32; 3] = [2.0, 2.0, 2.0];

/// Text recognised in one region.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub text: String,
    pub character_scores: Vec<f32>,
}

impl TextLine {
    /// Mean per-character score, `0` for an empty line.
    pub fn confidence(&self) -> f32 {
        if self.character_scores.is_empty() {
            0.0
        } else {
            self.character_scores.iter().sum::<f32>() / self.character_scores.len() as f32
        }
    }
}

/// CRNN text recogniser with CTC decoding.
pub struct Recognizer {
    session: Session,
    keys: Vec<String>,
}

impl Recognizer {
    #[instrument(level = "debug", skip(providers))]
    pub fn init(
        model_path: &Path,
        keys_path: &Path,
        threads: usize,
        providers: &[ExecutionProvider],
    ) -> Result<Self, Error> {
        let session = session_builder(threads, providers)?.commit_from_file(model_path)?;
        let dictionary = std::fs::read_to_string(keys_path).map_err(|source| Error::Dictionary {
            path: keys_path.to_path_buf(),
            source,
        })?;
        log::debug!("Recognizer inputs: {:?}", session.inputs);
        Ok(Self {
            session,
            keys: ctc_keys(&dictionary),
        })
    }

    #[instrument(level = "debug", skip(self, crops))]
    pub fn recognize(&self, crops: &[DynamicImage]) -> Result<Vec<TextLine>, OcrError> {
        crops.iter().map(|crop| self.recognize_one(crop)).collect()
    }

    #[instrument(level = "trace", skip(self, crop))]
    fn recognize_one(&self, crop: &DynamicImage) -> Result<TextLine, OcrError> {
        let scale = INPUT_HEIGHT as f32 / crop.height() as f32;
        let width = ((crop.width() as f32 * scale) as u32).clamp(1, u16::MAX as u32);
        let resized = crop.resize_exact(width, INPUT_HEIGHT, FilterType::Nearest);

        let input = normalize_chw(&resized, &MEAN_VALUES, &NORM_VALUES).insert_axis(Axis(0));
        let outputs = self.session.run(inputs!["x" => input]?)?;
        let (_, output) = outputs
            .first_key_value()
            .ok_or_else(|| OcrError::output("recognizer produced no outputs"))?;
        let scores = output.try_extract_tensor::<f32>()?;
        log::trace!("Recognizer output shape: {:?}", scores.shape());

        // [1, T, C] → [T, C]
        let scores = scores
            .remove_axis(Axis(0))
            .into_dimensionality::<Ix2>()
            .map_err(|err| OcrError::output(format!("recognizer scores: {err}")))?;
        Ok(ctc_decode(scores, &self.keys))
    }
}

/// Builds the CTC alphabet: blank, the dictionary lines, then a space.
fn ctc_keys(dictionary: &str) -> Vec<String> {
    std::iter::once("#".to_string())
        .chain(dictionary.lines().map(str::to_string))
        .chain(std::iter::once(" ".to_string()))
        .collect()
}

/// Greedy CTC decode: best class per time step, dropping blanks and
/// repeats of the previous step.
fn ctc_decode(scores: ArrayView2<f32>, keys: &[String]) -> TextLine {
    let mut text = String::new();
    let mut character_scores = Vec::new();
    let mut previous = 0;
    for step in scores.outer_iter() {
        let Some((index, score)) = step
            .iter()
            .copied()
            .enumerate()
            .max_by_key(|(_, score)| FloatOrd(*score))
        else {
            continue;
        };
        if index > 0 && index < keys.len() && index != previous {
            text.push_str(&keys[index]);
            character_scores.push(score);
        }
        previous = index;
    }
    TextLine {
        text,
        character_scores,
    }
}
