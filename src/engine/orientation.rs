use std::path::Path;

use float_ord::FloatOrd;
use image::{imageops::FilterType, DynamicImage};
use ndarray::Axis;
use ort::{inputs, Session};
use tracing::instrument;

use super::{geometry::normalize_chw, session_builder, ExecutionProvider};
use crate::error::OcrError;

const INPUT_WIDTH: u32 = 192;
const INPUT_HEIGHT: u32 = 48;

const MEAN_VALUES: [f32; 3] = [0.5, 0.5, 0.5];
const NORM_VALUES: [f32; 3] = [2.0, 2.0, 2.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Upright,
    UpsideDown,
}

/// Text line orientation classifier (0° / 180°).
pub struct OrientationClassifier {
    session: Session,
}

impl OrientationClassifier {
    #[instrument(level = "debug", skip(providers))]
    pub fn init(path: &Path, threads: usize, providers: &[ExecutionProvider]) -> ort::Result<Self> {
        let session = session_builder(threads, providers)?.commit_from_file(path)?;
        log::debug!("Orientation classifier inputs: {:?}", session.inputs);
        Ok(Self { session })
    }

    /// Classifies every crop. With `majority` set, all crops take the
    /// orientation most of them agree on.
    #[instrument(level = "debug", skip(self, crops))]
    pub fn classify(
        &self,
        crops: &[DynamicImage],
        majority: bool,
    ) -> Result<Vec<Orientation>, OcrError> {
        let mut orientations = crops
            .iter()
            .map(|crop| self.classify_one(crop))
            .collect::<Result<Vec<_>, _>>()?;

        if majority && !orientations.is_empty() {
            let flipped = orientations
                .iter()
                .filter(|o| **o == Orientation::UpsideDown)
                .count();
            let winner = if (flipped as f32) < orientations.len() as f32 / 2.0 {
                Orientation::Upright
            } else {
                Orientation::UpsideDown
            };
            orientations.iter_mut().for_each(|o| *o = winner);
        }
        Ok(orientations)
    }

    #[instrument(level = "trace", skip(self, crop))]
    fn classify_one(&self, crop: &DynamicImage) -> Result<Orientation, OcrError> {
        let resized = crop.resize_exact(INPUT_WIDTH, INPUT_HEIGHT, FilterType::Nearest);
        let input = normalize_chw(&resized, &MEAN_VALUES, &NORM_VALUES).insert_axis(Axis(0));
        let outputs = self.session.run(inputs!["x" => input]?)?;
        let (_, output) = outputs
            .first_key_value()
            .ok_or_else(|| OcrError::output("orientation classifier produced no outputs"))?;
        let scores = output.try_extract_tensor::<f32>()?;

        let best = scores
            .iter()
            .enumerate()
            .max_by_key(|(_, score)| FloatOrd(**score))
            .map(|(index, _)| index)
            .ok_or_else(|| OcrError::output("orientation classifier returned no scores"))?;
        Ok(if best == 1 {
            Orientation::UpsideDown
        } else {
            Orientation::Upright
        })
    }
}
