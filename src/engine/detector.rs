use std::path::Path;

use geo::{Coord, MinimumRotatedRect, Polygon, Scale as _};
use image::{imageops::FilterType, DynamicImage, GrayImage};
use imageproc::{
    contours::find_contours,
    contrast::{threshold_mut, ThresholdType},
    distance_transform::Norm,
    morphology::dilate_mut,
};
use ndarray::{ArrayView2, Axis, Ix2};
use ort::{inputs, Session};
use tracing::instrument;

use super::{
    geometry::{
        self, contour_polygon, expand_box, longest_side, mean_score, normalize_chw,
        probability_map,
    },
    session_builder, DetectionOptions, ExecutionProvider,
};
use crate::error::OcrError;

const MEAN_VALUES: [f32; 3] = [0.485, 0.456, 0.406];
const NORM_VALUES: [f32; 3] = [1.0 / 0.229, 1.0 / 0.224, 1.0 / 0.225];

const MIN_SIDE: f32 = 3.0;
const MAX_CANDIDATES: usize = 1000;

/// A text region found by the detector, in source image coordinates.
#[derive(Debug, Clone)]
pub struct TextRegion {
    pub score: f32,
    pub rect: Polygon<f32>,
}

/// DBNet text detector.
pub struct Detector {
    session: Session,
}

impl Detector {
    #[instrument(level = "debug", skip(providers))]
    pub fn init(path: &Path, threads: usize, providers: &[ExecutionProvider]) -> ort::Result<Self> {
        let session = session_builder(threads, providers)?
            .with_memory_pattern(true)?
            .commit_from_file(path)?;
        log::debug!("Detector inputs: {:?}", session.inputs);
        Ok(Self { session })
    }

    #[instrument(level = "debug", skip(self, image))]
    pub fn find_regions(
        &self,
        image: &DynamicImage,
        scale: geometry::Scale,
        options: &DetectionOptions,
    ) -> Result<Vec<TextRegion>, OcrError> {
        let resized =
            image.resize_exact(scale.target_width, scale.target_height, FilterType::Nearest);
        let input = normalize_chw(&resized, &MEAN_VALUES, &NORM_VALUES).insert_axis(Axis(0));
        let outputs = self.session.run(inputs!["x" => input]?)?;
        let (_, output) = outputs
            .first_key_value()
            .ok_or_else(|| OcrError::output("detector produced no outputs"))?;
        let prediction = output.try_extract_tensor::<f32>()?;

        // [1, 1, H, W] → [H, W]
        let prediction = prediction
            .remove_axis(Axis(0))
            .remove_axis(Axis(0))
            .into_dimensionality::<Ix2>()
            .map_err(|err| OcrError::output(format!("detector map: {err}")))?;

        let mut mask = probability_map(prediction.view())
            .ok_or_else(|| OcrError::output("detector map does not fit an image"))?;
        threshold_mut(&mut mask, (options.box_threshold * 255.0) as u8, ThresholdType::Binary);
        dilate_mut(&mut mask, Norm::L1, 2);

        Ok(regions_from_mask(prediction.view(), &mask, scale, options))
    }
}

fn regions_from_mask(
    prediction: ArrayView2<f32>,
    mask: &GrayImage,
    scale: geometry::Scale,
    options: &DetectionOptions,
) -> Vec<TextRegion> {
    find_contours::<i32>(mask)
        .into_iter()
        .take(MAX_CANDIDATES)
        .filter(|contour| contour.points.len() > 2)
        .filter_map(|contour| contour_polygon(&contour.points).minimum_rotated_rect())
        .filter(|rect| longest_side(rect) >= MIN_SIDE)
        .map(|rect| {
            let score = mean_score(&rect, prediction);
            (rect, score)
        })
        .filter(|(_, score)| *score >= options.box_score_threshold)
        .filter_map(|(rect, score)| Some((expand_box(&rect, options.unclip_ratio)?, score)))
        .filter(|(rect, _)| longest_side(rect) >= MIN_SIDE + 2.0)
        .map(|(rect, score)| TextRegion {
            score,
            rect: rect.scale_around_point(scale.factor_x, scale.factor_y, Coord::zero()),
        })
        .collect()
}
