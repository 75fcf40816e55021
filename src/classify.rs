use std::fmt;

use serde_json::Value;
use tracing::instrument;

use crate::coord::{flatten_coord, fold_max, fold_min, mean};

/// Substituted when a detection's `[text, confidence]` pair is malformed.
pub const LINE_INFO_ERROR_TEXT: &str = "文字解析錯誤: line[1] 格式異常";

const READ_MARKER: &str = "已讀";
const TIME_OF_DAY_MARKERS: [&str; 2] = ["上午", "下午"];
const CLOCK_SEPARATOR: char = ':';
const CHEVRON: char = '<';

const MIN_LINE_HEIGHT: f64 = 10.0;
const MIN_CHEVRON_LINE_HEIGHT: f64 = 5.0;

/// Which side of the conversation a bubble belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Speaker {
    /// Left-aligned bubbles.
    Them,
    /// Right-aligned bubbles, written by the device owner.
    Me,
}

impl Speaker {
    pub fn from_center(center_x: f64, half_width: f64) -> Self {
        if center_x < half_width {
            Speaker::Them
        } else {
            Speaker::Me
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Speaker::Them => "A",
            Speaker::Me => "我",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedMessage {
    pub top: f64,
    pub speaker: Speaker,
    pub text: String,
}

impl ClassifiedMessage {
    pub fn new(top: f64, speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            top,
            speaker,
            text: text.into(),
        }
    }
}

/// Geometry derived from a detection's bounding polygon.
#[derive(Debug, Clone, Copy)]
pub struct Placement {
    pub top: f64,
    pub height: f64,
    pub center_x: f64,
}

impl Placement {
    pub fn from_polygon(points: &[Value]) -> Self {
        let ys = points
            .iter()
            .map(|point| point_coord(point, 1))
            .collect::<Vec<_>>();
        let xs = points
            .iter()
            .map(|point| point_coord(point, 0))
            .collect::<Vec<_>>();
        let top = fold_min(&ys);
        let bottom = fold_max(&ys);
        Self {
            top,
            height: bottom - top,
            center_x: mean(&xs),
        }
    }
}

fn point_coord(point: &Value, axis: usize) -> f64 {
    match point.get(axis) {
        Some(coord) => flatten_coord(coord),
        None => {
            log::warn!("Polygon point {point} has no coordinate at index {axis}, using NaN.");
            f64::NAN
        }
    }
}

/// Splits a detection's line info into text and confidence.
fn line_info(info: Option<&Value>) -> (&str, f64) {
    match info {
        Some(Value::Array(pair)) if pair.len() == 2 => match &pair[0] {
            Value::String(text) => (text.as_str(), pair[1].as_f64().unwrap_or(0.0)),
            _ => (LINE_INFO_ERROR_TEXT, 0.0),
        },
        _ => (LINE_INFO_ERROR_TEXT, 0.0),
    }
}

pub fn is_message_text(text: &str, height: f64) -> bool {
    text != READ_MARKER
        && !TIME_OF_DAY_MARKERS
            .iter()
            .any(|marker| text.contains(marker))
        && !text.contains(CLOCK_SEPARATOR)
        && height > MIN_LINE_HEIGHT
}

fn is_leading_chevron_line(index: usize, text: &str, height: f64) -> bool {
    index == 0 && text.starts_with(CHEVRON) && height > MIN_CHEVRON_LINE_HEIGHT
}

/// Turns the raw OCR output for one image into conversation messages.
///
/// `result` is expected to be a list whose first entry holds the detections
/// of the image, each shaped `[polygon, [text, confidence]]`. Anything else
/// is logged and produces no messages.
#[instrument(level = "debug", skip(result))]
pub fn extract_messages(result: &Value, half_width: f64) -> Vec<ClassifiedMessage> {
    let detections = match result.as_array().and_then(|pages| pages.first()) {
        Some(Value::Array(detections)) => detections,
        _ => {
            log::warn!("OCR result is not a list of detection lists, skipping image.");
            return Vec::new();
        }
    };

    let mut messages = Vec::new();
    for (index, detection) in detections.iter().enumerate() {
        let polygon = match detection.get(0) {
            Some(Value::Array(points)) if !points.is_empty() => points,
            _ => {
                log::debug!("Detection {index} has no bounding polygon, skipping.");
                continue;
            }
        };
        let (text, confidence) = line_info(detection.get(1));
        let placement = Placement::from_polygon(polygon);
        let speaker = Speaker::from_center(placement.center_x, half_width);
        log::trace!("Detection {index}: {text:?} ({confidence}) at {placement:?}");

        if !is_message_text(text, placement.height)
            && !is_leading_chevron_line(index, text, placement.height)
        {
            continue;
        }
        let text = text.trim();
        if text.is_empty() {
            log::debug!("Detection {index} is blank after trimming, skipping.");
            continue;
        }
        messages.push(ClassifiedMessage::new(placement.top, speaker, text));
    }
    messages
}
