use geo::{
    point, Area, BoundingRect, Contains, Coord, EuclideanLength, HasDimensions, LineString,
    MinimumRotatedRect, Polygon, Translate,
};
use geo_clipper::{Clipper, EndType, JoinType};
use image::{DynamicImage, GrayImage, ImageBuffer, Pixel, Rgb};
use imageproc::point::Point;
use ndarray::{s, Array3, ArrayView2};
use tracing::instrument;

/// Converts an image to a CHW tensor with `(pixel - mean) * norm` applied
/// per channel, pixels scaled to `0..1`.
#[instrument(level = "trace", skip(image))]
pub(crate) fn normalize_chw(image: &DynamicImage, mean: &[f32; 3], norm: &[f32; 3]) -> Array3<f32> {
    let mut image = image.to_rgb32f();
    let norm = Rgb::<f32>(*norm);
    let offset = Rgb::<f32>(*mean).map2(&norm, |m, n| m * n);
    for pixel in image.pixels_mut() {
        *pixel = pixel.map2(&norm, |c, n| c * n).map2(&offset, |c, o| c - o);
    }
    Array3::<f32>::from_shape_fn(
        (3, image.height() as usize, image.width() as usize),
        |(ch, y, x)| image.get_pixel(x as u32, y as u32).channels()[ch],
    )
}

/// Renders a `0..1` probability map as an 8-bit grey image.
pub(crate) fn probability_map(data: ArrayView2<f32>) -> Option<GrayImage> {
    let (height, width) = data.dim();
    let pixels = data
        .iter()
        .map(|p| (p.clamp(0.0, 1.0) * 255.0) as u8)
        .collect::<Vec<u8>>();
    ImageBuffer::from_raw(width as u32, height as u32, pixels)
}

pub(crate) fn contour_polygon(points: &[Point<i32>]) -> Polygon<f32> {
    let coords = points
        .iter()
        .map(|p| Coord {
            x: p.x as f32,
            y: p.y as f32,
        })
        .collect();
    Polygon::new(LineString::new(coords), vec![])
}

pub(crate) fn longest_side(rect: &Polygon<f32>) -> f32 {
    rect.exterior()
        .lines()
        .map(|line| line.euclidean_length())
        .fold(0.0, f32::max)
}

/// Mean probability of the map cells covered by `rect`.
pub(crate) fn mean_score(rect: &Polygon<f32>, map: ArrayView2<f32>) -> f32 {
    let Some(bounds) = rect.bounding_rect() else {
        return 0.0;
    };
    let (rows, cols) = map.dim();
    let min = bounds.min();
    let max = bounds.max();
    let (x0, x1) = (min.x.max(0.0) as usize, (max.x.max(0.0) as usize).min(cols));
    let (y0, y1) = (min.y.max(0.0) as usize, (max.y.max(0.0) as usize).min(rows));
    if x0 >= x1 || y0 >= y1 {
        return 0.0;
    }

    let window = map.slice(s![y0..y1, x0..x1]);
    let local = rect.translate(-(x0 as f32), -(y0 as f32));
    let (sum, count) = window
        .indexed_iter()
        .filter(|((y, x), _)| local.contains(&point![x: *x as f32, y: *y as f32]))
        .fold((0.0f32, 0usize), |(sum, count), (_, v)| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

/// Grows a tight text box outwards so it covers the whole glyph height.
pub(crate) fn expand_box(rect: &Polygon<f32>, ratio: f32) -> Option<Polygon<f32>> {
    let perimeter = rect.exterior().euclidean_length();
    if perimeter <= 0.0 {
        return None;
    }
    let distance = rect.unsigned_area() * 0.5 * ratio / perimeter;
    let grown = rect.offset(distance, JoinType::Round(0.25), EndType::ClosedPolygon, 1.0);
    if grown.is_empty() {
        None
    } else {
        grown.minimum_rotated_rect()
    }
}

/// Dimensions the detector input is resized to, plus the factors mapping
/// detector coordinates back onto the source image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    pub factor_x: f32,
    pub factor_y: f32,
    pub target_width: u32,
    pub target_height: u32,
}

impl Scale {
    /// Fits the longer side into `max_side_len` and floors both sides to a
    /// multiple of 32, the stride of the detection network.
    pub fn fit(width: u32, height: u32, max_side_len: u32) -> Self {
        let aspect = width as f32 / height as f32;
        let (w, h) = if aspect >= 1.0 {
            let w = width.min(max_side_len);
            (w, (w as f32 / aspect) as u32)
        } else {
            let h = height.min(max_side_len);
            ((h as f32 * aspect) as u32, h)
        };
        let target_width = (w / 32 * 32).max(32);
        let target_height = (h / 32 * 32).max(32);
        let scale = Self {
            factor_x: width as f32 / target_width as f32,
            factor_y: height as f32 / target_height as f32,
            target_width,
            target_height,
        };
        log::debug!("Detector input for {width}x{height}: {scale:?}");
        scale
    }
}

/// Crops the axis-aligned bounding box of `region` out of `image`.
pub(crate) fn crop(image: &DynamicImage, region: &Polygon<f32>) -> Option<DynamicImage> {
    let rect = region.bounding_rect()?;
    let x = (rect.min().x.max(0.0) as u32).min(image.width());
    let y = (rect.min().y.max(0.0) as u32).min(image.height());
    let width = (rect.width() as u32).min(image.width() - x);
    let height = (rect.height() as u32).min(image.height() - y);
    if width == 0 || height == 0 {
        return None;
    }
    log::trace!("Cropping text region {rect:?}");
    Some(image.crop_imm(x, y, width, height))
}

/// Corner points of a closed polygon, without the repeated closing point.
pub(crate) fn corners(region: &Polygon<f32>) -> Vec<[f32; 2]> {
    let ring = &region.exterior().0;
    let open = match (ring.first(), ring.last()) {
        (Some(first), Some(last)) if ring.len() > 1 && first == last => &ring[..ring.len() - 1],
        _ => &ring[..],
    };
    open.iter().map(|c| [c.x, c.y]).collect()
}
