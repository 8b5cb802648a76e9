//! Random crop that avoids cutting through text instances.
//!
//! The search marks, per axis, every row and column covered by the bounding
//! box of a non-ignored polygon, then samples crop edges only from unmarked
//! positions. A crop is accepted once it is large enough and contains at least
//! one polygon. Polygons that reach past the image bounds disable the search
//! and are later clipped back to the crop rectangle.

use super::resize::{pad_to, resize_to, scaled_len};
use crate::error::PipelineError;
use crate::geometry::{Polygon, Window, DEFAULT_MIN_REPAIR_AREA};
use crate::record::Record;
use crate::transform::Transform;
use image::GenericImageView;
use rand::{seq::index, RngCore};
use serde::Deserialize;
use std::ops::Range;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CropConfig {
    /// Attempts to find a crop containing a polygon
    pub max_tries: usize,
    /// Minimum crop size relative to the image, per axis
    pub min_crop_ratio: f32,
    /// `[H, W]` of the output, reached by uniform scaling plus padding
    pub crop_size: [u32; 2],
    /// Clipped polygons smaller than this are dropped
    pub min_repair_area: f64,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            max_tries: 10,
            min_crop_ratio: 0.1,
            crop_size: [640, 640],
            min_repair_area: DEFAULT_MIN_REPAIR_AREA,
        }
    }
}

/// Outcome of the crop window search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropSearch {
    pub window: Window,
    /// A non-ignored polygon extends past the image
    pub out_of_bounds: bool,
}

impl CropSearch {
    fn full(height: usize, width: usize) -> Self {
        Self {
            window: Window::full(height, width),
            out_of_bounds: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RandomCropWithBBox {
    max_tries: usize,
    min_crop_ratio: f32,
    crop_size: [u32; 2],
    min_repair_area: f64,
}

impl RandomCropWithBBox {
    pub const NAME: &'static str = "RandomCropWithBBox";

    pub fn new(config: CropConfig) -> Result<Self, PipelineError> {
        let [h, w] = config.crop_size;
        if h == 0 || w == 0 {
            return Err(PipelineError::Configuration(format!(
                "{}: crop_size must be positive (got {}x{})",
                Self::NAME,
                h,
                w
            )));
        }
        if !(0.0..=1.0).contains(&config.min_crop_ratio) {
            return Err(PipelineError::Configuration(format!(
                "{}: min_crop_ratio must be within [0, 1] (got {})",
                Self::NAME,
                config.min_crop_ratio
            )));
        }
        if config.min_repair_area.is_nan() || config.min_repair_area < 0.0 {
            return Err(PipelineError::Configuration(format!(
                "{}: min_repair_area must be non-negative",
                Self::NAME
            )));
        }
        Ok(Self {
            max_tries: config.max_tries,
            min_crop_ratio: config.min_crop_ratio,
            crop_size: config.crop_size,
            min_repair_area: config.min_repair_area,
        })
    }

    /// Search for a crop window in a `height x width` image.
    ///
    /// Falls back to the full image when every polygon is ignored, when some
    /// axis has no free band, or when `max_tries` attempts all fail.
    pub fn find_crop(
        &self,
        height: usize,
        width: usize,
        polys: &[Polygon],
        ignore_tags: &[bool],
        rng: &mut dyn RngCore,
    ) -> CropSearch {
        let full = CropSearch::full(height, width);
        let candidates: Vec<&Polygon> = polys
            .iter()
            .zip(ignore_tags)
            .filter(|(_, &ignored)| !ignored)
            .map(|(poly, _)| poly)
            .collect();
        if candidates.is_empty() {
            return full;
        }

        let mut rows = vec![false; height];
        let mut cols = vec![false; width];
        for poly in &candidates {
            let Some(b) = poly.bounds() else {
                continue;
            };
            let xs = span(b.min_x, b.max_x, width);
            let ys = span(b.min_y, b.max_y, height);
            let (Some(xs), Some(ys)) = (xs, ys) else {
                debug!(?b, width, height, "polygon exceeds image bounds");
                return CropSearch {
                    out_of_bounds: true,
                    ..full
                };
            };
            cols[xs].fill(true);
            rows[ys].fill(true);
        }

        let free_rows = free_positions(&rows);
        let free_cols = free_positions(&cols);
        if free_rows.len() < 2 || free_cols.len() < 2 {
            debug!("text covers a full axis, keeping the whole image");
            return full;
        }

        let min_h = (height as f32 * self.min_crop_ratio).ceil() as usize;
        let min_w = (width as f32 * self.min_crop_ratio).ceil() as usize;

        for _ in 0..self.max_tries {
            let (y0, y1) = sample_pair(&free_rows, rng);
            let (x0, x1) = sample_pair(&free_cols, rng);
            if y1 - y0 < min_h || x1 - x0 < min_w {
                continue;
            }

            let window = Window { y0, x0, y1, x1 };
            if candidates.iter().any(|poly| poly.overlaps(&window)) {
                return CropSearch {
                    window,
                    out_of_bounds: false,
                };
            }
        }

        debug!(tries = self.max_tries, "no crop found, keeping the whole image");
        full
    }
}

impl Transform for RandomCropWithBBox {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn apply(&self, mut record: Record, rng: &mut dyn RngCore) -> Result<Record, PipelineError> {
        record.check_alignment(Self::NAME)?;
        let image = record.take_raster(Self::NAME)?;
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(PipelineError::processing(Self::NAME, "cannot crop an empty image"));
        }
        let (height, width) = (height as usize, width as usize);

        let search = match &record.polys {
            Some(polys) if !polys.is_empty() => {
                self.find_crop(height, width, polys, &record.ignore_flags(), rng)
            }
            _ => CropSearch::full(height, width),
        };
        let window = search.window;

        let [crop_h, crop_w] = self.crop_size;
        let scale =
            (crop_h as f32 / window.height() as f32).min(crop_w as f32 / window.width() as f32);

        let cropped = if window == Window::full(height, width) {
            image
        } else {
            image.crop_imm(
                window.x0 as u32,
                window.y0 as u32,
                window.width() as u32,
                window.height() as u32,
            )
        };
        let new_w = scaled_len(window.width() as u32, scale).min(crop_w);
        let new_h = scaled_len(window.height() as u32, scale).min(crop_h);
        let resized = resize_to(cropped, new_w, new_h);

        let (dx, dy) = (-(window.x0 as f32), -(window.y0 as f32));
        record.filter_instances(Self::NAME, |mut poly| {
            if !poly.overlaps(&window) {
                return None;
            }
            poly.translate(dx, dy);
            poly.scale(scale, scale);
            Some(poly)
        })?;

        if search.out_of_bounds {
            let (w, h) = (f64::from(new_w), f64::from(new_h));
            let min_area = self.min_repair_area;
            record.filter_instances(Self::NAME, |poly| poly.clip_to_rect(w, h, min_area))?;
        }

        record.set_raster(pad_to(resized, crop_w, crop_h, Self::NAME)?);
        Ok(record)
    }
}

/// Occupied indices `[round(min), round(max)]`, clamped at zero.
///
/// `None` when the span reaches past `len` or a bound is not finite.
fn span(min: f32, max: f32, len: usize) -> Option<Range<usize>> {
    if !min.is_finite() || !max.is_finite() || max.round() >= len as f32 {
        return None;
    }
    let end = max.round().max(0.0) as usize;
    let start = (min.round().max(0.0) as usize).min(end);
    Some(start..end + 1)
}

fn free_positions(occupied: &[bool]) -> Vec<usize> {
    occupied
        .iter()
        .enumerate()
        .filter(|(_, &taken)| !taken)
        .map(|(i, _)| i)
        .collect()
}

/// Two distinct entries of `available`, in ascending order
fn sample_pair(available: &[usize], rng: &mut dyn RngCore) -> (usize, usize) {
    let picked = index::sample(rng, available.len(), 2);
    let (a, b) = (available[picked.index(0)], available[picked.index(1)]);
    (a.min(b), a.max(b))
}
