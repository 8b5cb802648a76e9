//! Resizing for text-line recognition inputs.
//!
//! Recognition models take crops of a fixed height. Width is derived from
//! the crop's aspect ratio and the remainder of the target width is padded
//! on the right, so `valid_ratio` tells the model how much of a row is text.

use super::resize::{pad_to, resize_to};
use crate::error::PipelineError;
use crate::record::Record;
use crate::transform::Transform;
use image::{DynamicImage, GenericImageView};
use rand::RngCore;
use serde::Deserialize;

fn default_padding() -> bool {
    true
}

fn require_content(
    image: &DynamicImage,
    stage: &'static str,
) -> Result<(u32, u32), PipelineError> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return Err(PipelineError::processing(stage, "cannot resize an empty image"));
    }
    Ok((w, h))
}

/// Width of a `w x h` crop scaled to `height`, capped at `max_width`
fn fitted_width(w: u32, h: u32, height: u32, max_width: u32) -> u32 {
    let width = (f64::from(height) * f64::from(w) / f64::from(h)).ceil();
    (width as u32).clamp(1, max_width)
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecResizeConfig {
    /// `[H, W]` of the output
    pub image_shape: [u32; 2],
    /// Keep the aspect ratio and pad the right side; otherwise stretch
    #[serde(default = "default_padding")]
    pub padding: bool,
}

/// Resize a text-line crop to a fixed height and right-pad to a fixed width
#[derive(Debug, Clone)]
pub struct RecResizeImg {
    name: &'static str,
    height: u32,
    width: u32,
    padding: bool,
}

impl RecResizeImg {
    pub const NAME: &'static str = "RecResizeImg";
    pub const SVTR_NAME: &'static str = "SVTRRecResizeImg";

    pub fn new(config: RecResizeConfig) -> Result<Self, PipelineError> {
        Self::named(Self::NAME, config)
    }

    /// Same resize, registered under the SVTR config name
    pub fn svtr(config: RecResizeConfig) -> Result<Self, PipelineError> {
        Self::named(Self::SVTR_NAME, config)
    }

    fn named(name: &'static str, config: RecResizeConfig) -> Result<Self, PipelineError> {
        let [height, width] = config.image_shape;
        if height == 0 || width == 0 {
            return Err(PipelineError::Configuration(format!(
                "{}: image_shape must be positive (got {}x{})",
                name, height, width
            )));
        }
        Ok(Self {
            name,
            height,
            width,
            padding: config.padding,
        })
    }
}

impl Transform for RecResizeImg {
    fn name(&self) -> &'static str {
        self.name
    }

    fn apply(&self, mut record: Record, _rng: &mut dyn RngCore) -> Result<Record, PipelineError> {
        let image = record.take_raster(self.name)?;
        let (w, h) = require_content(&image, self.name)?;

        let resized_w = if self.padding {
            fitted_width(w, h, self.height, self.width)
        } else {
            self.width
        };
        let resized = resize_to(image, resized_w, self.height);

        record.set_raster(pad_to(resized, self.width, self.height, self.name)?);
        record.valid_ratio = Some((resized_w as f32 / self.width as f32).min(1.0));
        Ok(record)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecInferResizeConfig {
    pub target_height: u32,
    pub target_width: u32,
    pub keep_ratio: bool,
    /// Pad to `target_width`, only when `keep_ratio` is set
    pub padding: bool,
    /// Normalize before padding so the padded area stays at zero
    pub norm_before_pad: bool,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for RecInferResizeConfig {
    fn default() -> Self {
        Self {
            target_height: 32,
            target_width: 320,
            keep_ratio: true,
            padding: false,
            norm_before_pad: false,
            mean: [127.0; 3],
            std: [127.0; 3],
        }
    }
}

/// Inference-time recognition resize followed by normalization
#[derive(Debug, Clone)]
pub struct RecResizeNormForInfer {
    config: RecInferResizeConfig,
}

impl RecResizeNormForInfer {
    pub const NAME: &'static str = "RecResizeNormForInfer";

    pub fn new(config: RecInferResizeConfig) -> Result<Self, PipelineError> {
        if config.target_height == 0 || config.target_width == 0 {
            return Err(PipelineError::Configuration(format!(
                "{}: target size must be positive (got {}x{})",
                Self::NAME,
                config.target_height,
                config.target_width
            )));
        }
        if config.std.iter().any(|&s| s == 0.0) {
            return Err(PipelineError::Configuration(format!(
                "{}: std values must be non-zero",
                Self::NAME
            )));
        }
        Ok(Self { config })
    }

    /// `(x - mean) / std` per channel on the 0..255 scale
    fn normalize(&self, image: DynamicImage) -> DynamicImage {
        let mut rgb = image.to_rgb32f();
        for pixel in rgb.pixels_mut() {
            for (c, v) in pixel.0.iter_mut().enumerate() {
                *v = (*v * 255.0 - self.config.mean[c]) / self.config.std[c];
            }
        }
        DynamicImage::ImageRgb32F(rgb)
    }
}

impl Transform for RecResizeNormForInfer {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn apply(&self, mut record: Record, _rng: &mut dyn RngCore) -> Result<Record, PipelineError> {
        let image = record.take_raster(Self::NAME)?;
        let (w, h) = require_content(&image, Self::NAME)?;
        let (target_h, target_w) = (self.config.target_height, self.config.target_width);

        let resize_w = if self.config.keep_ratio {
            let max_ratio = f64::from(target_w) / f64::from(target_h);
            let width = f64::from(target_h) * (f64::from(w) / f64::from(h)).min(max_ratio);
            (width.ceil() as u32).clamp(1, target_w)
        } else {
            target_w
        };
        let resized = resize_to(image, resize_w, target_h);
        record.shape = Some([
            h as f32,
            w as f32,
            target_h as f32 / h as f32,
            resize_w as f32 / w as f32,
        ]);

        let pad = self.config.padding && self.config.keep_ratio;
        let image = if self.config.norm_before_pad {
            let normalized = self.normalize(resized);
            if pad {
                pad_to(normalized, target_w, target_h, Self::NAME)?
            } else {
                normalized
            }
        } else if pad {
            self.normalize(pad_to(resized, target_w, target_h, Self::NAME)?)
        } else {
            self.normalize(resized)
        };
        record.set_raster(image);
        Ok(record)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotateDirection {
    #[default]
    Counterclockwise,
    Clockwise,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RotateConfig {
    /// Height-to-width ratio above which the crop is rotated
    pub threshold: f32,
    pub direction: RotateDirection,
}

impl Default for RotateConfig {
    fn default() -> Self {
        Self {
            threshold: 1.5,
            direction: RotateDirection::default(),
        }
    }
}

/// Turn vertical text-line crops on their side. Must run before resizing.
#[derive(Debug, Clone)]
pub struct Rotate90IfVertical {
    threshold: f32,
    direction: RotateDirection,
}

impl Rotate90IfVertical {
    pub const NAME: &'static str = "Rotate90IfVertical";

    pub fn new(config: RotateConfig) -> Result<Self, PipelineError> {
        if !config.threshold.is_finite() {
            return Err(PipelineError::Configuration(format!(
                "{}: threshold must be finite",
                Self::NAME
            )));
        }
        Ok(Self {
            threshold: config.threshold,
            direction: config.direction,
        })
    }
}

impl Transform for Rotate90IfVertical {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn apply(&self, mut record: Record, _rng: &mut dyn RngCore) -> Result<Record, PipelineError> {
        let image = record.take_raster(Self::NAME)?;
        let (w, h) = image.dimensions();

        let image = if h as f32 / w as f32 > self.threshold {
            match self.direction {
                RotateDirection::Counterclockwise => image.rotate270(),
                RotateDirection::Clockwise => image.rotate90(),
            }
        } else {
            image
        };
        record.set_raster(image);
        Ok(record)
    }
}
