use crate::error::PipelineError;
use crate::record::Record;
use crate::transform::Transform;
use image::{DynamicImage, Rgb};
use imageproc::map::map_colors;
use rand::{Rng, RngCore};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ColorAdjustConfig {
    pub brightness: f32,
    pub saturation: f32,
}

impl Default for ColorAdjustConfig {
    fn default() -> Self {
        Self {
            brightness: 32.0 / 255.0,
            saturation: 0.5,
        }
    }
}

/// Random brightness and saturation jitter on an RGB raster
#[derive(Debug, Clone)]
pub struct RandomColorAdjust {
    brightness: f32,
    saturation: f32,
}

impl RandomColorAdjust {
    pub const NAME: &'static str = "RandomColorAdjust";

    pub fn new(config: ColorAdjustConfig) -> Result<Self, PipelineError> {
        if config.brightness < 0.0 || config.saturation < 0.0 {
            return Err(PipelineError::Configuration(format!(
                "{}: brightness and saturation must be non-negative",
                Self::NAME
            )));
        }
        Ok(Self {
            brightness: config.brightness,
            saturation: config.saturation,
        })
    }
}

/// Factor drawn from `[max(0, 1 - amount), 1 + amount]`
fn jitter_factor(amount: f32, rng: &mut dyn RngCore) -> f32 {
    if amount == 0.0 {
        return 1.0;
    }
    rng.gen_range((1.0 - amount).max(0.0)..=1.0 + amount)
}

fn adjust(pixel: Rgb<u8>, brightness: f32, saturation: f32) -> Rgb<u8> {
    let [r, g, b] = pixel.0.map(|c| f32::from(c) * brightness);
    // ITU-R 601-2 luma, as used for grayscale conversion
    let luma = 0.299 * r + 0.587 * g + 0.114 * b;
    Rgb([r, g, b].map(|c| (luma + (c - luma) * saturation).round().clamp(0.0, 255.0) as u8))
}

impl Transform for RandomColorAdjust {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn apply(&self, mut record: Record, rng: &mut dyn RngCore) -> Result<Record, PipelineError> {
        let image = record.take_raster(Self::NAME)?;
        let brightness = jitter_factor(self.brightness, rng);
        let saturation = jitter_factor(self.saturation, rng);

        let rgb = image.to_rgb8();
        let adjusted = map_colors(&rgb, |p| adjust(p, brightness, saturation));
        record.set_raster(DynamicImage::ImageRgb8(adjusted));
        Ok(record)
    }
}
