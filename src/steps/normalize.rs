use crate::error::PipelineError;
use crate::record::{ChwTensor, Field, ImageData, Record};
use crate::transform::Transform;
use image::{DynamicImage, Rgb32FImage};
use rand::RngCore;
use serde::Deserialize;

/// ImageNet channel means in RGB order, on the 0..255 scale
pub const IMAGENET_MEAN: [f32; 3] = [0.485 * 255.0, 0.456 * 255.0, 0.406 * 255.0];
/// ImageNet channel standard deviations in RGB order, on the 0..255 scale
pub const IMAGENET_STD: [f32; 3] = [0.229 * 255.0, 0.224 * 255.0, 0.225 * 255.0];

/// Per-channel statistics, either literal or a named reference set
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChannelStats {
    Named(String),
    Values(Vec<f32>),
}

impl Default for ChannelStats {
    fn default() -> Self {
        Self::Named("imagenet".to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    pub mean: ChannelStats,
    pub std: ChannelStats,
    pub is_hwc: bool,
    pub bgr_to_rgb: bool,
    pub rgb_to_bgr: bool,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            mean: ChannelStats::default(),
            std: ChannelStats::default(),
            is_hwc: true,
            bgr_to_rgb: false,
            rgb_to_bgr: false,
        }
    }
}

/// Subtract the mean and divide by the standard deviation, per channel
#[derive(Debug, Clone)]
pub struct NormalizeImage {
    mean: [f32; 3],
    std: [f32; 3],
    is_hwc: bool,
    swap_channels: bool,
}

fn resolve(stats: &ChannelStats, which: &str) -> Result<[f32; 3], PipelineError> {
    match stats {
        ChannelStats::Named(name) if name.eq_ignore_ascii_case("imagenet") => Ok(match which {
            "mean" => IMAGENET_MEAN,
            _ => IMAGENET_STD,
        }),
        ChannelStats::Named(name) => Err(PipelineError::Configuration(format!(
            "Wrong {} value: {}",
            which, name
        ))),
        ChannelStats::Values(values) => <[f32; 3]>::try_from(values.as_slice()).map_err(|_| {
            PipelineError::Configuration(format!(
                "{} needs 3 channel values (got {})",
                which,
                values.len()
            ))
        }),
    }
}

impl NormalizeImage {
    pub const NAME: &'static str = "NormalizeImage";

    pub fn new(config: NormalizeConfig) -> Result<Self, PipelineError> {
        let mean = resolve(&config.mean, "mean")?;
        let std = resolve(&config.std, "std")?;
        if std.iter().any(|&s| s == 0.0) {
            return Err(PipelineError::Configuration(
                "std values must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            mean,
            std,
            is_hwc: config.is_hwc,
            swap_channels: config.bgr_to_rgb || config.rgb_to_bgr,
        })
    }

    fn normalize_raster(&self, image: DynamicImage) -> DynamicImage {
        // float rasters hold [0, 1]; statistics are on the 0..255 scale
        let mut rgb: Rgb32FImage = image.to_rgb32f();
        for pixel in rgb.pixels_mut() {
            if self.swap_channels {
                pixel.0.swap(0, 2);
            }
            for (c, v) in pixel.0.iter_mut().enumerate() {
                *v = (*v * 255.0 - self.mean[c]) / self.std[c];
            }
        }
        DynamicImage::ImageRgb32F(rgb)
    }

    fn normalize_planar(&self, mut tensor: ChwTensor) -> Result<ChwTensor, PipelineError> {
        let [channels, height, width] = tensor.shape;
        if channels != 3 {
            return Err(PipelineError::processing(
                Self::NAME,
                format!("expected 3 channels, got {}", channels),
            ));
        }
        let plane = height * width;
        if self.swap_channels {
            let (head, tail) = tensor.data.split_at_mut(2 * plane);
            head[..plane].swap_with_slice(&mut tail[..plane]);
        }
        for (c, values) in tensor.data.chunks_exact_mut(plane.max(1)).enumerate() {
            for v in values {
                *v = (*v - self.mean[c]) / self.std[c];
            }
        }
        Ok(tensor)
    }
}

impl Transform for NormalizeImage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn apply(&self, mut record: Record, _rng: &mut dyn RngCore) -> Result<Record, PipelineError> {
        let normalized = match (record.image.take(), self.is_hwc) {
            (Some(ImageData::Raster(image)), true) => {
                ImageData::Raster(self.normalize_raster(image))
            }
            (Some(ImageData::Planar(tensor)), false) => {
                ImageData::Planar(self.normalize_planar(tensor)?)
            }
            (Some(_), is_hwc) => {
                return Err(PipelineError::processing(
                    Self::NAME,
                    format!("image layout does not match is_hwc={}", is_hwc),
                ))
            }
            (None, _) => return Err(PipelineError::missing(Self::NAME, Field::Image)),
        };
        record.image = Some(normalized);
        Ok(record)
    }
}
