use super::layout::to_chw;
use crate::error::PipelineError;
use crate::record::{Field, ImageData, ImageSource, Record};
use crate::transform::Transform;
use image::{DynamicImage, ImageDecoder, ImageReader, RgbImage};
use rand::RngCore;
use serde::Deserialize;
use std::io::Cursor;

/// Channel order of decoded rasters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum ChannelOrder {
    #[serde(rename = "RGB", alias = "rgb")]
    Rgb,
    #[default]
    #[serde(rename = "BGR", alias = "bgr")]
    Bgr,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    pub img_mode: ChannelOrder,
    pub channel_first: bool,
    pub to_float32: bool,
    pub ignore_orientation: bool,
}

/// Decode the record's encoded source into a three-channel raster
#[derive(Debug, Clone)]
pub struct DecodeImage {
    config: DecodeConfig,
}

impl DecodeImage {
    pub const NAME: &'static str = "DecodeImage";

    pub fn new(config: DecodeConfig) -> Self {
        Self { config }
    }

    fn decode(&self, bytes: Vec<u8>) -> Result<DynamicImage, PipelineError> {
        let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
        let mut decoder = reader
            .into_decoder()
            .map_err(|e| PipelineError::Decode(e.to_string()))?;

        let orientation = if self.config.ignore_orientation {
            None
        } else {
            decoder.orientation().ok()
        };

        let mut image =
            DynamicImage::from_decoder(decoder).map_err(|e| PipelineError::Decode(e.to_string()))?;
        if let Some(orientation) = orientation {
            image.apply_orientation(orientation);
        }
        Ok(image)
    }
}

fn swap_red_blue(mut rgb: RgbImage) -> RgbImage {
    for pixel in rgb.pixels_mut() {
        pixel.0.swap(0, 2);
    }
    rgb
}

impl Transform for DecodeImage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn required_fields(&self) -> &'static [Field] {
        &[Field::Source]
    }

    fn apply(&self, mut record: Record, _rng: &mut dyn RngCore) -> Result<Record, PipelineError> {
        let bytes = match record.source.take() {
            Some(ImageSource::Path(path)) => std::fs::read(path)?,
            Some(ImageSource::Bytes(bytes)) => bytes,
            None => return Err(PipelineError::missing(Self::NAME, Field::Source)),
        };

        let mut rgb = self.decode(bytes)?.to_rgb8();
        if self.config.img_mode == ChannelOrder::Bgr {
            rgb = swap_red_blue(rgb);
        }

        let image = if self.config.to_float32 {
            DynamicImage::ImageRgb32F(DynamicImage::ImageRgb8(rgb).to_rgb32f())
        } else {
            DynamicImage::ImageRgb8(rgb)
        };

        record.image = Some(if self.config.channel_first {
            ImageData::Planar(to_chw(&image))
        } else {
            ImageData::Raster(image)
        });
        Ok(record)
    }
}
