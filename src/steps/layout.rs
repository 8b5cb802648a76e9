use crate::error::PipelineError;
use crate::record::{ChwTensor, ImageData, Record};
use crate::transform::Transform;
use image::{DynamicImage, GenericImageView};
use rand::RngCore;

/// Transpose interleaved HWC samples into planar CHW order, times `gain`
fn transpose<T>(samples: &[T], channels: usize, height: usize, width: usize, gain: f32) -> ChwTensor
where
    T: Copy + Into<f32>,
{
    let plane = height * width;
    let mut data = vec![0.0f32; channels * plane];
    for (i, pixel) in samples.chunks_exact(channels).enumerate() {
        for (c, &v) in pixel.iter().enumerate() {
            let v: f32 = v.into();
            data[c * plane + i] = v * gain;
        }
    }
    ChwTensor {
        shape: [channels, height, width],
        data,
    }
}

/// Planar copy of a raster on the `0..=255` scale.
///
/// Float rasters hold `[0, 1]` samples and are multiplied by 255 so that
/// planar data has one scale whatever the raster type. Other layouts go
/// through RGB8 first.
pub fn to_chw(image: &DynamicImage) -> ChwTensor {
    let (w, h) = image.dimensions();
    let (w, h) = (w as usize, h as usize);
    match image {
        DynamicImage::ImageRgb32F(b) => transpose(b.as_raw(), 3, h, w, 255.0),
        DynamicImage::ImageRgba32F(b) => transpose(b.as_raw(), 4, h, w, 255.0),
        DynamicImage::ImageLuma8(b) => transpose(b.as_raw(), 1, h, w, 1.0),
        DynamicImage::ImageRgba8(b) => transpose(b.as_raw(), 4, h, w, 1.0),
        other => transpose(other.to_rgb8().as_raw(), 3, h, w, 1.0),
    }
}

/// Convert the HWC raster into a planar tensor
#[derive(Debug, Clone, Default)]
pub struct ToCHWImage;

impl ToCHWImage {
    pub const NAME: &'static str = "ToCHWImage";
}

impl Transform for ToCHWImage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn apply(&self, mut record: Record, _rng: &mut dyn RngCore) -> Result<Record, PipelineError> {
        let image = record.take_raster(Self::NAME)?;
        record.image = Some(ImageData::Planar(to_chw(&image)));
        Ok(record)
    }
}
