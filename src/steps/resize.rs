use crate::error::PipelineError;
use crate::record::Record;
use crate::transform::Transform;
use image::{imageops, imageops::FilterType, DynamicImage, GenericImageView, ImageBuffer, Pixel};
use rand::{Rng, RngCore};
use serde::Deserialize;

/// Bilinear, the usual choice for detection inputs
const FILTER: FilterType = FilterType::Triangle;

/// Length of an axis after scaling, never below one pixel
pub(crate) fn scaled_len(len: u32, scale: f32) -> u32 {
    ((len as f32 * scale).round() as u32).max(1)
}

/// Resize to exact dimensions, skipping the work when nothing changes
pub(crate) fn resize_to(image: DynamicImage, width: u32, height: u32) -> DynamicImage {
    if image.dimensions() == (width, height) {
        return image;
    }
    image.resize_exact(width, height, FILTER)
}

fn pad_buffer<P>(
    buffer: &ImageBuffer<P, Vec<P::Subpixel>>,
    width: u32,
    height: u32,
) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel,
{
    let mut canvas = ImageBuffer::new(width, height);
    imageops::replace(&mut canvas, buffer, 0, 0);
    canvas
}

/// Zero-pad on the bottom and right up to `width x height`.
///
/// The sample type of the raster is preserved. An image that already has the
/// target size is returned untouched.
pub(crate) fn pad_to(
    image: DynamicImage,
    width: u32,
    height: u32,
    stage: &'static str,
) -> Result<DynamicImage, PipelineError> {
    let (w, h) = image.dimensions();
    if (w, h) == (width, height) {
        return Ok(image);
    }
    if w > width || h > height {
        return Err(PipelineError::processing(
            stage,
            format!("cannot pad {}x{} image to smaller {}x{}", w, h, width, height),
        ));
    }

    Ok(match image {
        DynamicImage::ImageLuma8(b) => DynamicImage::ImageLuma8(pad_buffer(&b, width, height)),
        DynamicImage::ImageLumaA8(b) => DynamicImage::ImageLumaA8(pad_buffer(&b, width, height)),
        DynamicImage::ImageRgb8(b) => DynamicImage::ImageRgb8(pad_buffer(&b, width, height)),
        DynamicImage::ImageRgba8(b) => DynamicImage::ImageRgba8(pad_buffer(&b, width, height)),
        DynamicImage::ImageLuma16(b) => DynamicImage::ImageLuma16(pad_buffer(&b, width, height)),
        DynamicImage::ImageLumaA16(b) => DynamicImage::ImageLumaA16(pad_buffer(&b, width, height)),
        DynamicImage::ImageRgb16(b) => DynamicImage::ImageRgb16(pad_buffer(&b, width, height)),
        DynamicImage::ImageRgba16(b) => DynamicImage::ImageRgba16(pad_buffer(&b, width, height)),
        DynamicImage::ImageRgb32F(b) => DynamicImage::ImageRgb32F(pad_buffer(&b, width, height)),
        DynamicImage::ImageRgba32F(b) => DynamicImage::ImageRgba32F(pad_buffer(&b, width, height)),
        other => DynamicImage::ImageRgb8(pad_buffer(&other.to_rgb8(), width, height)),
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScalePadConfig {
    /// `[H, W]` of the output image
    pub target_size: [u32; 2],
}

/// Scale image and polys by the limiting side, then pad to the target size
#[derive(Debug, Clone)]
pub struct ScalePadImage {
    target_size: [u32; 2],
}

impl ScalePadImage {
    pub const NAME: &'static str = "ScalePadImage";

    pub fn new(config: ScalePadConfig) -> Result<Self, PipelineError> {
        let [h, w] = config.target_size;
        if h == 0 || w == 0 {
            return Err(PipelineError::Configuration(format!(
                "{}: target_size must be positive (got {}x{})",
                Self::NAME,
                h,
                w
            )));
        }
        Ok(Self {
            target_size: config.target_size,
        })
    }
}

impl Transform for ScalePadImage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn apply(&self, mut record: Record, _rng: &mut dyn RngCore) -> Result<Record, PipelineError> {
        let image = record.take_raster(Self::NAME)?;
        let (width, height) = image.dimensions();
        let [target_h, target_w] = self.target_size;

        let scale = (target_h as f32 / height as f32).min(target_w as f32 / width as f32);
        let new_h = scaled_len(height, scale).min(target_h);
        let new_w = scaled_len(width, scale).min(target_w);

        let resized = resize_to(image, new_w, new_h);
        record.set_raster(pad_to(resized, target_w, target_h, Self::NAME)?);
        record.scale_polys(scale, scale);
        record.shape = Some([height as f32, width as f32, scale, scale]);
        Ok(record)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GridResizeConfig {
    pub factor: u32,
}

impl Default for GridResizeConfig {
    fn default() -> Self {
        Self { factor: 32 }
    }
}

/// Stretch each axis up to the next multiple of `factor`
#[derive(Debug, Clone)]
pub struct GridResize {
    factor: u32,
}

impl GridResize {
    pub const NAME: &'static str = "GridResize";

    pub fn new(config: GridResizeConfig) -> Result<Self, PipelineError> {
        if config.factor == 0 {
            return Err(PipelineError::Configuration(format!(
                "{}: factor must be positive",
                Self::NAME
            )));
        }
        Ok(Self {
            factor: config.factor,
        })
    }
}

impl Transform for GridResize {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn apply(&self, mut record: Record, _rng: &mut dyn RngCore) -> Result<Record, PipelineError> {
        let image = record.take_raster(Self::NAME)?;
        let (width, height) = image.dimensions();

        let new_w = width.div_ceil(self.factor) * self.factor;
        let new_h = height.div_ceil(self.factor) * self.factor;

        record.set_raster(resize_to(image, new_w, new_h));
        record.scale_polys(new_w as f32 / width as f32, new_h as f32 / height as f32);
        Ok(record)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RandomScaleConfig {
    /// `(min, max)` scale range
    pub scale_range: [f32; 2],
}

/// Scale image and polys by one uniform random factor
#[derive(Debug, Clone)]
pub struct RandomScale {
    min: f32,
    max: f32,
}

impl RandomScale {
    pub const NAME: &'static str = "RandomScale";

    pub fn new(config: RandomScaleConfig) -> Result<Self, PipelineError> {
        let [min, max] = config.scale_range;
        if !(min > 0.0 && min <= max && max.is_finite()) {
            return Err(PipelineError::Configuration(format!(
                "{}: scale_range must satisfy 0 < min <= max (got [{}, {}])",
                Self::NAME,
                min,
                max
            )));
        }
        Ok(Self { min, max })
    }
}

impl Transform for RandomScale {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn apply(&self, mut record: Record, rng: &mut dyn RngCore) -> Result<Record, PipelineError> {
        let image = record.take_raster(Self::NAME)?;
        let (width, height) = image.dimensions();

        let scale = rng.gen_range(self.min..=self.max);
        let resized = resize_to(image, scaled_len(width, scale), scaled_len(height, scale));

        record.set_raster(resized);
        record.scale_polys(scale, scale);
        Ok(record)
    }
}
