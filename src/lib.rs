//! Geometry-aware image preprocessing for OCR detection and recognition.
//!
//! A [`Pipeline`] applies configured [`Transform`] stages to one [`Record`]
//! at a time. Geometry stages rescale, crop and clip the record's text
//! polygons together with the image, keeping `polys`, `texts` and
//! `ignore_tags` index-aligned. Recognition stages resize text-line crops
//! and encode their transcriptions.

pub mod annotation;
pub mod error;
pub mod geometry;
pub mod pipeline;
pub mod record;
pub mod registry;
pub mod steps;
pub mod transform;

pub use error::PipelineError;
pub use geometry::{Polygon, Window};
pub use pipeline::{Pipeline, PipelineResult, StepTiming};
pub use record::{Annotations, Column, Field, ImageData, Label, Record};
pub use registry::{PipelineConfig, StageConfig};
pub use transform::Transform;
