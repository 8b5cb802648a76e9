//! The working unit threaded through a pipeline.

use crate::error::PipelineError;
use crate::geometry::Polygon;
use image::DynamicImage;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Named fields a stage may require
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Source,
    Image,
    Polys,
    Texts,
    IgnoreTags,
    Shape,
    Label,
    ValidRatio,
    TextSeq,
    Length,
    TextLength,
    TextPadded,
}

impl Field {
    /// Parse a column name as used in pipeline configs
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "img_path" | "img_lmdb" | "source" => Some(Self::Source),
            "image" => Some(Self::Image),
            "polys" => Some(Self::Polys),
            "texts" => Some(Self::Texts),
            "ignore_tags" => Some(Self::IgnoreTags),
            "shape" | "shape_list" => Some(Self::Shape),
            "label" => Some(Self::Label),
            "valid_ratio" => Some(Self::ValidRatio),
            "text_seq" => Some(Self::TextSeq),
            "length" => Some(Self::Length),
            "text_length" => Some(Self::TextLength),
            "text_padded" => Some(Self::TextPadded),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Image => "image",
            Self::Polys => "polys",
            Self::Texts => "texts",
            Self::IgnoreTags => "ignore_tags",
            Self::Shape => "shape",
            Self::Label => "label",
            Self::ValidRatio => "valid_ratio",
            Self::TextSeq => "text_seq",
            Self::Length => "length",
            Self::TextLength => "text_length",
            Self::TextPadded => "text_padded",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the encoded image comes from
#[derive(Debug, Clone)]
pub enum ImageSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// Planar float image, `[channels, height, width]`
#[derive(Debug, Clone, PartialEq)]
pub struct ChwTensor {
    pub shape: [usize; 3],
    pub data: Vec<f32>,
}

/// Image payload: an HWC raster or its planar conversion
#[derive(Debug, Clone)]
pub enum ImageData {
    Raster(DynamicImage),
    Planar(ChwTensor),
}

/// Label of a whole-image sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Label {
    /// Transcription of a cropped text line
    Text(String),
    /// Index into a classifier's label list
    Class(usize),
}

/// Per-sample record. Optional fields are filled in by stages.
#[derive(Debug, Clone, Default)]
pub struct Record {
    pub source: Option<ImageSource>,
    pub image: Option<ImageData>,
    pub polys: Option<Vec<Polygon>>,
    pub texts: Option<Vec<String>>,
    pub ignore_tags: Option<Vec<bool>>,
    /// `[orig_h, orig_w, scale_h, scale_w]`
    pub shape: Option<[f32; 4]>,
    pub label: Option<Label>,
    /// Share of the padded width covered by resized content
    pub valid_ratio: Option<f32>,
    /// Encoded label, padded to a fixed length
    pub text_seq: Option<Vec<u32>>,
    /// Number of label characters found in the dictionary
    pub length: Option<usize>,
    /// Character count of the raw label
    pub text_length: Option<usize>,
    pub text_padded: Option<String>,
}

/// Aligned per-instance annotations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotations {
    pub polys: Vec<Polygon>,
    pub texts: Vec<String>,
    pub ignore_tags: Vec<bool>,
}

/// One packed output value
#[derive(Debug, Clone)]
pub enum Column {
    Raster(DynamicImage),
    Tensor(ChwTensor),
    Polys(Vec<Polygon>),
    Texts(Vec<String>),
    IgnoreTags(Vec<bool>),
    Shape([f32; 4]),
    Label(Label),
    ValidRatio(f32),
    TextSeq(Vec<u32>),
    Length(usize),
    TextLength(usize),
    TextPadded(String),
}

impl Record {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Some(ImageSource::Path(path.into())),
            ..Self::default()
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            source: Some(ImageSource::Bytes(bytes)),
            ..Self::default()
        }
    }

    /// Record with an already decoded raster
    pub fn from_image(image: DynamicImage) -> Self {
        Self {
            image: Some(ImageData::Raster(image)),
            ..Self::default()
        }
    }

    /// Attach the transcription of a text-line crop
    pub fn with_label(mut self, text: impl Into<String>) -> Self {
        self.label = Some(Label::Text(text.into()));
        self
    }

    /// Attach aligned annotations, rejecting mismatched lengths
    pub fn with_annotations(mut self, annotations: Annotations) -> Result<Self, PipelineError> {
        self.polys = Some(annotations.polys);
        self.texts = Some(annotations.texts);
        self.ignore_tags = Some(annotations.ignore_tags);
        self.check_alignment("Record")?;
        Ok(self)
    }

    pub fn has(&self, field: Field) -> bool {
        match field {
            Field::Source => self.source.is_some(),
            Field::Image => self.image.is_some(),
            Field::Polys => self.polys.is_some(),
            Field::Texts => self.texts.is_some(),
            Field::IgnoreTags => self.ignore_tags.is_some(),
            Field::Shape => self.shape.is_some(),
            Field::Label => self.label.is_some(),
            Field::ValidRatio => self.valid_ratio.is_some(),
            Field::TextSeq => self.text_seq.is_some(),
            Field::Length => self.length.is_some(),
            Field::TextLength => self.text_length.is_some(),
            Field::TextPadded => self.text_padded.is_some(),
        }
    }

    /// Take the HWC raster out of the record
    pub fn take_raster(&mut self, stage: &'static str) -> Result<DynamicImage, PipelineError> {
        match self.image.take() {
            Some(ImageData::Raster(image)) => Ok(image),
            Some(ImageData::Planar(tensor)) => {
                self.image = Some(ImageData::Planar(tensor));
                Err(PipelineError::processing(
                    stage,
                    "expected an HWC raster but the image is already planar",
                ))
            }
            None => Err(PipelineError::missing(stage, Field::Image)),
        }
    }

    pub fn set_raster(&mut self, image: DynamicImage) {
        self.image = Some(ImageData::Raster(image));
    }

    /// Borrow the raster without taking it
    pub fn raster(&self) -> Option<&DynamicImage> {
        match &self.image {
            Some(ImageData::Raster(image)) => Some(image),
            _ => None,
        }
    }

    /// Ignore flag for every polygon; absent tags mean nothing is ignored
    pub fn ignore_flags(&self) -> Vec<bool> {
        let count = self.polys.as_ref().map_or(0, Vec::len);
        match &self.ignore_tags {
            Some(tags) => tags.clone(),
            None => vec![false; count],
        }
    }

    /// Verify `texts` and `ignore_tags` line up with `polys`
    pub fn check_alignment(&self, stage: &'static str) -> Result<(), PipelineError> {
        let Some(polys) = &self.polys else {
            return Ok(());
        };
        let texts = self.texts.as_ref().map(Vec::len);
        let ignore_tags = self.ignore_tags.as_ref().map(Vec::len);
        let aligned = |len: Option<usize>| len.map_or(true, |n| n == polys.len());

        if aligned(texts) && aligned(ignore_tags) {
            Ok(())
        } else {
            Err(PipelineError::Misaligned {
                stage,
                polys: polys.len(),
                texts,
                ignore_tags,
            })
        }
    }

    /// Map every instance through `f`, dropping those that yield `None`.
    ///
    /// `texts` and `ignore_tags` are rebuilt in the same pass, so index `i`
    /// keeps referring to the same instance in all three sequences.
    pub fn filter_instances<F>(&mut self, stage: &'static str, f: F) -> Result<(), PipelineError>
    where
        F: FnMut(Polygon) -> Option<Polygon>,
    {
        self.check_alignment(stage)?;
        let Some(polys) = self.polys.take() else {
            return Ok(());
        };

        let mapped: Vec<Option<Polygon>> = polys.into_iter().map(f).collect();
        self.texts = self.texts.take().map(|texts| keep_aligned(texts, &mapped));
        self.ignore_tags = self.ignore_tags.take().map(|tags| keep_aligned(tags, &mapped));
        self.polys = Some(mapped.into_iter().flatten().collect());
        Ok(())
    }

    /// Scale every polygon per axis
    pub fn scale_polys(&mut self, sx: f32, sy: f32) {
        if let Some(polys) = &mut self.polys {
            for poly in polys {
                poly.scale(sx, sy);
            }
        }
    }

    /// Clone a named field for output
    pub fn column(&self, field: Field, stage: &'static str) -> Result<Column, PipelineError> {
        let missing = || PipelineError::missing(stage, field);
        match field {
            Field::Image => match &self.image {
                Some(ImageData::Raster(image)) => Ok(Column::Raster(image.clone())),
                Some(ImageData::Planar(tensor)) => Ok(Column::Tensor(tensor.clone())),
                None => Err(missing()),
            },
            Field::Polys => self.polys.clone().map(Column::Polys).ok_or_else(missing),
            Field::Texts => self.texts.clone().map(Column::Texts).ok_or_else(missing),
            Field::IgnoreTags => self
                .ignore_tags
                .clone()
                .map(Column::IgnoreTags)
                .ok_or_else(missing),
            Field::Shape => self.shape.map(Column::Shape).ok_or_else(missing),
            Field::Label => self.label.clone().map(Column::Label).ok_or_else(missing),
            Field::ValidRatio => self.valid_ratio.map(Column::ValidRatio).ok_or_else(missing),
            Field::TextSeq => self.text_seq.clone().map(Column::TextSeq).ok_or_else(missing),
            Field::Length => self.length.map(Column::Length).ok_or_else(missing),
            Field::TextLength => self.text_length.map(Column::TextLength).ok_or_else(missing),
            Field::TextPadded => self
                .text_padded
                .clone()
                .map(Column::TextPadded)
                .ok_or_else(missing),
            Field::Source => Err(PipelineError::Configuration(
                "the encoded source cannot be packed as an output column".to_string(),
            )),
        }
    }
}

fn keep_aligned<T>(values: Vec<T>, mapped: &[Option<Polygon>]) -> Vec<T> {
    values
        .into_iter()
        .zip(mapped)
        .filter_map(|(value, poly)| poly.as_ref().map(|_| value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(offset: f32) -> Polygon {
        Polygon::new(vec![
            [offset, offset],
            [offset + 1.0, offset],
            [offset + 1.0, offset + 1.0],
            [offset, offset + 1.0],
        ])
    }

    fn annotated() -> Record {
        Record::default()
            .with_annotations(Annotations {
                polys: vec![square(0.0), square(10.0), square(20.0)],
                texts: vec!["a".into(), "b".into(), "c".into()],
                ignore_tags: vec![false, true, false],
            })
            .unwrap()
    }

    #[test]
    fn test_with_annotations_rejects_mismatch() {
        let result = Record::default().with_annotations(Annotations {
            polys: vec![square(0.0)],
            texts: vec![],
            ignore_tags: vec![false],
        });
        assert!(matches!(
            result,
            Err(PipelineError::Misaligned {
                polys: 1,
                texts: Some(0),
                ..
            })
        ));
    }

    #[test]
    fn test_filter_instances_keeps_lockstep() {
        let mut record = annotated();
        record
            .filter_instances("test", |poly| {
                let b = poly.bounds()?;
                (b.min_x != 10.0).then_some(poly)
            })
            .unwrap();

        assert_eq!(record.polys.as_ref().unwrap().len(), 2);
        assert_eq!(record.texts.as_deref().unwrap(), ["a", "c"]);
        assert_eq!(record.ignore_tags.as_deref().unwrap(), [false, false]);
        record.check_alignment("test").unwrap();
    }

    #[test]
    fn test_filter_instances_without_texts() {
        let mut record = annotated();
        record.texts = None;
        record.filter_instances("test", |_| None).unwrap();
        assert!(record.polys.as_ref().unwrap().is_empty());
        assert!(record.texts.is_none());
        assert!(record.ignore_tags.as_ref().unwrap().is_empty());
    }

    #[test]
    fn test_ignore_flags_default_to_false() {
        let mut record = annotated();
        record.ignore_tags = None;
        assert_eq!(record.ignore_flags(), vec![false, false, false]);
    }

    #[test]
    fn test_field_names() {
        assert_eq!(Field::from_name("ignore_tags"), Some(Field::IgnoreTags));
        assert_eq!(Field::from_name("img_path"), Some(Field::Source));
        assert_eq!(Field::from_name("label"), Some(Field::Label));
        assert_eq!(Field::from_name("shape_list"), Some(Field::Shape));
        assert_eq!(Field::from_name("valid_polys"), None);
        assert_eq!(Field::Shape.to_string(), "shape");
    }

    #[test]
    fn test_take_raster_missing() {
        let mut record = Record::default();
        assert!(matches!(
            record.take_raster("Stage"),
            Err(PipelineError::MissingField {
                stage: "Stage",
                field: Field::Image
            })
        ));
    }
}
