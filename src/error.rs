use crate::record::Field;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Stage '{stage}' requires field '{field}' which is missing")]
    MissingField { stage: &'static str, field: Field },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Stage '{stage}' misaligned annotations: {polys} polys, {texts:?} texts, {ignore_tags:?} tags")]
    Misaligned {
        stage: &'static str,
        polys: usize,
        texts: Option<usize>,
        ignore_tags: Option<usize>,
    },

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Stage '{stage}' failed: {reason}")]
    Processing { stage: &'static str, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn missing(stage: &'static str, field: Field) -> Self {
        Self::MissingField { stage, field }
    }

    pub fn processing(stage: &'static str, reason: impl Into<String>) -> Self {
        Self::Processing {
            stage,
            reason: reason.into(),
        }
    }
}
