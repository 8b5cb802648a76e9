use crate::error::PipelineError;
use crate::record::{Column, Field, Record};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct PackConfig {
    pub output_columns: Vec<String>,
}

/// Terminal stage selecting the record fields handed to a model
#[derive(Debug, Clone)]
pub struct PackLoaderInputs {
    columns: Vec<Field>,
}

impl PackLoaderInputs {
    pub const NAME: &'static str = "PackLoaderInputs";

    pub fn new(config: PackConfig) -> Result<Self, PipelineError> {
        let columns = config
            .output_columns
            .iter()
            .map(|name| match Field::from_name(name) {
                Some(Field::Source) | None => Err(PipelineError::Configuration(format!(
                    "{}: unknown output column '{}'",
                    Self::NAME,
                    name
                ))),
                Some(field) => Ok(field),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[Field] {
        &self.columns
    }

    /// Values of the configured fields, in configured order
    pub fn pack(&self, record: &Record) -> Result<Vec<Column>, PipelineError> {
        self.columns
            .iter()
            .map(|&field| record.column(field, Self::NAME))
            .collect()
    }
}
