use crate::error::PipelineError;
use crate::record::{Column, Record};
use crate::registry::{build_stage, PipelineConfig, Stage};
use crate::steps::PackLoaderInputs;
use crate::transform::Transform;
use rand::RngCore;
use serde::Serialize;
use std::time::Instant;

/// Timing information for a single pipeline stage
#[derive(Debug, Clone, Serialize)]
pub struct StepTiming {
    pub name: String,
    pub time_ms: u64,
}

/// Result of a pipeline pass including timing stats
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    /// Transformed record (not serialized)
    #[serde(skip)]
    pub record: Record,
    /// Total time in milliseconds
    pub total_time_ms: u64,
    /// Individual stage timings
    pub steps: Vec<StepTiming>,
}

/// Ordered stages applied to one record at a time
#[derive(Debug, Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Transform>>,
    output: Option<PackLoaderInputs>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Transform>>) -> Self {
        Self {
            stages,
            output: None,
        }
    }

    /// Build from a config, skipping unknown stage names
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let mut pipeline = Self::default();
        for stage_config in &config.transforms {
            match build_stage(stage_config)? {
                Some(Stage::Transform(stage)) => pipeline.stages.push(stage),
                Some(Stage::Output(packer)) => pipeline.output = Some(packer),
                None => {}
            }
        }
        tracing::debug!("Built pipeline: {:?}", pipeline.stage_names());
        Ok(pipeline)
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn output(&self) -> Option<&PackLoaderInputs> {
        self.output.as_ref()
    }

    /// Apply every stage in order, stopping at the first failure
    pub fn run(&self, record: Record, rng: &mut dyn RngCore) -> Result<Record, PipelineError> {
        self.process(record, rng).map(|result| result.record)
    }

    /// Like [`Pipeline::run`], also reporting per-stage timings
    pub fn process(
        &self,
        record: Record,
        rng: &mut dyn RngCore,
    ) -> Result<PipelineResult, PipelineError> {
        let start = Instant::now();
        let mut steps_timing = Vec::with_capacity(self.stages.len());

        let mut record = record;
        for stage in &self.stages {
            record = self.run_step(stage.as_ref(), record, rng, &mut steps_timing)?;
        }

        Ok(PipelineResult {
            record,
            total_time_ms: start.elapsed().as_millis() as u64,
            steps: steps_timing,
        })
    }

    /// Run all stages and pack the configured output columns
    pub fn run_packed(
        &self,
        record: Record,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<Column>, PipelineError> {
        let packer = self.output.as_ref().ok_or_else(|| {
            PipelineError::Configuration("pipeline has no PackLoaderInputs stage".to_string())
        })?;
        let record = self.run(record, rng)?;
        packer.pack(&record)
    }

    fn run_step(
        &self,
        stage: &dyn Transform,
        record: Record,
        rng: &mut dyn RngCore,
        timings: &mut Vec<StepTiming>,
    ) -> Result<Record, PipelineError> {
        if let Some(&field) = stage.required_fields().iter().find(|&&f| !record.has(f)) {
            return Err(PipelineError::missing(stage.name(), field));
        }

        let step_start = Instant::now();
        let record = stage.apply(record, rng)?;
        record.check_alignment(stage.name())?;

        let time_ms = step_start.elapsed().as_millis() as u64;
        tracing::debug!("{} completed in {}ms", stage.name(), time_ms);
        timings.push(StepTiming {
            name: stage.name().to_string(),
            time_ms,
        });
        Ok(record)
    }
}
