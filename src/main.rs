use anyhow::Context;
use clap::Parser;
use ocr_transforms::annotation::parse_det_label;
use ocr_transforms::{ImageData, Label, Pipeline, PipelineConfig, Polygon, Record, StepTiming};
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

#[derive(Parser, Debug)]
#[command(name = "ocr-transforms")]
#[command(about = "Run an OCR preprocessing pipeline over one image")]
#[command(version)]
pub struct Args {
    /// Pipeline config (JSON list of transforms)
    #[arg(long, env = "OCR_PIPELINE")]
    pub pipeline: PathBuf,

    /// Image to process
    #[arg(long)]
    pub image: PathBuf,

    /// Detection label JSON with polygons and transcriptions
    #[arg(long)]
    pub label: Option<PathBuf>,

    /// Transcription of a text-line crop, for recognition pipelines
    #[arg(long)]
    pub text: Option<String>,

    /// Seed for random stages (uses entropy if not set)
    #[arg(long, env = "OCR_SEED")]
    pub seed: Option<u64>,

    /// Write the final raster to this path
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

/// Summary printed to stdout after a run
#[derive(Serialize)]
struct RunSummary {
    /// `[channels, height, width]` for planar output, `[height, width]` otherwise
    dims: Vec<usize>,
    polys: Option<Vec<Polygon>>,
    texts: Option<Vec<String>>,
    ignore_tags: Option<Vec<bool>>,
    shape: Option<[f32; 4]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<Label>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text_seq: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    valid_ratio: Option<f32>,
    total_time_ms: u64,
    steps: Vec<StepTiming>,
}

fn run(config: config::Config) -> anyhow::Result<()> {
    let pipeline_config = PipelineConfig::from_file(&config.pipeline)
        .with_context(|| format!("Failed to load pipeline {}", config.pipeline.display()))?;
    let pipeline = Pipeline::from_config(&pipeline_config)?;
    tracing::info!("Pipeline stages: {:?}", pipeline.stage_names());

    let mut record = Record::from_path(&config.image);
    if let Some(label) = &config.label {
        let json = std::fs::read_to_string(label)
            .with_context(|| format!("Failed to read label {}", label.display()))?;
        record = record.with_annotations(parse_det_label(&json)?)?;
    }
    if let Some(text) = &config.text {
        record = record.with_label(text.as_str());
    }

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let result = pipeline.process(record, &mut rng)?;
    let record = result.record;

    let dims = match &record.image {
        Some(ImageData::Raster(image)) => vec![image.height() as usize, image.width() as usize],
        Some(ImageData::Planar(tensor)) => tensor.shape.to_vec(),
        None => vec![],
    };

    if let Some(output) = &config.output {
        match &record.image {
            Some(ImageData::Raster(image)) => {
                image
                    .to_rgb8()
                    .save(output)
                    .with_context(|| format!("Failed to save {}", output.display()))?;
                tracing::info!("Saved output image to {}", output.display());
            }
            _ => tracing::warn!("No raster to save, skipping {}", output.display()),
        }
    }

    tracing::info!(
        "Processed {} in {}ms",
        config.image.display(),
        result.total_time_ms
    );

    let summary = RunSummary {
        dims,
        polys: record.polys,
        texts: record.texts,
        ignore_tags: record.ignore_tags,
        shape: record.shape,
        label: record.label,
        text_seq: record.text_seq,
        valid_ratio: record.valid_ratio,
        total_time_ms: result.total_time_ms,
        steps: result.steps,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing (stdout carries the JSON summary)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting ocr-transforms v{}", env!("CARGO_PKG_VERSION"));

    run(config::Config::from(args))
}
