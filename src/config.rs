use crate::Args;
use std::path::PathBuf;

/// CLI run configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub pipeline: PathBuf,
    pub image: PathBuf,
    pub label: Option<PathBuf>,
    pub text: Option<String>,
    pub seed: Option<u64>,
    pub output: Option<PathBuf>,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            pipeline: args.pipeline,
            image: args.image,
            label: args.label,
            text: args.text,
            seed: args.seed,
            output: args.output,
        }
    }
}
