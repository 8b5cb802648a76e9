use crate::error::PipelineError;
use crate::record::{Field, Record};
use rand::RngCore;
use std::fmt::Debug;

/// A single pipeline stage with fixed configuration.
///
/// Implementations hold no per-record state, so one instance can be shared
/// across worker threads. Random stages draw only from the `rng` argument.
pub trait Transform: Send + Sync + Debug {
    /// Stage identifier used in configs, logs and errors
    fn name(&self) -> &'static str;

    /// Fields that must be present before `apply` runs
    fn required_fields(&self) -> &'static [Field] {
        &[Field::Image]
    }

    fn apply(&self, record: Record, rng: &mut dyn RngCore) -> Result<Record, PipelineError>;
}
