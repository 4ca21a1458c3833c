pub mod engine;
pub mod rules;

pub use engine::{FusedScores, FusionEngine, FusionError, FusionOutcome, LabelSet};
