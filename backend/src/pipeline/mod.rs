pub mod orchestrator;
pub mod record;

pub use orchestrator::{
    process_batch, Analysis, AnalysisError, DecodedImage, Pipeline, PipelineConfig,
    ProcessingError,
};
pub use record::{EvidenceRecord, ImageUpload, Stage, UploadMetadata};
