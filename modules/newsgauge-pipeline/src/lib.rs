pub mod analysis;
pub mod discovery;
pub mod extractor;
pub mod pipeline;
pub mod report;
pub mod resolver;

pub use pipeline::{Pipeline, PipelineResult};
