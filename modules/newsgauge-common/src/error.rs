use std::fmt;

use thiserror::Error;

/// The sequential phases of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Discovery,
    Resolution,
    Extraction,
    Analysis,
    Report,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Discovery => "discovery",
            Stage::Resolution => "resolution",
            Stage::Extraction => "extraction",
            Stage::Analysis => "analysis",
            Stage::Report => "report",
        };
        f.write_str(name)
    }
}

/// Stage-level pipeline failure. Item-level failures (a single link, URL or
/// article) are absorbed as drops and never surface here.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{stage} stage: {message}")]
    Stage { stage: Stage, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn stage(stage: Stage, err: impl fmt::Display) -> Self {
        Self::Stage {
            stage,
            message: err.to_string(),
        }
    }
}
