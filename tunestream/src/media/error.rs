//! Pipeline error types.

use thiserror::Error;

/// The two subprocesses of a playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extraction,
    Transcode,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extraction => "extraction",
            Self::Transcode => "transcode",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures that stop a playback before or while it streams.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid source reference: {0:?}")]
    InvalidSource(String),

    #[error("Failed to start {stage} process: {source}")]
    SubprocessSpawnFailed {
        stage: Stage,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} process exited abnormally ({status})")]
    SubprocessExitedAbnormally { stage: Stage, status: String },

    #[error("Pipeline finished without producing audio")]
    EmptyOutput,
}

impl PipelineError {
    pub fn spawn_failed(stage: Stage, source: std::io::Error) -> Self {
        Self::SubprocessSpawnFailed { stage, source }
    }

    pub fn exited(stage: Stage, status: impl Into<String>) -> Self {
        Self::SubprocessExitedAbnormally {
            stage,
            status: status.into(),
        }
    }
}
