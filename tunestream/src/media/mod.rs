//! On-demand audio playback.
//!
//! Each request runs its own extraction and transcode processes joined by an
//! OS pipe; the transcoder's stdout is streamed to the client as it arrives.

mod command;
mod error;
mod pipeline;
mod session;
mod stream;

pub use command::{CommandSpec, DEFAULT_CHUNK_SIZE, PipelineConfig, URL_PLACEHOLDER};
pub use error::{PipelineError, Stage};
pub use pipeline::{MediaPipeline, validate_source_ref};
pub use session::{
    ProcessExit, SessionHandle, SessionOutcome, SessionReport, SessionState, SessionStateMachine,
};
pub use stream::PipelineStream;
