//! Streaming core: pipeline, report emitter and session supervision

pub mod emitter;
pub mod pipeline;
pub mod session;

pub use emitter::FrameEmitter;
pub use pipeline::{AudioPipeline, BatchSink, EncodedBatch, PipelineConfig, PipelineStats};
pub use session::StreamSession;
