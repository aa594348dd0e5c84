//! Error types for the PetalSonic bridge

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No renderer is bound, or the bound one could not be reached this cycle.
    #[error("Renderer unavailable")]
    RendererUnavailable,

    #[error("Render error: {0}")]
    Render(String),

    #[error("Chunk of {len} samples does not fit in a ring of {capacity} samples")]
    ChunkTooLarge { len: usize, capacity: usize },

    #[error("Engine error: {0}")]
    Engine(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
