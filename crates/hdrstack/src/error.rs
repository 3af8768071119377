use thiserror::Error;

/// Failure taxonomy shared by both GPU stages.
///
/// `ShaderInit` is fatal to the stage instance that reported it; the other
/// variants reject a single invocation and leave the stage usable.
#[derive(Debug, Error)]
pub enum StageError {
    /// Shader module or render pipeline creation failed.
    #[error("shader pipeline initialization failed: {0}")]
    ShaderInit(String),
    /// A scalar input or frame set violated the stage contract.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The compositor was invoked with an empty frame window.
    #[error("compositor invoked with an empty frame window")]
    InsufficientInput,
    /// A cached frame handle points at a texture that was already released.
    #[error("cached frame references a released texture: {0}")]
    ResourceLifetime(String),
    /// No usable adapter/device, or the device stopped responding.
    #[error("GPU unavailable: {0}")]
    GpuUnavailable(String),
}
