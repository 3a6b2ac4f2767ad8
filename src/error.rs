//! Error types for the tracing pipeline.

/// A specialized Result type for pipeline operations.
pub type TracerResult<T> = Result<T, TracerError>;

#[derive(Debug, thiserror::Error)]
pub enum TracerError {
    /// A scene object or config value is missing or malformed. Aborts the extraction pass.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A buffer or image could not be created.
    #[error("resource allocation error: {0}")]
    ResourceAllocation(String),

    /// The kernel invocation failed. Never retried.
    #[error("dispatch fault: {0}")]
    DispatchFault(String),

    /// A frame was requested before the resource set was complete, or after a fault.
    #[error("pipeline not ready: {0}")]
    NotReady(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl TracerError {
    pub fn configuration(message: impl Into<String>) -> Self {
        TracerError::Configuration(message.into())
    }

    pub fn allocation(message: impl Into<String>) -> Self {
        TracerError::ResourceAllocation(message.into())
    }

    pub fn dispatch(message: impl Into<String>) -> Self {
        TracerError::DispatchFault(message.into())
    }

    pub fn not_ready(message: impl Into<String>) -> Self {
        TracerError::NotReady(message.into())
    }

    /// Faults that leave the pipeline unable to dispatch until it is re-validated.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TracerError::DispatchFault(_))
    }
}
