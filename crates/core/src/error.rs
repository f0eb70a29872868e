/// Result alias that carries the custom [`VisualizerError`] type.
pub type Result<T> = std::result::Result<T, VisualizerError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum VisualizerError {
    /// The analyser only accepts powers of two inside its supported range.
    #[error("unsupported transform size {0}; expected a power of two between 32 and 32768")]
    UnsupportedTransformSize(usize),
    #[error("sampling interval must be a positive number of seconds, got {0}")]
    InvalidSamplingInterval(f32),
    /// A write targeted a parameter with the other variant (toggle vs range).
    #[error("parameter `{key}` is not a {expected} parameter")]
    ParameterKindMismatch { key: String, expected: &'static str },
    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),
    #[error("value {value} for parameter `{key}` is outside {min}..={max}")]
    ParameterOutOfRange {
        key: String,
        value: f32,
        min: f32,
        max: f32,
    },
    #[error("unknown visualizer `{0}`")]
    UnknownVisualizer(String),
    #[error("invalid colour `{0}`; expected #rrggbb")]
    InvalidColor(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Raised by a [`RenderBackend`](crate::render::RenderBackend) implementation.
    #[error("render backend: {0}")]
    Backend(String),
    #[error(transparent)]
    Fft(#[from] realfft::FftError),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Free-form message for failures that do not deserve their own variant.
    #[error("{0}")]
    Message(String),
}

impl VisualizerError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for VisualizerError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for VisualizerError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
