//! Error handling for the pedalboard
//!
//! Structural errors (bad kinds, bad parameters, bad indices, empty input) are
//! returned synchronously to the caller and never stop a running stream.

use thiserror::Error;

/// Result type alias for pedalboard operations
pub type Result<T> = std::result::Result<T, PedalboardError>;

/// Main error type for pedalboard operations
#[derive(Error, Debug)]
pub enum PedalboardError {
    // Chain Errors
    #[error("Unsupported effect kind: {kind}")]
    UnsupportedEffectKind { kind: String },

    #[error("Invalid parameter '{param}' for {effect}: got {value}, expected {expected}")]
    InvalidParameter {
        effect: String,
        param: String,
        value: String,
        expected: String,
    },

    #[error("Chain position {index} out of range (chain length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Unknown preset: {name}")]
    UnknownPreset { name: String },

    // Stream Errors
    #[error("Audio device unavailable: {reason}")]
    DeviceUnavailable { reason: String },

    #[error("Stream fault: {reason}")]
    StreamFault { reason: String },

    #[error("Operation '{operation}' not valid in state {state}")]
    InvalidState { operation: String, state: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // Control Errors
    #[error("Invalid command '{input}': {reason}")]
    InvalidCommand { input: String, reason: String },

    // Render Errors
    #[error("Input audio contains no samples")]
    EmptyInput,

    // File Errors
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid audio file: {reason}")]
    InvalidAudio {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PedalboardError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            PedalboardError::UnsupportedEffectKind { .. } => "UNSUPPORTED_EFFECT_KIND",
            PedalboardError::InvalidParameter { .. } => "INVALID_PARAMETER",
            PedalboardError::IndexOutOfRange { .. } => "INDEX_OUT_OF_RANGE",
            PedalboardError::UnknownPreset { .. } => "UNKNOWN_PRESET",
            PedalboardError::DeviceUnavailable { .. } => "DEVICE_UNAVAILABLE",
            PedalboardError::StreamFault { .. } => "STREAM_FAULT",
            PedalboardError::InvalidState { .. } => "INVALID_STATE",
            PedalboardError::InvalidConfig { .. } => "INVALID_CONFIG",
            PedalboardError::InvalidCommand { .. } => "INVALID_COMMAND",
            PedalboardError::EmptyInput => "EMPTY_INPUT",
            PedalboardError::FileNotFound { .. } => "FILE_NOT_FOUND",
            PedalboardError::InvalidAudio { .. } => "INVALID_AUDIO",
            PedalboardError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            PedalboardError::Io(_) => "IO_ERROR",
            PedalboardError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error leaves the system able to continue as-is
    ///
    /// Everything except a device that could not be opened and raw I/O
    /// failures can be retried with corrected input.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            PedalboardError::DeviceUnavailable { .. } | PedalboardError::Io(_)
        )
    }

    /// Shorthand for building an `InvalidParameter` error
    pub(crate) fn invalid_parameter(
        effect: impl Into<String>,
        param: impl Into<String>,
        value: impl ToString,
        expected: impl Into<String>,
    ) -> Self {
        PedalboardError::InvalidParameter {
            effect: effect.into(),
            param: param.into(),
            value: value.to_string(),
            expected: expected.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = PedalboardError::IndexOutOfRange { index: 5, len: 3 };
        assert_eq!(err.error_code(), "INDEX_OUT_OF_RANGE");
        assert_eq!(
            err.to_string(),
            "Chain position 5 out of range (chain length 3)"
        );
    }

    #[test]
    fn test_recoverable() {
        assert!(PedalboardError::EmptyInput.is_recoverable());
        assert!(!PedalboardError::DeviceUnavailable {
            reason: "no input".to_string()
        }
        .is_recoverable());
    }

    #[test]
    fn test_invalid_parameter_message() {
        let err = PedalboardError::invalid_parameter("gain", "gain_db", 99.0, "-96 to 24");
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
        assert!(err.to_string().contains("gain_db"));
    }
}
