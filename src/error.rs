//! Error types for duplexvox.
//!
//! Every runtime failure inside a session is recovered: the variants below
//! are logged and degraded (see `session::coordinator`), never propagated to
//! the process. `PlaybackBusy` is the exception: it signals a contract
//! violation by the caller.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // External service failures
    #[error("Transcription failed: {message}")]
    Transcription { message: String },

    #[error("Generation failed: {message}")]
    Generation { message: String },

    #[error("Synthesis failed: {message}")]
    Synthesis { message: String },

    // Peer communication
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Protocol violation: {message}")]
    Protocol { message: String },

    // Session contract
    #[error("Playback already active; cancel it before speaking again")]
    PlaybackBusy,

    #[error("Session closed")]
    SessionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_service_failure_display() {
        let error = SessionError::Transcription {
            message: "model unavailable".to_string(),
        };
        assert_eq!(error.to_string(), "Transcription failed: model unavailable");

        let error = SessionError::Generation {
            message: "timed out after 30s".to_string(),
        };
        assert_eq!(error.to_string(), "Generation failed: timed out after 30s");

        let error = SessionError::Synthesis {
            message: "empty output".to_string(),
        };
        assert_eq!(error.to_string(), "Synthesis failed: empty output");
    }

    #[test]
    fn test_protocol_display() {
        let error = SessionError::Protocol {
            message: "unknown command".to_string(),
        };
        assert_eq!(error.to_string(), "Protocol violation: unknown command");
    }

    #[test]
    fn test_config_invalid_value_display() {
        let error = SessionError::ConfigInvalidValue {
            key: "vad.threshold".to_string(),
            message: "must be in (0, 1]".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for vad.threshold: must be in (0, 1]"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::BrokenPipe, "peer went away");
        let error: SessionError = io_error.into();
        assert!(error.to_string().contains("peer went away"));

        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("key = 'unclosed").unwrap_err();
        let error: SessionError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<SessionError>();
        assert_sync::<SessionError>();
    }
}
