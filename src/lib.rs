//! duplexvox - streaming voice sessions with barge-in
//!
//! Listens to a peer's audio stream, detects utterances with an energy VAD,
//! answers through pluggable transcription, generation and synthesis
//! services, and cancels its own playback the moment the peer talks over it.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod services;
pub mod session;

// Session entry points
pub use session::{
    ChannelSink, ClientCommand, InboundEvent, PeerSink, Phase, ServerEvent, SessionHandle,
    SessionId, SessionLookup, SessionRegistry, Status, VoiceSession,
};

// External service boundaries
pub use services::{Responder, Services, Synthesizer, Transcriber};

// Configuration
pub use config::Config;

// Error handling
pub use error::{Result, SessionError};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when built from a git checkout, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }
}
