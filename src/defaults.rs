//! Default configuration constants for duplexvox.
//!
//! Shared by the configuration types and the session components so the
//! documented defaults live in exactly one place.

/// Default inbound audio sample rate in Hz.
///
/// 16kHz mono is what speech recognizers expect and what peers stream.
pub const SAMPLE_RATE: u32 = 16000;

/// Default VAD analysis window in milliseconds (1600 samples at 16kHz).
pub const WINDOW_MS: u32 = 100;

/// Default RMS energy threshold on samples normalized to [-1, 1].
///
/// Loud non-speech noise above this level is classified as speech; the
/// energy detector does not try to tell the two apart.
pub const VAD_THRESHOLD: f32 = 0.02;

/// Default silence run (ms) that ends an utterance.
pub const SILENCE_TIMEOUT_MS: u32 = 800;

/// Default minimum utterance duration (ms). Shorter bursts are noise.
pub const MIN_UTTERANCE_MS: u32 = 500;

/// Default size of one outbound audio chunk in bytes.
///
/// 4800 bytes of PCM16 mono at 24kHz is 100ms of playback.
pub const PLAYBACK_CHUNK_BYTES: usize = 4800;

/// Default sample rate of synthesized audio in Hz.
pub const OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Default bound on a single transcription call (ms).
pub const TRANSCRIBE_TIMEOUT_MS: u64 = 30_000;

/// Default bound on a single generation call (ms).
pub const GENERATE_TIMEOUT_MS: u64 = 30_000;

/// Response spoken when generation fails or times out.
pub const FALLBACK_RESPONSE: &str = "I'm sorry, I didn't catch that.";

/// Capacity of the per-session outbound event queue.
pub const OUTBOUND_QUEUE: usize = 64;

/// Capacity of the per-session inbound event queue.
pub const INBOUND_QUEUE: usize = 256;

/// Default pause (ms) inside an utterance that may trigger a backchannel.
pub const BACKCHANNEL_PAUSE_MS: u32 = 400;

/// Default minimum gap (ms) between two backchannels.
pub const BACKCHANNEL_COOLDOWN_MS: u32 = 4000;

/// Default amount of speech (ms) required before a backchannel is allowed.
pub const BACKCHANNEL_MIN_SPEECH_MS: u32 = 1000;

/// Phrases cycled through for backchannels.
pub const BACKCHANNEL_PHRASES: &[&str] = &["mhm", "right", "I see", "okay", "yeah"];

/// Default `tracing` filter directive when `RUST_LOG` is unset.
pub const LOG_FILTER: &str = "duplexvox=info";
