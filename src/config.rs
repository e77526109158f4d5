use crate::defaults;
use crate::error::{Result, SessionError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub vad: VadConfig,
    pub segmenter: SegmenterConfig,
    pub playback: PlaybackConfig,
    pub session: SessionConfig,
    pub backchannel: BackchannelConfig,
}

/// Inbound audio format and analysis window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub window_ms: u32,
}

/// Energy VAD configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VadConfig {
    /// RMS threshold on samples normalized to [-1, 1]
    pub threshold: f32,
}

/// Utterance boundary configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SegmenterConfig {
    pub silence_timeout_ms: u32,
    pub min_utterance_ms: u32,
}

/// Playback chunking and pacing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    pub chunk_bytes: usize,
    pub output_sample_rate: u32,
    /// Sleep between chunks to approximate real-time playback
    pub paced: bool,
}

/// Per-session behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub transcribe_timeout_ms: u64,
    pub generate_timeout_ms: u64,
    pub fallback_response: String,
    pub outbound_queue: usize,
    pub inbound_queue: usize,
    /// Listen from connect instead of waiting for a `start` command
    pub auto_listen: bool,
}

/// Backchannel ("mhm") configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackchannelConfig {
    pub enabled: bool,
    pub pause_ms: u32,
    pub cooldown_ms: u32,
    pub min_speech_ms: u32,
    pub phrases: Vec<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            window_ms: defaults::WINDOW_MS,
        }
    }
}

impl AudioConfig {
    /// Number of samples in one VAD analysis window.
    pub fn window_samples(&self) -> usize {
        (self.sample_rate as u64 * self.window_ms as u64 / 1000) as usize
    }
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: defaults::VAD_THRESHOLD,
        }
    }
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            silence_timeout_ms: defaults::SILENCE_TIMEOUT_MS,
            min_utterance_ms: defaults::MIN_UTTERANCE_MS,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: defaults::PLAYBACK_CHUNK_BYTES,
            output_sample_rate: defaults::OUTPUT_SAMPLE_RATE,
            paced: true,
        }
    }
}

impl PlaybackConfig {
    /// Wall-clock duration of one full chunk of PCM16 mono output.
    pub fn chunk_interval(&self) -> Duration {
        let samples = (self.chunk_bytes / 2) as u64;
        Duration::from_micros(samples * 1_000_000 / self.output_sample_rate.max(1) as u64)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transcribe_timeout_ms: defaults::TRANSCRIBE_TIMEOUT_MS,
            generate_timeout_ms: defaults::GENERATE_TIMEOUT_MS,
            fallback_response: defaults::FALLBACK_RESPONSE.to_string(),
            outbound_queue: defaults::OUTBOUND_QUEUE,
            inbound_queue: defaults::INBOUND_QUEUE,
            auto_listen: true,
        }
    }
}

impl SessionConfig {
    pub fn transcribe_timeout(&self) -> Duration {
        Duration::from_millis(self.transcribe_timeout_ms)
    }

    pub fn generate_timeout(&self) -> Duration {
        Duration::from_millis(self.generate_timeout_ms)
    }
}

impl Default for BackchannelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pause_ms: defaults::BACKCHANNEL_PAUSE_MS,
            cooldown_ms: defaults::BACKCHANNEL_COOLDOWN_MS,
            min_speech_ms: defaults::BACKCHANNEL_MIN_SPEECH_MS,
            phrases: defaults::BACKCHANNEL_PHRASES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if it doesn't exist
    ///
    /// Invalid TOML and unreadable files are errors; only a missing file
    /// falls back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Ok(Self::default())
                } else {
                    Err(SessionError::ConfigParse {
                        message: format!("{}: {}", path.display(), e),
                    })
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - DUPLEXVOX_VAD_THRESHOLD → vad.threshold
    /// - DUPLEXVOX_SILENCE_TIMEOUT → segmenter.silence_timeout_ms (e.g. "800ms")
    /// - DUPLEXVOX_GENERATE_TIMEOUT → session.generate_timeout_ms (e.g. "30s")
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(threshold) = std::env::var("DUPLEXVOX_VAD_THRESHOLD")
            && !threshold.is_empty()
        {
            self.vad.threshold =
                threshold
                    .parse()
                    .map_err(|e| SessionError::ConfigInvalidValue {
                        key: "DUPLEXVOX_VAD_THRESHOLD".to_string(),
                        message: format!("{e}"),
                    })?;
        }

        if let Some(timeout) = env_duration("DUPLEXVOX_SILENCE_TIMEOUT")? {
            self.segmenter.silence_timeout_ms = timeout.as_millis() as u32;
        }

        if let Some(timeout) = env_duration("DUPLEXVOX_GENERATE_TIMEOUT")? {
            self.session.generate_timeout_ms = timeout.as_millis() as u64;
        }

        Ok(self)
    }

    /// Reject values that would make a session misbehave.
    pub fn validate(&self) -> Result<()> {
        if !(self.vad.threshold > 0.0 && self.vad.threshold <= 1.0) {
            return Err(invalid("vad.threshold", "must be in (0, 1]"));
        }
        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "must be positive"));
        }
        if self.audio.window_samples() == 0 {
            return Err(invalid("audio.window_ms", "window holds no samples"));
        }
        if self.playback.chunk_bytes < 2 {
            return Err(invalid("playback.chunk_bytes", "must hold one sample"));
        }
        if self.playback.output_sample_rate == 0 {
            return Err(invalid("playback.output_sample_rate", "must be positive"));
        }
        if self.session.outbound_queue == 0 {
            return Err(invalid("session.outbound_queue", "must be positive"));
        }
        if self.session.inbound_queue == 0 {
            return Err(invalid("session.inbound_queue", "must be positive"));
        }
        if self.backchannel.enabled && self.backchannel.phrases.is_empty() {
            return Err(invalid("backchannel.phrases", "enabled with no phrases"));
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/duplexvox/config.toml on Linux, or None when the
    /// platform has no config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("duplexvox").join("config.toml"))
    }
}

fn invalid(key: &str, message: &str) -> SessionError {
    SessionError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

fn env_duration(key: &str) -> Result<Option<Duration>> {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => humantime::parse_duration(&value)
            .map(Some)
            .map_err(|e| SessionError::ConfigInvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_duplexvox_env() {
        remove_env("DUPLEXVOX_VAD_THRESHOLD");
        remove_env("DUPLEXVOX_SILENCE_TIMEOUT");
        remove_env("DUPLEXVOX_GENERATE_TIMEOUT");
    }

    #[test]
    fn test_default_config_has_documented_values() {
        let config = Config::default();

        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.window_ms, 100);
        assert_eq!(config.audio.window_samples(), 1600);
        assert_eq!(config.vad.threshold, 0.02);
        assert_eq!(config.segmenter.silence_timeout_ms, 800);
        assert_eq!(config.segmenter.min_utterance_ms, 500);
        assert_eq!(config.session.fallback_response, "I'm sorry, I didn't catch that.");
        assert!(config.session.auto_listen);
        assert!(!config.backchannel.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_chunk_interval_matches_output_rate() {
        let playback = PlaybackConfig::default();
        assert_eq!(playback.chunk_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let toml_content = r#"
            [segmenter]
            silence_timeout_ms = 1200

            [session]
            fallback_response = "Say that again?"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.segmenter.silence_timeout_ms, 1200);
        assert_eq!(config.segmenter.min_utterance_ms, 500);
        assert_eq!(config.session.fallback_response, "Say that again?");
        assert_eq!(config.vad.threshold, 0.02);
        assert_eq!(config.playback, PlaybackConfig::default());
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let missing_path = Path::new("/tmp/nonexistent_duplexvox_config_12345.toml");
        let config = Config::load_or_default(missing_path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_rejects_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[vad\nthreshold = ").unwrap();

        let result = Config::load_or_default(temp_file.path());
        assert!(matches!(result, Err(SessionError::ConfigParse { .. })));
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = Config::default();
        config.vad.threshold = 0.0;
        match config.validate() {
            Err(SessionError::ConfigInvalidValue { key, .. }) => assert_eq!(key, "vad.threshold"),
            other => panic!("Expected ConfigInvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_empty_window() {
        let mut config = Config::default();
        config.audio.window_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_override_durations() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_duplexvox_env();

        set_env("DUPLEXVOX_SILENCE_TIMEOUT", "1s 200ms");
        set_env("DUPLEXVOX_GENERATE_TIMEOUT", "45s");
        let config = Config::default().with_env_overrides().unwrap();

        assert_eq!(config.segmenter.silence_timeout_ms, 1200);
        assert_eq!(config.session.generate_timeout_ms, 45_000);
        assert_eq!(config.session.transcribe_timeout_ms, 30_000);

        clear_duplexvox_env();
    }

    #[test]
    fn test_env_override_bad_duration_is_error() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_duplexvox_env();

        set_env("DUPLEXVOX_SILENCE_TIMEOUT", "soon");
        let result = Config::default().with_env_overrides();
        assert!(result.is_err());

        clear_duplexvox_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_duplexvox_env();

        set_env("DUPLEXVOX_VAD_THRESHOLD", "");
        let config = Config::default().with_env_overrides().unwrap();
        assert_eq!(config.vad.threshold, 0.02);

        clear_duplexvox_env();
    }

    #[test]
    fn test_default_path_ends_with_config_toml() {
        if let Some(path) = Config::default_path() {
            let path_str = path.to_string_lossy();
            assert!(path_str.contains("duplexvox"));
            assert!(path_str.ends_with("config.toml"));
        }
    }
}
