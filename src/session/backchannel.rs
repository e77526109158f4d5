//! Short acknowledgements ("mhm", "right") during natural pauses.
//!
//! Fires at most once per silence run, only after the speaker has talked for
//! a while, and never more often than the cooldown allows.

use crate::config::BackchannelConfig;
use std::time::{Duration, Instant};

pub struct Backchannel {
    enabled: bool,
    pause: Duration,
    cooldown: Duration,
    min_speech: Duration,
    phrases: Vec<String>,
    next_phrase: usize,
    last_fired: Option<Instant>,
    fired_this_pause: bool,
}

impl Backchannel {
    pub fn new(config: &BackchannelConfig) -> Self {
        Self {
            enabled: config.enabled && !config.phrases.is_empty(),
            pause: Duration::from_millis(config.pause_ms as u64),
            cooldown: Duration::from_millis(config.cooldown_ms as u64),
            min_speech: Duration::from_millis(config.min_speech_ms as u64),
            phrases: config.phrases.clone(),
            next_phrase: 0,
            last_fired: None,
            fired_this_pause: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Speech resumed; the next pause may fire again.
    pub fn on_speech(&mut self) {
        self.fired_this_pause = false;
    }

    /// Observe a silent window inside an utterance. Returns the phrase to send,
    /// if any.
    pub fn on_silence(
        &mut self,
        silence: Duration,
        speech: Duration,
        now: Instant,
    ) -> Option<String> {
        if !self.enabled || self.fired_this_pause {
            return None;
        }
        if silence < self.pause || speech < self.min_speech {
            return None;
        }
        if let Some(last) = self.last_fired
            && now.saturating_duration_since(last) < self.cooldown
        {
            return None;
        }

        let phrase = self.phrases[self.next_phrase % self.phrases.len()].clone();
        self.next_phrase = (self.next_phrase + 1) % self.phrases.len();
        self.last_fired = Some(now);
        self.fired_this_pause = true;
        Some(phrase)
    }

    /// Forget the current pause (utterance ended or was abandoned).
    pub fn reset(&mut self) {
        self.fired_this_pause = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled() -> Backchannel {
        Backchannel::new(&BackchannelConfig {
            enabled: true,
            ..BackchannelConfig::default()
        })
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_disabled_by_default() {
        let mut bc = Backchannel::new(&BackchannelConfig::default());
        assert!(!bc.is_enabled());
        assert_eq!(bc.on_silence(ms(500), ms(3000), Instant::now()), None);
    }

    #[test]
    fn test_fires_once_per_pause() {
        let mut bc = enabled();
        let now = Instant::now();
        assert_eq!(bc.on_silence(ms(100), ms(2000), now), None);
        assert_eq!(bc.on_silence(ms(400), ms(2000), now), Some("mhm".to_string()));
        assert_eq!(bc.on_silence(ms(500), ms(2000), now + ms(5000)), None);
    }

    #[test]
    fn test_requires_enough_speech() {
        let mut bc = enabled();
        assert_eq!(bc.on_silence(ms(500), ms(900), Instant::now()), None);
    }

    #[test]
    fn test_cooldown_and_rotation() {
        let mut bc = enabled();
        let start = Instant::now();
        assert_eq!(bc.on_silence(ms(400), ms(1500), start), Some("mhm".to_string()));

        bc.on_speech();
        assert_eq!(bc.on_silence(ms(400), ms(1500), start + ms(1000)), None);

        bc.on_speech();
        assert_eq!(
            bc.on_silence(ms(400), ms(1500), start + ms(4000)),
            Some("right".to_string())
        );
    }

    #[test]
    fn test_empty_phrase_list_disables() {
        let bc = Backchannel::new(&BackchannelConfig {
            enabled: true,
            phrases: Vec::new(),
            ..BackchannelConfig::default()
        });
        assert!(!bc.is_enabled());
    }
}
