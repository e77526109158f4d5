//! Energy-based Voice Activity Detection (VAD).
//!
//! Classifies fixed-size windows of normalized samples as speech or silence
//! by comparing their RMS energy against a threshold. The detector itself is
//! stateless; timing decisions (silence timeouts) belong to the segmenter,
//! which reads time through the [`Clock`] trait.

use crate::defaults;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Trait for time operations, allowing mock time in tests.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Real system clock using `std::time::Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock backed by the tokio timer.
///
/// Identical to [`SystemClock`] on a normal runtime, but follows paused and
/// auto-advanced time under `tokio::test(start_paused = true)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

/// Manually advanced clock for deterministic tests.
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<Mutex<Instant>>,
}

impl MockClock {
    /// Creates a new mock clock starting at the current instant.
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Advances the mock clock by the given duration.
    pub fn advance(&self, duration: Duration) {
        if let Ok(mut current) = self.current.lock() {
            *current += duration;
        }
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        match self.current.lock() {
            Ok(current) => *current,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Stateless RMS-threshold speech classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyVad {
    threshold: f32,
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new(defaults::VAD_THRESHOLD)
    }
}

impl EnergyVad {
    /// Creates a detector that reports speech above `threshold` RMS.
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Returns true if the window's RMS energy exceeds the threshold.
    ///
    /// An empty window is silence.
    pub fn classify(&self, window: &[f32]) -> bool {
        calculate_rms(window) > self.threshold
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

/// Calculates the Root Mean Square (RMS) of normalized audio samples.
///
/// # Returns
/// RMS value where 0.0 is silence, ~0.707 a full-scale sine wave and 1.0
/// a constant full-scale signal. Empty input yields 0.0.
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&sample| {
            let s = sample as f64;
            s * s
        })
        .sum();

    let mean_square = sum_squares / samples.len() as f64;
    mean_square.sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_silence_is_zero() {
        assert_eq!(calculate_rms(&[0.0; 1600]), 0.0);
    }

    #[test]
    fn test_rms_full_scale() {
        let rms = calculate_rms(&[1.0; 1000]);
        assert!((rms - 1.0).abs() < 0.001, "RMS should be ~1.0, got {}", rms);
    }

    #[test]
    fn test_rms_mixed_positive_negative() {
        let mut mixed = vec![0.03f32; 500];
        mixed.extend(vec![-0.03f32; 500]);
        let rms = calculate_rms(&mixed);
        assert!((rms - 0.03).abs() < 0.001, "RMS should be ~0.03, got {}", rms);
    }

    #[test]
    fn test_empty_window_is_not_speech() {
        let vad = EnergyVad::default();
        assert!(!vad.classify(&[]));
    }

    #[test]
    fn test_classify_against_default_threshold() {
        let vad = EnergyVad::default();
        assert!(!vad.classify(&[0.0; 1600]));
        assert!(!vad.classify(&[0.01; 1600]));
        assert!(vad.classify(&[0.5; 1600]));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let vad = EnergyVad::new(0.5);
        assert!(!vad.classify(&[0.5; 100]));
        assert!(vad.classify(&[0.51; 100]));
    }

    #[test]
    fn test_classify_is_deterministic() {
        let vad = EnergyVad::new(0.02);
        let window: Vec<f32> = (0..1600).map(|i| ((i as f32) * 0.1).sin() * 0.05).collect();
        let first = vad.classify(&window);
        for _ in 0..10 {
            assert_eq!(vad.classify(&window), first);
        }
    }

    #[test]
    fn test_mock_clock_advances() {
        let clock = MockClock::new();
        let start = clock.now();
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now().duration_since(start), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_paused_time() {
        let clock = TokioClock;
        let start = clock.now();
        tokio::time::advance(Duration::from_millis(800)).await;
        assert!(clock.now().duration_since(start) >= Duration::from_millis(800));
    }
}
