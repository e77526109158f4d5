//! Utterance segmentation.
//!
//! Turns a stream of fixed-size VAD windows into utterances using two
//! thresholds: one speech window starts an utterance, sustained silence ends
//! it. Silence inside an utterance is held aside and only becomes part of the
//! utterance if speech resumes, so a finalized utterance carries no trailing
//! silence.

use crate::audio::vad::{Clock, EnergyVad, TokioClock};
use crate::config::{AudioConfig, SegmenterConfig, VadConfig};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    Idle,
    Accumulating,
}

/// One completed span of user speech.
///
/// Produced once by the segmenter and consumed by value by the turn that
/// transcribes it.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Utterance {
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration(&self) -> Duration {
        samples_to_duration(self.samples.len(), self.sample_rate)
    }
}

/// What one window did to the segmenter.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentEvent {
    /// First speech window after idle. Triggers barge-in.
    SpeechOnset,
    /// Speech continues (possibly after a short pause).
    Speech,
    /// Silence inside an utterance that has not timed out yet.
    Silence {
        elapsed: Duration,
        accumulated: Duration,
    },
    /// Silence timed out with enough speech accumulated.
    Utterance(Utterance),
    /// Silence timed out but the speech was too short to count.
    Discarded { accumulated: Duration },
}

pub struct Segmenter<C: Clock = TokioClock> {
    vad: EnergyVad,
    clock: C,
    state: SegmenterState,
    accumulator: Vec<f32>,
    gap: Vec<f32>,
    silence_started: Option<Instant>,
    silence_timeout: Duration,
    min_utterance: Duration,
    sample_rate: u32,
}

impl Segmenter<TokioClock> {
    pub fn new(audio: &AudioConfig, vad: &VadConfig, segmenter: &SegmenterConfig) -> Self {
        Self::with_clock(audio, vad, segmenter, TokioClock)
    }
}

impl<C: Clock> Segmenter<C> {
    pub fn with_clock(
        audio: &AudioConfig,
        vad: &VadConfig,
        segmenter: &SegmenterConfig,
        clock: C,
    ) -> Self {
        Self {
            vad: EnergyVad::new(vad.threshold),
            clock,
            state: SegmenterState::Idle,
            accumulator: Vec::new(),
            gap: Vec::new(),
            silence_started: None,
            silence_timeout: Duration::from_millis(segmenter.silence_timeout_ms as u64),
            min_utterance: Duration::from_millis(segmenter.min_utterance_ms as u64),
            sample_rate: audio.sample_rate,
        }
    }

    /// Feed one analysis window. Returns `None` for silence while idle.
    pub fn process_window(&mut self, window: &[f32]) -> Option<SegmentEvent> {
        let is_speech = self.vad.classify(window);

        match (self.state, is_speech) {
            (SegmenterState::Idle, false) => None,
            (SegmenterState::Idle, true) => {
                self.state = SegmenterState::Accumulating;
                self.silence_started = None;
                self.accumulator.clear();
                self.gap.clear();
                self.accumulator.extend_from_slice(window);
                Some(SegmentEvent::SpeechOnset)
            }
            (SegmenterState::Accumulating, true) => {
                // A pause that did not time out belongs to the utterance.
                self.accumulator.append(&mut self.gap);
                self.accumulator.extend_from_slice(window);
                self.silence_started = None;
                Some(SegmentEvent::Speech)
            }
            (SegmenterState::Accumulating, false) => {
                let now = self.clock.now();
                let started = *self.silence_started.get_or_insert(now);
                self.gap.extend_from_slice(window);

                let elapsed = now.saturating_duration_since(started);
                let accumulated = self.accumulated();
                if elapsed < self.silence_timeout {
                    return Some(SegmentEvent::Silence {
                        elapsed,
                        accumulated,
                    });
                }

                if accumulated >= self.min_utterance {
                    let utterance = self.take_utterance();
                    Some(SegmentEvent::Utterance(utterance))
                } else {
                    self.reset();
                    Some(SegmentEvent::Discarded { accumulated })
                }
            }
        }
    }

    /// Finalize whatever is accumulated without waiting for the silence
    /// timeout. Returns `None` when idle or when the speech is too short.
    pub fn flush(&mut self) -> Option<Utterance> {
        if self.state != SegmenterState::Accumulating {
            return None;
        }
        if self.accumulated() >= self.min_utterance {
            Some(self.take_utterance())
        } else {
            self.reset();
            None
        }
    }

    /// Drop any accumulated audio and return to idle.
    pub fn reset(&mut self) {
        self.state = SegmenterState::Idle;
        self.accumulator = Vec::new();
        self.gap = Vec::new();
        self.silence_started = None;
    }

    pub fn state(&self) -> SegmenterState {
        self.state
    }

    /// Duration of speech accumulated so far (excluding a trailing pause).
    pub fn accumulated(&self) -> Duration {
        samples_to_duration(self.accumulator.len(), self.sample_rate)
    }

    pub fn is_empty(&self) -> bool {
        self.accumulator.is_empty() && self.gap.is_empty()
    }

    fn take_utterance(&mut self) -> Utterance {
        let samples = std::mem::take(&mut self.accumulator);
        self.reset();
        Utterance {
            samples,
            sample_rate: self.sample_rate,
        }
    }
}

fn samples_to_duration(samples: usize, sample_rate: u32) -> Duration {
    Duration::from_micros(samples as u64 * 1_000_000 / sample_rate.max(1) as u64)
}
