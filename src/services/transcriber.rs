use crate::error::{Result, SessionError};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Trait for speech-to-text transcription.
///
/// Implementations must be safe to share between sessions: every call is an
/// independent request with no session affinity.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe one utterance to text.
    ///
    /// # Arguments
    /// * `samples` - Mono samples normalized to [-1, 1]
    /// * `sample_rate` - Sample rate of `samples` in Hz
    async fn transcribe(&self, samples: &[f32], sample_rate: u32) -> Result<String>;

    /// Name of the backing model, for logging.
    fn model_name(&self) -> &str;
}

/// Implement Transcriber for Arc<T> to allow sharing across sessions.
#[async_trait]
impl<T: Transcriber + ?Sized> Transcriber for Arc<T> {
    async fn transcribe(&self, samples: &[f32], sample_rate: u32) -> Result<String> {
        (**self).transcribe(samples, sample_rate).await
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Mock transcriber for testing
#[derive(Debug, Clone)]
pub struct MockTranscriber {
    model_name: String,
    response: String,
    should_fail: bool,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    last_len: Arc<AtomicUsize>,
}

impl MockTranscriber {
    /// Create a new mock transcriber with default settings
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            response: "mock transcription".to_string(),
            should_fail: false,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
            last_len: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Configure the mock to return a specific response
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// Configure the mock to fail on transcribe
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Configure the mock to take `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of transcribe calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Sample count of the most recent utterance
    pub fn last_samples(&self) -> usize {
        self.last_len.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, samples: &[f32], _sample_rate: u32) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_len.store(samples.len(), Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.should_fail {
            Err(SessionError::Transcription {
                message: "mock transcription failure".to_string(),
            })
        } else {
            Ok(self.response.clone())
        }
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
