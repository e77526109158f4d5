use crate::error::{Result, SessionError};
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Lazy, finite, non-restartable sequence of synthesized PCM16 byte chunks.
pub type AudioStream = BoxStream<'static, Result<Vec<u8>>>;

/// Trait for text-to-speech synthesis.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Start synthesizing `text`. The returned stream yields audio as it is
    /// rendered; dropping it abandons the rest of the synthesis.
    async fn synthesize(&self, text: &str) -> Result<AudioStream>;
}

#[async_trait]
impl<T: Synthesizer + ?Sized> Synthesizer for Arc<T> {
    async fn synthesize(&self, text: &str) -> Result<AudioStream> {
        (**self).synthesize(text).await
    }
}

/// What the mock does when asked to synthesize.
#[derive(Debug, Clone)]
enum MockBehavior {
    /// Yield these chunks for every request.
    Chunks(Vec<Vec<u8>>),
    /// Yield `bytes_per_char` bytes for every character of the text.
    Proportional { bytes_per_char: usize, chunk: usize },
    /// Fail before producing a stream.
    Fail,
    /// Yield these chunks, then an error.
    FailAfter(Vec<Vec<u8>>),
}

/// Mock synthesizer for testing
#[derive(Debug, Clone)]
pub struct MockSynthesizer {
    behavior: MockBehavior,
    chunk_delay: Duration,
    texts: Arc<Mutex<Vec<String>>>,
}

impl MockSynthesizer {
    /// Yield the given chunks for every request
    pub fn with_chunks(chunks: Vec<Vec<u8>>) -> Self {
        Self::from_behavior(MockBehavior::Chunks(chunks))
    }

    /// Yield `bytes_per_char` bytes per character, split into `chunk`-byte pieces
    pub fn proportional(bytes_per_char: usize, chunk: usize) -> Self {
        Self::from_behavior(MockBehavior::Proportional {
            bytes_per_char,
            chunk: chunk.max(1),
        })
    }

    /// Fail every request
    pub fn failing() -> Self {
        Self::from_behavior(MockBehavior::Fail)
    }

    /// Yield `chunks` and then fail mid-stream
    pub fn failing_after(chunks: Vec<Vec<u8>>) -> Self {
        Self::from_behavior(MockBehavior::FailAfter(chunks))
    }

    /// Sleep `delay` before yielding each chunk
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Texts requested so far, in call order
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().map(|t| t.clone()).unwrap_or_default()
    }

    fn from_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            chunk_delay: Duration::ZERO,
            texts: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioStream> {
        if let Ok(mut texts) = self.texts.lock() {
            texts.push(text.to_string());
        }

        let items: Vec<Result<Vec<u8>>> = match &self.behavior {
            MockBehavior::Fail => {
                return Err(SessionError::Synthesis {
                    message: "mock synthesis failure".to_string(),
                });
            }
            MockBehavior::Chunks(chunks) => chunks.iter().cloned().map(Ok).collect(),
            MockBehavior::Proportional {
                bytes_per_char,
                chunk,
            } => {
                let audio: Vec<u8> = text
                    .bytes()
                    .flat_map(|b| std::iter::repeat_n(b, *bytes_per_char))
                    .collect();
                audio.chunks(*chunk).map(|c| Ok(c.to_vec())).collect()
            }
            MockBehavior::FailAfter(chunks) => {
                let mut items: Vec<Result<Vec<u8>>> = chunks.iter().cloned().map(Ok).collect();
                items.push(Err(SessionError::Synthesis {
                    message: "mock stream interrupted".to_string(),
                }));
                items
            }
        };

        let delay = self.chunk_delay;
        let stream = stream::iter(items).then(move |item| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            item
        });
        Ok(stream.boxed())
    }
}
