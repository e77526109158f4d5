//! Working buffer that slices an inbound sample stream into VAD windows.
//!
//! Peers send audio in whatever chunk sizes their capture produces; the
//! segmenter wants fixed analysis windows. The buffer never holds more than
//! one partial window.

/// Accumulates samples and yields complete windows of a fixed size.
#[derive(Debug, Clone)]
pub struct WindowBuffer {
    window_samples: usize,
    pending: Vec<f32>,
}

impl WindowBuffer {
    /// Creates a buffer producing windows of `window_samples` samples.
    pub fn new(window_samples: usize) -> Self {
        let window_samples = window_samples.max(1);
        Self {
            window_samples,
            pending: Vec::with_capacity(window_samples),
        }
    }

    /// Appends samples and returns every window completed by them, in order.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        let mut windows = Vec::new();
        let mut rest = samples;

        while !rest.is_empty() {
            let needed = self.window_samples - self.pending.len();
            let take = needed.min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.pending.len() == self.window_samples {
                let full = std::mem::replace(
                    &mut self.pending,
                    Vec::with_capacity(self.window_samples),
                );
                windows.push(full);
            }
        }

        windows
    }

    /// Drops any partial window.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Samples waiting for the next window to complete.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn window_samples(&self) -> usize {
        self.window_samples
    }
}
