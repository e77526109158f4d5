//! Boundaries to the external speech services a session depends on.
//!
//! All three are async, fallible and shared between sessions behind `Arc`.

pub mod responder;
pub mod synthesizer;
pub mod transcriber;

pub use responder::{MockResponder, Responder};
pub use synthesizer::{AudioStream, MockSynthesizer, Synthesizer};
pub use transcriber::{MockTranscriber, Transcriber};

use std::sync::Arc;

/// The external collaborators of one session.
#[derive(Clone)]
pub struct Services {
    pub transcriber: Arc<dyn Transcriber>,
    pub responder: Arc<dyn Responder>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

impl Services {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        responder: Arc<dyn Responder>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            transcriber,
            responder,
            synthesizer,
        }
    }
}
