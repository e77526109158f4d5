//! Audio primitives: PCM conversion, VAD windows and energy classification.

pub mod pcm;
pub mod vad;
pub mod window;

pub use vad::{Clock, EnergyVad, MockClock, SystemClock, TokioClock, calculate_rms};
pub use window::WindowBuffer;
