//! Full-duplex voice sessions.
//!
//! A session listens to a peer's audio, segments it into utterances, turns
//! each utterance into a spoken reply, and stops talking as soon as the peer
//! starts speaking over it (barge-in).

pub mod backchannel;
pub mod coordinator;
pub mod emitter;
pub mod playback;
pub mod protocol;
pub mod registry;
pub mod segmenter;
pub mod state;

pub use coordinator::{SessionHandle, VoiceSession};
pub use emitter::{ChannelSink, PeerSink};
pub use protocol::{ClientCommand, InboundEvent, ServerEvent, Status};
pub use registry::{SessionId, SessionLookup, SessionRegistry};
pub use state::Phase;
