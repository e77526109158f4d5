//! The per-session coordinating loop.
//!
//! Each session is one tokio task that owns all of its state: segmenter,
//! window buffer, playback controller and the turn in flight. Inbound audio
//! and commands arrive on a bounded channel; transcription, generation and
//! synthesis run in their own tasks and report back on internal channels.
//! Every state change happens inside [`SessionLoop`], one event at a time.
//!
//! Audio arriving while a turn is being processed is discarded before it
//! reaches the segmenter, so nothing accumulates outside `Listening` and the
//! first speech heard while speaking is always a fresh onset (barge-in).
//! There is no turn queue.

use crate::audio::pcm;
use crate::audio::vad::{Clock, TokioClock};
use crate::audio::window::WindowBuffer;
use crate::config::{Config, SessionConfig};
use crate::error::{Result, SessionError};
use crate::services::Services;
use crate::session::backchannel::Backchannel;
use crate::session::emitter::{self, EventSender, PeerSink};
use crate::session::playback::{
    Cancellation, PlaybackController, PlaybackOutcome, PlaybackReport,
};
use crate::session::protocol::{ClientCommand, InboundEvent, ServerEvent, Status};
use crate::session::segmenter::{SegmentEvent, Segmenter, Utterance};
use crate::session::state::Phase;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const REPORT_QUEUE: usize = 8;

/// Builder for one voice session.
pub struct VoiceSession {
    config: Config,
    services: Services,
    clock: Arc<dyn Clock>,
}

impl VoiceSession {
    /// Fails with [`SessionError::ConfigInvalidValue`] when `config` does not
    /// validate.
    pub fn new(config: Config, services: Services) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            services,
            clock: Arc::new(TokioClock),
        })
    }

    /// Use a custom clock for silence timing.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Start the session loop and its outbound writer. Must be called from
    /// within a tokio runtime.
    pub fn spawn(self, sink: Box<dyn PeerSink>) -> SessionHandle {
        let Self {
            config,
            services,
            clock,
        } = self;

        let (events, writer) = emitter::spawn_writer(sink, config.session.outbound_queue);
        let (inbound_tx, inbound_rx) = mpsc::channel(config.session.inbound_queue.max(1));
        let (phase_tx, phase_rx) = watch::channel(Phase::Idle);
        let (playback_tx, playback_rx) = mpsc::channel(REPORT_QUEUE);
        let (turn_tx, turn_rx) = mpsc::channel(REPORT_QUEUE);

        let session = SessionLoop {
            segmenter: Segmenter::with_clock(
                &config.audio,
                &config.vad,
                &config.segmenter,
                Arc::clone(&clock),
            ),
            windows: WindowBuffer::new(config.audio.window_samples()),
            backchannel: Backchannel::new(&config.backchannel),
            playback: PlaybackController::new(
                config.playback.clone(),
                Arc::clone(&services.synthesizer),
                events.clone(),
                playback_tx,
            ),
            events,
            phase: phase_tx,
            listening: false,
            turn: None,
            next_turn: 1,
            turn_tx,
            clock,
            services,
            config,
        };

        tokio::spawn(async move {
            let phase = session.run(inbound_rx, playback_rx, turn_rx).await;
            // Observers see the session as closed only once the peer has
            // received everything that was queued.
            let _ = writer.await;
            drop(phase);
        });

        SessionHandle {
            inbound: inbound_tx,
            phase: phase_rx,
        }
    }
}

/// Cloneable handle used by the transport layer to drive a session.
///
/// The session ends when every handle is dropped.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inbound: mpsc::Sender<InboundEvent>,
    phase: watch::Receiver<Phase>,
}

impl SessionHandle {
    /// Queue an inbound event, waiting for capacity.
    pub async fn dispatch(&self, event: impl Into<InboundEvent>) -> Result<()> {
        self.inbound
            .send(event.into())
            .await
            .map_err(|_| SessionError::SessionClosed)
    }

    /// Queue an inbound event without waiting.
    pub fn try_dispatch(&self, event: impl Into<InboundEvent>) -> Result<()> {
        match self.inbound.try_send(event.into()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SessionError::Transport {
                message: "inbound queue full".to_string(),
            }),
            Err(TrySendError::Closed(_)) => Err(SessionError::SessionClosed),
        }
    }

    /// Convenience for a binary PCM16 frame.
    pub async fn send_audio(&self, pcm16: Vec<u8>) -> Result<()> {
        self.dispatch(InboundEvent::Audio(pcm16)).await
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Receiver that observes every phase change.
    pub fn watch_phase(&self) -> watch::Receiver<Phase> {
        self.phase.clone()
    }

    /// Wait until the session has shut down and flushed its output.
    pub async fn closed(&self) {
        let mut phase = self.phase.clone();
        while phase.changed().await.is_ok() {}
    }

    pub fn is_closed(&self) -> bool {
        self.inbound.is_closed()
    }
}

type TurnId = u64;

/// Progress of a turn task, in the order it happens.
#[derive(Debug)]
enum TurnReport {
    Transcribed { turn: TurnId, transcript: String },
    Replied { turn: TurnId, text: String },
}

struct ActiveTurn {
    id: TurnId,
    task: JoinHandle<()>,
}

struct SessionLoop {
    config: Config,
    services: Services,
    clock: Arc<dyn Clock>,
    segmenter: Segmenter<Arc<dyn Clock>>,
    windows: WindowBuffer,
    backchannel: Backchannel,
    playback: PlaybackController,
    events: EventSender,
    phase: watch::Sender<Phase>,
    /// Whether inbound audio is fed to the segmenter.
    listening: bool,
    turn: Option<ActiveTurn>,
    next_turn: TurnId,
    turn_tx: mpsc::Sender<TurnReport>,
}

impl SessionLoop {
    async fn run(
        mut self,
        mut inbound: mpsc::Receiver<InboundEvent>,
        mut playback_reports: mpsc::Receiver<PlaybackReport>,
        mut turn_reports: mpsc::Receiver<TurnReport>,
    ) -> watch::Sender<Phase> {
        info!("Session started");
        self.notify(Status::Connected, "Session started");
        if self.config.session.auto_listen {
            self.start_listening();
        }

        loop {
            tokio::select! {
                event = inbound.recv() => match event {
                    Some(event) => self.handle_inbound(event),
                    None => break,
                },
                Some(report) = playback_reports.recv() => self.on_playback_finished(report),
                Some(report) = turn_reports.recv() => self.on_turn_report(report),
            }
        }

        self.playback.cancel("session_closed");
        self.abandon_turn();
        info!("Session closed");
        self.phase
    }

    fn handle_inbound(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::Audio(bytes) => {
                let usable = if pcm::has_partial_sample(&bytes) {
                    warn!(
                        "Protocol violation: audio frame of {} bytes has a trailing partial sample",
                        bytes.len()
                    );
                    &bytes[..bytes.len() - 1]
                } else {
                    &bytes[..]
                };
                let samples = pcm::pcm16_le_to_f32(usable);
                self.ingest(&samples);
            }
            InboundEvent::Samples(samples) => self.ingest(&samples),
            InboundEvent::Text(frame) => match ClientCommand::from_json(&frame) {
                Ok(command) => self.handle_command(command),
                Err(e) => warn!("Ignoring inbound frame: {}", e),
            },
            InboundEvent::Command(command) => self.handle_command(command),
        }
    }

    fn handle_command(&mut self, command: ClientCommand) {
        debug!("Command: {:?}", command);
        match command {
            ClientCommand::Start => self.start_listening(),
            ClientCommand::Stop => self.stop_listening(),
            ClientCommand::Interrupt => self.interrupt(),
            ClientCommand::Ping => self.events.notify(ServerEvent::Pong),
        }
    }

    fn start_listening(&mut self) {
        self.listening = true;
        if self.current_phase().is_available() {
            self.set_phase(Phase::Listening);
        }
        self.notify(Status::Listening, "Listening");
    }

    fn stop_listening(&mut self) {
        let flushed = self.segmenter.flush();
        self.segmenter.reset();
        self.windows.clear();
        self.backchannel.reset();
        self.listening = false;

        if let Some(utterance) = flushed {
            self.on_utterance(utterance);
        }
        if self.current_phase().is_available() {
            self.set_phase(Phase::Idle);
            self.notify(Status::Idle, "Stopped listening");
        }
    }

    fn interrupt(&mut self) {
        let cancelled = self.playback.cancel("interrupted") == Cancellation::Cancelled;
        let abandoned = self.abandon_turn();
        if cancelled || abandoned {
            info!("Interrupted by client");
            self.notify(Status::Interrupted, "Interrupted by client");
        }
        self.set_phase(Phase::Idle);
    }

    fn ingest(&mut self, samples: &[f32]) {
        if !self.listening || self.current_phase() == Phase::Processing {
            return;
        }
        for window in self.windows.push(samples) {
            self.on_window(&window);
        }
    }

    fn on_window(&mut self, window: &[f32]) {
        let Some(event) = self.segmenter.process_window(window) else {
            return;
        };

        match event {
            SegmentEvent::SpeechOnset => self.on_speech_onset(),
            SegmentEvent::Speech => self.backchannel.on_speech(),
            SegmentEvent::Silence {
                elapsed,
                accumulated,
            } => {
                if let Some(text) =
                    self.backchannel
                        .on_silence(elapsed, accumulated, self.clock.now())
                {
                    debug!("Backchannel: {}", text);
                    self.events.notify(ServerEvent::Backchannel { text });
                }
            }
            SegmentEvent::Utterance(utterance) => {
                self.backchannel.reset();
                self.on_utterance(utterance);
            }
            SegmentEvent::Discarded { accumulated } => {
                self.backchannel.reset();
                debug!("Discarded {:?} of speech below the minimum utterance", accumulated);
            }
        }
    }

    fn on_speech_onset(&mut self) {
        self.backchannel.on_speech();

        match self.playback.cancel("barge_in") {
            Cancellation::Cancelled => {
                info!("Barge-in: cancelling playback");
                self.notify(Status::Interrupted, "User started speaking");
            }
            Cancellation::AlreadyFinished => {
                debug!("Speech onset after the last chunk; playback completes normally");
            }
            Cancellation::NothingActive => {}
        }

        self.set_phase(Phase::Listening);
        self.notify(Status::Listening, "Speech detected");
    }

    fn on_utterance(&mut self, utterance: Utterance) {
        let phase = self.current_phase();
        if !phase.is_available() || self.turn.is_some() {
            info!(
                "Dropping {:?} utterance completed while {}",
                utterance.duration(),
                phase
            );
            return;
        }

        let id = self.next_turn;
        self.next_turn += 1;
        info!("Utterance {} complete ({:?})", id, utterance.duration());

        self.set_phase(Phase::Processing);
        self.segmenter.reset();
        self.windows.clear();
        self.backchannel.reset();
        self.notify(Status::Processing, "Processing your request");

        let task = tokio::spawn(run_turn(
            id,
            utterance,
            self.services.clone(),
            self.config.session.clone(),
            self.turn_tx.clone(),
        ));
        self.turn = Some(ActiveTurn { id, task });
    }

    fn on_turn_report(&mut self, report: TurnReport) {
        let turn = match &report {
            TurnReport::Transcribed { turn, .. } | TurnReport::Replied { turn, .. } => *turn,
        };
        if self.turn.as_ref().map(|t| t.id) != Some(turn) {
            debug!("Ignoring report from abandoned turn {}", turn);
            return;
        }

        match report {
            TurnReport::Transcribed { transcript, .. } => {
                if transcript.is_empty() {
                    self.turn = None;
                    self.become_available();
                    self.notify(Status::Idle, "Nothing was transcribed");
                } else {
                    self.events.notify(ServerEvent::Transcript { text: transcript });
                }
            }
            TurnReport::Replied { text, .. } => {
                self.turn = None;
                self.speak(&text);
            }
        }
    }

    fn speak(&mut self, text: &str) {
        match self.playback.speak(text) {
            Ok(handle) => {
                debug!("Playback {} started", handle.id());
                self.set_phase(Phase::Speaking);
                self.notify(Status::Speaking, "Responding");
            }
            Err(e) => {
                error!("Cannot start playback: {}", e);
                self.become_available();
            }
        }
    }

    fn on_playback_finished(&mut self, report: PlaybackReport) {
        if !self.playback.finish(&report) {
            debug!("Ignoring report from cancelled playback {}", report.id);
            return;
        }

        let message = match &report.outcome {
            PlaybackOutcome::Completed { bytes } => {
                info!("Playback {} complete ({} bytes)", report.id, bytes);
                "Response complete"
            }
            PlaybackOutcome::Failed { message } => {
                warn!("Playback {} produced no audio: {}", report.id, message);
                "Nothing to play"
            }
            PlaybackOutcome::Cancelled => "Playback stopped",
        };
        self.become_available();
        self.notify(Status::Idle, message);
    }

    fn abandon_turn(&mut self) -> bool {
        match self.turn.take() {
            Some(turn) => {
                debug!("Abandoning turn {}", turn.id);
                turn.task.abort();
                true
            }
            None => false,
        }
    }

    fn become_available(&mut self) {
        let phase = if self.listening {
            Phase::Listening
        } else {
            Phase::Idle
        };
        self.set_phase(phase);
    }

    fn current_phase(&self) -> Phase {
        *self.phase.borrow()
    }

    fn set_phase(&mut self, phase: Phase) {
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            debug!("Phase {} -> {}", previous, phase);
        }
    }

    fn notify(&self, status: Status, message: &str) {
        self.events.notify(ServerEvent::status(status, message));
    }
}

/// Transcribe, then generate. Runs off the session loop; the loop decides
/// what each report means.
async fn run_turn(
    turn: TurnId,
    utterance: Utterance,
    services: Services,
    session: SessionConfig,
    reports: mpsc::Sender<TurnReport>,
) {
    let limit = session.transcribe_timeout();
    let transcribed = bounded(
        limit,
        services
            .transcriber
            .transcribe(utterance.samples(), utterance.sample_rate()),
        || SessionError::Transcription {
            message: format!("timed out after {:?}", limit),
        },
    )
    .await;
    drop(utterance);

    let transcript = match transcribed {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            warn!("Turn {}: {}", turn, e);
            String::new()
        }
    };
    debug!("Turn {} transcript: {:?}", turn, transcript);

    let empty = transcript.is_empty();
    let sent = reports
        .send(TurnReport::Transcribed {
            turn,
            transcript: transcript.clone(),
        })
        .await;
    if sent.is_err() || empty {
        return;
    }

    let limit = session.generate_timeout();
    let generated = bounded(limit, services.responder.generate(&transcript), || {
        SessionError::Generation {
            message: format!("timed out after {:?}", limit),
        }
    })
    .await;

    let text = match generated {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => {
            warn!("Turn {}: empty response, using fallback", turn);
            session.fallback_response
        }
        Err(e) => {
            warn!("Turn {}: {}, using fallback", turn, e);
            session.fallback_response
        }
    };
    let _ = reports.send(TurnReport::Replied { turn, text }).await;
}

/// Await `fut` for at most `limit`; a timeout becomes the error built by
/// `on_timeout`.
async fn bounded<T, F>(
    limit: Duration,
    fut: F,
    on_timeout: impl FnOnce() -> SessionError,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{MockResponder, MockSynthesizer, MockTranscriber};

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(1)
        };
        let result = bounded(Duration::from_secs(1), slow, || SessionError::Generation {
            message: "timed out".to_string(),
        })
        .await;
        assert!(matches!(result, Err(SessionError::Generation { .. })));
    }

    fn mock_services() -> Services {
        Services::new(
            Arc::new(MockTranscriber::new("test")),
            Arc::new(MockResponder::echo()),
            Arc::new(MockSynthesizer::with_chunks(vec![vec![0; 4]])),
        )
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = Config::default();
        config.vad.threshold = 0.0;
        let result = VoiceSession::new(config, mock_services());
        assert!(matches!(
            result,
            Err(SessionError::ConfigInvalidValue { .. })
        ));

        let mut config = Config::default();
        config.session.inbound_queue = 0;
        assert!(VoiceSession::new(config, mock_services()).is_err());
    }

    #[test]
    fn test_new_accepts_default_config() {
        assert!(VoiceSession::new(Config::default(), mock_services()).is_ok());
    }

    #[tokio::test]
    async fn test_bounded_passes_result_through() {
        let result = bounded(Duration::from_secs(1), async { Ok("done") }, || {
            SessionError::Other("unused".to_string())
        })
        .await;
        assert_eq!(result.unwrap(), "done");
    }
}
