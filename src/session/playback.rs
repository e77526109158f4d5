//! Playback of synthesized responses.
//!
//! [`PlaybackController::speak`] spawns one task that synthesizes the response
//! sentence by sentence and streams fixed-size audio chunks to the peer at
//! playback rate. Cancellation is cooperative: the task checks its token
//! before every chunk and around every await, so once cancelled it sends a
//! single `stop_audio` and nothing after it. A synthesis call in flight at
//! cancellation is abandoned, not awaited.
//!
//! Cancellation and completion race for the same claim. Whichever side takes
//! it first decides the ending: a task that already sent its final chunk
//! cannot be cancelled any more, and a cancel that wins always reaches the
//! peer as `stop_audio`.

use crate::config::PlaybackConfig;
use crate::error::{Result, SessionError};
use crate::services::Synthesizer;
use crate::session::emitter::EventSender;
use crate::session::protocol::ServerEvent;
use futures_util::StreamExt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub type PlaybackId = u64;

/// How a playback ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackOutcome {
    /// Every synthesized byte was sent, the last chunk marked final.
    Completed { bytes: usize },
    /// Stopped by barge-in, interrupt or session shutdown.
    Cancelled,
    /// Synthesis failed or produced nothing.
    Failed { message: String },
}

/// Sent by a playback task to the session loop when it ends.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackReport {
    pub id: PlaybackId,
    pub outcome: PlaybackOutcome,
}

/// Result of [`PlaybackController::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancellation {
    /// Nothing was playing.
    NothingActive,
    /// The playback was stopped; the peer gets `stop_audio`.
    Cancelled,
    /// The playback had already ended on its own. Its report is still on
    /// the way and releases it through [`PlaybackController::finish`].
    AlreadyFinished,
}

const PLAYING: u8 = 0;
const CANCELLED: u8 = 1;
const FINISHED: u8 = 2;

/// State shared between a handle and its task.
#[derive(Debug)]
struct Control {
    token: CancellationToken,
    reason: OnceLock<String>,
    state: AtomicU8,
}

impl Control {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            reason: OnceLock::new(),
            state: AtomicU8::new(PLAYING),
        }
    }

    fn claim(&self, to: u8) -> bool {
        self.state
            .compare_exchange(PLAYING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Cancellation side of one live playback.
#[derive(Debug, Clone)]
pub struct PlaybackHandle {
    id: PlaybackId,
    control: Arc<Control>,
}

impl PlaybackHandle {
    pub fn id(&self) -> PlaybackId {
        self.id
    }

    /// Request cancellation. The first reason given is the one reported to
    /// the peer. Returns `false` when the playback already ended on its own.
    pub fn cancel(&self, reason: &str) -> bool {
        let _ = self.control.reason.set(reason.to_string());
        if !self.control.claim(CANCELLED) {
            return self.is_cancelled();
        }
        self.control.token.cancel();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.state.load(Ordering::Acquire) == CANCELLED
    }
}

/// Owns the single live playback of a session.
pub struct PlaybackController {
    config: PlaybackConfig,
    synthesizer: Arc<dyn Synthesizer>,
    events: EventSender,
    reports: mpsc::Sender<PlaybackReport>,
    active: Option<PlaybackHandle>,
    next_id: PlaybackId,
}

impl PlaybackController {
    pub fn new(
        config: PlaybackConfig,
        synthesizer: Arc<dyn Synthesizer>,
        events: EventSender,
        reports: mpsc::Sender<PlaybackReport>,
    ) -> Self {
        Self {
            config,
            synthesizer,
            events,
            reports,
            active: None,
            next_id: 1,
        }
    }

    /// Start speaking `text`.
    ///
    /// Fails with [`SessionError::PlaybackBusy`] while another playback is
    /// live: the caller must cancel it first.
    pub fn speak(&mut self, text: &str) -> Result<PlaybackHandle> {
        if self.active.is_some() {
            return Err(SessionError::PlaybackBusy);
        }

        let id = self.next_id;
        self.next_id += 1;
        let handle = PlaybackHandle {
            id,
            control: Arc::new(Control::new()),
        };

        let task = PlaybackTask {
            text: text.to_string(),
            synthesizer: Arc::clone(&self.synthesizer),
            events: self.events.clone(),
            control: Arc::clone(&handle.control),
            slicer: ChunkSlicer::new(self.config.chunk_bytes),
            pending: None,
            pacing: self.config.paced.then(|| self.config.chunk_interval()),
            next_deadline: Instant::now(),
            bytes_sent: 0,
        };
        let reports = self.reports.clone();
        tokio::spawn(async move {
            let outcome = task.run().await;
            debug!("Playback {} ended: {:?}", id, outcome);
            let _ = reports.send(PlaybackReport { id, outcome }).await;
        });

        self.active = Some(handle.clone());
        Ok(handle)
    }

    /// Cancel the live playback, if any.
    ///
    /// After [`Cancellation::Cancelled`] a new playback may be started
    /// immediately; the cancelled task's late report is recognized as stale
    /// by [`Self::finish`]. A playback that already finished stays active
    /// until its report arrives.
    pub fn cancel(&mut self, reason: &str) -> Cancellation {
        let Some(handle) = &self.active else {
            return Cancellation::NothingActive;
        };
        if handle.cancel(reason) {
            self.active = None;
            Cancellation::Cancelled
        } else {
            Cancellation::AlreadyFinished
        }
    }

    /// Record a task report. Returns `true` when it belongs to the live
    /// playback, which is then released.
    pub fn finish(&mut self, report: &PlaybackReport) -> bool {
        match &self.active {
            Some(handle) if handle.id == report.id => {
                self.active = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_id(&self) -> Option<PlaybackId> {
        self.active.as_ref().map(|h| h.id)
    }
}

/// Why streaming stopped early.
enum Halt {
    Cancelled,
    /// The outbound queue is gone; the session is shutting down.
    Closed,
}

struct PlaybackTask {
    text: String,
    synthesizer: Arc<dyn Synthesizer>,
    events: EventSender,
    control: Arc<Control>,
    slicer: ChunkSlicer,
    /// One chunk of lookahead so the last one can be marked final.
    pending: Option<Vec<u8>>,
    pacing: Option<Duration>,
    next_deadline: Instant,
    bytes_sent: usize,
}

impl PlaybackTask {
    async fn run(mut self) -> PlaybackOutcome {
        match self.stream_all().await {
            Ok(outcome) if self.control.claim(FINISHED) => outcome,
            // A cancel that beat the claim still owes the peer a stop_audio.
            Ok(_) | Err(Halt::Cancelled) => {
                let reason = self
                    .control
                    .reason
                    .get()
                    .cloned()
                    .unwrap_or_else(|| "cancelled".to_string());
                let _ = self.events.send(ServerEvent::StopAudio { reason }).await;
                PlaybackOutcome::Cancelled
            }
            Err(Halt::Closed) => PlaybackOutcome::Cancelled,
        }
    }

    async fn stream_all(&mut self) -> std::result::Result<PlaybackOutcome, Halt> {
        for sentence in split_sentences(&self.text) {
            let stream = self.guard(self.synthesizer.synthesize(&sentence)).await?;
            let mut stream = match stream {
                Ok(stream) => stream,
                Err(e) => return self.failed(e.to_string()).await,
            };

            while let Some(item) = self.guard(stream.next()).await? {
                match item {
                    Ok(bytes) => {
                        for chunk in self.slicer.push(&bytes) {
                            self.queue(chunk).await?;
                        }
                    }
                    Err(e) => return self.failed(e.to_string()).await,
                }
            }
        }

        if let Some(tail) = self.slicer.finish() {
            self.queue(tail).await?;
        }
        match self.pending.take() {
            Some(last) => {
                self.emit(last, true).await?;
                Ok(PlaybackOutcome::Completed {
                    bytes: self.bytes_sent,
                })
            }
            None => self.failed("synthesizer produced no audio".to_string()).await,
        }
    }

    /// Run `fut` unless cancellation wins first. Cancellation is checked
    /// before polling `fut`.
    async fn guard<F: Future>(&self, fut: F) -> std::result::Result<F::Output, Halt> {
        tokio::select! {
            biased;
            _ = self.control.token.cancelled() => Err(Halt::Cancelled),
            output = fut => Ok(output),
        }
    }

    async fn queue(&mut self, chunk: Vec<u8>) -> std::result::Result<(), Halt> {
        if let Some(previous) = self.pending.replace(chunk) {
            self.emit(previous, false).await?;
        }
        Ok(())
    }

    async fn emit(&mut self, data: Vec<u8>, is_final: bool) -> std::result::Result<(), Halt> {
        let len = data.len();
        self.guard(self.events.send(ServerEvent::AudioChunk { data, is_final }))
            .await?
            .map_err(|_| Halt::Closed)?;
        self.bytes_sent += len;

        if !is_final && let Some(interval) = self.pacing {
            self.next_deadline = self.next_deadline.max(Instant::now()) + interval;
            self.guard(tokio::time::sleep_until(self.next_deadline))
                .await?;
        }
        Ok(())
    }

    async fn failed(&mut self, message: String) -> std::result::Result<PlaybackOutcome, Halt> {
        warn!("Synthesis failed, nothing more to play: {}", message);
        if self.bytes_sent > 0 {
            self.events
                .send(ServerEvent::StopAudio {
                    reason: "synthesis_failed".to_string(),
                })
                .await
                .map_err(|_| Halt::Closed)?;
        }
        Ok(PlaybackOutcome::Failed { message })
    }
}

/// Re-slices a byte stream into fixed-size chunks.
struct ChunkSlicer {
    size: usize,
    carry: Vec<u8>,
}

impl ChunkSlicer {
    fn new(size: usize) -> Self {
        Self {
            size: size.max(1),
            carry: Vec::new(),
        }
    }

    fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.carry.extend_from_slice(bytes);
        let full = self.carry.len() / self.size * self.size;
        let rest = self.carry.split_off(full);
        let chunks = self.carry.chunks(self.size).map(<[u8]>::to_vec).collect();
        self.carry = rest;
        chunks
    }

    fn finish(&mut self) -> Option<Vec<u8>> {
        if self.carry.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.carry))
        }
    }
}

/// Split a response into sentences on `.`, `!` and `?`. One-character
/// fragments (stray punctuation, list markers) are dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            push_sentence(&mut sentences, &current);
            current.clear();
        }
    }
    push_sentence(&mut sentences, &current);
    sentences
}

fn push_sentence(sentences: &mut Vec<String>, candidate: &str) {
    let trimmed = candidate.trim();
    if trimmed.chars().count() > 1 {
        sentences.push(trimmed.to_string());
    }
}
