//! Council playback orchestration.
//!
//! One orchestrator owns one playback session at a time. A session is either
//! an ordered list of turns, each voiced through the [`SpeechResolver`], or a
//! single agent blob split into segments whose persona switches run on
//! estimated timers. Starting anything new tears the old session down first.
//!
//! Every session carries a generation number. Resolver completions and
//! switch timers are tagged with the generation that created them and are
//! ignored once it has moved on.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::{AgentEvent, AgentMode, MessageSource};
use crate::config::PlaybackConfig;
use crate::council::Council;
use crate::error::CouncilError;
use crate::persona::{PersonaId, Turn};
use crate::resolver::{Resolution, ResolveOutcome, SpeechResolver};
use crate::segmenter::{PersonaSegmenter, Segment};
use crate::timing::DurationEstimator;

/// Callback for presentation events.
pub type CouncilCallback = Box<dyn Fn(CouncilEvent) + Send + Sync>;

/// Events for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CouncilEvent {
    /// Highlight this persona as the one speaking.
    ActivatePersona(PersonaId),
    /// Nobody is speaking.
    ClearHighlight,
    /// Add a line to the transcript.
    AppendCaption { persona: PersonaId, text: String },
    /// `index` is zero-based.
    Progress { index: usize, total: usize },
    /// The last turn has been played.
    SessionFinished,
    /// Something the user should see went wrong.
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Discrete turns, each voiced on its own.
    Turns,
    /// One streamed message covering several personas.
    Blob,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub state: PlaybackState,
    pub mode: Option<InputMode>,
    pub index: usize,
    pub total: usize,
    pub generation: u64,
}

/// Requests accepted by a spawned orchestrator.
#[derive(Debug)]
pub enum Command {
    Start(Vec<Turn>),
    Pause,
    Resume,
    TogglePause,
    Stop,
    Blob(String),
    ListeningResumed,
    Agent(AgentEvent),
    VoiceCatalogChanged(Vec<String>),
    Query(oneshot::Sender<Snapshot>),
    Shutdown,
}

enum Script {
    Empty,
    Turns(Vec<Turn>),
    Segments(Vec<Segment>),
}

struct TurnCompletion {
    generation: u64,
    index: usize,
    outcome: ResolveOutcome,
}

struct SwitchDue {
    generation: u64,
    index: usize,
}

/// The resolver call for the turn being voiced.
struct InFlight {
    cancel: CancellationToken,
    completion: BoxFuture<'static, TurnCompletion>,
}

/// Live state of the one active session.
struct PlaybackSession {
    generation: u64,
    script: Script,
    index: usize,
    state: PlaybackState,
    in_flight: Option<InFlight>,
    timers: FuturesUnordered<BoxFuture<'static, SwitchDue>>,
}

impl PlaybackSession {
    fn idle(generation: u64) -> Self {
        Self {
            generation,
            script: Script::Empty,
            index: 0,
            state: PlaybackState::Idle,
            in_flight: None,
            timers: FuturesUnordered::new(),
        }
    }

    fn mode(&self) -> Option<InputMode> {
        match self.script {
            Script::Empty => None,
            Script::Turns(_) => Some(InputMode::Turns),
            Script::Segments(_) => Some(InputMode::Blob),
        }
    }

    fn total(&self) -> usize {
        match &self.script {
            Script::Empty => 0,
            Script::Turns(turns) => turns.len(),
            Script::Segments(segments) => segments.len(),
        }
    }

    fn is_settled(&self) -> bool {
        self.in_flight.is_none() && self.timers.is_empty()
    }
}

enum Wake {
    Completed(TurnCompletion),
    SwitchDue(SwitchDue),
}

async fn next_completion(slot: &mut Option<InFlight>) -> TurnCompletion {
    match slot {
        Some(in_flight) => (&mut in_flight.completion).await,
        None => std::future::pending().await,
    }
}

async fn next_wake(session: &mut PlaybackSession) -> Wake {
    let PlaybackSession {
        in_flight, timers, ..
    } = session;
    tokio::select! {
        completion = next_completion(in_flight) => Wake::Completed(completion),
        Some(due) = timers.next(), if !timers.is_empty() => Wake::SwitchDue(due),
    }
}

/// Sequences council speech and drives the persona highlight.
pub struct PlaybackOrchestrator {
    resolver: Arc<SpeechResolver>,
    segmenter: PersonaSegmenter,
    estimator: DurationEstimator,
    session: PlaybackSession,
    callback: Option<CouncilCallback>,
}

impl PlaybackOrchestrator {
    pub fn new(
        resolver: Arc<SpeechResolver>,
        council: &dyn Council,
        playback: &PlaybackConfig,
    ) -> Result<Self, CouncilError> {
        Ok(Self {
            resolver,
            segmenter: PersonaSegmenter::new(council)?,
            estimator: DurationEstimator::from_config(playback),
            session: PlaybackSession::idle(0),
            callback: None,
        })
    }

    /// Set a callback for presentation events.
    pub fn with_callback(mut self, callback: CouncilCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn with_estimator(mut self, estimator: DurationEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.session.state,
            mode: self.session.mode(),
            index: self.session.index,
            total: self.session.total(),
            generation: self.session.generation,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.session.state
    }

    /// Turns of the current session, with any clip references fetched so far.
    pub fn turns(&self) -> &[Turn] {
        match &self.session.script {
            Script::Turns(turns) => turns,
            _ => &[],
        }
    }

    /// Play `turns` from the first one.
    pub fn start(&mut self, turns: Vec<Turn>) {
        self.stop();
        info!(turns = turns.len(), generation = self.session.generation, "starting council playback");

        let empty = turns.is_empty();
        self.session.script = Script::Turns(turns);
        if empty {
            self.finish();
            return;
        }
        self.session.state = PlaybackState::Playing;
        self.process_turn(0, true);
    }

    /// Silence the current turn and hold the index.
    pub fn pause(&mut self) {
        if self.session.state != PlaybackState::Playing
            || self.session.mode() != Some(InputMode::Turns)
        {
            debug!(state = ?self.session.state, "pause ignored");
            return;
        }
        self.session.state = PlaybackState::Paused;
        self.cancel_in_flight();
        self.resolver.silence();
    }

    /// Replay the current turn from its beginning. There is no mid-clip seek.
    pub fn resume(&mut self) {
        if self.session.state != PlaybackState::Paused {
            debug!(state = ?self.session.state, "resume ignored");
            return;
        }
        self.session.state = PlaybackState::Playing;
        self.process_turn(self.session.index, false);
    }

    pub fn toggle_pause(&mut self) {
        match self.session.state {
            PlaybackState::Playing => self.pause(),
            PlaybackState::Paused => self.resume(),
            _ => {}
        }
    }

    /// End the session: audio stops, timers are dropped, highlight clears.
    pub fn stop(&mut self) {
        let was_active = self.session.state != PlaybackState::Idle;
        self.teardown();
        if was_active {
            self.emit(CouncilEvent::ClearHighlight);
        }
    }

    /// Schedule persona switches for one agent message.
    pub fn receive_blob(&mut self, text: &str) {
        self.stop();

        let segments = self.segmenter.segment(text);
        let offsets = self.estimator.schedule(&segments);
        let generation = self.session.generation;
        let now = Instant::now();
        for (index, offset) in offsets.into_iter().enumerate().skip(1) {
            let deadline = now + offset;
            self.session.timers.push(
                async move {
                    sleep_until(deadline).await;
                    SwitchDue { generation, index }
                }
                .boxed(),
            );
        }

        debug!(segments = segments.len(), generation, "scheduled blob");
        let single = segments.len() == 1;
        self.session.script = Script::Segments(segments);
        self.session.state = PlaybackState::Playing;
        self.activate_segment(0);
        if single {
            self.session.state = PlaybackState::Finished;
        }
    }

    /// The user has the floor: drop the blob schedule and highlight them.
    pub fn listening_resumed(&mut self) {
        self.teardown();
        self.emit(CouncilEvent::ActivatePersona(PersonaId::User));
    }

    pub fn handle_agent_event(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::Connect => info!("voice agent connected"),
            AgentEvent::Disconnect => {
                info!("voice agent disconnected");
                self.stop();
            }
            AgentEvent::Message {
                message,
                source: MessageSource::Ai,
            } => self.receive_blob(&message),
            AgentEvent::Message {
                message,
                source: MessageSource::User,
            } => self.emit(CouncilEvent::AppendCaption {
                persona: PersonaId::User,
                text: message,
            }),
            AgentEvent::ModeChange {
                mode: AgentMode::Listening,
            } => self.listening_resumed(),
            AgentEvent::ModeChange {
                mode: AgentMode::Speaking,
            } => debug!("voice agent speaking"),
            AgentEvent::Error { message } => {
                warn!(%message, "voice agent error");
                self.emit(CouncilEvent::Error(message));
            }
        }
    }

    pub fn apply(&mut self, command: Command) {
        match command {
            Command::Start(turns) => self.start(turns),
            Command::Pause => self.pause(),
            Command::Resume => self.resume(),
            Command::TogglePause => self.toggle_pause(),
            Command::Stop => self.stop(),
            Command::Blob(text) => self.receive_blob(&text),
            Command::ListeningResumed => self.listening_resumed(),
            Command::Agent(event) => self.handle_agent_event(event),
            Command::VoiceCatalogChanged(catalog) => self.resolver.refresh_voices(&catalog),
            Command::Query(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown => {}
        }
    }

    /// Drive pending turns and timers until nothing is left in flight.
    pub async fn settle(&mut self) {
        while !self.session.is_settled() {
            let wake = next_wake(&mut self.session).await;
            self.on_wake(wake);
        }
    }

    /// Serve commands until shutdown or until every handle is dropped.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.apply(command),
                },
                wake = next_wake(&mut self.session) => self.on_wake(wake),
            }
        }
        self.teardown();
        debug!("playback loop stopped");
    }

    /// Move onto a tokio task and return a handle to it.
    pub fn spawn(self) -> (OrchestratorHandle, JoinHandle<()>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(receiver));
        (OrchestratorHandle { commands }, task)
    }

    fn on_wake(&mut self, wake: Wake) {
        match wake {
            Wake::Completed(completion) => {
                self.session.in_flight = None;
                self.on_turn_complete(completion);
            }
            Wake::SwitchDue(due) => self.on_switch_due(due),
        }
    }

    fn process_turn(&mut self, index: usize, announce: bool) {
        let Script::Turns(turns) = &self.session.script else {
            return;
        };
        let total = turns.len();
        let Some(turn) = turns.get(index).cloned() else {
            self.finish();
            return;
        };

        self.emit(CouncilEvent::ActivatePersona(turn.speaker));
        if announce {
            self.emit(CouncilEvent::AppendCaption {
                persona: turn.speaker,
                text: turn.text.clone(),
            });
        }
        self.emit(CouncilEvent::Progress { index, total });

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let resolver = Arc::clone(&self.resolver);
        let generation = self.session.generation;
        let completion = async move {
            let outcome = resolver.resolve(&turn, token).await;
            TurnCompletion {
                generation,
                index,
                outcome,
            }
        }
        .boxed();
        self.session.in_flight = Some(InFlight { cancel, completion });
    }

    fn on_turn_complete(&mut self, completion: TurnCompletion) {
        if completion.generation != self.session.generation {
            debug!(generation = completion.generation, "stale turn completion ignored");
            return;
        }

        if let (Some(audio_ref), Script::Turns(turns)) =
            (completion.outcome.fetched_ref, &mut self.session.script)
        {
            if let Some(turn) = turns.get_mut(completion.index) {
                turn.cache_audio_ref(audio_ref);
            }
        }
        if completion.outcome.resolution == Resolution::Failed {
            warn!(index = completion.index, "turn could not be voiced, moving on");
        }

        if self.session.state != PlaybackState::Playing {
            return;
        }
        self.session.index = completion.index + 1;
        self.process_turn(self.session.index, true);
    }

    fn activate_segment(&mut self, index: usize) {
        let Script::Segments(segments) = &self.session.script else {
            return;
        };
        let total = segments.len();
        let Some(segment) = segments.get(index).cloned() else {
            return;
        };

        self.emit(CouncilEvent::ActivatePersona(segment.persona));
        if !segment.text.is_empty() {
            self.emit(CouncilEvent::AppendCaption {
                persona: segment.persona,
                text: segment.text,
            });
        }
        self.emit(CouncilEvent::Progress { index, total });
    }

    fn on_switch_due(&mut self, due: SwitchDue) {
        if due.generation != self.session.generation {
            debug!(generation = due.generation, index = due.index, "stale switch ignored");
            return;
        }
        if self.session.state != PlaybackState::Playing || due.index <= self.session.index {
            return;
        }

        // Timers can come due together; activate everything up to `due` in order.
        for index in self.session.index + 1..=due.index {
            self.activate_segment(index);
        }
        self.session.index = due.index;
        if due.index + 1 >= self.session.total() {
            self.session.state = PlaybackState::Finished;
        }
    }

    fn finish(&mut self) {
        self.session.state = PlaybackState::Finished;
        self.emit(CouncilEvent::ClearHighlight);
        self.emit(CouncilEvent::SessionFinished);
        info!(generation = self.session.generation, "council playback finished");
    }

    fn cancel_in_flight(&mut self) {
        if let Some(in_flight) = self.session.in_flight.take() {
            in_flight.cancel.cancel();
        }
    }

    /// Drop everything belonging to the current generation and start a new one.
    fn teardown(&mut self) {
        self.cancel_in_flight();
        self.resolver.silence();
        self.session = PlaybackSession::idle(self.session.generation + 1);
    }

    fn emit(&self, event: CouncilEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}

/// Sends commands to a spawned [`PlaybackOrchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl OrchestratorHandle {
    pub fn send(&self, command: Command) -> Result<(), CouncilError> {
        self.commands
            .send(command)
            .map_err(|_| CouncilError::PlaybackClosed)
    }

    pub fn start(&self, turns: Vec<Turn>) -> Result<(), CouncilError> {
        self.send(Command::Start(turns))
    }

    pub fn pause(&self) -> Result<(), CouncilError> {
        self.send(Command::Pause)
    }

    pub fn resume(&self) -> Result<(), CouncilError> {
        self.send(Command::Resume)
    }

    pub fn toggle_pause(&self) -> Result<(), CouncilError> {
        self.send(Command::TogglePause)
    }

    pub fn stop(&self) -> Result<(), CouncilError> {
        self.send(Command::Stop)
    }

    pub fn blob(&self, text: impl Into<String>) -> Result<(), CouncilError> {
        self.send(Command::Blob(text.into()))
    }

    pub fn listening_resumed(&self) -> Result<(), CouncilError> {
        self.send(Command::ListeningResumed)
    }

    pub fn agent_event(&self, event: AgentEvent) -> Result<(), CouncilError> {
        self.send(Command::Agent(event))
    }

    pub fn voice_catalog_changed(&self, catalog: Vec<String>) -> Result<(), CouncilError> {
        self.send(Command::VoiceCatalogChanged(catalog))
    }

    pub async fn snapshot(&self) -> Result<Snapshot, CouncilError> {
        let (reply, answer) = oneshot::channel();
        self.send(Command::Query(reply))?;
        answer.await.map_err(|_| CouncilError::PlaybackClosed)
    }

    pub fn shutdown(&self) -> Result<(), CouncilError> {
        self.send(Command::Shutdown)
    }
}
