//! Recording coordinator
//!
//! A single tokio task owns all recording state. Commands from the UI,
//! completions from the movie outputs and progress ticks arrive as messages,
//! so the active-output counter and the stop guard are only ever touched from
//! one place.

mod state;

pub use state::RecordingState;

use crate::config::DualPovConfig;
use crate::errors::RecordingError;
use crate::finalize::{AssetFinalizer, FinalizeReport, RecordingOutcome};
use crate::session::{CaptureSessionManager, CompletionHandle, OutputCompletion, SessionState};
use crate::types::CameraPosition;
use state::{RecordingSession, TickGuard};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Runtime settings for the coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// App-private directory for in-flight per-camera files
    pub working_dir: PathBuf,
    pub file_extension: String,
    pub tick_interval: Duration,
}

impl CoordinatorSettings {
    pub fn from_config(config: &DualPovConfig) -> Self {
        Self {
            working_dir: config.storage.working_directory.clone(),
            file_extension: config.recording.file_extension.clone(),
            tick_interval: config.recording.progress_interval(),
        }
    }
}

enum Command {
    Start {
        duration: Duration,
        reply: oneshot::Sender<Result<(), RecordingError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    ReportError(String),
    Shutdown,
}

enum Internal {
    Tick(u64),
    Finalized(u64, FinalizeReport),
}

/// Cloneable handle to the coordinator task
#[derive(Clone)]
pub struct RecordingCoordinator {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<RecordingState>,
}

impl RecordingCoordinator {
    pub fn spawn(
        manager: Arc<CaptureSessionManager>,
        finalizer: Arc<AssetFinalizer>,
        settings: CoordinatorSettings,
    ) -> (Self, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(RecordingState::default());

        let actor = Actor {
            manager,
            finalizer,
            settings,
            commands: command_rx,
            commands_open: true,
            completion_tx,
            completions: completion_rx,
            internal_tx,
            internal: internal_rx,
            state: state_tx,
            active: None,
            next_id: 1,
            pending_finalizations: 0,
        };
        let task = tokio::spawn(actor.run());

        (
            Self {
                commands: command_tx,
                state: state_rx,
            },
            task,
        )
    }

    /// Start both outputs for `duration`
    pub async fn start_recording(&self, duration: Duration) -> Result<(), RecordingError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Start { duration, reply })
            .await
            .map_err(|_| RecordingError::CoordinatorClosed)?;
        rx.await.map_err(|_| RecordingError::CoordinatorClosed)?
    }

    /// Request stop. Returns once both outputs were told to stop, not when
    /// they have finalized.
    pub async fn stop_recording(&self) -> Result<(), RecordingError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Stop { reply })
            .await
            .map_err(|_| RecordingError::CoordinatorClosed)?;
        rx.await.map_err(|_| RecordingError::CoordinatorClosed)
    }

    /// Publish an error raised outside the coordinator (permissions, setup)
    pub async fn report_error(&self, message: impl Into<String>) {
        let message = message.into();
        if self.commands.send(Command::ReportError(message)).await.is_err() {
            log::debug!("Error report dropped: coordinator shut down");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<RecordingState> {
        self.state.clone()
    }

    pub fn state(&self) -> RecordingState {
        self.state.borrow().clone()
    }

    /// Wait until no recording is active and finalization has drained
    pub async fn wait_until_idle(&self) {
        let mut rx = self.state.clone();
        let _ = rx.wait_for(|s| !s.is_recording && !s.finalizing).await;
    }

    /// Stop any recording, let it finalize and end the task
    pub async fn shutdown(&self) {
        if self.commands.send(Command::Shutdown).await.is_err() {
            log::debug!("Coordinator already shut down");
        }
    }
}

struct Actor {
    manager: Arc<CaptureSessionManager>,
    finalizer: Arc<AssetFinalizer>,
    settings: CoordinatorSettings,
    commands: mpsc::Receiver<Command>,
    commands_open: bool,
    completion_tx: mpsc::UnboundedSender<OutputCompletion>,
    completions: mpsc::UnboundedReceiver<OutputCompletion>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal: mpsc::UnboundedReceiver<Internal>,
    state: watch::Sender<RecordingState>,
    active: Option<RecordingSession>,
    next_id: u64,
    pending_finalizations: usize,
}

impl Actor {
    async fn run(mut self) {
        log::debug!("Recording coordinator started");
        loop {
            if !self.commands_open && self.active.is_none() && self.pending_finalizations == 0 {
                break;
            }

            tokio::select! {
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(command) => self.handle_command(command),
                    None => self.close("all handles dropped"),
                },
                Some(completion) = self.completions.recv() => self.handle_completion(completion),
                Some(message) = self.internal.recv() => match message {
                    Internal::Tick(id) => self.handle_tick(id),
                    Internal::Finalized(id, report) => self.handle_finalized(id, report),
                },
            }
        }
        log::debug!("Recording coordinator stopped");
    }

    fn close(&mut self, reason: &str) {
        log::info!("Recording coordinator closing: {}", reason);
        self.commands_open = false;
        self.stop_active("coordinator closing");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { duration, reply } => {
                let result = self.start(duration);
                if let Err(e) = &result {
                    log::warn!("Start recording rejected: {}", e);
                    // Only the message changes; a recording in progress keeps running
                    let message = e.to_string();
                    self.state.send_modify(|s| s.error = Some(message));
                }
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                self.stop_active("stop requested");
                let _ = reply.send(());
            }
            Command::ReportError(message) => {
                self.state.send_modify(|s| s.error = Some(message));
            }
            Command::Shutdown => self.close("shutdown requested"),
        }
    }

    fn start(&mut self, duration: Duration) -> Result<(), RecordingError> {
        if self.active.is_some() {
            return Err(RecordingError::AlreadyRecording);
        }
        if self.manager.state() != SessionState::Running {
            return Err(RecordingError::SessionNotRunning);
        }
        let outputs = self
            .manager
            .outputs()
            .ok_or(RecordingError::SessionNotRunning)?;
        if outputs.front.is_recording() || outputs.back.is_recording() {
            return Err(RecordingError::AlreadyRecording);
        }
        if duration.is_zero() {
            return Err(RecordingError::InvalidDuration(duration));
        }

        let dir = &self.settings.working_dir;
        std::fs::create_dir_all(dir).map_err(|e| RecordingError::Destination {
            path: dir.clone(),
            reason: e.to_string(),
        })?;

        let id = self.next_id;
        self.next_id += 1;
        let token = uuid::Uuid::new_v4();
        let destinations: HashMap<CameraPosition, PathBuf> = CameraPosition::both()
            .into_iter()
            .map(|position| {
                let name = format!("{}-{}.{}", token, position, self.settings.file_extension);
                (position, dir.join(name))
            })
            .collect();

        // Both starts back to back, nothing blocking in between
        let front_handle =
            CompletionHandle::new(CameraPosition::Front, id, self.completion_tx.clone());
        let back_handle = CompletionHandle::new(CameraPosition::Back, id, self.completion_tx.clone());
        outputs
            .front
            .start_recording(&destinations[&CameraPosition::Front], front_handle)
            .map_err(|e| RecordingError::OutputStart {
                position: CameraPosition::Front.to_string(),
                reason: e.message,
            })?;
        if let Err(e) = outputs
            .back
            .start_recording(&destinations[&CameraPosition::Back], back_handle)
        {
            outputs.front.stop_recording();
            return Err(RecordingError::OutputStart {
                position: CameraPosition::Back.to_string(),
                reason: e.message,
            });
        }

        let ticker = self.spawn_ticker(id);
        self.active = Some(RecordingSession {
            id,
            started_at: Instant::now(),
            target: duration,
            outputs,
            pending: CameraPosition::both().into_iter().collect::<HashSet<_>>(),
            finished: HashMap::new(),
            failures: Vec::new(),
            stop_requested: false,
            progress: 0.0,
            ticker: Some(ticker),
        });

        self.state.send_modify(|s| {
            s.is_recording = true;
            s.progress = 0.0;
            s.error = None;
        });
        log::info!(
            "Recording {} started for {:.1}s into {:?}",
            id,
            duration.as_secs_f64(),
            dir
        );
        Ok(())
    }

    fn spawn_ticker(&self, id: u64) -> TickGuard {
        let tx = self.internal_tx.clone();
        let period = self.settings.tick_interval;
        TickGuard(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval.tick().await;
            loop {
                interval.tick().await;
                if tx.send(Internal::Tick(id)).is_err() {
                    break;
                }
            }
        }))
    }

    fn handle_tick(&mut self, id: u64) {
        let Some(session) = self.active.as_mut().filter(|s| s.id == id) else {
            return;
        };
        if session.stop_requested {
            return;
        }

        let progress = session.update_progress(Instant::now());
        self.state.send_if_modified(|s| {
            let changed = s.progress != progress;
            s.progress = progress;
            changed
        });

        if progress >= 1.0 {
            self.stop_active("time limit reached");
        }
    }

    /// Stop both outputs at most once per recording
    fn stop_active(&mut self, reason: &str) {
        let Some(session) = self.active.as_mut() else {
            log::debug!("Stop ignored ({}): nothing recording", reason);
            return;
        };
        if session.stop_requested {
            log::debug!("Stop ignored ({}): already stopping", reason);
            return;
        }

        session.stop_requested = true;
        session.ticker = None;
        session.progress = 1.0;
        log::info!("Stopping recording {}: {}", session.id, reason);

        for position in CameraPosition::both() {
            if session.pending.contains(&position) {
                session.outputs.get(position).stop_recording();
            }
        }

        self.state.send_modify(|s| s.progress = 1.0);
    }

    fn handle_completion(&mut self, completion: OutputCompletion) {
        let OutputCompletion {
            position,
            recording_id,
            result,
        } = completion;

        let Some(session) = self.active.as_mut().filter(|s| s.id == recording_id) else {
            log::debug!(
                "Ignoring stale {} completion for recording {}",
                position,
                recording_id
            );
            return;
        };
        if !session.pending.remove(&position) {
            log::warn!("Duplicate {} completion for recording {}", position, recording_id);
            return;
        }

        match result {
            Ok(recording) => {
                log::info!(
                    "{} output finished {:?} ({:.2}s)",
                    position,
                    recording.path,
                    recording.duration.as_secs_f64()
                );
                session.finished.insert(position, recording);
            }
            Err(e) => {
                log::error!("{} output failed: {}", position, e);
                session.failures.push(format!("{} camera: {}", position, e));
            }
        }

        if !session.pending.is_empty() {
            if !session.stop_requested {
                self.stop_active("other output finished early");
            }
            return;
        }

        if let Some(session) = self.active.take() {
            self.complete(session);
        }
    }

    fn complete(&mut self, mut session: RecordingSession) {
        let front = session.finished.remove(&CameraPosition::Front);
        let back = session.finished.remove(&CameraPosition::Back);

        let outcome = match (front, back) {
            (Some(front), Some(back)) => Some(RecordingOutcome::Dual { front, back }),
            (Some(recording), None) => Some(RecordingOutcome::Single {
                position: CameraPosition::Front,
                recording,
            }),
            (None, Some(recording)) => Some(RecordingOutcome::Single {
                position: CameraPosition::Back,
                recording,
            }),
            (None, None) => None,
        };

        let error = match &outcome {
            None => Some(RecordingError::BothOutputsFailed.to_string()),
            Some(_) if !session.failures.is_empty() => Some(session.failures.join("; ")),
            Some(_) => None,
        };

        if outcome.is_some() {
            self.pending_finalizations += 1;
        }
        let finalizing = self.pending_finalizations > 0;
        self.state.send_modify(|s| {
            s.is_recording = false;
            s.progress = 1.0;
            s.completed_recordings += 1;
            s.finalizing = finalizing;
            if error.is_some() {
                s.error = error.clone();
            }
        });

        let Some(outcome) = outcome else {
            log::error!("Recording {}: {}", session.id, RecordingError::BothOutputsFailed);
            return;
        };

        let id = session.id;
        let finalizer = self.finalizer.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let report = finalizer.finalize(outcome).await;
            let _ = tx.send(Internal::Finalized(id, report));
        });
    }

    fn handle_finalized(&mut self, id: u64, report: FinalizeReport) {
        self.pending_finalizations = self.pending_finalizations.saturating_sub(1);
        let finalizing = self.pending_finalizations > 0;
        log::info!("Recording {} finalized: {:?}", id, report.asset.path);

        let warning = (!report.warnings.is_empty()).then(|| report.warnings.join("; "));
        self.state.send_modify(|s| {
            s.finalizing = finalizing;
            s.last_asset = Some(report.asset.path.clone());
            if let Some(warning) = warning {
                s.error = Some(match s.error.take() {
                    Some(previous) => format!("{}; {}", previous, warning),
                    None => warning,
                });
            }
        });
    }
}
