//! The generation worker.
//!
//! A single tokio task owns the model runtime and the interrupt token for the
//! lifetime of the session. It consumes `Command`s in order and reports
//! everything back as `Event`s; nothing it does can fail across the channel.
//!
//! Load and generation run as child tasks so that `stop` is handled while a
//! generation is streaming. Child tasks report back through an internal
//! channel and the worker loop emits the completion events, which keeps
//! `generation_complete` behind every `generation_stream` of that run.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::error::{RestyleError, Result};
use crate::interrupt::InterruptToken;
use crate::prompt::ChatTemplate;
use crate::protocol::{Command, Event, LogLevel, WorkerLog};
use crate::runtime::{GenerationOptions, LoadProgress, ModelRuntime};
use crate::state::ChatMessage;
use crate::status::{ModelStatus, Phase, ProgressTracker};

/// Cloneable sending half of the event channel. Sends never fail loudly:
/// a UI that went away just stops hearing from us.
#[derive(Clone)]
pub struct EventEmitter {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventEmitter {
    pub fn new(tx: mpsc::UnboundedSender<Event>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, event: Event) {
        trace!(kind = event.kind(), "emit");
        if self.tx.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(Event::WorkerLog(WorkerLog::new(level, message)));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadState {
    Unloaded,
    Loading,
    Loaded,
    /// Terminal for this worker instance.
    Failed,
}

enum TaskOutcome {
    Loaded(Result<()>),
    Generated(Result<()>),
}

/// Session object owned by the worker task.
pub struct GenerationWorker {
    runtime: Arc<dyn ModelRuntime>,
    template: ChatTemplate,
    options: GenerationOptions,
    interrupt: InterruptToken,
    events: EventEmitter,
    load_state: LoadState,
    generating: bool,
    status: ModelStatus,
}

impl GenerationWorker {
    pub fn new(runtime: Arc<dyn ModelRuntime>, template: ChatTemplate, events: EventEmitter) -> Self {
        let status = ModelStatus::initializing(runtime.model_name());
        Self {
            options: GenerationOptions::default().with_stop(template.stop_sequences()),
            runtime,
            template,
            interrupt: InterruptToken::new(),
            events,
            load_state: LoadState::Unloaded,
            generating: false,
            status,
        }
    }

    /// Process commands until the command channel closes.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<TaskOutcome>();

        loop {
            tokio::select! {
                // Finished tasks first, so a command queued right after the
                // final events of a run sees the worker idle.
                biased;
                Some(outcome) = done_rx.recv() => self.finish(outcome),
                command = commands.recv() => match command {
                    Some(command) => self.dispatch(command, &done_tx),
                    None => break,
                },
            }
        }

        info!("command channel closed, worker exiting");
        self.interrupt.interrupt();
    }

    fn dispatch(&mut self, command: Command, done: &mpsc::UnboundedSender<TaskOutcome>) {
        debug!(?command, "command");
        match command {
            Command::Load => self.load(done),
            Command::Generate { messages } => self.generate(messages, done),
            Command::Stop => self.stop(),
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        if !self.status.phase().can_transition_to(phase) {
            warn!(from = %self.status.phase(), to = %phase, "unexpected status transition");
        }
        self.status = ModelStatus::new(self.runtime.model_name(), phase);
        self.events.emit(Event::ModelStatus(self.status.clone()));
    }

    fn load(&mut self, done: &mpsc::UnboundedSender<TaskOutcome>) {
        let reason = match self.load_state {
            LoadState::Unloaded => None,
            LoadState::Loading => Some("model is already loading"),
            LoadState::Loaded => Some("model is already loaded"),
            LoadState::Failed => Some("model failed to load; reload to retry"),
        };
        if let Some(reason) = reason {
            warn!(reason, "load rejected");
            self.events.log(LogLevel::Warn, format!("load rejected: {reason}"));
            return;
        }

        self.load_state = LoadState::Loading;
        self.events.emit(Event::LoadStart);
        self.status = ModelStatus::initializing(self.runtime.model_name());
        self.events.emit(Event::ModelStatus(self.status.clone()));

        let runtime = Arc::clone(&self.runtime);
        let events = self.events.clone();
        let done = done.clone();
        tokio::spawn(async move {
            let model_name = runtime.model_name().to_string();
            let mut tracker = ProgressTracker::default();
            let mut on_progress = |progress: LoadProgress| {
                debug!(stage = %progress.stage, percent = progress.percent, "load progress");
                if let Some(pct) = tracker.advance(progress.percent) {
                    events.emit(Event::ModelStatus(ModelStatus::new(
                        model_name.as_str(),
                        Phase::Downloading(pct),
                    )));
                }
            };
            let result = AssertUnwindSafe(runtime.load(&mut on_progress))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(RestyleError::Load(format!(
                        "model runtime panicked: {}",
                        panic_message(&*panic)
                    )))
                });
            let _ = done.send(TaskOutcome::Loaded(result));
        });
    }

    fn generate(&mut self, messages: Vec<ChatMessage>, done: &mpsc::UnboundedSender<TaskOutcome>) {
        if self.load_state != LoadState::Loaded {
            error!("generate received before the model was loaded; ignoring");
            return;
        }
        if self.generating {
            warn!("generate received while a generation is in flight; rejecting");
            self.events.log(
                LogLevel::Warn,
                "generate rejected: a generation is already in flight",
            );
            return;
        }

        self.generating = true;
        self.set_phase(Phase::Generating);
        self.interrupt.reset();

        let prompt = self.template.apply(&messages);
        info!(messages = messages.len(), prompt_chars = prompt.len(), "generation started");

        let runtime = Arc::clone(&self.runtime);
        let options = self.options.clone();
        let interrupt = self.interrupt.clone();
        let events = self.events.clone();
        let done = done.clone();
        tokio::spawn(async move {
            let mut on_token = |chunk: String| events.emit(Event::GenerationStream(chunk));
            // A panicking adapter still has to produce a completion.
            let generation = runtime.generate(&prompt, &options, &interrupt, &mut on_token);
            let result = AssertUnwindSafe(generation)
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(RestyleError::Generation(format!(
                        "model runtime panicked: {}",
                        panic_message(&*panic)
                    )))
                });
            let _ = done.send(TaskOutcome::Generated(result));
        });
    }

    fn stop(&mut self) {
        if !self.generating {
            debug!("stop received with no generation in flight; ignoring");
            return;
        }
        self.interrupt.interrupt();
        // Acknowledges the request; the generation may still be unwinding.
        self.set_phase(Phase::Ready);
    }

    fn finish(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Loaded(Ok(())) => {
                self.load_state = LoadState::Loaded;
                info!(model = self.runtime.model_name(), "model ready");
                self.set_phase(Phase::Ready);
            }
            TaskOutcome::Loaded(Err(e)) => {
                self.load_state = LoadState::Failed;
                error!(error = %e, "model load failed");
                self.events.emit(Event::SystemMessage(format!(
                    "Fatal error while loading {}: {}",
                    self.runtime.model_name(),
                    e
                )));
                self.events.emit(Event::SystemMessage(self.runtime.support_hint()));
                self.set_phase(Phase::Error);
            }
            TaskOutcome::Generated(result) => {
                match result {
                    Ok(()) => {
                        info!(interrupted = self.interrupt.is_interrupted(), "generation finished");
                    }
                    Err(e) => {
                        error!(error = %e, "generation failed");
                        self.events.log(LogLevel::Error, e.to_string());
                    }
                }
                self.generating = false;
                self.events.emit(Event::GenerationComplete);
                self.set_phase(Phase::Ready);
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Handle to a running worker task.
pub struct WorkerHandle {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| RestyleError::ChannelClosed("worker commands"))
    }

    /// A sender for the controller.
    pub fn commands(&self) -> mpsc::UnboundedSender<Command> {
        self.commands.clone()
    }

    /// Close the command channel and wait for the worker loop to exit.
    pub async fn shutdown(self) {
        drop(self.commands);
        if let Err(e) = self.task.await {
            warn!(error = %e, "worker task did not exit cleanly");
        }
    }
}

/// Spawn a worker on the current tokio runtime.
pub fn spawn_worker(
    runtime: Arc<dyn ModelRuntime>,
    template: ChatTemplate,
) -> (WorkerHandle, mpsc::UnboundedReceiver<Event>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let worker = GenerationWorker::new(runtime, template, EventEmitter::new(event_tx));
    let task = tokio::spawn(worker.run(command_rx));

    (
        WorkerHandle {
            commands: command_tx,
            task,
        },
        event_rx,
    )
}
