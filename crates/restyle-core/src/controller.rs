//! UI-side controller.
//!
//! Turns keystrokes into committed lines and `generate` commands, mirrors the
//! worker's status, keeps the conversation history, and rebuilds the
//! stylesheet whenever assistant text changes. It is independent of any
//! rendering library: output goes to a `TerminalSurface` and the stylesheet
//! to a `StyleSink`.

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::protocol::{Command, Event, LogLevel, WorkerLog};
use crate::state::{ChatMessage, ChatRole};
use crate::status::{ModelStatus, Phase, ProgressTracker};
use crate::style::{build_stylesheet, StyleOrder};

pub const PROMPT: &str = "> ";
pub const INTERRUPT_MARKER: &str = "^C";

const DEFAULT_SYSTEM_PROMPT: &str = "You are an assistant living inside a terminal that you can restyle. \
Whenever the user asks to change how the terminal looks, answer briefly and include a fenced ```css code block. \
The terminal understands `color`, `background-color` and `border-color` declarations. \
Keep answers short.";

/// Accepts text written to the transcript, including `\r`, `\n` and
/// backspace (`\x08`) control characters.
pub trait TerminalSurface {
    fn write(&mut self, text: &str);
}

/// Receives the complete stylesheet, replacing whatever was there before.
pub trait StyleSink {
    fn replace_style(&mut self, css: &str);
}

/// Raw key input, already decoded by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Backspace,
    /// Ctrl-C.
    Interrupt,
    Other,
}

/// Instructional messages sent ahead of the history on every generation.
/// They are never shown or stored in the history.
pub fn default_preamble(system_prompt: Option<&str>) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt.unwrap_or(DEFAULT_SYSTEM_PROMPT)),
        ChatMessage::user("Make the text green."),
        ChatMessage::assistant("Switching the text to green.\n\n```css\nbody {\n  color: #00ff66;\n}\n```"),
    ]
}

pub struct ChatController<T: TerminalSurface, S: StyleSink> {
    commands: mpsc::UnboundedSender<Command>,
    terminal: T,
    style: S,
    status: ModelStatus,
    progress: ProgressTracker,
    preamble: Vec<ChatMessage>,
    history: Vec<ChatMessage>,
    /// Live assistant response being streamed.
    response: String,
    awaiting_completion: bool,
    /// Set when the user pressed Ctrl-C during the current generation.
    interrupted: bool,
    line: String,
    style_order: StyleOrder,
    stylesheet: String,
}

impl<T: TerminalSurface, S: StyleSink> ChatController<T, S> {
    pub fn new(
        commands: mpsc::UnboundedSender<Command>,
        terminal: T,
        style: S,
        model_name: &str,
        preamble: Vec<ChatMessage>,
        style_order: StyleOrder,
    ) -> Self {
        Self {
            commands,
            terminal,
            style,
            status: ModelStatus::initializing(model_name),
            progress: ProgressTracker::default(),
            preamble,
            history: Vec::new(),
            response: String::new(),
            awaiting_completion: false,
            interrupted: false,
            line: String::new(),
            style_order,
            stylesheet: String::new(),
        }
    }

    /// Ask the worker to load the model. Called once at startup.
    pub fn start(&mut self) {
        self.send_command(Command::Load);
    }

    pub fn status(&self) -> &ModelStatus {
        &self.status
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn stylesheet(&self) -> &str {
        &self.stylesheet
    }

    pub fn terminal(&self) -> &T {
        &self.terminal
    }

    pub fn terminal_mut(&mut self) -> &mut T {
        &mut self.terminal
    }

    pub fn style_sink(&self) -> &S {
        &self.style
    }

    pub fn is_awaiting_completion(&self) -> bool {
        self.awaiting_completion
    }

    /// A new message may go out only when the model is ready and the last
    /// generation has fully completed.
    pub fn can_send(&self) -> bool {
        self.status.ready() && !self.awaiting_completion
    }

    pub fn handle_key(&mut self, key: Key) {
        match key {
            Key::Interrupt => {
                // One stop per generation; repeats wait for the worker.
                if !self.status.interruptable() || self.interrupted {
                    return;
                }
                self.send_command(Command::Stop);
                self.interrupted = true;
                self.terminal.write(INTERRUPT_MARKER);
                self.terminal.write("\r\n");
                self.draw_prompt();
            }
            _ if !self.status.ready() => {}
            Key::Char(c) if !c.is_control() => {
                self.line.push(c);
                let mut buf = [0u8; 4];
                self.terminal.write(c.encode_utf8(&mut buf));
            }
            Key::Backspace => {
                if self.line.pop().is_some() {
                    self.terminal.write("\x08 \x08");
                }
            }
            Key::Enter => {
                if self.line.is_empty() || !self.can_send() {
                    return;
                }
                self.terminal.write("\r\n");
                let text = std::mem::take(&mut self.line);
                self.send_message(&text);
            }
            Key::Char(_) | Key::Other => {}
        }
    }

    /// Send `text` as the next user turn. Returns `false` (and does nothing)
    /// when not ready.
    pub fn send_message(&mut self, text: &str) -> bool {
        if !self.can_send() {
            debug!("send_message while not ready; ignoring");
            return false;
        }

        let user = ChatMessage::user(text);
        let messages: Vec<ChatMessage> = self
            .preamble
            .iter()
            .chain(self.history.iter())
            .chain(std::iter::once(&user))
            .cloned()
            .collect();

        if !self.send_command(Command::Generate { messages }) {
            return false;
        }

        self.history.push(user);
        self.response.clear();
        self.awaiting_completion = true;
        self.interrupted = false;
        true
    }

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::LoadStart => {
                self.progress.reset();
                let line = format!("Loading {}...", self.status.model_name());
                self.write_line(&line);
            }
            Event::ModelStatus(status) => self.apply_status(status),
            Event::SystemMessage(text) => self.write_line(&text),
            Event::GenerationStream(chunk) => self.on_stream(chunk),
            Event::GenerationComplete => self.on_complete(),
            Event::WorkerLog(log) => forward_worker_log(&log),
        }
    }

    fn apply_status(&mut self, status: ModelStatus) {
        if let Phase::Downloading(pct) = status.phase() {
            if self.progress.advance(pct as f32).is_none() {
                debug!(pct, "dropping stale progress");
                return;
            }
        }

        let was_loading = self.status.phase().is_loading();
        self.status = status;

        if was_loading && self.status.ready() {
            info!(model = self.status.model_name(), "model ready");
            self.write_line("Model ready.");
            self.draw_prompt();
        }
    }

    fn on_stream(&mut self, chunk: String) {
        if !self.awaiting_completion {
            warn!("stream chunk with no generation outstanding");
            return;
        }
        if !self.interrupted {
            self.terminal.write(&to_terminal(&chunk));
        }
        self.response.push_str(&chunk);
        self.refresh_style(true);
    }

    fn on_complete(&mut self) {
        if !self.awaiting_completion {
            warn!("generation_complete with no generation outstanding");
            return;
        }

        let content = std::mem::take(&mut self.response);
        self.history.push(ChatMessage::assistant(content));
        self.awaiting_completion = false;
        self.refresh_style(false);

        // After Ctrl-C the prompt was already redrawn.
        if !self.interrupted {
            self.terminal.write("\r\n");
            self.draw_prompt();
        }
        self.interrupted = false;
    }

    /// Rebuild the stylesheet from finalized replies, plus the live one when
    /// a response is streaming.
    fn refresh_style(&mut self, include_live: bool) {
        let mut replies: Vec<&str> = self
            .history
            .iter()
            .filter(|msg| msg.role == ChatRole::Assistant)
            .map(|msg| msg.content.as_str())
            .collect();
        if include_live {
            replies.push(&self.response);
        }

        let sheet = build_stylesheet(replies, self.style_order);
        self.style.replace_style(&sheet);
        self.stylesheet = sheet;
    }

    fn draw_prompt(&mut self) {
        self.terminal.write(PROMPT);
        if !self.line.is_empty() {
            self.terminal.write(&self.line);
        }
    }

    fn write_line(&mut self, text: &str) {
        self.terminal.write(&to_terminal(text));
        self.terminal.write("\r\n");
    }

    fn send_command(&self, command: Command) -> bool {
        if self.commands.send(command).is_err() {
            error!("worker command channel closed");
            return false;
        }
        true
    }
}

fn to_terminal(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\r\n")
}

fn forward_worker_log(log: &WorkerLog) {
    let timestamp = log.timestamp.to_rfc3339();
    match log.level {
        LogLevel::Debug => debug!(target: "restyle::worker", %timestamp, "{}", log.message),
        LogLevel::Info => info!(target: "restyle::worker", %timestamp, "{}", log.message),
        LogLevel::Warn => warn!(target: "restyle::worker", %timestamp, "{}", log.message),
        LogLevel::Error => error!(target: "restyle::worker", %timestamp, "{}", log.message),
    }
}
