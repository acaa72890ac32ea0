#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use restyle_core::runtime::{ProgressSink, TokenSink};
use restyle_core::{
    Event, GenerationOptions, InterruptToken, LoadProgress, ModelRuntime, RestyleError, Result,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

pub const MODEL: &str = "scripted";

/// In-memory model that replays canned progress and replies.
pub struct ScriptedRuntime {
    pub progress: Vec<f32>,
    pub fail_load: Option<String>,
    pub panic_on_load: bool,
    pub replies: Mutex<Vec<Reply>>,
    pub prompts: Mutex<Vec<String>>,
}

#[derive(Clone)]
pub enum Reply {
    /// Emit each fragment in turn.
    Tokens(Vec<&'static str>),
    /// Emit one fragment, then keep going until interrupted.
    UntilInterrupted(&'static str),
    /// Emit the fragments, then fail.
    Fail(Vec<&'static str>, &'static str),
    /// Emit one fragment, then panic.
    Panic(&'static str),
}

impl ScriptedRuntime {
    pub fn new(progress: Vec<f32>) -> Self {
        Self {
            progress,
            fail_load: None,
            panic_on_load: false,
            replies: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_load: Some(message.to_string()),
            ..Self::new(vec![5.0])
        }
    }

    pub fn panicking_load() -> Self {
        Self {
            panic_on_load: true,
            ..Self::new(vec![20.0])
        }
    }

    pub fn reply(self, reply: Reply) -> Self {
        self.replies.lock().unwrap().push(reply);
        self
    }

    fn next_reply(&self) -> Reply {
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            Reply::Tokens(vec![])
        } else {
            replies.remove(0)
        }
    }
}

#[async_trait]
impl ModelRuntime for ScriptedRuntime {
    fn model_name(&self) -> &str {
        MODEL
    }

    async fn load(&self, progress: &mut ProgressSink<'_>) -> Result<()> {
        for pct in &self.progress {
            progress(LoadProgress::new("download", *pct));
            tokio::task::yield_now().await;
        }
        if self.panic_on_load {
            panic!("weights file is corrupt");
        }
        match &self.fail_load {
            Some(message) => Err(RestyleError::Load(message.clone())),
            None => Ok(()),
        }
    }

    async fn generate(
        &self,
        prompt: &str,
        _options: &GenerationOptions,
        interrupt: &InterruptToken,
        sink: &mut TokenSink<'_>,
    ) -> Result<()> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        match self.next_reply() {
            Reply::Tokens(tokens) => {
                for token in tokens {
                    if interrupt.is_interrupted() {
                        return Ok(());
                    }
                    sink(token.to_string());
                    tokio::task::yield_now().await;
                }
                Ok(())
            }
            Reply::UntilInterrupted(first) => {
                sink(first.to_string());
                while !interrupt.is_interrupted() {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
                Ok(())
            }
            Reply::Panic(first) => {
                sink(first.to_string());
                tokio::task::yield_now().await;
                panic!("decoder state corrupted");
            }
            Reply::Fail(tokens, message) => {
                for token in tokens {
                    sink(token.to_string());
                }
                Err(RestyleError::Generation(message.to_string()))
            }
        }
    }

    fn support_hint(&self) -> String {
        "Restart the scripted backend.".to_string()
    }
}

/// Receive the next event or panic after a generous timeout.
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Collect events up to and including the first one matching `until`.
pub async fn collect_until(
    events: &mut mpsc::UnboundedReceiver<Event>,
    until: impl Fn(&Event) -> bool,
) -> Vec<Event> {
    let mut seen = Vec::new();
    loop {
        let event = next_event(events).await;
        let done = until(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

/// Assert nothing else arrives for a short while.
pub async fn assert_quiet(events: &mut mpsc::UnboundedReceiver<Event>) {
    if let Ok(Some(event)) = timeout(Duration::from_millis(50), events.recv()).await {
        panic!("unexpected event: {event:?}");
    }
}

pub fn labels(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .map(|event| match event {
            Event::ModelStatus(status) => status.label(),
            other => other.kind().to_string(),
        })
        .collect()
}

pub fn is_ready(event: &Event) -> bool {
    matches!(event, Event::ModelStatus(status) if status.ready())
}

pub fn is_error_status(event: &Event) -> bool {
    matches!(event, Event::ModelStatus(status) if status.label() == "ERROR")
}
