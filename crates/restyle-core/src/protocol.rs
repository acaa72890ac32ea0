//! Messages exchanged between the UI controller and the generation worker.
//!
//! Both directions are one-way, ordered, and JSON-shaped so the worker can be
//! hosted in-process (tokio channels) or out of process (NDJSON over stdio).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::state::ChatMessage;
use crate::status::ModelStatus;

/// UI -> worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Begin loading the model.
    Load,
    /// Run one generation over the full ordered message list.
    Generate { messages: Vec<ChatMessage> },
    /// Request cancellation of the current generation.
    Stop,
}

/// Worker -> UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Event {
    LoadStart,
    ModelStatus(ModelStatus),
    /// Human-readable banner line for the transcript.
    SystemMessage(String),
    /// Next generated text fragment, in emission order.
    GenerationStream(String),
    /// The generation loop ended, for any reason.
    GenerationComplete,
    WorkerLog(WorkerLog),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Structured diagnostic forwarded from the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerLog {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl WorkerLog {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

impl Command {
    pub fn to_json_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line.trim())?)
    }
}

impl Event {
    pub fn to_json_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line.trim())?)
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::LoadStart => "load_start",
            Event::ModelStatus(_) => "model_status",
            Event::SystemMessage(_) => "system_message",
            Event::GenerationStream(_) => "generation_stream",
            Event::GenerationComplete => "generation_complete",
            Event::WorkerLog(_) => "worker_log",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Phase;
    use serde_json::json;

    #[test]
    fn test_command_shapes() {
        assert_eq!(serde_json::to_value(Command::Load).unwrap(), json!({"type": "load"}));
        assert_eq!(serde_json::to_value(Command::Stop).unwrap(), json!({"type": "stop"}));

        let generate = Command::Generate {
            messages: vec![ChatMessage::user("hello")],
        };
        assert_eq!(
            serde_json::to_value(&generate).unwrap(),
            json!({"type": "generate", "messages": [{"role": "user", "content": "hello"}]})
        );
    }

    #[test]
    fn test_event_shapes() {
        assert_eq!(
            serde_json::to_value(Event::GenerationStream("tok".into())).unwrap(),
            json!({"type": "generation_stream", "payload": "tok"})
        );
        assert_eq!(
            serde_json::to_value(Event::GenerationComplete).unwrap(),
            json!({"type": "generation_complete"})
        );
        assert_eq!(
            serde_json::to_value(Event::ModelStatus(ModelStatus::new("m", Phase::Ready))).unwrap(),
            json!({
                "type": "model_status",
                "payload": {"model_name": "m", "status": "READY", "ready": true, "interruptable": false}
            })
        );
    }

    #[test]
    fn test_parse_command_line() {
        let cmd = Command::from_json_line("{\"type\":\"stop\"}\n").unwrap();
        assert_eq!(cmd, Command::Stop);
        assert!(Command::from_json_line("{\"type\":\"explode\"}").is_err());
    }

    #[test]
    fn test_worker_log_parses_back() {
        let event = Event::WorkerLog(WorkerLog::new(LogLevel::Error, "boom"));
        let line = event.to_json_line().unwrap();
        assert!(line.contains("\"level\":\"error\""));
        assert_eq!(Event::from_json_line(&line).unwrap(), event);
    }
}
