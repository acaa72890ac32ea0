pub mod ai;
pub mod config;
pub mod controller;
pub mod error;
pub mod interrupt;
pub mod prompt;
pub mod protocol;
pub mod runtime;
pub mod state;
pub mod status;
pub mod stdio;
pub mod style;
pub mod worker;

// Re-export main types for convenience
pub use ai::OllamaClient;
pub use config::Config;
pub use controller::{default_preamble, ChatController, Key, StyleSink, TerminalSurface};
pub use error::{RestyleError, Result};
pub use interrupt::InterruptToken;
pub use prompt::ChatTemplate;
pub use protocol::{Command, Event, LogLevel, WorkerLog};
pub use runtime::{GenerationOptions, LoadProgress, ModelRuntime};
pub use state::{ChatMessage, ChatRole};
pub use status::{ModelStatus, Phase, ProgressTracker};
pub use style::{build_stylesheet, css_blocks, StyleOrder};
pub use worker::{spawn_worker, GenerationWorker, WorkerHandle};
