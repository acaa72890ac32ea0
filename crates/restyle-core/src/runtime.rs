//! Boundary to the text-generation backend.
//!
//! The worker only needs two things from a model: load it while reporting
//! progress, and stream tokens for a prompt while honoring an interrupt.

use async_trait::async_trait;

use crate::error::Result;
use crate::interrupt::InterruptToken;

/// One progress callback from the backend during load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadProgress {
    /// Backend-specific stage name, e.g. `initiate`, `download`.
    pub stage: String,
    /// 0.0..=100.0, not guaranteed monotonic.
    pub percent: f32,
}

impl LoadProgress {
    pub fn new(stage: impl Into<String>, percent: f32) -> Self {
        Self {
            stage: stage.into(),
            percent,
        }
    }
}

/// Sampling parameters for a generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub do_sample: bool,
    /// Turn delimiters that end the assistant reply.
    pub stop: Vec<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: 512,
            temperature: 0.7,
            top_p: 0.95,
            do_sample: true,
            stop: Vec::new(),
        }
    }
}

impl GenerationOptions {
    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }
}

pub type ProgressSink<'a> = dyn FnMut(LoadProgress) + Send + 'a;
pub type TokenSink<'a> = dyn FnMut(String) + Send + 'a;

/// A loadable, streaming text-generation model.
#[async_trait]
pub trait ModelRuntime: Send + Sync {
    fn model_name(&self) -> &str;

    /// Fetch and initialize the model, reporting progress as it goes.
    async fn load(&self, progress: &mut ProgressSink<'_>) -> Result<()>;

    /// Stream the completion of `prompt` into `sink`, one fragment per call.
    ///
    /// Implementations must check `interrupt` before emitting each fragment
    /// and return `Ok(())` early once it is set.
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
        interrupt: &InterruptToken,
        sink: &mut TokenSink<'_>,
    ) -> Result<()>;

    /// Shown to the user after a fatal load failure.
    fn support_hint(&self) -> String {
        "Check that the model backend is installed and reachable, then restart.".to_string()
    }
}
