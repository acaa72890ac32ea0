use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{RestyleError, Result};
use crate::interrupt::InterruptToken;
use crate::runtime::{GenerationOptions, LoadProgress, ModelRuntime, ProgressSink, TokenSink};

#[derive(Serialize)]
struct PullRequest<'a> {
    model: &'a str,
    stream: bool,
}

#[derive(Deserialize, Debug, Default)]
struct PullChunk {
    #[serde(default)]
    status: String,
    digest: Option<String>,
    total: Option<u64>,
    completed: Option<u64>,
    error: Option<String>,
}

#[derive(Serialize)]
struct WarmupRequest<'a> {
    model: &'a str,
    stream: bool,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    raw: bool,
    stream: bool,
    options: RequestOptions,
}

#[derive(Serialize, Debug, PartialEq)]
struct RequestOptions {
    num_predict: u32,
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

impl From<&GenerationOptions> for RequestOptions {
    fn from(options: &GenerationOptions) -> Self {
        Self {
            num_predict: options.max_new_tokens,
            // Ollama has no sampling switch; temperature 0 is greedy decoding.
            temperature: if options.do_sample { options.temperature } else { 0.0 },
            top_p: options.top_p,
            stop: options.stop.clone(),
        }
    }
}

#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    models: Vec<OllamaModel>,
}

/// Model runtime backed by a local Ollama server.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(RestyleError::Generation(format!(
                "Failed to list models: {}",
                response.status()
            )));
        }

        let models_response: OllamaModelsResponse = response.json().await?;
        Ok(models_response
            .models
            .into_iter()
            .map(|model| model.name)
            .collect())
    }

    pub async fn has_model(&self, name: &str) -> Result<bool> {
        let models = self.list_models().await?;
        Ok(models.iter().any(|m| same_model(m, name)))
    }

    async fn pull(&self, progress: &mut ProgressSink<'_>) -> Result<()> {
        let url = format!("{}/api/pull", self.base_url);
        let request = PullRequest {
            model: &self.model,
            stream: true,
        };

        let response = self.client.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(RestyleError::Load(format!(
                "Ollama pull failed with status: {}",
                response.status()
            )));
        }

        let mut stream = response.bytes_stream();
        let mut lines = NdjsonBuffer::default();
        let mut layers = PullProgress::default();

        while let Some(bytes) = stream.next().await {
            for line in lines.push(&bytes?) {
                let chunk: PullChunk = serde_json::from_str(&line)?;
                if let Some(update) = layers.apply(&chunk)? {
                    progress(update);
                }
            }
        }
        if let Some(line) = lines.finish() {
            let chunk: PullChunk = serde_json::from_str(&line)?;
            if let Some(update) = layers.apply(&chunk)? {
                progress(update);
            }
        }

        Ok(())
    }

    /// Ask Ollama to load the weights into memory without generating.
    async fn warm_up(&self) -> Result<()> {
        let url = format!("{}/api/generate", self.base_url);
        let request = WarmupRequest {
            model: &self.model,
            stream: false,
        };

        let response = self.client.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(RestyleError::Load(format!(
                "Ollama could not load {}: {}",
                self.model,
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ModelRuntime for OllamaClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn load(&self, progress: &mut ProgressSink<'_>) -> Result<()> {
        info!(model = %self.model, url = %self.base_url, "pulling model");
        progress(LoadProgress::new("initiate", 0.0));

        let installed = match self.has_model(&self.model).await {
            Ok(installed) => installed,
            Err(e) => {
                warn!(error = %e, "could not list local models");
                false
            }
        };

        let pulled = if installed {
            debug!(model = %self.model, "model already present, skipping pull");
            Ok(())
        } else {
            self.pull(progress).await
        };
        let result = match pulled {
            Ok(()) => self.warm_up().await,
            Err(e) => Err(e),
        };

        result.map_err(|e| match e {
            RestyleError::Load(_) => e,
            other => RestyleError::Load(other.to_string()),
        })?;

        progress(LoadProgress::new("ready", 100.0));
        info!(model = %self.model, "model loaded");
        Ok(())
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
        interrupt: &InterruptToken,
        sink: &mut TokenSink<'_>,
    ) -> Result<()> {
        if interrupt.is_interrupted() {
            return Ok(());
        }

        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            raw: true,
            stream: true,
            options: RequestOptions::from(options),
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(RestyleError::Generation(format!(
                "Ollama request failed with status: {}. Make sure Ollama is running with: ollama serve",
                response.status()
            )));
        }

        let mut stream = response.bytes_stream();
        let mut lines = NdjsonBuffer::default();
        let mut fragments = 0usize;

        while let Some(bytes) = stream.next().await {
            for line in lines.push(&bytes?) {
                if interrupt.is_interrupted() {
                    // Dropping the response closes the connection and Ollama
                    // stops generating.
                    info!(fragments, "generation interrupted");
                    return Ok(());
                }
                if emit_fragment(&line, sink)? {
                    debug!(fragments, "generation done");
                    return Ok(());
                }
                fragments += 1;
            }
        }

        if let Some(line) = lines.finish() {
            if !interrupt.is_interrupted() {
                emit_fragment(&line, sink)?;
            }
        }

        Ok(())
    }

    fn support_hint(&self) -> String {
        format!(
            "Make sure Ollama is running with: ollama serve (expected at {})",
            self.base_url
        )
    }
}

/// Tag names without an explicit version resolve to `:latest`.
fn same_model(installed: &str, wanted: &str) -> bool {
    fn normalize(name: &str) -> String {
        if name.contains(':') {
            name.to_string()
        } else {
            format!("{name}:latest")
        }
    }
    normalize(installed) == normalize(wanted)
}

/// Forward one NDJSON generate line. Returns `true` once the server says done.
fn emit_fragment(line: &str, sink: &mut TokenSink<'_>) -> Result<bool> {
    let chunk: GenerateChunk = serde_json::from_str(line)?;
    if let Some(error) = chunk.error {
        return Err(RestyleError::Generation(error));
    }
    if !chunk.response.is_empty() {
        sink(chunk.response);
    }
    Ok(chunk.done)
}

/// Splits a byte stream into complete newline-terminated lines.
///
/// Bytes are buffered raw so multi-byte characters split across network
/// chunks decode correctly.
#[derive(Debug, Default)]
struct NdjsonBuffer {
    buf: Vec<u8>,
}

impl NdjsonBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                lines.push(text);
            }
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        let text = String::from_utf8_lossy(&rest).trim().to_string();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Aggregates per-layer pull progress into one overall percentage.
#[derive(Debug, Default)]
struct PullProgress {
    layers: HashMap<String, (u64, u64)>,
}

impl PullProgress {
    fn apply(&mut self, chunk: &PullChunk) -> Result<Option<LoadProgress>> {
        if let Some(error) = &chunk.error {
            return Err(RestyleError::Load(error.clone()));
        }

        let (Some(digest), Some(total)) = (&chunk.digest, chunk.total) else {
            debug!(status = %chunk.status, "pull status");
            return Ok(None);
        };
        if total == 0 {
            warn!(%digest, "layer reported zero size");
            return Ok(None);
        }

        let completed = chunk.completed.unwrap_or(0).min(total);
        self.layers.insert(digest.clone(), (completed, total));

        let (done, all): (u64, u64) = self
            .layers
            .values()
            .fold((0, 0), |(d, a), (c, t)| (d + c, a + t));
        let percent = (done as f64 / all as f64 * 100.0) as f32;

        Ok(Some(LoadProgress::new("download", percent)))
    }
}
