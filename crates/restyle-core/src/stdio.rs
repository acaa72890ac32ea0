//! Newline-delimited JSON bridge for hosting the worker out of process.
//!
//! Commands arrive one per line on the reader, events leave one per line on
//! the writer. The writer is reserved for the protocol; diagnostics belong
//! on stderr.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::prompt::ChatTemplate;
use crate::protocol::{Command, Event, LogLevel, WorkerLog};
use crate::runtime::ModelRuntime;
use crate::worker::spawn_worker;

/// How long to keep forwarding events from tasks still unwinding after the
/// input closed.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

type SharedWriter<W> = Arc<Mutex<BufWriter<W>>>;

/// Serve the worker over this process's stdin and stdout until stdin closes.
pub async fn run_stdio_bridge(runtime: Arc<dyn ModelRuntime>, template: ChatTemplate) -> Result<()> {
    serve(
        runtime,
        template,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

/// Serve the worker over an arbitrary line reader and writer.
pub async fn serve<R, W>(
    runtime: Arc<dyn ModelRuntime>,
    template: ChatTemplate,
    reader: R,
    writer: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer: SharedWriter<W> = Arc::new(Mutex::new(BufWriter::new(writer)));
    let (handle, mut events) = spawn_worker(runtime, template);

    let event_writer = Arc::clone(&writer);
    let forwarder = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Err(e) = write_event(&event_writer, &event).await {
                warn!(error = %e, "failed to write event; stopping event forwarder");
                break;
            }
        }
    });

    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match Command::from_json_line(trimmed) {
            Ok(command) => handle.send(command)?,
            Err(e) => {
                warn!(error = %e, raw_line = %trimmed, "failed to parse command");
                let log = WorkerLog::new(LogLevel::Warn, format!("unparseable command: {e}"));
                write_event(&writer, &Event::WorkerLog(log)).await?;
            }
        }
    }

    info!("input closed; shutting down worker");
    handle.shutdown().await;

    if tokio::time::timeout(DRAIN_TIMEOUT, forwarder).await.is_err() {
        warn!("gave up waiting for in-flight events");
    }
    Ok(())
}

async fn write_event<W: AsyncWrite + Unpin>(writer: &SharedWriter<W>, event: &Event) -> Result<()> {
    let json = match event.to_json_line() {
        Ok(json) => json,
        Err(e) => {
            error!(error = %e, kind = event.kind(), "failed to serialize event; skipping");
            return Ok(());
        }
    };

    let mut w = writer.lock().await;
    w.write_all(json.as_bytes()).await?;
    w.write_all(b"\n").await?;
    w.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{GenerationOptions, ProgressSink, TokenSink};
    use crate::InterruptToken;
    use async_trait::async_trait;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};

    struct Echo;

    #[async_trait]
    impl ModelRuntime for Echo {
        fn model_name(&self) -> &str {
            "echo"
        }

        async fn load(&self, _progress: &mut ProgressSink<'_>) -> Result<()> {
            Ok(())
        }

        async fn generate(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
            _interrupt: &InterruptToken,
            sink: &mut TokenSink<'_>,
        ) -> Result<()> {
            sink("pong".to_string());
            Ok(())
        }
    }

    async fn read_event<R: AsyncBufRead + Unpin>(lines: &mut tokio::io::Lines<R>) -> Event {
        let line = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .expect("timed out")
            .unwrap()
            .expect("stream ended");
        Event::from_json_line(&line).unwrap()
    }

    #[tokio::test]
    async fn test_bridge_round_trip() {
        let (mut commands, command_end) = duplex(4096);
        let (event_end, events) = duplex(4096);
        let bridge = tokio::spawn(serve(
            Arc::new(Echo),
            ChatTemplate::ChatMl,
            BufReader::new(command_end),
            event_end,
        ));
        let mut events = BufReader::new(events).lines();

        commands.write_all(b"{\"type\":\"load\"}\n\n").await.unwrap();
        assert_eq!(read_event(&mut events).await, Event::LoadStart);
        assert_eq!(read_event(&mut events).await.kind(), "model_status");
        let Event::ModelStatus(status) = read_event(&mut events).await else {
            panic!("expected a status");
        };
        assert!(status.ready());

        commands
            .write_all(b"{\"type\":\"generate\",\"messages\":[{\"role\":\"user\",\"content\":\"ping\"}]}\n")
            .await
            .unwrap();
        let mut seen = Vec::new();
        loop {
            let event = read_event(&mut events).await;
            let done = matches!(&event, Event::ModelStatus(s) if s.ready());
            seen.push(event);
            if done {
                break;
            }
        }
        assert!(seen.contains(&Event::GenerationStream("pong".into())));
        assert!(seen.contains(&Event::GenerationComplete));

        drop(commands);
        assert!(bridge.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_bad_line_reports_worker_log() {
        let (mut commands, command_end) = duplex(1024);
        let (event_end, events) = duplex(1024);
        let bridge = tokio::spawn(serve(
            Arc::new(Echo),
            ChatTemplate::ChatMl,
            BufReader::new(command_end),
            event_end,
        ));
        let mut events = BufReader::new(events).lines();

        commands.write_all(b"{\"type\":\"dance\"}\n").await.unwrap();
        match read_event(&mut events).await {
            Event::WorkerLog(log) => {
                assert_eq!(log.level, LogLevel::Warn);
                assert!(log.message.starts_with("unparseable command"));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        drop(commands);
        assert!(bridge.await.unwrap().is_ok());
    }
}
