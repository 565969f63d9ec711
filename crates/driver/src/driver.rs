//! The sequential session driver.

use std::time::Instant;

use serde_json::Value;
use taskwright_agent::Agent;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::protocol::{Mode, Output, ProtocolError, Request, UNKNOWN_REQUEST_ID};

/// Counters for one `serve` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeStats {
    pub requests: usize,
    pub errors: usize,
}

/// Serves requests from a line channel against one warm [`Agent`].
///
/// Requests are handled strictly in order: the next line is read only after
/// the previous request's result line has been written.
pub struct SessionDriver {
    agent: Agent,
}

impl SessionDriver {
    pub fn new(agent: Agent) -> Self {
        Self { agent }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn into_agent(self) -> Agent {
        self.agent
    }

    /// Announce readiness, then serve until `reader` reaches EOF.
    pub async fn serve<R, W>(&mut self, mut reader: R, mut writer: W) -> Result<ServeStats, ProtocolError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        write_output(&mut writer, &Output::Ready).await?;
        info!("Session driver ready");

        let mut stats = ServeStats::default();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }

            let output = match std::str::from_utf8(&buf) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => self.handle_line(line.trim(), &mut writer).await?,
                Err(e) => rejected(UNKNOWN_REQUEST_ID.into(), ProtocolError::InvalidJson(e.to_string())),
            };

            stats.requests += 1;
            if matches!(output, Output::Error { .. }) {
                stats.errors += 1;
            }
            write_output(&mut writer, &output).await?;
        }

        info!(requests = stats.requests, errors = stats.errors, "Input closed, driver stopping");
        Ok(stats)
    }

    /// Handle one non-empty line, streaming events to `writer`, and return
    /// the final result or error line.
    pub async fn handle_line<W>(&mut self, line: &str, writer: &mut W) -> Result<Output, ProtocolError>
    where
        W: AsyncWrite + Unpin,
    {
        let request = match Request::parse(line) {
            Ok(request) => request,
            Err(rejected_line) => return Ok(rejected(rejected_line.request_id, rejected_line.error)),
        };

        let started = Instant::now();
        debug!(request_id = %request.request_id, mode = %request.mode, "Handling request");

        let result = match request.mode {
            Mode::Classify => serde_json::to_value(self.agent.classify(&request.prompt).await),
            Mode::Plan => serde_json::to_value(self.agent.plan(&request.prompt).await),
            Mode::Execute => {
                let answer = self.execute(&request, writer).await?;
                Ok(Value::String(answer))
            }
        };

        info!(
            request_id = %request.request_id,
            mode = %request.mode,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request complete"
        );

        Ok(match result {
            Ok(result) => Output::Result {
                request_id: request.request_id,
                result,
            },
            Err(e) => Output::Error {
                request_id: request.request_id,
                error: e.to_string(),
            },
        })
    }

    /// Run a task while forwarding its events, then reset the session.
    async fn execute<W>(&mut self, request: &Request, writer: &mut W) -> Result<String, ProtocolError>
    where
        W: AsyncWrite + Unpin,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let agent = &mut self.agent;
        let prompt = request.prompt.as_str();

        let run = async move {
            let outcome = agent.execute(prompt, Some(&tx)).await;
            drop(tx);
            outcome
        };
        let forward = async {
            while let Some(event) = rx.recv().await {
                write_output(&mut *writer, &Output::event(&request.request_id, &event)).await?;
            }
            Ok::<_, std::io::Error>(())
        };

        let (outcome, forwarded) = tokio::join!(run, forward);
        self.agent.reset();
        forwarded?;

        if outcome.reason.is_degraded() {
            warn!(request_id = %request.request_id, reason = %outcome.reason, "Task ended without a clean finish");
        }
        Ok(outcome.answer)
    }
}

fn rejected(request_id: Value, error: ProtocolError) -> Output {
    warn!(request_id = %request_id, error = %error, "Rejected input line");
    Output::Error {
        request_id,
        error: error.to_string(),
    }
}

async fn write_output<W>(writer: &mut W, output: &Output) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = output.to_line();
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}
