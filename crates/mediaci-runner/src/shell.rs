//! Stage execution on the local host.

use crate::runner::{OutputLine, OutputStream, RunnerConfig};
use async_trait::async_trait;
use mediaci_core::ports::{ExecutionRequest, StageExecutor};
use mediaci_core::stage::{BuildResult, StageOutcome};
use mediaci_core::{Error, Result};
use std::collections::VecDeque;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};
use tracing::{debug, info, warn};

/// Runs stage commands as child processes of the orchestrator.
///
/// The request's worker name is only recorded; every command runs on this
/// host, inside `root_dir/<workdir>`.
pub struct ShellStageExecutor {
    config: RunnerConfig,
    output_tx: Option<mpsc::Sender<OutputLine>>,
}

impl ShellStageExecutor {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            output_tx: None,
        }
    }

    /// Also forward every output line to `output_tx`.
    pub fn with_output(mut self, output_tx: mpsc::Sender<OutputLine>) -> Self {
        self.output_tx = Some(output_tx);
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }
}

impl Default for ShellStageExecutor {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}

fn stream_lines<R>(
    reader: R,
    stream: OutputStream,
    tx: mpsc::Sender<OutputLine>,
) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        let mut line_number = 0u32;
        while let Ok(Some(content)) = lines.next_line().await {
            line_number += 1;
            let line = OutputLine {
                stream,
                content,
                line_number,
                timestamp: chrono::Utc::now(),
            };
            if tx.send(line).await.is_err() {
                break;
            }
        }
    })
}

#[async_trait]
impl StageExecutor for ShellStageExecutor {
    async fn execute(&self, request: &ExecutionRequest) -> Result<StageOutcome> {
        let start = std::time::Instant::now();
        let command = &request.command;
        let workdir = self.config.root_dir.join(&command.workdir);

        info!(
            build = %request.build,
            worker = %request.worker,
            step = %command.name,
            workdir = %workdir.display(),
            "Executing {}",
            command.command_line()
        );

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Execution(format!("Failed to spawn {}: {}", command.program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("stderr not captured".to_string()))?;

        let (tx, mut rx) = mpsc::channel::<OutputLine>(256);
        let stdout_handle = stream_lines(stdout, OutputStream::Stdout, tx.clone());
        let stderr_handle = stream_lines(stderr, OutputStream::Stderr, tx);

        let max_lines = self.config.max_log_lines;
        let forward = self.output_tx.clone();
        let step = command.name.clone();
        let collector = tokio::spawn(async move {
            let mut log: VecDeque<String> = VecDeque::new();
            while let Some(line) = rx.recv().await {
                debug!(step = %step, stream = ?line.stream, "{}", line.content);
                if max_lines > 0 {
                    if log.len() == max_lines {
                        log.pop_front();
                    }
                    log.push_back(line.content.clone());
                }
                if let Some(forward) = &forward {
                    let _ = forward.send(line).await;
                }
            }
            log.into_iter().collect::<Vec<_>>().join("\n")
        });

        let wait_result = match self.config.timeout_seconds {
            Some(secs) => match timeout(Duration::from_secs(secs), child.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(step = %command.name, timeout_secs = secs, "Command timed out, killing process");
                    let _ = child.kill().await;
                    return Err(Error::Execution(format!(
                        "{} timed out after {}s",
                        command.name, secs
                    )));
                }
            },
            None => child.wait().await,
        };

        let _ = stdout_handle.await;
        let _ = stderr_handle.await;
        let log = collector.await.unwrap_or_default();

        let status = wait_result
            .map_err(|e| Error::Execution(format!("Failed to wait for process: {}", e)))?;
        let exit_code = status.code();
        let duration_ms = start.elapsed().as_millis() as u64;
        let result = if status.success() {
            BuildResult::Success
        } else {
            BuildResult::Failure
        };

        debug!(step = %command.name, ?exit_code, duration_ms, "Command completed");

        Ok(StageOutcome {
            result,
            exit_code,
            log,
            duration_ms,
        })
    }
}
