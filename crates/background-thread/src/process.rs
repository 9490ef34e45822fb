//! Background runtime hosted in a child process.
//!
//! The entry point names the program to run (or the script handed to a
//! configured interpreter). The child talks [`WireEnvelope`] lines: host
//! messages arrive on its stdin, and every stdout line is dispatched through
//! the [`Bridge`]. stderr is logged. The child exiting on its own is fatal.
//!
//! Writes to stdin happen on a separate task, so a child that stops reading
//! never holds up the manager's command loop.

use std::{process::Stdio, time::Duration};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader},
    process::{Child, ChildStdin, Command},
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, trace, warn};

use crate::{
    TRACE_TARGET_RUNTIME,
    bridge::Bridge,
    envelope::{Payload, WireEnvelope},
    runtime::{BoxError, EntryPoint, Runtime, RuntimeFactory},
};

/// How long output is still dispatched after the child exits. Descendants that
/// inherited stdout can keep the pipe open indefinitely.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default)]
pub struct ProcessRuntimeFactory {
    interpreter: Option<String>,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl ProcessRuntimeFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `interpreter [args..] <entry>` instead of `<entry> [args..]`.
    #[must_use]
    pub fn interpreter(mut self, program: impl Into<String>) -> Self {
        self.interpreter = Some(program.into());
        self
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    fn command(&self, entry: &EntryPoint) -> Command {
        let mut cmd = if let Some(interpreter) = &self.interpreter {
            let mut cmd = Command::new(interpreter);
            cmd.args(&self.args).arg(entry.as_str());
            cmd
        } else {
            let mut cmd = Command::new(entry.as_str());
            cmd.args(&self.args);
            cmd
        };
        cmd.envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait::async_trait]
impl RuntimeFactory for ProcessRuntimeFactory {
    async fn create(
        &self,
        entry: &EntryPoint,
        bridge: Bridge,
    ) -> core::result::Result<Box<dyn Runtime>, BoxError> {
        let program = self.interpreter.as_deref().unwrap_or(entry.as_str());
        let mut child = self
            .command(entry)
            .spawn()
            .map_err(|e| format!("failed to spawn `{program}`: {e}"))?;

        let stdin = child.stdin.take().ok_or("failed to capture stdin")?;
        let stdout = child.stdout.take().ok_or("failed to capture stdout")?;
        let stderr = child.stderr.take().ok_or("failed to capture stderr")?;
        let pid = child.id();
        info!(%entry, program, pid, "Spawned background process");

        tokio::spawn(log_stderr(stderr, pid));
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_stdin(stdin, input_rx, bridge.clone()));
        let reader = tokio::spawn(dispatch_stdout(stdout, bridge.clone()));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let supervisor = tokio::spawn(supervise(child, reader, shutdown_rx, bridge));

        Ok(Box::new(ProcessRuntime {
            input: Some(input_tx),
            writer: Some(writer),
            shutdown: Some(shutdown_tx),
            supervisor: Some(supervisor),
        }))
    }
}

struct ProcessRuntime {
    input: Option<mpsc::UnboundedSender<String>>,
    writer: Option<JoinHandle<()>>,
    shutdown: Option<oneshot::Sender<()>>,
    supervisor: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl Runtime for ProcessRuntime {
    async fn post_message(&mut self, payload: Payload) -> core::result::Result<(), BoxError> {
        let input = self
            .input
            .as_ref()
            .ok_or("background process stdin is closed")?;
        let mut line = WireEnvelope::encode(&payload, None)?;
        line.push('\n');
        input
            .send(line)
            .map_err(|_| "background process stdin is closed")?;
        Ok(())
    }

    async fn shutdown(&mut self) {
        // Lines still queued for stdin are discarded.
        drop(self.input.take());
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(supervisor) = self.supervisor.take()
            && let Err(err) = supervisor.await
        {
            warn!(error = %err, "Background process supervisor failed");
        }
    }
}

async fn write_stdin(
    mut stdin: ChildStdin,
    mut lines: mpsc::UnboundedReceiver<String>,
    bridge: Bridge,
) {
    while let Some(line) = lines.recv().await {
        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        }
        .await;
        if let Err(err) = written {
            bridge.report_error(format!("failed to write to background process: {err}"));
            break;
        }
    }
}

async fn dispatch_stdout(stdout: impl AsyncRead + Unpin, bridge: Bridge) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                trace!(len = line.len(), "Background process emitted line");
                bridge.dispatch(&line);
            }
            Ok(None) => break,
            Err(err) => {
                bridge.report_error(format!("failed to read background process output: {err}"));
                break;
            }
        }
    }
}

async fn log_stderr(stderr: impl AsyncRead + Unpin, pid: Option<u32>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: TRACE_TARGET_RUNTIME, pid, "{line}");
    }
}

async fn supervise(
    mut child: Child,
    mut reader: JoinHandle<()>,
    shutdown: oneshot::Receiver<()>,
    bridge: Bridge,
) {
    tokio::select! {
        status = child.wait() => {
            // Deliver everything the process wrote before it exited.
            if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut reader).await.is_err() {
                warn!("Background process output still open after exit");
                reader.abort();
            }
            let message = match status {
                Ok(status) => format!("background process exited: {status}"),
                Err(err) => format!("failed to wait for background process: {err}"),
            };
            bridge.report_fatal(message);
        }
        _ = shutdown => {
            if let Err(err) = child.kill().await {
                warn!(error = %err, "Failed to kill background process");
            }
            reader.abort();
            debug!("Background process killed");
        }
    }
}
