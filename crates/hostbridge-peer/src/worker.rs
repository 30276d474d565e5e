use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hostbridge_frame::{LineCodec, LineConfig, Message, StreamEvent, StreamSource, QUIT_FUNCTION};
use tokio::io::AsyncRead;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout_at, Instant};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, trace, warn};

use crate::error::{PeerError, Result};

/// Verb the worker sends once it has finished cleaning up after `quit`.
pub const CLEANUP_COMPLETE: &str = "cleanup_complete";

/// How long [`WorkerProcess::shutdown`] waits before terminating.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Wait between SIGTERM and SIGKILL.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

const EVENT_BUFFER: usize = 256;

/// How to launch a worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub program: OsString,
    pub args: Vec<OsString>,
    /// Added to the inherited environment.
    pub env: Vec<(OsString, OsString)>,
    pub current_dir: Option<PathBuf>,
    pub grace_period: Duration,
    pub line: LineConfig,
}

impl WorkerConfig {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            current_dir: None,
            grace_period: DEFAULT_GRACE_PERIOD,
            line: LineConfig::default(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_line_config(mut self, line: LineConfig) -> Self {
        self.line = line;
        self
    }
}

/// How a worker ended during [`WorkerProcess::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub status: ExitStatus,
    /// The worker reported `cleanup_complete` before exiting.
    pub cleanup_confirmed: bool,
    /// The worker had to be terminated.
    pub forced: bool,
}

/// A supervised worker process.
///
/// Stdout is framed into [`StreamEvent`]s; stderr lines are delivered as
/// stderr log events. Events arrive on the receiver returned by
/// [`spawn`](Self::spawn). The receiver applies backpressure: if it is not
/// drained the worker eventually blocks on a full pipe.
pub struct WorkerProcess {
    child: Child,
    stdin: Option<FramedWrite<ChildStdin, LineCodec>>,
    cleanup: watch::Receiver<bool>,
    grace_period: Duration,
    program: String,
}

impl WorkerProcess {
    /// Start the worker with piped stdio. Must be called inside a Tokio
    /// runtime. The child is killed if the handle is dropped while it runs.
    pub fn spawn(config: WorkerConfig) -> Result<(Self, mpsc::Receiver<StreamEvent>)> {
        let program = config.program.to_string_lossy().into_owned();

        let mut command = Command::new(&config.program);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &config.env {
            command.env(key, value);
        }
        if let Some(dir) = &config.current_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| PeerError::Spawn {
            program: program.clone(),
            source,
        })?;

        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let (cleanup_tx, cleanup_rx) = watch::channel(false);
        tokio::spawn(pump(
            stdout,
            StreamSource::Stdout,
            config.line.clone(),
            tx.clone(),
            Some(cleanup_tx),
        ));
        tokio::spawn(pump(stderr, StreamSource::Stderr, config.line.clone(), tx, None));

        info!(%program, pid = ?child.id(), "worker started");
        let codec = LineCodec::with_config(StreamSource::Stdout, config.line);
        Ok((
            Self {
                child,
                stdin: Some(FramedWrite::new(stdin, codec)),
                cleanup: cleanup_rx,
                grace_period: config.grace_period,
                program,
            },
            rx,
        ))
    }

    /// OS process id, while the process runs.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// True once the worker has reported `cleanup_complete`.
    pub fn cleanup_confirmed(&self) -> bool {
        *self.cleanup.borrow()
    }

    /// Write a `GSMCMD:` command line to the worker's stdin.
    pub async fn send_command(&mut self, message: &Message) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| PeerError::Disconnected("worker stdin is closed".to_string()))?;
        stdin.send(message).await?;
        trace!(function = %message.function, "sent worker command");
        Ok(())
    }

    /// Ask the worker to clean up and exit.
    pub async fn send_quit(&mut self) -> Result<()> {
        self.send_command(&Message::new(QUIT_FUNCTION)).await
    }

    /// Close the worker's stdin.
    pub fn close_stdin(&mut self) {
        self.stdin.take();
    }

    pub async fn wait(&mut self) -> Result<ExitStatus> {
        let status = self.child.wait().await?;
        info!(program = %self.program, %status, "worker exited");
        Ok(status)
    }

    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        Ok(self.child.try_wait()?)
    }

    /// Send `quit`, wait up to the grace period for `cleanup_complete` or
    /// exit, then terminate.
    pub async fn shutdown(mut self) -> Result<ShutdownReport> {
        if let Some(status) = self.child.try_wait()? {
            return Ok(self.report(status, false));
        }

        if let Err(err) = self.send_quit().await {
            debug!(error = %err, "could not deliver quit to worker");
        }

        let deadline = Instant::now() + self.grace_period;
        let mut cleanup = self.cleanup.clone();
        tokio::select! {
            status = self.child.wait() => {
                let status = status?;
                return Ok(self.report(status, false));
            }
            _ = timeout_at(deadline, cleanup.wait_for(|done| *done)) => {}
        }

        if self.cleanup_confirmed() {
            debug!(program = %self.program, "worker confirmed cleanup");
            if let Ok(status) = timeout_at(deadline, self.child.wait()).await {
                return Ok(self.report(status?, false));
            }
        }

        warn!(
            program = %self.program,
            grace = ?self.grace_period,
            "worker did not exit in time; terminating"
        );
        let status = self.terminate().await?;
        Ok(self.report(status, true))
    }

    async fn terminate(&mut self) -> Result<ExitStatus> {
        if let Some(pid) = self.child.id() {
            if request_termination(pid) {
                if let Ok(status) = tokio::time::timeout(TERMINATE_GRACE, self.child.wait()).await {
                    return Ok(status?);
                }
            }
        }

        self.child.kill().await?;
        Ok(self.child.wait().await?)
    }

    fn report(&self, status: ExitStatus, forced: bool) -> ShutdownReport {
        let report = ShutdownReport {
            status,
            cleanup_confirmed: self.cleanup_confirmed(),
            forced,
        };
        info!(
            program = %self.program,
            %status,
            cleanup_confirmed = report.cleanup_confirmed,
            forced,
            "worker stopped"
        );
        report
    }
}

/// SIGTERM, so the worker can still run its exit handlers.
#[cfg(unix)]
fn request_termination(pid: u32) -> bool {
    #[allow(clippy::cast_possible_wrap)]
    // SAFETY: kill(2) on a child we spawned and have not reaped yet.
    let rc = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
    rc == 0
}

#[cfg(not(unix))]
fn request_termination(_pid: u32) -> bool {
    false
}

fn missing_pipe(name: &str) -> PeerError {
    PeerError::Io(std::io::Error::other(format!("worker {name} was not captured")))
}

/// Frame one worker stream until EOF.
///
/// Events are still drained after the receiver goes away so the worker never
/// blocks on a full pipe.
async fn pump<R>(
    reader: R,
    source: StreamSource,
    line: LineConfig,
    tx: mpsc::Sender<StreamEvent>,
    cleanup: Option<watch::Sender<bool>>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = FramedRead::new(reader, LineCodec::with_config(source, line));
    let mut forwarding = true;
    while let Some(item) = lines.next().await {
        let event = match item {
            Ok(event) => event,
            Err(err) => {
                warn!(%source, error = %err, "worker stream read failed");
                break;
            }
        };

        match &event {
            StreamEvent::Message(message) if message.function == CLEANUP_COMPLETE => {
                if let Some(cleanup) = &cleanup {
                    cleanup.send_replace(true);
                }
            }
            StreamEvent::ParseError { line: raw, reason } => {
                debug!(line = %raw, %reason, "worker message parse error")
            }
            _ => {}
        }

        if forwarding && tx.send(event).await.is_err() {
            debug!(%source, "worker event receiver dropped");
            forwarding = false;
        }
    }
    trace!(%source, "worker stream closed");
}
