//! Engine process lifecycle: candidate probing, UCI handshake, shutdown.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use super::session::{parse_line, EngineEvent};
use crate::error::WorkerError;

/// Buffered stdout lines between the reader task and the consumer
const LINE_CHANNEL_CAPACITY: usize = 1024;

/// How long `quit` lets the engine exit on its own before killing it
const QUIT_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Internal search threads (`setoption name Threads`)
    pub threads: u32,
    /// Transposition table size in MB (`setoption name Hash`)
    pub hash_mb: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            hash_mb: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Uninitialized,
    Spawning,
    AwaitingUciOk,
    ConfiguringOptions,
    AwaitingReadyOk,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateFailure {
    /// The binary could not be started at all
    SpawnFailed(String),
    /// The handshake did not finish within the per-candidate budget
    TimedOut { reached: HandshakeState },
    /// The process closed its output before `readyok`
    Exited { reached: HandshakeState },
    /// Writing to the process failed
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateState {
    Spawning,
    Handshaking(HandshakeState),
    Succeeded,
    Failed(CandidateFailure),
}

/// What happened to one candidate during the last `init`
#[derive(Debug, Clone)]
pub struct CandidateAttempt {
    pub path: PathBuf,
    pub state: CandidateState,
    pub handshake: HandshakeState,
    pub pid: Option<u32>,
    pub elapsed: Duration,
}

/// Owns the child process and guarantees it is killed on every exit path.
struct ProcessGuard {
    child: Option<Child>,
}

impl ProcessGuard {
    fn spawn(path: &Path) -> std::io::Result<(Self, ChildStdin, ChildStdout)> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let guard = Self { child: Some(child) };

        match (stdin, stdout) {
            (Some(stdin), Some(stdout)) => Ok((guard, stdin, stdout)),
            _ => Err(std::io::Error::other("engine stdio was not piped")),
        }
    }

    fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Give the process `grace` to exit by itself, then kill and reap it.
    async fn terminate(&mut self, grace: Duration) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if !grace.is_zero() && timeout(grace, child.wait()).await.is_ok() {
            return;
        }
        if let Err(e) = child.kill().await {
            debug!(error = %e, "Engine kill failed (already exited?)");
        }
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        // Best-effort synchronous kill in drop
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }
}

/// A spawned engine with its I/O wired up
struct LiveProcess {
    path: PathBuf,
    guard: ProcessGuard,
    stdin: ChildStdin,
    lines: mpsc::Receiver<String>,
    reader: JoinHandle<()>,
}

impl LiveProcess {
    fn spawn(path: &Path) -> std::io::Result<Self> {
        let (guard, stdin, stdout) = ProcessGuard::spawn(path)?;
        let (tx, lines) = mpsc::channel(LINE_CHANNEL_CAPACITY);

        let reader_path = path.display().to_string();
        let reader = tokio::spawn(async move {
            let mut stdout = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match stdout.read_until(b'\n', &mut buf).await {
                    Ok(0) => {
                        debug!(path = %reader_path, "Engine closed stdout");
                        break;
                    }
                    Ok(_) => {
                        // Engines may echo non-UTF-8 paths in `info string`
                        let line = decode_line(&buf);
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(path = %reader_path, error = %e, "Engine read error");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            path: path.to_path_buf(),
            guard,
            stdin,
            lines,
            reader,
        })
    }

    async fn send(&mut self, cmd: &str) -> std::io::Result<()> {
        debug!(cmd, "ENGINE <");
        self.stdin.write_all(format!("{cmd}\n").as_bytes()).await?;
        self.stdin.flush().await
    }

    async fn next_line(&mut self) -> Option<String> {
        let line = self.lines.recv().await?;
        debug!(line = line.trim_end(), "ENGINE >");
        Some(line)
    }

    /// Read until `expected` shows up; `None` from the reader means the
    /// process is gone.
    async fn wait_for(
        &mut self,
        expected: &EngineEvent,
        reached: HandshakeState,
    ) -> Result<(), CandidateFailure> {
        loop {
            let line = self
                .next_line()
                .await
                .ok_or(CandidateFailure::Exited { reached })?;
            if parse_line(&line) == *expected {
                return Ok(());
            }
        }
    }

    async fn terminate(&mut self, grace: Duration) {
        self.guard.terminate(grace).await;
        self.reader.abort();
    }
}

/// Drive the handshake one state at a time. `state` is left at the last
/// state reached so a timeout can report where it stalled.
async fn handshake(
    live: &mut LiveProcess,
    options: &EngineOptions,
    state: &mut HandshakeState,
) -> Result<(), CandidateFailure> {
    let io = |e: std::io::Error| CandidateFailure::Io(e.to_string());

    loop {
        match *state {
            HandshakeState::Uninitialized | HandshakeState::Spawning => {
                live.send("uci").await.map_err(io)?;
                *state = HandshakeState::AwaitingUciOk;
            }
            HandshakeState::AwaitingUciOk => {
                live.wait_for(&EngineEvent::UciOk, *state).await?;
                *state = HandshakeState::ConfiguringOptions;
            }
            HandshakeState::ConfiguringOptions => {
                live.send(&format!("setoption name Threads value {}", options.threads))
                    .await
                    .map_err(io)?;
                live.send(&format!("setoption name Hash value {}", options.hash_mb))
                    .await
                    .map_err(io)?;
                live.send("isready").await.map_err(io)?;
                *state = HandshakeState::AwaitingReadyOk;
            }
            HandshakeState::AwaitingReadyOk => {
                live.wait_for(&EngineEvent::ReadyOk, *state).await?;
                *state = HandshakeState::Ready;
            }
            HandshakeState::Ready => return Ok(()),
            HandshakeState::Failed => {
                return Err(CandidateFailure::Exited {
                    reached: HandshakeState::Failed,
                })
            }
        }
    }
}

/// Spawn one candidate and run the handshake against its deadline. Any
/// failure kills the process before returning.
async fn probe_candidate(
    path: &Path,
    options: &EngineOptions,
    per_candidate_timeout: Duration,
    attempt: &mut CandidateAttempt,
) -> Result<LiveProcess, CandidateFailure> {
    let deadline = Instant::now() + per_candidate_timeout;

    attempt.state = CandidateState::Spawning;
    let mut live =
        LiveProcess::spawn(path).map_err(|e| CandidateFailure::SpawnFailed(e.to_string()))?;
    attempt.pid = live.guard.id();

    let mut state = HandshakeState::Spawning;
    attempt.state = CandidateState::Handshaking(state);
    let outcome = timeout_at(deadline, handshake(&mut live, options, &mut state)).await;
    attempt.handshake = state;

    let failure = match outcome {
        Ok(Ok(())) => return Ok(live),
        Ok(Err(failure)) => failure,
        Err(_) => CandidateFailure::TimedOut { reached: state },
    };
    live.terminate(Duration::ZERO).await;
    attempt.handshake = HandshakeState::Failed;
    Err(failure)
}

/// One engine binary chosen from an ordered candidate list.
///
/// At most one process is live at a time; `init` replaces it and `quit`
/// tears it down.
pub struct EngineProcess {
    candidates: Vec<PathBuf>,
    options: EngineOptions,
    live: Option<LiveProcess>,
    attempts: Vec<CandidateAttempt>,
}

impl EngineProcess {
    pub fn new(candidates: Vec<PathBuf>, options: EngineOptions) -> Self {
        Self {
            candidates,
            options,
            live: None,
            attempts: Vec::new(),
        }
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    /// Per-candidate report of the last `init` call
    pub fn attempts(&self) -> &[CandidateAttempt] {
        &self.attempts
    }

    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    pub fn active_path(&self) -> Option<&Path> {
        self.live.as_ref().map(|l| l.path.as_path())
    }

    pub fn pid(&self) -> Option<u32> {
        self.live.as_ref().and_then(|l| l.guard.id())
    }

    /// Try candidates one after another until one completes the handshake.
    ///
    /// Returns the winning path, or `EngineNotFound` listing every path tried.
    pub async fn init(&mut self, per_candidate_timeout: Duration) -> Result<PathBuf, WorkerError> {
        self.quit().await;

        let mut attempts = Vec::with_capacity(self.candidates.len());

        for path in &self.candidates {
            let started = std::time::Instant::now();
            let mut attempt = CandidateAttempt {
                path: path.clone(),
                state: CandidateState::Spawning,
                handshake: HandshakeState::Uninitialized,
                pid: None,
                elapsed: Duration::ZERO,
            };

            let outcome =
                probe_candidate(path, &self.options, per_candidate_timeout, &mut attempt).await;
            attempt.elapsed = started.elapsed();

            match outcome {
                Ok(live) => {
                    attempt.state = CandidateState::Succeeded;
                    info!(
                        path = %path.display(),
                        pid = ?attempt.pid,
                        elapsed_ms = attempt.elapsed.as_millis() as u64,
                        "Engine ready"
                    );
                    attempts.push(attempt);
                    self.attempts = attempts;
                    self.live = Some(live);
                    return Ok(path.clone());
                }
                Err(failure) => {
                    match &failure {
                        CandidateFailure::SpawnFailed(reason) => {
                            debug!(
                                path = %path.display(),
                                reason = %reason,
                                "Engine candidate not spawnable"
                            );
                        }
                        CandidateFailure::TimedOut { reached } => {
                            let err = WorkerError::HandshakeTimeout {
                                path: path.clone(),
                                timeout_ms: per_candidate_timeout.as_millis() as u64,
                            };
                            warn!(error = %err, ?reached, "Engine candidate failed");
                        }
                        other => {
                            warn!(
                                path = %path.display(),
                                failure = ?other,
                                "Engine candidate failed"
                            );
                        }
                    }
                    attempt.state = CandidateState::Failed(failure);
                    attempts.push(attempt);
                }
            }
        }

        self.attempts = attempts;
        Err(WorkerError::EngineNotFound {
            attempted: self.candidates.clone(),
        })
    }

    /// Write one command line to the live engine.
    pub async fn send_command(&mut self, cmd: &str) -> Result<(), WorkerError> {
        let live = self.live.as_mut().ok_or(WorkerError::EngineNotRunning)?;
        live.send(cmd)
            .await
            .map_err(|e| WorkerError::ProcessCrashed(format!("write to engine failed: {e}")))
    }

    /// Next stdout line, or `None` when no process is live or it closed
    /// its output.
    pub async fn next_line(&mut self) -> Option<String> {
        match self.live.as_mut() {
            Some(live) => live.next_line().await,
            None => None,
        }
    }

    /// Send `quit`, then make sure the process is gone. Safe to call any
    /// number of times.
    pub async fn quit(&mut self) {
        let Some(mut live) = self.live.take() else {
            return;
        };
        if let Err(e) = live.send("quit").await {
            debug!(error = %e, "Engine did not accept quit");
        }
        live.terminate(QUIT_GRACE).await;
        info!(path = %live.path.display(), "Engine stopped");
    }
}

/// One raw output line without its terminator. Invalid UTF-8 is replaced
/// rather than rejected.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
