//! Request correlation over a single engine process.
//!
//! Callers submit `(fen, depth)` on an unbounded queue. One driver task owns
//! the engine and serves requests strictly in submission order, so at most
//! one search is ever in flight and every `bestmove` belongs to the request
//! at the head of the queue.

use std::future::Future;
use std::time::Duration;

use chess_core::Side;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, trace, warn};

use super::process::EngineProcess;
use super::score::AnalysisResult;
use super::session::{parse_line, EngineEvent, EvaluationScratch};
use crate::error::WorkerError;

#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfig {
    /// Budget per request, counted from submission (queue wait included)
    pub analysis_timeout: Duration,
    /// How long to wait for the stale `bestmove` after `stop`
    pub drain_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            analysis_timeout: Duration::from_secs(120),
            drain_timeout: Duration::from_secs(5),
        }
    }
}

type Completion = oneshot::Sender<Result<AnalysisResult, WorkerError>>;

pub struct AnalysisRequest {
    pub fen: String,
    pub target_depth: u32,
    pub submitted_at: Instant,
    completion: Completion,
}

/// Anything that can turn a position into an evaluation.
///
/// The pipeline only depends on this; the coordinator is the production
/// implementation.
pub trait Evaluator: Send + Sync {
    fn evaluate(
        &self,
        fen: &str,
        depth: u32,
    ) -> impl Future<Output = Result<AnalysisResult, WorkerError>> + Send;
}

pub struct AnalysisCoordinator {
    config: CoordinatorConfig,
    requests: mpsc::UnboundedSender<AnalysisRequest>,
    shutdown: watch::Sender<bool>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl AnalysisCoordinator {
    /// Take ownership of an initialized engine and start serving requests.
    pub fn start(engine: EngineProcess, config: CoordinatorConfig) -> Result<Self, WorkerError> {
        if !engine.is_live() {
            return Err(WorkerError::EngineNotRunning);
        }

        let (requests, queue) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let driver = Driver {
            engine,
            queue,
            shutdown: shutdown_rx,
            drain_timeout: config.drain_timeout,
            crashed: None,
        };
        let handle = tokio::spawn(driver.run());

        Ok(Self {
            config,
            requests,
            shutdown,
            driver: Mutex::new(Some(handle)),
        })
    }

    pub fn config(&self) -> CoordinatorConfig {
        self.config
    }

    /// Evaluate `fen` to `depth`. Waits behind every earlier request.
    pub async fn analyze(&self, fen: &str, depth: u32) -> Result<AnalysisResult, WorkerError> {
        if *self.shutdown.borrow() {
            return Err(WorkerError::EngineShutdown);
        }

        let submitted_at = Instant::now();
        let (completion, response) = oneshot::channel();
        self.requests
            .send(AnalysisRequest {
                fen: fen.to_string(),
                target_depth: depth,
                submitted_at,
                completion,
            })
            .map_err(|_| WorkerError::EngineShutdown)?;

        match timeout_at(submitted_at + self.config.analysis_timeout, response).await {
            Ok(Ok(result)) => result,
            // Driver went away without answering
            Ok(Err(_)) => Err(WorkerError::EngineShutdown),
            Err(_) => Err(WorkerError::AnalysisTimeout {
                fen: fen.to_string(),
                depth,
                elapsed_ms: submitted_at.elapsed().as_millis() as u64,
            }),
        }
    }

    /// Reject everything pending, quit the engine and wait for the driver.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);

        let handle = self.driver.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Analysis driver panicked");
            }
        }
    }
}

impl Evaluator for AnalysisCoordinator {
    fn evaluate(
        &self,
        fen: &str,
        depth: u32,
    ) -> impl Future<Output = Result<AnalysisResult, WorkerError>> + Send {
        self.analyze(fen, depth)
    }
}

/// How one request ended on the driver side
enum Served {
    Done(AnalysisResult),
    Abandoned,
    Shutdown,
    Crashed(String),
}

struct Driver {
    engine: EngineProcess,
    queue: mpsc::UnboundedReceiver<AnalysisRequest>,
    shutdown: watch::Receiver<bool>,
    drain_timeout: Duration,
    /// Set once the engine is unusable; every later request fails with it
    crashed: Option<String>,
}

impl Driver {
    async fn run(mut self) {
        loop {
            let request = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut self.shutdown) => break,
                request = self.queue.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            if self.serve(request).await {
                break;
            }
        }

        self.queue.close();
        let mut rejected = 0;
        while let Ok(request) = self.queue.try_recv() {
            let _ = request.completion.send(Err(WorkerError::EngineShutdown));
            rejected += 1;
        }
        if rejected > 0 {
            info!(rejected, "Rejected queued analysis requests");
        }

        self.engine.quit().await;
    }

    /// Serve one request. Returns true when shutdown was requested mid-search.
    async fn serve(&mut self, mut request: AnalysisRequest) -> bool {
        if let Some(reason) = &self.crashed {
            let _ = request
                .completion
                .send(Err(WorkerError::ProcessCrashed(reason.clone())));
            return false;
        }

        // Caller already timed out while queued
        if request.completion.is_closed() {
            debug!(fen = %request.fen, "Dropping abandoned request before search");
            return false;
        }

        let side_to_move = Side::from_fen(&request.fen);
        let started = Instant::now();

        let served = match self.start_search(&request).await {
            Err(reason) => Served::Crashed(reason),
            Ok(()) => {
                let mut scratch = EvaluationScratch::default();
                loop {
                    tokio::select! {
                        biased;
                        _ = wait_for_shutdown(&mut self.shutdown) => break Served::Shutdown,
                        _ = request.completion.closed() => break Served::Abandoned,
                        line = self.engine.next_line() => {
                            let Some(line) = line else {
                                break Served::Crashed("engine closed its output".into());
                            };
                            match parse_line(&line) {
                                EngineEvent::Info(info) => scratch.observe(&info),
                                EngineEvent::BestMove { best, ponder } => {
                                    break Served::Done(scratch.finish(best, ponder, side_to_move));
                                }
                                _ => trace!(line = line.trim_end(), "Ignoring engine output"),
                            }
                        }
                    }
                }
            }
        };

        match served {
            Served::Done(result) => {
                debug!(
                    fen = %request.fen,
                    depth = result.depth_reached,
                    eval = result.evaluation_cp,
                    best = %result.best_move,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Analysis complete"
                );
                // Caller may have timed out in the meantime
                let _ = request.completion.send(Ok(result));
                false
            }
            Served::Abandoned => {
                warn!(
                    fen = %request.fen,
                    depth = request.target_depth,
                    waited_ms = request.submitted_at.elapsed().as_millis() as u64,
                    "Analysis abandoned by caller, stopping search"
                );
                self.drain_stale_answer().await;
                false
            }
            Served::Shutdown => {
                let _ = request.completion.send(Err(WorkerError::EngineShutdown));
                true
            }
            Served::Crashed(reason) => {
                error!(fen = %request.fen, reason = %reason, "Engine crashed during analysis");
                let _ = request
                    .completion
                    .send(Err(WorkerError::ProcessCrashed(reason.clone())));
                self.crashed = Some(reason);
                self.engine.quit().await;
                false
            }
        }
    }

    async fn start_search(&mut self, request: &AnalysisRequest) -> Result<(), String> {
        let commands = [
            "ucinewgame".to_string(),
            format!("position fen {}", request.fen),
            format!("go depth {}", request.target_depth),
        ];
        for cmd in &commands {
            self.engine
                .send_command(cmd)
                .await
                .map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    /// After `stop`, swallow output up to the orphaned `bestmove` so it can't
    /// be read as the answer to the next request. An engine that never sends
    /// it is considered wedged and killed.
    async fn drain_stale_answer(&mut self) {
        if let Err(e) = self.engine.send_command("stop").await {
            self.mark_crashed(format!("stop failed: {e}")).await;
            return;
        }

        let engine = &mut self.engine;
        let drained = timeout(self.drain_timeout, async {
            while let Some(line) = engine.next_line().await {
                if matches!(parse_line(&line), EngineEvent::BestMove { .. }) {
                    return true;
                }
            }
            false
        })
        .await;

        match drained {
            Ok(true) => debug!("Drained stale bestmove"),
            Ok(false) => self.mark_crashed("engine closed its output".into()).await,
            Err(_) => {
                self.mark_crashed(format!(
                    "no bestmove within {} ms of stop",
                    self.drain_timeout.as_millis()
                ))
                .await
            }
        }
    }

    async fn mark_crashed(&mut self, reason: String) {
        error!(reason = %reason, "Engine unusable, killing it");
        self.crashed = Some(reason);
        self.engine.quit().await;
    }
}

/// Resolves once shutdown is requested or the coordinator is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
