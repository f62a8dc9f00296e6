//! Blunder worker
//!
//! Replays PGN games, evaluates every position past the opening with a local
//! UCI engine and writes one JSON puzzle per line for each blunder found.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use blunder_worker::config::WorkerConfig;
use blunder_worker::engine::{discover_candidates, AnalysisCoordinator, EngineProcess};
use blunder_worker::error::WorkerError;
use blunder_worker::games::load_games;
use blunder_worker::pipeline::{BlunderPipeline, PipelineReport, SkippedPly};
use blunder_worker::sink::JsonLinesSink;

const USAGE: &str =
    "usage: blunder-worker --pgn <file> [--pgn <file>...] [--out <file>] [--summary <file>]";

struct Args {
    pgn_files: Vec<PathBuf>,
    out: Option<PathBuf>,
    summary: Option<PathBuf>,
}

/// Parse `--pgn <file>` (repeatable), `--out <file>` and `--summary <file>`
fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args {
        pgn_files: Vec::new(),
        out: None,
        summary: None,
    };

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1).map(PathBuf::from);
        match (args[i].as_str(), value) {
            ("--pgn", Some(path)) => parsed.pgn_files.push(path),
            ("--out", Some(path)) => parsed.out = Some(path),
            ("--summary", Some(path)) => parsed.summary = Some(path),
            (flag, _) => anyhow::bail!("unexpected argument {flag:?}\n{USAGE}"),
        }
        i += 2;
    }

    if parsed.pgn_files.is_empty() {
        anyhow::bail!("at least one --pgn <file> is required");
    }
    Ok(parsed)
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GameSummary {
    game_id: String,
    white: String,
    black: String,
    plies: usize,
    positions_analyzed: usize,
    blunders_found: usize,
    skipped_plies: Vec<SkippedPly>,
    truncated_at: Option<usize>,
    elapsed_ms: u64,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunSummary {
    games: usize,
    failed_games: usize,
    puzzles: usize,
    positions_analyzed: usize,
    interrupted: bool,
    elapsed_ms: u64,
    reports: Vec<GameSummary>,
}

impl RunSummary {
    fn record(&mut self, white: &str, black: &str, report: &PipelineReport) {
        self.games += 1;
        self.puzzles += report.puzzles.len();
        self.positions_analyzed += report.positions_analyzed;
        self.reports.push(GameSummary {
            game_id: report.game_id.clone(),
            white: white.to_string(),
            black: black.to_string(),
            plies: report.plies,
            positions_analyzed: report.positions_analyzed,
            blunders_found: report.blunders_found,
            skipped_plies: report.skipped_plies.clone(),
            truncated_at: report.truncated_at,
            elapsed_ms: report.elapsed_ms,
        });
    }
}

fn source_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "games".to_string())
}

/// Resolves on ctrl-c, or SIGTERM on unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "Cannot install SIGTERM handler");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (stderr; stdout may carry puzzles)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    let args = parse_args()?;
    let config = WorkerConfig::load()?;
    info!(
        depth = config.search_depth,
        threshold_cp = config.blunder_threshold_cp,
        skip_plies = config.opening_skip_plies,
        threads = config.engine_threads,
        hash_mb = config.engine_hash_mb,
        "Worker config loaded"
    );

    let candidates = discover_candidates(&config.discovery_context());
    let mut engine = EngineProcess::new(candidates, config.engine_options());
    let engine_path = engine.init(config.handshake_timeout).await?;
    info!(path = %engine_path.display(), pid = ?engine.pid(), "Engine initialized");

    let coordinator = Arc::new(AnalysisCoordinator::start(
        engine,
        config.coordinator_config(),
    )?);

    let signal_task = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Shutdown requested, rejecting pending analysis");
            coordinator.shutdown().await;
        })
    };

    let writer: Box<dyn Write> = match &args.out {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(std::io::stdout()),
    };
    let mut sink = JsonLinesSink::new(BufWriter::new(writer));

    let pipeline = BlunderPipeline::new(coordinator.as_ref(), config.pipeline_config());
    let run_started = std::time::Instant::now();
    let mut summary = RunSummary::default();

    'files: for path in &args.pgn_files {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Cannot read PGN file");
                continue;
            }
        };

        let games = load_games(&source_name(path), &text);
        info!(path = %path.display(), games = games.len(), "Loaded PGN file");

        for game in games {
            match pipeline.run(&game.id, &game.sequence, &mut sink).await {
                Ok(report) => {
                    summary.record(&game.metadata.white, &game.metadata.black, &report)
                }
                Err(WorkerError::EngineShutdown) => {
                    warn!(game_id = %game.id, "Interrupted");
                    summary.interrupted = true;
                    break 'files;
                }
                Err(e) if e.is_fatal() => {
                    error!(game_id = %game.id, error = %e, "Engine failure, stopping run");
                    summary.failed_games += 1;
                    break 'files;
                }
                Err(e) => {
                    error!(game_id = %game.id, error = %e, "Game analysis failed");
                    summary.failed_games += 1;
                }
            }
        }
    }

    coordinator.shutdown().await;
    signal_task.abort();

    summary.elapsed_ms = run_started.elapsed().as_millis() as u64;
    info!(
        games = summary.games,
        failed = summary.failed_games,
        puzzles = summary.puzzles,
        written = sink.written(),
        positions = summary.positions_analyzed,
        elapsed_ms = summary.elapsed_ms,
        "Run complete"
    );

    if let Some(path) = &args.summary {
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(file, &summary)?;
    }

    Ok(())
}
