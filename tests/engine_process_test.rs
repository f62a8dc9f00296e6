//! Integration tests: engine discovery, handshake and lifecycle against
//! scripted fake engines.

#![cfg(unix)]

mod common;

use std::time::{Duration, Instant};

use blunder_worker::engine::{
    CandidateFailure, CandidateState, EngineOptions, EngineProcess, HandshakeState,
};
use blunder_worker::error::WorkerError;
use common::FakeEngines;

#[tokio::test]
async fn test_three_candidates_last_one_wins() {
    let engines = FakeEngines::new();
    let missing = engines.missing("stockfish-missing");
    let silent = engines.silent("stockfish-silent");
    let good = engines.responsive("stockfish-good");

    let mut engine = EngineProcess::new(
        vec![missing.clone(), silent.clone(), good.clone()],
        common::options(),
    );
    let chosen = engine.init(Duration::from_millis(300)).await.unwrap();

    assert_eq!(chosen, good);
    assert_eq!(engine.active_path(), Some(good.as_path()));
    assert!(engine.is_live());

    let attempts = engine.attempts();
    assert_eq!(attempts.len(), 3);
    assert_eq!(attempts[0].path, missing);
    assert!(matches!(
        attempts[0].state,
        CandidateState::Failed(CandidateFailure::SpawnFailed(_))
    ));
    assert_eq!(attempts[1].path, silent);
    assert_eq!(
        attempts[1].state,
        CandidateState::Failed(CandidateFailure::TimedOut {
            reached: HandshakeState::AwaitingUciOk
        })
    );
    // Sequential: the silent candidate used up its whole budget
    assert!(attempts[1].elapsed >= Duration::from_millis(250));
    assert_eq!(attempts[2].state, CandidateState::Succeeded);
    assert_eq!(attempts[2].handshake, HandshakeState::Ready);

    engine.quit().await;
}

#[tokio::test]
async fn test_handshake_timeout_fires_on_time_and_reaps_process() {
    let engines = FakeEngines::new();
    let stuck = engines.no_readyok("stockfish-stuck");
    let timeout = Duration::from_millis(400);

    let mut engine = EngineProcess::new(vec![stuck.clone()], common::options());
    let started = Instant::now();
    let err = engine.init(timeout).await.unwrap_err();
    let elapsed = started.elapsed();

    match err {
        WorkerError::EngineNotFound { attempted } => assert_eq!(attempted, vec![stuck]),
        other => panic!("expected EngineNotFound, got {other:?}"),
    }
    assert!(elapsed >= Duration::from_millis(380), "fired early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1_500), "fired late: {elapsed:?}");

    let attempt = &engine.attempts()[0];
    assert_eq!(
        attempt.state,
        CandidateState::Failed(CandidateFailure::TimedOut {
            reached: HandshakeState::AwaitingReadyOk
        })
    );
    assert_eq!(attempt.handshake, HandshakeState::Failed);
    assert!(!engine.is_live());

    #[cfg(target_os = "linux")]
    {
        let pid = attempt.pid.expect("spawned process has a pid");
        assert!(!common::process_exists(pid), "process {pid} left behind");
    }
}

#[tokio::test]
async fn test_engine_exiting_during_handshake() {
    let engines = FakeEngines::new();
    // Answers uci, then closes its output while still reading input
    let quitter = engines.write(
        "stockfish-quitter",
        "#!/bin/sh\nread line\necho uciok\nexec 1>&-\nwhile read line; do :; done\n",
    );

    let mut engine = EngineProcess::new(vec![quitter], common::options());
    let err = engine.init(Duration::from_secs(2)).await.unwrap_err();
    assert!(matches!(err, WorkerError::EngineNotFound { .. }));

    assert_eq!(
        engine.attempts()[0].state,
        CandidateState::Failed(CandidateFailure::Exited {
            reached: HandshakeState::AwaitingReadyOk
        })
    );
}

#[tokio::test]
async fn test_quit_is_idempotent_and_init_works_again() {
    let engines = FakeEngines::new();
    let good = engines.responsive("stockfish");

    let mut engine = common::ready_engine(good).await;
    let first_pid = engine.pid();
    assert!(first_pid.is_some());

    engine.quit().await;
    engine.quit().await;
    assert!(!engine.is_live());
    assert!(matches!(
        engine.send_command("isready").await,
        Err(WorkerError::EngineNotRunning)
    ));

    engine.init(common::HANDSHAKE_TIMEOUT).await.unwrap();
    assert!(engine.is_live());
    assert_ne!(engine.pid(), first_pid);

    engine.send_command("isready").await.unwrap();
    let mut saw_readyok = false;
    while let Some(line) = engine.next_line().await {
        if line.trim() == "readyok" {
            saw_readyok = true;
            break;
        }
    }
    assert!(saw_readyok);

    engine.quit().await;
}

#[tokio::test]
async fn test_handshake_sends_engine_options() {
    let engines = FakeEngines::new();
    let log = engines.path().join("commands.log");
    let recorder = engines.recording("stockfish-rec", &log);

    let mut engine = EngineProcess::new(
        vec![recorder],
        EngineOptions {
            threads: 3,
            hash_mb: 64,
        },
    );
    engine.init(common::HANDSHAKE_TIMEOUT).await.unwrap();
    engine.quit().await;

    let commands: Vec<String> = std::fs::read_to_string(&log)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(
        &commands[..4],
        &[
            "uci",
            "setoption name Threads value 3",
            "setoption name Hash value 64",
            "isready",
        ]
    );
    assert_eq!(commands.last().map(String::as_str), Some("quit"));
}

#[tokio::test]
async fn test_init_replaces_live_process() {
    let engines = FakeEngines::new();
    let good = engines.responsive("stockfish");

    let mut engine = common::ready_engine(good).await;
    let old_pid = engine.pid().unwrap();

    engine.init(common::HANDSHAKE_TIMEOUT).await.unwrap();
    assert_ne!(engine.pid(), Some(old_pid));

    #[cfg(target_os = "linux")]
    assert!(!common::process_exists(old_pid));

    engine.quit().await;
}
