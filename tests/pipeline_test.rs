//! Integration tests: PGN through the coordinator and pipeline into a
//! JSON-lines sink.

#![cfg(unix)]

mod common;

use blunder_worker::classify::{CpLossCategory, ErrorType};
use blunder_worker::engine::CoordinatorConfig;
use blunder_worker::games::load_games;
use blunder_worker::pipeline::{BlunderPipeline, PipelineConfig};
use blunder_worker::sink::JsonLinesSink;
use blunder_worker::{BlunderPuzzle, WorkerError};
use common::FakeEngines;

const GAME: &str = r#"[Event "Casual"]
[White "Ana"]
[Black "Bo"]
[Result "*"]

1. d4 d5 2. c4 e6 3. Nc3 Nf6 4. Bg5 Be7 *
"#;

fn config(skip: usize) -> PipelineConfig {
    PipelineConfig {
        depth: 6,
        blunder_threshold_cp: 200,
        opening_skip_plies: skip,
        abort_on_timeout: false,
    }
}

#[tokio::test]
async fn test_pgn_to_json_lines() {
    let engines = FakeEngines::new();
    let coordinator =
        common::coordinator(engines.flat("stockfish"), CoordinatorConfig::default()).await;

    let games = load_games("casual", GAME);
    assert_eq!(games.len(), 1);
    let game = &games[0];
    assert_eq!(game.sequence.ply_count(), 8);

    let pipeline = BlunderPipeline::new(&coordinator, config(4));
    let mut sink = JsonLinesSink::new(Vec::new());
    let report = pipeline.run(&game.id, &game.sequence, &mut sink).await.unwrap();

    // +300 for the side to move flips every ply: each move costs its mover 600
    assert_eq!(report.positions_analyzed, 8);
    assert_eq!(report.blunders_found, 4);
    assert_eq!(sink.written(), 4);
    assert!(report.skipped_plies.is_empty());

    let output = String::from_utf8(sink.into_inner()).unwrap();
    let puzzles: Vec<BlunderPuzzle> = output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    let ids: Vec<&str> = puzzles.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["casual-1_m4", "casual-1_m5", "casual-1_m6", "casual-1_m7"]);

    for puzzle in &puzzles {
        assert_eq!(puzzle.centipawn_loss, 600);
        assert_eq!(puzzle.cp_loss_category, CpLossCategory::Medium);
        assert_eq!(puzzle.error_type, ErrorType::Opening);
        assert_eq!(puzzle.move_number as usize, puzzle.ply / 2 + 1);
        // `bestmove (none)` leaves nothing to replay
        assert!(puzzle.solution_move.is_empty());
        assert_eq!(puzzle.eval_best_move, None);
        assert!(puzzle.eval_context.is_some());
    }
    assert_eq!(puzzles[0].blunder_move, "Nc3");
    assert_eq!(puzzles[0].eval_before, 300);
    assert_eq!(puzzles[0].eval_after, -300);

    let json: serde_json::Value = serde_json::from_str(output.lines().next().unwrap()).unwrap();
    assert_eq!(json["sideToMove"], "white");
    assert_eq!(json["errorType"], "opening");

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_whole_game_inside_opening_window() {
    let engines = FakeEngines::new();
    let coordinator =
        common::coordinator(engines.flat("stockfish"), CoordinatorConfig::default()).await;

    let games = load_games("casual", GAME);
    let pipeline = BlunderPipeline::new(&coordinator, config(10));
    let mut sink: Vec<BlunderPuzzle> = Vec::new();
    let report = pipeline
        .run(&games[0].id, &games[0].sequence, &mut sink)
        .await
        .unwrap();

    assert_eq!(report.positions_analyzed, 0);
    assert!(report.puzzles.is_empty());
    assert!(sink.is_empty());

    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_is_fatal_to_the_game() {
    let engines = FakeEngines::new();
    let coordinator =
        common::coordinator(engines.flat("stockfish"), CoordinatorConfig::default()).await;
    coordinator.shutdown().await;

    let games = load_games("casual", GAME);
    let pipeline = BlunderPipeline::new(&coordinator, config(0));
    let err = pipeline
        .run(&games[0].id, &games[0].sequence, &mut Vec::<BlunderPuzzle>::new())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::EngineShutdown));
}
