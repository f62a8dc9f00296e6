//! Per-game blunder pipeline
//!
//! For every ply past the opening window the position before and after the
//! played move are evaluated at one fixed depth. A drop of at least the
//! configured threshold becomes a [`BlunderPuzzle`].

use std::time::Instant;

use chess_core::replay::apply_uci;
use chess_core::{GamePositionSequence, ReplayError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classify::{self, CpLossCategory};
use crate::engine::{AnalysisResult, Evaluator};
use crate::error::WorkerError;
use crate::puzzle::BlunderPuzzle;
use crate::sink::PuzzleSink;

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub depth: u32,
    pub blunder_threshold_cp: i32,
    pub opening_skip_plies: usize,
    /// Treat a per-ply timeout as fatal for the game instead of skipping it
    pub abort_on_timeout: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            depth: crate::config::DEFAULT_SEARCH_DEPTH,
            blunder_threshold_cp: crate::config::DEFAULT_BLUNDER_THRESHOLD_CP,
            opening_skip_plies: crate::config::DEFAULT_OPENING_SKIP_PLIES,
            abort_on_timeout: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedPly {
    pub ply: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub game_id: String,
    pub puzzles: Vec<BlunderPuzzle>,
    /// Successful before/after evaluations (enrichment not counted)
    pub positions_analyzed: usize,
    pub blunders_found: usize,
    pub skipped_plies: Vec<SkippedPly>,
    /// Plies in the validated prefix
    pub plies: usize,
    pub truncated_at: Option<usize>,
    pub elapsed_ms: u64,
    pub started_at: DateTime<Utc>,
}

pub struct BlunderPipeline<'a, E: Evaluator> {
    evaluator: &'a E,
    config: PipelineConfig,
}

impl<'a, E: Evaluator> BlunderPipeline<'a, E> {
    pub fn new(evaluator: &'a E, config: PipelineConfig) -> Self {
        Self { evaluator, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Analyze one game, handing each puzzle to `sink` as soon as it exists.
    pub async fn run<S: PuzzleSink>(
        &self,
        game_id: &str,
        game: &GamePositionSequence,
        sink: &mut S,
    ) -> Result<PipelineReport, WorkerError> {
        if game.positions.len() != game.moves.len() + 1 {
            return Err(ReplayError::LengthMismatch {
                positions: game.positions.len(),
                moves: game.moves.len(),
            }
            .into());
        }

        let started_at = Utc::now();
        let timer = Instant::now();

        if let Some(aborted) = &game.aborted {
            warn!(
                game_id,
                ply = aborted.ply,
                token = %aborted.token,
                reason = %aborted.reason,
                "Move list truncated, analyzing validated prefix only"
            );
        }

        info!(
            game_id,
            plies = game.ply_count(),
            skip = self.config.opening_skip_plies,
            depth = self.config.depth,
            "Starting blunder analysis"
        );

        let mut puzzles = Vec::new();
        let mut skipped_plies = Vec::new();
        let mut positions_analyzed = 0;
        let mut blunders_found = 0;

        for ply in self.config.opening_skip_plies..game.ply_count() {
            let before = match self.evaluate(&game.positions[ply]).await {
                Ok(result) => result,
                Err(e) => {
                    self.skip_or_abort(game_id, ply, e, &mut skipped_plies)?;
                    continue;
                }
            };
            positions_analyzed += 1;

            let after = match self.evaluate(&game.positions[ply + 1]).await {
                Ok(result) => result,
                Err(e) => {
                    self.skip_or_abort(game_id, ply, e, &mut skipped_plies)?;
                    continue;
                }
            };
            positions_analyzed += 1;

            let mover = game.moves[ply].side;
            let loss = classify::centipawn_loss(before.score, after.score, mover);
            if loss < self.config.blunder_threshold_cp {
                continue;
            }

            blunders_found += 1;
            let puzzle = self
                .build_puzzle(game_id, game, ply, &before, &after, loss)
                .await?;
            debug!(
                id = %puzzle.id,
                loss,
                error_type = ?puzzle.error_type,
                "Blunder found"
            );
            sink.accept(&puzzle)?;
            puzzles.push(puzzle);
        }

        sink.flush()?;

        let report = PipelineReport {
            game_id: game_id.to_string(),
            puzzles,
            positions_analyzed,
            blunders_found,
            skipped_plies,
            plies: game.ply_count(),
            truncated_at: game.aborted.as_ref().map(|a| a.ply),
            elapsed_ms: timer.elapsed().as_millis() as u64,
            started_at,
        };

        info!(
            game_id,
            positions_analyzed = report.positions_analyzed,
            blunders_found = report.blunders_found,
            skipped = report.skipped_plies.len(),
            elapsed_ms = report.elapsed_ms,
            "Analysis complete"
        );

        Ok(report)
    }

    async fn evaluate(&self, fen: &str) -> Result<AnalysisResult, WorkerError> {
        self.evaluator.evaluate(fen, self.config.depth).await
    }

    /// A failed ply is skipped unless the error is fatal, or it is a
    /// timeout and `abort_on_timeout` is set.
    fn skip_or_abort(
        &self,
        game_id: &str,
        ply: usize,
        err: WorkerError,
        skipped: &mut Vec<SkippedPly>,
    ) -> Result<(), WorkerError> {
        let is_timeout = matches!(err, WorkerError::AnalysisTimeout { .. });
        if err.is_fatal() || (is_timeout && self.config.abort_on_timeout) {
            return Err(err);
        }
        warn!(game_id, ply, error = %err, "Skipping ply");
        skipped.push(SkippedPly {
            ply,
            reason: err.to_string(),
        });
        Ok(())
    }

    /// Evaluate a position for enrichment. Non-fatal failures become `None`.
    async fn enrich(&self, fen: &str) -> Result<Option<i32>, WorkerError> {
        match self.evaluate(fen).await {
            Ok(result) => Ok(Some(result.evaluation_cp)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                debug!(fen, error = %e, "Enrichment evaluation failed");
                Ok(None)
            }
        }
    }

    async fn build_puzzle(
        &self,
        game_id: &str,
        game: &GamePositionSequence,
        ply: usize,
        before: &AnalysisResult,
        after: &AnalysisResult,
        centipawn_loss: i32,
    ) -> Result<BlunderPuzzle, WorkerError> {
        let played = &game.moves[ply];
        let mover = played.side;
        let fen_before = &game.positions[ply];
        let move_number = classify::move_number(ply);

        let eval_best_move = if before.best_move.is_empty() {
            None
        } else if before.best_move == played.uci {
            Some(after.evaluation_cp)
        } else {
            match apply_uci(fen_before, &before.best_move) {
                Ok(fen) => self.enrich(&fen).await?,
                Err(e) => {
                    debug!(game_id, ply, error = %e, "Best move not playable");
                    None
                }
            }
        };

        let (fen_context, eval_context) = match ply.checked_sub(1) {
            Some(prev) => {
                let fen = &game.positions[prev];
                (Some(fen.clone()), self.enrich(fen).await?)
            }
            None => (None, None),
        };

        let mate_in_moves = before.score.mate_for(mover);
        let opponent_mate_in_moves = after.score.mate_for(mover.opponent());

        Ok(BlunderPuzzle {
            id: BlunderPuzzle::puzzle_id(game_id, ply),
            game_id: game_id.to_string(),
            ply,
            move_number,
            side_to_move: mover,
            fen_before: fen_before.clone(),
            fen_after: game.positions[ply + 1].clone(),
            fen_context,
            blunder_move: played.san.clone(),
            blunder_move_uci: played.uci.clone(),
            solution_move: before.best_move.clone(),
            solution_line: before.principal_variation.clone(),
            centipawn_loss,
            cp_loss_category: CpLossCategory::from_loss(centipawn_loss),
            error_type: classify::classify_error(
                before.score,
                after.score,
                mover,
                move_number,
                centipawn_loss,
            ),
            eval_before: before.evaluation_cp,
            eval_after: after.evaluation_cp,
            eval_best_move,
            eval_context,
            had_mate_available: mate_in_moves.is_some(),
            mate_in_moves,
            blunder_leads_to_mate: opponent_mate_in_moves.is_some(),
            opponent_mate_in_moves,
            search_depth: before.depth_reached,
        })
    }
}
