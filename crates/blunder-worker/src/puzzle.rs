//! Puzzle record produced for every qualifying blunder

use chess_core::Side;
use serde::{Deserialize, Serialize};

use crate::classify::{CpLossCategory, ErrorType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlunderPuzzle {
    /// `<game_id>_m<ply>`
    pub id: String,
    pub game_id: String,
    pub ply: usize,
    pub move_number: u32,
    pub side_to_move: Side,

    /// Position the blunder was played from
    pub fen_before: String,
    pub fen_after: String,
    /// One ply earlier, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fen_context: Option<String>,

    /// Move actually played (SAN and UCI)
    pub blunder_move: String,
    pub blunder_move_uci: String,
    /// Engine's best move from `fen_before` (UCI)
    pub solution_move: String,
    pub solution_line: Vec<String>,

    pub centipawn_loss: i32,
    pub cp_loss_category: CpLossCategory,
    pub error_type: ErrorType,

    /// White-POV evaluations
    pub eval_before: i32,
    pub eval_after: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_best_move: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_context: Option<i32>,

    pub had_mate_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mate_in_moves: Option<u32>,
    pub blunder_leads_to_mate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opponent_mate_in_moves: Option<u32>,

    pub search_depth: u32,
}

impl BlunderPuzzle {
    pub fn puzzle_id(game_id: &str, ply: usize) -> String {
        format!("{}_m{}", game_id, ply)
    }
}
