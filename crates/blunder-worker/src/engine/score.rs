//! Evaluation values produced by the protocol layer.
//!
//! Everything here is from white's point of view. A mate is kept as its own
//! variant and only collapses to a number in [`Score::to_centipawns`].

use chess_core::Side;
use serde::{Deserialize, Serialize};

/// Floor of the saturated magnitude used for mate scores
pub const MATE_SCORE: i32 = 100_000;

/// Mates further away than this all saturate to `MATE_SCORE`
pub const MATE_HORIZON: u32 = 1_000;

/// Score exactly as UCI reports it: relative to the side to move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawScore {
    Cp(i32),
    Mate(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Score {
    /// Positive favors white
    Centipawns(i32),
    /// Forced mate for `winner` in `moves` moves (0 = already mated)
    MateIn { moves: u32, winner: Side },
}

impl Default for Score {
    fn default() -> Self {
        Score::Centipawns(0)
    }
}

impl Score {
    /// Normalize a side-to-move-relative UCI score to white's view.
    ///
    /// `mate N` with `N > 0` means the side to move mates; `N <= 0` means it
    /// is getting mated (`mate 0` on an already-mated position).
    pub fn from_uci(raw: RawScore, side_to_move: Side) -> Self {
        match raw {
            RawScore::Cp(cp) => match side_to_move {
                Side::White => Score::Centipawns(cp),
                Side::Black => Score::Centipawns(cp.saturating_neg()),
            },
            RawScore::Mate(n) => Score::MateIn {
                moves: n.unsigned_abs(),
                winner: if n > 0 {
                    side_to_move
                } else {
                    side_to_move.opponent()
                },
            },
        }
    }

    /// Single-number view: centipawns as-is, mates saturated to
    /// `±(MATE_SCORE + MATE_HORIZON - moves)` so nearer mates rank higher.
    pub fn to_centipawns(self) -> i32 {
        match self {
            Score::Centipawns(cp) => cp,
            Score::MateIn { moves, winner } => {
                let magnitude = MATE_SCORE + (MATE_HORIZON - moves.min(MATE_HORIZON)) as i32;
                match winner {
                    Side::White => magnitude,
                    Side::Black => -magnitude,
                }
            }
        }
    }

    pub fn is_mate(self) -> bool {
        matches!(self, Score::MateIn { .. })
    }

    /// Moves to mate when `side` is the one delivering it.
    pub fn mate_for(self, side: Side) -> Option<u32> {
        match self {
            Score::MateIn { moves, winner } if winner == side => Some(moves),
            _ => None,
        }
    }

    pub fn mate_moves(self) -> u32 {
        match self {
            Score::MateIn { moves, .. } => moves,
            Score::Centipawns(_) => 0,
        }
    }
}

/// Terminal outcome of one analysis request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// White-POV evaluation, saturated for mates
    pub evaluation_cp: i32,
    pub score: Score,
    /// Empty on terminal positions (`bestmove (none)`)
    pub best_move: String,
    pub ponder: Option<String>,
    pub is_mate: bool,
    pub mate_in_moves: u32,
    pub depth_reached: u32,
    pub principal_variation: Vec<String>,
}

impl AnalysisResult {
    pub fn new(
        score: Score,
        best_move: String,
        ponder: Option<String>,
        depth_reached: u32,
        principal_variation: Vec<String>,
    ) -> Self {
        Self {
            evaluation_cp: score.to_centipawns(),
            score,
            best_move,
            ponder,
            is_mate: score.is_mate(),
            mate_in_moves: score.mate_moves(),
            depth_reached,
            principal_variation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centipawns_flip_for_black() {
        assert_eq!(
            Score::from_uci(RawScore::Cp(35), Side::White),
            Score::Centipawns(35)
        );
        assert_eq!(
            Score::from_uci(RawScore::Cp(35), Side::Black),
            Score::Centipawns(-35)
        );
    }

    #[test]
    fn test_mate_winner() {
        assert_eq!(
            Score::from_uci(RawScore::Mate(3), Side::Black),
            Score::MateIn { moves: 3, winner: Side::Black }
        );
        assert_eq!(
            Score::from_uci(RawScore::Mate(-2), Side::Black),
            Score::MateIn { moves: 2, winner: Side::White }
        );
        assert_eq!(
            Score::from_uci(RawScore::Mate(0), Side::White),
            Score::MateIn { moves: 0, winner: Side::Black }
        );
    }

    #[test]
    fn test_mate_saturation() {
        let white_m3 = Score::MateIn { moves: 3, winner: Side::White };
        let white_m10 = Score::MateIn { moves: 10, winner: Side::White };
        let black_m1 = Score::MateIn { moves: 1, winner: Side::Black };

        assert!(white_m3.to_centipawns() >= MATE_SCORE);
        assert!(white_m3.to_centipawns() > white_m10.to_centipawns());
        assert!(black_m1.to_centipawns() <= -MATE_SCORE);

        let far = Score::MateIn { moves: 5_000, winner: Side::White };
        assert_eq!(far.to_centipawns(), MATE_SCORE);
    }

    #[test]
    fn test_result_fields_follow_score() {
        let result = AnalysisResult::new(
            Score::MateIn { moves: 2, winner: Side::White },
            "d1h5".into(),
            None,
            12,
            vec!["d1h5".into()],
        );
        assert!(result.is_mate);
        assert_eq!(result.mate_in_moves, 2);
        assert!(result.evaluation_cp >= MATE_SCORE);

        let quiet = AnalysisResult::new(Score::default(), String::new(), None, 0, vec![]);
        assert!(!quiet.is_mate);
        assert_eq!(quiet.mate_in_moves, 0);
        assert_eq!(quiet.evaluation_cp, 0);
    }

    #[test]
    fn test_mate_for() {
        let score = Score::MateIn { moves: 4, winner: Side::Black };
        assert_eq!(score.mate_for(Side::Black), Some(4));
        assert_eq!(score.mate_for(Side::White), None);
        assert_eq!(Score::Centipawns(900).mate_for(Side::White), None);
    }
}
