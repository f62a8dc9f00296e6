//! Blunder classification: pure functions only
//! (No engine, process or game dependencies)

use chess_core::Side;
use serde::{Deserialize, Serialize};

use crate::engine::Score;

/// What a forced mate is worth when it is gained or thrown away
pub const MATE_LOSS_VALUE: i32 = 2000;

/// Opening moves (full moves, not plies) for the `opening` error type
const OPENING_MOVE_LIMIT: u32 = 10;

/// Above this a loss counts as `tactical` rather than `positional`
const TACTICAL_LOSS: i32 = 1000;

const CATEGORY_MEDIUM: i32 = 500;
const CATEGORY_LARGE: i32 = 1000;
const CATEGORY_CRITICAL: i32 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpLossCategory {
    Small,
    Medium,
    Large,
    Critical,
}

impl CpLossCategory {
    pub fn from_loss(centipawn_loss: i32) -> Self {
        if centipawn_loss >= CATEGORY_CRITICAL {
            CpLossCategory::Critical
        } else if centipawn_loss >= CATEGORY_LARGE {
            CpLossCategory::Large
        } else if centipawn_loss >= CATEGORY_MEDIUM {
            CpLossCategory::Medium
        } else {
            CpLossCategory::Small
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    MissedMate,
    Opening,
    Tactical,
    Positional,
}

/// Centipawns from `mover`'s side, clamped below the mate value so a huge
/// material edge never outranks an actual mate.
fn mover_cp(cp: i32, mover: Side) -> i32 {
    let pov = match mover {
        Side::White => cp,
        Side::Black => cp.saturating_neg(),
    };
    pov.clamp(-MATE_LOSS_VALUE, MATE_LOSS_VALUE)
}

/// Loss the mover suffered going from `before` (best play) to `after` (the
/// move actually played). Never negative.
///
/// Two centipawn scores are diffed directly. Anything involving a mate goes
/// through the table below; mate magnitudes are never subtracted.
///
/// | before            | after             | loss                          |
/// |-------------------|-------------------|-------------------------------|
/// | mate for mover    | mate for mover    | 0                             |
/// | mate for mover    | cp                | MATE_LOSS_VALUE + max(0, -cp) |
/// | mate for mover    | mate for opponent | 2 * MATE_LOSS_VALUE           |
/// | cp                | mate for opponent | MATE_LOSS_VALUE + max(0, cp)  |
/// | cp                | mate for mover    | 0                             |
/// | mate for opponent | anything          | 0                             |
pub fn centipawn_loss(before: Score, after: Score, mover: Side) -> i32 {
    let opponent = mover.opponent();

    let loss = match (before, after) {
        (Score::Centipawns(b), Score::Centipawns(a)) => {
            let b = match mover {
                Side::White => b,
                Side::Black => b.saturating_neg(),
            };
            let a = match mover {
                Side::White => a,
                Side::Black => a.saturating_neg(),
            };
            b.saturating_sub(a)
        }
        // Already lost; nothing left to throw away
        (before, _) if before.mate_for(opponent).is_some() => 0,
        (before, after) if before.mate_for(mover).is_some() => {
            if after.mate_for(mover).is_some() {
                0
            } else if after.mate_for(opponent).is_some() {
                2 * MATE_LOSS_VALUE
            } else {
                let a = match after {
                    Score::Centipawns(cp) => mover_cp(cp, mover),
                    Score::MateIn { .. } => 0,
                };
                MATE_LOSS_VALUE + (-a).max(0)
            }
        }
        (Score::Centipawns(b), after) if after.mate_for(opponent).is_some() => {
            MATE_LOSS_VALUE + mover_cp(b, mover).max(0)
        }
        _ => 0,
    };

    loss.max(0)
}

/// The mover had a forced mate and the played move gave it up.
pub fn is_missed_mate(before: Score, after: Score, mover: Side) -> bool {
    before.mate_for(mover).is_some() && after.mate_for(mover).is_none()
}

/// First match wins: missed mate, opening, tactical, positional.
pub fn classify_error(
    before: Score,
    after: Score,
    mover: Side,
    move_number: u32,
    centipawn_loss: i32,
) -> ErrorType {
    if is_missed_mate(before, after, mover) {
        ErrorType::MissedMate
    } else if move_number <= OPENING_MOVE_LIMIT {
        ErrorType::Opening
    } else if centipawn_loss > TACTICAL_LOSS {
        ErrorType::Tactical
    } else {
        ErrorType::Positional
    }
}

/// Full-move number of a 0-based ply index
pub fn move_number(ply: usize) -> u32 {
    (ply / 2 + 1) as u32
}
