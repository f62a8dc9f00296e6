//! Chess rules boundary for the blunder worker: PGN extraction and replay.

pub mod game_data;
pub mod pgn;
pub mod replay;

pub use replay::{GamePositionSequence, PlayedMove, ReplayAborted, ReplayError, Side};
