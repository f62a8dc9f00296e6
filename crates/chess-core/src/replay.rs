//! Game replay: turns raw SAN tokens into a validated position sequence.
//!
//! This is the only place that touches chess rules; everything downstream
//! treats FEN strings as opaque.

use serde::{Deserialize, Serialize};
use shakmaty::{
    fen::Fen, san::SanPlus, uci::UciMove, CastlingMode, Chess, Color, EnPassantMode, Position,
};
use thiserror::Error;

pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    #[error("Invalid FEN {fen:?}: {reason}")]
    InvalidFen { fen: String, reason: String },

    #[error("Illegal move {mv} in position {fen}")]
    IllegalMove { mv: String, fen: String },

    #[error("Sequence needs N+1 positions for N moves (got {positions} positions, {moves} moves)")]
    LengthMismatch { positions: usize, moves: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    /// Read the side-to-move field of a FEN without validating the rest.
    /// Defaults to white when the field is missing.
    pub fn from_fen(fen: &str) -> Side {
        match fen.split_whitespace().nth(1) {
            Some("b") => Side::Black,
            _ => Side::White,
        }
    }
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::White => f.write_str("white"),
            Side::Black => f.write_str("black"),
        }
    }
}

/// One move of the validated prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayedMove {
    /// Move as written in the source (SAN)
    pub san: String,
    /// Same move in UCI notation
    pub uci: String,
    /// Side that played the move
    pub side: Side,
}

/// Where and why replay stopped early
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayAborted {
    pub ply: usize,
    pub token: String,
    pub reason: String,
}

/// Ordered positions of one game: `positions[i]` is the position before
/// `moves[i]`, `positions[i + 1]` the position after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamePositionSequence {
    pub positions: Vec<String>,
    pub moves: Vec<PlayedMove>,
    /// Set when the raw move list was cut at an illegal or unparseable token
    pub aborted: Option<ReplayAborted>,
}

impl GamePositionSequence {
    /// Build a sequence from already-replayed parts, checking the N+1/N shape.
    pub fn from_parts(
        positions: Vec<String>,
        moves: Vec<PlayedMove>,
    ) -> Result<Self, ReplayError> {
        if positions.len() != moves.len() + 1 {
            return Err(ReplayError::LengthMismatch {
                positions: positions.len(),
                moves: moves.len(),
            });
        }
        Ok(Self {
            positions,
            moves,
            aborted: None,
        })
    }

    pub fn ply_count(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }
}

fn load_position(fen: &str) -> Result<Chess, ReplayError> {
    let invalid = |reason: String| ReplayError::InvalidFen {
        fen: fen.to_string(),
        reason,
    };
    let parsed: Fen = fen.parse().map_err(|e| invalid(format!("{e}")))?;
    parsed
        .into_position::<Chess>(CastlingMode::Standard)
        .map_err(|e| invalid(format!("{e}")))
}

fn to_fen(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}

/// Replay SAN tokens from `start_fen` (standard start when `None`).
///
/// Stops at the first token that does not parse or is not legal and records
/// it in [`GamePositionSequence::aborted`]; that is never an error. Only an
/// invalid starting FEN fails.
pub fn replay_san(
    start_fen: Option<&str>,
    tokens: &[String],
) -> Result<GamePositionSequence, ReplayError> {
    let mut pos = load_position(start_fen.unwrap_or(STARTING_FEN))?;
    let mut positions = vec![to_fen(&pos)];
    let mut moves = Vec::with_capacity(tokens.len());
    let mut aborted = None;

    for (ply, token) in tokens.iter().enumerate() {
        let clean = token.trim_end_matches(['!', '?']);
        let san = match clean.parse::<SanPlus>() {
            Ok(san) => san.san,
            Err(e) => {
                aborted = Some(ReplayAborted {
                    ply,
                    token: token.clone(),
                    reason: format!("unparseable: {e}"),
                });
                break;
            }
        };
        let mv = match san.to_move(&pos) {
            Ok(mv) => mv,
            Err(e) => {
                aborted = Some(ReplayAborted {
                    ply,
                    token: token.clone(),
                    reason: format!("illegal: {e}"),
                });
                break;
            }
        };

        let side = Side::from(pos.turn());
        let uci = mv.to_uci(CastlingMode::Standard).to_string();
        pos.play_unchecked(mv);

        moves.push(PlayedMove {
            san: clean.to_string(),
            uci,
            side,
        });
        positions.push(to_fen(&pos));
    }

    Ok(GamePositionSequence {
        positions,
        moves,
        aborted,
    })
}

/// Play a UCI move on a FEN and return the resulting FEN.
pub fn apply_uci(fen: &str, uci: &str) -> Result<String, ReplayError> {
    let pos = load_position(fen)?;
    let illegal = || ReplayError::IllegalMove {
        mv: uci.to_string(),
        fen: fen.to_string(),
    };
    let parsed: UciMove = uci.parse().map_err(|_| illegal())?;
    let mv = parsed.to_move(&pos).map_err(|_| illegal())?;
    let next = pos.play(mv).map_err(|_| illegal())?;
    Ok(to_fen(&next))
}

/// True when `uci` is a legal move in `fen`.
pub fn is_legal_uci(fen: &str, uci: &str) -> bool {
    apply_uci(fen, uci).is_ok()
}
