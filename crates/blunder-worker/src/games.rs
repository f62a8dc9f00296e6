//! PGN text -> games ready for the pipeline

use chess_core::game_data::GameMetadata;
use chess_core::pgn::{parse_pgn, split_games};
use chess_core::replay::replay_san;
use chess_core::GamePositionSequence;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct LoadedGame {
    /// `<source>-<n>`, 1-based within the source
    pub id: String,
    pub metadata: GameMetadata,
    pub sequence: GamePositionSequence,
}

/// Parse and replay every game in `text`. Games without movetext or with an
/// unusable starting FEN are skipped with a warning.
pub fn load_games(source: &str, text: &str) -> Vec<LoadedGame> {
    let mut games = Vec::new();

    for (index, raw) in split_games(text).iter().enumerate() {
        let id = format!("{}-{}", source, index + 1);

        let Some(game) = parse_pgn(raw) else {
            warn!(id, "No moves in game, skipping");
            continue;
        };

        match replay_san(game.metadata.start_fen.as_deref(), &game.moves) {
            Ok(sequence) => games.push(LoadedGame {
                id,
                metadata: game.metadata,
                sequence,
            }),
            Err(e) => warn!(id, error = %e, "Cannot replay game, skipping"),
        }
    }

    games
}
