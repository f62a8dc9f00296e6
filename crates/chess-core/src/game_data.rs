use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameMetadata {
    pub white: String,
    pub black: String,
    pub result: String, // "1-0", "0-1", "1/2-1/2", "*"
    pub date: Option<String>,
    pub event: Option<String>,
    pub site: Option<String>,
    pub eco: Option<String>,
    /// Starting position when the game was set up from a FEN (`SetUp "1"`)
    pub start_fen: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameData {
    pub metadata: GameMetadata,
    pub moves: Vec<String>, // raw SAN tokens, not yet validated
    pub pgn: String,
}
