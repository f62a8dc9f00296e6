//! Lightweight regex-based PGN parsing.
//!
//! Only extracts headers and raw SAN tokens. Legality is checked later by
//! [`crate::replay`], which truncates at the first token it cannot play.

use std::sync::OnceLock;

use regex::Regex;

use crate::game_data::{GameData, GameMetadata};

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\[(\w+)\s+"([^"]*)"\]"#).expect("static regex"))
}

fn movetext_noise_re() -> &'static Regex {
    // Headers, {comments} and ;line comments
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[[^\]]*\]|\{[^}]*\}|;[^\n]*").expect("static regex"))
}

fn innermost_variation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\([^()]*\)").expect("static regex"))
}

/// Remove (variations), peeling nested ones from the inside out.
fn strip_variations(movetext: &str) -> String {
    let mut text = movetext.to_string();
    while innermost_variation_re().is_match(&text) {
        text = innermost_variation_re().replace_all(&text, " ").into_owned();
    }
    text
}

fn move_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\.+").expect("static regex"))
}

const RESULT_TOKENS: [&str; 4] = ["1-0", "0-1", "1/2-1/2", "*"];

/// Split a multi-game PGN file into one string per game.
///
/// A new game starts at an `[Event ` header that follows movetext.
pub fn split_games(text: &str) -> Vec<String> {
    let mut games = Vec::new();
    let mut current = String::new();
    let mut seen_movetext = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("[Event ") && seen_movetext {
            games.push(std::mem::take(&mut current));
            seen_movetext = false;
        }
        if !trimmed.is_empty() && !trimmed.starts_with('[') {
            seen_movetext = true;
        }
        current.push_str(line);
        current.push('\n');
    }

    if !current.trim().is_empty() {
        games.push(current);
    }
    games
}

/// Parse a PGN string into a GameData struct.
///
/// Returns `None` when the text carries no movetext at all.
pub fn parse_pgn(pgn: &str) -> Option<GameData> {
    let mut metadata = GameMetadata {
        white: "Unknown".to_string(),
        black: "Unknown".to_string(),
        result: "*".to_string(),
        ..GameMetadata::default()
    };
    let mut setup = false;
    let mut fen = None;

    for cap in header_re().captures_iter(pgn) {
        let value = cap[2].to_string();
        match &cap[1] {
            "White" => metadata.white = value,
            "Black" => metadata.black = value,
            "Result" => metadata.result = value,
            "Date" => metadata.date = Some(value),
            "Event" => metadata.event = Some(value),
            "Site" => metadata.site = Some(value),
            "ECO" => metadata.eco = Some(value),
            "SetUp" => setup = value == "1",
            "FEN" => fen = Some(value),
            _ => {}
        }
    }

    // A FEN header without SetUp is common in exports; honour it either way
    if setup || fen.is_some() {
        metadata.start_fen = fen;
    }

    let moves = extract_moves(pgn);
    if moves.is_empty() {
        return None;
    }

    Some(GameData {
        metadata,
        moves,
        pgn: pgn.to_string(),
    })
}

/// Extract SAN tokens from PGN movetext (after removing headers, comments,
/// variations, move numbers, NAGs and the result marker).
///
/// Tokens are returned as written; an unparseable token is kept so that
/// replay can stop there.
pub fn extract_moves(pgn: &str) -> Vec<String> {
    let movetext = strip_variations(&movetext_noise_re().replace_all(pgn, " "));

    movetext
        .split_whitespace()
        .filter_map(|token| {
            let token = move_number_re().replace(token, "");
            let token = token.trim();
            if token.is_empty() || token.starts_with('$') || RESULT_TOKENS.contains(&token) {
                None
            } else {
                Some(token.to_string())
            }
        })
        .collect()
}

/// Extract a string value from a PGN header (e.g. WhiteElo, Site).
pub fn extract_header(pgn: &str, header_name: &str) -> Option<String> {
    let pattern = format!(r#"\[{}\s+"([^"]*)"\]"#, regex::escape(header_name));
    let re = Regex::new(&pattern).ok()?;
    let value = re.captures(pgn)?.get(1)?.as_str().to_string();
    if value.is_empty() { None } else { Some(value) }
}
