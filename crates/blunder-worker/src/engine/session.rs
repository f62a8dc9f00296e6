//! UCI output parsing (engine -> us)
//!
//! Parsing is permissive: anything we do not need becomes
//! [`EngineEvent::Ignored`].

use chess_core::Side;

use super::score::{AnalysisResult, RawScore, Score};

/// Structured form of one engine output line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    UciOk,
    ReadyOk,
    Info(InfoLine),
    BestMove {
        /// Empty when the engine reports `(none)`
        best: String,
        ponder: Option<String>,
    },
    Ignored,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoLine {
    pub depth: Option<u32>,
    pub score: Option<RawScore>,
    pub multipv: Option<u32>,
    pub pv: Vec<String>,
}

/// Keywords that end a `pv` run
const INFO_KEYWORDS: &[&str] = &[
    "depth",
    "seldepth",
    "time",
    "nodes",
    "multipv",
    "score",
    "currmove",
    "currmovenumber",
    "hashfull",
    "nps",
    "tbhits",
    "sbhits",
    "cpuload",
    "refutation",
    "currline",
    "wdl",
    "bmc",
    "string",
];

pub fn parse_line(line: &str) -> EngineEvent {
    let line = line.trim();
    let mut tokens = line.split_whitespace();

    match tokens.next() {
        Some("uciok") => EngineEvent::UciOk,
        Some("readyok") => EngineEvent::ReadyOk,
        Some("info") => EngineEvent::Info(parse_info(tokens.collect())),
        Some("bestmove") => {
            let best = match tokens.next() {
                Some("(none)") | Some("0000") | None => String::new(),
                Some(mv) => mv.to_string(),
            };
            let ponder = match (tokens.next(), tokens.next()) {
                (Some("ponder"), Some(mv)) => Some(mv.to_string()),
                _ => None,
            };
            EngineEvent::BestMove { best, ponder }
        }
        _ => EngineEvent::Ignored,
    }
}

fn parse_info(parts: Vec<&str>) -> InfoLine {
    let mut info = InfoLine::default();
    let mut i = 0;

    while i < parts.len() {
        match parts[i] {
            "depth" => {
                info.depth = parts.get(i + 1).and_then(|v| v.parse().ok());
                i += 2;
            }
            "multipv" => {
                info.multipv = parts.get(i + 1).and_then(|v| v.parse().ok());
                i += 2;
            }
            "score" => {
                let value = parts.get(i + 2).and_then(|v| v.parse::<i32>().ok());
                info.score = match (parts.get(i + 1), value) {
                    (Some(&"cp"), Some(v)) => Some(RawScore::Cp(v)),
                    (Some(&"mate"), Some(v)) => Some(RawScore::Mate(v)),
                    _ => info.score,
                };
                // "lowerbound" / "upperbound" fall through as unknown tokens
                i += 3;
            }
            "pv" => {
                i += 1;
                while i < parts.len() && !INFO_KEYWORDS.contains(&parts[i]) {
                    info.pv.push(parts[i].to_string());
                    i += 1;
                }
            }
            // Free text runs to the end of the line
            "string" => break,
            _ => i += 1,
        }
    }

    info
}

/// Last-seen search state for the one in-flight request.
///
/// Created fresh per request and consumed by [`EvaluationScratch::finish`].
#[derive(Debug, Clone, Default)]
pub struct EvaluationScratch {
    depth: u32,
    score: Option<RawScore>,
    pv: Vec<String>,
}

impl EvaluationScratch {
    /// Fold an info line in. Only lines carrying a score for the main line
    /// count; progress lines (`currmove`, `string`, secondary multipv) don't.
    pub fn observe(&mut self, info: &InfoLine) {
        if info.multipv.is_some_and(|n| n != 1) {
            return;
        }
        let Some(score) = info.score else {
            return;
        };
        self.score = Some(score);
        if let Some(depth) = info.depth {
            self.depth = depth;
        }
        if !info.pv.is_empty() {
            self.pv = info.pv.clone();
        }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Turn the scratch into a terminal result. With nothing observed this
    /// is a zero evaluation at depth 0, which is what a finished game yields.
    pub fn finish(
        self,
        best_move: String,
        ponder: Option<String>,
        side_to_move: Side,
    ) -> AnalysisResult {
        let score = self
            .score
            .map(|raw| Score::from_uci(raw, side_to_move))
            .unwrap_or_default();
        AnalysisResult::new(score, best_move, ponder, self.depth, self.pv)
    }
}
