//! Worker error types

use std::path::PathBuf;

use chess_core::ReplayError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No usable engine found (tried: {})", format_paths(.attempted))]
    EngineNotFound { attempted: Vec<PathBuf> },

    #[error("Engine handshake timed out after {timeout_ms} ms: {}", .path.display())]
    HandshakeTimeout { path: PathBuf, timeout_ms: u64 },

    #[error("Analysis timed out after {elapsed_ms} ms (depth {depth}): {fen}")]
    AnalysisTimeout {
        fen: String,
        depth: u32,
        elapsed_ms: u64,
    },

    #[error("Engine process crashed: {0}")]
    ProcessCrashed(String),

    #[error("Engine is shutting down")]
    EngineShutdown,

    #[error("No engine process is running")]
    EngineNotRunning,

    #[error("Replay error: {0}")]
    Replay(#[from] ReplayError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    /// Errors after which no further analysis on the same engine can succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WorkerError::ProcessCrashed(_)
                | WorkerError::EngineShutdown
                | WorkerError::EngineNotRunning
                | WorkerError::EngineNotFound { .. }
        )
    }
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_not_found_lists_every_path() {
        let err = WorkerError::EngineNotFound {
            attempted: vec![PathBuf::from("/a/stockfish"), PathBuf::from("stockfish")],
        };
        assert_eq!(
            err.to_string(),
            "No usable engine found (tried: /a/stockfish, stockfish)"
        );
    }

    #[test]
    fn test_fatality() {
        assert!(WorkerError::ProcessCrashed("eof".into()).is_fatal());
        assert!(WorkerError::EngineShutdown.is_fatal());
        assert!(!WorkerError::AnalysisTimeout {
            fen: "x".into(),
            depth: 18,
            elapsed_ms: 5
        }
        .is_fatal());
    }
}
