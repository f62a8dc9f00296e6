//! Worker configuration from environment variables (and `.env` in local dev)

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::engine::discovery::DiscoveryContext;
use crate::engine::{CoordinatorConfig, EngineOptions};
use crate::error::WorkerError;
use crate::pipeline::PipelineConfig;

pub const DEFAULT_SEARCH_DEPTH: u32 = 18;
pub const DEFAULT_BLUNDER_THRESHOLD_CP: i32 = 200;
pub const DEFAULT_OPENING_SKIP_PLIES: usize = 10;
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_ANALYSIS_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_HASH_MB: u32 = 256;

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Explicit engine binary, tried before every discovered location
    pub engine_path: Option<PathBuf>,

    /// Root for the project-local `engines/` directory
    pub project_dir: PathBuf,

    /// Fixed search depth for the whole run
    pub search_depth: u32,

    /// Minimum centipawn loss for a move to become a puzzle
    pub blunder_threshold_cp: i32,

    /// Plies treated as opening theory and never considered
    pub opening_skip_plies: usize,

    /// Per-candidate budget for spawn + UCI handshake
    pub handshake_timeout: Duration,

    /// Per-request budget, measured from submission
    pub analysis_timeout: Duration,

    /// How long to wait for a stale `bestmove` after `stop`
    pub drain_timeout: Duration,

    /// `setoption name Threads`
    pub engine_threads: u32,

    /// `setoption name Hash` (MB)
    pub engine_hash_mb: u32,

    /// Abort the whole game on a single-ply timeout instead of skipping it
    pub abort_on_timeout: bool,
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self, WorkerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, WorkerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let engine_path = lookup("ENGINE_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let project_dir = match lookup("ENGINE_PROJECT_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => env::current_dir()?,
        };

        let default_threads = u32::try_from(num_cpus::get()).unwrap_or(1).max(1);

        let config = Self {
            engine_path,
            project_dir,
            search_depth: parse_or(&lookup, "SEARCH_DEPTH", DEFAULT_SEARCH_DEPTH),
            blunder_threshold_cp: parse_or(
                &lookup,
                "BLUNDER_THRESHOLD_CP",
                DEFAULT_BLUNDER_THRESHOLD_CP,
            ),
            opening_skip_plies: parse_or(&lookup, "OPENING_SKIP_PLIES", DEFAULT_OPENING_SKIP_PLIES),
            handshake_timeout: Duration::from_millis(parse_or(
                &lookup,
                "HANDSHAKE_TIMEOUT_MS",
                DEFAULT_HANDSHAKE_TIMEOUT_MS,
            )),
            analysis_timeout: Duration::from_millis(parse_or(
                &lookup,
                "ANALYSIS_TIMEOUT_MS",
                DEFAULT_ANALYSIS_TIMEOUT_MS,
            )),
            drain_timeout: Duration::from_millis(parse_or(
                &lookup,
                "DRAIN_TIMEOUT_MS",
                DEFAULT_DRAIN_TIMEOUT_MS,
            )),
            engine_threads: parse_or(&lookup, "ENGINE_THREADS", default_threads),
            engine_hash_mb: parse_or(&lookup, "ENGINE_HASH_MB", DEFAULT_HASH_MB),
            abort_on_timeout: parse_or(&lookup, "ABORT_ON_TIMEOUT", false),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), WorkerError> {
        if self.search_depth == 0 {
            return Err(WorkerError::Config("SEARCH_DEPTH must be at least 1".into()));
        }
        if self.blunder_threshold_cp <= 0 {
            return Err(WorkerError::Config(
                "BLUNDER_THRESHOLD_CP must be positive".into(),
            ));
        }
        if self.handshake_timeout.is_zero()
            || self.analysis_timeout.is_zero()
            || self.drain_timeout.is_zero()
        {
            return Err(WorkerError::Config("timeouts must be non-zero".into()));
        }
        Ok(())
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            threads: self.engine_threads,
            hash_mb: self.engine_hash_mb,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            depth: self.search_depth,
            blunder_threshold_cp: self.blunder_threshold_cp,
            opening_skip_plies: self.opening_skip_plies,
            abort_on_timeout: self.abort_on_timeout,
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            analysis_timeout: self.analysis_timeout,
            drain_timeout: self.drain_timeout,
        }
    }

    pub fn discovery_context(&self) -> DiscoveryContext {
        DiscoveryContext::from_env(self.project_dir.clone(), self.engine_path.clone())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, "Unparseable config value, using default");
                default
            }
        },
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<WorkerConfig, WorkerError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("ENGINE_PROJECT_DIR", "/srv/trainer")]).unwrap();
        assert_eq!(config.search_depth, 18);
        assert_eq!(config.blunder_threshold_cp, 200);
        assert_eq!(config.opening_skip_plies, 10);
        assert_eq!(config.handshake_timeout, Duration::from_millis(5_000));
        assert_eq!(config.analysis_timeout, Duration::from_millis(120_000));
        assert_eq!(config.engine_hash_mb, 256);
        assert!(config.engine_threads >= 1);
        assert!(!config.abort_on_timeout);
        assert!(config.engine_path.is_none());
        assert_eq!(config.project_dir, PathBuf::from("/srv/trainer"));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("ENGINE_PATH", "/opt/sf/stockfish"),
            ("SEARCH_DEPTH", "12"),
            ("BLUNDER_THRESHOLD_CP", "100"),
            ("OPENING_SKIP_PLIES", "4"),
            ("ANALYSIS_TIMEOUT_MS", "3000"),
            ("ENGINE_THREADS", "2"),
            ("ABORT_ON_TIMEOUT", "true"),
        ])
        .unwrap();
        assert_eq!(config.engine_path, Some(PathBuf::from("/opt/sf/stockfish")));
        assert_eq!(config.search_depth, 12);
        assert_eq!(config.opening_skip_plies, 4);
        assert_eq!(config.analysis_timeout, Duration::from_secs(3));
        assert!(config.abort_on_timeout);

        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.depth, 12);
        assert_eq!(pipeline.blunder_threshold_cp, 100);
        assert_eq!(config.engine_options().threads, 2);
    }

    #[test]
    fn test_garbage_falls_back_to_default() {
        let config = load(&[("SEARCH_DEPTH", "deep"), ("ENGINE_HASH_MB", "-4")]).unwrap();
        assert_eq!(config.search_depth, DEFAULT_SEARCH_DEPTH);
        assert_eq!(config.engine_hash_mb, DEFAULT_HASH_MB);
    }

    #[test]
    fn test_zero_depth_is_rejected() {
        let err = load(&[("SEARCH_DEPTH", "0")]).unwrap_err();
        assert!(matches!(err, WorkerError::Config(_)));
    }

    #[test]
    fn test_zero_timeouts_are_rejected() {
        for key in ["HANDSHAKE_TIMEOUT_MS", "ANALYSIS_TIMEOUT_MS", "DRAIN_TIMEOUT_MS"] {
            let err = load(&[(key, "0")]).unwrap_err();
            assert!(matches!(err, WorkerError::Config(_)), "{key} accepted 0");
        }
    }

    #[test]
    fn test_blank_engine_path_is_ignored() {
        let config = load(&[("ENGINE_PATH", "  ")]).unwrap();
        assert!(config.engine_path.is_none());
    }
}
