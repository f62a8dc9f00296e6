#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use blunder_worker::engine::{
    AnalysisCoordinator, CoordinatorConfig, EngineOptions, EngineProcess,
};
use tempfile::TempDir;

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// After 1. e4, black to move
pub const BLACK_TO_MOVE_FEN: &str =
    "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";

pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Scripted UCI engine. `go depth N` answers with `score cp N` relative to
/// the side to move, except for a few reserved depths:
///
/// * 99: sleeps 2 s before answering (slow search, answers late)
/// * 98: never answers, ignores `stop` (wedged)
/// * 97: exits without answering (crash)
const RESPONSIVE_ENGINE: &str = r#"#!/bin/sh
while IFS= read -r line; do
  case "$line" in
    uci)
      echo "id name FakeFish"
      echo "option name Threads type spin default 1 min 1 max 512"
      echo "uciok"
      ;;
    isready) echo "readyok" ;;
    "go depth 99")
      sleep 2
      echo "info depth 99 score cp 99 pv a2a3"
      echo "bestmove a2a3"
      ;;
    "go depth 98") ;;
    "go depth 97") exit 3 ;;
    "go depth "*)
      d=${line#go depth }
      echo "info string starting search"
      echo "info depth $d seldepth $d score cp $d nodes 10 pv e2e4 e7e5"
      echo "info depth $d currmove e2e4 currmovenumber 1"
      echo "bestmove e2e4 ponder e7e5"
      ;;
    quit) exit 0 ;;
  esac
done
"#;

/// Reads stdin forever and never answers
const SILENT_ENGINE: &str = r#"#!/bin/sh
while IFS= read -r line; do
  :
done
"#;

/// Completes `uci` but never acknowledges `isready`
const NO_READYOK_ENGINE: &str = r#"#!/bin/sh
while IFS= read -r line; do
  case "$line" in
    uci) echo "uciok" ;;
  esac
done
"#;

/// Every search scores +300 for the side to move and has no best move, so
/// from white's view the evaluation flips sign each ply.
const FLAT_ENGINE: &str = r#"#!/bin/sh
while IFS= read -r line; do
  case "$line" in
    uci) echo "uciok" ;;
    isready) echo "readyok" ;;
    "go depth "*)
      d=${line#go depth }
      echo "info depth $d score cp 300"
      echo "bestmove (none)"
      ;;
    quit) exit 0 ;;
  esac
done
"#;

/// Temporary directory of fake engine binaries
pub struct FakeEngines {
    dir: TempDir,
}

impl FakeEngines {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, name: &str, script: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, script).expect("write fake engine");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod fake engine");
        path
    }

    pub fn responsive(&self, name: &str) -> PathBuf {
        self.write(name, RESPONSIVE_ENGINE)
    }

    pub fn silent(&self, name: &str) -> PathBuf {
        self.write(name, SILENT_ENGINE)
    }

    pub fn no_readyok(&self, name: &str) -> PathBuf {
        self.write(name, NO_READYOK_ENGINE)
    }

    pub fn flat(&self, name: &str) -> PathBuf {
        self.write(name, FLAT_ENGINE)
    }

    /// Logs every command it receives to `log`, then behaves like the
    /// responsive engine for the handshake.
    pub fn recording(&self, name: &str, log: &Path) -> PathBuf {
        let script = format!(
            r#"#!/bin/sh
while IFS= read -r line; do
  echo "$line" >> "{log}"
  case "$line" in
    uci) echo "uciok" ;;
    isready) echo "readyok" ;;
    quit) exit 0 ;;
  esac
done
"#,
            log = log.display()
        );
        self.write(name, &script)
    }

    /// A path inside the directory that does not exist
    pub fn missing(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

pub fn options() -> EngineOptions {
    EngineOptions {
        threads: 1,
        hash_mb: 16,
    }
}

pub async fn ready_engine(path: PathBuf) -> EngineProcess {
    let mut engine = EngineProcess::new(vec![path], options());
    engine
        .init(HANDSHAKE_TIMEOUT)
        .await
        .expect("fake engine handshake");
    engine
}

pub async fn coordinator(path: PathBuf, config: CoordinatorConfig) -> AnalysisCoordinator {
    let engine = ready_engine(path).await;
    AnalysisCoordinator::start(engine, config).expect("start coordinator")
}

/// True while `pid` still has a process table entry (zombies included)
#[cfg(target_os = "linux")]
pub fn process_exists(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}
