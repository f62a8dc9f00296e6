//! Ordered engine binary candidates

use std::env;
use std::path::PathBuf;

/// Executable name without platform suffix
pub const ENGINE_NAME: &str = "stockfish";

const UNIX_INSTALL_DIRS: &[&str] = &[
    "/usr/local/bin",
    "/usr/bin",
    "/usr/games",
    "/opt/homebrew/bin",
    "/opt/local/bin",
];

const WINDOWS_INSTALL_DIRS: &[&str] = &[
    r"C:\Program Files\Stockfish",
    r"C:\Program Files (x86)\Stockfish",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Unix,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }

    fn executable(self) -> String {
        match self {
            Platform::Unix => ENGINE_NAME.to_string(),
            Platform::Windows => format!("{ENGINE_NAME}.exe"),
        }
    }

    fn install_dirs(self) -> &'static [&'static str] {
        match self {
            Platform::Unix => UNIX_INSTALL_DIRS,
            Platform::Windows => WINDOWS_INSTALL_DIRS,
        }
    }
}

/// Everything discovery depends on, captured up front so the order is a
/// pure function of its inputs.
#[derive(Debug, Clone)]
pub struct DiscoveryContext {
    pub override_path: Option<PathBuf>,
    pub project_dir: PathBuf,
    pub home_dir: Option<PathBuf>,
    pub platform: Platform,
}

impl DiscoveryContext {
    pub fn from_env(project_dir: PathBuf, override_path: Option<PathBuf>) -> Self {
        let home_dir = env::var_os("HOME")
            .or_else(|| env::var_os("USERPROFILE"))
            .map(PathBuf::from);
        Self {
            override_path,
            project_dir,
            home_dir,
            platform: Platform::current(),
        }
    }
}

/// Candidate paths in the order they must be tried: explicit override,
/// project-local, platform install dirs, user home, then the bare name
/// (resolved through `PATH` at spawn time).
pub fn discover_candidates(ctx: &DiscoveryContext) -> Vec<PathBuf> {
    let exe = ctx.platform.executable();
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Some(path) = &ctx.override_path {
        candidates.push(path.clone());
    }

    candidates.push(ctx.project_dir.join("engines").join(&exe));

    for dir in ctx.platform.install_dirs() {
        candidates.push(PathBuf::from(dir).join(&exe));
    }

    if let Some(home) = &ctx.home_dir {
        candidates.push(home.join(ENGINE_NAME).join(&exe));
    }

    candidates.push(PathBuf::from(&exe));

    let mut seen = std::collections::HashSet::new();
    candidates.retain(|p| seen.insert(p.clone()));
    candidates
}
