//! UCI engine protocol layer
//!
//! `EngineProcess` -> `session` parsing -> `AnalysisCoordinator`. Nothing in
//! here knows about games; positions are opaque FEN strings.

pub mod coordinator;
pub mod discovery;
pub mod process;
pub mod score;
pub mod session;

pub use coordinator::{AnalysisCoordinator, AnalysisRequest, CoordinatorConfig, Evaluator};
pub use discovery::{discover_candidates, DiscoveryContext};
pub use process::{
    CandidateAttempt, CandidateFailure, CandidateState, EngineOptions, EngineProcess,
    HandshakeState,
};
pub use score::{AnalysisResult, Score, MATE_SCORE};
