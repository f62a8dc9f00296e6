pub use chess_core;

pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod games;
pub mod pipeline;
pub mod puzzle;
pub mod sink;

pub use engine::{AnalysisCoordinator, AnalysisResult, Evaluator, Score};
pub use error::WorkerError;
pub use pipeline::{BlunderPipeline, PipelineConfig, PipelineReport};
pub use puzzle::BlunderPuzzle;
pub use sink::{JsonLinesSink, PuzzleSink};
