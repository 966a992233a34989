pub mod diversity;
pub mod ranking;
pub mod scoring;
pub mod signals;

pub use diversity::DiversityLayer;
pub use ranking::RankingEngine;
pub use scoring::{HeuristicBackend, OnnxBackend, ScoreBackend, ScoringInput};
pub use signals::BatchAggregates;
