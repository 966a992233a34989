pub mod config;
pub mod models;
pub mod services;
pub mod utils;

pub use config::RankingConfig;
pub use models::{posts_from_json, Attachment, Author, Post, RawTimestamp, SeenMap};
pub use services::scoring::{shared_backend, RankingError, Result};
pub use services::{
    BatchAggregates, DiversityLayer, HeuristicBackend, OnnxBackend, RankingEngine, ScoreBackend,
    ScoringInput,
};
