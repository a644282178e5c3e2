// Core algorithm exports
pub mod decision;
pub mod runner;
pub mod scoring;

pub use decision::{DecisionPolicy, Evaluation};
pub use runner::{CandidateError, DecisionLoop, RetryPolicy, RunSummary};
pub use scoring::{aggregate_certainties, CandidateScorer, ImageScorer, ScoreError};
