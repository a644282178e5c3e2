//! Swipe Pilot - automated like/pass decisions for a matching service
//!
//! Candidates are pulled from the discovery feed, scored from their photos
//! with an image classifier, and liked or passed through a rate-limited
//! API client for a bounded amount of time.

pub mod config;
pub mod core;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use crate::core::{aggregate_certainties, DecisionLoop, DecisionPolicy, ImageScorer, RetryPolicy, RunSummary};
pub use models::{Candidate, Gender, LikeOutcome, Profile};
pub use services::{MatchService, RateGate, RemoteClient, RemoteError};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        assert_eq!(aggregate_certainties(vec![]), 0.001);
        assert_eq!(RetryPolicy::default().feed_backoff.as_secs(), 5);
    }
}
