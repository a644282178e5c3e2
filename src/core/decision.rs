use crate::models::{Candidate, Decision};
use std::collections::HashSet;

/// Result of applying the decision policy to a scored candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub raw_score: f64,
    pub score: f64,
    pub boosted: bool,
    pub decision: Decision,
}

/// Threshold and institution bonus applied on top of the image score
#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    like_threshold: f64,
    institution_bonus: f64,
    preferred_institutions: HashSet<String>,
}

impl DecisionPolicy {
    pub fn new<I, S>(like_threshold: f64, institution_bonus: f64, preferred_institutions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            like_threshold,
            institution_bonus,
            preferred_institutions: preferred_institutions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn like_threshold(&self) -> f64 {
        self.like_threshold
    }

    /// Whether any school matches a preferred institution exactly
    pub fn attends_preferred(&self, candidate: &Candidate) -> bool {
        candidate
            .schools()
            .iter()
            .any(|school| self.preferred_institutions.contains(school))
    }

    /// Apply the bonus and compare against the threshold
    ///
    /// Only a score strictly above the threshold is a like.
    pub fn evaluate(&self, candidate: &Candidate, raw_score: f64) -> Evaluation {
        let boosted = self.attends_preferred(candidate);
        let score = if boosted {
            raw_score * self.institution_bonus
        } else {
            raw_score
        };

        let decision = if score > self.like_threshold {
            Decision::Like
        } else {
            Decision::Pass
        };

        Evaluation {
            raw_score,
            score,
            boosted,
            decision,
        }
    }
}
