use crate::models::Candidate;
use crate::services::{
    to_classifier_input, Classifier, Detector, ImageFetcher, TransferError, VisionError,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Score given to a candidate when no image could be rated
pub const NO_RATING_SCORE: f64 = 0.001;

/// Only the best rated images take part in the aggregate
pub const MAX_RATED_IMAGES: usize = 5;

pub const TOP_IMAGE_WEIGHT: f64 = 0.6;
pub const RUNNER_UP_WEIGHT: f64 = 0.4;

/// Label whose certainty counts as a positive rating
pub const DEFAULT_POSITIVE_LABEL: &str = "positive";

/// Combine per-image certainties into one candidate score
///
/// score = (
///     best * 0.6 +                     # the best photo dominates
///     mean(next four best) * 0.4       # the others smooth it out
/// )
///
/// A single certainty is returned unchanged and an empty list yields
/// [`NO_RATING_SCORE`]. Input order does not matter.
pub fn aggregate_certainties(mut certainties: Vec<f64>) -> f64 {
    certainties.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    certainties.truncate(MAX_RATED_IMAGES);

    match certainties.as_slice() {
        [] => NO_RATING_SCORE,
        [only] => *only,
        [best, rest @ ..] => {
            let mean = rest.iter().sum::<f64>() / rest.len() as f64;
            best * TOP_IMAGE_WEIGHT + mean * RUNNER_UP_WEIGHT
        }
    }
}

/// Errors that abort scoring a whole candidate
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("classifier unavailable: {0}")]
    ClassifierUnavailable(#[source] VisionError),
}

#[derive(Debug, Error)]
enum ImageFailure {
    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Vision(#[from] VisionError),
}

/// Turns a candidate into a suitability score
#[async_trait]
pub trait CandidateScorer: Send + Sync {
    async fn score(&self, candidate: &Candidate) -> Result<f64, ScoreError>;
}

/// Scores candidates from their photos
///
/// Each photo goes through fetch, person detection, grayscale conversion
/// and classification. A photo that fails any step is skipped; only a
/// released classifier session fails the candidate.
pub struct ImageScorer {
    fetcher: Arc<dyn ImageFetcher>,
    detector: Arc<dyn Detector>,
    classifier: Arc<dyn Classifier>,
    positive_label: String,
}

impl ImageScorer {
    pub fn new(
        fetcher: Arc<dyn ImageFetcher>,
        detector: Arc<dyn Detector>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            fetcher,
            detector,
            classifier,
            positive_label: DEFAULT_POSITIVE_LABEL.to_string(),
        }
    }

    pub fn with_positive_label(mut self, label: impl Into<String>) -> Self {
        self.positive_label = label.into();
        self
    }

    /// Positive certainty for one photo, `None` when nobody was detected
    async fn rate_image(&self, url: &str) -> Result<Option<f64>, ImageFailure> {
        let bytes = self.fetcher.fetch(url).await?;

        let region = match self.detector.detect(&bytes).await? {
            Some(region) => region,
            None => return Ok(None),
        };

        let certainties = self.classifier.classify(&to_classifier_input(&region)).await?;

        Ok(certainties
            .get(&self.positive_label)
            .copied()
            .filter(|c| c.is_finite()))
    }
}

#[async_trait]
impl CandidateScorer for ImageScorer {
    async fn score(&self, candidate: &Candidate) -> Result<f64, ScoreError> {
        let mut ratings = Vec::with_capacity(candidate.images().len());

        for url in candidate.images() {
            match self.rate_image(url).await {
                Ok(Some(certainty)) => ratings.push(certainty),
                Ok(None) => tracing::debug!("No rating for {} of {}", url, candidate.id()),
                Err(ImageFailure::Vision(VisionError::Unavailable)) => {
                    return Err(ScoreError::ClassifierUnavailable(VisionError::Unavailable));
                }
                Err(e) => tracing::warn!("Error processing image {}: {}", url, e),
            }
        }

        tracing::debug!("Rated {} of {} images for {}", ratings.len(), candidate.images().len(), candidate.id());

        Ok(aggregate_certainties(ratings))
    }
}
