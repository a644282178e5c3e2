use crate::core::decision::{DecisionPolicy, Evaluation};
use crate::core::scoring::{CandidateScorer, ScoreError};
use crate::models::{Candidate, Decision, LikeOutcome};
use crate::services::{Classifier, ImageArchive, MatchService, RemoteError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Errors that fail a single candidate without stopping the batch
#[derive(Debug, Error)]
pub enum CandidateError {
    #[error(transparent)]
    Score(#[from] ScoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// How the loop reacts to failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause before fetching the feed again after a failed fetch
    pub feed_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            feed_backoff: Duration::from_secs(5),
        }
    }
}

/// Counters for one run of the decision loop
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub iterations: u64,
    pub evaluated: u64,
    pub liked: u64,
    pub passed: u64,
    pub matches: u64,
    pub candidate_failures: u64,
    pub feed_failures: u64,
}

/// Time-bounded like/pass orchestration
///
/// # Failure isolation
/// 1. A failed feed fetch pauses for the retry backoff, then the feed is fetched again
/// 2. A failed candidate is logged with its id and the batch continues
/// 3. A failed archive download is logged and the candidate is still scored
///
/// The loop ends when the time budget runs out or the cancellation token
/// fires. Cancellation is checked between candidates and during pauses.
pub struct DecisionLoop {
    service: Arc<dyn MatchService>,
    scorer: Arc<dyn CandidateScorer>,
    policy: DecisionPolicy,
    retry: RetryPolicy,
    archive: Option<ImageArchive>,
    cancel: CancellationToken,
}

impl DecisionLoop {
    pub fn new(service: Arc<dyn MatchService>, scorer: Arc<dyn CandidateScorer>, policy: DecisionPolicy) -> Self {
        Self {
            service,
            scorer,
            policy,
            retry: RetryPolicy::default(),
            archive: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Archive each candidate's photos before scoring
    pub fn with_archive(mut self, archive: ImageArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the loop when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until `budget` has elapsed or the loop is cancelled
    pub async fn run(&self, budget: Duration) -> RunSummary {
        let deadline = Instant::now() + budget;
        let mut summary = RunSummary::default();

        while !self.cancel.is_cancelled() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            summary.iterations += 1;
            tracing::info!("------ TIME LEFT: {:.1} min -----", remaining.as_secs_f64() / 60.0);

            let feed = match self.service.nearby_candidates().await {
                Ok(feed) => feed,
                Err(e) => {
                    summary.feed_failures += 1;
                    tracing::error!("Error fetching candidate feed: {}", e);
                    self.pause(self.retry.feed_backoff).await;
                    continue;
                }
            };

            tracing::debug!("Feed returned {} candidates", feed.len());

            for candidate in &feed {
                if self.cancel.is_cancelled() {
                    tracing::info!("Cancellation requested, abandoning the rest of the batch");
                    break;
                }

                match self.process_candidate(candidate).await {
                    Ok((evaluation, outcome)) => {
                        summary.evaluated += 1;
                        match evaluation.decision {
                            Decision::Like => summary.liked += 1,
                            Decision::Pass => summary.passed += 1,
                        }
                        if outcome.is_some_and(|o| o.is_match) {
                            summary.matches += 1;
                        }
                    }
                    Err(e) => {
                        summary.candidate_failures += 1;
                        tracing::error!(candidate_id = candidate.id(), "Error processing candidate {}: {}", candidate.id(), e);
                    }
                }
            }
        }

        tracing::info!(?summary, "Decision loop finished");
        summary
    }

    /// Run the loop, then release the classifier session exactly once
    pub async fn run_scoped(self, budget: Duration, classifier: Arc<dyn Classifier>) -> RunSummary {
        let summary = self.run(budget).await;

        if let Err(e) = classifier.close().await {
            tracing::warn!("Failed to release classifier session: {}", e);
        }

        summary
    }

    async fn process_candidate(
        &self,
        candidate: &Candidate,
    ) -> Result<(Evaluation, Option<LikeOutcome>), CandidateError> {
        if let Some(archive) = &self.archive {
            if let Err(e) = archive.download(candidate).await {
                tracing::warn!(candidate_id = candidate.id(), "Failed to archive images: {}", e);
            }
        }

        let raw_score = self.scorer.score(candidate).await?;
        let evaluation = self.policy.evaluate(candidate, raw_score);

        tracing::info!(
            candidate_id = candidate.id(),
            name = candidate.name(),
            schools = ?candidate.schools(),
            raw_score = raw_score,
            score = evaluation.score,
            boosted = evaluation.boosted,
            decision = ?evaluation.decision,
            "Scored {}: {:.3}",
            candidate,
            evaluation.score
        );

        let outcome = match evaluation.decision {
            Decision::Like => {
                let outcome = self.service.like(candidate.id()).await?;
                tracing::info!(candidate_id = candidate.id(), "LIKE {:?}", outcome);
                Some(outcome)
            }
            Decision::Pass => {
                self.service.dislike(candidate.id()).await?;
                tracing::info!(candidate_id = candidate.id(), "DISLIKE");
                None
            }
        };

        Ok((evaluation, outcome))
    }

    async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(duration) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{RateGate, VisionError};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory service paced like the real client
    struct FakeService {
        gate: RateGate,
        feed: Vec<Candidate>,
        feed_calls: AtomicUsize,
        failing_fetches: usize,
        decisions: Mutex<Vec<(String, Decision)>>,
        cancel_after_first: Option<CancellationToken>,
    }

    impl FakeService {
        fn new(feed: Vec<Candidate>) -> Self {
            Self {
                gate: RateGate::new(Duration::from_secs(1)),
                feed,
                feed_calls: AtomicUsize::new(0),
                failing_fetches: 0,
                decisions: Mutex::new(Vec::new()),
                cancel_after_first: None,
            }
        }

        fn decisions(&self) -> Vec<(String, Decision)> {
            self.decisions.lock().unwrap().clone()
        }

        fn record(&self, id: &str, decision: Decision) {
            self.decisions.lock().unwrap().push((id.to_string(), decision));
            if let Some(token) = &self.cancel_after_first {
                token.cancel();
            }
        }
    }

    #[async_trait]
    impl MatchService for FakeService {
        async fn nearby_candidates(&self) -> Result<Vec<Candidate>, RemoteError> {
            self.gate.wait().await;
            let call = self.feed_calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failing_fetches {
                return Err(RemoteError::InvalidResponse {
                    endpoint: "/v2/recs/core".to_string(),
                    reason: "simulated outage".to_string(),
                });
            }
            Ok(self.feed.clone())
        }

        async fn like(&self, candidate_id: &str) -> Result<LikeOutcome, RemoteError> {
            self.gate.wait().await;
            self.record(candidate_id, Decision::Like);
            Ok(LikeOutcome {
                is_match: true,
                likes_remaining: 10,
            })
        }

        async fn dislike(&self, candidate_id: &str) -> Result<bool, RemoteError> {
            self.gate.wait().await;
            self.record(candidate_id, Decision::Pass);
            Ok(true)
        }
    }

    /// Scores from a table; unknown ids fail
    struct TableScorer(HashMap<String, f64>);

    #[async_trait]
    impl CandidateScorer for TableScorer {
        async fn score(&self, candidate: &Candidate) -> Result<f64, ScoreError> {
            self.0
                .get(candidate.id())
                .copied()
                .ok_or(ScoreError::ClassifierUnavailable(VisionError::Unavailable))
        }
    }

    struct TrackingClassifier {
        closes: AtomicUsize,
        used_after_close: AtomicBool,
    }

    #[async_trait]
    impl Classifier for TrackingClassifier {
        async fn classify(&self, _image: &image::DynamicImage) -> Result<crate::services::Certainties, VisionError> {
            if self.closes.load(Ordering::SeqCst) > 0 {
                self.used_after_close.store(true, Ordering::SeqCst);
            }
            Ok(Default::default())
        }

        async fn close(&self) -> Result<(), VisionError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn person(id: &str, schools: &[&str]) -> Candidate {
        let schools: Vec<_> = schools.iter().map(|s| json!({ "name": s })).collect();
        Candidate::from_value(&json!({"_id": id, "name": id, "schools": schools})).unwrap()
    }

    fn scores(entries: &[(&str, f64)]) -> Arc<TableScorer> {
        Arc::new(TableScorer(
            entries.iter().map(|(id, s)| (id.to_string(), *s)).collect(),
        ))
    }

    fn policy() -> DecisionPolicy {
        DecisionPolicy::new(0.8, 1.2, ["ETH Zürich"])
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_candidate_does_not_stop_batch() {
        let service = Arc::new(FakeService::new(vec![
            person("first", &[]),
            person("broken", &[]),
            person("last", &["ETH Zürich"]),
        ]));
        let decision_loop = DecisionLoop::new(
            service.clone(),
            scores(&[("first", 0.95), ("last", 0.75)]),
            policy(),
        );

        let summary = decision_loop.run(Duration::from_secs(2)).await;

        let decisions = service.decisions();
        assert_eq!(
            &decisions[..2],
            &[
                ("first".to_string(), Decision::Like),
                ("last".to_string(), Decision::Like),
            ]
        );
        assert!(decisions.iter().all(|(id, _)| id != "broken"));
        assert!(summary.candidate_failures >= 1);
        assert_eq!(summary.liked, summary.matches);
    }

    #[tokio::test(start_paused = true)]
    async fn test_feed_failures_back_off_and_retry() {
        let mut service = FakeService::new(vec![person("only", &[])]);
        service.failing_fetches = 2;
        let service = Arc::new(service);

        let decision_loop = DecisionLoop::new(service.clone(), scores(&[("only", 0.1)]), policy())
            .with_retry_policy(RetryPolicy {
                feed_backoff: Duration::from_secs(5),
            });

        let started = Instant::now();
        let summary = decision_loop.run(Duration::from_secs(13)).await;

        assert_eq!(summary.feed_failures, 2);
        assert!(summary.passed >= 1);
        assert_eq!(service.decisions()[0], ("only".to_string(), Decision::Pass));
        // two failed fetches at one second of pacing and five of backoff each
        assert!(started.elapsed() >= Duration::from_secs(13));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_checked_between_candidates() {
        let token = CancellationToken::new();
        let mut service = FakeService::new(vec![person("a", &[]), person("b", &[]), person("c", &[])]);
        service.cancel_after_first = Some(token.clone());
        let service = Arc::new(service);

        let decision_loop = DecisionLoop::new(
            service.clone(),
            scores(&[("a", 0.5), ("b", 0.5), ("c", 0.5)]),
            policy(),
        )
        .with_cancellation(token);

        let summary = decision_loop.run(Duration::from_secs(3600)).await;

        assert_eq!(service.decisions(), vec![("a".to_string(), Decision::Pass)]);
        assert_eq!(summary.iterations, 1);
        assert_eq!(summary.evaluated, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_feed_backoff() {
        let token = CancellationToken::new();
        let mut service = FakeService::new(vec![person("a", &[])]);
        service.failing_fetches = usize::MAX;
        let service = Arc::new(service);

        let decision_loop = DecisionLoop::new(service.clone(), scores(&[("a", 0.9)]), policy())
            .with_retry_policy(RetryPolicy {
                feed_backoff: Duration::from_secs(600),
            })
            .with_cancellation(token.clone());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            token.cancel();
        });

        let started = Instant::now();
        let summary = decision_loop.run(Duration::from_secs(3600)).await;

        // the first fetch fails after one second of pacing, then the backoff is cut short
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(summary.feed_failures, 1);
        assert_eq!(summary.iterations, 1);
        assert!(service.decisions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_scoped_closes_classifier_once() {
        let service = Arc::new(FakeService::new(vec![person("a", &[])]));
        let classifier = Arc::new(TrackingClassifier {
            closes: AtomicUsize::new(0),
            used_after_close: AtomicBool::new(false),
        });

        let summary = DecisionLoop::new(service, scores(&[("a", 0.9)]), policy())
            .run_scoped(Duration::from_secs(5), classifier.clone())
            .await;

        assert!(summary.liked >= 1);
        assert_eq!(classifier.closes.load(Ordering::SeqCst), 1);
        assert!(!classifier.used_after_close.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_budget_does_nothing() {
        let service = Arc::new(FakeService::new(vec![person("a", &[])]));
        let summary = DecisionLoop::new(service.clone(), scores(&[("a", 0.9)]), policy())
            .run(Duration::ZERO)
            .await;

        assert_eq!(summary, RunSummary::default());
        assert!(service.decisions().is_empty());
    }
}
