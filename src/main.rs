use std::process::ExitCode;
use std::sync::Arc;
use swipe_pilot::config::Settings;
use swipe_pilot::core::{DecisionLoop, DecisionPolicy, ImageScorer, RetryPolicy};
use swipe_pilot::services::{
    Classifier, Detector, DisabledGeocoder, Geocoder, HttpClassifier, HttpDetector, HttpImageFetcher,
    ImageArchive, ImageFetcher, NominatimGeocoder, ProcessedLedger, RateGate, RemoteClient,
    WholeFrameDetector,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    dotenv::dotenv().ok();

    // A missing token or broken config stops us before any remote call
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(settings.logging.filter_directives()))
        .with_target(false)
        .with_level(true);

    if settings.logging.is_pretty() {
        subscriber.pretty().init();
    } else {
        subscriber.init();
    }

    info!("Starting swipe pilot...");

    match run(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Startup failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let geocoder: Arc<dyn Geocoder> = if settings.geocoder.enabled {
        Arc::new(NominatimGeocoder::new(
            settings.geocoder.url.clone(),
            &settings.geocoder.user_agent,
            settings.api.timeout(),
        )?
        .with_min_interval(settings.geocoder.min_interval()))
    } else {
        Arc::new(DisabledGeocoder)
    };

    let gate = Arc::new(RateGate::new(settings.api.rate_limit_delay()));
    let client = Arc::new(RemoteClient::new(
        settings.api.base_url.clone(),
        settings.api.token.clone(),
        gate,
        geocoder,
        settings.api.timeout(),
    )?);

    info!("Remote client initialized (delay: {:?})", settings.api.rate_limit_delay());

    match client.get_self_profile().await {
        Ok(profile) => info!(
            "Signed in as {} (age filter {:?}-{:?}, distance {:?}, looking for {:?})",
            profile.candidate(),
            profile.account().age_min,
            profile.account().age_max,
            profile.account().max_distance,
            profile.account().gender_filter
        ),
        Err(e) => warn!("Could not fetch own profile: {}", e),
    }

    match client.get_recent_matches(settings.api.matches_limit).await {
        Ok(matches) => {
            info!("{} recent matches", matches.len());
            for person in &matches {
                info!("  {}", person);
            }
        }
        Err(e) => warn!("Could not fetch recent matches: {}", e),
    }

    let fetcher: Arc<dyn ImageFetcher> = Arc::new(HttpImageFetcher::new(settings.vision.timeout())?);

    let detector: Arc<dyn Detector> = match &settings.vision.detector_url {
        Some(url) => Arc::new(HttpDetector::new(url.clone(), settings.vision.timeout())?),
        None => Arc::new(WholeFrameDetector),
    };

    // Acquired once here, released by run_scoped after the loop ends
    let classifier: Arc<dyn Classifier> = Arc::new(HttpClassifier::new(
        settings.vision.classifier_url.clone(),
        settings.vision.timeout(),
    )?);

    let scorer = ImageScorer::new(fetcher.clone(), detector, classifier.clone())
        .with_positive_label(settings.vision.positive_label.clone());

    let policy = DecisionPolicy::new(
        settings.decision.like_threshold,
        settings.decision.institution_bonus,
        settings.decision.preferred_institutions.clone(),
    );

    info!(
        "Decision policy: threshold {}, bonus {} for {} institutions",
        settings.decision.like_threshold,
        settings.decision.institution_bonus,
        settings.decision.preferred_institutions.len()
    );

    let mut decision_loop = DecisionLoop::new(client, Arc::new(scorer), policy).with_retry_policy(RetryPolicy {
        feed_backoff: settings.run.feed_retry(),
    });

    if settings.archive.enabled {
        let ledger = Arc::new(ProcessedLedger::new(settings.archive.ledger_path.clone()));
        let archive = ImageArchive::new(ledger, fetcher, settings.archive.folder.clone())
            .with_jitter(settings.archive.jitter_max());
        info!("Archiving candidate images to {}", archive.folder().display());
        decision_loop = decision_loop.with_archive(archive);
    }

    let shutdown = decision_loop.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown signal received, stopping after the current candidate");
            shutdown.cancel();
        }
    });

    info!("Running for {:?}", settings.run.duration());

    let summary = decision_loop.run_scoped(settings.run.duration(), classifier).await;

    info!(
        "Done: {} evaluated, {} liked, {} passed, {} matches, {} failed candidates, {} failed feed fetches",
        summary.evaluated,
        summary.liked,
        summary.passed,
        summary.matches,
        summary.candidate_failures,
        summary.feed_failures
    );

    Ok(())
}
