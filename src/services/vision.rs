//! Person detection and likeliness classification collaborators.
//!
//! The models themselves live behind HTTP endpoints; this module only
//! speaks to them and prepares images in the form they expect.

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Class label to certainty, as returned by a classifier
pub type Certainties = HashMap<String, f64>;

/// Errors raised by the detector or the classifier
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("image could not be processed: {0}")]
    Image(#[from] image::ImageError),

    #[error("vision endpoint request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("vision endpoint returned {0}")]
    Status(StatusCode),

    /// The classifier session has been released
    #[error("classifier session is closed")]
    Unavailable,
}

/// Finds the single subject in an image and crops to it
///
/// `Ok(None)` means no subject was found, which is a normal outcome.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, image: &[u8]) -> Result<Option<DynamicImage>, VisionError>;
}

/// Scores an image against the classifier's labels
///
/// A classifier holds a session that is acquired once per run and released
/// with [`Classifier::close`] after the decision loop ends.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, image: &DynamicImage) -> Result<Certainties, VisionError>;

    async fn close(&self) -> Result<(), VisionError> {
        Ok(())
    }
}

/// Convert a detected region to the classifier's color representation
///
/// The classifier was trained on 8-bit grayscale frames.
pub fn to_classifier_input(image: &DynamicImage) -> DynamicImage {
    DynamicImage::ImageLuma8(image.to_luma8())
}

fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>, VisionError> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Jpeg)?;
    Ok(buffer.into_inner())
}

/// Treats the whole frame as the subject
#[derive(Debug, Clone, Copy, Default)]
pub struct WholeFrameDetector;

#[async_trait]
impl Detector for WholeFrameDetector {
    async fn detect(&self, image: &[u8]) -> Result<Option<DynamicImage>, VisionError> {
        Ok(Some(image::load_from_memory(image)?))
    }
}

/// Detector served over HTTP
///
/// The endpoint receives the raw image and answers `200` with the cropped
/// subject or `204` when nobody is in the picture.
pub struct HttpDetector {
    url: String,
    client: Client,
}

impl HttpDetector {
    pub fn new(url: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect(&self, image: &[u8]) -> Result<Option<DynamicImage>, VisionError> {
        let response = self
            .client
            .post(&self.url)
            .header("content-type", "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(None),
            status if status.is_success() => {
                let body = response.bytes().await?;
                Ok(Some(image::load_from_memory(&body)?))
            }
            status => Err(VisionError::Status(status)),
        }
    }
}

/// Classifier served over HTTP
///
/// Images are posted as JPEG; the endpoint answers with a JSON object
/// mapping labels to certainties.
pub struct HttpClassifier {
    url: String,
    client: Client,
    closed: AtomicBool,
}

impl HttpClassifier {
    pub fn new(url: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url,
            client,
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, image: &DynamicImage) -> Result<Certainties, VisionError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(VisionError::Unavailable);
        }

        let body = encode_jpeg(image)?;

        let response = self
            .client
            .post(&self.url)
            .header("content-type", "image/jpeg")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VisionError::Status(response.status()));
        }

        Ok(response.json().await?)
    }

    async fn close(&self) -> Result<(), VisionError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!("Classifier session released");
        }
        Ok(())
    }
}
