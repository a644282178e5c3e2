use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while fetching an external byte stream
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("fetching {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("fetching {url} returned {status}")]
    Status { url: String, status: StatusCode },
}

/// Fetches image bytes by URL
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, TransferError>;
}

/// Plain HTTP image transfer
pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, TransferError> {
        let request_error = |source| TransferError::Request {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::Status {
                url: url.to_string(),
                status,
            });
        }

        response.bytes().await.map_err(request_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_returns_body() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/photo1.jpg")
            .with_status(200)
            .with_body("fake_image_data")
            .create_async()
            .await;

        let fetcher = HttpImageFetcher::new(Duration::from_secs(5)).unwrap();
        let bytes = fetcher.fetch(&format!("{}/photo1.jpg", server.url())).await.unwrap();

        assert_eq!(&bytes[..], b"fake_image_data");
    }

    #[tokio::test]
    async fn test_fetch_maps_status() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/missing.jpg")
            .with_status(404)
            .create_async()
            .await;

        let fetcher = HttpImageFetcher::new(Duration::from_secs(5)).unwrap();
        let err = fetcher.fetch(&format!("{}/missing.jpg", server.url())).await.unwrap_err();

        assert!(matches!(err, TransferError::Status { status, .. } if status == StatusCode::NOT_FOUND));
    }
}
