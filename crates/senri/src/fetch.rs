use std::future::Future;

use bytes::Bytes;
use url::Url;

use crate::{
    error::{SenriError, SenriResult},
    util::http::HttpClient,
};

/// Source of raw playlist bytes.
pub trait PlaylistFetcher: Send + Sync + 'static {
    fn fetch(&self, url: &Url) -> impl Future<Output = SenriResult<Bytes>> + Send;
}

pub struct HttpPlaylistFetcher {
    client: HttpClient,
    retry: u32,
}

impl HttpPlaylistFetcher {
    pub fn new(client: HttpClient) -> Self {
        Self { client, retry: 3 }
    }

    /// Attempts per fetch. Zero is treated as one.
    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    async fn fetch_once(&self, url: &Url) -> SenriResult<Bytes> {
        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            if let Ok(body) = response.text().await {
                tracing::debug!("Error body: {body}");
            }
            return Err(SenriError::HttpError(status));
        }

        Ok(response.bytes().await?)
    }
}

impl PlaylistFetcher for HttpPlaylistFetcher {
    async fn fetch(&self, url: &Url) -> SenriResult<Bytes> {
        let mut retry = self.retry.max(1);
        loop {
            if retry == 0 {
                return Err(SenriError::PlaylistFetchError);
            }

            match self.fetch_once(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(error) => {
                    log::warn!("Failed to fetch playlist {url}: {error}");
                    retry -= 1;
                }
            }
        }
    }
}
