use std::{ops::Deref, sync::Arc};

use reqwest::{Client, ClientBuilder, IntoUrl};
use reqwest_cookie_store::{CookieStore, CookieStoreMutex};

use crate::error::SenriResult;

/// A reqwest client sharing one cookie jar across playlist and key requests.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    cookies_store: Arc<CookieStoreMutex>,
}

impl HttpClient {
    pub fn new(builder: ClientBuilder) -> SenriResult<Self> {
        let cookies_store = Arc::new(CookieStoreMutex::new(CookieStore::default()));
        let client = builder.cookie_provider(cookies_store.clone()).build()?;

        Ok(Self {
            client,
            cookies_store,
        })
    }

    pub fn with_defaults() -> SenriResult<Self> {
        Self::new(Client::builder())
    }

    pub fn add_cookies(&self, cookies: Vec<String>, url: impl IntoUrl) -> SenriResult<()> {
        let url = url.into_url()?;
        let mut lock = self
            .cookies_store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for cookie in cookies {
            if let Err(e) = lock.parse(&cookie, &url) {
                log::warn!("Ignored invalid cookie {cookie}: {e}");
            }
        }
        Ok(())
    }
}

impl Deref for HttpClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}
