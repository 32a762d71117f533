//! Sample loading: a cache of decoded buffers keyed by sample key, with
//! concurrent requests for the same key coalesced into one fetch.

use std::cell::RefCell;
use std::future::Future;
use std::io::ErrorKind;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use hashbrown::HashMap;
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use crate::buffer::SharedBuffer;
use crate::context::AudioContext;
use crate::error::LoadError;

/// Where each sample key is fetched from.
///
/// A key that is itself a URL (`scheme://...`) or an absolute path needs no
/// entry: it is its own source.
#[derive(Clone, Debug, Default)]
pub struct SampleSources {
    urls: HashMap<String, String>,
}

impl SampleSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, url: impl Into<String>) {
        self.urls.insert(key.into(), url.into());
    }

    pub fn resolve(&self, key: &str) -> Option<String> {
        if let Some(url) = self.urls.get(key) {
            return Some(url.clone());
        }
        if key.contains("://") || key.starts_with('/') {
            return Some(key.to_owned());
        }
        None
    }
}

impl FromIterator<(String, String)> for SampleSources {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            urls: iter.into_iter().collect(),
        }
    }
}

pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>, LoadError>> + 'a>>;

/// Fetches the raw bytes behind a URL.
pub trait Fetch {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a>;
}

/// Reads `file://` URLs and plain paths from the local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileFetcher;

impl Fetch for FileFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            if url.contains("://") && !url.starts_with("file://") {
                return Err(LoadError::Fetch {
                    url: url.to_owned(),
                    message: "unsupported scheme".to_owned(),
                });
            }
            let path = url.strip_prefix("file://").unwrap_or(url);
            tokio::fs::read(path).await.map_err(|e| match e.kind() {
                ErrorKind::NotFound => LoadError::Status {
                    url: url.to_owned(),
                    status: 404,
                },
                _ => LoadError::Fetch {
                    url: url.to_owned(),
                    message: e.to_string(),
                },
            })
        })
    }
}

/// Fetches `http(s)://` URLs with reqwest; anything else goes to [`FileFetcher`].
#[cfg(feature = "http")]
#[derive(Clone, Debug, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "http")]
impl Fetch for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return FileFetcher.fetch(url);
        }
        Box::pin(async move {
            let fetch_err = |e: reqwest::Error| LoadError::Fetch {
                url: url.to_owned(),
                message: e.to_string(),
            };
            let response = self.client.get(url).send().await.map_err(fetch_err)?;
            let status = response.status();
            if !status.is_success() {
                return Err(LoadError::Status {
                    url: url.to_owned(),
                    status: status.as_u16(),
                });
            }
            let bytes = response.bytes().await.map_err(fetch_err)?;
            Ok(bytes.to_vec())
        })
    }
}

type Pending = Rc<OnceCell<Result<SharedBuffer, LoadError>>>;

#[derive(Default)]
struct LoaderState {
    cache: HashMap<String, SharedBuffer>,
    in_flight: HashMap<String, Pending>,
}

/// Decoded-buffer cache with request coalescing.
///
/// Shared by reference (`Rc`) between the compiler and anyone warming the
/// cache. All access happens on one cooperative timeline, so a `RefCell` is
/// the only guard; it is never held across an await.
pub struct BufferLoader {
    sources: SampleSources,
    fetcher: Box<dyn Fetch>,
    state: RefCell<LoaderState>,
}

impl BufferLoader {
    pub fn new(sources: SampleSources, fetcher: impl Fetch + 'static) -> Self {
        Self {
            sources,
            fetcher: Box::new(fetcher),
            state: RefCell::new(LoaderState::default()),
        }
    }

    pub fn sources(&self) -> &SampleSources {
        &self.sources
    }

    /// Non-blocking cache lookup.
    pub fn get_cached(&self, key: &str) -> Option<SharedBuffer> {
        self.state.borrow().cache.get(key).cloned()
    }

    pub fn is_loading(&self, key: &str) -> bool {
        self.state.borrow().in_flight.contains_key(key)
    }

    pub fn cached_len(&self) -> usize {
        self.state.borrow().cache.len()
    }

    /// Returns the decoded buffer for `key`, fetching and decoding it if
    /// needed. Concurrent calls for the same key share one fetch and resolve
    /// to the same buffer (or the same error). Failures are not cached.
    pub async fn load(&self, ctx: &dyn AudioContext, key: &str) -> Result<SharedBuffer, LoadError> {
        if let Some(buffer) = self.get_cached(key) {
            trace!(%key, "sample cache hit");
            return Ok(buffer);
        }

        let url = self.sources.resolve(key).ok_or_else(|| LoadError::Unconfigured {
            key: key.to_owned(),
        })?;

        let pending = {
            let mut state = self.state.borrow_mut();
            match state.in_flight.get(key) {
                Some(pending) => {
                    debug!(%key, "joining in-flight sample load");
                    pending.clone()
                }
                None => {
                    let pending = Pending::default();
                    state.in_flight.insert(key.to_owned(), pending.clone());
                    pending
                }
            }
        };

        let result = pending
            .get_or_init(|| self.fetch_and_decode(ctx, key, &url))
            .await
            .clone();

        self.settle(key, &pending, &result);
        result
    }

    /// Loads every key, one after another. All keys are attempted; the first
    /// failure is returned.
    pub async fn prefetch<I, K>(&self, ctx: &dyn AudioContext, keys: I) -> Result<(), LoadError>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut first_error = None;
        for key in keys {
            if let Err(e) = self.load(ctx, key.as_ref()).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn fetch_and_decode(
        &self,
        ctx: &dyn AudioContext,
        key: &str,
        url: &str,
    ) -> Result<SharedBuffer, LoadError> {
        debug!(%key, %url, "fetching sample");
        let bytes = self.fetcher.fetch(url).await?;
        let buffer = ctx.decode_audio_data(&bytes).map_err(|e| LoadError::Decode {
            key: key.to_owned(),
            source: Arc::new(e),
        })?;
        debug!(
            %key,
            frames = buffer.len(),
            channels = buffer.number_of_channels(),
            "sample decoded"
        );
        Ok(Arc::new(buffer))
    }

    /// Clears the in-flight marker (if it is still ours) and caches successes.
    fn settle(&self, key: &str, pending: &Pending, result: &Result<SharedBuffer, LoadError>) {
        let mut state = self.state.borrow_mut();
        if state
            .in_flight
            .get(key)
            .is_some_and(|current| Rc::ptr_eq(current, pending))
        {
            state.in_flight.remove(key);
        }
        if let Ok(buffer) = result {
            state
                .cache
                .entry(key.to_owned())
                .or_insert_with(|| buffer.clone());
        }
    }
}
