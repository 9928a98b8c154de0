//! Watchlist boundary.
//!
//! Remote watchlists are loosely typed JSON:
//!
//! ```json
//! {"watchlist": [{"symbol": "AAPL", "thresholds": {"lower": [150.0], "upper": [210.0]}}]}
//! ```
//!
//! Everything is validated into [`WatchlistEntry`] values here, so the band
//! calculator only ever sees parsed symbols and finite, non-negative levels.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http_client::{HttpClient, HttpRequest};
use crate::{Symbol, ValidationError};

/// Public watchlists used when no URLs are configured.
pub const DEFAULT_WATCHLIST_URLS: [&str; 2] = [
    "https://raw.githubusercontent.com/khaifahmi99/stock-alarm/master/watchlist-us.json",
    "https://raw.githubusercontent.com/khaifahmi99/stock-alarm/master/watchlist-au.json",
];

#[derive(Debug, Error)]
pub enum WatchlistError {
    #[error("watchlist document {document} is malformed: {source}")]
    Parse {
        document: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("watchlist document {document} entry {index} has an invalid symbol: {source}")]
    InvalidSymbol {
        document: usize,
        index: usize,
        #[source]
        source: ValidationError,
    },
    #[error("{symbol} {side} threshold {value} must be finite and non-negative")]
    InvalidThreshold {
        symbol: Symbol,
        side: &'static str,
        value: f64,
    },
    #[error("{symbol} appears more than once in the watchlist")]
    DuplicateSymbol { symbol: Symbol },
    #[error("failed to fetch watchlist from {url}: {message}")]
    Fetch { url: String, message: String },
    #[error("failed to read watchlist file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WatchlistError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "watchlist.malformed",
            Self::InvalidSymbol { .. } => "watchlist.invalid_symbol",
            Self::InvalidThreshold { .. } => "watchlist.invalid_threshold",
            Self::DuplicateSymbol { .. } => "watchlist.duplicate_symbol",
            Self::Fetch { .. } => "watchlist.fetch_failed",
            Self::Io { .. } => "watchlist.io",
        }
    }
}

/// One watched symbol and its alert levels, in configured order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchlistEntry {
    pub symbol: Symbol,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl WatchlistEntry {
    pub fn new(symbol: Symbol, lower: Vec<f64>, upper: Vec<f64>) -> Result<Self, WatchlistError> {
        let sides = [("lower", &lower), ("upper", &upper)];
        for (side, values) in sides {
            if let Some(value) = values
                .iter()
                .copied()
                .find(|value| !value.is_finite() || *value < 0.0)
            {
                return Err(WatchlistError::InvalidThreshold {
                    symbol,
                    side,
                    value,
                });
            }
        }
        Ok(Self {
            symbol,
            lower,
            upper,
        })
    }
}

/// Validated watchlist, sorted by symbol with no duplicates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Watchlist {
    entries: Vec<WatchlistEntry>,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    watchlist: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    symbol: String,
    thresholds: RawThresholds,
}

#[derive(Debug, Deserialize)]
struct RawThresholds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Watchlist {
    pub fn new(mut entries: Vec<WatchlistEntry>) -> Result<Self, WatchlistError> {
        entries.sort_by(|left, right| left.symbol.cmp(&right.symbol));
        if let Some(pair) = entries.windows(2).find(|pair| pair[0].symbol == pair[1].symbol) {
            return Err(WatchlistError::DuplicateSymbol {
                symbol: pair[0].symbol.clone(),
            });
        }
        Ok(Self { entries })
    }

    pub fn from_json_str(document: &str) -> Result<Self, WatchlistError> {
        Self::from_json_documents([document])
    }

    /// Parse and merge several documents; any malformed entry rejects the whole set.
    pub fn from_json_documents<I, S>(documents: I) -> Result<Self, WatchlistError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries = Vec::new();
        for (document, text) in documents.into_iter().enumerate() {
            let raw: RawDocument = serde_json::from_str(text.as_ref())
                .map_err(|source| WatchlistError::Parse { document, source })?;
            for (index, entry) in raw.watchlist.into_iter().enumerate() {
                let symbol = Symbol::parse(&entry.symbol).map_err(|source| {
                    WatchlistError::InvalidSymbol {
                        document,
                        index,
                        source,
                    }
                })?;
                entries.push(WatchlistEntry::new(
                    symbol,
                    entry.thresholds.lower,
                    entry.thresholds.upper,
                )?);
            }
        }
        Self::new(entries)
    }

    pub fn entries(&self) -> &[WatchlistEntry] {
        &self.entries
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        self.entries.iter().map(|entry| entry.symbol.clone()).collect()
    }

    pub fn get(&self, symbol: &Symbol) -> Option<&WatchlistEntry> {
        self.entries
            .binary_search_by(|entry| entry.symbol.cmp(symbol))
            .ok()
            .map(|index| &self.entries[index])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where watchlists come from.
pub trait WatchlistSource: Send + Sync {
    fn get_watchlist<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Watchlist, WatchlistError>> + Send + 'a>>;
}

/// Fetches and merges watchlist documents over HTTP.
#[derive(Clone)]
pub struct HttpWatchlistSource {
    http_client: Arc<dyn HttpClient>,
    urls: Vec<String>,
    timeout: Duration,
}

impl HttpWatchlistSource {
    pub fn new(http_client: Arc<dyn HttpClient>, urls: Vec<String>) -> Self {
        Self {
            http_client,
            urls,
            timeout: Duration::from_secs(10),
        }
    }

    /// Source reading the public US and AU watchlists.
    pub fn with_default_urls(http_client: Arc<dyn HttpClient>) -> Self {
        Self::new(
            http_client,
            DEFAULT_WATCHLIST_URLS.iter().map(|url| (*url).to_owned()).collect(),
        )
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }
}

impl WatchlistSource for HttpWatchlistSource {
    fn get_watchlist<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Watchlist, WatchlistError>> + Send + 'a>> {
        Box::pin(async move {
            let mut documents = Vec::with_capacity(self.urls.len());
            for url in &self.urls {
                let request = HttpRequest::get(url.as_str()).with_timeout(self.timeout);
                let response = self.http_client.execute(request).await.map_err(|error| {
                    WatchlistError::Fetch {
                        url: url.clone(),
                        message: error.message().to_owned(),
                    }
                })?;
                if !response.is_success() {
                    return Err(WatchlistError::Fetch {
                        url: url.clone(),
                        message: format!("status {}", response.status),
                    });
                }
                tracing::debug!(%url, bytes = response.body.len(), "fetched watchlist document");
                documents.push(response.body);
            }
            Watchlist::from_json_documents(&documents)
        })
    }
}

/// Watchlist documents held in memory or read from local files.
#[derive(Debug, Clone, Default)]
pub struct StaticWatchlistSource {
    documents: Vec<String>,
}

impl StaticWatchlistSource {
    pub fn from_documents<I, S>(documents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            documents: documents.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_paths<I, P>(paths: I) -> Result<Self, WatchlistError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let documents = paths
            .into_iter()
            .map(|path| {
                let path = path.as_ref();
                std::fs::read_to_string(path).map_err(|source| WatchlistError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { documents })
    }
}

impl WatchlistSource for StaticWatchlistSource {
    fn get_watchlist<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Watchlist, WatchlistError>> + Send + 'a>> {
        Box::pin(async move { Watchlist::from_json_documents(&self.documents) })
    }
}
