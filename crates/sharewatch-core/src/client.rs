//! Explicit provider client handle.
//!
//! [`ProviderClient`] owns everything a fetch needs: the provider, the series
//! cache, the rate limiter and the per-fetch timeout. It is constructed once and
//! passed to the engine; there is no process-global state.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use thiserror::Error;

use crate::cache::{CacheMode, SeriesCache, SeriesKey};
use crate::data_source::{MarketDataProvider, ProviderError};
use crate::{ChangeWindows, Interval, Period, ProviderId, Series, SeriesError, Symbol};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Why a single `(symbol, period, interval)` fetch produced no usable series.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    #[error("{symbol} {period}/{interval}: {source}")]
    Provider {
        symbol: Symbol,
        period: Period,
        interval: Interval,
        #[source]
        source: ProviderError,
    },
    #[error("{symbol} returned no observations for period {period} / interval {interval}")]
    EmptySeries {
        symbol: Symbol,
        period: Period,
        interval: Interval,
    },
    #[error(transparent)]
    InvalidSeries(SeriesError),
    #[error("{symbol} {period}/{interval}: no response within {timeout_ms} ms")]
    Timeout {
        symbol: Symbol,
        period: Period,
        interval: Interval,
        timeout_ms: u64,
    },
}

impl FetchError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Provider { source, .. } => source.code(),
            Self::EmptySeries { .. } => "series.empty",
            Self::InvalidSeries(source) => source.code(),
            Self::Timeout { .. } => "fetch.timeout",
        }
    }

    pub fn symbol(&self) -> &Symbol {
        match self {
            Self::Provider { symbol, .. }
            | Self::EmptySeries { symbol, .. }
            | Self::Timeout { symbol, .. } => symbol,
            Self::InvalidSeries(
                SeriesError::EmptySeries { symbol, .. }
                | SeriesError::UnorderedObservations { symbol, .. }
                | SeriesError::InvalidObservation { symbol, .. },
            ) => symbol,
        }
    }
}

impl From<SeriesError> for FetchError {
    fn from(error: SeriesError) -> Self {
        match error {
            SeriesError::EmptySeries {
                symbol,
                period,
                interval,
            } => Self::EmptySeries {
                symbol,
                period,
                interval,
            },
            other => Self::InvalidSeries(other),
        }
    }
}

/// Tunables for [`ProviderClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Zero disables caching.
    pub cache_ttl: Duration,
    /// Zero disables the timeout.
    pub fetch_timeout: Duration,
    /// `None` means unthrottled.
    pub requests_per_minute: Option<NonZeroU32>,
    pub cache_mode: CacheMode,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            fetch_timeout: Duration::from_secs(15),
            requests_per_minute: NonZeroU32::new(120),
            cache_mode: CacheMode::Use,
        }
    }
}

/// Cloneable handle for fetching validated series; clones share cache and limiter.
#[derive(Clone)]
pub struct ProviderClient {
    provider: Arc<dyn MarketDataProvider>,
    cache: SeriesCache,
    limiter: Option<Arc<DirectRateLimiter>>,
    fetch_timeout: Duration,
    cache_mode: CacheMode,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn MarketDataProvider>, options: ClientOptions) -> Self {
        Self {
            provider,
            cache: SeriesCache::new(options.cache_ttl),
            limiter: options
                .requests_per_minute
                .map(|limit| Arc::new(RateLimiter::direct(Quota::per_minute(limit)))),
            fetch_timeout: options.fetch_timeout,
            cache_mode: options.cache_mode,
        }
    }

    /// Share an existing cache, e.g. across several clients in one process.
    pub fn with_cache(mut self, cache: SeriesCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_cache_mode(mut self, cache_mode: CacheMode) -> Self {
        self.cache_mode = cache_mode;
        self
    }

    pub fn provider_id(&self) -> ProviderId {
        self.provider.id()
    }

    pub fn provider(&self) -> &Arc<dyn MarketDataProvider> {
        &self.provider
    }

    pub fn cache(&self) -> &SeriesCache {
        &self.cache
    }

    /// Fetch the "now" series used as every change window's current value.
    pub async fn fetch_current(&self, symbol: &Symbol) -> Result<Series, FetchError> {
        let (period, interval) = ChangeWindows::CURRENT;
        self.fetch_series(symbol, period, interval).await
    }

    /// Fetch and validate one series, consulting the cache according to the cache mode.
    pub async fn fetch_series(
        &self,
        symbol: &Symbol,
        period: Period,
        interval: Interval,
    ) -> Result<Series, FetchError> {
        let key = SeriesKey::new(symbol.clone(), period, interval);

        if self.cache_mode.reads() {
            if let Some(series) = self.cache.get(&key).await {
                tracing::debug!(%symbol, %period, %interval, "series cache hit");
                return Ok(series);
            }
            tracing::debug!(%symbol, %period, %interval, "series cache miss");
        }

        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let rows = self.fetch_rows(symbol, period, interval).await?;
        let series = Series::new(symbol.clone(), period, interval, rows)?;

        if self.cache_mode.writes() {
            self.cache.put(key, series.clone()).await;
        }
        Ok(series)
    }

    async fn fetch_rows(
        &self,
        symbol: &Symbol,
        period: Period,
        interval: Interval,
    ) -> Result<Vec<crate::Observation>, FetchError> {
        let provider_error = |source| FetchError::Provider {
            symbol: symbol.clone(),
            period,
            interval,
            source,
        };

        let fetch = self.provider.fetch_series(symbol, period, interval);
        if self.fetch_timeout.is_zero() {
            return fetch.await.map_err(provider_error);
        }

        match tokio::time::timeout(self.fetch_timeout, fetch).await {
            Ok(result) => result.map_err(provider_error),
            Err(_) => Err(FetchError::Timeout {
                symbol: symbol.clone(),
                period,
                interval,
                timeout_ms: u64::try_from(self.fetch_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}
