//! TTL memo for validated price series.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{Interval, Period, Series, Symbol, ValidationError};

/// How a single fetch interacts with the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Serve a live entry when present; otherwise fetch and store. (Default)
    #[default]
    Use,
    /// Always fetch, then overwrite the entry.
    Refresh,
    /// Always fetch; neither read nor write the cache.
    Bypass,
}

impl CacheMode {
    pub const fn reads(self) -> bool {
        matches!(self, Self::Use)
    }

    pub const fn writes(self) -> bool {
        !matches!(self, Self::Bypass)
    }
}

impl FromStr for CacheMode {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "use" => Ok(Self::Use),
            "refresh" => Ok(Self::Refresh),
            "bypass" => Ok(Self::Bypass),
            other => Err(ValidationError::InvalidCacheMode {
                value: other.to_owned(),
            }),
        }
    }
}

/// Cache key: one provider request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub symbol: Symbol,
    pub period: Period,
    pub interval: Interval,
}

impl SeriesKey {
    pub fn new(symbol: Symbol, period: Period, interval: Interval) -> Self {
        Self {
            symbol,
            period,
            interval,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    series: Series,
    expires_at: Instant,
}

#[derive(Debug)]
struct CacheInner {
    map: HashMap<SeriesKey, CacheEntry>,
    ttl: Duration,
}

/// Thread-safe TTL cache of validated series, shared by clones.
///
/// A zero TTL disables the cache: nothing is stored and every lookup misses.
#[derive(Debug, Clone)]
pub struct SeriesCache {
    inner: Arc<RwLock<CacheInner>>,
}

impl SeriesCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner {
                map: HashMap::new(),
                ttl,
            })),
        }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub async fn get(&self, key: &SeriesKey) -> Option<Series> {
        let store = self.inner.read().await;
        store
            .map
            .get(key)
            .filter(|entry| Instant::now() < entry.expires_at)
            .map(|entry| entry.series.clone())
    }

    pub async fn put(&self, key: SeriesKey, series: Series) {
        let mut store = self.inner.write().await;
        if store.ttl.is_zero() {
            return;
        }
        let expires_at = Instant::now() + store.ttl;
        store.map.insert(key, CacheEntry { series, expires_at });
    }

    pub async fn clear_expired(&self) {
        let now = Instant::now();
        self.inner
            .write()
            .await
            .map
            .retain(|_, entry| entry.expires_at > now);
    }

    pub async fn clear(&self) {
        self.inner.write().await.map.clear();
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn is_disabled(&self) -> bool {
        self.inner.read().await.ttl.is_zero()
    }
}

impl Default for SeriesCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Observation, UtcDateTime};

    fn series(symbol: &str, close: f64) -> (SeriesKey, Series) {
        let symbol = Symbol::parse(symbol).expect("valid symbol");
        let ts = UtcDateTime::parse("2024-01-01T00:00:00Z").expect("valid ts");
        let series = Series::new(
            symbol.clone(),
            Period::OneMonth,
            Interval::OneWeek,
            vec![Observation::new(ts, close).expect("valid observation")],
        )
        .expect("valid series");
        (
            SeriesKey::new(symbol, Period::OneMonth, Interval::OneWeek),
            series,
        )
    }

    #[tokio::test]
    async fn stores_and_overwrites_entries() {
        let cache = SeriesCache::new(Duration::from_secs(60));
        let (key, first) = series("AAPL", 1.0);
        assert!(cache.get(&key).await.is_none());

        cache.put(key.clone(), first).await;
        let (_, second) = series("AAPL", 2.0);
        cache.put(key.clone(), second).await;

        let cached = cache.get(&key).await.expect("cached");
        assert_eq!(cached.current_value(), 2.0);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn keys_distinguish_period_and_interval() {
        let cache = SeriesCache::new(Duration::from_secs(60));
        let (key, value) = series("AAPL", 1.0);
        cache.put(key.clone(), value).await;

        let other = SeriesKey::new(key.symbol.clone(), Period::OneMonth, Interval::OneDay);
        assert!(cache.get(&other).await.is_none());
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = SeriesCache::new(Duration::from_millis(50));
        let (key, value) = series("AAPL", 1.0);
        cache.put(key.clone(), value).await;
        assert!(cache.get(&key).await.is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.get(&key).await.is_none());

        assert_eq!(cache.len().await, 1);
        cache.clear_expired().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn zero_ttl_disables_storage() {
        let cache = SeriesCache::disabled();
        let (key, value) = series("AAPL", 1.0);
        cache.put(key.clone(), value).await;

        assert!(cache.is_disabled().await);
        assert!(cache.get(&key).await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn clear_drops_everything() {
        let cache = SeriesCache::new(Duration::from_secs(60));
        for symbol in ["AAPL", "MSFT"] {
            let (key, value) = series(symbol, 1.0);
            cache.put(key, value).await;
        }
        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[test]
    fn cache_mode_controls_reads_and_writes() {
        assert_eq!(CacheMode::default(), CacheMode::Use);
        assert!(CacheMode::Use.reads() && CacheMode::Use.writes());
        assert!(!CacheMode::Refresh.reads() && CacheMode::Refresh.writes());
        assert!(!CacheMode::Bypass.reads() && !CacheMode::Bypass.writes());
        assert_eq!("REFRESH".parse::<CacheMode>(), Ok(CacheMode::Refresh));
    }
}
