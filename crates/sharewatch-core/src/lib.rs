//! # Sharewatch Core
//!
//! Computation layer for a share-price dashboard: percentage changes over
//! lookback windows, chart threshold bands, and multi-symbol comparisons.
//!
//! ## Overview
//!
//! - **Domain models** that validate on construction ([`Symbol`], [`Series`], [`ChangeWindows`])
//! - **Provider contract** for time-series sources, with a Yahoo chart adapter and a fixture provider
//! - **Provider client handle** owning the TTL series cache, rate limiter and fetch timeout
//! - **Change engine** computing per-window percentage changes concurrently
//! - **Band calculator** deriving chart y-axis ranges from observed prices and alert levels
//! - **Watchlist boundary** validating remote JSON into typed thresholds
//! - **History store contract** over the DuckDB warehouse
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Yahoo chart adapter and in-memory fixture provider |
//! | [`band`] | Threshold band calculator |
//! | [`cache`] | TTL series cache |
//! | [`change`] | Change engine and rounding helpers |
//! | [`circuit_breaker`] | Circuit breaker for upstream calls |
//! | [`client`] | Provider client handle |
//! | [`compare`] | Start/end deltas for the comparison view |
//! | [`config`] | TOML + environment configuration |
//! | [`data_source`] | Provider trait and error types |
//! | [`domain`] | Symbols, periods, intervals, series, windows |
//! | [`envelope`] | Response envelope with metadata |
//! | [`error`] | Validation and series errors |
//! | [`history`] | Historical change store contract |
//! | [`http_client`] | HTTP client abstraction |
//! | [`retry`] | Retry and backoff policy |
//! | [`source`] | Provider identifiers |
//! | [`watchlist`] | Watchlist parsing and sources |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sharewatch_core::{
//!     ChangeEngine, ChangeWindows, ClientOptions, ProviderClient, Symbol, YahooAdapter,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ProviderClient::new(Arc::new(YahooAdapter::default()), ClientOptions::default());
//!     let engine = ChangeEngine::new(client);
//!
//!     let symbols = Symbol::parse_unique(["AAPL", "CBA.AX"])?;
//!     let report = engine
//!         .compute_change_records(&symbols, &ChangeWindows::standard())
//!         .await;
//!
//!     for record in &report.records {
//!         println!("{} {}", record.symbol, record.current_display);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CLI / User     │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │  Change Engine  │────▶│ Band Calculator  │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Provider Client │────▶│ Series Cache     │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ MarketData      │────▶│ HTTP Client      │
//! │ Provider        │     │ (reqwest/none)   │
//! └─────────────────┘     └──────────────────┘
//! ```

pub mod adapters;
pub mod band;
pub mod cache;
pub mod change;
pub mod circuit_breaker;
pub mod client;
pub mod compare;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod history;
pub mod http_client;
pub mod retry;
pub mod source;
pub mod watchlist;

// Adapter implementations
pub use adapters::{FixtureError, FixtureProvider, YahooAdapter, YahooAuthManager};

// Band calculator
pub use band::{
    compute_band, compute_combined_band, BandError, BandOptions, SymbolBand, ThresholdBand,
    ThresholdReport,
};

// Caching
pub use cache::{CacheMode, SeriesCache, SeriesKey};

// Change engine
pub use change::{
    format_fixed, percent_change, round_half_up, round_to_cents, ChangeEngine, ChangeFailure,
    ChangeRecord, ChangeReport, Trend, WindowChange,
};

// Circuit breaker
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

// Provider client handle
pub use client::{ClientOptions, FetchError, ProviderClient};

// Comparison view
pub use compare::{delta_for_series, ComparisonReport, SymbolDelta};

// Configuration
pub use config::{ConfigError, DashboardConfig};

// Provider trait and types
pub use data_source::{
    FetchFuture, HealthState, HealthStatus, MarketDataProvider, ProviderError, ProviderErrorKind,
};

// Domain models
pub use domain::{
    ChangeWindows, Interval, Observation, Period, Series, Symbol, UtcDateTime, WindowLabel,
    WindowSpec,
};

// Envelope types
pub use envelope::{Envelope, EnvelopeError, EnvelopeMeta};

// Error types
pub use error::{CoreError, SeriesError, ValidationError};

// Historical changes
pub use history::{ChangeHistoryStore, ChangeSnapshot, HistoryError, InMemoryHistoryStore};

// Warehouse (re-exported from sharewatch-warehouse)
pub use sharewatch_warehouse::{ChangeSnapshotRow, Warehouse, WarehouseConfig, WarehouseError};

// HTTP client types
pub use http_client::{
    HttpClient, HttpError, HttpFuture, HttpRequest, HttpResponse, NoopHttpClient,
    ReqwestHttpClient,
};

// Retry logic
pub use retry::{Backoff, RetryConfig};

// Source identifiers
pub use source::ProviderId;

// Watchlists
pub use watchlist::{
    HttpWatchlistSource, StaticWatchlistSource, Watchlist, WatchlistEntry, WatchlistError,
    WatchlistSource, DEFAULT_WATCHLIST_URLS,
};
