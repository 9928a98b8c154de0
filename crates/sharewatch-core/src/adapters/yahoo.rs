use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;

use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::data_source::{FetchFuture, HealthStatus, MarketDataProvider, ProviderError};
use crate::http_client::{HttpClient, HttpRequest, HttpResponse, NoopHttpClient};
use crate::retry::RetryConfig;
use crate::{Interval, Observation, Period, ProviderId, Symbol, UtcDateTime};

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const COOKIE_URL: &str = "https://fc.yahoo.com";
const REFERER: &str = "https://finance.yahoo.com/";
const COOKIE_ENV: &str = "SHAREWATCH_YAHOO_COOKIE";
const MAX_OFFLINE_POINTS: i64 = 400;

// ============================================================================
// Cookie/crumb authentication
// ============================================================================

#[derive(Debug, Default)]
struct AuthState {
    crumb: Option<String>,
    refreshed_at: Option<Instant>,
}

/// Caches the crumb token Yahoo's chart endpoint expects next to its session cookie.
///
/// The session cookie itself lives in the transport's cookie jar; only the crumb
/// is tracked here. Refreshes are serialized by the async lock.
#[derive(Debug)]
pub struct YahooAuthManager {
    state: Mutex<AuthState>,
    ttl: Duration,
}

impl Default for YahooAuthManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

impl YahooAuthManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: Mutex::new(AuthState::default()),
            ttl,
        }
    }

    /// Return the cached crumb, fetching a fresh one when missing or expired.
    pub async fn crumb(
        &self,
        http_client: &dyn HttpClient,
        base_url: &str,
        timeout: Duration,
    ) -> Result<String, ProviderError> {
        let mut state = self.state.lock().await;
        let fresh = state
            .refreshed_at
            .is_some_and(|refreshed_at| refreshed_at.elapsed() < self.ttl);
        if let (true, Some(crumb)) = (fresh, state.crumb.as_ref()) {
            return Ok(crumb.clone());
        }

        let crumb = fetch_crumb(http_client, base_url, timeout).await?;
        state.crumb = Some(crumb.clone());
        state.refreshed_at = Some(Instant::now());
        Ok(crumb)
    }

    pub async fn invalidate(&self) {
        *self.state.lock().await = AuthState::default();
    }
}

async fn fetch_crumb(
    http_client: &dyn HttpClient,
    base_url: &str,
    timeout: Duration,
) -> Result<String, ProviderError> {
    let cookie_request = HttpRequest::get(COOKIE_URL)
        .with_header("referer", REFERER)
        .with_timeout(timeout);
    // fc.yahoo.com answers 404 while still setting the session cookie.
    http_client.execute(cookie_request).await.map_err(|e| {
        ProviderError::unavailable(format!("failed to fetch yahoo session cookie: {}", e.message()))
    })?;

    let crumb_request = HttpRequest::get(format!("{base_url}/v1/test/getcrumb"))
        .with_header("referer", REFERER)
        .with_timeout(timeout);
    let response = http_client.execute(crumb_request).await.map_err(|e| {
        ProviderError::unavailable(format!("failed to fetch yahoo crumb: {}", e.message()))
    })?;

    if response.status == 429 {
        return Err(ProviderError::rate_limited(
            "yahoo rate limited the crumb request",
        ));
    }

    let body = response.body.trim();
    let plausible = response.is_success()
        && !body.is_empty()
        && body.len() < 100
        && !body.contains(char::is_whitespace)
        && !body.contains('<');
    if !plausible {
        return Err(ProviderError::unavailable(format!(
            "yahoo crumb endpoint returned status {} without a usable crumb",
            response.status
        )));
    }

    Ok(body.to_owned())
}

// ============================================================================
// Yahoo adapter
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Seeded synthetic closes, no network.
    Offline,
    Live,
}

/// Yahoo Finance chart adapter.
///
/// `YahooAdapter::default()` runs offline and produces deterministic synthetic
/// closes per symbol; [`YahooAdapter::live`] talks to the real chart endpoint.
#[derive(Clone)]
pub struct YahooAdapter {
    mode: Mode,
    http_client: Arc<dyn HttpClient>,
    auth_manager: Arc<YahooAuthManager>,
    circuit_breaker: Arc<CircuitBreaker>,
    retry: RetryConfig,
    base_url: String,
    request_timeout: Duration,
    cookie: Option<String>,
}

impl Default for YahooAdapter {
    fn default() -> Self {
        Self {
            mode: Mode::Offline,
            http_client: Arc::new(NoopHttpClient),
            auth_manager: Arc::new(YahooAuthManager::default()),
            circuit_breaker: Arc::new(CircuitBreaker::default()),
            retry: RetryConfig::default(),
            base_url: String::from(DEFAULT_BASE_URL),
            request_timeout: Duration::from_secs(10),
            cookie: None,
        }
    }
}

impl YahooAdapter {
    /// Adapter that calls the real chart endpoint through `http_client`.
    ///
    /// `SHAREWATCH_YAHOO_COOKIE`, when set, is sent verbatim as the session cookie.
    pub fn live(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            mode: Mode::Live,
            http_client,
            cookie: std::env::var(COOKIE_ENV).ok().filter(|value| !value.is_empty()),
            ..Self::default()
        }
    }

    pub fn with_circuit_breaker(mut self, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn is_live(&self) -> bool {
        self.mode == Mode::Live
    }

    fn chart_url(&self, symbol: &Symbol, period: Period, interval: Interval, crumb: &str) -> String {
        format!(
            "{}/v8/finance/chart/{}?range={}&interval={}&includePrePost=false&crumb={}",
            self.base_url,
            urlencoding::encode(symbol.as_str()),
            period.as_str(),
            interval.as_str(),
            urlencoding::encode(crumb)
        )
    }

    async fn fetch_live(
        &self,
        symbol: &Symbol,
        period: Period,
        interval: Interval,
    ) -> Result<Vec<Observation>, ProviderError> {
        if !self.circuit_breaker.allow_request() {
            return Err(ProviderError::unavailable(
                "yahoo circuit breaker is open; skipping upstream call",
            ));
        }

        let mut reauthenticated = false;
        let mut attempt = 0_u32;
        loop {
            let crumb = self
                .auth_manager
                .crumb(self.http_client.as_ref(), &self.base_url, self.request_timeout)
                .await?;
            let request = HttpRequest::get(self.chart_url(symbol, period, interval, &crumb))
                .with_header("referer", REFERER)
                .with_cookie(self.cookie.as_deref())
                .with_timeout(self.request_timeout);

            let failure = match self.http_client.execute(request).await {
                Ok(response) => match classify(symbol, response) {
                    Outcome::Body(body) => {
                        self.circuit_breaker.record_success();
                        return parse_chart(symbol, &body);
                    }
                    Outcome::Rejected(error) => {
                        // The upstream answered; it is healthy even if the symbol is not.
                        self.circuit_breaker.record_success();
                        return Err(error);
                    }
                    Outcome::Unauthorized if !reauthenticated => {
                        reauthenticated = true;
                        self.auth_manager.invalidate().await;
                        continue;
                    }
                    Outcome::Unauthorized => {
                        self.circuit_breaker.record_failure();
                        return Err(ProviderError::unavailable(
                            "yahoo rejected the request after refreshing credentials",
                        ));
                    }
                    Outcome::Transient { status, error } => {
                        if !self.retry.should_retry_status(status) {
                            self.circuit_breaker.record_failure();
                            return Err(error);
                        }
                        error
                    }
                },
                Err(error) => {
                    let message = format!("yahoo transport error: {}", error.message());
                    if error.is_timeout() && !self.retry.retry_on_timeout {
                        self.circuit_breaker.record_failure();
                        return Err(ProviderError::unavailable(message));
                    }
                    ProviderError::unavailable(message)
                }
            };

            self.circuit_breaker.record_failure();
            if !self.retry.has_attempts_left(attempt) || !self.circuit_breaker.allow_request() {
                return Err(failure);
            }

            let delay = self.retry.delay_for_attempt(attempt);
            tracing::debug!(
                symbol = %symbol,
                attempt = attempt + 1,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %failure,
                "retrying yahoo chart request"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn fetch_offline(
        &self,
        symbol: &Symbol,
        period: Period,
        interval: Interval,
    ) -> Result<Vec<Observation>, ProviderError> {
        let now = UtcDateTime::now().into_inner();
        let step = interval.step();
        let span = period.span(now);
        let points = (span.whole_seconds() / step.whole_seconds().max(1)).clamp(1, MAX_OFFLINE_POINTS);

        let seed = symbol_seed(symbol);
        let base = 20.0 + (seed % 4_800) as f64 / 10.0;
        let drift = ((seed % 7) as f64 - 3.0) / 1_000.0;

        (0..points)
            .map(|index| {
                let ts = UtcDateTime::from_offset_datetime(now - step * (points - 1 - index) as i32)
                    .map_err(|e| ProviderError::internal(e.to_string()))?;
                let wobble = ((seed.wrapping_add(index as u64 * 7)) % 23) as f64 / 10.0 - 1.1;
                let close = (base * (1.0 + drift * index as f64) + wobble).max(0.01);
                Observation::new(ts, (close * 100.0).round() / 100.0)
                    .map_err(|e| ProviderError::internal(e.to_string()))
            })
            .collect()
    }
}

impl MarketDataProvider for YahooAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Yahoo
    }

    fn fetch_series<'a>(
        &'a self,
        symbol: &'a Symbol,
        period: Period,
        interval: Interval,
    ) -> FetchFuture<'a> {
        Box::pin(async move {
            match self.mode {
                Mode::Offline => self.fetch_offline(symbol, period, interval),
                Mode::Live => self.fetch_live(symbol, period, interval).await,
            }
        })
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>> {
        Box::pin(async move {
            match self.circuit_breaker.state() {
                CircuitState::Closed => HealthStatus::healthy(),
                CircuitState::HalfOpen => HealthStatus::degraded(),
                CircuitState::Open => HealthStatus::unhealthy(),
            }
        })
    }
}

// ============================================================================
// Response handling
// ============================================================================

enum Outcome {
    Body(String),
    Rejected(ProviderError),
    Unauthorized,
    Transient { status: u16, error: ProviderError },
}

fn classify(symbol: &Symbol, response: HttpResponse) -> Outcome {
    match response.status {
        200..=299 => Outcome::Body(response.body),
        401 | 403 => Outcome::Unauthorized,
        404 => Outcome::Rejected(ProviderError::unknown_symbol(symbol)),
        429 => Outcome::Transient {
            status: 429,
            error: ProviderError::rate_limited("yahoo returned status 429"),
        },
        status @ (408 | 500..=599) => Outcome::Transient {
            status,
            error: ProviderError::unavailable(format!("yahoo returned status {status}")),
        },
        status => Outcome::Rejected(ProviderError::invalid_request(format!(
            "yahoo returned status {status} for {symbol}"
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

fn parse_chart(symbol: &Symbol, body: &str) -> Result<Vec<Observation>, ProviderError> {
    let response: ChartResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::malformed(format!("failed to parse yahoo chart: {e}")))?;

    if let Some(error) = response.chart.error {
        if error.code.eq_ignore_ascii_case("not found")
            || error.description.contains("No data found")
        {
            return Err(ProviderError::unknown_symbol(symbol));
        }
        return Err(ProviderError::unavailable(format!(
            "yahoo chart error {}: {}",
            error.code, error.description
        )));
    }

    let Some(result) = response.chart.result.and_then(|results| results.into_iter().next()) else {
        return Err(ProviderError::unknown_symbol(symbol));
    };

    // A range with no trading activity comes back without timestamps.
    let Some(timestamps) = result.timestamp else {
        return Ok(Vec::new());
    };
    let closes = result
        .indicators
        .quote
        .into_iter()
        .next()
        .map(|quote| quote.close)
        .ok_or_else(|| ProviderError::malformed("yahoo chart has no quote indicators"))?;

    let mut observations: Vec<Observation> = Vec::with_capacity(timestamps.len());
    for (ts, close) in timestamps.into_iter().zip(closes) {
        let Some(close) = close else {
            continue;
        };
        let ts = UtcDateTime::from_unix_timestamp(ts)
            .map_err(|e| ProviderError::malformed(e.to_string()))?;
        let observation =
            Observation::new(ts, close).map_err(|e| ProviderError::malformed(e.to_string()))?;

        // The live bar is sometimes repeated with the same timestamp; keep the latest.
        match observations.last_mut() {
            Some(last) if last.ts == observation.ts => *last = observation,
            _ => observations.push(observation),
        }
    }

    Ok(observations)
}

fn symbol_seed(symbol: &Symbol) -> u64 {
    symbol.as_str().bytes().fold(0_u64, |acc, byte| {
        acc.wrapping_mul(33).wrapping_add(u64::from(byte))
    })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use crate::data_source::{HealthState, ProviderErrorKind};
    use crate::http_client::{HttpError, HttpFuture};

    /// Serves crumb requests itself and pops chart responses from a queue.
    struct ScriptedHttpClient {
        chart: StdMutex<VecDeque<Result<HttpResponse, HttpError>>>,
        urls: StdMutex<Vec<String>>,
    }

    impl ScriptedHttpClient {
        fn new(chart: Vec<Result<HttpResponse, HttpError>>) -> Arc<Self> {
            Arc::new(Self {
                chart: StdMutex::new(chart.into()),
                urls: StdMutex::new(Vec::new()),
            })
        }

        fn chart_calls(&self) -> usize {
            self.urls
                .lock()
                .expect("url log lock")
                .iter()
                .filter(|url| url.contains("/v8/finance/chart/"))
                .count()
        }
    }

    impl HttpClient for ScriptedHttpClient {
        fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
            self.urls.lock().expect("url log lock").push(request.url.clone());
            let response = if request.url.contains("getcrumb") {
                Ok(HttpResponse::new(200, "crumb-abc"))
            } else if request.url.starts_with(COOKIE_URL) {
                Ok(HttpResponse::new(404, ""))
            } else {
                self.chart
                    .lock()
                    .expect("chart queue lock")
                    .pop_front()
                    .unwrap_or_else(|| Err(HttpError::new("script exhausted")))
            };
            Box::pin(async move { response })
        }
    }

    fn adapter(client: Arc<ScriptedHttpClient>) -> YahooAdapter {
        YahooAdapter::live(client).with_retry(RetryConfig::fixed(Duration::ZERO, 2))
    }

    fn symbol(value: &str) -> Symbol {
        Symbol::parse(value).expect("valid symbol")
    }

    const CHART_WITH_GAP: &str = r#"{"chart":{"result":[{"timestamp":[1700000000,1700086400,1700172800,1700172800],
        "indicators":{"quote":[{"close":[10.0,null,12.5,12.75]}]}}],"error":null}}"#;

    #[tokio::test]
    async fn live_fetch_skips_missing_closes_and_collapses_repeated_bar() {
        let client = ScriptedHttpClient::new(vec![Ok(HttpResponse::ok_json(CHART_WITH_GAP))]);
        let rows = adapter(client.clone())
            .fetch_series(&symbol("AAPL"), Period::FiveDays, Interval::OneDay)
            .await
            .expect("chart parses");

        let closes: Vec<f64> = rows.iter().map(|row| row.close).collect();
        assert_eq!(closes, [10.0, 12.75]);
        assert_eq!(client.chart_calls(), 1);
    }

    #[tokio::test]
    async fn chart_url_carries_range_interval_and_crumb() {
        let client = ScriptedHttpClient::new(vec![Ok(HttpResponse::ok_json(CHART_WITH_GAP))]);
        adapter(client.clone())
            .fetch_series(&symbol("CBA.AX"), Period::YearToDate, Interval::OneWeek)
            .await
            .expect("chart parses");

        let urls = client.urls.lock().expect("url log lock");
        let chart = urls
            .iter()
            .find(|url| url.contains("/v8/finance/chart/"))
            .expect("chart call recorded");
        assert!(chart.contains("/chart/CBA.AX?range=ytd&interval=1wk"), "{chart}");
        assert!(chart.ends_with("crumb=crumb-abc"), "{chart}");
    }

    #[tokio::test]
    async fn not_found_maps_to_unknown_symbol_without_retry() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let client = ScriptedHttpClient::new(vec![Ok(HttpResponse::new(404, body))]);
        let error = adapter(client.clone())
            .fetch_series(&symbol("ZZZZ"), Period::OneMonth, Interval::OneWeek)
            .await
            .expect_err("unknown symbol");

        assert_eq!(error.kind(), ProviderErrorKind::UnknownSymbol);
        assert_eq!(client.chart_calls(), 1);
    }

    #[tokio::test]
    async fn chart_error_in_success_body_maps_to_unknown_symbol() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found"}}}"#;
        let client = ScriptedHttpClient::new(vec![Ok(HttpResponse::ok_json(body))]);
        let error = adapter(client)
            .fetch_series(&symbol("ZZZZ"), Period::OneMonth, Interval::OneWeek)
            .await
            .expect_err("unknown symbol");
        assert_eq!(error.code(), "provider.unknown_symbol");
    }

    #[tokio::test]
    async fn rate_limiting_is_retried_then_reported() {
        let client = ScriptedHttpClient::new(vec![
            Ok(HttpResponse::new(429, "Too Many Requests")),
            Ok(HttpResponse::new(429, "Too Many Requests")),
            Ok(HttpResponse::new(429, "Too Many Requests")),
        ]);
        let adapter = adapter(client.clone()).with_circuit_breaker(Arc::new(CircuitBreaker::new(
            CircuitBreakerConfig {
                failure_threshold: 10,
                open_timeout: Duration::from_secs(30),
            },
        )));

        let error = adapter
            .fetch_series(&symbol("MSFT"), Period::OneDay, Interval::OneHour)
            .await
            .expect_err("rate limited");
        assert_eq!(error.kind(), ProviderErrorKind::RateLimited);
        assert_eq!(client.chart_calls(), 3);
    }

    #[tokio::test]
    async fn transient_failure_recovers_on_retry() {
        let client = ScriptedHttpClient::new(vec![
            Ok(HttpResponse::new(503, "")),
            Ok(HttpResponse::ok_json(CHART_WITH_GAP)),
        ]);
        let rows = adapter(client.clone())
            .fetch_series(&symbol("MSFT"), Period::FiveDays, Interval::OneDay)
            .await
            .expect("second attempt succeeds");
        assert_eq!(rows.len(), 2);
        assert_eq!(client.chart_calls(), 2);
    }

    #[tokio::test]
    async fn unparseable_body_is_malformed() {
        let client = ScriptedHttpClient::new(vec![Ok(HttpResponse::ok_json("<html>oops</html>"))]);
        let error = adapter(client)
            .fetch_series(&symbol("MSFT"), Period::FiveDays, Interval::OneDay)
            .await
            .expect_err("malformed");
        assert_eq!(error.kind(), ProviderErrorKind::Malformed);
    }

    #[tokio::test]
    async fn missing_timestamps_yield_no_rows() {
        let body = r#"{"chart":{"result":[{"indicators":{"quote":[{}]}}],"error":null}}"#;
        let client = ScriptedHttpClient::new(vec![Ok(HttpResponse::ok_json(body))]);
        let rows = adapter(client)
            .fetch_series(&symbol("MSFT"), Period::OneDay, Interval::OneHour)
            .await
            .expect("parses");
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn circuit_breaker_opens_after_repeated_transport_failures() {
        let client = ScriptedHttpClient::new(vec![
            Err(HttpError::new("connection reset")),
            Err(HttpError::new("connection reset")),
            Err(HttpError::new("connection reset")),
        ]);
        let adapter = YahooAdapter::live(client.clone()).with_retry(RetryConfig::no_retry());
        let msft = symbol("MSFT");

        for _ in 0..3 {
            let error = adapter
                .fetch_series(&msft, Period::OneDay, Interval::OneHour)
                .await
                .expect_err("transport fails");
            assert_eq!(error.kind(), ProviderErrorKind::Unavailable);
        }

        let health = adapter.health().await;
        assert_eq!(health.state, HealthState::Unhealthy);

        let error = adapter
            .fetch_series(&msft, Period::OneDay, Interval::OneHour)
            .await
            .expect_err("breaker blocks");
        assert!(error.message().contains("circuit breaker is open"));
        assert_eq!(client.chart_calls(), 3);
    }

    #[tokio::test]
    async fn offline_mode_is_deterministic_and_ordered() {
        let adapter = YahooAdapter::default();
        let nvda = symbol("NVDA");

        let first = adapter
            .fetch_series(&nvda, Period::OneMonth, Interval::OneWeek)
            .await
            .expect("offline fetch");
        let second = adapter
            .fetch_series(&nvda, Period::OneMonth, Interval::OneWeek)
            .await
            .expect("offline fetch");

        let closes = |rows: &[Observation]| rows.iter().map(|row| row.close).collect::<Vec<_>>();
        assert_eq!(closes(&first), closes(&second));
        assert!(first.len() >= 4);
        assert!(first.windows(2).all(|pair| pair[0].ts < pair[1].ts));
        assert!(first.iter().all(|row| row.close > 0.0));
    }

    #[tokio::test]
    async fn offline_current_fetch_returns_hourly_rows() {
        let rows = YahooAdapter::default()
            .fetch_series(&symbol("AAPL"), Period::OneDay, Interval::OneHour)
            .await
            .expect("offline fetch");
        assert_eq!(rows.len(), 24);
    }
}
