mod compare;
mod history;
mod numbers;
mod thresholds;
mod watchlist;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use sharewatch_core::{
    CacheMode, ChangeEngine, ChangeFailure, DashboardConfig, Envelope, EnvelopeError,
    FixtureProvider, HttpClient, HttpWatchlistSource, MarketDataProvider, ProviderClient,
    ProviderId, ReqwestHttpClient, StaticWatchlistSource, Warehouse, Watchlist, WatchlistSource,
    YahooAdapter,
};

use crate::cli::{Cli, Command, SourceSelector, WatchlistLocation};
use crate::error::CliError;
use crate::metadata::{Metadata, SCHEMA_VERSION};
use crate::output::Table;

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
    pub errors: Vec<EnvelopeError>,
    pub table: Option<Table>,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            warnings: Vec::new(),
            errors: Vec::new(),
            table: None,
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_errors(mut self, errors: Vec<EnvelopeError>) -> Self {
        self.errors.extend(errors);
        self
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.table = Some(table);
        self
    }
}

/// Envelope plus the optional table view of its data.
pub struct Rendered {
    pub envelope: Envelope<Value>,
    pub table: Option<Table>,
}

/// Resolved configuration and provider selection for one invocation.
pub struct Context {
    pub config: DashboardConfig,
    pub cache_mode: CacheMode,
    pub provider_id: ProviderId,
    fixture: Option<std::path::PathBuf>,
    mock: bool,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let mut config = DashboardConfig::load(cli.config.as_deref())?;
        if let Some(timeout_ms) = cli.timeout_ms {
            config.fetch_timeout_ms = timeout_ms;
        }
        if let Some(max_concurrency) = cli.max_concurrency {
            config.max_concurrency = max_concurrency;
        }
        config.validate()?;

        let provider_id = match (cli.source, &cli.fixture) {
            (Some(SourceSelector::Yahoo), Some(_)) => {
                return Err(CliError::Command(String::from(
                    "--fixture cannot be combined with --source yahoo",
                )))
            }
            (Some(SourceSelector::Yahoo), None) => ProviderId::Yahoo,
            (Some(SourceSelector::Fixture), _) | (None, Some(_)) => ProviderId::Fixture,
            (None, None) => config.source,
        };

        Ok(Self {
            config,
            cache_mode: CacheMode::from(cli.cache_mode),
            provider_id,
            fixture: cli.fixture.clone(),
            mock: cli.mock,
        })
    }

    fn provider(&self) -> Result<Arc<dyn MarketDataProvider>, CliError> {
        match self.provider_id {
            ProviderId::Fixture => {
                let path = self.fixture.as_ref().ok_or_else(|| {
                    CliError::Command(String::from("the fixture source needs --fixture <path>"))
                })?;
                let provider = FixtureProvider::from_path(path).map_err(|error| {
                    CliError::Command(format!("failed to load fixture: {error}"))
                })?;
                Ok(Arc::new(provider))
            }
            ProviderId::Yahoo if self.mock => Ok(Arc::new(YahooAdapter::default())),
            ProviderId::Yahoo => {
                let http_client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
                let mut adapter = YahooAdapter::live(http_client);
                if self.config.fetch_timeout_ms > 0 {
                    adapter = adapter
                        .with_request_timeout(Duration::from_millis(self.config.fetch_timeout_ms));
                }
                Ok(Arc::new(adapter))
            }
        }
    }

    pub fn engine(&self) -> Result<ChangeEngine, CliError> {
        let client = ProviderClient::new(
            self.provider()?,
            self.config.client_options(self.cache_mode),
        );
        tracing::debug!(
            source = %self.provider_id,
            max_concurrency = self.config.max_concurrency,
            "built change engine"
        );
        Ok(ChangeEngine::new(client)
            .with_max_concurrency(self.config.max_concurrency)
            .with_band_options(self.config.band_options()))
    }

    pub async fn watchlist(&self, location: &WatchlistLocation) -> Result<Watchlist, CliError> {
        if !location.files.is_empty() {
            let source = StaticWatchlistSource::from_paths(&location.files)?;
            return Ok(source.get_watchlist().await?);
        }

        if self.config.watchlist_urls.is_empty() {
            return Err(CliError::Command(String::from(
                "no watchlist configured; pass --watchlist-file or set watchlist_urls",
            )));
        }
        let http_client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
        let source = HttpWatchlistSource::new(http_client, self.config.watchlist_urls.clone());
        Ok(source.get_watchlist().await?)
    }

    pub fn warehouse(&self) -> Result<Warehouse, CliError> {
        Ok(Warehouse::open(self.config.warehouse_config())?)
    }
}

pub async fn run(cli: &Cli) -> Result<Rendered, CliError> {
    let started = Instant::now();
    let context = Context::from_cli(cli)?;

    let command_result = match &cli.command {
        Command::Numbers(args) => numbers::run(args, &context).await?,
        Command::Thresholds(args) => thresholds::run(args, &context).await?,
        Command::Compare(args) => compare::run(args, &context).await?,
        Command::History(args) => history::run(args, &context)?,
        Command::Watchlist(args) => watchlist::run(args, &context).await?,
    };

    let CommandResult {
        data,
        mut warnings,
        errors,
        table,
    } = command_result;
    tracing::debug!(
        rows = table.as_ref().map(Table::len),
        errors = errors.len(),
        "command finished"
    );

    if cli.mock && context.provider_id != ProviderId::Yahoo {
        warnings.push(String::from("--mock only applies to the yahoo source"));
    }

    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let mut metadata = Metadata::new(vec![context.provider_id], latency_ms, context.cache_mode)?;
    for warning in warnings {
        metadata.push_warning(warning);
    }
    let meta = metadata.into_envelope_meta(SCHEMA_VERSION)?;

    let envelope = Envelope::with_errors(meta, data, errors)?;
    Ok(Rendered { envelope, table })
}

/// Envelope errors for engine failures, scoped to symbol and window.
pub(crate) fn failure_errors(
    failures: &[ChangeFailure],
    source: ProviderId,
) -> Result<Vec<EnvelopeError>, CliError> {
    failures
        .iter()
        .map(|failure| -> Result<EnvelopeError, CliError> {
            let mut error = EnvelopeError::new(failure.code.as_str(), failure.message.as_str())?
                .with_symbol(failure.symbol.as_str())
                .with_source(source);
            if let Some(window) = &failure.window {
                error = error.with_window(window.as_str());
            }
            Ok(error)
        })
        .collect()
}

/// Percent cell text; undefined windows render as `n/a`.
pub(crate) fn percent_cell(percent: Option<rust_decimal::Decimal>) -> String {
    percent.map_or_else(|| String::from("n/a"), |percent| format!("{percent}%"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use rust_decimal::Decimal;
    use sharewatch_core::{Symbol, WindowLabel};

    #[test]
    fn failure_errors_keep_symbol_and_window() {
        let symbol = Symbol::parse("AAPL").expect("symbol");
        let window = WindowLabel::parse("5D").expect("label");
        let failures = vec![
            ChangeFailure::symbol(&symbol, "series.empty", "no rows"),
            ChangeFailure::window(&symbol, &window, "provider.unavailable", "down"),
        ];

        let errors = failure_errors(&failures, ProviderId::Fixture).expect("errors");
        assert_eq!(errors[0].window, None);
        assert_eq!(errors[1].window.as_deref(), Some("5D"));
        assert_eq!(errors[1].symbol.as_deref(), Some("AAPL"));
        assert_eq!(errors[1].source, Some(ProviderId::Fixture));
    }

    fn config_file(contents: &str) -> tempfile::NamedTempFile {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "{contents}").expect("write config");
        file
    }

    #[test]
    fn flags_override_file_values_before_validation() {
        let file = config_file("source = \"fixture\"\nmax_concurrency = 0");
        let path = file.path().to_str().expect("utf-8 path");

        let cli = Cli::try_parse_from([
            "sharewatch",
            "--config",
            path,
            "--max-concurrency",
            "4",
            "watchlist",
        ])
        .expect("parse");
        let context = Context::from_cli(&cli).expect("flag repairs file value");
        assert_eq!(context.config.max_concurrency, 4);
        assert_eq!(context.provider_id, ProviderId::Fixture);

        let cli = Cli::try_parse_from(["sharewatch", "--config", path, "watchlist"]).expect("parse");
        assert!(matches!(Context::from_cli(&cli), Err(CliError::Config(_))));
    }

    #[test]
    fn percent_cells_keep_two_places() {
        assert_eq!(percent_cell(Some(Decimal::new(1000, 2))), "10.00%");
        assert_eq!(percent_cell(Some(Decimal::new(-234, 2))), "-2.34%");
        assert_eq!(percent_cell(None), "n/a");
    }
}
