// Shared fixtures for behavior tests
pub use sharewatch_core::{
    ChangeEngine, ChangeWindows, ClientOptions, FixtureProvider, Interval, Period,
    ProviderClient, ProviderError, Symbol,
};
pub use std::sync::Arc;

pub fn symbol(value: &str) -> Symbol {
    Symbol::parse(value).expect("valid symbol")
}

/// Engine over `provider` with throttling off, so tests never wait on the limiter.
pub fn engine(provider: FixtureProvider) -> ChangeEngine {
    let client = ProviderClient::new(
        Arc::new(provider),
        ClientOptions {
            requests_per_minute: None,
            ..ClientOptions::default()
        },
    );
    ChangeEngine::new(client)
}
