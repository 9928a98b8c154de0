//! Provider adapters.
//!
//! | Adapter | Upstream |
//! |---------|----------|
//! | [`YahooAdapter`] | Yahoo Finance chart endpoint (or seeded offline closes) |
//! | [`FixtureProvider`] | Canned in-memory or JSON-file rows |

mod fixture;
mod yahoo;

pub use fixture::{FixtureError, FixtureProvider};
pub use yahoo::{YahooAdapter, YahooAuthManager};
