//! # Domain Models
//!
//! Canonical domain types for the dashboard computation layer.
//!
//! All types validate their invariants at construction time, so a value that
//! exists is a value the engine may use.
//!
//! ## Models
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Validated ticker, optionally with exchange suffix |
//! | [`Period`] | Lookback range (`1d` .. `5y`, `ytd`) |
//! | [`Interval`] | Sampling granularity (`1m` .. `3mo`) |
//! | [`UtcDateTime`] | UTC timestamp |
//! | [`Observation`] | One `(timestamp, close)` sample |
//! | [`Series`] | Non-empty, time-ordered observations for one request |
//! | [`ChangeWindows`] | Ordered, label-unique set of lookback windows |
//!
//! ## Validation
//!
//! ```rust,ignore
//! use sharewatch_core::{Interval, Observation, Period, Series, SeriesError, Symbol};
//!
//! let symbol = Symbol::parse("aapl")?;
//! let empty = Series::new(symbol, Period::OneMonth, Interval::OneWeek, Vec::new());
//! assert!(matches!(empty, Err(SeriesError::EmptySeries { .. })));
//! ```

mod interval;
mod series;
mod symbol;
mod timestamp;
mod window;

pub use interval::{Interval, Period};
pub use series::{Observation, Series};
pub use symbol::Symbol;
pub use timestamp::UtcDateTime;
pub use window::{ChangeWindows, WindowLabel, WindowSpec};
