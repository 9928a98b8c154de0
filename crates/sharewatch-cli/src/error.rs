use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
///
/// Exit code 3 (partial failure) is not an error: the envelope is still
/// rendered and the process exits with 3.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] sharewatch_core::ValidationError),

    #[error(transparent)]
    Config(#[from] sharewatch_core::ConfigError),

    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Watchlist(#[from] sharewatch_core::WatchlistError),

    #[error(transparent)]
    History(#[from] sharewatch_core::HistoryError),

    #[error(transparent)]
    Warehouse(#[from] sharewatch_core::WarehouseError),

    #[error("strict mode failed: warnings={warning_count}, errors={error_count}")]
    StrictModeViolation {
        warning_count: usize,
        error_count: usize,
    },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Config(_) => 2,
            Self::Command(_) => 2,
            Self::Watchlist(_) => 4,
            Self::Serialization(_) => 4,
            Self::StrictModeViolation { .. } => 5,
            Self::History(_) => 10,
            Self::Warehouse(_) => 10,
            Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_category() {
        assert_eq!(
            CliError::from(sharewatch_core::ValidationError::EmptySymbol).exit_code(),
            2
        );
        assert_eq!(
            CliError::StrictModeViolation {
                warning_count: 1,
                error_count: 0,
            }
            .exit_code(),
            5
        );
        assert_eq!(
            CliError::from(sharewatch_core::WatchlistError::DuplicateSymbol {
                symbol: sharewatch_core::Symbol::parse("AAPL").expect("symbol"),
            })
            .exit_code(),
            4
        );
        assert_eq!(
            CliError::from(std::io::Error::other("disk")).exit_code(),
            10
        );
    }
}
