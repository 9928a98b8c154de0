use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const MAX_SYMBOL_LEN: usize = 15;

/// Normalized equity ticker, optionally carrying an exchange suffix (`CBA.AX`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Parse and normalize a symbol to uppercase.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }

        let normalized = trimmed.to_ascii_uppercase();
        let len = normalized.chars().count();
        if len > MAX_SYMBOL_LEN {
            return Err(ValidationError::SymbolTooLong {
                len,
                max: MAX_SYMBOL_LEN,
            });
        }

        if let Some(first) = normalized.chars().next() {
            if !first.is_ascii_alphabetic() {
                return Err(ValidationError::SymbolInvalidStart { ch: first });
            }
        }

        if let Some((index, ch)) = normalized
            .chars()
            .enumerate()
            .find(|(_, ch)| !(ch.is_ascii_alphanumeric() || *ch == '.' || *ch == '-'))
        {
            return Err(ValidationError::SymbolInvalidChar { ch, index });
        }

        Ok(Self(normalized))
    }

    /// Parse a list of raw tickers, dropping repeats while keeping first-seen order.
    pub fn parse_unique<I, S>(inputs: I) -> Result<Vec<Self>, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut symbols: Vec<Self> = Vec::new();
        for raw in inputs {
            let symbol = Self::parse(raw.as_ref())?;
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }
        Ok(symbols)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Symbol {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalizes_symbol() {
        let parsed = Symbol::parse(" goog ").expect("symbol should parse");
        assert_eq!(parsed.as_str(), "GOOG");
    }

    #[test]
    fn accepts_exchange_suffix() {
        let parsed = Symbol::parse("cba.ax").expect("symbol should parse");
        assert_eq!(parsed.as_str(), "CBA.AX");
    }

    #[test]
    fn rejects_invalid_start() {
        let err = Symbol::parse("9NVDA").expect_err("must fail");
        assert!(matches!(err, ValidationError::SymbolInvalidStart { ch: '9' }));
    }

    #[test]
    fn rejects_invalid_chars() {
        let err = Symbol::parse("TSM$").expect_err("must fail");
        assert!(matches!(err, ValidationError::SymbolInvalidChar { ch: '$', index: 3 }));
    }

    #[test]
    fn parse_unique_drops_repeats_in_order() {
        let symbols = Symbol::parse_unique(["amzn", "GOOG", "AMZN"]).expect("valid symbols");
        let rendered: Vec<&str> = symbols.iter().map(Symbol::as_str).collect();
        assert_eq!(rendered, vec!["AMZN", "GOOG"]);
    }
}
