use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{Interval, Period, ValidationError};

/// Column label of a change window, e.g. `1M`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WindowLabel(String);

impl WindowLabel {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyWindowLabel);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for WindowLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for WindowLabel {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<WindowLabel> for String {
    fn from(value: WindowLabel) -> Self {
        value.0
    }
}

/// One labelled lookback window and the request used to fetch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub label: WindowLabel,
    pub period: Period,
    pub interval: Interval,
}

impl WindowSpec {
    pub fn new(label: &str, period: Period, interval: Interval) -> Result<Self, ValidationError> {
        Ok(Self {
            label: WindowLabel::parse(label)?,
            period,
            interval,
        })
    }
}

/// Ordered set of change windows with unique labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChangeWindows(Vec<WindowSpec>);

impl ChangeWindows {
    /// Request used for the "now" price every window is compared against.
    pub const CURRENT: (Period, Interval) = (Period::OneDay, Interval::OneHour);

    pub fn new(windows: Vec<WindowSpec>) -> Result<Self, ValidationError> {
        if windows.is_empty() {
            return Err(ValidationError::EmptyWindowSet);
        }

        for (index, window) in windows.iter().enumerate() {
            if windows[..index].iter().any(|seen| seen.label == window.label) {
                return Err(ValidationError::DuplicateWindowLabel {
                    label: window.label.to_string(),
                });
            }
        }

        Ok(Self(windows))
    }

    /// The dashboard's standard columns, 1D through 5Y.
    pub fn standard() -> Self {
        let table = [
            ("1D", Period::OneDay, Interval::OneHour),
            ("5D", Period::FiveDays, Interval::OneDay),
            ("1M", Period::OneMonth, Interval::OneWeek),
            ("3M", Period::ThreeMonths, Interval::OneMonth),
            ("6M", Period::SixMonths, Interval::OneMonth),
            ("1Y", Period::OneYear, Interval::ThreeMonths),
            ("3Y", Period::ThreeYears, Interval::ThreeMonths),
            ("5Y", Period::FiveYears, Interval::ThreeMonths),
        ];

        Self(
            table
                .into_iter()
                .map(|(label, period, interval)| WindowSpec {
                    label: WindowLabel(label.to_owned()),
                    period,
                    interval,
                })
                .collect(),
        )
    }

    /// Keep only the named labels, in canonical order.
    ///
    /// Labels match case-insensitively; any label outside this set is an error.
    pub fn select<S: AsRef<str>>(&self, labels: &[S]) -> Result<Self, ValidationError> {
        for label in labels {
            let label = label.as_ref().trim();
            if !self
                .0
                .iter()
                .any(|window| label.eq_ignore_ascii_case(window.label.as_str()))
            {
                return Err(ValidationError::UnknownWindowLabel {
                    label: label.to_owned(),
                    known: self.labels().join(", "),
                });
            }
        }

        let selected = self
            .0
            .iter()
            .filter(|window| {
                labels.iter().any(|label| {
                    label
                        .as_ref()
                        .trim()
                        .eq_ignore_ascii_case(window.label.as_str())
                })
            })
            .cloned()
            .collect();
        Self::new(selected)
    }

    fn labels(&self) -> Vec<&str> {
        self.0.iter().map(|window| window.label.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WindowSpec> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ChangeWindows {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_windows_keep_dashboard_order() {
        let labels: Vec<String> = ChangeWindows::standard()
            .iter()
            .map(|window| window.label.to_string())
            .collect();
        assert_eq!(labels, ["1D", "5D", "1M", "3M", "6M", "1Y", "3Y", "5Y"]);
    }

    #[test]
    fn one_month_window_samples_weekly() {
        let windows = ChangeWindows::standard();
        let month = windows
            .iter()
            .find(|window| window.label.as_str() == "1M")
            .expect("1M present");
        assert_eq!((month.period, month.interval), (Period::OneMonth, Interval::OneWeek));
    }

    #[test]
    fn rejects_duplicate_labels() {
        let err = ChangeWindows::new(vec![
            WindowSpec::new("1M", Period::OneMonth, Interval::OneWeek).expect("valid"),
            WindowSpec::new("1M", Period::OneMonth, Interval::OneDay).expect("valid"),
        ])
        .expect_err("must fail");
        assert!(matches!(err, ValidationError::DuplicateWindowLabel { .. }));
    }

    #[test]
    fn select_filters_but_keeps_order() {
        let selected = ChangeWindows::standard()
            .select(&["5y", "1D"])
            .expect("valid selection");
        let labels: Vec<&str> = selected.iter().map(|window| window.label.as_str()).collect();
        assert_eq!(labels, ["1D", "5Y"]);
    }

    #[test]
    fn select_rejects_labels_outside_the_set() {
        let err = ChangeWindows::standard()
            .select(&["1M", "2W"])
            .expect_err("must fail");
        assert_eq!(
            err,
            ValidationError::UnknownWindowLabel {
                label: String::from("2W"),
                known: String::from("1D, 5D, 1M, 3M, 6M, 1Y, 3Y, 5Y"),
            }
        );
    }

    #[test]
    fn select_with_no_labels_is_empty_error() {
        let none: [&str; 0] = [];
        let err = ChangeWindows::standard()
            .select(&none)
            .expect_err("must fail");
        assert_eq!(err, ValidationError::EmptyWindowSet);
    }
}
