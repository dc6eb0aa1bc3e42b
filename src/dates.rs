//! Translation of natural-language time references into observation date bounds.
//!
//! A [`TimeReference`] describes one side of a range: a relative offset
//! ("10 years ago"), the current date, or an exact `MM-DD-YYYY` date.
//! [`resolve_date_range`] turns a start/end pair into ISO calendar dates
//! against a single captured "today" so both sides agree.
//!
//! # Rules
//!
//! | Period | Resolution |
//! |--------|------------|
//! | `current` | today; as the **start** side it resolves to `None` (unbounded) |
//! | `exact` | `exact_date` parsed strictly as `MM-DD-YYYY` |
//! | `day` / `week` | today minus `duration` days or weeks |
//! | `month` / `year` | today minus `duration` calendar months or years, clamped to month end |
//!
//! Malformed references are rejected with [`ResolveError::Validation`]; no
//! default duration is ever guessed.

use std::str::FromStr;

use chrono::{Days, Local, Months, NaiveDate};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ResolveError, ResolveResult};
use crate::oracle::OracleOutput;

/// Time period unit of a [`TimeReference`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    Week,
    Month,
    Year,
    Current,
    Exact,
}

impl Period {
    fn is_relative(self) -> bool {
        matches!(self, Period::Day | Period::Week | Period::Month | Period::Year)
    }
}

/// One side of a requested date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TimeReference {
    /// The time period unit. Use 'exact' for specific dates, 'current' for the
    /// current date, or day/week/month/year for relative dates.
    pub period: Period,
    /// Number of periods to go back in time. Required (>= 1) when period is
    /// day/week/month/year; omitted for 'current' and 'exact'.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    /// Specific date in MM-DD-YYYY format (e.g. '12-25-2023'). Required only
    /// when period is 'exact'.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact_date: Option<String>,
}

impl TimeReference {
    pub fn current() -> Self {
        Self {
            period: Period::Current,
            duration: None,
            exact_date: None,
        }
    }

    pub fn exact(date: impl Into<String>) -> Self {
        Self {
            period: Period::Exact,
            duration: None,
            exact_date: Some(date.into()),
        }
    }

    pub fn ago(period: Period, duration: u32) -> Self {
        Self {
            period,
            duration: Some(duration),
            exact_date: None,
        }
    }

    /// Check the period/duration/exact_date combination.
    pub fn validate(&self) -> ResolveResult<()> {
        if self.period.is_relative() {
            match self.duration {
                None => {
                    return Err(ResolveError::validation(format!(
                        "duration is required for period '{}'",
                        self.period_name()
                    )))
                }
                Some(0) => return Err(ResolveError::validation("duration must be >= 1")),
                Some(_) => {}
            }
        } else if self.duration.is_some() {
            return Err(ResolveError::validation(format!(
                "duration is not allowed for period '{}'",
                self.period_name()
            )));
        }

        match (self.period, &self.exact_date) {
            (Period::Exact, None) => Err(ResolveError::validation(
                "exact_date is required for period 'exact'",
            )),
            (Period::Exact, Some(date)) => parse_exact_date(date).map(|_| ()),
            (_, Some(_)) => Err(ResolveError::validation(format!(
                "exact_date is not allowed for period '{}'",
                self.period_name()
            ))),
            (_, None) => Ok(()),
        }
    }

    fn period_name(&self) -> &'static str {
        match self.period {
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
            Period::Year => "year",
            Period::Current => "current",
            Period::Exact => "exact",
        }
    }
}

/// Compact text form used on the command line: `current`,
/// `exact:MM-DD-YYYY` or `<n>:<day|week|month|year>`.
impl FromStr for TimeReference {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("current") {
            return Ok(Self::current());
        }
        let Some((head, tail)) = s.split_once(':') else {
            return Err(ResolveError::validation(format!(
                "'{}' is not current, exact:MM-DD-YYYY or <n>:<unit>",
                s
            )));
        };
        if head.eq_ignore_ascii_case("exact") {
            let reference = Self::exact(tail);
            reference.validate()?;
            return Ok(reference);
        }

        let duration: u32 = head
            .parse()
            .map_err(|_| ResolveError::validation(format!("'{}' is not a duration", head)))?;
        let period = match tail.to_ascii_lowercase().trim_end_matches('s') {
            "day" => Period::Day,
            "week" => Period::Week,
            "month" => Period::Month,
            "year" => Period::Year,
            other => {
                return Err(ResolveError::validation(format!(
                    "unknown period '{}'",
                    other
                )))
            }
        };
        let reference = Self::ago(period, duration);
        reference.validate()?;
        Ok(reference)
    }
}

/// Start and end references extracted from a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DateRequests {
    /// Start date specification. For relative queries like 'last X years' use
    /// the matching period with a duration; for exact dates use period='exact'.
    pub start_date: TimeReference,
    /// End date specification. For relative queries this is usually
    /// period='current'; for exact ranges use period='exact'.
    pub end_date: TimeReference,
}

impl OracleOutput for DateRequests {
    fn validate(&self) -> Result<(), String> {
        self.start_date
            .validate()
            .map_err(|e| format!("start_date: {}", e))?;
        self.end_date
            .validate()
            .map_err(|e| format!("end_date: {}", e))
    }
}

/// Resolved observation bounds as ISO `YYYY-MM-DD` strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// `None` means unbounded (earliest available observation).
    pub start: Option<String>,
    pub end: String,
}

/// Source of "today" for date resolution.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Local wall-clock date.
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A clock pinned to one date, for tests and replays.
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Resolve a start/end reference pair against `today`.
///
/// # Example
///
/// ```rust
/// use chrono::NaiveDate;
/// use series_resolver::dates::{resolve_date_range, Period, TimeReference};
///
/// let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
/// let range = resolve_date_range(
///     &TimeReference::ago(Period::Year, 10),
///     &TimeReference::current(),
///     today,
/// )
/// .unwrap();
/// assert_eq!(range.start.as_deref(), Some("2014-06-15"));
/// assert_eq!(range.end, "2024-06-15");
/// ```
pub fn resolve_date_range(
    start: &TimeReference,
    end: &TimeReference,
    today: NaiveDate,
) -> ResolveResult<DateRange> {
    let start = if start.period == Period::Current {
        start.validate()?;
        None
    } else {
        Some(iso(resolve_reference(start, today)?))
    };
    let end = iso(resolve_reference(end, today)?);
    Ok(DateRange { start, end })
}

/// Resolve a single reference to a calendar date.
pub fn resolve_reference(reference: &TimeReference, today: NaiveDate) -> ResolveResult<NaiveDate> {
    reference.validate()?;

    // validate() guarantees the optional fields below are present
    let duration = reference.duration.unwrap_or_default();
    let resolved = match reference.period {
        Period::Current => Some(today),
        Period::Exact => {
            let raw = reference.exact_date.as_deref().unwrap_or_default();
            return parse_exact_date(raw);
        }
        Period::Day => today.checked_sub_days(Days::new(u64::from(duration))),
        Period::Week => today.checked_sub_days(Days::new(u64::from(duration) * 7)),
        Period::Month => today.checked_sub_months(Months::new(duration)),
        Period::Year => duration
            .checked_mul(12)
            .and_then(|months| today.checked_sub_months(Months::new(months))),
    };

    resolved.ok_or_else(|| {
        ResolveError::validation(format!(
            "{} {}(s) before {} is out of range",
            duration,
            reference.period_name(),
            today
        ))
    })
}

/// Parse `MM-DD-YYYY` strictly: two-digit month, two-digit day, four-digit year.
pub fn parse_exact_date(raw: &str) -> ResolveResult<NaiveDate> {
    let bytes = raw.as_bytes();
    let well_formed = bytes.len() == 10
        && bytes[2] == b'-'
        && bytes[5] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 2 || i == 5 || b.is_ascii_digit());
    if !well_formed {
        return Err(ResolveError::validation(format!(
            "exact_date '{}' must be formatted MM-DD-YYYY",
            raw
        )));
    }

    NaiveDate::parse_from_str(raw, "%m-%d-%Y").map_err(|e| {
        ResolveError::validation(format!("exact_date '{}' is not a calendar date: {}", raw, e))
    })
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
