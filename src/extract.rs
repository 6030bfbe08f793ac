use std::fmt::{Display, Formatter};

use chrono::{Duration, Local, LocalResult, NaiveDate, NaiveTime, TimeZone};
use regex::bytes::{Regex, RegexBuilder};
use thiserror::Error;

use crate::ChatStatError;

pub const DEFAULT_DATE_PATTERN: &str = "^[0-9]{1,2}/[0-9]{1,2}/[0-9]{2}";
pub const DEFAULT_USER_PATTERN: &str = "[a-zA-Z]+";

const DATE_DELIMITER: u8 = b'/';
const CENTURY_PREFIX: &str = "20";

/// A compiled pattern that locates the first matching token of a line.
///
/// Patterns match raw bytes with Unicode mode off: `[^ ]` or `.` also match bytes that are not
/// valid UTF-8, and `\w`, `\d`, `\s` are ASCII classes. `(?u)` turns Unicode classes back on.
#[derive(Clone, Debug)]
pub struct MatchPattern(Regex);

impl MatchPattern {
    pub fn new(pattern: &str) -> Result<Self, ChatStatError> {
        Ok(MatchPattern(RegexBuilder::new(pattern).unicode(false).build()?))
    }

    /// Returns the leftmost match in `line`, or an empty slice if there is none.
    pub fn first_match<'a>(&self, line: &'a [u8]) -> &'a [u8] {
        self.0.find(line).map(|found| found.as_bytes()).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// The date and user patterns every line is matched against.
#[derive(Clone, Debug)]
pub struct Patterns {
    pub date: MatchPattern,
    pub user: MatchPattern,
}

impl Patterns {
    pub fn new(date: &str, user: &str) -> Result<Self, ChatStatError> {
        Ok(Patterns {
            date: MatchPattern::new(date)?,
            user: MatchPattern::new(user)?,
        })
    }
}

impl Default for Patterns {
    fn default() -> Self {
        Patterns::new(DEFAULT_DATE_PATTERN, DEFAULT_USER_PATTERN).expect("Invalid default patterns")
    }
}

/// One message attributed to a user on a calendar day. The user is kept byte for byte.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedEvent {
    pub date: NaiveDate,
    pub user: Vec<u8>,
}

impl ParsedEvent {
    /// Unix time of the local midnight starting the event's day.
    pub fn timestamp(&self) -> i64 {
        local_midnight(self.date)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateComponent {
    Month,
    Day,
    Year,
}

impl Display for DateComponent {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            DateComponent::Month => write!(formatter, "month"),
            DateComponent::Day => write!(formatter, "day"),
            DateComponent::Year => write!(formatter, "year"),
        }
    }
}

/// Why a single line could not be turned into a [ParsedEvent]. None of these abort a run.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ExtractError {
    #[error("unable to parse date in line {line:?}")]
    NoDateMatch { line: String },
    #[error("malformed {component} {value:?} in line {line:?}")]
    MalformedDateComponent {
        component: DateComponent,
        value: String,
        line: String,
    },
    #[error("date {month}/{day}/{year} is out of range in line {line:?}")]
    DateOutOfRange {
        year: u32,
        month: u32,
        day: u32,
        line: String,
    },
}

impl ExtractError {
    pub fn line(&self) -> &str {
        match self {
            ExtractError::NoDateMatch { line } => line,
            ExtractError::MalformedDateComponent { line, .. } => line,
            ExtractError::DateOutOfRange { line, .. } => line,
        }
    }
}

/// Extracts the date and the user of a single chat line.
///
/// The date token is split on `/` into month, day and a two-digit year which is read as `20YY`.
/// Month and day are not checked against the calendar; values past the end of the year or month
/// roll over into the following ones. A missing user token yields an empty user.
///
/// Errors carry the line decoded lossily, for diagnostics only.
pub fn extract<L: AsRef<[u8]> + ?Sized>(line: &L, patterns: &Patterns) -> Result<ParsedEvent, ExtractError> {
    let line = line.as_ref();
    let date = extract_date(line, &patterns.date)?;
    let user = patterns.user.first_match(line).to_vec();
    Ok(ParsedEvent { date, user })
}

fn extract_date(line: &[u8], pattern: &MatchPattern) -> Result<NaiveDate, ExtractError> {
    let mut components = pattern.first_match(line).split(|byte| *byte == DATE_DELIMITER);
    let (month, day, year) = match (components.next(), components.next(), components.next()) {
        (Some(month), Some(day), Some(year)) => (month, day, year),
        _ => {
            return Err(ExtractError::NoDateMatch {
                line: lossy(line),
            })
        }
    };

    let month = parse_component(DateComponent::Month, month, "", line)?;
    let day = parse_component(DateComponent::Day, day, "", line)?;
    let year = parse_component(DateComponent::Year, year, CENTURY_PREFIX, line)?;

    calendar_date(year, month, day).ok_or_else(|| ExtractError::DateOutOfRange {
        year,
        month,
        day,
        line: lossy(line),
    })
}

/// Reads `raw` as a non-negative decimal number, with `prefix` put in front of its digits.
fn parse_component(component: DateComponent, raw: &[u8], prefix: &str, line: &[u8]) -> Result<u32, ExtractError> {
    let malformed = || ExtractError::MalformedDateComponent {
        component,
        value: lossy(raw),
        line: lossy(line),
    };
    if raw.is_empty() || !raw.iter().all(u8::is_ascii_digit) {
        return Err(malformed());
    }
    let digits = std::str::from_utf8(raw).map_err(|_| malformed())?;
    format!("{}{}", prefix, digits).parse::<u32>().map_err(|_| malformed())
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Builds a date the way a calendar rolls over: month 13 is January of the next year,
/// day 0 is the last day of the previous month.
fn calendar_date(year: u32, month: u32, day: u32) -> Option<NaiveDate> {
    let months = i64::from(year) * 12 + i64::from(month) - 1;
    let year = i32::try_from(months.div_euclid(12)).ok()?;
    let month = u32::try_from(months.rem_euclid(12) + 1).ok()?;
    NaiveDate::from_ymd_opt(year, month, 1)?.checked_add_signed(Duration::days(i64::from(day) - 1))
}

/// Unix time of midnight at the start of `date` in the local time zone.
pub fn local_midnight(date: NaiveDate) -> i64 {
    midnight_in(date, &Local)
}

fn midnight_in<Tz: TimeZone>(date: NaiveDate, zone: &Tz) -> i64 {
    let midnight = date.and_time(NaiveTime::MIN);
    match zone.from_local_datetime(&midnight) {
        LocalResult::Single(time) | LocalResult::Ambiguous(time, _) => time.timestamp(),
        // midnight skipped by a DST transition
        LocalResult::None => zone
            .from_local_datetime(&(midnight + Duration::hours(1)))
            .earliest()
            .unwrap_or_else(|| zone.from_utc_datetime(&midnight))
            .timestamp(),
    }
}
