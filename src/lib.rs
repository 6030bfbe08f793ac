#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use thiserror::Error;
use tracing::{debug, warn};

pub mod config;
pub mod extract;
pub mod render;
pub mod table;
mod threaded;

pub use config::Config;
pub use extract::{extract, ExtractError, MatchPattern, ParsedEvent, Patterns};
pub use render::OutputFormat;
pub use table::{Entry, MessageTable};

const LINE_DELIMITER: u8 = b'\n';

/// Reads the chat log at `path` and counts the messages of every user per day. Lines whose date
/// cannot be extracted are logged and skipped.
///
/// With `jobs` greater than one the file is processed in chunks by a pool of worker threads; the
/// resulting counts are the same, only the order of the diagnostics differs.
pub fn crunch<P: AsRef<Path>>(path: P, patterns: &Patterns, jobs: usize) -> Result<Report, ChatStatError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    debug!("Crunching {} with {} job(s)", path.display(), jobs);
    if jobs > 1 {
        threaded::crunch(file, patterns, jobs)
    } else {
        crunch_reader(BufReader::new(file), patterns)
    }
}

/// Sequentially processes every line of `reader`, in order.
pub fn crunch_reader<R: BufRead>(mut reader: R, patterns: &Patterns) -> Result<Report, ChatStatError> {
    let mut report = Report::new();
    let mut line = Vec::new();
    while reader.read_until(LINE_DELIMITER, &mut line)? > 0 {
        report.process(&line, patterns);
        line.clear();
    }
    Ok(report)
}

/// Crunches the input named by `config` and writes the result to `out` in the configured format.
pub fn run<W: Write>(config: &Config, out: &mut W) -> Result<Report, ChatStatError> {
    let patterns = config.patterns()?;
    let report = crunch(&config.path, &patterns, config.jobs)?;
    render::render(&report, config.format, &config.endpoint, out)?;
    Ok(report)
}

pub struct Report {
    lines: usize,
    errors: usize,
    table: MessageTable,
}

impl Report {
    fn new() -> Self {
        Report {
            lines: 0,
            errors: 0,
            table: MessageTable::new(),
        }
    }

    fn process(&mut self, bytes: &[u8], patterns: &Patterns) {
        let bytes = bytes.strip_suffix(&[LINE_DELIMITER]).unwrap_or(bytes);
        let line = bytes.strip_suffix(b"\r").unwrap_or(bytes);
        self.lines += 1;
        match extract(line, patterns) {
            Ok(event) => self.table.record(event),
            Err(error) => self.on_error(&error),
        }
    }

    fn on_error(&mut self, error: &ExtractError) {
        warn!("{}", error);
        self.errors += 1;
    }

    fn merge(mut self, other: Report) -> Self {
        self.lines += other.lines;
        self.errors += other.errors;
        self.table = self.table.merge(other.table);
        self
    }

    /// Number of lines read.
    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Number of lines skipped because no date could be extracted.
    pub fn errors(&self) -> usize {
        self.errors
    }

    pub fn table(&self) -> &MessageTable {
        &self.table
    }

    pub fn into_table(self) -> MessageTable {
        self.table
    }
}

impl Display for Report {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> core::fmt::Result {
        writeln!(formatter, "{: <12} | {: <16} | {: >10} |", "Date", "User", "Messages")?;
        writeln!(formatter, "----------------------------------------------")?;
        for entry in self.table.snapshot() {
            writeln!(
                formatter,
                "{: <12} | {: <16} | {: >10} |",
                entry.date.format("%Y-%m-%d").to_string(),
                String::from_utf8_lossy(&entry.user),
                entry.count
            )?
        }
        writeln!(formatter, "----------------------------------------------\n")?;
        writeln!(formatter, "Number of lines: {}", self.lines)?;
        write!(formatter, "Number of unparseable lines: {}", self.errors)
    }
}

#[derive(Error, Debug)]
pub enum ChatStatError {
    #[error("error: {0}")]
    GenericFailure(#[from] Box<dyn std::error::Error + Send + Sync>),
    #[error("io error: {0}")]
    IOFailure(#[from] std::io::Error),
    #[error("pattern error: {0}")]
    PatternFailure(#[from] regex::Error),
    #[error("serialization error: {0}")]
    SerializationFailure(#[from] serde_json::Error),
    #[error("unknown output format {0:?}")]
    UnknownFormat(String),
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use chrono::NaiveDate;

    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn crunch_str(input: &str) -> Report {
        crunch_reader(Cursor::new(input.as_bytes()), &Patterns::default()).unwrap()
    }

    #[test]
    fn test_counts_messages_per_user_and_day() {
        let report = crunch_str("1/1/24 Carol: hi\n1/1/24 Carol: again\n5/5/22 Dave: x\n5/5/22 Eve: y\n");

        assert_eq!(report.lines(), 4);
        assert_eq!(report.errors(), 0);
        assert_eq!(report.table().len(), 3);
        assert_eq!(report.table().count(date(2024, 1, 1), "Carol"), Some(2));
        assert_eq!(report.table().count(date(2022, 5, 5), "Dave"), Some(1));
        assert_eq!(report.table().count(date(2022, 5, 5), "Eve"), Some(1));
    }

    #[test]
    fn test_lines_without_date_are_skipped() {
        let report = crunch_str("no date here, Bob says hi\n3/14/23 Alice: hello\n\n");

        assert_eq!(report.lines(), 3);
        assert_eq!(report.errors(), 2);
        assert_eq!(report.table().len(), 1);
        assert_eq!(report.table().count(date(2023, 3, 14), "Alice"), Some(1));
    }

    #[test]
    fn test_only_failing_lines_leave_table_empty() {
        let report = crunch_str("hello\nworld\n");

        assert_eq!(report.errors(), 2);
        assert!(report.table().is_empty());
    }

    #[test]
    fn test_last_line_without_newline() {
        let report = crunch_str("3/14/23 Alice: hello\n3/14/23 Alice: bye");

        assert_eq!(report.lines(), 2);
        assert_eq!(report.table().count(date(2023, 3, 14), "Alice"), Some(2));
    }

    #[test]
    fn test_crlf_line_endings() {
        let patterns = Patterns::new(extract::DEFAULT_DATE_PATTERN, "[a-zA-Z]+$").unwrap();

        let report = crunch_reader(Cursor::new(&b"3/14/23 Alice\r\n"[..]), &patterns).unwrap();

        assert_eq!(report.table().count(date(2023, 3, 14), "Alice"), Some(1));
    }

    #[test]
    fn test_users_differing_in_invalid_bytes_are_counted_apart() {
        let patterns = Patterns::new(extract::DEFAULT_DATE_PATTERN, "[^ ]+:").unwrap();
        let input: &[u8] = b"1/1/24 a\xff: hi\n1/1/24 a\xfe: hi\n";

        let report = crunch_reader(Cursor::new(input), &patterns).unwrap();

        assert_eq!(report.table().len(), 2);
        assert_eq!(report.table().count(date(2024, 1, 1), &b"a\xff:"[..]), Some(1));
        assert_eq!(report.table().count(date(2024, 1, 1), &b"a\xfe:"[..]), Some(1));
    }

    #[test]
    fn test_merge_reports() {
        let merged = crunch_str("1/1/24 Carol: hi\nbad\n").merge(crunch_str("1/1/24 Carol: again\n"));

        assert_eq!(merged.lines(), 3);
        assert_eq!(merged.errors(), 1);
        assert_eq!(merged.into_table().count(date(2024, 1, 1), "Carol"), Some(2));
    }

    #[test]
    fn test_report_display() {
        let report = crunch_str("1/1/24 Carol: hi\nbad\n");

        let text = report.to_string();

        assert!(text.contains("2024-01-01"));
        assert!(text.contains("Carol"));
        assert!(text.ends_with("Number of unparseable lines: 1"));
    }

    #[test]
    fn test_missing_file() {
        let result = crunch("/definitely/not/here/Chatlog.txt", &Patterns::default(), 1);

        assert!(matches!(result, Err(ChatStatError::IOFailure(_))));
    }
}
