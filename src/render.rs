//! Turns the final counts into writes for an InfluxDB-compatible time-series database.

use std::borrow::Cow;
use std::io::Write;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;

use crate::table::Entry;
use crate::{ChatStatError, Report};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8086/write?db=chatstat&precision=s";

const MEASUREMENT: &str = "messages";
const USER_TAG: &str = "u";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// One `curl` command per point, ready to be piped into a shell.
    #[default]
    Curl,
    /// Bare line-protocol points.
    LineProtocol,
    Json,
    /// Human readable summary.
    Table,
}

impl OutputFormat {
    pub const NAMES: [&'static str; 4] = ["curl", "line", "json", "table"];
}

impl FromStr for OutputFormat {
    type Err = ChatStatError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "curl" => Ok(OutputFormat::Curl),
            "line" => Ok(OutputFormat::LineProtocol),
            "json" => Ok(OutputFormat::Json),
            "table" => Ok(OutputFormat::Table),
            other => Err(ChatStatError::UnknownFormat(other.to_string())),
        }
    }
}

// JSON strings must be UTF-8, so users are decoded lossily here.
#[derive(Serialize)]
struct JsonPoint<'a> {
    date: NaiveDate,
    user: Cow<'a, str>,
    count: u64,
    timestamp: i64,
}

/// Line-protocol point for one entry, e.g. `messages,u=Alice value=3 1678748400`.
///
/// The user is written byte for byte, so the point is not valid UTF-8 when the user is not.
pub fn point(entry: &Entry) -> Vec<u8> {
    let mut point = format!("{},{}=", MEASUREMENT, USER_TAG).into_bytes();
    point.extend(escape_tag(&entry.user));
    point.extend(format!(" value={} {}", entry.count, entry.timestamp()).into_bytes());
    point
}

/// A shell command that posts the entry's point to `endpoint`.
pub fn curl_command(endpoint: &str, entry: &Entry) -> Vec<u8> {
    let mut command = b"curl '".to_vec();
    command.extend(quote(endpoint.as_bytes()));
    command.extend_from_slice(b"' --data-binary '");
    command.extend(quote(&point(entry)));
    command.push(b'\'');
    command
}

pub fn render<W: Write>(report: &Report, format: OutputFormat, endpoint: &str, out: &mut W) -> Result<(), ChatStatError> {
    let entries = report.table().snapshot();
    match format {
        OutputFormat::Curl => {
            for entry in &entries {
                out.write_all(&curl_command(endpoint, entry))?;
                out.write_all(b"\n")?;
            }
        }
        OutputFormat::LineProtocol => {
            for entry in &entries {
                out.write_all(&point(entry))?;
                out.write_all(b"\n")?;
            }
        }
        OutputFormat::Json => {
            let points: Vec<JsonPoint<'_>> = entries
                .iter()
                .map(|entry| JsonPoint {
                    date: entry.date,
                    user: String::from_utf8_lossy(&entry.user),
                    count: entry.count,
                    timestamp: entry.timestamp(),
                })
                .collect();
            serde_json::to_writer_pretty(&mut *out, &points)?;
            writeln!(out)?;
        }
        OutputFormat::Table => writeln!(out, "{}", report)?,
    }
    out.flush()?;
    Ok(())
}

fn escape_tag(value: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(value.len());
    for byte in value {
        if matches!(byte, b',' | b'=' | b' ') {
            escaped.push(b'\\');
        }
        escaped.push(*byte);
    }
    escaped
}

// Closes the single-quoted string, emits an escaped quote and reopens it.
fn quote(value: &[u8]) -> Vec<u8> {
    let mut quoted = Vec::with_capacity(value.len());
    for byte in value {
        match byte {
            b'\'' => quoted.extend_from_slice(br"'\''"),
            _ => quoted.push(*byte),
        }
    }
    quoted
}
