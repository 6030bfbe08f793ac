use std::io;
use std::path::PathBuf;

use chat_stat::config::DEFAULT_PATH;
use chat_stat::extract::{DEFAULT_DATE_PATTERN, DEFAULT_USER_PATTERN};
use chat_stat::render::DEFAULT_ENDPOINT;
use chat_stat::{Config, OutputFormat};
use clap::{value_t, App, Arg, ArgMatches};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const FILE: &str = "FILE";
const DATE: &str = "DATE";
const USER: &str = "USER";
const ENDPOINT: &str = "ENDPOINT";
const OUTPUT: &str = "OUTPUT";
const JOBS: &str = "JOBS";
const VERBOSE: &str = "VERBOSE";

fn main() -> anyhow::Result<()> {
    let arguments = parse_arguments();
    setup_logging(arguments.occurrences_of(VERBOSE));
    let config = to_config(&arguments)?;

    let stdout = io::stdout();
    let report = chat_stat::run(&config, &mut stdout.lock())?;
    info!(
        "{} lines read, {} skipped, {} points written",
        report.lines(),
        report.errors(),
        report.table().len()
    );
    Ok(())
}

fn to_config(arguments: &ArgMatches<'_>) -> anyhow::Result<Config> {
    Ok(Config {
        path: PathBuf::from(arguments.value_of(FILE).expect("Unable to parse arguments")),
        date_pattern: arguments.value_of(DATE).expect("Unable to parse arguments").to_string(),
        user_pattern: arguments.value_of(USER).expect("Unable to parse arguments").to_string(),
        endpoint: arguments.value_of(ENDPOINT).expect("Unable to parse arguments").to_string(),
        format: arguments
            .value_of(OUTPUT)
            .expect("Unable to parse arguments")
            .parse::<OutputFormat>()?,
        jobs: value_t!(arguments, JOBS, usize).unwrap_or_else(|e| e.exit()),
    })
}

/// Diagnostics go to stderr so that stdout carries only the rendered output.
/// `RUST_LOG` takes precedence over the `-v` count.
fn setup_logging(verbosity: u64) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .init();
}

fn parse_arguments() -> ArgMatches<'static> {
    app().get_matches()
}

fn app() -> App<'static, 'static> {
    App::new(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::with_name(FILE)
                .short("f")
                .long("file")
                .takes_value(true)
                .default_value(DEFAULT_PATH)
                .help("Input file"),
        )
        .arg(
            Arg::with_name(DATE)
                .short("d")
                .long("date")
                .takes_value(true)
                .default_value(DEFAULT_DATE_PATTERN)
                .help("Date stamp format in chat log (regexp)"),
        )
        .arg(
            Arg::with_name(USER)
                .short("u")
                .long("user")
                .takes_value(true)
                .default_value(DEFAULT_USER_PATTERN)
                .help("User field (regexp, first match)"),
        )
        .arg(
            Arg::with_name(ENDPOINT)
                .short("m")
                .long("endpoint")
                .takes_value(true)
                .default_value(DEFAULT_ENDPOINT)
                .help("Timeseries DB endpoint"),
        )
        .arg(
            Arg::with_name(OUTPUT)
                .short("o")
                .long("output")
                .takes_value(true)
                .possible_values(&OutputFormat::NAMES)
                .default_value("curl")
                .help("Output format"),
        )
        .arg(
            Arg::with_name(JOBS)
                .short("j")
                .long("jobs")
                .takes_value(true)
                .default_value("1")
                .help("Number of worker threads"),
        )
        .arg(
            Arg::with_name(VERBOSE)
                .short("v")
                .long("verbose")
                .multiple(true)
                .help("Increases logging verbosity"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(arguments: &[&str]) -> Config {
        let matches = app()
            .get_matches_from_safe(std::iter::once("chat-stat").chain(arguments.iter().copied()))
            .unwrap();
        to_config(&matches).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);

        assert_eq!(config.path, PathBuf::from(DEFAULT_PATH));
        assert_eq!(config.date_pattern, DEFAULT_DATE_PATTERN);
        assert_eq!(config.user_pattern, DEFAULT_USER_PATTERN);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.format, OutputFormat::Curl);
        assert_eq!(config.jobs, 1);
    }

    #[test]
    fn test_explicit_arguments() {
        let config = config(&["-f", "log.txt", "-u", "<[a-z]+>", "-o", "table", "-j", "4"]);

        assert_eq!(config.path, PathBuf::from("log.txt"));
        assert_eq!(config.user_pattern, "<[a-z]+>");
        assert_eq!(config.format, OutputFormat::Table);
        assert_eq!(config.jobs, 4);
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let result = app().get_matches_from_safe(vec!["chat-stat", "-o", "xml"]);

        assert!(result.is_err());
    }
}
