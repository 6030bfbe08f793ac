use std::path::PathBuf;

use crate::extract::{DEFAULT_DATE_PATTERN, DEFAULT_USER_PATTERN};
use crate::render::{OutputFormat, DEFAULT_ENDPOINT};
use crate::{ChatStatError, Patterns};

pub const DEFAULT_PATH: &str = "Chatlog.txt";

/// Everything a run needs, as given on the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub path: PathBuf,
    pub date_pattern: String,
    pub user_pattern: String,
    pub endpoint: String,
    pub format: OutputFormat,
    pub jobs: usize,
}

impl Config {
    pub fn patterns(&self) -> Result<Patterns, ChatStatError> {
        Patterns::new(&self.date_pattern, &self.user_pattern)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            path: PathBuf::from(DEFAULT_PATH),
            date_pattern: DEFAULT_DATE_PATTERN.to_string(),
            user_pattern: DEFAULT_USER_PATTERN.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            format: OutputFormat::default(),
            jobs: 1,
        }
    }
}
