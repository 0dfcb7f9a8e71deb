//! Commit log parsing for `git log`

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use super::reflog::{FIELD_SEPARATOR, RECORD_SEPARATOR, parse_iso_date};
use crate::error::ParseError;

/// `--format` argument producing the layout [`parse_log`] expects
pub const LOG_FORMAT: &str = "--format=%H%x1E%h%x1E%P%x1E%an%x1E%ae%x1E%aI%x1E%s%x1F";

const LOG_FIELDS: usize = 7;

/// A commit as listed by `git log`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Commit {
    pub hash: String,
    pub short_hash: String,
    /// Empty for a root commit, two or more for merges
    pub parents: Vec<String>,
    pub author_name: String,
    pub author_email: String,
    pub date: DateTime<FixedOffset>,
    pub subject: String,
}

impl Commit {
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }
}

/// Parse `git log` output produced with [`LOG_FORMAT`]
pub fn parse_log(output: &str) -> Result<Vec<Commit>, ParseError> {
    output
        .split(RECORD_SEPARATOR)
        .map(|record| record.trim_start_matches(['\n', '\r']))
        .filter(|record| !record.trim().is_empty())
        .map(|record| {
            let fields: Vec<&str> = record.split(FIELD_SEPARATOR).collect();
            if fields.len() != LOG_FIELDS {
                return Err(ParseError::new(
                    format!("log record has {} fields, expected {}", fields.len(), LOG_FIELDS),
                    record,
                ));
            }

            let date = parse_iso_date(fields[5]).ok_or_else(|| {
                ParseError::new(format!("invalid commit date {:?}", fields[5]), record)
            })?;

            Ok(Commit {
                hash: fields[0].to_string(),
                short_hash: fields[1].to_string(),
                parents: fields[2].split_whitespace().map(str::to_string).collect(),
                author_name: fields[3].to_string(),
                author_email: fields[4].to_string(),
                date,
                subject: fields[6].to_string(),
            })
        })
        .collect()
}
