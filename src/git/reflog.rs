//! Reflog parsing
//!
//! `git reflog show` is asked for a control-character delimited format so
//! that free-text messages can never be confused with field boundaries.

use std::fmt;

use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde::Serialize;

use crate::error::ParseError;

/// Separates fields within a record
pub const FIELD_SEPARATOR: char = '\u{1e}';

/// Terminates each record
pub const RECORD_SEPARATOR: char = '\u{1f}';

/// `--format` argument producing the layout [`parse_reflog`] expects
pub const REFLOG_FORMAT: &str = "--format=%H%x1E%h%x1E%gD%x1E%gs%x1E%aI%x1E%an%x1E%ae%x1F";

const REFLOG_FIELDS: usize = 7;

/// Classified reflog action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflogAction {
    Commit,
    Amend,
    Checkout,
    Reset,
    Rebase,
    Merge,
    CherryPick,
    Pull,
    Other,
}

impl ReflogAction {
    /// Classify a raw action such as `commit (amend)` or `rebase -i (finish)`.
    ///
    /// Wording differs between git versions, so this matches on fragments
    /// rather than exact strings. Unknown actions are `Other`, never an error.
    pub fn classify(raw: &str) -> Self {
        let action = raw.trim().to_ascii_lowercase();

        if action.contains("amend") {
            Self::Amend
        } else if action.starts_with("cherry-pick") {
            Self::CherryPick
        } else if action.starts_with("pull") {
            Self::Pull
        } else if action.starts_with("rebase") {
            Self::Rebase
        } else if action.starts_with("merge") || action == "commit (merge)" {
            Self::Merge
        } else if action.starts_with("reset") {
            Self::Reset
        } else if action.starts_with("checkout") || action.starts_with("switch") {
            Self::Checkout
        } else if action.starts_with("commit") {
            Self::Commit
        } else {
            Self::Other
        }
    }
}

impl fmt::Display for ReflogAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Commit => "commit",
            Self::Amend => "amend",
            Self::Checkout => "checkout",
            Self::Reset => "reset",
            Self::Rebase => "rebase",
            Self::Merge => "merge",
            Self::CherryPick => "cherry-pick",
            Self::Pull => "pull",
            Self::Other => "other",
        };
        f.write_str(label)
    }
}

/// One reflog entry, in the order git emitted it (newest first)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReflogEntry {
    pub hash: String,
    pub short_hash: String,
    /// Reflog selector such as `HEAD@{2}`
    pub selector: String,
    pub action: ReflogAction,
    /// Action text as git wrote it
    pub raw_action: String,
    pub message: String,
    pub date: DateTime<FixedOffset>,
    pub author_name: String,
    pub author_email: String,
}

impl ReflogEntry {
    /// Re-serialize into the seven raw fields of [`REFLOG_FORMAT`]
    pub fn to_fields(&self) -> [String; REFLOG_FIELDS] {
        let subject = if self.raw_action == self.message {
            self.raw_action.clone()
        } else {
            format!("{}: {}", self.raw_action, self.message)
        };

        [
            self.hash.clone(),
            self.short_hash.clone(),
            self.selector.clone(),
            subject,
            self.date.to_rfc3339_opts(SecondsFormat::AutoSi, false),
            self.author_name.clone(),
            self.author_email.clone(),
        ]
    }
}

/// Parse the output of `git reflog show` run with [`REFLOG_FORMAT`]
pub fn parse_reflog(output: &str) -> Result<Vec<ReflogEntry>, ParseError> {
    output
        .split(RECORD_SEPARATOR)
        .map(|record| record.trim_start_matches(['\n', '\r']))
        .filter(|record| !record.trim().is_empty())
        .map(parse_record)
        .collect()
}

fn parse_record(record: &str) -> Result<ReflogEntry, ParseError> {
    let fields: Vec<&str> = record.split(FIELD_SEPARATOR).collect();
    if fields.len() != REFLOG_FIELDS {
        return Err(ParseError::new(
            format!(
                "reflog record has {} fields, expected {}",
                fields.len(),
                REFLOG_FIELDS
            ),
            record,
        ));
    }

    let (raw_action, message) = parse_gs_field(fields[3]);
    let date = parse_iso_date(fields[4]).ok_or_else(|| {
        ParseError::new(format!("invalid reflog date {:?}", fields[4]), record)
    })?;

    Ok(ReflogEntry {
        hash: fields[0].to_string(),
        short_hash: fields[1].to_string(),
        selector: fields[2].to_string(),
        action: ReflogAction::classify(&raw_action),
        raw_action,
        message,
        date,
        author_name: fields[5].to_string(),
        author_email: fields[6].to_string(),
    })
}

/// Split a reflog subject (`%gs`) into action and message.
///
/// Splits on the first colon only. Without a colon, or with nothing after
/// it, the whole field is both action and message (`rebase (finish)`).
pub fn parse_gs_field(field: &str) -> (String, String) {
    let whole = field.trim();
    match whole.split_once(':') {
        Some((action, message)) if !message.trim().is_empty() => {
            (action.trim().to_string(), message.trim().to_string())
        }
        _ => (whole.to_string(), whole.to_string()),
    }
}

/// RFC 3339 with fractional seconds first, then without
pub fn parse_iso_date(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    DateTime::<FixedOffset>::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%:z")
        .or_else(|_| DateTime::<FixedOffset>::parse_from_rfc3339(value))
        .ok()
}
