//! Parsers for the index state of conflicted paths
//!
//! - `git status --porcelain=v2 -z` for the list of unmerged paths
//! - `git ls-files -u -z` for the index stages of a single path

use std::fmt;

use serde::Serialize;

use crate::error::ParseError;

/// How the two sides of a conflicted path disagree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Both sides modified the content
    Content,
    /// Both sides added the path with different content
    AddAdd,
    /// One side deleted what the other modified
    DeleteModify,
    /// Same content, different file modes
    Mode,
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Content => write!(f, "content"),
            Self::AddAdd => write!(f, "add/add"),
            Self::DeleteModify => write!(f, "delete/modify"),
            Self::Mode => write!(f, "mode"),
        }
    }
}

/// An unmerged path reported by `git status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmergedEntry {
    pub path: String,
    /// Two-letter status (`UU`, `AA`, `DU`, ...)
    pub code: String,
    pub conflict_type: ConflictType,
}

/// Which index stages exist for a conflicted path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStages {
    /// Stage 1: common ancestor
    pub base: Option<String>,
    /// Stage 2: our side
    pub ours: Option<String>,
    /// Stage 3: their side
    pub theirs: Option<String>,
}

/// Parse `git status --porcelain=v2 -z` output, keeping unmerged entries.
///
/// Entry layout: `u XY sub m1 m2 m3 mW h1 h2 h3 path`.
pub fn parse_unmerged(output: &str) -> Result<Vec<UnmergedEntry>, ParseError> {
    let mut entries = Vec::new();
    let mut tokens = output.split('\0');

    while let Some(token) = tokens.next() {
        if token.starts_with("2 ") {
            // rename/copy entries carry their original path as an extra token
            tokens.next();
            continue;
        }
        if !token.starts_with("u ") {
            continue;
        }

        let fields: Vec<&str> = token.splitn(11, ' ').collect();
        if fields.len() < 11 {
            return Err(ParseError::new(
                format!("unmerged entry has {} fields, expected 11", fields.len()),
                token,
            ));
        }

        let code = fields[1];
        let (mode_ours, mode_theirs) = (fields[4], fields[5]);
        let (blob_ours, blob_theirs) = (fields[8], fields[9]);

        let conflict_type = match code {
            "UU" if blob_ours == blob_theirs && mode_ours != mode_theirs => ConflictType::Mode,
            "UU" => ConflictType::Content,
            "AA" | "AU" | "UA" => ConflictType::AddAdd,
            "DU" | "UD" | "DD" => ConflictType::DeleteModify,
            other => {
                return Err(ParseError::new(
                    format!("unknown unmerged status {:?}", other),
                    token,
                ));
            }
        };

        entries.push(UnmergedEntry {
            path: fields[10].to_string(),
            code: code.to_string(),
            conflict_type,
        });
    }

    Ok(entries)
}

/// Parse `git ls-files -u -z -- <path>` output (`mode object stage\tpath`)
pub fn parse_index_stages(output: &str) -> Result<IndexStages, ParseError> {
    let mut stages = IndexStages::default();

    for entry in output.split('\0').filter(|e| !e.is_empty()) {
        let (meta, _path) = entry
            .split_once('\t')
            .ok_or_else(|| ParseError::new("index entry has no path", entry))?;

        let fields: Vec<&str> = meta.split(' ').collect();
        if fields.len() != 3 {
            return Err(ParseError::new(
                format!("index entry has {} fields, expected 3", fields.len()),
                entry,
            ));
        }

        let object = Some(fields[1].to_string());
        match fields[2] {
            "1" => stages.base = object,
            "2" => stages.ours = object,
            "3" => stages.theirs = object,
            other => {
                return Err(ParseError::new(
                    format!("unexpected index stage {:?}", other),
                    entry,
                ));
            }
        }
    }

    Ok(stages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const H1: &str = "1111111111111111111111111111111111111111";
    const H2: &str = "2222222222222222222222222222222222222222";
    const H3: &str = "3333333333333333333333333333333333333333";

    fn unmerged(code: &str, modes: (&str, &str), blobs: (&str, &str), path: &str) -> String {
        format!(
            "u {} N... 100644 {} {} {} {} {} {} {}",
            code, modes.0, modes.1, modes.1, H1, blobs.0, blobs.1, path
        )
    }

    #[test]
    fn test_parse_unmerged_entries() {
        let output = [
            "1 .M N... 100644 100644 100644 aaa bbb clean.txt".to_string(),
            unmerged("UU", ("100644", "100644"), (H2, H3), "src/has space.rs"),
            unmerged("AA", ("100644", "100644"), (H2, H3), "new.txt"),
            unmerged("UD", ("100644", "000000"), (H2, H3), "gone.txt"),
            "2 R. N... 100644 100644 100644 aaa aaa R100 renamed.txt".to_string(),
            "original.txt".to_string(),
            String::new(),
        ]
        .join("\0");

        let entries = parse_unmerged(&output).unwrap();
        let summary: Vec<(&str, ConflictType)> = entries
            .iter()
            .map(|e| (e.path.as_str(), e.conflict_type))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("src/has space.rs", ConflictType::Content),
                ("new.txt", ConflictType::AddAdd),
                ("gone.txt", ConflictType::DeleteModify),
            ]
        );
    }

    #[test]
    fn test_mode_conflict() {
        let output = unmerged("UU", ("100644", "100755"), (H2, H2), "script.sh");
        let entries = parse_unmerged(&output).unwrap();
        assert_eq!(entries[0].conflict_type, ConflictType::Mode);
    }

    #[test]
    fn test_truncated_unmerged_entry() {
        let err = parse_unmerged("u UU N... 100644").unwrap_err();
        assert!(err.context.contains("expected 11"));
    }

    #[test]
    fn test_parse_index_stages() {
        let output = format!(
            "100644 {} 1\tfile.txt\0100644 {} 2\tfile.txt\0100644 {} 3\tfile.txt\0",
            H1, H2, H3
        );
        let stages = parse_index_stages(&output).unwrap();
        assert_eq!(stages.base.as_deref(), Some(H1));
        assert_eq!(stages.ours.as_deref(), Some(H2));
        assert_eq!(stages.theirs.as_deref(), Some(H3));
    }

    #[test]
    fn test_two_way_conflict_has_no_base() {
        let output = format!("100644 {} 2\tfile.txt\0100644 {} 3\tfile.txt\0", H2, H3);
        let stages = parse_index_stages(&output).unwrap();
        assert_eq!(stages.base, None);
        assert!(stages.ours.is_some());
    }
}
