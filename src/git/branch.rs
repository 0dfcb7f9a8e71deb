//! Branch listing parser for `git for-each-ref`

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::ParseError;

/// `--format` argument producing the layout [`parse_branches`] expects
pub const BRANCH_FORMAT: &str = "--format=%(HEAD)|%(refname)|%(refname:short)|%(objectname)|%(upstream:short)|%(upstream:track,nobracket)";

const REMOTES_PREFIX: &str = "refs/remotes/";

static AHEAD_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"ahead (\d+)").unwrap());
static BEHIND_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"behind (\d+)").unwrap());

/// A local or remote-tracking branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Branch {
    /// Full ref name (`refs/heads/main`, `refs/remotes/origin/dev`)
    pub ref_name: String,
    /// Display name (`main`, `origin/dev`)
    pub name: String,
    pub is_current: bool,
    pub is_remote: bool,
    /// Present only for remote branches
    pub remote_name: Option<String>,
    pub tip: String,
    pub upstream: Option<String>,
    /// The upstream is configured but no longer exists
    pub upstream_gone: bool,
    pub ahead: u32,
    pub behind: u32,
}

impl Branch {
    /// `refs/remotes/<remote>/HEAD`, a symbolic pointer rather than a branch
    pub fn is_remote_head(&self) -> bool {
        self.is_remote && self.ref_name.ends_with("/HEAD")
    }
}

/// Parse `git for-each-ref` output produced with [`BRANCH_FORMAT`].
///
/// Lines with fewer than four fields (trailing blank lines) are skipped.
/// Unparseable ahead/behind counts are errors.
pub fn parse_branches(output: &str) -> Result<Vec<Branch>, ParseError> {
    let mut branches = Vec::new();

    for line in output.lines() {
        let fields: Vec<&str> = line.split('|').collect();
        if fields.len() < 4 {
            continue;
        }

        let ref_name = fields[1].to_string();
        let is_remote = ref_name.starts_with(REMOTES_PREFIX);
        let remote_name = if is_remote {
            remote_of(&ref_name).map(str::to_string)
        } else {
            None
        };

        let upstream = fields
            .get(4)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let track = fields.get(5).map(|s| s.trim()).unwrap_or("");
        let (ahead, behind) = parse_tracking(track).map_err(|context| ParseError::new(context, line))?;

        branches.push(Branch {
            name: fields[2].to_string(),
            is_current: fields[0].trim() == "*",
            is_remote,
            remote_name,
            tip: fields[3].trim().to_string(),
            upstream,
            upstream_gone: track == "gone",
            ahead,
            behind,
            ref_name,
        });
    }

    Ok(branches)
}

/// Remote name: the path segment right after `refs/remotes/`
fn remote_of(ref_name: &str) -> Option<&str> {
    ref_name
        .strip_prefix(REMOTES_PREFIX)?
        .split('/')
        .next()
        .filter(|s| !s.is_empty())
}

/// Extract `(ahead, behind)` from a fragment like `ahead 3, behind 2`.
///
/// Either count may be missing and defaults to zero.
pub fn parse_tracking(track: &str) -> Result<(u32, u32), String> {
    let count = |pattern: &Regex| -> Result<u32, String> {
        match pattern.captures(track) {
            Some(caps) => caps[1]
                .parse()
                .map_err(|e| format!("invalid tracking count {:?}: {}", &caps[1], e)),
            None => Ok(0),
        }
    };

    Ok((count(&AHEAD_PATTERN)?, count(&BEHIND_PATTERN)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_parse_current_local_branch() {
        let branches = parse_branches("*|refs/heads/main|main|abc123||").unwrap();
        assert_eq!(
            branches,
            vec![Branch {
                ref_name: "refs/heads/main".to_string(),
                name: "main".to_string(),
                is_current: true,
                is_remote: false,
                remote_name: None,
                tip: "abc123".to_string(),
                upstream: None,
                upstream_gone: false,
                ahead: 0,
                behind: 0,
            }]
        );
    }

    #[test]
    fn test_parse_remote_branch_with_tracking() {
        let branches =
            parse_branches("|refs/remotes/origin/dev|origin/dev|def456|origin/dev|ahead 3, behind 1")
                .unwrap();
        let branch = &branches[0];

        assert!(branch.is_remote);
        assert!(!branch.is_current);
        assert_eq!(branch.remote_name.as_deref(), Some("origin"));
        assert_eq!(branch.upstream.as_deref(), Some("origin/dev"));
        assert_eq!(branch.ahead, 3);
        assert_eq!(branch.behind, 1);
    }

    #[test]
    fn test_remote_name_is_first_segment() {
        let branches =
            parse_branches(" |refs/remotes/upstream/feature/deep|upstream/feature/deep|f00|").unwrap();
        assert_eq!(branches[0].remote_name.as_deref(), Some("upstream"));
        assert_eq!(branches[0].name, "upstream/feature/deep");
    }

    #[test]
    fn test_short_lines_are_skipped() {
        let output = "*|refs/heads/main|main|abc\n\n|garbage\n |refs/heads/dev|dev|def||\n";
        let branches = parse_branches(output).unwrap();
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[1].name, "dev");
        assert!(!branches[1].is_current);
    }

    #[test]
    fn test_gone_upstream() {
        let branches = parse_branches(" |refs/heads/old|old|aaa|origin/old|gone").unwrap();
        assert!(branches[0].upstream_gone);
        assert_eq!((branches[0].ahead, branches[0].behind), (0, 0));
    }

    #[test]
    fn test_remote_head_detection() {
        let branches =
            parse_branches(" |refs/remotes/origin/HEAD|origin|abc||\n |refs/remotes/origin/main|origin/main|abc||")
                .unwrap();
        assert!(branches[0].is_remote_head());
        assert!(!branches[1].is_remote_head());
    }

    #[test]
    fn test_parse_tracking() {
        assert_eq!(parse_tracking("").unwrap(), (0, 0));
        assert_eq!(parse_tracking("ahead 2").unwrap(), (2, 0));
        assert_eq!(parse_tracking("behind 7").unwrap(), (0, 7));
        assert_eq!(parse_tracking("ahead 1, behind 4").unwrap(), (1, 4));
    }

    #[test]
    fn test_overflowing_count_is_an_error() {
        let err = parse_branches(" |refs/heads/x|x|abc|origin/x|ahead 99999999999").unwrap_err();
        assert!(err.context.contains("invalid tracking count"));
        assert!(err.fragment.contains("refs/heads/x"));
    }

    proptest! {
        #[test]
        fn prop_tracking_counts_round_trip(ahead in proptest::option::of(0u32..10_000), behind in proptest::option::of(0u32..10_000)) {
            let parts: Vec<String> = [
                ahead.map(|n| format!("ahead {}", n)),
                behind.map(|n| format!("behind {}", n)),
            ]
            .into_iter()
            .flatten()
            .collect();

            let parsed = parse_tracking(&parts.join(", ")).unwrap();
            prop_assert_eq!(parsed, (ahead.unwrap_or(0), behind.unwrap_or(0)));
        }
    }
}
