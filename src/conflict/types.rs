//! Conflict resolution state types
//!
//! Defines the model the engine maintains for one repository:
//! - `MergeState` is the in-progress operation and its conflicted files
//! - `ConflictedFile` holds the three versions and the merged content of one path
//! - `ConflictSection` is one marker block inside the merged content

use std::fmt;

use serde::Serialize;

use crate::git::ConflictType;

/// The git operation that left the working tree conflicted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Merge,
    Rebase,
    CherryPick,
    Revert,
}

impl OperationKind {
    /// Arguments that finalize the operation once every file is staged
    pub fn continue_args(&self) -> &'static [&'static str] {
        match self {
            Self::Merge => &["commit", "--no-edit"],
            Self::Rebase => &["rebase", "--continue"],
            Self::CherryPick => &["cherry-pick", "--continue"],
            Self::Revert => &["revert", "--continue"],
        }
    }

    pub fn abort_args(&self) -> &'static [&'static str] {
        match self {
            Self::Merge => &["merge", "--abort"],
            Self::Rebase => &["rebase", "--abort"],
            Self::CherryPick => &["cherry-pick", "--abort"],
            Self::Revert => &["revert", "--abort"],
        }
    }

    /// Arguments that drop the current commit; merges have no skip
    pub fn skip_args(&self) -> Option<&'static [&'static str]> {
        match self {
            Self::Merge => None,
            Self::Rebase => Some(&["rebase", "--skip"]),
            Self::CherryPick => Some(&["cherry-pick", "--skip"]),
            Self::Revert => Some(&["revert", "--skip"]),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merge => write!(f, "merge"),
            Self::Rebase => write!(f, "rebase"),
            Self::CherryPick => write!(f, "cherry-pick"),
            Self::Revert => write!(f, "revert"),
        }
    }
}

/// Where the engine is in the resolution workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// No merge-type operation is active
    Idle,
    /// At least one conflicted file is unresolved
    Conflicted,
    /// Every file is resolved; the operation is not finalized yet
    AllResolved,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Conflicted => write!(f, "conflicted"),
            Self::AllResolved => write!(f, "all resolved"),
        }
    }
}

/// How a conflict section was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Unresolved,
    Ours,
    Theirs,
    Both,
    /// Free text supplied by the caller
    Manual,
}

/// A caller's decision for one section
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionChoice {
    Ours,
    Theirs,
    /// Ours followed by theirs
    Both,
    /// Replace the whole block with this text
    Manual(String),
}

impl SectionChoice {
    pub fn resolution(&self) -> Resolution {
        match self {
            Self::Ours => Resolution::Ours,
            Self::Theirs => Resolution::Theirs,
            Self::Both => Resolution::Both,
            Self::Manual(_) => Resolution::Manual,
        }
    }
}

/// One side of a conflict, for whole-file resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Ours,
    Theirs,
}

impl From<Side> for Resolution {
    fn from(side: Side) -> Self {
        match side {
            Side::Ours => Resolution::Ours,
            Side::Theirs => Resolution::Theirs,
        }
    }
}

/// Result of finalizing an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinueOutcome {
    /// The operation finished and the engine is idle again
    Completed,
    /// Git stopped at a further commit with this many conflicted files
    NewConflicts(usize),
}

/// One conflict-marker block in a merged file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictSection {
    /// 1-based line of the `<<<<<<<` marker (or of the replacement text once resolved)
    pub start_line: usize,
    /// 1-based line of the `>>>>>>>` marker; below `start_line` when resolved to nothing
    pub end_line: usize,
    pub ours: String,
    /// Absent when the conflict style carries no ancestor block
    pub base: Option<String>,
    pub theirs: String,
    pub resolution: Resolution,
}

impl ConflictSection {
    pub fn is_resolved(&self) -> bool {
        self.resolution != Resolution::Unresolved
    }

    /// Number of lines the section currently spans
    pub fn line_count(&self) -> usize {
        (self.end_line + 1).saturating_sub(self.start_line)
    }
}

/// Index stage contents of a conflicted path, byte for byte
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileVersions {
    /// Stage 2
    pub ours: Option<Vec<u8>>,
    /// Stage 1; `None` means no common ancestor, not an empty file
    pub base: Option<Vec<u8>>,
    /// Stage 3
    pub theirs: Option<Vec<u8>>,
}

impl FileVersions {
    pub fn side(&self, side: Side) -> Option<&[u8]> {
        match side {
            Side::Ours => self.ours.as_deref(),
            Side::Theirs => self.theirs.as_deref(),
        }
    }
}

/// A path git reported as unmerged
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictedFile {
    /// Repository-relative path
    pub path: String,
    pub conflict_type: ConflictType,
    /// Staged through the engine (or by someone else since the last refresh)
    pub resolved: bool,
    /// Lazily loaded index stages
    pub versions: Option<FileVersions>,
    /// In-memory merged content, not yet written to disk
    pub content: Option<Vec<u8>>,
    pub sections: Vec<ConflictSection>,
    /// Resolved to a side that deleted the file; saving runs `git rm`
    pub pending_removal: bool,
    /// Why the merged content could not be loaded or scanned
    pub load_error: Option<String>,
}

impl ConflictedFile {
    pub fn new(path: impl Into<String>, conflict_type: ConflictType) -> Self {
        Self {
            path: path.into(),
            conflict_type,
            resolved: false,
            versions: None,
            content: None,
            sections: Vec::new(),
            pending_removal: false,
            load_error: None,
        }
    }

    /// The merged content when it is UTF-8 text
    pub fn text(&self) -> Option<&str> {
        self.content
            .as_deref()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    pub fn unresolved_sections(&self) -> usize {
        self.sections.iter().filter(|s| !s.is_resolved()).count()
    }

    /// Mark staged; any section still open was settled outside the engine
    pub(crate) fn mark_resolved(&mut self) {
        self.resolved = true;
        for section in &mut self.sections {
            if !section.is_resolved() {
                section.resolution = Resolution::Manual;
            }
        }
    }
}

/// Snapshot of the in-progress operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeState {
    pub in_progress: bool,
    pub kind: Option<OperationKind>,
    /// Branch or commit being merged in (rebase: the `onto` commit)
    pub incoming: Option<String>,
    pub current_branch: Option<String>,
    /// Full hash of the commit git stopped at
    pub stopped_at: Option<String>,
    pub files: Vec<ConflictedFile>,
}

impl MergeState {
    /// The state with no operation in progress
    pub fn idle() -> Self {
        Self {
            in_progress: false,
            kind: None,
            incoming: None,
            current_branch: None,
            stopped_at: None,
            files: Vec::new(),
        }
    }

    pub fn resolved_count(&self) -> usize {
        self.files.iter().filter(|f| f.resolved).count()
    }

    pub fn unresolved_count(&self) -> usize {
        self.files.len() - self.resolved_count()
    }

    pub fn engine_state(&self) -> EngineState {
        if !self.in_progress {
            EngineState::Idle
        } else if self.unresolved_count() > 0 {
            EngineState::Conflicted
        } else {
            EngineState::AllResolved
        }
    }

    pub fn file(&self, path: &str) -> Option<&ConflictedFile> {
        self.files.iter().find(|f| f.path == path)
    }

    pub(crate) fn file_mut(&mut self, path: &str) -> Option<&mut ConflictedFile> {
        self.files.iter_mut().find(|f| f.path == path)
    }
}

impl Default for MergeState {
    fn default() -> Self {
        Self::idle()
    }
}
