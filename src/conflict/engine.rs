//! Conflict resolution engine
//!
//! One engine per repository, owned by the caller. The engine never guesses:
//! the files git keeps in the git directory (`MERGE_HEAD`, `rebase-merge/`,
//! `CHERRY_PICK_HEAD`, `REVERT_HEAD`) decide whether an operation is in
//! progress, and `git status` decides which paths are conflicted. Resolutions
//! are applied to in-memory content and only reach disk through
//! [`ConflictResolutionEngine::write_working_copy`] or
//! [`ConflictResolutionEngine::save_resolution`].

use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, info, instrument, warn};

use super::markers::{apply_resolution, conflict_marker_count, parse_conflict_sections};
use super::types::{
    ConflictSection, ConflictedFile, ContinueOutcome, EngineState, FileVersions, MergeState,
    OperationKind, Resolution, SectionChoice, Side,
};
use crate::config::Config;
use crate::error::{ConflictError, Result};
use crate::git::{Git, RepoPaths, require_success};
use crate::process::{CommandRunner, ProcessRunner};

/// Keeps git from opening an editor for continue/skip commit messages
const NON_INTERACTIVE_EDITOR: (&str, &str) = ("GIT_EDITOR", "true");

/// Tracks and drives a merge, rebase, cherry-pick or revert in one repository
#[derive(Debug)]
pub struct ConflictResolutionEngine<R: CommandRunner = ProcessRunner> {
    git: Git<R>,
    paths: RepoPaths,
    merge: MergeState,
}

impl ConflictResolutionEngine<ProcessRunner> {
    /// Engine for the repository containing `repo`
    pub fn open(repo: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let paths = RepoPaths::discover(repo)?;
        let git = Git::from_config(config, paths.workdir());
        Ok(Self::new(git, paths))
    }
}

impl<R: CommandRunner> ConflictResolutionEngine<R> {
    pub fn new(git: Git<R>, paths: RepoPaths) -> Self {
        Self {
            git,
            paths,
            merge: MergeState::idle(),
        }
    }

    pub fn state(&self) -> EngineState {
        self.merge.engine_state()
    }

    pub fn merge_state(&self) -> &MergeState {
        &self.merge
    }

    pub fn git(&self) -> &Git<R> {
        &self.git
    }

    pub fn paths(&self) -> &RepoPaths {
        &self.paths
    }

    /// Look up a conflicted file by repository-relative path
    pub fn file(&self, path: &str) -> Result<&ConflictedFile> {
        Ok(self
            .merge
            .file(path)
            .ok_or_else(|| ConflictError::UnknownFile(path.to_string()))?)
    }

    fn file_entry(&mut self, path: &str) -> Result<&mut ConflictedFile> {
        Ok(self
            .merge
            .file_mut(path)
            .ok_or_else(|| ConflictError::UnknownFile(path.to_string()))?)
    }

    /// Rebuild the merge state from the repository.
    ///
    /// Files of the same stopped operation that git no longer reports as
    /// unmerged are kept, marked resolved. Loaded content of files that are
    /// still conflicted is kept as well.
    #[instrument(skip(self))]
    pub async fn detect_state(&mut self) -> Result<&MergeState> {
        let Some(kind) = self.operation_in_progress().await? else {
            if self.merge.in_progress {
                debug!("Operation no longer in progress");
            }
            self.merge = MergeState::idle();
            return Ok(&self.merge);
        };

        let stopped_at = self.read_git_file(stopped_at_file(kind)).await?;
        let (incoming, current_branch) = self.describe(kind, stopped_at.as_deref()).await?;
        let unmerged = self.git.unmerged_files().await?;

        let same_operation = self.merge.in_progress
            && self.merge.kind == Some(kind)
            && self.merge.stopped_at == stopped_at;
        let mut previous = if same_operation {
            std::mem::take(&mut self.merge.files)
        } else {
            Vec::new()
        };

        let mut files = Vec::with_capacity(unmerged.len());
        for entry in unmerged {
            let known = previous
                .iter()
                .position(|f| f.path == entry.path && !f.resolved)
                .map(|i| previous.swap_remove(i));

            let file = match known {
                Some(mut file) => {
                    file.conflict_type = entry.conflict_type;
                    file
                }
                None => {
                    previous.retain(|f| f.path != entry.path);
                    ConflictedFile::new(entry.path, entry.conflict_type)
                }
            };
            files.push(file);
        }

        for mut file in previous {
            if !file.resolved {
                debug!("{} was resolved outside the engine", file.path);
                file.mark_resolved();
            }
            files.push(file);
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));

        self.merge = MergeState {
            in_progress: true,
            kind: Some(kind),
            incoming,
            current_branch,
            stopped_at,
            files,
        };

        info!(
            "{} in progress: {} unresolved, {} resolved",
            kind,
            self.merge.unresolved_count(),
            self.merge.resolved_count()
        );

        Ok(&self.merge)
    }

    async fn operation_in_progress(&self) -> Result<Option<OperationKind>> {
        let git_dir = self.paths.git_dir();

        if exists(&git_dir.join("rebase-merge")).await? {
            return Ok(Some(OperationKind::Rebase));
        }
        // rebase-apply is shared with `git am`, which marks itself with `applying`
        if exists(&git_dir.join("rebase-apply")).await?
            && !exists(&git_dir.join("rebase-apply/applying")).await?
        {
            return Ok(Some(OperationKind::Rebase));
        }

        for (file, kind) in [
            ("MERGE_HEAD", OperationKind::Merge),
            ("CHERRY_PICK_HEAD", OperationKind::CherryPick),
            ("REVERT_HEAD", OperationKind::Revert),
        ] {
            if exists(&git_dir.join(file)).await? {
                return Ok(Some(kind));
            }
        }

        Ok(None)
    }

    /// Incoming name and current branch for display
    async fn describe(
        &self,
        kind: OperationKind,
        stopped_at: Option<&str>,
    ) -> Result<(Option<String>, Option<String>)> {
        match kind {
            OperationKind::Rebase => {
                let dir = if exists(&self.paths.git_dir().join("rebase-merge")).await? {
                    "rebase-merge"
                } else {
                    "rebase-apply"
                };

                let incoming = match self.read_git_file(&format!("{}/onto", dir)).await? {
                    Some(onto) => Some(self.git.short_hash(&onto).await?),
                    None => None,
                };
                let current_branch = self
                    .read_git_file(&format!("{}/head-name", dir))
                    .await?
                    .and_then(|name| name.strip_prefix("refs/heads/").map(str::to_string));

                Ok((incoming, current_branch))
            }
            OperationKind::Merge => {
                let from_message = self
                    .read_git_file("MERGE_MSG")
                    .await?
                    .and_then(|subject| incoming_from_merge_subject(&subject));

                let incoming = match (from_message, stopped_at) {
                    (Some(name), _) => Some(name),
                    (None, Some(head)) => Some(self.git.short_hash(head).await?),
                    (None, None) => None,
                };

                Ok((incoming, self.git.current_branch().await?))
            }
            OperationKind::CherryPick | OperationKind::Revert => {
                let incoming = match stopped_at {
                    Some(head) => Some(self.git.short_hash(head).await?),
                    None => None,
                };

                Ok((incoming, self.git.current_branch().await?))
            }
        }
    }

    /// First line of a file in the git directory, `None` when absent or empty
    async fn read_git_file(&self, relative: &str) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.paths.git_dir().join(relative)).await {
            Ok(text) => Ok(text
                .lines()
                .next()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read the ours/base/theirs blobs of a conflicted path from the index
    #[instrument(skip(self))]
    pub async fn load_file_versions(&mut self, path: &str) -> Result<&FileVersions> {
        self.file(path)?;

        let stages = self.git.index_stages(path).await?;
        let versions = FileVersions {
            ours: self.read_blob(stages.ours.as_deref()).await?,
            base: self.read_blob(stages.base.as_deref()).await?,
            theirs: self.read_blob(stages.theirs.as_deref()).await?,
        };

        let file = self.file_entry(path)?;
        Ok(file.versions.insert(versions))
    }

    async fn read_blob(&self, object: Option<&str>) -> Result<Option<Vec<u8>>> {
        match object {
            Some(object) => Ok(Some(self.git.blob(object).await?)),
            None => Ok(None),
        }
    }

    /// Read the merged working file and scan its conflict sections.
    ///
    /// Content is kept byte for byte. A file that is not UTF-8 text or cannot
    /// be scanned records the problem in `load_error`; the rest of the merge
    /// state is unaffected.
    #[instrument(skip(self))]
    pub async fn load_file(&mut self, path: &str) -> Result<&ConflictedFile> {
        self.file(path)?;

        let bytes = match tokio::fs::read(self.paths.resolve(path)).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let file = self.file_entry(path)?;
        file.pending_removal = false;
        file.sections.clear();

        let Some(bytes) = bytes else {
            file.content = None;
            file.load_error = Some("not present in the working tree".to_string());
            return Ok(file);
        };

        match std::str::from_utf8(&bytes).map(parse_conflict_sections) {
            Ok(Ok(sections)) => {
                file.sections = sections;
                file.load_error = None;
                if file.resolved && file.unresolved_sections() > 0 {
                    file.resolved = false;
                }
            }
            Ok(Err(e)) => {
                warn!("Cannot scan conflict markers in {}: {}", path, e);
                file.load_error = Some(e.to_string());
            }
            Err(_) => {
                debug!("{} is not UTF-8 text, skipping marker scan", path);
                file.load_error = Some("not UTF-8 text".to_string());
            }
        }
        file.content = Some(bytes);

        Ok(file)
    }

    /// Settle one section of the in-memory content.
    ///
    /// Later sections shift by the number of lines the rewrite added or removed.
    pub fn resolve_section(
        &mut self,
        path: &str,
        index: usize,
        choice: SectionChoice,
    ) -> Result<&ConflictedFile> {
        let file = self.file_entry(path)?;
        let content = file
            .content
            .as_deref()
            .ok_or_else(|| ConflictError::ContentNotLoaded(path.to_string()))?;
        let content = std::str::from_utf8(content)
            .map_err(|_| ConflictError::NotText(path.to_string()))?;
        let section = file
            .sections
            .get(index)
            .ok_or_else(|| ConflictError::SectionOutOfRange {
                path: path.to_string(),
                index,
            })?;
        if section.is_resolved() {
            return Err(ConflictError::SectionAlreadyResolved {
                path: path.to_string(),
                index,
            }
            .into());
        }

        let (content, lines) = apply_resolution(content, section, &choice)?;
        let old_end = section.end_line;
        let delta = lines as isize - section.line_count() as isize;

        let section = &mut file.sections[index];
        section.end_line = (section.start_line + lines).saturating_sub(1);
        section.resolution = choice.resolution();

        for later in file.sections.iter_mut().filter(|s| s.start_line > old_end) {
            later.start_line = later.start_line.saturating_add_signed(delta);
            later.end_line = later.end_line.saturating_add_signed(delta);
        }
        file.content = Some(content.into_bytes());

        debug!(
            "Resolved section {} of {}, {} open",
            index,
            path,
            file.unresolved_sections()
        );
        Ok(file)
    }

    /// Take one side's whole version of a file.
    ///
    /// When that side deleted the file, saving removes it instead.
    #[instrument(skip(self))]
    pub async fn resolve_file(&mut self, path: &str, side: Side) -> Result<&ConflictedFile> {
        if self.file(path)?.versions.is_none() {
            self.load_file_versions(path).await?;
        }

        let file = self.file_entry(path)?;
        let blob = file
            .versions
            .as_ref()
            .and_then(|v| v.side(side))
            .map(<[u8]>::to_vec);

        file.pending_removal = blob.is_none();
        file.content = blob;
        file.load_error = None;
        for section in &mut file.sections {
            section.resolution = side.into();
        }

        Ok(file)
    }

    /// Replace the in-memory content with caller-edited text.
    ///
    /// Open sections whose blocks no longer appear are recorded as manual.
    pub fn set_file_content(&mut self, path: &str, text: impl Into<String>) -> Result<&ConflictedFile> {
        let text = text.into();
        let file = self.file_entry(path)?;

        match parse_conflict_sections(&text) {
            Ok(found) => {
                let previous = std::mem::take(&mut file.sections);
                file.sections = reconcile_sections(previous, found);
                file.load_error = None;
            }
            Err(e) => file.load_error = Some(e.to_string()),
        }
        file.content = Some(text.into_bytes());
        file.pending_removal = false;

        Ok(file)
    }

    /// Persist the in-memory content without staging it
    pub async fn write_working_copy(&self, path: &str) -> Result<()> {
        let content = self
            .file(path)?
            .content
            .as_deref()
            .ok_or_else(|| ConflictError::ContentNotLoaded(path.to_string()))?;

        tokio::fs::write(self.paths.resolve(path), content).await?;
        Ok(())
    }

    /// Write the resolved content and stage it.
    ///
    /// Refuses, without touching disk, while conflict markers remain.
    #[instrument(skip(self))]
    pub async fn save_resolution(&mut self, path: &str) -> Result<EngineState> {
        let file = self.file(path)?;

        if file.pending_removal {
            self.git.remove(path).await?;
        } else {
            let content = file
                .content
                .as_deref()
                .ok_or_else(|| ConflictError::ContentNotLoaded(path.to_string()))?;

            let sections = conflict_marker_count(&String::from_utf8_lossy(content));
            if sections > 0 {
                return Err(ConflictError::MarkersRemain {
                    path: path.to_string(),
                    sections,
                }
                .into());
            }

            tokio::fs::write(self.paths.resolve(path), content).await?;
            self.git.stage(path).await?;
        }

        let file = self.file_entry(path)?;
        file.mark_resolved();
        file.load_error = None;

        info!("Marked {} as resolved", path);
        Ok(self.state())
    }

    /// Finalize the operation once every file is resolved.
    ///
    /// Rejected locally, without running git, in any other state.
    #[instrument(skip(self))]
    pub async fn continue_operation(&mut self) -> Result<ContinueOutcome> {
        let kind = match self.state() {
            EngineState::Idle => return Err(ConflictError::NoOperationInProgress.into()),
            EngineState::Conflicted => {
                return Err(ConflictError::UnresolvedFiles {
                    count: self.merge.unresolved_count(),
                }
                .into());
            }
            EngineState::AllResolved => self.active_kind()?,
        };

        let request = self
            .git
            .request(kind.continue_args())
            .env(NON_INTERACTIVE_EDITOR.0, NON_INTERACTIVE_EDITOR.1);
        let result = self.git.execute(request).await?;

        if result.succeeded() {
            info!("{} completed", kind);
            self.merge = MergeState::idle();
            return Ok(ContinueOutcome::Completed);
        }

        debug!("{} stopped (exit {}), refreshing state", kind, result.exit_code);
        self.detect_state().await?;

        match self.state() {
            EngineState::Conflicted => Ok(ContinueOutcome::NewConflicts(self.merge.unresolved_count())),
            EngineState::AllResolved => Err(ConflictError::ContinueStopped {
                stderr: result.stderr.trim().to_string(),
            }
            .into()),
            EngineState::Idle => Ok(ContinueOutcome::Completed),
        }
    }

    /// Abandon the operation; git restores the pre-operation working tree
    #[instrument(skip(self))]
    pub async fn abort_operation(&mut self) -> Result<()> {
        let kind = self.active_kind()?;
        self.git.output(kind.abort_args()).await?;

        info!("{} aborted", kind);
        self.merge = MergeState::idle();
        Ok(())
    }

    /// Drop the commit git stopped at; may surface the next conflict
    #[instrument(skip(self))]
    pub async fn skip_operation(&mut self) -> Result<&MergeState> {
        let kind = self.active_kind()?;
        let args = kind
            .skip_args()
            .ok_or(ConflictError::SkipNotSupported(kind))?;

        let stopped_at = self.merge.stopped_at.clone();
        let request = self
            .git
            .request(args)
            .env(NON_INTERACTIVE_EDITOR.0, NON_INTERACTIVE_EDITOR.1);
        let result = self.git.execute(request).await?;

        self.detect_state().await?;

        // A nonzero exit is expected when git stops at the next conflict;
        // anything else that leaves the operation where it was is a failure.
        if !result.succeeded() {
            let unmoved = self.merge.kind == Some(kind) && self.merge.stopped_at == stopped_at;
            if unmoved || self.state() == EngineState::AllResolved {
                warn!("{} --skip failed with exit {}", kind, result.exit_code);
                require_success(result)?;
            }
        }

        Ok(&self.merge)
    }

    fn active_kind(&self) -> Result<OperationKind> {
        match self.merge.kind {
            Some(kind) if self.merge.in_progress => Ok(kind),
            _ => Err(ConflictError::NoOperationInProgress.into()),
        }
    }
}

/// File holding the commit git stopped at for each operation
fn stopped_at_file(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Merge => "MERGE_HEAD",
        OperationKind::Rebase => "REBASE_HEAD",
        OperationKind::CherryPick => "CHERRY_PICK_HEAD",
        OperationKind::Revert => "REVERT_HEAD",
    }
}

/// Branch name from a `MERGE_MSG` subject such as `Merge branch 'feature' into main`
fn incoming_from_merge_subject(subject: &str) -> Option<String> {
    const PREFIXES: [&str; 4] = [
        "Merge branch '",
        "Merge remote-tracking branch '",
        "Merge tag '",
        "Merge commit '",
    ];

    PREFIXES.iter().find_map(|prefix| {
        let rest = subject.strip_prefix(prefix)?;
        let (name, _) = rest.split_once('\'')?;
        Some(name.to_string())
    })
}

/// Merge freshly scanned sections into the previous list.
///
/// An open section whose blocks are still present picks up its new position;
/// one that disappeared was edited by hand.
fn reconcile_sections(
    previous: Vec<ConflictSection>,
    found: Vec<ConflictSection>,
) -> Vec<ConflictSection> {
    let mut found: Vec<Option<ConflictSection>> = found.into_iter().map(Some).collect();
    let mut sections = Vec::with_capacity(previous.len().max(found.len()));

    for mut old in previous {
        if !old.is_resolved() {
            let current = found
                .iter_mut()
                .find(|slot| {
                    slot.as_ref().is_some_and(|s| {
                        s.ours == old.ours && s.theirs == old.theirs && s.base == old.base
                    })
                })
                .and_then(Option::take);

            match current {
                Some(current) => {
                    sections.push(current);
                    continue;
                }
                None => old.resolution = Resolution::Manual,
            }
        }
        sections.push(old);
    }

    sections.extend(found.into_iter().flatten());
    sections.sort_by_key(|s| s.start_line);
    sections
}

async fn exists(path: &Path) -> Result<bool> {
    Ok(tokio::fs::try_exists(path).await?)
}
