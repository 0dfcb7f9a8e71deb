//! Repository discovery using gitoxide
//!
//! Locates the working tree and the git directory without spawning git.
//! For linked worktrees the git directory is the per-worktree one, which is
//! where git keeps `MERGE_HEAD`, `rebase-merge/` and friends.

use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::error::{GitError, Result};

/// Filesystem layout of a discovered repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPaths {
    /// Root of the working tree
    workdir: PathBuf,
    /// The repository's (or linked worktree's) git directory
    git_dir: PathBuf,
}

impl RepoPaths {
    /// Build from known paths, skipping discovery
    pub fn new(workdir: impl Into<PathBuf>, git_dir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            git_dir: git_dir.into(),
        }
    }

    /// Discover the repository containing `path` (searches parent directories)
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn discover(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let repo = gix::discover(path).map_err(|e| {
            debug!("Repository discovery failed: {}", e);
            GitError::NotARepository(path.to_path_buf())
        })?;

        let git_dir = repo.path().to_path_buf();
        let workdir = repo.work_dir().map(Path::to_path_buf).ok_or_else(|| {
            GitError::Gix(format!("{} is a bare repository", git_dir.display()))
        })?;

        debug!("Discovered repository at {:?} (git dir {:?})", workdir, git_dir);

        Ok(Self { workdir, git_dir })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Absolute path of a repository-relative file
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.workdir.join(relative)
    }

    /// The repository name (directory name)
    pub fn repo_name(&self) -> String {
        self.workdir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_discover_from_subdirectory() {
        let temp_dir = TempDir::new().unwrap();
        gix::init(temp_dir.path()).unwrap();
        let nested = temp_dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let paths = RepoPaths::discover(&nested).unwrap();
        assert_eq!(
            paths.workdir().canonicalize().unwrap(),
            temp_dir.path().canonicalize().unwrap()
        );
        assert!(paths.git_dir().ends_with(".git"));
        assert!(!paths.repo_name().is_empty());
    }

    #[test]
    fn test_discover_outside_repository() {
        let temp_dir = TempDir::new().unwrap();
        let result = RepoPaths::discover(temp_dir.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_relative_path() {
        let paths = RepoPaths::new("/work/repo", "/work/repo/.git");
        assert_eq!(paths.resolve("src/lib.rs"), PathBuf::from("/work/repo/src/lib.rs"));
    }
}
