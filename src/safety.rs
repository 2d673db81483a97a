use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Project boundary checks for every client-supplied path.
///
/// Paths arrive relative to the project root. They must stay inside it and
/// must not reach into protected areas such as the marker working directory
/// (owned by the refresh coordinator) or version-control metadata.
#[derive(Debug, Clone)]
pub struct ProjectGuard {
    /// Canonical project root
    project_root: PathBuf,
    /// Protected directories, already joined onto the canonical root
    forbidden_paths: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("Path is outside project: {path} (project: {project})")]
    OutsideProject { path: PathBuf, project: PathBuf },

    #[error("Path is in protected directory: {path} (protected: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("Path contains parent or root components: {0}")]
    InvalidComponent(PathBuf),

    #[error("Failed to canonicalize path: {0}")]
    Canonicalize(#[from] std::io::Error),
}

impl ProjectGuard {
    /// Create a guard for `project_root`, protecting `working_dir` (relative).
    pub fn new(project_root: impl AsRef<Path>, working_dir: &Path) -> Result<Self, SafetyError> {
        let project_root = project_root.as_ref().canonicalize()?;
        let forbidden_paths = vec![project_root.join(working_dir), project_root.join(".git")];

        Ok(Self {
            project_root,
            forbidden_paths,
        })
    }

    /// Resolve a path that must already exist.
    ///
    /// Returns the canonical absolute path if safe.
    pub fn resolve_existing(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let absolute = self.absolute(path.as_ref())?;
        let canonical = absolute.canonicalize()?;
        self.check(&canonical)?;
        Ok(canonical)
    }

    /// Resolve a path that may not exist yet (create, move destination).
    ///
    /// The deepest existing ancestor is canonicalized so symlinked parents
    /// cannot smuggle the target out of the project; the remainder must be
    /// plain names.
    pub fn resolve_new(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let absolute = self.absolute(path.as_ref())?;

        let mut existing = absolute.as_path();
        let mut tail = Vec::new();
        while !existing.exists() {
            match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    tail.push(name.to_os_string());
                    existing = parent;
                }
                _ => return Err(SafetyError::InvalidComponent(absolute.clone())),
            }
        }

        let mut resolved = existing.canonicalize()?;
        for name in tail.into_iter().rev() {
            resolved.push(name);
        }

        self.check(&resolved)?;
        Ok(resolved)
    }

    /// Project-relative display form of an absolute path inside the project.
    pub fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.project_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    fn absolute(&self, path: &Path) -> Result<PathBuf, SafetyError> {
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(SafetyError::InvalidComponent(path.to_path_buf()));
        }
        Ok(self.project_root.join(path))
    }

    fn check(&self, resolved: &Path) -> Result<(), SafetyError> {
        if !resolved.starts_with(&self.project_root) {
            return Err(SafetyError::OutsideProject {
                path: resolved.to_path_buf(),
                project: self.project_root.clone(),
            });
        }

        for forbidden in &self.forbidden_paths {
            if resolved.starts_with(forbidden) {
                return Err(SafetyError::ForbiddenPath {
                    path: resolved.to_path_buf(),
                    forbidden: forbidden.clone(),
                });
            }
        }

        Ok(())
    }
}

impl From<SafetyError> for crate::error::BridgeError {
    fn from(e: SafetyError) -> Self {
        use crate::error::{BridgeError, ErrorKind};
        match e {
            SafetyError::Canonicalize(source) if source.kind() == std::io::ErrorKind::NotFound => {
                BridgeError::new(ErrorKind::NotFoundError, format!("not found: {source}"))
            }
            other => BridgeError::new(ErrorKind::PathRejected, other.to_string()),
        }
    }
}
