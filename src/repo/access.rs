use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::RepositoryError;

const README_NAMES: [&str; 4] = ["README.md", "README", "README.rst", "readme.md"];

fn canonical_dir(path: &Path) -> Result<PathBuf, RepositoryError> {
    let canonical = path
        .canonicalize()
        .map_err(|e| RepositoryError::io(path, e))?;
    if !canonical.is_dir() {
        return Err(RepositoryError::NotADirectory(canonical));
    }
    Ok(canonical)
}

/// Where `path` will live once created: its nearest existing ancestor,
/// canonicalized, joined with the components that do not exist yet.
fn projected_dir(path: &Path) -> Result<PathBuf, RepositoryError> {
    let absolute = std::path::absolute(path).map_err(|e| RepositoryError::io(path, e))?;
    let mut existing = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::ParentDir => {
                existing.pop();
            }
            Component::CurDir => {}
            other => existing.push(other),
        }
    }

    let mut missing = Vec::new();
    while !existing.exists() {
        match existing.file_name() {
            Some(name) => missing.push(name.to_os_string()),
            None => return Err(RepositoryError::NotADirectory(path.to_path_buf())),
        }
        existing.pop();
    }

    let mut projected = canonical_dir(&existing)?;
    projected.extend(missing.iter().rev());
    Ok(projected)
}

/// Join `rel` onto `root`, refusing absolute paths and parent traversal.
fn confine(root: &Path, rel: &Path) -> Result<PathBuf, RepositoryError> {
    let escapes = rel
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || rel.as_os_str().is_empty() {
        return Err(RepositoryError::OutsideRoot(rel.to_path_buf()));
    }
    Ok(root.join(rel))
}

// ============================================================================
// Application repository (read-only)
// ============================================================================

/// Read-only view of the application under test. Exposes no write methods.
#[derive(Debug, Clone)]
pub struct AppRepo {
    root: PathBuf,
}

impl AppRepo {
    pub fn open(path: &Path) -> Result<Self, RepositoryError> {
        Ok(Self {
            root: canonical_dir(path)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn read_to_string(&self, rel: &Path) -> Result<String, RepositoryError> {
        let path = confine(&self.root, rel)?;
        fs::read_to_string(&path).map_err(|e| RepositoryError::io(path, e))
    }

    /// First `max_chars` of the project README, used as prompt context.
    pub fn readme_excerpt(&self, max_chars: usize) -> Option<String> {
        let text = README_NAMES
            .iter()
            .find_map(|name| self.read_to_string(Path::new(name)).ok())?;
        let excerpt: String = text.chars().take(max_chars).collect();
        let excerpt = excerpt.trim();
        (!excerpt.is_empty()).then(|| excerpt.to_string())
    }
}

// ============================================================================
// Test repository (the only write target)
// ============================================================================

/// Write-capable handle on the generated test suite.
///
/// Every path is resolved relative to the root and may not escape it. The
/// root never overlaps the application repository, so no write can land
/// there.
#[derive(Debug, Clone)]
pub struct TestRepo {
    root: PathBuf,
}

impl TestRepo {
    /// Open (creating if needed) the test repository at `path`.
    ///
    /// Overlap with the application repository is checked before anything
    /// is created.
    pub fn open(path: &Path, app: Option<&AppRepo>) -> Result<Self, RepositoryError> {
        let projected = projected_dir(path)?;
        if let Some(app) = app {
            if projected.starts_with(app.root()) || app.root().starts_with(&projected) {
                return Err(RepositoryError::Overlap {
                    app: app.root().to_path_buf(),
                    test: projected,
                });
            }
        }

        fs::create_dir_all(path).map_err(|e| RepositoryError::io(path, e))?;
        let root = canonical_dir(path)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, rel: &Path) -> Result<PathBuf, RepositoryError> {
        confine(&self.root, rel)
    }

    pub fn exists(&self, rel: &Path) -> bool {
        self.resolve(rel).is_ok_and(|p| p.exists())
    }

    pub fn read(&self, rel: &Path) -> Result<Option<String>, RepositoryError> {
        let path = self.resolve(rel)?;
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RepositoryError::io(path, e)),
        }
    }

    pub fn create_dir(&self, rel: &Path) -> Result<PathBuf, RepositoryError> {
        let path = self.resolve(rel)?;
        fs::create_dir_all(&path).map_err(|e| RepositoryError::io(&path, e))?;
        Ok(path)
    }

    /// Write `contents` into a temp file beside the target, ready to persist.
    fn stage(&self, rel: &Path, contents: &str) -> Result<(PathBuf, NamedTempFile), RepositoryError> {
        let path = self.resolve(rel)?;
        let parent = path
            .parent()
            .ok_or_else(|| RepositoryError::OutsideRoot(rel.to_path_buf()))?;
        fs::create_dir_all(parent).map_err(|e| RepositoryError::io(parent, e))?;

        let mut temp = NamedTempFile::new_in(parent).map_err(|e| RepositoryError::io(parent, e))?;
        temp.write_all(contents.as_bytes())
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| RepositoryError::io(temp.path(), e))?;
        Ok((path, temp))
    }

    /// Temp file plus rename; readers never see a partial file.
    pub fn write_atomic(&self, rel: &Path, contents: &str) -> Result<PathBuf, RepositoryError> {
        let (path, temp) = self.stage(rel, contents)?;
        temp.persist(&path)
            .map_err(|e| RepositoryError::io(&path, e.error))?;
        Ok(path)
    }

    /// Like `write_atomic` but leaves an existing file alone. Returns whether
    /// the file was written.
    pub fn write_new(&self, rel: &Path, contents: &str) -> Result<bool, RepositoryError> {
        if self.exists(rel) {
            return Ok(false);
        }
        let (path, temp) = self.stage(rel, contents)?;
        match temp.persist_noclobber(&path) {
            Ok(_) => Ok(true),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(RepositoryError::io(&path, e.error)),
        }
    }

    /// Replace two files as a unit.
    ///
    /// Both contents are staged before either target changes. If the second
    /// rename fails the first target is rolled back to its previous state.
    pub fn replace_pair(
        &self,
        first: (&Path, &str),
        second: (&Path, &str),
    ) -> Result<(PathBuf, PathBuf), RepositoryError> {
        let (first_path, first_temp) = self.stage(first.0, first.1)?;
        let (second_path, second_temp) = self.stage(second.0, second.1)?;

        let backup = match fs::read(&first_path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(RepositoryError::io(&first_path, e)),
        };

        first_temp
            .persist(&first_path)
            .map_err(|e| RepositoryError::io(&first_path, e.error))?;

        if let Err(e) = second_temp.persist(&second_path) {
            let restored = match &backup {
                Some(bytes) => fs::write(&first_path, bytes),
                None => fs::remove_file(&first_path),
            };
            if let Err(restore) = restored {
                warn!(path = %first_path.display(), error = %restore, "rollback failed");
            }
            return Err(RepositoryError::io(&second_path, e.error));
        }

        debug!(first = %first_path.display(), second = %second_path.display(), "replaced pair");
        Ok((first_path, second_path))
    }
}
