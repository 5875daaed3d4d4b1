//! Root-confined path resolution for the filesystem tools.

use std::io;
use std::path::{Component, Path, PathBuf};

/// A directory that filesystem tools may not leave.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("path '{0}' escapes the allowed root")]
    Escape(String),

    #[error("cannot resolve root '{path}': {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Sandbox {
    /// Confine to `root`, which must exist.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SandboxError> {
        let path = root.as_ref();
        let root = path.canonicalize().map_err(|source| SandboxError::Root {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `requested` (relative to the root, or absolute) to a path
    /// inside the root.
    ///
    /// `..` is folded lexically first, then existing paths are canonicalized
    /// so symlinks pointing outside the root are caught as well.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf, SandboxError> {
        let candidate = Path::new(requested);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };

        let normalized = normalize(&joined);
        if !normalized.starts_with(&self.root) {
            return Err(SandboxError::Escape(requested.to_string()));
        }

        match normalized.canonicalize() {
            Ok(real) if real.starts_with(&self.root) => Ok(real),
            Ok(_) => Err(SandboxError::Escape(requested.to_string())),
            Err(_) => Ok(normalized),
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_stay_inside() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();
        let sandbox = Sandbox::new(dir.path()).unwrap();

        let resolved = sandbox.resolve("a.txt").unwrap();
        assert!(resolved.starts_with(sandbox.root()));
        assert!(sandbox.resolve("./sub/../a.txt").is_ok());
    }

    #[test]
    fn traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new(dir.path()).unwrap();

        assert!(matches!(sandbox.resolve("../secret"), Err(SandboxError::Escape(_))));
        assert!(matches!(sandbox.resolve("a/../../b"), Err(SandboxError::Escape(_))));
        assert!(matches!(sandbox.resolve("/etc/passwd"), Err(SandboxError::Escape(_))));
    }

    #[test]
    fn absolute_path_inside_root_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new(dir.path()).unwrap();
        let inside = sandbox.root().join("new.txt");
        assert!(sandbox.resolve(inside.to_str().unwrap()).is_ok());
    }

    #[test]
    fn missing_root_is_an_error() {
        assert!(matches!(
            Sandbox::new("/definitely/not/here/ferroact"),
            Err(SandboxError::Root { .. })
        ));
    }
}
