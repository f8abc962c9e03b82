use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("`{name}` is not a valid artifact identifier.")]
    InvalidName { name: String },

    #[error("Could not prepare artifact cache at `{path}`: {source}")]
    Cache {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Resolves a named likelihood artifact (e.g. `"angle.onnx"`) to a local
/// file reference. Fetching the artifact's bytes from a remote store is the
/// implementor's concern; the model layer only stores the resolved path.
///
/// Implementations must be idempotent: repeated calls with the same
/// identifier return the same reference.
pub trait ArtifactResolver {
    fn resolve(&self, name: &str) -> Result<PathBuf, ArtifactError>;
}

/// Default resolver: maps each identifier to a slot in a local cache
/// directory. Purely local; a remote-backed resolver can be swapped in via
/// `ModelBuilder::artifact_resolver`.
#[derive(Debug, Clone)]
pub struct LocalCacheResolver {
    cache_dir: PathBuf,
}

impl LocalCacheResolver {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

impl Default for LocalCacheResolver {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join("hssm-artifacts"))
    }
}

impl ArtifactResolver for LocalCacheResolver {
    fn resolve(&self, name: &str) -> Result<PathBuf, ArtifactError> {
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.starts_with('.')
        {
            return Err(ArtifactError::InvalidName {
                name: name.to_string(),
            });
        }
        std::fs::create_dir_all(&self.cache_dir).map_err(|source| ArtifactError::Cache {
            path: self.cache_dir.clone(),
            source,
        })?;
        Ok(self.cache_dir.join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_is_idempotent() {
        let resolver = LocalCacheResolver::default();
        let a = resolver.resolve("angle.onnx").unwrap();
        let b = resolver.resolve("angle.onnx").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.file_name().unwrap(), "angle.onnx");
    }

    #[test]
    fn path_like_identifiers_are_rejected() {
        let resolver = LocalCacheResolver::default();
        assert!(resolver.resolve("../angle.onnx").is_err());
        assert!(resolver.resolve("nested/angle.onnx").is_err());
        assert!(resolver.resolve("").is_err());
    }
}
