//! On-disk function catalog.
//!
//! Built once at startup by listing the subdirectories of
//! `<catalog_dir>/{microvms,unikernels,containers}/`; each subdirectory
//! name is a function. Read-only thereafter — functions cannot be added or
//! removed without a restart, matching the "no function image
//! build/publish pipeline" non-goal.

use std::path::Path;

use thiserror::Error;

use crate::config::BackendKind;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to scan catalog directory {dir}: {source}")]
    ScanFailed {
        dir: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct Catalog {
    functions: Vec<String>,
}

impl Catalog {
    /// Scan `<catalog_dir>/<backend's subdir>` for function directories.
    pub fn scan(catalog_dir: &Path, backend: BackendKind) -> Result<Self, CatalogError> {
        let dir = catalog_dir.join(backend.catalog_subdir());
        let mut functions = Vec::new();

        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            // An empty/missing catalog directory is a valid "no functions
            // deployed yet" state, not a startup error.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self { functions });
            }
            Err(source) => {
                return Err(CatalogError::ScanFailed {
                    dir: dir.display().to_string(),
                    source,
                })
            }
        };

        for entry in entries {
            let entry = entry.map_err(|source| CatalogError::ScanFailed {
                dir: dir.display().to_string(),
                source,
            })?;

            let is_dir = entry
                .file_type()
                .map_err(|source| CatalogError::ScanFailed {
                    dir: dir.display().to_string(),
                    source,
                })?
                .is_dir();

            if is_dir {
                functions.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        functions.sort();
        Ok(Self { functions })
    }

    pub fn functions(&self) -> &[String] {
        &self.functions
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.iter().any(|f| f == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn scan_lists_function_directories_only() {
        let dir = tempdir().unwrap();
        let unikernels = dir.path().join("unikernels");
        std::fs::create_dir_all(unikernels.join("pi")).unwrap();
        std::fs::create_dir_all(unikernels.join("hello")).unwrap();
        std::fs::write(unikernels.join("README.txt"), b"not a function").unwrap();

        let catalog = Catalog::scan(dir.path(), BackendKind::Unikernel).unwrap();
        assert_eq!(catalog.functions(), &["hello".to_string(), "pi".to_string()]);
        assert!(catalog.contains("pi"));
        assert!(!catalog.contains("ghost"));
    }

    #[test]
    fn scan_of_missing_directory_yields_empty_catalog() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::scan(dir.path(), BackendKind::Container).unwrap();
        assert!(catalog.functions().is_empty());
    }
}
