//! The Model Registry (C1): a named, content-addressed-by-name store of
//! model archives, backed by a directory tree on disk.

pub mod client;

use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::ZipArchive;

use crate::error::RegistryError;

/// How `add` behaves when a name is already registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Reject the upload with `RegistryError::AlreadyExists`.
    Reject,
    /// Keep the existing archive, log a warning, and report success.
    Ignore,
}

pub struct ModelRegistry {
    base_dir: PathBuf,
}

impl ModelRegistry {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    fn model_dir(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    fn archive_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(format!("{name}.zip"))
    }

    /// Extracts `bytes` into `<base_dir>/<name>/`, normalising a single
    /// common leading directory (if every entry shares one) so the
    /// model's files sit at the archive root, then repackages a
    /// canonical `.zip` for retrieval.
    pub fn add(&self, name: &str, bytes: &[u8], on_duplicate: DuplicatePolicy) -> Result<(), RegistryError> {
        let model_dir = self.model_dir(name);
        if model_dir.exists() {
            return match on_duplicate {
                DuplicatePolicy::Reject => Err(RegistryError::AlreadyExists(name.to_string())),
                DuplicatePolicy::Ignore => {
                    warn!(model = name, "ignoring duplicate model upload");
                    Ok(())
                }
            };
        }

        std::fs::create_dir_all(&model_dir)?;
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let strip_prefix = common_leading_directory(&archive);

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let Some(raw_name) = entry.enclosed_name() else {
                continue;
            };
            let relative = match &strip_prefix {
                Some(prefix) => raw_name.strip_prefix(prefix).unwrap_or(&raw_name).to_path_buf(),
                None => raw_name,
            };
            if relative.as_os_str().is_empty() {
                continue;
            }
            let dest = model_dir.join(&relative);
            if entry.is_dir() {
                std::fs::create_dir_all(&dest)?;
            } else {
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut out = std::fs::File::create(&dest)?;
                std::io::copy(&mut entry, &mut out)?;
            }
        }

        self.repackage(name)?;
        Ok(())
    }

    /// Returns the canonical repackaged archive for `name`.
    pub fn get(&self, name: &str) -> Result<Vec<u8>, RegistryError> {
        let archive_path = self.archive_path(name);
        if !archive_path.exists() {
            if self.model_dir(name).is_dir() {
                self.repackage(name)?;
            } else {
                return Err(RegistryError::NotFound(name.to_string()));
            }
        }
        Ok(std::fs::read(self.archive_path(name))?)
    }

    /// Enumeration order is unspecified; this returns directory order.
    pub fn list(&self) -> Result<Vec<String>, RegistryError> {
        let mut names = Vec::new();
        if !self.base_dir.is_dir() {
            return Ok(names);
        }
        for entry in std::fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    /// At startup, treat every subdirectory of the base path as an
    /// existing model and lazily materialise its `.zip` if absent.
    pub fn load_from_disk(&self) -> Result<(), RegistryError> {
        for name in self.list()? {
            if !self.archive_path(&name).exists() {
                self.repackage(&name)?;
            }
        }
        Ok(())
    }

    fn repackage(&self, name: &str) -> Result<(), RegistryError> {
        let model_dir = self.model_dir(name);
        let archive_path = self.archive_path(name);
        let file = std::fs::File::create(&archive_path)?;
        let mut writer = zip::ZipWriter::new(file);
        let options = FileOptions::<()>::default();

        for entry in WalkDir::new(&model_dir).into_iter().filter_map(|e| e.ok()) {
            let relative = entry.path().strip_prefix(&model_dir).unwrap();
            if relative.as_os_str().is_empty() {
                continue;
            }
            let name_in_zip = relative.to_string_lossy().replace('\\', "/");
            if entry.file_type().is_dir() {
                writer.add_directory(format!("{name_in_zip}/"), options)?;
            } else {
                writer.start_file(name_in_zip, options)?;
                let mut contents = Vec::new();
                std::fs::File::open(entry.path())?.read_to_end(&mut contents)?;
                writer.write_all(&contents)?;
            }
        }
        writer.finish()?;
        Ok(())
    }
}

/// Detects a single directory shared by every entry in the archive, so
/// uploads of either a model directory or its contents normalise the same
/// way. Mirrors `_common_subdir_in_zip`'s `parts[:-1]`: the candidate is
/// built from each entry's path with its own filename dropped, so a lone
/// top-level file (no directory component) never gets mistaken for a
/// shared directory.
fn common_leading_directory<R: Read + std::io::Seek>(archive: &ZipArchive<R>) -> Option<PathBuf> {
    let mut common: Option<PathBuf> = None;
    for name in archive.file_names() {
        if name.ends_with('/') {
            continue;
        }
        let mut components: Vec<_> = Path::new(name).components().collect();
        components.pop();
        let candidate: PathBuf = components.into_iter().collect();
        match &common {
            None => common = Some(candidate),
            Some(existing) if existing == &candidate => {}
            Some(_) => return None,
        }
    }
    match common {
        Some(dir) if !dir.as_os_str().is_empty() => Some(dir),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn zip_with_entries(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let cursor = Cursor::new(&mut buf);
            let mut writer = zip::ZipWriter::new(cursor);
            let options = FileOptions::<()>::default();
            for (name, contents) in entries {
                writer.start_file(*name, options).unwrap();
                writer.write_all(contents).unwrap();
            }
            writer.finish().unwrap();
        }
        buf
    }

    #[test]
    fn normalises_single_common_leading_directory() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::new(dir.path());
        let bytes = zip_with_entries(&[("subdir/file.a", b"a"), ("subdir/file.b", b"b")]);
        registry.add("m1", &bytes, DuplicatePolicy::Reject).unwrap();

        let retrieved = registry.get("m1").unwrap();
        let mut archive = ZipArchive::new(Cursor::new(retrieved)).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["file.a".to_string(), "file.b".to_string()]);
    }

    #[test]
    fn duplicate_reject_policy_errors() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::new(dir.path());
        let bytes = zip_with_entries(&[("file.a", b"a")]);
        registry.add("m1", &bytes, DuplicatePolicy::Reject).unwrap();
        let err = registry.add("m1", &bytes, DuplicatePolicy::Reject).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists(_)));
    }

    #[test]
    fn duplicate_ignore_policy_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::new(dir.path());
        let bytes = zip_with_entries(&[("file.a", b"a")]);
        registry.add("m1", &bytes, DuplicatePolicy::Ignore).unwrap();
        registry.add("m1", &bytes, DuplicatePolicy::Ignore).unwrap();
    }

    #[test]
    fn unknown_model_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::new(dir.path());
        assert!(matches!(registry.get("missing"), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn list_enumerates_added_models() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::new(dir.path());
        let bytes = zip_with_entries(&[("file.a", b"a")]);
        registry.add("m1", &bytes, DuplicatePolicy::Reject).unwrap();
        registry.add("m2", &bytes, DuplicatePolicy::Reject).unwrap();
        let mut names = registry.list().unwrap();
        names.sort();
        assert_eq!(names, vec!["m1".to_string(), "m2".to_string()]);
    }
}
