use crate::domain::model::Upload;
use crate::domain::ports::Storage;
use crate::utils::error::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }
}

impl Storage for LocalStorage {
    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.resolve(path))?)
    }

    fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.resolve(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(full_path, data)?;
        Ok(())
    }
}

/// Replaces every character of `unsafe_chars` (and control characters) with `placeholder`.
pub fn replace_unsafe_chars(name: &str, unsafe_chars: &str, placeholder: &str) -> String {
    name.chars()
        .map(|c| {
            if unsafe_chars.contains(c) || c.is_control() {
                placeholder.to_string()
            } else {
                c.to_string()
            }
        })
        .collect()
}

pub const FILENAME_UNSAFE_CHARS: &str = "<>:\"/\\|?*";

/// Last path component of an uploaded name, made safe to create in the workspace.
pub fn sanitize_upload_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    let cleaned = replace_unsafe_chars(base, FILENAME_UNSAFE_CHARS, "_");
    match cleaned.trim_start_matches('.') {
        "" => "upload".to_string(),
        rest => rest.to_string(),
    }
}

/// Per-batch scratch directory, deleted when dropped.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("inspection-renamer-")
            .tempdir()?;
        tracing::debug!("Workspace created at {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes an upload into `subdir` of the workspace under its sanitized name.
    pub fn stage(&self, subdir: &str, upload: &Upload) -> Result<PathBuf> {
        let dir = self.dir.path().join(subdir);
        fs::create_dir_all(&dir)?;
        let path = dir.join(sanitize_upload_name(&upload.file_name));
        fs::write(&path, &upload.bytes)?;
        Ok(path)
    }

    /// Deletes the workspace now and reports any error instead of ignoring it.
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        tracing::debug!("Workspace {} removed", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_storage_round_trip_creates_parents() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());

        storage.write_file("nested/out.txt", b"hello").unwrap();
        assert_eq!(storage.read_file("nested/out.txt").unwrap(), b"hello");
        assert!(storage.read_file("missing.txt").is_err());
    }

    #[test]
    fn test_upload_names_are_sanitized() {
        assert_eq!(sanitize_upload_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_upload_name("C:\\scans\\車検証 01.pdf"), "車検証 01.pdf");
        assert_eq!(sanitize_upload_name("a<b>c?.pdf"), "a_b_c_.pdf");
        assert_eq!(sanitize_upload_name(".."), "upload");
        assert_eq!(sanitize_upload_name(""), "upload");
    }

    #[test]
    fn test_workspace_is_removed_on_drop() {
        let path = {
            let workspace = Workspace::new().unwrap();
            let staged = workspace
                .stage("incoming", &Upload::new("../doc.pdf", b"%PDF".to_vec()))
                .unwrap();
            assert!(staged.exists());
            assert_eq!(staged, workspace.path().join("incoming").join("doc.pdf"));
            workspace.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_workspace_close() {
        let workspace = Workspace::new().unwrap();
        let path = workspace.path().to_path_buf();
        workspace.close().unwrap();
        assert!(!path.exists());
    }
}
