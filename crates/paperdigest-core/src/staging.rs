//! Local scratch copies of downloaded documents.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::CoreError;

/// A document written to a randomly named file in the scratch directory.
///
/// Call [`remove`](StagedFile::remove) once the upload step is over. If the
/// value is dropped first, the file is still removed, but errors are lost.
#[derive(Debug)]
pub struct StagedFile {
    file: NamedTempFile,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Delete the staged file, reporting failure.
    pub fn remove(self) -> Result<(), CoreError> {
        let path = self.file.path().to_path_buf();
        self.file
            .close()
            .map_err(|source| CoreError::Staging { path: path.clone(), source })?;
        log::debug!("removed staged file {}", path.display());
        Ok(())
    }
}

/// Write `bytes` to a fresh `<random>.pdf` file under `scratch_dir`.
pub fn stage(bytes: &[u8], scratch_dir: &Path) -> Result<StagedFile, CoreError> {
    let wrap = |path: PathBuf| move |source: std::io::Error| CoreError::Staging { path, source };

    std::fs::create_dir_all(scratch_dir).map_err(wrap(scratch_dir.to_path_buf()))?;

    let mut file = tempfile::Builder::new()
        .prefix("paper-")
        .suffix(".pdf")
        .rand_bytes(16)
        .tempfile_in(scratch_dir)
        .map_err(wrap(scratch_dir.to_path_buf()))?;

    let path = file.path().to_path_buf();
    file.write_all(bytes)
        .and_then(|_| file.flush())
        .map_err(wrap(path))?;

    log::info!("staged {} bytes at {}", bytes.len(), file.path().display());
    Ok(StagedFile { file })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_writes_bytes_and_remove_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let staged = stage(b"%PDF-1.7 test", dir.path()).unwrap();
        let path = staged.path().to_path_buf();

        assert_eq!(path.parent().unwrap(), dir.path());
        assert_eq!(path.extension().unwrap(), "pdf");
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.7 test");

        staged.remove().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn stage_creates_missing_scratch_dir() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("pdfs");
        let staged = stage(b"x", &scratch).unwrap();
        assert!(scratch.is_dir());
        staged.remove().unwrap();
    }

    #[test]
    fn staged_names_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let a = stage(b"a", dir.path()).unwrap();
        let b = stage(b"b", dir.path()).unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn dropping_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let staged = stage(b"x", dir.path()).unwrap();
            staged.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
