use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use super::StoreError;

/// Create `path` for writing, creating missing parent directories first.
pub(crate) fn create_output_file(path: impl AsRef<Path>) -> io::Result<File> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    File::create(path)
}

/// `path` with `suffix` appended to its file name (`results.csv` -> `results.csv.tmp`).
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Write through a sibling temporary file and rename it into place, so readers
/// never observe a half-written file.
pub(crate) fn write_atomically<F>(path: &Path, write: F) -> Result<(), StoreError>
where
    F: FnOnce(File) -> Result<(), StoreError>,
{
    let staging = with_suffix(path, ".tmp");
    let file = create_output_file(&staging).map_err(|source| StoreError::Io {
        path: staging.clone(),
        source,
    })?;
    if let Err(error) = write(file) {
        let _ = fs::remove_file(&staging);
        return Err(error);
    }
    fs::rename(&staging, path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}
