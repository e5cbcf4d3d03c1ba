//! Filesystem mutations for admin requests.
//!
//! Both operations are blocking and take no locks: concurrent writers to the
//! same path race at the filesystem level and the last writer wins.
//!
//! Uploads are streamed into a temporary file next to the target and renamed
//! over it once complete, so readers never observe a partially written file
//! and a failed upload leaves any previous version in place.

use crate::error::{AccessError, AccessResult};
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Create or overwrite `path` with `contents`, creating missing parents.
///
/// Returns the number of bytes written.
pub fn store_file(path: &Path, contents: &[u8]) -> AccessResult<u64> {
    store_from(path, contents)
}

/// Create or overwrite `path` with everything `reader` yields.
///
/// Returns the number of bytes written. If `reader` fails, nothing is left
/// behind at `path`.
pub fn store_from<R: Read>(path: &Path, mut reader: R) -> AccessResult<u64> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| AccessError::from_io(parent, e))?;

    let mut staged = NamedTempFile::new_in(parent).map_err(|e| AccessError::from_io(parent, e))?;
    let size = io::copy(&mut reader, &mut staged).map_err(|e| AccessError::from_io(path, e))?;
    staged.flush().map_err(|e| AccessError::from_io(path, e))?;
    staged
        .persist(path)
        .map_err(|e| AccessError::from_io(path, e.error))?;

    info!(path = %path.display(), size, "Successfully wrote file");
    Ok(size)
}

/// Remove the single file, symlink or empty directory at `path`.
///
/// Never recursive: a non-empty directory is left untouched and reported as
/// an I/O error.
pub fn remove_entry(path: &Path) -> AccessResult<()> {
    let metadata = fs::symlink_metadata(path).map_err(|e| AccessError::from_io(path, e))?;

    if metadata.is_dir() {
        debug!(path = %path.display(), "Removing directory");
        fs::remove_dir(path).map_err(|e| AccessError::from_io(path, e))?;
    } else {
        debug!(path = %path.display(), "Removing file");
        fs::remove_file(path).map_err(|e| AccessError::from_io(path, e))?;
    }

    info!(path = %path.display(), "Successfully deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reports/2024/q1.txt");

        let written = store_file(&path, b"hello").unwrap();

        assert_eq!(written, 5);
        assert_eq!(fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn test_store_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.txt");
        store_file(&path, b"a much longer first version").unwrap();
        store_file(&path, b"short").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"short");
    }

    #[test]
    fn test_store_empty_body() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty");
        assert_eq!(store_file(&path, b"").unwrap(), 0);
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_store_onto_directory_fails() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let err = store_file(&dir.path().join("sub"), b"x").unwrap_err();
        assert_eq!(err.status_code(), 500);
    }

    /// Yields some bytes, then fails.
    struct BrokenReader {
        sent: bool,
    }

    impl Read for BrokenReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.sent {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away"));
            }
            self.sent = true;
            buf[..4].copy_from_slice(b"part");
            Ok(4)
        }
    }

    #[test]
    fn test_store_from_reader_streams_large_input() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.bin");
        let size = 3 * 1024 * 1024 + 17;
        let reader = io::repeat(0xAB).take(size);

        assert_eq!(store_from(&path, reader).unwrap(), size);
        let written = fs::read(&path).unwrap();
        assert_eq!(written.len() as u64, size);
        assert!(written.iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_failed_upload_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upload.txt");

        let err = store_from(&path, BrokenReader { sent: false }).unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_failed_upload_keeps_previous_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.txt");
        store_file(&path, b"version one").unwrap();

        store_from(&path, BrokenReader { sent: false }).unwrap_err();
        assert_eq!(fs::read(&path).unwrap(), b"version one");
    }

    #[test]
    fn test_remove_file_then_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.txt");
        fs::write(&path, b"x").unwrap();

        remove_entry(&path).unwrap();
        assert!(!path.exists());

        let err = remove_entry(&path).unwrap_err();
        assert!(matches!(err, AccessError::NotFound { .. }));
    }

    #[test]
    fn test_remove_empty_directory() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("empty");
        fs::create_dir(&sub).unwrap();

        remove_entry(&sub).unwrap();
        assert!(!sub.exists());
    }

    #[test]
    fn test_remove_is_not_recursive() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("full");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("keep.txt"), b"x").unwrap();

        let err = remove_entry(&sub).unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert!(sub.join("keep.txt").exists());
    }
}
