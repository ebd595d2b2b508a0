//! File system helpers shared by the credential store, the entity cache and
//! the run pipeline.
//!
//! Every durable write goes through [`write_atomic`]: the bytes land in a
//! temporary file in the destination directory, are flushed to disk, and the
//! temporary file is renamed over the destination. Readers see either the old
//! file or the new one, never a torn mix.

use sha2::{Digest, Sha256};
use std::{
    fs,
    io::{self, Read, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;

/// Try to read a file into a String
pub fn try_read_to_string(path: &Path) -> Option<String> {
    let mut f = fs::File::open(path).ok()?;
    let mut s = String::new();

    f.read_to_string(&mut s).ok()?;

    Some(s)
}

/// Read a file, mapping "not found" to `Ok(None)` and surfacing every other error.
pub fn read_if_exists(path: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn temp_file_beside(path: &Path) -> io::Result<NamedTempFile> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;
    tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(&parent)
}

fn write_synced(tmp: &mut NamedTempFile, contents: &[u8]) -> io::Result<()> {
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()
}

/// Atomically replace `path` with `contents` (temp file + fsync + rename).
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut tmp = temp_file_beside(path)?;
    write_synced(&mut tmp, contents)?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

/// Like [`write_atomic`] but fails with `AlreadyExists` instead of replacing.
pub fn write_atomic_new(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut tmp = temp_file_beside(path)?;
    write_synced(&mut tmp, contents)?;
    tmp.persist_noclobber(path).map_err(|err| err.error)?;
    Ok(())
}

/// Restrict a file to its owner (credential files).
#[cfg(unix)]
pub fn restrict_to_owner(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
pub fn restrict_to_owner(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Hex sha256 of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hex sha256 and size of a file on disk, streamed in chunks.
pub fn sha256_file(path: &Path) -> io::Result<(String, u64)> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    let mut size = 0u64;

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }

    Ok((hex::encode(hasher.finalize()), size))
}

/// Serialize JSON compactly or pretty-printed (with a trailing newline).
pub fn to_json_bytes<T: serde::Serialize>(value: &T, pretty: bool) -> serde_json::Result<Vec<u8>> {
    if pretty {
        let mut out = serde_json::to_vec_pretty(value)?;
        out.push(b'\n');
        Ok(out)
    } else {
        serde_json::to_vec(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_try_read_to_string_existing_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test.txt");

        fs::write(&file_path, "hello world").unwrap();

        let content = try_read_to_string(&file_path);
        assert_eq!(content, Some("hello world".to_string()));
    }

    #[test]
    fn test_try_read_to_string_nonexistent_file() {
        let dir = tempdir().unwrap();
        let content = try_read_to_string(&dir.path().join("nonexistent.txt"));
        assert_eq!(content, None);
    }

    #[test]
    fn test_read_if_exists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.json");
        assert_eq!(read_if_exists(&path).unwrap(), None);

        fs::write(&path, "{}").unwrap();
        assert_eq!(read_if_exists(&path).unwrap(), Some("{}".to_string()));
    }

    #[test]
    fn test_write_atomic_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("subdir").join("output.txt");

        write_atomic(&file_path, b"test content").unwrap();

        let content = fs::read_to_string(&file_path).unwrap();
        assert_eq!(content, "test content");
    }

    #[test]
    fn test_write_atomic_replaces_and_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("token.json");

        write_atomic(&file_path, b"old").unwrap();
        write_atomic(&file_path, b"new").unwrap();

        assert_eq!(fs::read_to_string(&file_path).unwrap(), "new");
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_write_atomic_new_refuses_to_clobber() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("manifest.json");

        write_atomic_new(&file_path, b"first").unwrap();
        let err = write_atomic_new(&file_path, b"second").unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "first");
    }

    #[test]
    fn test_sha256_file_matches_bytes() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("data.bin");
        fs::write(&file_path, b"abc").unwrap();

        let (digest, size) = sha256_file(&file_path).unwrap();
        assert_eq!(size, 3);
        assert_eq!(digest, sha256_hex(b"abc"));
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_to_json_bytes_pretty_and_compact() {
        let value = serde_json::json!({"a": 1});
        assert_eq!(to_json_bytes(&value, false).unwrap(), b"{\"a\":1}");

        let pretty = to_json_bytes(&value, true).unwrap();
        assert!(pretty.ends_with(b"\n"));
        assert!(String::from_utf8(pretty).unwrap().contains("\n  \"a\": 1"));
    }

    #[cfg(unix)]
    #[test]
    fn test_restrict_to_owner() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let file_path = dir.path().join("secret.json");
        fs::write(&file_path, "{}").unwrap();

        restrict_to_owner(&file_path).unwrap();
        let mode = fs::metadata(&file_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
