//! Filesystem helpers shared by the mutation engine, rollback store and cache
//!
//! - `normalize_path`: strips the Windows `\\?\` prefix from canonicalized paths
//! - `atomic_rename` / `write_atomic`: temp-file-then-rename writes
//! - `relative_path`: forward-slash project-relative display paths
//! - `fnv1a_hash`: stable content/key hashing for cache entries

use std::io;
use std::path::{Component, Path, PathBuf};

// FNV-1a constants for 64-bit hash
const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Compute a stable FNV-1a hash over raw bytes
pub fn fnv1a_hash(data: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in data {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// FNV-1a hash rendered as 16 hex digits
pub fn fnv1a_hex(data: &[u8]) -> String {
    format!("{:016x}", fnv1a_hash(data))
}

/// Normalize Windows paths by removing the `\\?\` prefix if present.
///
/// No-op on Unix.
pub fn normalize_path(path: &Path) -> PathBuf {
    #[cfg(windows)]
    {
        let s = path.to_string_lossy();
        if let Some(stripped) = s.strip_prefix(r"\\?\UNC\") {
            return PathBuf::from(format!(r"\\{}", stripped));
        }
        if let Some(stripped) = s.strip_prefix(r"\\?\") {
            return PathBuf::from(stripped);
        }
    }
    path.to_path_buf()
}

/// Canonicalize when possible, otherwise return the path unchanged
pub fn canonical_or_self(path: &Path) -> PathBuf {
    path.canonicalize()
        .map(|p| normalize_path(&p))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Cross-platform atomic rename (Windows needs the target removed first)
async fn atomic_rename(src: &Path, dst: &Path) -> io::Result<()> {
    #[cfg(windows)]
    {
        if tokio::fs::try_exists(dst).await.unwrap_or(false) {
            tokio::fs::remove_file(dst).await?;
        }
    }
    tokio::fs::rename(src, dst).await
}

/// Write `contents` next to `path` and rename it into place.
///
/// The temp file name carries `tag` so concurrent writers never share it.
pub async fn write_atomic(path: &Path, contents: &[u8], tag: &str) -> io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, tag));

    tokio::fs::write(&tmp, contents).await?;
    if let Err(e) = atomic_rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

/// Project-relative path with forward slashes (falls back to the full path)
pub fn relative_path(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// True when the path contains no `..` component
pub fn is_contained(path: &Path) -> bool {
    !path.components().any(|c| matches!(c, Component::ParentDir))
}

/// Closest ancestor (inclusive) that exists on disk
pub async fn nearest_existing_ancestor(path: &Path) -> Option<PathBuf> {
    for candidate in path.ancestors() {
        if tokio::fs::try_exists(candidate).await.unwrap_or(false) {
            return Some(candidate.to_path_buf());
        }
    }
    None
}

/// Check that a directory exists and a file can be created in it
pub fn is_writable_dir(dir: &Path) -> bool {
    if !dir.is_dir() {
        return false;
    }
    let probe = dir.join(format!(".write-probe-{}", std::process::id()));
    match std::fs::write(&probe, b"ok") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_path_preserves_regular_paths() {
        let unix_path = PathBuf::from("/home/user/repo");
        assert_eq!(normalize_path(&unix_path), unix_path);
    }

    #[test]
    fn test_fnv1a_is_stable() {
        assert_eq!(fnv1a_hash(b"context"), fnv1a_hash(b"context"));
        assert_ne!(fnv1a_hash(b"context"), fnv1a_hash(b"contexts"));
        assert_eq!(fnv1a_hex(b"").len(), 16);
    }

    #[test]
    fn test_relative_path_uses_forward_slashes() {
        let root = Path::new("/repo");
        let path = Path::new("/repo/Analysis/Fractal/X.cs");
        assert_eq!(relative_path(path, root), "Analysis/Fractal/X.cs");
    }

    #[test]
    fn test_is_contained_rejects_parent_dir() {
        assert!(is_contained(Path::new("/repo/a/b.txt")));
        assert!(!is_contained(Path::new("/repo/../etc/passwd")));
    }

    #[tokio::test]
    async fn test_nearest_existing_ancestor() {
        let dir = TempDir::new().unwrap();
        let deep = dir.path().join("a").join("b").join("c.txt");
        assert_eq!(nearest_existing_ancestor(&deep).await.unwrap(), dir.path());
    }

    #[tokio::test]
    async fn test_write_atomic_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("existing.txt");
        std::fs::write(&dst, "old content").unwrap();

        write_atomic(&dst, b"new content", "t1").await.unwrap();

        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "new content");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1, "temp file should be renamed away");
    }

    #[test]
    fn test_is_writable_dir() {
        let dir = TempDir::new().unwrap();
        assert!(is_writable_dir(dir.path()));
        assert!(!is_writable_dir(&dir.path().join("missing")));
    }
}
