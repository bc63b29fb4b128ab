use std::path::{Path, PathBuf};

use crate::error::StoreResult;

/// Whole-object read. A missing file reads as empty, which callers treat as
/// an empty record set.
pub(crate) async fn read_all(path: &Path) -> StoreResult<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Whole-object write via temp file + rename. Rename gives atomicity, not
/// fsync durability; a crash yields either the old object or the new one.
pub(crate) async fn write_all(path: &Path, data: &[u8]) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = tmp_path_for(path);
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn tmp_path_for(final_path: &Path) -> PathBuf {
    // Deterministic temp name; writers are serialized by the store lock.
    let mut path = final_path.to_path_buf();
    let mut name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_owned());
    name.push_str(".tmp");
    path.set_file_name(name);
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = read_all(&dir.path().join("absent.json")).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/data.json");

        write_all(&path, b"{\"v\":1}").await.unwrap();
        assert_eq!(read_all(&path).await.unwrap(), b"{\"v\":1}");

        // Overwrite replaces the whole object.
        write_all(&path, b"{\"v\":2}").await.unwrap();
        assert_eq!(read_all(&path).await.unwrap(), b"{\"v\":2}");

        // No temp file left behind.
        assert!(!path.with_file_name("data.json.tmp").exists());
    }
}
