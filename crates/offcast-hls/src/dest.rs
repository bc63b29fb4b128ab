//! Deterministic destination paths.
//!
//! The on-disk layout contract shared by the planner and the rewriter:
//! every fetched resource lands at `<type-dir>/<md5-hex(url)>.<ext>`,
//! where the hash covers the full absolute source URL (query included)
//! and the extension is taken from the URL path, query ignored. This
//! module only derives names; it does no I/O.

use md5::{Digest, Md5};
use offcast_core::TaskType;
use url::Url;

/// Lowercase MD5 hex of the absolute URL string.
pub fn md5_hex(url: &Url) -> String {
    hex::encode(Md5::digest(url.as_str().as_bytes()))
}

/// File extension of the URL's last path segment, query ignored.
pub fn file_extension(url: &Url) -> Option<&str> {
    let last = url.path().rsplit('/').next()?;
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext)
}

/// `<md5>.<ext>`, or bare `<md5>` when the URL has no extension.
pub fn dest_file_name(url: &Url) -> String {
    match file_extension(url) {
        Some(ext) => format!("{}.{ext}", md5_hex(url)),
        None => md5_hex(url),
    }
}

/// Destination path relative to the item root: `<type-dir>/<file-name>`.
pub fn destination_rel_path(task_type: TaskType, url: &Url) -> String {
    format!("{}/{}", task_type.dir_name(), dest_file_name(url))
}
