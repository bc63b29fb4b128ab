use md5::{Digest, Md5};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};

/// Characters left intact in an on-disk item directory name. Everything
/// outside the URL-unreserved set is percent-encoded, which keeps the name
/// usable both as a single path component and as a URL path segment.
const ITEM_DIR_KEEP: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Deterministic directory name for an item id.
///
/// Percent-encodes the id; ids that encode to nothing usable (empty, or
/// dot-only names that would collide with `.`/`..`) fall back to the MD5
/// hex of the raw id.
pub fn item_dir_name(item_id: &str) -> String {
    let encoded = percent_encoding::utf8_percent_encode(item_id, ITEM_DIR_KEEP).to_string();

    if encoded.is_empty() || encoded.chars().all(|c| c == '.') {
        let digest = Md5::digest(item_id.as_bytes());
        return hex::encode(digest);
    }

    encoded
}

/// Percent-encode one path segment for use in a URL.
///
/// Applied on top of [`item_dir_name`] when building playback URLs: the
/// server decodes the request path once, so the directory name (which may
/// itself contain `%`) needs another encoding round to survive it.
pub fn encode_path_segment(segment: &str) -> String {
    percent_encoding::utf8_percent_encode(segment, ITEM_DIR_KEEP).to_string()
}
