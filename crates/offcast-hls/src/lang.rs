//! IETF language tag canonicalization.
//!
//! Only the case conventions of BCP-47 matter for matching: primary
//! language lowercase, four-letter script subtags titlecase, two-letter
//! region subtags uppercase, everything else lowercase. `en-us`, `EN-US`
//! and `en-US` all canonicalize to `en-US`.

/// Canonicalize a language tag's case per BCP-47 conventions.
pub fn canonical_tag(tag: &str) -> String {
    let mut out = String::with_capacity(tag.len());

    for (index, subtag) in tag.split('-').enumerate() {
        if index > 0 {
            out.push('-');
        }

        if index == 0 {
            out.extend(subtag.chars().flat_map(char::to_lowercase));
        } else if subtag.len() == 4 && subtag.chars().all(|c| c.is_ascii_alphabetic()) {
            let mut chars = subtag.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
            }
            out.extend(chars.flat_map(char::to_lowercase));
        } else if subtag.len() == 2 && subtag.chars().all(|c| c.is_ascii_alphabetic()) {
            out.extend(subtag.chars().flat_map(char::to_uppercase));
        } else {
            out.extend(subtag.chars().flat_map(char::to_lowercase));
        }
    }

    out
}

/// Case-insensitive tag equality after canonicalization.
pub fn tags_match(a: &str, b: &str) -> bool {
    canonical_tag(a) == canonical_tag(b)
}
