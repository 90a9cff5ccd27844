//! References embedded inside free text: formula tokens and condition sets.
//!
//! Expression payloads point at other records through prefixed identifiers
//! such as `@value.<id>` or `node-formula:<id>`. Only the identifier part is
//! ever rewritten, and only when the lookup yields a replacement.

/// Prefixes that introduce an embedded identity. Longer prefixes come first so
/// that `node-condition:` wins over `condition:` at the same position.
pub const EMBEDDED_PREFIXES: [&str; 9] = [
    "node-condition:",
    "node-formula:",
    "node-table:",
    "@calculated.",
    "condition:",
    "formula:",
    "@value.",
    "@table.",
    "table:",
];

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// One embedded identity found in a piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddedRef<'t> {
    pub prefix: &'static str,
    pub id: &'t str,
    /// Byte range of `id` inside the scanned text.
    pub start: usize,
    pub end: usize,
}

/// Finds every embedded identity in `text`, left to right.
///
/// A prefix only counts when it is not glued to a preceding identifier
/// character, so `myformula:x` is not a reference.
pub fn scan(text: &str) -> Vec<EmbeddedRef<'_>> {
    let mut found = Vec::new();
    let mut pos = 0;
    while pos < text.len() {
        let rest = &text[pos..];
        let boundary = text[..pos].chars().next_back().is_none_or(|c| !is_id_char(c));
        let matched = if boundary {
            EMBEDDED_PREFIXES.iter().find(|p| rest.starts_with(**p))
        } else {
            None
        };

        match matched {
            Some(prefix) => {
                let start = pos + prefix.len();
                let len = text[start..]
                    .char_indices()
                    .find(|(_, c)| !is_id_char(*c))
                    .map(|(i, _)| i)
                    .unwrap_or(text.len() - start);
                if len > 0 {
                    found.push(EmbeddedRef {
                        prefix,
                        id: &text[start..start + len],
                        start,
                        end: start + len,
                    });
                }
                pos = start + len;
            }
            None => {
                pos += rest.chars().next().map(char::len_utf8).unwrap_or(1);
            }
        }
    }
    found
}

/// Rewrites every embedded identity for which `lookup` returns a replacement.
///
/// Returns `None` when nothing changed, so callers can keep the original
/// string byte for byte.
pub fn rewrite<'m, F>(text: &str, mut lookup: F) -> Option<String>
where
    F: FnMut(&str) -> Option<&'m str>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut changed = false;
    for reference in scan(text) {
        if let Some(replacement) = lookup(reference.id) {
            out.push_str(&text[last..reference.start]);
            out.push_str(replacement);
            last = reference.end;
            changed = true;
        }
    }
    if !changed {
        return None;
    }
    out.push_str(&text[last..]);
    Some(out)
}
