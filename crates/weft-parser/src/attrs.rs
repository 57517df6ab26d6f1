//! Tag matching and attribute extraction.
//!
//! These helpers work on the unconsumed input starting at a `<`. They never
//! look past what is available, and they report [`TagMatch::Partial`] when the
//! answer depends on bytes that have not arrived yet.

/// Result of matching a tag at the start of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMatch {
    /// The whole tag is present; the value is its length in bytes.
    Full(usize),
    /// The input is a prefix of a possible tag; more bytes are needed.
    Partial,
    /// The input cannot start this tag.
    NoMatch,
    /// The tag name matched but no `>` was found within the length limit.
    TooLong,
}

impl TagMatch {
    pub fn is_partial(&self) -> bool {
        matches!(self, TagMatch::Partial)
    }
}

/// Match an exact literal such as `</action>`.
pub fn match_literal(input: &str, literal: &str) -> TagMatch {
    if input.len() < literal.len() {
        if literal.starts_with(input) {
            TagMatch::Partial
        } else {
            TagMatch::NoMatch
        }
    } else if input.starts_with(literal) {
        TagMatch::Full(literal.len())
    } else {
        TagMatch::NoMatch
    }
}

/// Match an opening tag that begins with `open` (for example `<artifact`).
///
/// The name must be followed by whitespace, `>` or `/`, so `<artifactory>`
/// does not match. The tag ends at the first `>` outside a quoted value,
/// which must appear within `max_len` bytes.
pub fn match_open_tag(input: &str, open: &str, max_len: usize) -> TagMatch {
    match match_literal(input, open) {
        TagMatch::Full(_) => {}
        other => return other,
    }

    let bytes = input.as_bytes();
    match bytes.get(open.len()) {
        None => return TagMatch::Partial,
        Some(b) if b.is_ascii_whitespace() || *b == b'>' || *b == b'/' => {}
        Some(_) => return TagMatch::NoMatch,
    }

    let window = bytes.len().min(max_len);
    let mut quote: Option<u8> = None;
    for (idx, &b) in bytes.iter().enumerate().take(window).skip(open.len()) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return TagMatch::Full(idx + 1),
            None => {}
        }
    }

    if bytes.len() >= max_len {
        TagMatch::TooLong
    } else {
        TagMatch::Partial
    }
}

/// Length of the longest proper prefix of `pattern` that `input` ends with.
pub fn partial_suffix_len(input: &str, pattern: &str) -> usize {
    let max = (pattern.len() - 1).min(input.len());
    (1..=max)
        .rev()
        .find(|&k| input.ends_with(&pattern[..k]))
        .unwrap_or(0)
}

/// Attributes of a complete opening tag, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    pairs: Vec<(String, String)>,
}

impl Attributes {
    /// Parse the attributes of a complete opening tag such as
    /// `<action type="file" filePath='a.txt'>`.
    ///
    /// Values may be double-quoted, single-quoted or bare. A value cannot
    /// contain its own delimiter.
    pub fn parse(tag: &str) -> Self {
        let body = tag.strip_prefix('<').unwrap_or(tag);
        let body = body.strip_suffix('>').unwrap_or(body);
        let body = body.trim_end().trim_end_matches('/');

        // skip the tag name
        let start = body
            .find(|c: char| c.is_whitespace())
            .unwrap_or(body.len());
        let mut rest = &body[start..];
        let mut pairs = Vec::new();

        loop {
            rest = rest.trim_start();
            if rest.is_empty() {
                break;
            }

            let name_end = rest
                .find(|c: char| c.is_whitespace() || c == '=')
                .unwrap_or(rest.len());
            let name = &rest[..name_end];
            rest = rest[name_end..].trim_start();

            let Some(after_eq) = rest.strip_prefix('=') else {
                // valueless attribute; the name is never empty here
                pairs.push((name.to_string(), String::new()));
                continue;
            };
            rest = after_eq.trim_start();

            let value = match rest.chars().next() {
                Some(q @ ('"' | '\'')) => {
                    let inner = &rest[1..];
                    let end = inner.find(q).unwrap_or(inner.len());
                    rest = inner.get(end + 1..).unwrap_or("");
                    &inner[..end]
                }
                _ => {
                    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                    let value = &rest[..end];
                    rest = &rest[end..];
                    value
                }
            };

            if !name.is_empty() {
                pairs.push((name.to_string(), value.to_string()));
            }
        }

        Self { pairs }
    }

    /// Value of the first attribute called `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Value of `name`, ignoring empty values.
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
