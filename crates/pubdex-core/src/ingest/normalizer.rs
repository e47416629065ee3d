use std::borrow::Cow;

use quick_xml::escape::{resolve_html5_entity, resolve_predefined_entity, unescape_with};

/// Longest entity reference we try to resolve, `&` and `;` included.
const MAX_REFERENCE_LEN: usize = 40;

/// Raw text pulled out of a document, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawText {
    Absent,
    Single(String),
    Fragments(Vec<String>),
}

impl From<Option<String>> for RawText {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Absent, Self::Single)
    }
}

impl From<String> for RawText {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<&str> for RawText {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<Vec<String>> for RawText {
    fn from(value: Vec<String>) -> Self {
        Self::Fragments(value)
    }
}

impl From<Vec<&str>> for RawText {
    fn from(value: Vec<&str>) -> Self {
        Self::Fragments(value.into_iter().map(String::from).collect())
    }
}

/// Turn raw text into the single decoded string that gets indexed.
///
/// Fragments are joined with a space, entity references are decoded once and
/// whitespace runs collapse to one space. Anything that ends up empty is
/// `None`, so callers never see `""`.
pub fn normalize(value: impl Into<RawText>) -> Option<String> {
    let joined = match value.into() {
        RawText::Absent => return None,
        RawText::Single(text) => text,
        RawText::Fragments(fragments) if fragments.is_empty() => return None,
        RawText::Fragments(fragments) => fragments.join(" "),
    };

    let decoded = decode_entities(&joined);
    let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Decode XML/HTML character references.
///
/// Unknown or malformed references are left as they are: `AT&T` and
/// `&bogus;` come back unchanged.
#[must_use]
pub fn decode_entities(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }

    match unescape_with(raw, resolve_entity) {
        Ok(decoded) => decoded,
        Err(_) => Cow::Owned(decode_leniently(raw)),
    }
}

fn resolve_entity(name: &str) -> Option<&'static str> {
    resolve_predefined_entity(name).or_else(|| resolve_html5_entity(name))
}

fn decode_leniently(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp..];

        let reference = candidate
            .find(';')
            .filter(|end| *end < MAX_REFERENCE_LEN)
            .map(|end| &candidate[..=end]);

        match reference.and_then(|r| unescape_with(r, resolve_entity).ok().map(|d| (r.len(), d))) {
            Some((consumed, decoded)) => {
                out.push_str(&decoded);
                rest = &candidate[consumed..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }

    out.push_str(rest);
    out
}
