use std::fmt;

use serde::{Deserialize, Serialize};

const RESOLVER_PREFIXES: [&str; 4] = [
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
];

/// A normalized DOI: trimmed, lowercase, without a resolver prefix.
///
/// Two spellings of the same DOI normalize to the same value, so this is
/// the only key used to match external works against library documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Doi(String);

impl Doi {
    /// Normalize a raw DOI field or resolver URL. Blank input yields `None`.
    pub fn normalize(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        let stripped = strip_resolver_prefix(trimmed);
        let normalized = stripped.trim().to_lowercase();
        if normalized.is_empty() {
            None
        } else {
            Some(Self(normalized))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn url(&self) -> String {
        format!("https://doi.org/{}", self.0)
    }
}

/// Convenience over [`Doi::normalize`] for optional document fields.
pub fn normalize_doi(input: Option<&str>) -> Option<Doi> {
    input.and_then(Doi::normalize)
}

/// Strips resolver prefixes until none is left, so nested resolver URLs
/// normalize in one pass.
fn strip_resolver_prefix(mut input: &str) -> &str {
    'outer: loop {
        for prefix in RESOLVER_PREFIXES {
            if input.len() >= prefix.len()
                && input.is_char_boundary(prefix.len())
                && input[..prefix.len()].eq_ignore_ascii_case(prefix)
            {
                input = input[prefix.len()..].trim_start();
                continue 'outer;
            }
        }
        return input;
    }
}

impl fmt::Display for Doi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl AsRef<str> for Doi {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
