use std::fmt;

use serde::{Deserialize, Serialize};

// ─── Identifiers ────────────────────────────────────────────

/// Opaque numeric identifier assigned by the library store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for DocumentId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Identifier of a library inside the store (the user library is `1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LibraryId(pub u32);

impl Default for LibraryId {
    fn default() -> Self {
        Self(1)
    }
}

impl fmt::Display for LibraryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── Document ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    #[default]
    Regular,
    Attachment,
    Note,
}

/// A record in the reference library.
///
/// Only `doi` and `related` are ever mutated by relation linking; everything
/// else is owned by whoever created the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,

    /// Stable external-facing key, used in `related` lists.
    pub key: String,

    #[serde(default)]
    pub kind: ItemKind,

    #[serde(default)]
    pub title: String,

    /// Raw DOI field as entered; may be a resolver URL or blank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,

    /// Keys of related documents, in insertion order, without duplicates.
    #[serde(default)]
    pub related: Vec<String>,
}

impl Document {
    pub fn new(id: impl Into<DocumentId>, key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            kind: ItemKind::Regular,
            title: title.into(),
            doi: None,
            related: Vec::new(),
        }
    }

    pub fn with_doi(mut self, doi: impl Into<String>) -> Self {
        self.doi = Some(doi.into());
        self
    }

    pub fn with_kind(mut self, kind: ItemKind) -> Self {
        self.kind = kind;
        self
    }

    /// Attachments and notes are never linked.
    pub fn is_regular(&self) -> bool {
        self.kind == ItemKind::Regular
    }

    /// Field access by name, the way the host library exposes metadata.
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "DOI" | "doi" => self.doi.as_deref(),
            "title" => Some(self.title.as_str()),
            "key" => Some(self.key.as_str()),
            _ => None,
        }
    }

    pub fn is_related_to(&self, key: &str) -> bool {
        self.related.iter().any(|k| k == key)
    }

    /// Record `other` as related. Returns `false` when the link already
    /// existed or `other` is this document.
    pub fn add_related(&mut self, other: &Document) -> bool {
        if other.id == self.id || other.key == self.key || self.is_related_to(&other.key) {
            return false;
        }
        self.related.push(other.key.clone());
        true
    }

    /// Merge related keys known elsewhere into this copy, keeping order.
    pub fn merge_related(&mut self, keys: &[String]) {
        for key in keys {
            if *key != self.key && !self.is_related_to(key) {
                self.related.push(key.clone());
            }
        }
    }

    /// Title shortened for log lines.
    pub fn short_title(&self, max_chars: usize) -> &str {
        match self.title.char_indices().nth(max_chars) {
            Some((idx, _)) => &self.title[..idx],
            None => &self.title,
        }
    }
}
