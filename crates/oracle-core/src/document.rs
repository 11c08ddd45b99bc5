//! Document Model
//!
//! The indexed unit and its metadata. Content lives in the FTS table and in
//! the vector backend; the metadata row holds everything *about* the
//! document (split of truth).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four document types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Principle,
    Learning,
    Pattern,
    Retro,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Principle => "principle",
            DocType::Learning => "learning",
            DocType::Pattern => "pattern",
            DocType::Retro => "retro",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "principle" => Some(DocType::Principle),
            "learning" => Some(DocType::Learning),
            "pattern" => Some(DocType::Pattern),
            "retro" => Some(DocType::Retro),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a document originally came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Mother,
    Arthur,
    Volt,
    Human,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Mother => "mother",
            Origin::Arthur => "arthur",
            Origin::Volt => "volt",
            Origin::Human => "human",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mother" => Some(Origin::Mother),
            "arthur" => Some(Origin::Arthur),
            "volt" => Some(Origin::Volt),
            "human" => Some(Origin::Human),
            _ => None,
        }
    }
}

/// Metadata row for one document (content is not stored here)
#[derive(Debug, Clone, Serialize)]
pub struct DocumentMeta {
    pub id: String,
    pub doc_type: DocType,
    pub source_file: String,
    pub concepts: Vec<String>,
    pub project: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub indexed_at: DateTime<Utc>,
    pub superseded_by: Option<String>,
    pub superseded_at: Option<DateTime<Utc>>,
    pub superseded_reason: Option<String>,
    pub origin: Option<Origin>,
    pub created_by: Option<String>,
}

/// A document as produced by the parser: metadata plus content, ready for
/// both indices.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub id: String,
    pub doc_type: DocType,
    pub title: String,
    pub content: String,
    pub source_file: String,
    pub concepts: Vec<String>,
}

/// A project partition tag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub slug: String,
    pub name: String,
    pub color: String,
    pub description: Option<String>,
    /// Ghq-style repository path, e.g. `github.com/owner/repo`
    pub path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_type_roundtrip() {
        for t in [DocType::Principle, DocType::Learning, DocType::Pattern, DocType::Retro] {
            assert_eq!(DocType::parse(t.as_str()), Some(t));
        }
        assert_eq!(DocType::parse("bogus"), None);
    }

    #[test]
    fn test_origin_roundtrip() {
        for o in [Origin::Mother, Origin::Arthur, Origin::Volt, Origin::Human] {
            assert_eq!(Origin::parse(o.as_str()), Some(o));
        }
        assert_eq!(Origin::parse(""), None);
    }
}
