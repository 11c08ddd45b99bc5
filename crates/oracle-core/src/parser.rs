//! Corpus Parser
//!
//! Walks the knowledge root (`ψ/memory/{resonance,learnings,retrospectives}`)
//! and splits markdown into granular, addressable chunks. Chunk boundaries
//! determine ID stability: the same file content always yields the same ids.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::document::{DocType, ParsedDocument};
use crate::error::Result;

/// Seed vocabulary for concept extraction. Intentionally small and editable;
/// matching is lowercase substring, so it is deterministic.
pub const CONCEPT_VOCABULARY: &[&str] = &[
    "trust", "pattern", "mirror", "append", "history", "context", "delete",
    "behavior", "intention", "decision", "human", "external", "brain",
    "command", "oracle", "timestamp", "immutable", "preserve",
];

/// Minimum retro section body length; shorter sections are noise.
const MIN_RETRO_BODY: usize = 50;

/// Extract concept tags from combined title+body text.
pub fn extract_concepts(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    CONCEPT_VOCABULARY
        .iter()
        .filter(|c| lower.contains(**c))
        .map(|c| c.to_string())
        .collect()
}

/// Parser over a knowledge root directory.
pub struct Parser {
    memory_root: PathBuf,
}

/// One markdown section produced by a heading split.
struct Section {
    heading: String,
    body: String,
}

impl Parser {
    /// `memory_root` is the directory containing the three subtrees.
    pub fn new(memory_root: impl Into<PathBuf>) -> Self {
        Self {
            memory_root: memory_root.into(),
        }
    }

    /// Parse the three subtrees in order: resonance, learnings,
    /// retrospectives. Missing subtrees contribute nothing.
    pub fn parse_corpus(&self) -> Result<Vec<ParsedDocument>> {
        let mut docs = Vec::new();

        for path in Self::markdown_files(&self.memory_root.join("resonance"), false) {
            docs.extend(self.parse_resonance_file(&path)?);
        }
        for path in Self::markdown_files(&self.memory_root.join("learnings"), false) {
            docs.extend(self.parse_learning_file(&path)?);
        }
        for path in Self::markdown_files(&self.memory_root.join("retrospectives"), true) {
            docs.extend(self.parse_retro_file(&path)?);
        }

        Ok(docs)
    }

    /// Sorted markdown files under `dir`, optionally recursive.
    fn markdown_files(dir: &Path, recursive: bool) -> Vec<PathBuf> {
        if !dir.is_dir() {
            return Vec::new();
        }
        let max_depth = if recursive { usize::MAX } else { 1 };
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().map(|x| x == "md").unwrap_or(false))
            .map(|e| e.into_path())
            .collect();
        files.sort();
        files
    }

    fn file_stem(path: &Path) -> String {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Path relative to the memory root, for provenance.
    fn relative_source(&self, path: &Path) -> String {
        path.strip_prefix(&self.memory_root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }

    /// Split `text` into sections at lines starting with `marker`
    /// (e.g. `"### "`). Text before the first marker is discarded.
    fn split_sections(text: &str, marker: &str) -> Vec<Section> {
        let mut sections: Vec<Section> = Vec::new();
        for line in text.lines() {
            if let Some(heading) = line.strip_prefix(marker) {
                sections.push(Section {
                    heading: heading.trim().to_string(),
                    body: String::new(),
                });
            } else if let Some(current) = sections.last_mut() {
                current.body.push_str(line);
                current.body.push('\n');
            }
        }
        for s in &mut sections {
            s.body = s.body.trim().to_string();
        }
        sections
    }

    /// Strip a leading front-matter block, returning (front_matter, body).
    fn split_front_matter(text: &str) -> (Option<&str>, &str) {
        let Some(rest) = text.strip_prefix("---\n") else {
            return (None, text);
        };
        match rest.find("\n---") {
            Some(end) => {
                let fm = &rest[..end];
                let body = rest[end + 4..].trim_start_matches('\n');
                (Some(fm), body)
            }
            None => (None, text),
        }
    }

    /// `title:` value from a front-matter block.
    fn front_matter_title(fm: &str) -> Option<String> {
        fm.lines()
            .find_map(|l| l.strip_prefix("title:"))
            .map(|v| v.trim().trim_matches('"').to_string())
            .filter(|v| !v.is_empty())
    }

    /// Resonance: one principle per `### ` section, plus one sub-document
    /// per top-level bullet line — the granular split that lets retrieval
    /// return a specific bullet instead of the whole principle.
    fn parse_resonance_file(&self, path: &Path) -> Result<Vec<ParsedDocument>> {
        let text = std::fs::read_to_string(path)?;
        let stem = Self::file_stem(path);
        let source = self.relative_source(path);

        let mut docs = Vec::new();
        for (index, section) in Self::split_sections(&text, "### ").iter().enumerate() {
            if section.body.is_empty() {
                continue;
            }
            let id = format!("resonance_{}_{}", stem, index);
            let content = format!("{}: {}", section.heading, section.body);
            docs.push(ParsedDocument {
                id: id.clone(),
                doc_type: DocType::Principle,
                title: section.heading.clone(),
                concepts: extract_concepts(&content),
                content,
                source_file: source.clone(),
            });

            let mut bullet_index = 0;
            for line in section.body.lines() {
                let trimmed = line.trim_start();
                if trimmed.len() == line.len() {
                    // top-level bullets only (no leading indentation)
                    if let Some(bullet) = trimmed
                        .strip_prefix("- ")
                        .or_else(|| trimmed.strip_prefix("* "))
                    {
                        let bullet = bullet.trim();
                        if bullet.is_empty() {
                            continue;
                        }
                        docs.push(ParsedDocument {
                            id: format!("{}_sub_{}", id, bullet_index),
                            doc_type: DocType::Principle,
                            title: section.heading.clone(),
                            content: bullet.to_string(),
                            concepts: extract_concepts(bullet),
                            source_file: source.clone(),
                        });
                        bullet_index += 1;
                    }
                }
            }
        }
        Ok(docs)
    }

    /// Learnings: one document per `## ` section, or the whole file when no
    /// sections exist. The front-matter title (else the filename stem)
    /// prefixes every chunk.
    fn parse_learning_file(&self, path: &Path) -> Result<Vec<ParsedDocument>> {
        let text = std::fs::read_to_string(path)?;
        let stem = Self::file_stem(path);
        let source = self.relative_source(path);

        let (fm, body) = Self::split_front_matter(&text);
        let prefix = fm
            .and_then(Self::front_matter_title)
            .unwrap_or_else(|| stem.clone());

        let sections = Self::split_sections(body, "## ");
        let mut docs = Vec::new();

        if sections.is_empty() {
            let content = body.trim();
            if !content.is_empty() {
                docs.push(ParsedDocument {
                    id: format!("learning_{}", stem),
                    doc_type: DocType::Learning,
                    title: prefix.clone(),
                    content: content.to_string(),
                    concepts: extract_concepts(&format!("{} {}", prefix, content)),
                    source_file: source,
                });
            }
            return Ok(docs);
        }

        for (index, section) in sections.iter().enumerate() {
            if section.body.is_empty() {
                continue;
            }
            let content = format!("{} - {}: {}", prefix, section.heading, section.body);
            docs.push(ParsedDocument {
                id: format!("learning_{}_{}", stem, index),
                doc_type: DocType::Learning,
                title: format!("{}: {}", prefix, section.heading),
                concepts: extract_concepts(&content),
                content,
                source_file: source.clone(),
            });
        }
        Ok(docs)
    }

    /// Retrospectives: recursive walk, `## ` split, sections with fewer
    /// than 50 characters of body are skipped.
    fn parse_retro_file(&self, path: &Path) -> Result<Vec<ParsedDocument>> {
        let text = std::fs::read_to_string(path)?;
        let stem = Self::file_stem(path);
        let source = self.relative_source(path);

        let mut docs = Vec::new();
        for (index, section) in Self::split_sections(&text, "## ").iter().enumerate() {
            if section.body.len() < MIN_RETRO_BODY {
                continue;
            }
            let content = format!("{}: {}", section.heading, section.body);
            docs.push(ParsedDocument {
                id: format!("retro_{}_{}", stem, index),
                doc_type: DocType::Retro,
                title: section.heading.clone(),
                concepts: extract_concepts(&content),
                content,
                source_file: source.clone(),
            });
        }
        Ok(docs)
    }
}

// ============================================================================
// TESTS
// ============================================================================
