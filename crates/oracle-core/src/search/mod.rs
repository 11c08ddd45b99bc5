//! Search Module
//!
//! Hybrid retrieval primitives:
//! - FTS5 query sanitization
//! - Per-backend score normalization
//! - Query-aware weight selection
//! - Rank fusion (`fusion`)
//! - The retrieval engine (`engine`)

mod fusion;
mod engine;

pub use fusion::{fuse, FusedHit, MatchSource};
pub use engine::{Retrieval, SearchRequest, SearchResponse, SearchResult};

/// Search execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Hybrid,
    Fts,
    Vector,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Hybrid => "hybrid",
            SearchMode::Fts => "fts",
            SearchMode::Vector => "vector",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hybrid" => Some(SearchMode::Hybrid),
            "fts" => Some(SearchMode::Fts),
            "vector" => Some(SearchMode::Vector),
            _ => None,
        }
    }
}

/// Characters FTS5 treats as query operators.
const FTS_OPERATORS: &[char] = &['?', '*', '+', '-', '(', ')', '^', '~', '"', '\'', ':', '.', '/'];

/// Replace FTS5 operator characters with spaces and collapse whitespace.
/// If stripping leaves nothing, the original string is returned unchanged
/// and the backend error is the caller's to surface.
pub fn sanitize_query(query: &str) -> String {
    let replaced: String = query
        .chars()
        .map(|c| if FTS_OPERATORS.contains(&c) { ' ' } else { c })
        .collect();
    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        query.to_string()
    } else {
        collapsed
    }
}

/// Normalize an FTS5 bm25 rank (negative, more negative = better) into
/// (0, 1] with exponential decay. Good separation in the top handful.
pub fn normalize_fts_rank(rank: f64) -> f64 {
    (-0.3 * rank.abs()).exp()
}

/// Fusion weights, tagged with the mode label they produce.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    pub fts: f64,
    pub vector: f64,
    /// Mode string reported when these weights are active in hybrid mode.
    pub label: &'static str,
}

/// Default 50/50 weights.
pub const DEFAULT_WEIGHTS: Weights = Weights {
    fts: 0.5,
    vector: 0.5,
    label: "hybrid",
};

/// Query-aware weighting: short exact-looking queries lean keyword,
/// long natural-language queries lean vector.
pub fn query_weights(query: &str) -> Weights {
    let tokens = query.split_whitespace().count();
    let has_quotes = query.contains('"');
    let has_boolean = query
        .split_whitespace()
        .any(|t| matches!(t, "AND" | "OR" | "NOT"));

    if tokens <= 2 && !has_quotes {
        Weights { fts: 0.7, vector: 0.3, label: "hybrid-short" }
    } else if has_quotes || has_boolean {
        Weights { fts: 0.75, vector: 0.25, label: "hybrid-exact" }
    } else if tokens > 5 {
        Weights { fts: 0.3, vector: 0.7, label: "hybrid-semantic" }
    } else {
        DEFAULT_WEIGHTS
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_cases() {
        assert_eq!(sanitize_query("claude.memory"), "claude memory");
        assert_eq!(sanitize_query("git/safety"), "git safety");
        assert_eq!(sanitize_query("time: 15:30"), "time 15 30");
        // Empty after strip: original returned unchanged
        assert_eq!(sanitize_query("???"), "???");
    }

    #[test]
    fn test_sanitize_idempotent() {
        for q in ["claude.memory", "git/safety", "time: 15:30", "???", "plain words", "  spaced   out  "] {
            let once = sanitize_query(q);
            assert_eq!(sanitize_query(&once), once, "not idempotent for {:?}", q);
        }
    }

    #[test]
    fn test_sanitize_collapses_whitespace() {
        assert_eq!(sanitize_query("a  .  b"), "a b");
    }

    #[test]
    fn test_normalize_bounds() {
        assert!(normalize_fts_rank(0.0) == 1.0);
        for r in [-0.5, -1.0, -3.0, -10.0] {
            let v = normalize_fts_rank(r);
            assert!(v > 0.0 && v <= 1.0);
        }
    }

    #[test]
    fn test_normalize_monotone_in_rank() {
        // For r1 < r2 <= 0: exp(-0.3|r1|) < exp(-0.3|r2|)
        let pairs = [(-4.0, -2.0), (-10.0, -0.1), (-2.5, 0.0)];
        for (r1, r2) in pairs {
            assert!(normalize_fts_rank(r1) < normalize_fts_rank(r2));
        }
    }

    #[test]
    fn test_query_weights_short() {
        let w = query_weights("git safety");
        assert_eq!(w.label, "hybrid-short");
        assert_eq!((w.fts, w.vector), (0.7, 0.3));
    }

    #[test]
    fn test_query_weights_exact() {
        assert_eq!(query_weights("\"force push\" rules").label, "hybrid-exact");
        assert_eq!(query_weights("git AND safety rules").label, "hybrid-exact");
        // lowercase booleans are ordinary words
        assert_eq!(query_weights("git and safety").label, "hybrid");
    }

    #[test]
    fn test_query_weights_semantic() {
        let w = query_weights("how should I think about destructive operations");
        assert_eq!(w.label, "hybrid-semantic");
        assert_eq!((w.fts, w.vector), (0.3, 0.7));
    }

    #[test]
    fn test_query_weights_default() {
        assert_eq!(query_weights("three plain words here").label, "hybrid");
    }
}
