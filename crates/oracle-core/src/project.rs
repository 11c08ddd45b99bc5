//! Project Resolution
//!
//! Projects partition documents and telemetry. A search caller may pass a
//! project explicitly (including explicit empty for "universal only") or a
//! `cwd` from which the project is detected by walking up to the nearest
//! `.git`/`ψ` root and matching it against the registered projects.

use std::path::{Path, PathBuf};

use crate::config::PSI_DIR;
use crate::document::Project;
use crate::error::Result;
use crate::store::{ProjectScope, Store};

/// Walk up from `cwd` until a directory containing `.git` or `ψ/` is found.
pub fn detect_project_root(cwd: &Path) -> Option<PathBuf> {
    let mut dir = Some(cwd);
    while let Some(d) = dir {
        if d.join(".git").exists() || d.join(PSI_DIR).is_dir() {
            return Some(d.to_path_buf());
        }
        dir = d.parent();
    }
    None
}

/// Map a detected project root onto a registered project slug: a project
/// whose ghq-style `path` ends with the root's trailing components wins,
/// else a project whose slug equals the root directory name.
pub fn match_project(projects: &[Project], root: &Path) -> Option<String> {
    let dir_name = root.file_name()?.to_string_lossy().into_owned();

    let suffix: Vec<String> = root
        .components()
        .rev()
        .take(2)
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let suffix = suffix.join("/");

    projects
        .iter()
        .find(|p| {
            p.path
                .as_deref()
                .map(|path| path.ends_with(&suffix) || path.ends_with(&dir_name))
                .unwrap_or(false)
        })
        .or_else(|| projects.iter().find(|p| p.slug == dir_name))
        .map(|p| p.slug.clone())
}

/// Resolve the project scope for a retrieval call.
///
/// - `explicit = Some(Some(p))` — use project `p`.
/// - `explicit = Some(None)` — explicit empty: universal rows only.
/// - `explicit = None` with a `cwd` — detect; no match means no filter.
/// - neither — no filter.
pub fn resolve_scope(
    store: &Store,
    explicit: Option<Option<String>>,
    cwd: Option<&Path>,
) -> Result<ProjectScope> {
    if let Some(explicit) = explicit {
        return Ok(match explicit {
            Some(p) if !p.is_empty() => ProjectScope::Project(p),
            _ => ProjectScope::UniversalOnly,
        });
    }

    if let Some(cwd) = cwd {
        if let Some(root) = detect_project_root(cwd) {
            let projects = store.list_projects()?;
            if let Some(slug) = match_project(&projects, &root) {
                return Ok(ProjectScope::Project(slug));
            }
        }
    }

    Ok(ProjectScope::Any)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::temp_store;
    use tempfile::TempDir;

    fn project(slug: &str, path: Option<&str>) -> Project {
        Project {
            slug: slug.to_string(),
            name: slug.to_string(),
            color: "#888888".to_string(),
            description: None,
            path: path.map(String::from),
        }
    }

    #[test]
    fn test_detect_project_root_git() {
        let tmp = TempDir::new().unwrap();
        let repo = tmp.path().join("alpha");
        std::fs::create_dir_all(repo.join(".git")).unwrap();
        let nested = repo.join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(detect_project_root(&nested), Some(repo));
    }

    #[test]
    fn test_detect_project_root_psi() {
        let tmp = TempDir::new().unwrap();
        let repo = tmp.path().join("beta");
        std::fs::create_dir_all(repo.join(PSI_DIR)).unwrap();

        assert_eq!(detect_project_root(&repo), Some(repo.clone()));
    }

    #[test]
    fn test_match_project_by_ghq_path() {
        let projects = vec![
            project("alpha", Some("github.com/acme/alpha")),
            project("beta", Some("github.com/acme/beta")),
        ];
        let root = PathBuf::from("/home/dev/ghq/github.com/acme/alpha");
        assert_eq!(match_project(&projects, &root), Some("alpha".to_string()));
    }

    #[test]
    fn test_match_project_by_slug() {
        let projects = vec![project("gamma", None)];
        let root = PathBuf::from("/work/gamma");
        assert_eq!(match_project(&projects, &root), Some("gamma".to_string()));
        assert_eq!(match_project(&projects, Path::new("/work/other")), None);
    }

    #[test]
    fn test_resolve_scope_explicit() {
        let (_tmp, store) = temp_store();
        assert_eq!(
            resolve_scope(&store, Some(Some("alpha".into())), None).unwrap(),
            ProjectScope::Project("alpha".into())
        );
        assert_eq!(
            resolve_scope(&store, Some(None), None).unwrap(),
            ProjectScope::UniversalOnly
        );
        assert_eq!(
            resolve_scope(&store, Some(Some(String::new())), None).unwrap(),
            ProjectScope::UniversalOnly
        );
    }

    #[test]
    fn test_resolve_scope_cwd_detection() {
        let (_tmp, store) = temp_store();
        store.upsert_project(&project("alpha", None)).unwrap();

        let tmp = TempDir::new().unwrap();
        let repo = tmp.path().join("alpha");
        std::fs::create_dir_all(repo.join(".git")).unwrap();

        assert_eq!(
            resolve_scope(&store, None, Some(&repo)).unwrap(),
            ProjectScope::Project("alpha".into())
        );
        // Unregistered root: no filter
        let other = tmp.path().join("unknown");
        std::fs::create_dir_all(other.join(".git")).unwrap();
        assert_eq!(resolve_scope(&store, None, Some(&other)).unwrap(), ProjectScope::Any);
    }

    #[test]
    fn test_resolve_scope_default() {
        let (_tmp, store) = temp_store();
        assert_eq!(resolve_scope(&store, None, None).unwrap(), ProjectScope::Any);
    }
}
