//! `directory_tree` and `search_files` tool logic (spec §4.10).

use serde::Serialize;

use workspaced_backend::{Backend, BackendError};

/// Exactly the list named in spec §4.10.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    "build",
    ".next",
    "target",
    ".venv",
    "venv",
    "__pycache__",
    ".cache",
    ".pytest_cache",
    ".mypy_cache",
    ".ruff_cache",
    "coverage",
    ".coverage",
    "htmlcov",
    ".idea",
    ".vscode",
    ".svn",
    ".hg",
    "*.egg-info",
];

/// `*.<suf>` matches iff `name` ends with `.<suf>`; every other pattern is
/// matched exactly (spec §4.10, verbatim).
fn matches_pattern(name: &str, pattern: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(suffix) => name.ends_with(&format!(".{suffix}")),
        None => name == pattern,
    }
}

fn is_excluded(name: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| matches_pattern(name, p))
}

#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeNode>>,
}

/// Builds the effective exclude list: the caller's `exclude_patterns` plus,
/// unless explicitly disabled, the built-in [`DEFAULT_EXCLUDES`].
pub fn effective_excludes(
    exclude_patterns: &Option<Vec<String>>,
    include_default_excludes: Option<bool>,
) -> Vec<String> {
    let mut patterns: Vec<String> = if include_default_excludes.unwrap_or(true) {
        DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect()
    } else {
        Vec::new()
    };
    if let Some(extra) = exclude_patterns {
        patterns.extend(extra.iter().cloned());
    }
    patterns
}

pub async fn build_tree(
    backend: &dyn Backend,
    path: &str,
    patterns: &[String],
) -> Result<Vec<TreeNode>, BackendError> {
    let entries = backend.readdir_with_stats(path).await?;
    let mut nodes = Vec::with_capacity(entries.len());

    for entry in entries {
        if is_excluded(&entry.name, patterns) {
            continue;
        }

        let child_path = if path.is_empty() {
            entry.name.clone()
        } else {
            format!("{path}/{}", entry.name)
        };

        if entry.stat.is_dir {
            let children = Box::pin(build_tree(backend, &child_path, patterns)).await?;
            nodes.push(TreeNode {
                name: entry.name,
                kind: "directory",
                children: Some(children),
            });
        } else {
            nodes.push(TreeNode {
                name: entry.name,
                kind: "file",
                children: None,
            });
        }
    }

    Ok(nodes)
}

/// Recursive, case-insensitive substring search over entry names under
/// `path`. Spec §4.10 names `pattern -> matches[]` without further detail;
/// this mirrors the well-known reference filesystem MCP server's
/// `search_files` behavior, which is the closest available precedent.
pub async fn search_files(
    backend: &dyn Backend,
    path: &str,
    pattern: &str,
) -> Result<Vec<String>, BackendError> {
    let needle = pattern.to_lowercase();
    let mut matches = Vec::new();
    search_into(backend, path, &needle, &mut matches).await?;
    Ok(matches)
}

fn search_into<'a>(
    backend: &'a dyn Backend,
    path: &'a str,
    needle: &'a str,
    matches: &'a mut Vec<String>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), BackendError>> + Send + 'a>> {
    Box::pin(async move {
        let entries = backend.readdir_with_stats(path).await?;
        for entry in entries {
            let child_path = if path.is_empty() {
                entry.name.clone()
            } else {
                format!("{path}/{}", entry.name)
            };

            if entry.name.to_lowercase().contains(needle) {
                matches.push(child_path.clone());
            }

            if entry.stat.is_dir {
                search_into(backend, &child_path, needle, matches).await?;
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_suffix_matches_by_extension() {
        assert!(matches_pattern("foo.egg-info", "*.egg-info"));
        assert!(!matches_pattern("egg-info", "*.egg-info"));
    }

    #[test]
    fn exact_pattern_requires_full_match() {
        assert!(matches_pattern("node_modules", "node_modules"));
        assert!(!matches_pattern("node_modules_old", "node_modules"));
    }

    #[test]
    fn default_excludes_apply_unless_disabled() {
        let none = effective_excludes(&None, None);
        assert!(none.contains(&"node_modules".to_string()));

        let disabled = effective_excludes(&None, Some(false));
        assert!(disabled.is_empty());

        let extra = effective_excludes(&Some(vec!["foo".to_string()]), Some(false));
        assert_eq!(extra, vec!["foo".to_string()]);
    }
}
