//! Path containment (spec component C1).
//!
//! Pure, synchronous, no I/O: callers resolve a user-supplied relative path
//! against a base directory and get back either an absolute path guaranteed
//! to be `base` or a descendant of it, or a [`PathError::Escape`].

use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("path '{path}' escapes base '{base}'")]
    Escape { base: String, path: String },
    #[error("empty path")]
    Empty,
}

/// Strip all leading separators, lexically join with `base`, collapse the
/// *whole* resulting path (so a `..` that would walk back out through `base`
/// itself is visible), and prove the collapsed result still starts with
/// `base`. The empty string and `.` resolve to `base`.
pub fn resolve_within(base: &Path, user_path: &str) -> Result<PathBuf, PathError> {
    let stripped = user_path.trim_start_matches(['/', '\\']);
    let joined = if stripped.is_empty() {
        base.to_path_buf()
    } else {
        base.join(stripped)
    };
    let resolved = collapse(&joined);

    if resolved == base || resolved.starts_with(base) {
        Ok(resolved)
    } else {
        Err(PathError::Escape {
            base: base.display().to_string(),
            path: user_path.to_string(),
        })
    }
}

/// Scope-path variant of [`resolve_within`]: `scope_base` is itself a
/// relative path fragment (e.g. `"u1"` or `"u1/u2"`) rather than an absolute
/// base directory. Returns the collapsed, scope-relative path string to pass
/// down to the parent backend, or [`PathError::Escape`] if `user_path`
/// collapses out of the scope's own fragment.
pub fn join_scope(scope_base: &str, user_path: &str) -> Result<String, PathError> {
    let virtual_root = Path::new("/__scope_root__").join(scope_base);
    let resolved = resolve_within(&virtual_root, user_path)?;
    let relative = resolved
        .strip_prefix(Path::new("/__scope_root__"))
        .unwrap_or(&resolved);
    Ok(relative.to_string_lossy().into_owned())
}

/// Lexically collapse `.` and `..` components without touching the filesystem.
/// A `..` that would walk above an absolute root is simply dropped (matching
/// typical path-normalization behavior); the *containment* check that
/// follows is what actually rejects an escape, by comparing the collapsed
/// result against `base`.
fn collapse(path: &Path) -> PathBuf {
    let mut out: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_dot_resolve_to_base() {
        let base = Path::new("/root/ws");
        assert_eq!(resolve_within(base, "").unwrap(), base);
        assert_eq!(resolve_within(base, ".").unwrap(), base);
    }

    #[test]
    fn leading_slashes_are_relative() {
        let base = Path::new("/root/ws");
        assert_eq!(
            resolve_within(base, "/etc/passwd").unwrap(),
            base.join("etc/passwd")
        );
    }

    #[test]
    fn dot_dot_within_bounds_is_fine() {
        let base = Path::new("/root/ws");
        assert_eq!(resolve_within(base, "a/../b").unwrap(), base.join("b"));
    }

    #[test]
    fn dot_dot_escape_is_rejected() {
        let base = Path::new("/root/ws");
        let err = resolve_within(base, "../escape").unwrap_err();
        assert!(matches!(err, PathError::Escape { .. }));
    }

    #[test]
    fn dot_dot_escape_even_with_many_segments() {
        let base = Path::new("/root/ws");
        let err = resolve_within(base, "a/b/../../../etc").unwrap_err();
        assert!(matches!(err, PathError::Escape { .. }));
    }

    #[test]
    fn nested_scope_containment() {
        assert_eq!(join_scope("u1", "x").unwrap(), "u1/x");
    }

    #[test]
    fn nested_scope_escape_is_rejected() {
        assert!(join_scope("u1", "../u2/secret").is_err());
    }

    #[test]
    fn nested_double_scope_path() {
        assert_eq!(join_scope("u1/u2", "x/y").unwrap(), "u1/u2/x/y");
    }
}
