//! Workspace path containment.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use super::ToolError;

/// Resolve `requested` against the workspace `root` and reject anything that
/// lands outside it.
///
/// Relative paths are joined onto `root`; absolute paths are taken as is.
/// Resolution is lexical (`.` and `..` are folded without touching the
/// filesystem), so the check happens before any I/O and also applies to
/// paths that do not exist yet. `root` must be absolute.
pub fn resolve_in_workspace(root: &Path, requested: &str) -> Result<PathBuf, ToolError> {
    let root = normalize(root);
    let resolved = normalize(&root.join(requested));

    match resolved.strip_prefix(&root) {
        Ok(relative) if !starts_outside(relative) => Ok(resolved),
        _ => Err(ToolError::PathEscapesWorkspace(requested.to_string())),
    }
}

/// [`resolve_in_workspace`], then follow symlinks through the part of the
/// path that already exists and reject it if the real location is outside
/// the workspace. A dangling symlink is rejected as well, since writing
/// through it would create its target.
pub async fn resolve_real_path(root: &Path, requested: &str) -> Result<PathBuf, ToolError> {
    let resolved = resolve_in_workspace(root, requested)?;
    let real_root = tokio::fs::canonicalize(root).await?;

    let mut existing = resolved.as_path();
    loop {
        match tokio::fs::canonicalize(existing).await {
            Ok(real) if real.starts_with(&real_root) => return Ok(resolved),
            Ok(_) => break,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if tokio::fs::symlink_metadata(existing).await.is_ok() {
                    break;
                }
                match existing.parent() {
                    Some(parent) => existing = parent,
                    None => break,
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(ToolError::PathEscapesWorkspace(requested.to_string()))
}

fn starts_outside(relative: &Path) -> bool {
    matches!(
        relative.components().next(),
        Some(Component::ParentDir | Component::RootDir | Component::Prefix(_))
    )
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root.
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
