//! The include resolver (C7): path resolution, directory containment, and
//! loop detection for `!include` / `!includeraw`.
//!
//! Resolution is purely lexical — `.`/`..` are collapsed textually, not via
//! `fs::canonicalize`, so that resolution works even for files that do not
//! yet exist (relevant when packing to a fresh output directory). A path
//! that lexically escapes the including file's own directory is rejected
//! regardless of whether the filesystem would actually allow the traversal.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, YamlError};
use crate::span::Span;

/// Lexically collapse `.` and `..` components without touching the
/// filesystem.
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut stack: Vec<Component> = Vec::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(stack.last(), Some(Component::Normal(_))) {
                    stack.pop();
                } else {
                    stack.push(comp);
                }
            }
            other => stack.push(other),
        }
    }
    stack.into_iter().collect()
}

/// Resolve `raw_path` (the string argument of `!include`/`!includeraw`)
/// relative to `includer_dir`, enforcing that the result stays within
/// `includer_dir`'s subtree.
pub fn resolve(includer_dir: &Path, raw_path: &str, span: Span) -> Result<PathBuf, YamlError> {
    let candidate = lexical_normalize(&includer_dir.join(raw_path));
    let base = lexical_normalize(includer_dir);
    if !candidate.starts_with(&base) {
        return Err(YamlError::new(
            ErrorKind::InvalidInclude(format!(
                "include path {raw_path:?} escapes its including directory"
            )),
            span,
        ));
    }
    Ok(candidate)
}

/// The chain of files currently being parsed, outermost first, used for
/// include-cycle detection and to build multi-stanza error traces.
#[derive(Debug, Default, Clone)]
pub struct IncludeStack {
    frames: Vec<PathBuf>,
}

impl IncludeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: PathBuf, span: Span) -> Result<(), YamlError> {
        if self.frames.contains(&path) {
            return Err(YamlError::new(
                ErrorKind::InvalidInclude("inclusion loop detected".to_string()),
                span,
            ));
        }
        self.frames.push(path);
        Ok(())
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_dot_and_dotdot() {
        let p = lexical_normalize(Path::new("/a/b/../c/./d"));
        assert_eq!(p, PathBuf::from("/a/c/d"));
    }

    #[test]
    fn resolve_allows_nested_path() {
        let base = Path::new("/root/docs");
        let resolved = resolve(base, "sub/inner.yml", Span::synthetic()).unwrap();
        assert_eq!(resolved, PathBuf::from("/root/docs/sub/inner.yml"));
    }

    #[test]
    fn resolve_rejects_escaping_path() {
        let base = Path::new("/root/docs");
        assert!(resolve(base, "../../etc/passwd", Span::synthetic()).is_err());
    }

    #[test]
    fn cycle_detection_rejects_repeat() {
        let mut stack = IncludeStack::new();
        stack.push(PathBuf::from("/a/x.yml"), Span::synthetic()).unwrap();
        stack.push(PathBuf::from("/a/y.yml"), Span::synthetic()).unwrap();
        assert!(stack.push(PathBuf::from("/a/x.yml"), Span::synthetic()).is_err());
    }
}
