//! The subfile writer (C11): packing a document back out to a directory
//! tree instead of a single string.
//!
//! Every `!include` site is written to its own file using that subfile's
//! own recorded presentation, after first *un-applying* the site's
//! override trace — restoring any scalar the override replaced, and
//! dropping any key or sequence tail the override purely added — so the
//! override doesn't leak into the subfile that should still parse
//! standalone.
//!
//! Two different include sites can name the same relative path while
//! carrying different (post-edit) content, e.g. two `!include shared.yml`
//! with diverging overrides bound before the AST was mutated further.
//! [`SubfileWriter`] is a content-addressed cache keyed by the nominal
//! path: identical content reuses the first file written there, differing
//! content is written alongside it with a `~N` suffix on the stem.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::ast::{MapEntry, Node, NodeKind};
use crate::error::PackError;
use crate::include::lexical_normalize;
use crate::presentation::{DocumentPresentation, OverrideTrace, PathExpr, Segment};

use super::state::{pack_with_claims, ClaimMap, PackFlags};

/// Write `root`/`presentation` to `out_dir` as a top-level file plus one
/// file per `!include`, via `write_file` (kept generic so callers can
/// target a real directory, an in-memory map for tests, or a dry run).
/// When `flags.no_subfiles` is set, every subfile's text is still computed
/// (so override reconstruction runs and its errors still surface) but
/// `write_file` is only invoked for the top-level document.
///
/// Claims are resolved bottom-up before anything is emitted: an include
/// site's `!include` line must name whatever filename the dedup writer
/// actually claimed for its subfile, and that subfile's own text may in
/// turn reference claims made even deeper in the tree. Emitting the
/// top-level text first and only afterwards discovering a nested rename
/// would leave the parent pointing at an orphaned file, so the whole
/// include tree's claims are collected before any text is rendered.
pub fn pack_tree<W>(
    root: &Node,
    presentation: &DocumentPresentation,
    top_level_name: &str,
    out_dir: &Path,
    flags: PackFlags,
    mut write_file: W,
) -> Result<(), PackError>
where
    W: FnMut(&Path, &str) -> Result<(), PackError>,
{
    let mut writer = SubfileWriter::new();
    let mut files = Vec::new();
    let claims = collect_claims(root, &PathExpr::root(), presentation, flags, &mut writer, &mut files)?;

    write_file(&out_dir.join(top_level_name), &pack_with_claims(root, presentation, flags, &claims))?;
    if !flags.no_subfiles {
        for (path, text) in &files {
            write_file(&out_dir.join(path), text)?;
        }
    }
    Ok(())
}

/// Walk `node`'s include tree post-order, packing each subfile (using the
/// claims already resolved for anything *it* includes) and claiming its
/// filename from `writer`, then return the map from this document's own
/// include-site paths to the claimed filename, having appended every
/// `(path, text)` pair that needs writing to `files`.
fn collect_claims(
    node: &Node,
    path: &PathExpr,
    presentation: &DocumentPresentation,
    flags: PackFlags,
    writer: &mut SubfileWriter,
    files: &mut Vec<(PathBuf, String)>,
) -> Result<ClaimMap, PackError> {
    let mut claims = ClaimMap::new();
    collect_claims_into(node, path, presentation, flags, writer, files, &mut claims)?;
    Ok(claims)
}

fn collect_claims_into(
    node: &Node,
    path: &PathExpr,
    presentation: &DocumentPresentation,
    flags: PackFlags,
    writer: &mut SubfileWriter,
    files: &mut Vec<(PathBuf, String)>,
    claims: &mut ClaimMap,
) -> Result<(), PackError> {
    if let Some(np) = presentation.get(path) {
        if let Some(info) = &np.included {
            if !info.raw {
                let original = unapply_override(node, &info.override_trace);
                let nested_claims = collect_claims(
                    &original,
                    &PathExpr::root(),
                    &info.subfile_presentation,
                    flags,
                    writer,
                    files,
                )?;
                let text = pack_with_claims(&original, &info.subfile_presentation, flags, &nested_claims);
                let claimed = writer.claim(Path::new(&info.path), &text);
                files.push((claimed.clone(), text));
                claims.insert(path.clone(), claimed);
            }
            return Ok(());
        }
    }
    match &node.kind {
        NodeKind::Sequence(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_claims_into(item, &path.child_index(i), presentation, flags, writer, files, claims)?;
            }
        }
        NodeKind::Mapping(entries) => {
            for entry in entries {
                collect_claims_into(&entry.value, &path.child_key(&entry.key.name), presentation, flags, writer, files, claims)?;
            }
        }
        NodeKind::Scalar(_) => {}
    }
    Ok(())
}

/// Canonicalise (lexically, matching `include::lexical_normalize` rather
/// than touching the filesystem, since `out_dir` may not exist yet) and
/// create `out_dir`'s directory tree, then pack `root` into it as real
/// files on disk, applying `file_mode` (Unix permission bits) to each one
/// written. This is the real-filesystem counterpart to `pack_tree`'s
/// generic writer callback — §6's `set_outdir`/`set_file_mode`/
/// `pack_to_file` collapsed into one call for the common case of actually
/// writing a tree to disk.
pub fn pack_tree_to_dir(
    root: &Node,
    presentation: &DocumentPresentation,
    top_level_name: &str,
    out_dir: &Path,
    flags: PackFlags,
    file_mode: Option<u32>,
) -> Result<(), PackError> {
    let out_dir = lexical_normalize(out_dir);
    std::fs::create_dir_all(&out_dir)?;
    pack_tree(root, presentation, top_level_name, &out_dir, flags, |path, text| {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
        apply_file_mode(path, file_mode)?;
        Ok(())
    })
}

#[cfg(unix)]
fn apply_file_mode(path: &Path, mode: Option<u32>) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let Some(mode) = mode else {
        return Ok(());
    };
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn apply_file_mode(_path: &Path, _mode: Option<u32>) -> std::io::Result<()> {
    Ok(())
}

/// Restore `node` to the shape it had before the override at this
/// inclusion site was applied: scalar replacements are reverted to their
/// recorded original, and keys/sequence-tail entries the override added
/// outright are removed.
fn unapply_override(node: &Node, trace: &OverrideTrace) -> Node {
    let mut out = node.clone();
    for path in &trace.ordered_paths {
        let entry = &trace.entries[path];
        if let Some(orig) = &entry.original_data {
            if let Some(target) = out.navigate_mut(&path.segments) {
                *target = orig.clone();
            }
        }
    }
    for path in &trace.ordered_paths {
        if trace.entries[path].original_data.is_none() {
            remove_path(&mut out, &path.segments);
        }
    }
    out
}

fn remove_path(node: &mut Node, segments: &[Segment]) {
    if segments.is_empty() {
        return;
    }
    if segments.len() == 1 {
        match (&segments[0], &mut node.kind) {
            (Segment::Key(k), NodeKind::Mapping(entries)) => {
                entries.retain(|e: &MapEntry| &e.key.name != k);
            }
            (Segment::Index(_), NodeKind::Sequence(items)) => {
                items.pop();
            }
            _ => {}
        }
        return;
    }
    if let Some(child) = node.navigate_mut(&segments[..1]) {
        remove_path(child, &segments[1..]);
    }
}

/// Content-addressed cache of already-written subfile paths, keyed by the
/// nominal (as-written-in-source) relative path.
pub struct SubfileWriter {
    written: HashMap<PathBuf, Vec<(u64, PathBuf)>>,
}

impl SubfileWriter {
    pub fn new() -> Self {
        Self {
            written: HashMap::new(),
        }
    }

    /// Decide the actual path `content` should be written at: the first
    /// time a nominal path is claimed it gets written as-is; subsequent
    /// claims with byte-identical content reuse that same path; claims
    /// with different content get `~1`, `~2`, ... appended to the stem.
    pub fn claim(&mut self, base: &Path, content: &str) -> PathBuf {
        let hash = fnv1a(content.as_bytes());
        let entries = self.written.entry(base.to_path_buf()).or_default();
        if let Some((_, existing)) = entries.iter().find(|(h, _)| *h == hash) {
            return existing.clone();
        }
        let n = entries.len();
        let chosen = if n == 0 { base.to_path_buf() } else { suffixed(base, n) };
        entries.push((hash, chosen.clone()));
        chosen
    }
}

impl Default for SubfileWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn suffixed(base: &Path, n: usize) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = base
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    base.with_file_name(format!("{stem}~{n}{ext}"))
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_reuses_path_for_identical_content() {
        let mut w = SubfileWriter::new();
        let a = w.claim(Path::new("shared.yml"), "x: 1\n");
        let b = w.claim(Path::new("shared.yml"), "x: 1\n");
        assert_eq!(a, b);
        assert_eq!(a, PathBuf::from("shared.yml"));
    }

    #[test]
    fn claim_suffixes_diverging_content() {
        let mut w = SubfileWriter::new();
        let a = w.claim(Path::new("shared.yml"), "x: 1\n");
        let b = w.claim(Path::new("shared.yml"), "x: 2\n");
        assert_ne!(a, b);
        assert_eq!(b, PathBuf::from("shared~1.yml"));
    }

    #[test]
    fn claim_is_stable_across_three_variants() {
        let mut w = SubfileWriter::new();
        let a = w.claim(Path::new("shared.yml"), "x: 1\n");
        let b = w.claim(Path::new("shared.yml"), "x: 2\n");
        let c = w.claim(Path::new("shared.yml"), "x: 1\n");
        assert_eq!(a, c);
        assert_ne!(a, b);
    }
}
