//! Include resolution
//!
//! The compiler runtime receives headers as in-memory (name, content) arrays
//! rather than a search path, so the cell source is scanned for `#include`
//! directives and the transitive closure is flattened up front.
//!
//! Comments are stripped first so commented-out includes are not resolved.
//! The stripping is pattern-based and can be fooled by comment-like
//! sequences inside string literals; an `#include` living inside such a
//! literal will still be resolved. Known limitation, kept for compatibility
//! with the original scanning behavior.

use std::collections::HashSet;
use std::io;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Result, SessionError};

// ============================================================================
// Source Loading
// ============================================================================

/// Reads header contents by the identifier written in the `#include`
/// directive. A missing include is always fatal to the invocation.
pub trait SourceLoader {
    /// Read the full contents of `path`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the file is missing or unreadable.
    fn load(&self, path: &str) -> io::Result<String>;
}

/// Loads headers from the process working directory / absolute paths
#[derive(Debug, Default, Clone, Copy)]
pub struct FsLoader;

impl SourceLoader for FsLoader {
    fn load(&self, path: &str) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

// ============================================================================
// Include Set
// ============================================================================

/// The flattened transitive include closure: parallel ordered lists of
/// header identifiers and their contents, globally deduplicated.
///
/// Rebuilt from scratch at the start of every invocation.
#[derive(Debug, Clone, Default)]
pub struct IncludeSet {
    names: Vec<String>,
    contents: Vec<String>,
}

impl IncludeSet {
    /// Number of headers in the closure
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the closure is empty (the headerless compile fast path)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Header identifiers in discovery order
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Header contents, parallel to [`Self::names`]
    #[must_use]
    pub fn contents(&self) -> &[String] {
        &self.contents
    }

    /// Iterate (name, content) pairs in discovery order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.contents.iter().map(String::as_str))
    }
}

// ============================================================================
// Resolution
// ============================================================================

fn include_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"#include\s*<([^>]+)>|#include\s*"([^"]+)""#).expect("include pattern")
    })
}

fn line_comment_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"//[^\n]*").expect("line comment pattern"))
}

fn block_comment_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/").expect("block comment pattern"))
}

/// Strip `//` and `/* */` comments by pattern. Single-line comments are
/// removed first, matching the original scan order.
fn strip_comments(code: &str) -> String {
    let without_line = line_comment_pattern().replace_all(code, "");
    block_comment_pattern().replace_all(&without_line, "").into_owned()
}

/// Resolve the transitive include closure of `source`, depth-first.
///
/// Each newly discovered header is read through `loader`, recorded, and
/// recursed into before scanning continues. The dedup set is global to the
/// whole walk, which both terminates circular includes and means only the
/// first-discovered version of a shared header is kept.
///
/// # Errors
///
/// Returns [`SessionError::Include`] as soon as any header fails to read.
pub fn resolve_includes(source: &str, loader: &dyn SourceLoader) -> Result<IncludeSet> {
    let mut set = IncludeSet::default();
    let mut seen = HashSet::new();
    walk(source, loader, &mut set, &mut seen)?;
    Ok(set)
}

fn walk(
    source: &str,
    loader: &dyn SourceLoader,
    set: &mut IncludeSet,
    seen: &mut HashSet<String>,
) -> Result<()> {
    let stripped = strip_comments(source);
    for caps in include_pattern().captures_iter(&stripped) {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        if name.is_empty() || seen.contains(name) {
            continue;
        }
        let content = loader.load(name).map_err(|source| SessionError::Include {
            path: name.to_string(),
            source,
        })?;
        seen.insert(name.to_string());
        set.names.push(name.to_string());
        set.contents.push(content.clone());
        walk(&content, loader, set, seen)?;
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
