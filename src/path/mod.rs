//! Interned scene paths.
//!
//! A [`Path`] names a prim (`/World/Geom`), a property (`/World/Geom.points`), or a location
//! inside a variant (`/World{shading=red}Geom`). Paths are interned process-wide: equal paths
//! share one node, so equality and hashing are identity operations. The table holds weak
//! entries and forgets a path as soon as its last handle is dropped.

pub(crate) mod intern;
pub(crate) mod map;

use crate::foundation::error::{StageError, StageResult};
use crate::foundation::token::Token;
use intern::{Element, PathNode};
use smallvec::SmallVec;
use std::fmt;
use std::sync::{Arc, OnceLock};

pub use map::MapFunction;

/// Immutable, interned, hierarchical scene path.
#[derive(Clone)]
pub struct Path(pub(crate) Arc<PathNode>);

fn absolute_root_node() -> &'static Path {
    static ROOT: OnceLock<Path> = OnceLock::new();
    ROOT.get_or_init(|| Path(intern::intern("/".to_string(), None, Element::AbsoluteRoot)))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_property_name(s: &str) -> bool {
    !s.is_empty() && s.split(':').all(is_identifier)
}

fn is_variant_name(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '|')
}

impl Path {
    /// Parse an absolute path.
    pub fn new(text: &str) -> StageResult<Self> {
        parse(text)
    }

    /// The absolute root `/`.
    pub fn absolute_root() -> Self {
        absolute_root_node().clone()
    }

    /// Full path text.
    pub fn as_str(&self) -> &str {
        &self.0.text
    }

    /// Number of elements below the absolute root.
    pub fn element_count(&self) -> usize {
        self.0.depth as usize
    }

    /// Parent path; `None` for the absolute root.
    pub fn parent(&self) -> Option<Path> {
        self.0.parent.clone()
    }

    /// Last prim or property name. `None` for the root and variant selections.
    pub fn name(&self) -> Option<&Token> {
        match &self.0.element {
            Element::Prim(n) | Element::Property(n) => Some(n),
            _ => None,
        }
    }

    /// Variant `(set, selection)` named by the last element.
    pub fn variant_selection(&self) -> Option<(&Token, &Token)> {
        match &self.0.element {
            Element::VariantSelection { set, selection } => Some((set, selection)),
            _ => None,
        }
    }

    /// Return `true` for `/`.
    pub fn is_absolute_root(&self) -> bool {
        matches!(self.0.element, Element::AbsoluteRoot)
    }

    /// Return `true` when the last element is a prim name.
    pub fn is_prim_path(&self) -> bool {
        matches!(self.0.element, Element::Prim(_))
    }

    /// Return `true` when the last element is a variant selection.
    pub fn is_variant_selection_path(&self) -> bool {
        matches!(self.0.element, Element::VariantSelection { .. })
    }

    /// Return `true` when the last element is a property name.
    pub fn is_property_path(&self) -> bool {
        matches!(self.0.element, Element::Property(_))
    }

    /// Return `true` when any element is a variant selection.
    pub fn contains_variant_selection(&self) -> bool {
        self.ancestors().any(|p| p.is_variant_selection_path())
    }

    /// Owning prim (or variant) path of a property; `self` otherwise.
    pub fn prim_path(&self) -> Path {
        if self.is_property_path() {
            self.parent().unwrap_or_else(Path::absolute_root)
        } else {
            self.clone()
        }
    }

    /// Append a prim child.
    pub fn append_child(&self, name: &str) -> StageResult<Path> {
        if self.is_property_path() {
            return Err(StageError::invalid_path(format!(
                "cannot append child '{name}' to property path {self}"
            )));
        }
        if !is_identifier(name) {
            return Err(StageError::invalid_path(format!(
                "'{name}' is not a valid prim name"
            )));
        }
        let text = match self.0.element {
            Element::AbsoluteRoot => format!("/{name}"),
            Element::VariantSelection { .. } => format!("{}{name}", self.as_str()),
            _ => format!("{}/{name}", self.as_str()),
        };
        Ok(Path(intern::intern(
            text,
            Some(self),
            Element::Prim(Token::new(name)),
        )))
    }

    /// Append a property name (namespaced names like `primvars:st` are allowed).
    pub fn append_property(&self, name: &str) -> StageResult<Path> {
        if self.is_absolute_root() || self.is_property_path() {
            return Err(StageError::invalid_path(format!(
                "cannot append property '{name}' to {self}"
            )));
        }
        if !is_property_name(name) {
            return Err(StageError::invalid_path(format!(
                "'{name}' is not a valid property name"
            )));
        }
        let text = format!("{}.{name}", self.as_str());
        Ok(Path(intern::intern(
            text,
            Some(self),
            Element::Property(Token::new(name)),
        )))
    }

    /// Append a variant selection `{set=selection}`.
    pub fn append_variant_selection(&self, set: &str, selection: &str) -> StageResult<Path> {
        if !(self.is_prim_path() || self.is_variant_selection_path()) {
            return Err(StageError::invalid_path(format!(
                "cannot append variant selection to {self}"
            )));
        }
        if !is_identifier(set) || !is_variant_name(selection) {
            return Err(StageError::invalid_path(format!(
                "invalid variant selection {{{set}={selection}}}"
            )));
        }
        let text = format!("{}{{{set}={selection}}}", self.as_str());
        Ok(Path(intern::intern(
            text,
            Some(self),
            Element::VariantSelection {
                set: Token::new(set),
                selection: Token::new(selection),
            },
        )))
    }

    fn append_element(&self, element: &Element) -> Path {
        let appended = match element {
            Element::AbsoluteRoot => Ok(self.clone()),
            Element::Prim(n) => self.append_child(n.as_str()),
            Element::Property(n) => self.append_property(n.as_str()),
            Element::VariantSelection { set, selection } => {
                self.append_variant_selection(set.as_str(), selection.as_str())
            }
        };
        // Elements come from an existing valid path, so re-appending them cannot fail
        // except for a property under a root, which callers never produce.
        appended.unwrap_or_else(|_| self.clone())
    }

    /// Iterate `self`, its parent, ... up to and including `/`.
    pub fn ancestors(&self) -> Ancestors {
        Ancestors {
            next: Some(self.clone()),
        }
    }

    /// Elements from the root down to `self` (the root itself excluded).
    fn elements(&self) -> SmallVec<[Element; 8]> {
        let mut out: SmallVec<[Element; 8]> = self
            .ancestors()
            .filter(|p| !p.is_absolute_root())
            .map(|p| p.0.element.clone())
            .collect();
        out.reverse();
        out
    }

    /// Return `true` when `prefix` is `self` or one of its ancestors.
    pub fn has_prefix(&self, prefix: &Path) -> bool {
        if prefix.0.depth > self.0.depth {
            return false;
        }
        let mut cur = self.clone();
        for _ in 0..(self.0.depth - prefix.0.depth) {
            match cur.parent() {
                Some(p) => cur = p,
                None => return false,
            }
        }
        cur == *prefix
    }

    /// Return `true` when `other` is `self` or a descendant of `self`.
    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        other.has_prefix(self)
    }

    /// Replace `old` with `new` at the front of `self`; `None` if `old` is not a prefix.
    pub fn replace_prefix(&self, old: &Path, new: &Path) -> Option<Path> {
        if !self.has_prefix(old) {
            return None;
        }
        let skip = old.element_count();
        let mut out = new.clone();
        for e in self.elements().iter().skip(skip) {
            out = out.append_element(e);
        }
        Some(out)
    }

    /// Same path with every variant selection element removed.
    pub fn strip_variant_selections(&self) -> Path {
        if !self.contains_variant_selection() {
            return self.clone();
        }
        let mut out = Path::absolute_root();
        for e in self.elements().iter() {
            if !matches!(e, Element::VariantSelection { .. }) {
                out = out.append_element(e);
            }
        }
        out
    }

    /// Number of currently interned paths, process-wide.
    pub fn interned_count() -> usize {
        intern::live_count()
    }

    /// Return `true` when `text` currently has a live interned path.
    pub fn is_interned(text: &str) -> bool {
        intern::is_interned(text)
    }
}

/// Iterator over a path and its ancestors.
#[derive(Debug)]
pub struct Ancestors {
    next: Option<Path>,
}

impl Iterator for Ancestors {
    type Item = Path;

    fn next(&mut self) -> Option<Path> {
        let cur = self.next.take()?;
        self.next = cur.parent();
        Some(cur)
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Path {}

impl std::hash::Hash for Path {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.0), state);
    }
}

impl PartialOrd for Path {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Path {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        if self == other {
            return std::cmp::Ordering::Equal;
        }
        let a = self.elements();
        let b = other.elements();
        for (x, y) in a.iter().zip(b.iter()) {
            match x.cmp_element(y) {
                std::cmp::Ordering::Equal => {}
                o => return o,
            }
        }
        a.len().cmp(&b.len())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({})", self.as_str())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Path {
    type Err = StageError;

    fn from_str(s: &str) -> StageResult<Self> {
        parse(s)
    }
}

impl serde::Serialize for Path {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for Path {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }
}

fn parse(text: &str) -> StageResult<Path> {
    let bad = |why: &str| StageError::invalid_path(format!("'{text}': {why}"));

    let Some(rest) = text.strip_prefix('/') else {
        return Err(bad("paths must be absolute"));
    };
    let mut cur = Path::absolute_root();
    if rest.is_empty() {
        return Ok(cur);
    }

    let bytes = rest.as_bytes();
    let mut i = 0usize;
    // The root accepts a bare identifier; later prim names need a '/' separator.
    let mut expect_name = true;
    while i < bytes.len() {
        match bytes[i] {
            b'/' => {
                if expect_name || cur.is_variant_selection_path() {
                    return Err(bad("unexpected '/'"));
                }
                i += 1;
                expect_name = true;
                if i == bytes.len() {
                    return Err(bad("trailing '/'"));
                }
            }
            b'{' => {
                if expect_name {
                    return Err(bad("variant selection needs a prim"));
                }
                let end = rest[i..]
                    .find('}')
                    .map(|o| i + o)
                    .ok_or_else(|| bad("unterminated variant selection"))?;
                let inner = &rest[i + 1..end];
                let (set, sel) = inner
                    .split_once('=')
                    .ok_or_else(|| bad("variant selection needs '='"))?;
                cur = cur
                    .append_variant_selection(set.trim(), sel.trim())
                    .map_err(|e| bad(&e.to_string()))?;
                i = end + 1;
                expect_name = false;
            }
            b'.' => {
                if expect_name {
                    return Err(bad("property needs an owner"));
                }
                let name = &rest[i + 1..];
                cur = cur.append_property(name).map_err(|e| bad(&e.to_string()))?;
                return Ok(cur);
            }
            _ => {
                if !expect_name && !cur.is_variant_selection_path() {
                    return Err(bad("missing '/' between names"));
                }
                let end = rest[i..]
                    .find(['/', '{', '.'])
                    .map_or(rest.len(), |o| i + o);
                cur = cur
                    .append_child(&rest[i..end])
                    .map_err(|e| bad(&e.to_string()))?;
                i = end;
                expect_name = false;
            }
        }
    }
    Ok(cur)
}

#[cfg(test)]
#[path = "../../tests/unit/path/path.rs"]
mod tests;
