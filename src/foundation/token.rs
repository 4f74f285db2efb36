use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

/// Interned, cheaply clonable name used for field keys, type names and path elements.
///
/// Tokens live in a process-wide registry that is created on first use and never torn down;
/// two tokens with the same text share one allocation.
#[derive(Clone)]
pub struct Token(Arc<str>);

fn registry() -> &'static Mutex<HashSet<Arc<str>>> {
    static REGISTRY: OnceLock<Mutex<HashSet<Arc<str>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashSet::new()))
}

impl Token {
    /// Intern `s`.
    pub fn new(s: &str) -> Self {
        let mut set = registry().lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = set.get(s) {
            return Self(Arc::clone(existing));
        }
        let arc: Arc<str> = Arc::from(s);
        set.insert(Arc::clone(&arc));
        Self(arc)
    }

    /// Token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return `true` for the empty token.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || *self.0 == *other.0
    }
}

impl Eq for Token {}

impl PartialEq<str> for Token {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for Token {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl std::hash::Hash for Token {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialOrd for Token {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Token {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl std::borrow::Borrow<str> for Token {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for Token {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Token {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(&s))
    }
}

/// Well-known field names.
pub mod fields {
    /// Prim or attribute type name.
    pub const TYPE_NAME: &str = "typeName";
    /// Prim specifier (`def`, `over`, `class`).
    pub const SPECIFIER: &str = "specifier";
    /// Prim activation.
    pub const ACTIVE: &str = "active";
    /// Model kind metadata.
    pub const KIND: &str = "kind";
    /// Documentation string.
    pub const DOCUMENTATION: &str = "documentation";
    /// Free-form comment.
    pub const COMMENT: &str = "comment";
    /// Reference arcs list op.
    pub const REFERENCES: &str = "references";
    /// Inherit arcs list op.
    pub const INHERITS: &str = "inherits";
    /// Specialize arcs list op.
    pub const SPECIALIZES: &str = "specializes";
    /// Variant set names list op.
    pub const VARIANT_SET_NAMES: &str = "variantSetNames";
    /// Variant selection dictionary.
    pub const VARIANT_SELECTION: &str = "variantSelection";
    /// Variant names authored under a variant set.
    pub const VARIANT_CHILDREN: &str = "variantChildren";
    /// Ordered child prim names.
    pub const PRIM_CHILDREN: &str = "primChildren";
    /// Ordered property names.
    pub const PROPERTIES: &str = "properties";
    /// Explicit child reorder statement.
    pub const PRIM_ORDER: &str = "primOrder";
    /// Non-animated attribute value.
    pub const DEFAULT: &str = "default";
    /// Animated attribute values.
    pub const TIME_SAMPLES: &str = "timeSamples";
    /// Relationship targets list op.
    pub const TARGET_PATHS: &str = "targetPaths";
    /// Attribute connections list op.
    pub const CONNECTION_PATHS: &str = "connectionPaths";
    /// Property variability.
    pub const VARIABILITY: &str = "variability";
    /// Custom (non-schema) property flag.
    pub const CUSTOM: &str = "custom";
    /// Primvar interpolation metadata.
    pub const INTERPOLATION: &str = "interpolation";
    /// Sublayer identifiers on the pseudo-root.
    pub const SUB_LAYERS: &str = "subLayers";
    /// Default prim name on the pseudo-root.
    pub const DEFAULT_PRIM: &str = "defaultPrim";
    /// Time codes per second on the pseudo-root.
    pub const TIME_CODES_PER_SECOND: &str = "timeCodesPerSecond";
    /// Frames per second on the pseudo-root.
    pub const FRAMES_PER_SECOND: &str = "framesPerSecond";
    /// First authored time code on the pseudo-root.
    pub const START_TIME_CODE: &str = "startTimeCode";
    /// Last authored time code on the pseudo-root.
    pub const END_TIME_CODE: &str = "endTimeCode";
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/token.rs"]
mod tests;
