use crate::path::Path;
use std::fmt;

/// Category of a recoverable composition problem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompositionErrorKind {
    /// An arc targets a site that is already being composed.
    ArcCycle,
    /// A reference or sublayer names a layer that is not loaded.
    UnresolvedLayer,
    /// A reference without a prim path targets a layer with no default prim.
    MissingDefaultPrim,
    /// An arc targets something that is not a prim path.
    InvalidTarget,
    /// An authored variant selection has no variant spec.
    MissingVariant,
    /// A sublayer list includes one of its own ancestors.
    SublayerCycle,
    /// Arc nesting exceeded the configured depth bound.
    DepthLimit,
}

impl CompositionErrorKind {
    fn label(self) -> &'static str {
        match self {
            Self::ArcCycle => "arc cycle",
            Self::UnresolvedLayer => "unresolved layer",
            Self::MissingDefaultPrim => "missing default prim",
            Self::InvalidTarget => "invalid arc target",
            Self::MissingVariant => "missing variant",
            Self::SublayerCycle => "sublayer cycle",
            Self::DepthLimit => "composition depth limit",
        }
    }
}

/// A dropped arc or sublayer, attached to the path being composed.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CompositionError {
    /// Problem category.
    pub kind: CompositionErrorKind,
    /// Composed path (in the namespace of the layer stack being composed).
    pub site: Path,
    /// Human readable detail.
    pub message: String,
}

impl CompositionError {
    pub(crate) fn new(kind: CompositionErrorKind, site: &Path, message: impl Into<String>) -> Self {
        Self {
            kind,
            site: site.clone(),
            message: message.into(),
        }
    }
}

impl fmt::Display for CompositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {}: {}",
            self.kind.label(),
            self.site,
            self.message
        )
    }
}

impl std::error::Error for CompositionError {}

impl From<CompositionError> for crate::foundation::error::StageError {
    fn from(e: CompositionError) -> Self {
        Self::composition(e.to_string())
    }
}
