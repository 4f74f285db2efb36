//! Composition: layer stacks, strength-ordered prim indices and their per-stage cache.

pub(crate) mod builder;
pub(crate) mod cache;
pub(crate) mod diagnostic;
pub(crate) mod layer_stack;
pub(crate) mod prim_index;

pub use cache::PrimIndexCache;
pub use diagnostic::{CompositionError, CompositionErrorKind};
pub use layer_stack::{LayerStack, LayerStackId};
pub use prim_index::{ArcType, IndexFingerprint, Node, PrimIndex};
