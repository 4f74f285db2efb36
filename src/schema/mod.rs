//! Typed schema kinds, their built-in attributes, and point-based geometry helpers.

pub(crate) mod kind;
pub(crate) mod point_based;

pub use kind::{AttributeDef, SchemaFamily, SchemaKind};
pub use point_based::{PointBased, compute_extent, compute_extent_with_widths};
