//! scenestack is a layered scene description engine: sparse layers of opinions composed
//! into a strength-ordered view, with change notification.
//!
//! # Overview
//!
//! 1. **Author**: [`Layer`]s hold sparse `(path, field) -> value` opinions. Every mutation
//!    is recorded inside a [`ChangeBlock`] (implicit or explicit).
//! 2. **Compose**: a [`Stage`] composes its root layer stack through references, inherits,
//!    variants and specializes into one [`PrimIndex`] per prim, computed lazily and cached.
//! 3. **Resolve**: values are read through the prim index, strongest opinion first
//!    ([`resolve`]).
//! 4. **Notify**: when the outermost change block closes, each stage listening to the
//!    edited layers classifies the edits and sends one [`ObjectsChanged`] notice listing
//!    resynced and changed-info paths.
//!
//! Design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **No IO**: layers live in memory; references name live layers by identifier.
//! - **Recoverable composition**: broken arcs are dropped and reported as diagnostics.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod change;
mod compose;
mod foundation;
mod layer;
mod path;
mod schema;
mod stage;

pub mod resolve;

pub use change::{
    ChangeBlock, EditKind, ObjectsChanged, RawEdit, is_change_block_open, is_structural_field,
    open_change_block,
};
pub use compose::{
    ArcType, CompositionError, CompositionErrorKind, IndexFingerprint, LayerStack, LayerStackId,
    Node, PrimIndex,
};
pub use foundation::core::{InterpolationType, LayerOffset, TimeCode};
pub use foundation::error::{StageError, StageResult};
pub use foundation::token::{Token, fields};
pub use layer::{
    Layer, LayerId, ListOp, ListOpItem, ListPosition, Reference, Spec, SpecType, Specifier,
    TimeSamples, Value,
};
pub use path::{Ancestors, MapFunction, Path};
pub use schema::{
    AttributeDef, PointBased, SchemaFamily, SchemaKind, compute_extent, compute_extent_with_widths,
};
pub use stage::{
    ArcEditor, Attribute, Inherits, Prim, References, Relationship, Specializes, Stage, StageId,
    StageOpts, SubscriptionId, VariantSets,
};
