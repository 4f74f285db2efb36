//! Layers: sparse opinion stores keyed by path and field.

#[allow(clippy::module_inception)]
pub(crate) mod layer;
pub(crate) mod list_op;
pub(crate) mod registry;
pub(crate) mod value;

pub use layer::{Layer, LayerId, Spec, SpecType};
pub use list_op::{ListOp, ListOpItem, ListPosition, Reference};
pub use value::{Specifier, TimeSamples, Value};
