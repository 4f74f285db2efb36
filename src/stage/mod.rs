//! Stages, prim handles and the authoring API layered over composition.

pub(crate) mod opts;
pub(crate) mod prim;
#[allow(clippy::module_inception)]
pub(crate) mod stage;

pub use opts::StageOpts;
pub use prim::{
    ArcEditor, Attribute, Inherits, Prim, References, Relationship, Specializes, VariantSets,
};
pub use stage::{Stage, StageId, SubscriptionId};
