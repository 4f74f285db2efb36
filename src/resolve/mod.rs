//! Value resolution over prim indices: strongest opinions, list composition, time samples.

pub(crate) mod resolver;

pub use resolver::{
    compose_children, compose_list_op, compose_path_list_op, compose_properties,
    get_bracketing_time_samples, get_list_value, get_value, is_abstract, is_active, is_defined,
    property_spec_type, relationship_targets, resolve_field, resolve_specifier,
    resolve_time_samples, type_name, variant_selection,
};
