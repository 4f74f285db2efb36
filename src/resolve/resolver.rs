use crate::compose::{Node, PrimIndex};
use crate::foundation::core::{InterpolationType, TimeCode};
use crate::foundation::token::{Token, fields};
use crate::layer::{Layer, ListOp, ListOpItem, Reference, SpecType, Specifier, TimeSamples, Value};
use crate::path::Path;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One place an opinion can come from: a node, one layer of its stack, and the site path
/// of the queried object in that node's namespace.
struct Site<'a> {
    node: &'a Node,
    layer: &'a Arc<Layer>,
    path: Path,
}

// Strongest first. Property sites that cannot be formed (never for valid names) are skipped.
fn sites<'a>(index: &'a PrimIndex, property: Option<&Token>) -> Vec<Site<'a>> {
    let mut out = Vec::with_capacity(index.nodes().len());
    for (node, layer) in index.sites() {
        let path = match property {
            None => node.path().clone(),
            Some(name) => match node.path().append_property(name.as_str()) {
                Ok(p) => p,
                Err(_) => continue,
            },
        };
        out.push(Site { node, layer, path });
    }
    out
}

fn merge_under(strong: &mut BTreeMap<String, Value>, weak: &BTreeMap<String, Value>) {
    for (k, v) in weak {
        match (strong.get_mut(k), v) {
            (Some(Value::Dictionary(s)), Value::Dictionary(w)) => merge_under(s, w),
            (Some(_), _) => {}
            (None, _) => {
                strong.insert(k.clone(), v.clone());
            }
        }
    }
}

/// Strongest opinion for `field` on the prim (`property == None`) or one of its properties.
///
/// Dictionary values merge key-wise with weaker dictionaries; stronger keys win.
pub fn resolve_field(index: &PrimIndex, property: Option<&Token>, field: &str) -> Option<Value> {
    let all = sites(index, property);
    let mut iter = all.iter().filter_map(|s| s.layer.get_field(&s.path, field));
    let strongest = iter.next()?;
    let Value::Dictionary(mut dict) = strongest else {
        return Some(strongest);
    };
    for weaker in iter {
        if let Value::Dictionary(w) = weaker {
            merge_under(&mut dict, &w);
        }
    }
    Some(Value::Dictionary(dict))
}

fn compose_mapped<T: ListOpItem>(
    index: &PrimIndex,
    property: Option<&Token>,
    field: &str,
    map: impl Fn(&Node, &T) -> Option<T>,
) -> Vec<T> {
    let mut out = Vec::new();
    for s in sites(index, property).iter().rev() {
        if let Some(op) = s.layer.get_field_as_list_op::<T>(&s.path, field) {
            op.filter_map_items(|item| map(s.node, item))
                .apply(&mut out);
        }
    }
    out
}

/// Flatten a list-op valued field across every site, weakest to strongest.
pub fn compose_list_op<T: ListOpItem>(
    index: &PrimIndex,
    property: Option<&Token>,
    field: &str,
) -> Vec<T> {
    compose_mapped(index, property, field, |_, item: &T| Some(item.clone()))
}

/// Flatten a path list op, translating each site's paths into the stage namespace.
/// Paths outside the namespace a node maps are dropped.
pub fn compose_path_list_op(index: &PrimIndex, property: Option<&Token>, field: &str) -> Vec<Path> {
    compose_mapped(index, property, field, |node, p: &Path| {
        node.map_to_root().map_source_to_target(p)
    })
}

/// Flattened value of a list-valued field, or `None` when `field` is not list-op valued.
pub fn get_list_value(index: &PrimIndex, property: Option<&Token>, field: &str) -> Option<Value> {
    let kind = sites(index, property)
        .iter()
        .find_map(|s| s.layer.get_field(&s.path, field))?;
    match kind {
        Value::TokenListOp(_) => Some(Value::TokenArray(compose_list_op(index, property, field))),
        Value::PathListOp(_) => Some(Value::PathArray(compose_path_list_op(
            index, property, field,
        ))),
        Value::ReferenceListOp(_) => {
            Some(Value::ReferenceListOp(ListOp::explicit(compose_list_op::<
                Reference,
            >(
                index, property, field,
            ))))
        }
        _ => None,
    }
}

/// Value of `field` at `time`.
///
/// `default` reads attribute values: at a numeric time the strongest site holding either
/// time samples or a default wins, samples first within a site. Other fields resolve to the
/// strongest opinion; list ops come back flattened.
pub fn get_value(
    index: &PrimIndex,
    property: Option<&Token>,
    field: &str,
    time: TimeCode,
    interpolation: InterpolationType,
) -> Option<Value> {
    if field == fields::DEFAULT {
        return attribute_value(index, property, time, interpolation);
    }
    get_list_value(index, property, field).or_else(|| resolve_field(index, property, field))
}

fn attribute_value(
    index: &PrimIndex,
    property: Option<&Token>,
    time: TimeCode,
    interpolation: InterpolationType,
) -> Option<Value> {
    for s in sites(index, property) {
        if let Some(t) = time.value() {
            if let Some(samples) = s.layer.time_samples(&s.path).filter(|ts| !ts.is_empty()) {
                let local = s.node.map_to_root().time_offset().apply_inverse(t);
                return samples.sample(local, interpolation);
            }
        }
        if let Some(v) = s.layer.get_field(&s.path, fields::DEFAULT) {
            return Some(v);
        }
    }
    None
}

/// Time samples of the site that wins value resolution, retimed into stage time.
///
/// `None` when a stronger site authors only a default, or nothing is authored.
pub fn resolve_time_samples(index: &PrimIndex, property: Option<&Token>) -> Option<TimeSamples> {
    for s in sites(index, property) {
        if let Some(samples) = s.layer.time_samples(&s.path).filter(|ts| !ts.is_empty()) {
            let offset = s.node.map_to_root().time_offset();
            return Some(samples.map_times(|t| offset.apply(t)));
        }
        if s.layer.has_field(&s.path, fields::DEFAULT) {
            return None;
        }
    }
    None
}

/// Stage-time samples bracketing `time`; `None` when the value is not time varying.
pub fn get_bracketing_time_samples(
    index: &PrimIndex,
    property: Option<&Token>,
    time: f64,
) -> Option<(f64, f64)> {
    resolve_time_samples(index, property)?.bracket(time)
}

/// Child prim names: union over sites in strength order, then the strongest `primOrder`.
pub fn compose_children(index: &PrimIndex) -> Vec<Token> {
    let mut names: Vec<Token> = Vec::new();
    for s in sites(index, None) {
        for name in s.layer.prim_children(&s.path) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    if let Some(order) = resolve_field(index, None, fields::PRIM_ORDER)
        .as_ref()
        .and_then(Value::as_token_array)
    {
        ListOp {
            ordered: order.to_vec(),
            ..ListOp::default()
        }
        .apply(&mut names);
    }
    names
}

/// Property names: union over sites in strength order.
pub fn compose_properties(index: &PrimIndex) -> Vec<Token> {
    let mut names: Vec<Token> = Vec::new();
    for s in sites(index, None) {
        for name in s.layer.properties(&s.path) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// Spec type of the strongest site defining property `name`.
pub fn property_spec_type(index: &PrimIndex, name: &Token) -> Option<SpecType> {
    sites(index, Some(name))
        .iter()
        .find_map(|s| s.layer.spec_type(&s.path))
}

/// Composed targets of relationship `name`, in stage namespace.
pub fn relationship_targets(index: &PrimIndex, name: &Token) -> Vec<Path> {
    compose_path_list_op(index, Some(name), fields::TARGET_PATHS)
}

/// Strongest defining specifier: the first `def` or `class` in strength order, else `over`.
/// `None` when no site has a spec.
pub fn resolve_specifier(index: &PrimIndex) -> Option<Specifier> {
    let mut seen_over = false;
    for s in sites(index, None) {
        match s
            .layer
            .get_field(&s.path, fields::SPECIFIER)
            .and_then(|v| v.as_specifier())
        {
            Some(Specifier::Over) => seen_over = true,
            Some(spec) => return Some(spec),
            None => {
                if s.layer.has_spec(&s.path) {
                    seen_over = true;
                }
            }
        }
    }
    seen_over.then_some(Specifier::Over)
}

/// Return `true` when the prim is `def` or `class` somewhere.
pub fn is_defined(index: &PrimIndex) -> bool {
    matches!(
        resolve_specifier(index),
        Some(Specifier::Def | Specifier::Class)
    )
}

/// Return `true` for class prims.
pub fn is_abstract(index: &PrimIndex) -> bool {
    resolve_specifier(index) == Some(Specifier::Class)
}

/// Composed `active` flag; prims are active unless an opinion says otherwise.
pub fn is_active(index: &PrimIndex) -> bool {
    resolve_field(index, None, fields::ACTIVE)
        .and_then(|v| v.as_bool())
        .unwrap_or(true)
}

/// Composed type name; empty when untyped.
pub fn type_name(index: &PrimIndex) -> Token {
    resolve_field(index, None, fields::TYPE_NAME)
        .and_then(|v| v.as_token())
        .unwrap_or_else(|| Token::new(""))
}

/// Composed selection for variant set `set`.
pub fn variant_selection(index: &PrimIndex, set: &str) -> Option<String> {
    match resolve_field(index, None, fields::VARIANT_SELECTION)? {
        Value::Dictionary(d) => d.get(set)?.as_str().map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
#[path = "../../tests/unit/resolve/resolver.rs"]
mod tests;
