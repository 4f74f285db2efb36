use crate::change::block::ChangeBlock;
use crate::compose::PrimIndex;
use crate::foundation::core::TimeCode;
use crate::foundation::error::{StageError, StageResult};
use crate::foundation::token::{Token, fields};
use crate::layer::{
    Layer, ListOp, ListOpItem, ListPosition, Reference, SpecType, Specifier, Value,
};
use crate::path::Path;
use crate::resolve;
use crate::schema::{AttributeDef, SchemaFamily, SchemaKind};
use crate::stage::stage::Stage;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

// Bookkeeping fields maintained by the layer itself.
const RESERVED_METADATA: &[&str] = &[
    fields::DEFAULT,
    fields::TIME_SAMPLES,
    fields::PRIM_CHILDREN,
    fields::PROPERTIES,
    fields::SPECIFIER,
];

fn check_metadata_field(field: &str) -> StageResult<()> {
    if field.is_empty() || RESERVED_METADATA.contains(&field) {
        return Err(StageError::coding(format!(
            "'{field}' cannot be authored as metadata"
        )));
    }
    Ok(())
}

/// Handle to a composed prim.
///
/// Handles are cheap to clone and never dangle: every query recomposes on demand, so a
/// handle to a prim that was removed simply reports `is_valid() == false`.
#[derive(Clone, Debug, PartialEq)]
pub struct Prim {
    stage: Stage,
    path: Path,
}

impl Prim {
    pub(crate) fn new(stage: Stage, path: Path) -> Self {
        Self { stage, path }
    }

    /// Owning stage.
    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    /// Prim path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final path element; empty for the pseudo-root.
    pub fn name(&self) -> Token {
        self.path.name().cloned().unwrap_or_else(|| Token::new(""))
    }

    /// Return `true` for `/`.
    pub fn is_pseudo_root(&self) -> bool {
        self.path.is_absolute_root()
    }

    /// Return `true` while the prim exists on the stage.
    pub fn is_valid(&self) -> bool {
        self.stage.get_prim_at_path(&self.path).is_some()
    }

    /// Composed prim index.
    pub fn prim_index(&self) -> Arc<PrimIndex> {
        self.stage.prim_index(&self.path)
    }

    /// Parent prim; `None` for the pseudo-root.
    pub fn parent(&self) -> Option<Prim> {
        self.path.parent().map(|p| Prim::new(self.stage.clone(), p))
    }

    // Edit-target layer with a spec for this prim, creating an `over` when needed.
    fn authoring_layer(&self) -> StageResult<Arc<Layer>> {
        if self.is_pseudo_root() {
            return Err(StageError::coding(
                "the pseudo-root cannot be authored through a prim",
            ));
        }
        if !self.is_valid() {
            return Err(StageError::coding(format!(
                "prim at {} is not valid",
                self.path
            )));
        }
        let layer = self.stage.edit_target();
        if !layer.has_spec(&self.path) {
            layer.create_prim_spec(&self.path, Specifier::Over, "")?;
        }
        Ok(layer)
    }

    /// Composed type name; empty when untyped.
    pub fn type_name(&self) -> Token {
        resolve::type_name(&self.prim_index())
    }

    /// Author the type name.
    pub fn set_type_name(&self, type_name: &str) -> StageResult<()> {
        let _block = ChangeBlock::new();
        let layer = self.authoring_layer()?;
        if type_name.is_empty() {
            layer.erase_field(&self.path, fields::TYPE_NAME)?;
            return Ok(());
        }
        layer.set_field(&self.path, fields::TYPE_NAME, Token::new(type_name))
    }

    /// Composed specifier.
    pub fn specifier(&self) -> Option<Specifier> {
        resolve::resolve_specifier(&self.prim_index())
    }

    /// Return `true` when some layer defines the prim (`def` or `class`).
    pub fn is_defined(&self) -> bool {
        resolve::is_defined(&self.prim_index())
    }

    /// Return `true` for class prims.
    pub fn is_abstract(&self) -> bool {
        resolve::is_abstract(&self.prim_index())
    }

    /// Composed activation.
    pub fn is_active(&self) -> bool {
        resolve::is_active(&self.prim_index())
    }

    /// Author activation.
    pub fn set_active(&self, active: bool) -> StageResult<()> {
        let _block = ChangeBlock::new();
        self.authoring_layer()?
            .set_field(&self.path, fields::ACTIVE, active)
    }

    /// Schema kind of the composed type name.
    pub fn schema_kind(&self) -> SchemaKind {
        SchemaKind::from_type_name(self.type_name().as_str())
    }

    /// Return `true` when the prim's schema belongs to `family`.
    pub fn is_a(&self, family: SchemaFamily) -> bool {
        self.schema_kind().is_a(family)
    }

    /// Composed child prims that are active, defined and not abstract, in order.
    pub fn children(&self) -> Vec<Prim> {
        self.all_children()
            .into_iter()
            .filter(|c| {
                let index = c.prim_index();
                resolve::is_active(&index)
                    && resolve::is_defined(&index)
                    && !resolve::is_abstract(&index)
            })
            .collect()
    }

    /// Every composed child prim, in order.
    pub fn all_children(&self) -> Vec<Prim> {
        if !self.is_pseudo_root() && !self.is_active() {
            return Vec::new();
        }
        resolve::compose_children(&self.prim_index())
            .into_iter()
            .filter_map(|name| self.path.append_child(name.as_str()).ok())
            .map(|p| Prim::new(self.stage.clone(), p))
            .collect()
    }

    /// Composed child called `name`.
    pub fn child(&self, name: &str) -> Option<Prim> {
        let path = self.path.append_child(name).ok()?;
        self.stage.get_prim_at_path(&path)
    }

    /// Composed property names, in strength order.
    pub fn property_names(&self) -> Vec<Token> {
        resolve::compose_properties(&self.prim_index())
    }

    /// Attribute handle for `name`; it may not exist yet.
    pub fn get_attribute(&self, name: &str) -> Attribute {
        Attribute {
            prim: self.clone(),
            name: Token::new(name),
        }
    }

    /// Author an attribute spec of `type_name` on the edit target.
    pub fn create_attribute(&self, name: &str, type_name: &str) -> StageResult<Attribute> {
        let path = self.path.append_property(name)?;
        let _block = ChangeBlock::new();
        self.authoring_layer()?
            .create_property_spec(&path, SpecType::Attribute, type_name)?;
        Ok(self.get_attribute(name))
    }

    /// Relationship handle for `name`; it may not exist yet.
    pub fn get_relationship(&self, name: &str) -> Relationship {
        Relationship {
            prim: self.clone(),
            name: Token::new(name),
        }
    }

    /// Author a relationship spec on the edit target.
    pub fn create_relationship(&self, name: &str) -> StageResult<Relationship> {
        let path = self.path.append_property(name)?;
        let _block = ChangeBlock::new();
        self.authoring_layer()?
            .create_property_spec(&path, SpecType::Relationship, "")?;
        Ok(self.get_relationship(name))
    }

    /// Composed metadata value; list ops come back flattened and dictionaries merged.
    pub fn get_metadata(&self, field: &str) -> Option<Value> {
        resolve::get_value(
            &self.prim_index(),
            None,
            field,
            TimeCode::DEFAULT,
            self.stage.interpolation_type(),
        )
    }

    /// Author a metadata field on the edit target.
    pub fn set_metadata(&self, field: &str, value: impl Into<Value>) -> StageResult<()> {
        check_metadata_field(field)?;
        let _block = ChangeBlock::new();
        self.authoring_layer()?.set_field(&self.path, field, value)
    }

    /// Erase a metadata field from the edit target. Returns whether it was authored there.
    pub fn clear_metadata(&self, field: &str) -> StageResult<bool> {
        check_metadata_field(field)?;
        let layer = self.stage.edit_target();
        if !layer.has_spec(&self.path) {
            return Ok(false);
        }
        layer.erase_field(&self.path, field)
    }

    /// Editor for the prim's references.
    pub fn references(&self) -> References {
        ArcEditor::new(self.clone(), fields::REFERENCES)
    }

    /// Editor for the prim's inherit arcs.
    pub fn inherits(&self) -> Inherits {
        ArcEditor::new(self.clone(), fields::INHERITS)
    }

    /// Editor for the prim's specializes arcs.
    pub fn specializes(&self) -> Specializes {
        ArcEditor::new(self.clone(), fields::SPECIALIZES)
    }

    /// Editor for the prim's variant sets.
    pub fn variant_sets(&self) -> VariantSets {
        VariantSets { prim: self.clone() }
    }
}

/// List-op editor for one composition arc field of a prim, writing to the edit target.
#[derive(Clone, Debug)]
pub struct ArcEditor<T> {
    prim: Prim,
    field: &'static str,
    _item: PhantomData<T>,
}

/// Reference arcs of a prim.
pub type References = ArcEditor<Reference>;
/// Inherit arcs of a prim.
pub type Inherits = ArcEditor<Path>;
/// Specializes arcs of a prim.
pub type Specializes = ArcEditor<Path>;

impl<T: ListOpItem> ArcEditor<T> {
    fn new(prim: Prim, field: &'static str) -> Self {
        Self {
            prim,
            field,
            _item: PhantomData,
        }
    }

    /// Prim being edited.
    pub fn prim(&self) -> &Prim {
        &self.prim
    }

    /// List op authored on the edit target.
    pub fn authored(&self) -> Option<ListOp<T>> {
        self.prim
            .stage
            .edit_target()
            .get_field_as_list_op(&self.prim.path, self.field)
    }

    /// Return `true` when any contributing site authors this arc field.
    pub fn has_authored(&self) -> bool {
        self.prim
            .prim_index()
            .sites()
            .any(|(node, layer)| layer.has_field(node.path(), self.field))
    }

    fn edit(&self, f: impl FnOnce(&mut ListOp<T>)) -> StageResult<()> {
        let _block = ChangeBlock::new();
        let layer = self.prim.authoring_layer()?;
        let mut op = layer
            .get_field_as_list_op(&self.prim.path, self.field)
            .unwrap_or_default();
        f(&mut op);
        layer.set_field(&self.prim.path, self.field, T::into_value(op))
    }

    /// Insert `item` at `position`.
    pub fn add(&self, item: T, position: ListPosition) -> StageResult<()> {
        self.edit(|op| op.add(item, position))
    }

    /// Remove `item` here and delete it from weaker opinions.
    pub fn remove(&self, item: &T) -> StageResult<()> {
        self.edit(|op| op.remove(item))
    }

    /// Replace weaker opinions with exactly `items`.
    pub fn set(&self, items: Vec<T>) -> StageResult<()> {
        self.edit(|op| op.set_explicit(items))
    }

    /// Erase the field from the edit target. Returns whether it was authored there.
    pub fn clear(&self) -> StageResult<bool> {
        let layer = self.prim.stage.edit_target();
        if !layer.has_spec(&self.prim.path) {
            return Ok(false);
        }
        layer.erase_field(&self.prim.path, self.field)
    }
}

impl ArcEditor<Reference> {
    /// Reference `prim_path` (or the default prim) of the layer named `asset_path`.
    pub fn add_reference(&self, asset_path: &str, prim_path: Option<Path>) -> StageResult<()> {
        self.add(
            Reference::new(asset_path, prim_path),
            ListPosition::default(),
        )
    }

    /// Reference another prim of this stage's layer stack.
    pub fn add_internal_reference(&self, prim_path: Path) -> StageResult<()> {
        self.add(Reference::internal(prim_path), ListPosition::default())
    }
}

/// Variant set editor of a prim, writing to the edit target.
#[derive(Clone, Debug)]
pub struct VariantSets {
    prim: Prim,
}

impl VariantSets {
    /// Composed variant set names.
    pub fn names(&self) -> Vec<String> {
        resolve::compose_list_op::<Token>(&self.prim.prim_index(), None, fields::VARIANT_SET_NAMES)
            .into_iter()
            .map(|t| t.to_string())
            .collect()
    }

    /// Return `true` when `set` is a composed variant set name.
    pub fn has_variant_set(&self, set: &str) -> bool {
        self.names().iter().any(|n| n == set)
    }

    /// Declare `set` on the edit target.
    pub fn add_variant_set(&self, set: &str) -> StageResult<()> {
        if set.is_empty() {
            return Err(StageError::coding("variant set names cannot be empty"));
        }
        let _block = ChangeBlock::new();
        let layer = self.prim.authoring_layer()?;
        let mut op: ListOp<Token> = layer
            .get_field_as_list_op(&self.prim.path, fields::VARIANT_SET_NAMES)
            .unwrap_or_default();
        let name = Token::new(set);
        if op.applied().contains(&name) {
            return Ok(());
        }
        op.prepend(name);
        layer.set_field(
            &self.prim.path,
            fields::VARIANT_SET_NAMES,
            Value::TokenListOp(op),
        )
    }

    /// Create the spec for `variant` of `set` on the edit target, declaring the set as needed.
    pub fn add_variant(&self, set: &str, variant: &str) -> StageResult<Path> {
        let _block = ChangeBlock::new();
        let layer = self.prim.authoring_layer()?;
        layer.create_variant_spec(&self.prim.path, set, variant)
    }

    /// Variant names of `set` over every contributing site, in strength order.
    pub fn variant_names(&self, set: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for (node, layer) in self.prim.prim_index().sites() {
            for name in layer.variant_names(node.path(), set) {
                if !out.iter().any(|n| n == name.as_str()) {
                    out.push(name.to_string());
                }
            }
        }
        out
    }

    /// Author the selection for `set`, keeping selections of other sets.
    pub fn set_selection(&self, set: &str, variant: &str) -> StageResult<()> {
        let _block = ChangeBlock::new();
        let layer = self.prim.authoring_layer()?;
        let mut selections: BTreeMap<String, Value> = layer
            .get_field(&self.prim.path, fields::VARIANT_SELECTION)
            .and_then(|v| v.as_dictionary().cloned())
            .unwrap_or_default();
        selections.insert(set.to_string(), Value::String(variant.to_string()));
        layer.set_field(
            &self.prim.path,
            fields::VARIANT_SELECTION,
            Value::Dictionary(selections),
        )
    }

    /// Composed selection for `set`.
    pub fn selection(&self, set: &str) -> Option<String> {
        resolve::variant_selection(&self.prim.prim_index(), set)
    }
}

/// Handle to a composed attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    prim: Prim,
    name: Token,
}

impl Attribute {
    /// Owning prim.
    pub fn prim(&self) -> &Prim {
        &self.prim
    }

    /// Attribute name.
    pub fn name(&self) -> &Token {
        &self.name
    }

    /// Property path, when the name forms one.
    pub fn path(&self) -> Option<Path> {
        self.prim.path.append_property(self.name.as_str()).ok()
    }

    fn builtin(&self) -> Option<&'static AttributeDef> {
        self.prim.schema_kind().attribute(self.name.as_str())
    }

    /// Return `true` when some layer defines the attribute or its prim's schema declares it.
    pub fn is_valid(&self) -> bool {
        resolve::property_spec_type(&self.prim.prim_index(), &self.name)
            == Some(SpecType::Attribute)
            || self.builtin().is_some()
    }

    /// Value type name.
    pub fn type_name(&self) -> Option<Token> {
        resolve::resolve_field(&self.prim.prim_index(), Some(&self.name), fields::TYPE_NAME)
            .and_then(|v| v.as_token())
            .or_else(|| self.builtin().map(|d| Token::new(d.type_name)))
    }

    /// Composed value at `time`, falling back to the schema's value.
    pub fn get(&self, time: TimeCode) -> Option<Value> {
        resolve::get_value(
            &self.prim.prim_index(),
            Some(&self.name),
            fields::DEFAULT,
            time,
            self.prim.stage.interpolation_type(),
        )
        .or_else(|| self.builtin()?.fallback())
    }

    /// Return `true` when a value is authored or a fallback exists.
    pub fn has_value(&self) -> bool {
        self.has_authored_value() || self.builtin().is_some_and(|d| d.fallback().is_some())
    }

    /// Return `true` when some site authors a default or time samples.
    pub fn has_authored_value(&self) -> bool {
        let index = self.prim.prim_index();
        index.sites().any(|(node, layer)| {
            node.path()
                .append_property(self.name.as_str())
                .is_ok_and(|p| {
                    layer.has_field(&p, fields::DEFAULT)
                        || layer.time_samples(&p).is_some_and(|ts| !ts.is_empty())
                })
        })
    }

    /// Stage-time sample times.
    pub fn time_samples(&self) -> Vec<f64> {
        resolve::resolve_time_samples(&self.prim.prim_index(), Some(&self.name))
            .map(|ts| ts.times())
            .unwrap_or_default()
    }

    /// Return `true` when more than one time sample contributes.
    pub fn value_might_be_time_varying(&self) -> bool {
        self.time_samples().len() > 1
    }

    /// Stage-time samples bracketing `time`; `None` when the value is not sampled.
    pub fn get_bracketing_time_samples(&self, time: f64) -> Option<(f64, f64)> {
        resolve::get_bracketing_time_samples(&self.prim.prim_index(), Some(&self.name), time)
    }

    // Edit-target layer with a spec for this attribute.
    fn authoring_layer(&self) -> StageResult<(Arc<Layer>, Path)> {
        let path = self.prim.path.append_property(self.name.as_str())?;
        let type_name = self.type_name();
        let layer = self.prim.authoring_layer()?;
        if !layer.has_spec(&path) {
            let type_name = type_name.as_ref().map(Token::as_str).unwrap_or("");
            layer.create_property_spec(&path, SpecType::Attribute, type_name)?;
        }
        Ok((layer, path))
    }

    /// Author `value` as the default (`TimeCode::DEFAULT`) or as a time sample.
    pub fn set(&self, value: impl Into<Value>, time: TimeCode) -> StageResult<()> {
        let _block = ChangeBlock::new();
        let (layer, path) = self.authoring_layer()?;
        match time.value() {
            None => layer.set_field(&path, fields::DEFAULT, value),
            Some(t) => layer.set_time_sample(&path, t, value),
        }
    }

    /// Erase the default and time samples from the edit target.
    pub fn clear(&self) -> StageResult<bool> {
        let Some(path) = self.path() else {
            return Ok(false);
        };
        let layer = self.prim.stage.edit_target();
        if !layer.has_spec(&path) {
            return Ok(false);
        }
        let _block = ChangeBlock::new();
        let had_default = layer.erase_field(&path, fields::DEFAULT)?;
        let had_samples = layer.erase_field(&path, fields::TIME_SAMPLES)?;
        Ok(had_default || had_samples)
    }

    /// Composed attribute metadata.
    pub fn get_metadata(&self, field: &str) -> Option<Value> {
        resolve::get_value(
            &self.prim.prim_index(),
            Some(&self.name),
            field,
            TimeCode::DEFAULT,
            self.prim.stage.interpolation_type(),
        )
    }

    /// Author attribute metadata on the edit target.
    pub fn set_metadata(&self, field: &str, value: impl Into<Value>) -> StageResult<()> {
        check_metadata_field(field)?;
        let _block = ChangeBlock::new();
        let (layer, path) = self.authoring_layer()?;
        layer.set_field(&path, field, value)
    }
}

/// Handle to a composed relationship.
#[derive(Clone, Debug, PartialEq)]
pub struct Relationship {
    prim: Prim,
    name: Token,
}

impl Relationship {
    /// Owning prim.
    pub fn prim(&self) -> &Prim {
        &self.prim
    }

    /// Relationship name.
    pub fn name(&self) -> &Token {
        &self.name
    }

    /// Return `true` when some layer defines the relationship.
    pub fn is_valid(&self) -> bool {
        resolve::property_spec_type(&self.prim.prim_index(), &self.name)
            == Some(SpecType::Relationship)
    }

    /// Composed targets in stage namespace.
    pub fn targets(&self) -> Vec<Path> {
        resolve::relationship_targets(&self.prim.prim_index(), &self.name)
    }

    fn edit(&self, f: impl FnOnce(&mut ListOp<Path>)) -> StageResult<()> {
        let path = self.prim.path.append_property(self.name.as_str())?;
        let _block = ChangeBlock::new();
        let layer = self.prim.authoring_layer()?;
        if !layer.has_spec(&path) {
            layer.create_property_spec(&path, SpecType::Relationship, "")?;
        }
        let mut op: ListOp<Path> = layer
            .get_field_as_list_op(&path, fields::TARGET_PATHS)
            .unwrap_or_default();
        f(&mut op);
        layer.set_field(&path, fields::TARGET_PATHS, Value::PathListOp(op))
    }

    /// Add `target` at the back of the prepend list.
    pub fn add_target(&self, target: Path) -> StageResult<()> {
        self.edit(|op| op.prepend(target))
    }

    /// Remove `target` here and delete it from weaker opinions.
    pub fn remove_target(&self, target: &Path) -> StageResult<()> {
        self.edit(|op| op.remove(target))
    }

    /// Replace every weaker opinion with exactly `targets`.
    pub fn set_targets(&self, targets: Vec<Path>) -> StageResult<()> {
        self.edit(|op| op.set_explicit(targets))
    }

    /// Erase targets from the edit target. Returns whether any were authored there.
    pub fn clear_targets(&self) -> StageResult<bool> {
        let Ok(path) = self.prim.path.append_property(self.name.as_str()) else {
            return Ok(false);
        };
        let layer = self.prim.stage.edit_target();
        if !layer.has_spec(&path) {
            return Ok(false);
        }
        layer.erase_field(&path, fields::TARGET_PATHS)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/stage/prim.rs"]
mod tests;
