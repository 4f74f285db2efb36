use crate::change::block::{ChangeBlock, ChangeListener, EditKind, RawEdit, record};
use crate::foundation::error::{StageError, StageResult};
use crate::foundation::token::{Token, fields};
use crate::layer::list_op::{ListOp, ListOpItem};
use crate::layer::registry;
use crate::layer::value::{Specifier, TimeSamples, Value};
use crate::path::Path;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

/// Process-unique layer identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(u64);

impl LayerId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Kind of object a spec describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecType {
    /// The layer's root `/`, carrying layer metadata.
    PseudoRoot,
    /// Prim opinions.
    Prim,
    /// Attribute opinions.
    Attribute,
    /// Relationship opinions.
    Relationship,
    /// Opinions inside one variant of a variant set.
    Variant,
}

/// Sparse set of field opinions at one path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Spec {
    /// Object kind.
    pub spec_type: SpecType,
    /// Authored fields.
    #[serde(default)]
    pub fields: BTreeMap<Token, Value>,
}

impl Spec {
    fn new(spec_type: SpecType) -> Self {
        Self {
            spec_type,
            fields: BTreeMap::new(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct SpecEntry {
    path: Path,
    spec_type: SpecType,
    #[serde(default)]
    fields: BTreeMap<Token, Value>,
}

#[derive(Serialize, Deserialize)]
struct LayerSnapshot {
    #[serde(default)]
    identifier: String,
    specs: Vec<SpecEntry>,
}

type SpecMap = BTreeMap<Path, Spec>;
type PendingEdits = Vec<(Path, EditKind)>;

fn fresh_specs() -> SpecMap {
    let mut specs = BTreeMap::new();
    specs.insert(Path::absolute_root(), Spec::new(SpecType::PseudoRoot));
    specs
}

fn token_list(spec: &Spec, field: &str) -> Vec<Token> {
    spec.fields
        .get(field)
        .and_then(Value::as_token_array)
        .map(<[Token]>::to_vec)
        .unwrap_or_default()
}

fn push_name(spec: &mut Spec, field: &str, name: &Token) {
    let mut names = token_list(spec, field);
    if !names.contains(name) {
        names.push(name.clone());
        spec.fields
            .insert(Token::new(field), Value::TokenArray(names));
    }
}

fn remove_name(spec: &mut Spec, field: &str, name: &Token) {
    let mut names = token_list(spec, field);
    let before = names.len();
    names.retain(|n| n != name);
    if names.len() == before {
        return;
    }
    if names.is_empty() {
        spec.fields.remove(field);
    } else {
        spec.fields
            .insert(Token::new(field), Value::TokenArray(names));
    }
}

/// A sparse, mutable container of scene opinions keyed by path.
///
/// Layers are shared (`Arc`) between every stage that uses them. Each mutation opens an
/// implicit [`ChangeBlock`] and records a [`RawEdit`], so listening stages are told about it
/// when the outermost block closes.
pub struct Layer {
    id: LayerId,
    identifier: String,
    anonymous: bool,
    this: Weak<Layer>,
    specs: RwLock<SpecMap>,
    listeners: Mutex<Vec<Weak<dyn ChangeListener>>>,
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.id)
            .field("identifier", &self.identifier)
            .finish()
    }
}

impl Drop for Layer {
    fn drop(&mut self) {
        registry::unregister(&self.identifier, self as *const Layer);
    }
}

impl Layer {
    fn build(identifier: String, anonymous: bool) -> Arc<Layer> {
        Arc::new_cyclic(|this| Layer {
            id: LayerId::next(),
            identifier,
            anonymous,
            this: this.clone(),
            specs: RwLock::new(fresh_specs()),
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Create a new anonymous layer; `tag` only decorates its identifier.
    pub fn create_anonymous(tag: &str) -> Arc<Layer> {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let identifier = format!("anon:{n:08x}:{tag}");
        let build_id = identifier.clone();
        registry::register_new(&identifier, move || Layer::build(build_id, true))
            .unwrap_or_else(|_| Layer::build(identifier, true))
    }

    /// Create a new, empty, named layer.
    ///
    /// Fails when a live layer already uses `identifier`, or when the identifier is empty
    /// or uses the reserved `anon:` prefix.
    pub fn create_new(identifier: &str) -> StageResult<Arc<Layer>> {
        if identifier.is_empty() || identifier.starts_with("anon:") {
            return Err(StageError::validation(format!(
                "'{identifier}' is not a usable layer identifier"
            )));
        }
        let id = identifier.to_string();
        registry::register_new(identifier, move || Layer::build(id, false))
    }

    /// Live layer named `identifier`.
    pub fn find(identifier: &str) -> Option<Arc<Layer>> {
        registry::find(identifier)
    }

    /// Process-unique identity.
    pub fn id(&self) -> LayerId {
        self.id
    }

    /// Identifier used by references and sublayer lists.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Return `true` for layers made by [`Layer::create_anonymous`].
    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    fn read(&self) -> RwLockReadGuard<'_, SpecMap> {
        self.specs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SpecMap> {
        self.specs.write().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, edits: PendingEdits) {
        let Some(me) = self.this.upgrade() else {
            return;
        };
        for (path, kind) in edits {
            record(RawEdit {
                layer: Arc::clone(&me),
                path,
                kind,
            });
        }
    }

    fn missing_spec(&self, path: &Path) -> StageError {
        StageError::coding(format!("no spec at {path} in layer '{}'", self.identifier))
    }

    pub(crate) fn add_listener(&self, listener: Weak<dyn ChangeListener>) {
        let mut ls = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        if !ls.iter().any(|l| Weak::ptr_eq(l, &listener)) {
            ls.push(listener);
        }
    }

    pub(crate) fn remove_listener(&self, listener: &Weak<dyn ChangeListener>) {
        let mut ls = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        ls.retain(|l| !Weak::ptr_eq(l, listener));
    }

    /// Live listeners, pruning dropped ones.
    pub(crate) fn listeners(&self) -> Vec<Arc<dyn ChangeListener>> {
        let mut ls = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        ls.retain(|l| l.strong_count() > 0);
        ls.iter().filter_map(Weak::upgrade).collect()
    }

    /// Return `true` when a spec exists at `path`.
    pub fn has_spec(&self, path: &Path) -> bool {
        self.read().contains_key(path)
    }

    /// Spec type at `path`.
    pub fn spec_type(&self, path: &Path) -> Option<SpecType> {
        self.read().get(path).map(|s| s.spec_type)
    }

    /// Copy of the spec at `path`.
    pub fn get_spec(&self, path: &Path) -> Option<Spec> {
        self.read().get(path).cloned()
    }

    /// Authored value of `field` at `path`.
    pub fn get_field(&self, path: &Path, field: &str) -> Option<Value> {
        self.read().get(path)?.fields.get(field).cloned()
    }

    /// Return `true` when `field` is authored at `path`.
    pub fn has_field(&self, path: &Path, field: &str) -> bool {
        self.read()
            .get(path)
            .is_some_and(|s| s.fields.contains_key(field))
    }

    /// Names of the fields authored at `path`.
    pub fn list_fields(&self, path: &Path) -> Vec<Token> {
        self.read()
            .get(path)
            .map(|s| s.fields.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Un-flattened list op authored for `field` at `path`.
    pub fn get_field_as_list_op<T: ListOpItem>(
        &self,
        path: &Path,
        field: &str,
    ) -> Option<ListOp<T>> {
        let specs = self.read();
        let value = specs.get(path)?.fields.get(field)?;
        T::list_op(value).cloned()
    }

    /// Author `value` for `field` at `path`. Writing an identical value records nothing.
    #[tracing::instrument(level = "trace", skip(self, value), fields(layer = %self.identifier))]
    pub fn set_field(&self, path: &Path, field: &str, value: impl Into<Value>) -> StageResult<()> {
        let value = value.into();
        if field == fields::TIME_SAMPLES && !matches!(value, Value::TimeSamples(_)) {
            return Err(StageError::validation(format!(
                "field '{field}' needs time samples, got {}",
                value.type_name()
            )));
        }

        let _block = ChangeBlock::new();
        let old_present = {
            let mut specs = self.write();
            let spec = specs.get_mut(path).ok_or_else(|| self.missing_spec(path))?;
            if spec.fields.get(field) == Some(&value) {
                return Ok(());
            }
            spec.fields.insert(Token::new(field), value).is_some()
        };
        self.emit(vec![(
            path.clone(),
            EditKind::Field {
                field: Token::new(field),
                old_present,
                new_present: true,
            },
        )]);
        Ok(())
    }

    /// Remove the opinion for `field` at `path`; returns whether one existed.
    pub fn erase_field(&self, path: &Path, field: &str) -> StageResult<bool> {
        let _block = ChangeBlock::new();
        let removed = {
            let mut specs = self.write();
            let spec = specs.get_mut(path).ok_or_else(|| self.missing_spec(path))?;
            spec.fields.remove(field).is_some()
        };
        if removed {
            self.emit(vec![(
                path.clone(),
                EditKind::Field {
                    field: Token::new(field),
                    old_present: true,
                    new_present: false,
                },
            )]);
        }
        Ok(removed)
    }

    // Make sure a prim or variant spec exists at `path`, creating `over` ancestors.
    fn ensure_spec(
        &self,
        specs: &mut SpecMap,
        path: &Path,
        edits: &mut PendingEdits,
    ) -> StageResult<()> {
        if specs.contains_key(path) {
            return Ok(());
        }
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        self.ensure_spec(specs, &parent, edits)?;

        if let Some((set, _)) = path.variant_selection() {
            let set = set.clone();
            specs.insert(path.clone(), Spec::new(SpecType::Variant));
            if let Some(owner) = specs.get_mut(&parent) {
                let mut op: ListOp<Token> = owner
                    .fields
                    .get(fields::VARIANT_SET_NAMES)
                    .and_then(Token::list_op)
                    .cloned()
                    .unwrap_or_default();
                if !op.applied().contains(&set) {
                    let old_present = owner.fields.contains_key(fields::VARIANT_SET_NAMES);
                    op.add(set, crate::layer::list_op::ListPosition::BackOfPrependList);
                    owner.fields.insert(
                        Token::new(fields::VARIANT_SET_NAMES),
                        Value::TokenListOp(op),
                    );
                    edits.push((
                        parent.clone(),
                        EditKind::Field {
                            field: Token::new(fields::VARIANT_SET_NAMES),
                            old_present,
                            new_present: true,
                        },
                    ));
                }
            }
        } else if path.is_prim_path() {
            let mut spec = Spec::new(SpecType::Prim);
            spec.fields.insert(
                Token::new(fields::SPECIFIER),
                Value::Specifier(Specifier::Over),
            );
            specs.insert(path.clone(), spec);
            if let (Some(owner), Some(name)) = (specs.get_mut(&parent), path.name()) {
                push_name(owner, fields::PRIM_CHILDREN, name);
            }
        } else {
            return Err(StageError::coding(format!(
                "cannot create a namespace parent at {path}"
            )));
        }
        edits.push((path.clone(), EditKind::SpecAdded));
        Ok(())
    }

    /// Create (or update) the prim spec at `path`.
    ///
    /// Missing ancestors are created as `over` specs. On an existing spec the specifier and
    /// a non-empty `type_name` are re-authored.
    pub fn create_prim_spec(
        &self,
        path: &Path,
        specifier: Specifier,
        type_name: &str,
    ) -> StageResult<()> {
        if !path.is_prim_path() {
            return Err(StageError::coding(format!("{path} is not a prim path")));
        }
        let _block = ChangeBlock::new();
        let mut edits = PendingEdits::new();
        {
            let mut specs = self.write();
            let existed = specs.contains_key(path);
            self.ensure_spec(&mut specs, path, &mut edits)?;
            let spec = specs.get_mut(path).ok_or_else(|| self.missing_spec(path))?;

            let mut author = |field: &str, value: Value| {
                if spec.fields.get(field) != Some(&value) {
                    let old_present = spec.fields.insert(Token::new(field), value).is_some();
                    if existed {
                        edits.push((
                            path.clone(),
                            EditKind::Field {
                                field: Token::new(field),
                                old_present,
                                new_present: true,
                            },
                        ));
                    }
                }
            };
            author(fields::SPECIFIER, Value::Specifier(specifier));
            if !type_name.is_empty() {
                author(fields::TYPE_NAME, Value::Token(Token::new(type_name)));
            }
        }
        self.emit(edits);
        Ok(())
    }

    /// Create a property spec. The owning prim (or variant) spec must already exist.
    pub fn create_property_spec(
        &self,
        path: &Path,
        spec_type: SpecType,
        type_name: &str,
    ) -> StageResult<()> {
        if !path.is_property_path() {
            return Err(StageError::coding(format!("{path} is not a property path")));
        }
        if !matches!(spec_type, SpecType::Attribute | SpecType::Relationship) {
            return Err(StageError::coding(format!(
                "{spec_type:?} is not a property spec type"
            )));
        }
        let owner = path.prim_path();
        let _block = ChangeBlock::new();
        {
            let mut specs = self.write();
            if let Some(existing) = specs.get(path) {
                if existing.spec_type == spec_type {
                    return Ok(());
                }
                return Err(StageError::coding(format!(
                    "{path} already exists as {:?}",
                    existing.spec_type
                )));
            }
            let owner_spec = specs
                .get_mut(&owner)
                .ok_or_else(|| self.missing_spec(&owner))?;
            if let Some(name) = path.name() {
                push_name(owner_spec, fields::PROPERTIES, name);
            }
            let mut spec = Spec::new(spec_type);
            if spec_type == SpecType::Attribute && !type_name.is_empty() {
                spec.fields.insert(
                    Token::new(fields::TYPE_NAME),
                    Value::Token(Token::new(type_name)),
                );
            }
            specs.insert(path.clone(), spec);
        }
        self.emit(vec![(path.clone(), EditKind::SpecAdded)]);
        Ok(())
    }

    /// Create the spec for `variant` of `set` on `prim_path`, returning its path.
    pub fn create_variant_spec(
        &self,
        prim_path: &Path,
        set: &str,
        variant: &str,
    ) -> StageResult<Path> {
        let path = prim_path.append_variant_selection(set, variant)?;
        let _block = ChangeBlock::new();
        let mut edits = PendingEdits::new();
        {
            let mut specs = self.write();
            self.ensure_spec(&mut specs, &path, &mut edits)?;
        }
        self.emit(edits);
        Ok(path)
    }

    /// Remove the spec at `path` with everything below it. Returns `false` when absent.
    pub fn remove_spec(&self, path: &Path) -> StageResult<bool> {
        if path.is_absolute_root() {
            return Err(StageError::coding("the pseudo-root spec cannot be removed"));
        }
        let _block = ChangeBlock::new();
        {
            let mut specs = self.write();
            if !specs.contains_key(path) {
                return Ok(false);
            }
            let doomed: Vec<Path> = specs
                .range(path.clone()..)
                .map(|(p, _)| p.clone())
                .take_while(|p| p.has_prefix(path))
                .collect();
            for p in &doomed {
                specs.remove(p);
            }
            if let (Some(parent), Some(name)) = (path.parent(), path.name()) {
                if let Some(owner) = specs.get_mut(&parent) {
                    let list = if path.is_property_path() {
                        fields::PROPERTIES
                    } else {
                        fields::PRIM_CHILDREN
                    };
                    remove_name(owner, list, name);
                }
            }
        }
        self.emit(vec![(path.clone(), EditKind::SpecRemoved)]);
        Ok(true)
    }

    /// Authored child prim names at `path`, in authored order.
    pub fn prim_children(&self, path: &Path) -> Vec<Token> {
        self.read()
            .get(path)
            .map(|s| token_list(s, fields::PRIM_CHILDREN))
            .unwrap_or_default()
    }

    /// Authored property names at `path`, in authored order.
    pub fn properties(&self, path: &Path) -> Vec<Token> {
        self.read()
            .get(path)
            .map(|s| token_list(s, fields::PROPERTIES))
            .unwrap_or_default()
    }

    /// Variant names with specs for `set` on `prim_path`.
    pub fn variant_names(&self, prim_path: &Path, set: &str) -> Vec<Token> {
        self.read()
            .range(prim_path.clone()..)
            .map(|(p, _)| p)
            .take_while(|p| p.has_prefix(prim_path))
            .filter(|p| p.parent().as_ref() == Some(prim_path))
            .filter_map(|p| {
                p.variant_selection()
                    .filter(|(s, _)| s.as_str() == set)
                    .map(|(_, v)| v.clone())
            })
            .collect()
    }

    /// Authored time samples at `path`.
    pub fn time_samples(&self, path: &Path) -> Option<TimeSamples> {
        self.read()
            .get(path)?
            .fields
            .get(fields::TIME_SAMPLES)?
            .as_time_samples()
            .cloned()
    }

    /// Author one time sample at `path`.
    pub fn set_time_sample(
        &self,
        path: &Path,
        time: f64,
        value: impl Into<Value>,
    ) -> StageResult<()> {
        let mut samples = self.time_samples(path).unwrap_or_default();
        samples.insert(time, value.into());
        self.set_field(path, fields::TIME_SAMPLES, Value::TimeSamples(samples))
    }

    /// Sublayer identifiers, strongest first.
    pub fn sublayers(&self) -> Vec<String> {
        match self.get_field(&Path::absolute_root(), fields::SUB_LAYERS) {
            Some(Value::StringArray(v)) => v,
            _ => Vec::new(),
        }
    }

    /// Replace the sublayer list.
    pub fn set_sublayers(&self, identifiers: Vec<String>) -> StageResult<()> {
        let root = Path::absolute_root();
        if identifiers.is_empty() {
            self.erase_field(&root, fields::SUB_LAYERS)?;
            return Ok(());
        }
        self.set_field(&root, fields::SUB_LAYERS, Value::StringArray(identifiers))
    }

    /// Name of the root prim referenced when a reference names no prim.
    pub fn default_prim(&self) -> Option<Token> {
        self.get_field(&Path::absolute_root(), fields::DEFAULT_PRIM)?
            .as_token()
            .filter(|t| !t.is_empty())
    }

    /// Set the default prim; an empty name clears it.
    pub fn set_default_prim(&self, name: &str) -> StageResult<()> {
        let root = Path::absolute_root();
        if name.is_empty() {
            self.erase_field(&root, fields::DEFAULT_PRIM)?;
            return Ok(());
        }
        self.set_field(&root, fields::DEFAULT_PRIM, Value::Token(Token::new(name)))
    }

    /// Every spec path in namespace order.
    pub fn traverse(&self) -> Vec<Path> {
        self.read().keys().cloned().collect()
    }

    /// JSON snapshot of the layer content.
    pub fn export_to_json(&self) -> StageResult<String> {
        let snapshot = LayerSnapshot {
            identifier: self.identifier.clone(),
            specs: self
                .read()
                .iter()
                .map(|(path, spec)| SpecEntry {
                    path: path.clone(),
                    spec_type: spec.spec_type,
                    fields: spec.fields.clone(),
                })
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&snapshot)?)
    }

    /// Replace the layer content with a JSON snapshot.
    ///
    /// The snapshot must be namespace-complete: every spec's parent has a spec too.
    pub fn import_json(&self, json: &str) -> StageResult<()> {
        let snapshot: LayerSnapshot = serde_json::from_str(json)?;
        let mut specs = fresh_specs();
        for entry in snapshot.specs {
            specs.insert(
                entry.path,
                Spec {
                    spec_type: entry.spec_type,
                    fields: entry.fields,
                },
            );
        }
        for (path, spec) in &specs {
            if spec.spec_type == SpecType::PseudoRoot && !path.is_absolute_root() {
                return Err(StageError::validation(format!(
                    "pseudo-root spec at {path}"
                )));
            }
            if let Some(parent) = path.parent() {
                if !specs.contains_key(&parent) {
                    return Err(StageError::validation(format!(
                        "spec at {path} has no parent spec"
                    )));
                }
            }
        }
        self.replace_content(specs);
        Ok(())
    }

    /// Remove every spec and all layer metadata.
    pub fn clear(&self) {
        self.replace_content(fresh_specs());
    }

    fn replace_content(&self, specs: SpecMap) {
        let _block = ChangeBlock::new();
        *self.write() = specs;
        self.emit(vec![(Path::absolute_root(), EditKind::ContentReplaced)]);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/layer/layer.rs"]
mod tests;
