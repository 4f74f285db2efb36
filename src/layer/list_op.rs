use crate::foundation::core::LayerOffset;
use crate::foundation::token::Token;
use crate::layer::value::Value;
use crate::path::Path;
use serde::{Deserialize, Serialize};

/// Sparse edit of an ordered list.
///
/// An explicit list op replaces whatever weaker opinions produced. A non-explicit one edits
/// it: delete, then add, then prepend, then append, then reorder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct ListOp<T> {
    /// Replacement list; `Some` makes this list op explicit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit: Option<Vec<T>>,
    /// Items added at the back when not already present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<T>,
    /// Items moved or inserted at the front.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prepended: Vec<T>,
    /// Items moved or inserted at the back.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub appended: Vec<T>,
    /// Items removed from weaker opinions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deleted: Vec<T>,
    /// Relative order applied last.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ordered: Vec<T>,
}

impl<T> Default for ListOp<T> {
    fn default() -> Self {
        Self {
            explicit: None,
            added: Vec::new(),
            prepended: Vec::new(),
            appended: Vec::new(),
            deleted: Vec::new(),
            ordered: Vec::new(),
        }
    }
}

/// Where an editor inserts a new item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ListPosition {
    /// Front of the prepend list; strongest.
    FrontOfPrependList,
    /// Back of the prepend list.
    #[default]
    BackOfPrependList,
    /// Front of the append list.
    FrontOfAppendList,
    /// Back of the append list; weakest.
    BackOfAppendList,
}

fn dedup_into<T: Clone + PartialEq>(items: &[T], out: &mut Vec<T>) {
    for item in items {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
}

impl<T: Clone + PartialEq> ListOp<T> {
    /// Explicit list op holding `items`.
    pub fn explicit(items: Vec<T>) -> Self {
        Self {
            explicit: Some(items),
            ..Self::default()
        }
    }

    /// Non-explicit list op prepending `items`.
    pub fn prepended(items: Vec<T>) -> Self {
        Self {
            prepended: items,
            ..Self::default()
        }
    }

    /// Non-explicit list op appending `items`.
    pub fn appended(items: Vec<T>) -> Self {
        Self {
            appended: items,
            ..Self::default()
        }
    }

    /// Return `true` when this list op replaces weaker opinions.
    pub fn is_explicit(&self) -> bool {
        self.explicit.is_some()
    }

    /// Return `true` when the list op carries no edits at all.
    pub fn is_empty(&self) -> bool {
        self.explicit.is_none()
            && self.added.is_empty()
            && self.prepended.is_empty()
            && self.appended.is_empty()
            && self.deleted.is_empty()
            && self.ordered.is_empty()
    }

    /// Apply this edit on top of `current`.
    pub fn apply(&self, current: &mut Vec<T>) {
        if let Some(explicit) = &self.explicit {
            current.clear();
            dedup_into(explicit, current);
            return;
        }

        current.retain(|item| !self.deleted.contains(item));
        for item in &self.added {
            if !current.contains(item) {
                current.push(item.clone());
            }
        }

        if !self.prepended.is_empty() {
            current.retain(|item| !self.prepended.contains(item));
            let mut front = Vec::with_capacity(self.prepended.len() + current.len());
            dedup_into(&self.prepended, &mut front);
            front.append(current);
            *current = front;
        }

        if !self.appended.is_empty() {
            current.retain(|item| !self.appended.contains(item));
            dedup_into(&self.appended, current);
        }

        if !self.ordered.is_empty() {
            reorder(current, &self.ordered);
        }
    }

    /// Flattened result of applying this edit to an empty list.
    pub fn applied(&self) -> Vec<T> {
        let mut out = Vec::new();
        self.apply(&mut out);
        out
    }

    /// Insert `item` at `position`, removing it from every other edit list first.
    pub fn add(&mut self, item: T, position: ListPosition) {
        if let Some(explicit) = &mut self.explicit {
            explicit.retain(|i| *i != item);
            match position {
                ListPosition::FrontOfPrependList | ListPosition::BackOfPrependList => {
                    explicit.insert(0, item)
                }
                ListPosition::FrontOfAppendList | ListPosition::BackOfAppendList => {
                    explicit.push(item)
                }
            }
            return;
        }

        self.deleted.retain(|i| *i != item);
        self.prepended.retain(|i| *i != item);
        self.appended.retain(|i| *i != item);
        match position {
            ListPosition::FrontOfPrependList => self.prepended.insert(0, item),
            ListPosition::BackOfPrependList => self.prepended.push(item),
            ListPosition::FrontOfAppendList => self.appended.insert(0, item),
            ListPosition::BackOfAppendList => self.appended.push(item),
        }
    }

    /// Shorthand for `add(item, ListPosition::BackOfPrependList)`.
    pub fn prepend(&mut self, item: T) {
        self.add(item, ListPosition::BackOfPrependList);
    }

    /// Shorthand for `add(item, ListPosition::BackOfAppendList)`.
    pub fn append(&mut self, item: T) {
        self.add(item, ListPosition::BackOfAppendList);
    }

    /// Remove `item` from this list op and, unless explicit, delete it from weaker opinions.
    pub fn remove(&mut self, item: &T) {
        if let Some(explicit) = &mut self.explicit {
            explicit.retain(|i| i != item);
            return;
        }
        self.added.retain(|i| i != item);
        self.prepended.retain(|i| i != item);
        self.appended.retain(|i| i != item);
        if !self.deleted.contains(item) {
            self.deleted.push(item.clone());
        }
    }

    /// Drop every edit.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Replace the list op with an explicit list.
    pub fn set_explicit(&mut self, items: Vec<T>) {
        *self = Self::explicit(items);
    }

    /// Same edits with every item passed through `f`; items mapped to `None` are dropped.
    pub(crate) fn filter_map_items(&self, f: impl Fn(&T) -> Option<T>) -> Self {
        let map = |v: &Vec<T>| v.iter().filter_map(&f).collect::<Vec<T>>();
        Self {
            explicit: self.explicit.as_ref().map(&map),
            added: map(&self.added),
            prepended: map(&self.prepended),
            appended: map(&self.appended),
            deleted: map(&self.deleted),
            ordered: map(&self.ordered),
        }
    }
}

// Items named in `order` are arranged in that order; every other item travels with the
// ordered item in front of it, and items ahead of the first ordered one stay at the front.
fn reorder<T: Clone + PartialEq>(current: &mut Vec<T>, order: &[T]) {
    let mut unique_order: Vec<T> = Vec::new();
    for item in order {
        if current.contains(item) && !unique_order.contains(item) {
            unique_order.push(item.clone());
        }
    }
    if unique_order.is_empty() {
        return;
    }

    let mut leading: Vec<T> = Vec::new();
    let mut chunks: Vec<(T, Vec<T>)> = Vec::new();
    for item in current.drain(..) {
        if unique_order.contains(&item) {
            chunks.push((item, Vec::new()));
        } else if let Some((_, tail)) = chunks.last_mut() {
            tail.push(item);
        } else {
            leading.push(item);
        }
    }

    current.extend(leading);
    for key in &unique_order {
        if let Some(idx) = chunks.iter().position(|(k, _)| k == key) {
            let (k, tail) = chunks.swap_remove(idx);
            current.push(k);
            current.extend(tail);
        }
    }
}

/// A reference arc: another prim's opinions, possibly from another layer, composed under
/// the referencing prim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    /// Identifier of the target layer; empty for an internal reference.
    #[serde(default)]
    pub asset_path: String,
    /// Target prim; `None` uses the target layer's default prim.
    #[serde(default)]
    pub prim_path: Option<Path>,
    /// Time mapping from the target into the referencing namespace.
    #[serde(default)]
    pub layer_offset: LayerOffset,
}

impl Reference {
    /// Reference to `prim_path` in the layer named `asset_path`.
    pub fn new(asset_path: impl Into<String>, prim_path: Option<Path>) -> Self {
        Self {
            asset_path: asset_path.into(),
            prim_path,
            layer_offset: LayerOffset::IDENTITY,
        }
    }

    /// Reference into the referencing layer stack itself.
    pub fn internal(prim_path: Path) -> Self {
        Self::new(String::new(), Some(prim_path))
    }

    /// Same reference with a time mapping.
    pub fn with_layer_offset(mut self, layer_offset: LayerOffset) -> Self {
        self.layer_offset = layer_offset;
        self
    }

    /// Return `true` for references without an asset path.
    pub fn is_internal(&self) -> bool {
        self.asset_path.is_empty()
    }
}

/// Item types that can be stored as a list-op valued field.
pub trait ListOpItem: Clone + PartialEq + Sized {
    /// Borrow the list op if `value` holds one of this item type.
    fn list_op(value: &Value) -> Option<&ListOp<Self>>;
    /// Wrap a list op into a field value.
    fn into_value(op: ListOp<Self>) -> Value;
}

impl ListOpItem for Token {
    fn list_op(value: &Value) -> Option<&ListOp<Self>> {
        match value {
            Value::TokenListOp(op) => Some(op),
            _ => None,
        }
    }

    fn into_value(op: ListOp<Self>) -> Value {
        Value::TokenListOp(op)
    }
}

impl ListOpItem for Path {
    fn list_op(value: &Value) -> Option<&ListOp<Self>> {
        match value {
            Value::PathListOp(op) => Some(op),
            _ => None,
        }
    }

    fn into_value(op: ListOp<Self>) -> Value {
        Value::PathListOp(op)
    }
}

impl ListOpItem for Reference {
    fn list_op(value: &Value) -> Option<&ListOp<Self>> {
        match value {
            Value::ReferenceListOp(op) => Some(op),
            _ => None,
        }
    }

    fn into_value(op: ListOp<Self>) -> Value {
        Value::ReferenceListOp(op)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/layer/list_op.rs"]
mod tests;
