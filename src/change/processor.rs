use crate::change::block::{EditKind, RawEdit};
use crate::compose::PrimIndexCache;
use crate::foundation::token::{Token, fields};
use crate::path::Path;
use std::collections::BTreeSet;

/// Fields whose edits change which sites contribute to a prim, or whether it exists.
const STRUCTURAL_FIELDS: &[&str] = &[
    fields::TYPE_NAME,
    fields::SPECIFIER,
    fields::ACTIVE,
    fields::REFERENCES,
    fields::INHERITS,
    fields::SPECIALIZES,
    fields::VARIANT_SET_NAMES,
    fields::VARIANT_SELECTION,
    fields::PRIM_ORDER,
    fields::PRIM_CHILDREN,
    fields::SUB_LAYERS,
    fields::DEFAULT_PRIM,
];

/// Return `true` when an edit of `field` on a prim spec forces recomposition.
pub fn is_structural_field(field: &str) -> bool {
    STRUCTURAL_FIELDS.contains(&field)
}

/// Classified outcome of one change-block pass for one stage.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChangeSet {
    /// Paths whose composition must be rebuilt; no element lies below another.
    pub resynced: BTreeSet<Path>,
    /// Paths whose values or metadata changed; none lies at or below a resynced path.
    pub changed_info: BTreeSet<Path>,
    /// The stage's own layer stack changed shape (sublayers or wholesale content).
    pub root_stack_changed: bool,
    /// A referenced layer stack changed shape.
    pub referenced_stacks_changed: bool,
}

impl ChangeSet {
    /// Return `true` when nothing on the stage was affected.
    pub fn is_empty(&self) -> bool {
        self.resynced.is_empty() && self.changed_info.is_empty()
    }

    // Drop resyncs below other resyncs and info changes at or below any resync.
    fn subsume(&mut self) {
        let resynced: Vec<Path> = self.resynced.iter().cloned().collect();
        self.resynced
            .retain(|p| !resynced.iter().any(|r| r != p && p.has_prefix(r)));
        let roots = &self.resynced;
        self.changed_info
            .retain(|p| !p.ancestors().any(|a| roots.contains(&a)));
    }
}

enum Effect {
    Resync,
    Info,
}

// Paths on the stage that observe `path` in `edit.layer`: the path itself when the layer is
// part of the stage's own stack, plus every composed prim that uses the site.
fn affected(edit: &RawEdit, in_root: bool, cache: &PrimIndexCache) -> BTreeSet<Path> {
    let path = &edit.path;
    let mut out = cache.dependents(edit.layer.id(), path);
    if in_root && !path.is_absolute_root() && !path.contains_variant_selection() {
        out.insert(path.clone());
    }
    out
}

/// Classify one stage's share of a flushed change block.
///
/// Panics when the resulting resync and info sets overlap.
#[tracing::instrument(level = "debug", skip_all, fields(edits = edits.len()))]
pub fn classify(edits: &[RawEdit], cache: &PrimIndexCache) -> ChangeSet {
    let root_stack = cache.root_stack();
    let mut set = ChangeSet::default();

    for edit in edits {
        let layer = edit.layer.id();
        let in_root = root_stack.contains(layer);
        if !in_root && !cache.uses_layer(layer) {
            continue;
        }

        if edit.path.is_absolute_root() {
            let field = edit.field().map(Token::as_str);
            let reshapes =
                matches!(edit.kind, EditKind::ContentReplaced) || field == Some(fields::SUB_LAYERS);
            if reshapes && in_root {
                set.root_stack_changed = true;
                set.resynced.insert(Path::absolute_root());
            } else if reshapes {
                set.referenced_stacks_changed = true;
                set.resynced.extend(cache.prims_using_layer(layer));
            } else if !in_root && field == Some(fields::DEFAULT_PRIM) {
                set.resynced.extend(cache.prims_using_layer(layer));
            } else if in_root {
                set.changed_info.insert(Path::absolute_root());
            }
            continue;
        }

        let effect = match &edit.kind {
            EditKind::SpecAdded | EditKind::SpecRemoved | EditKind::ContentReplaced => {
                Effect::Resync
            }
            EditKind::Field { field, .. } => {
                if !edit.path.is_property_path() && is_structural_field(field.as_str()) {
                    Effect::Resync
                } else {
                    Effect::Info
                }
            }
        };
        let paths = affected(edit, in_root, cache);
        match effect {
            Effect::Resync => set.resynced.extend(paths),
            Effect::Info => set.changed_info.extend(paths),
        }
    }

    set.subsume();
    for p in &set.changed_info {
        assert!(
            !set.resynced.iter().any(|r| p.has_prefix(r)),
            "changed-info path {p} overlaps a resynced path"
        );
    }
    tracing::debug!(
        resynced = set.resynced.len(),
        changed_info = set.changed_info.len(),
        "classified edits"
    );
    set
}

#[cfg(test)]
#[path = "../../tests/unit/change/processor.rs"]
mod tests;
