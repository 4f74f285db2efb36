use crate::foundation::token::Token;
use crate::layer::Layer;
use crate::path::Path;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

/// What happened to a spec or field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EditKind {
    /// A spec was created at the path.
    SpecAdded,
    /// The spec at the path, and everything below it, was removed.
    SpecRemoved,
    /// A field was written or erased.
    Field {
        /// Field name.
        field: Token,
        /// Whether the field had a value before the edit.
        old_present: bool,
        /// Whether the field has a value after the edit.
        new_present: bool,
    },
    /// The whole layer content was replaced.
    ContentReplaced,
}

/// One recorded layer mutation.
#[derive(Clone, Debug)]
pub struct RawEdit {
    /// Edited layer.
    pub layer: Arc<Layer>,
    /// Spec path (the pseudo-root `/` for layer metadata).
    pub path: Path,
    /// Edit kind.
    pub kind: EditKind,
}

impl RawEdit {
    /// Field name for field edits.
    pub fn field(&self) -> Option<&Token> {
        match &self.kind {
            EditKind::Field { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Receiver of flushed edits. Stages register themselves on every layer they use.
pub trait ChangeListener: Send + Sync {
    /// Handle the edits of one closed outermost change block that touched this listener's
    /// layers, in recording order.
    fn process_edits(&self, edits: &[RawEdit]);
}

#[derive(Default)]
struct ChangeManager {
    depth: usize,
    pending: Vec<RawEdit>,
}

thread_local! {
    static MANAGER: RefCell<ChangeManager> = RefCell::new(ChangeManager::default());
}

/// RAII change block.
///
/// Edits made while any block is open on the current thread are queued; dropping the
/// outermost block delivers them to every listening stage at once. Blocks nest freely and
/// cannot be cancelled.
#[must_use = "dropping a ChangeBlock immediately closes it"]
pub struct ChangeBlock {
    _not_send: PhantomData<*const ()>,
}

impl ChangeBlock {
    /// Open a (possibly nested) change block on the current thread.
    pub fn new() -> Self {
        MANAGER.with(|m| m.borrow_mut().depth += 1);
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Default for ChangeBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ChangeBlock {
    fn drop(&mut self) {
        let flushed = MANAGER.with(|m| {
            let mut m = m.borrow_mut();
            assert!(m.depth > 0, "unbalanced change block");
            m.depth -= 1;
            if m.depth == 0 {
                Some(std::mem::take(&mut m.pending))
            } else {
                None
            }
        });
        if let Some(edits) = flushed {
            if !edits.is_empty() {
                deliver(edits);
            }
        }
    }
}

/// Open a change block; it closes when the returned guard is dropped.
pub fn open_change_block() -> ChangeBlock {
    ChangeBlock::new()
}

/// Return `true` while a change block is open on the current thread.
pub fn is_change_block_open() -> bool {
    MANAGER.with(|m| m.borrow().depth > 0)
}

/// Queue an edit. Panics when no block is open: writing outside a change block is a
/// programming error.
pub(crate) fn record(edit: RawEdit) {
    MANAGER.with(|m| {
        let mut m = m.borrow_mut();
        assert!(
            m.depth > 0,
            "layer edit at {} recorded outside a change block",
            edit.path
        );
        tracing::trace!(layer = edit.layer.identifier(), path = %edit.path, kind = ?edit.kind, "raw edit");
        m.pending.push(edit);
    });
}

fn listener_key(l: &Arc<dyn ChangeListener>) -> *const () {
    Arc::as_ptr(l) as *const ()
}

// Group edits by listener, keeping both listener and edit order stable, then run each
// listener's pass with no manager borrow held so callbacks may edit again.
fn deliver(edits: Vec<RawEdit>) {
    let mut groups: Vec<(Arc<dyn ChangeListener>, Vec<RawEdit>)> = Vec::new();
    for edit in edits {
        for listener in edit.layer.listeners() {
            let key = listener_key(&listener);
            match groups.iter_mut().find(|(l, _)| listener_key(l) == key) {
                Some((_, group)) => group.push(edit.clone()),
                None => groups.push((listener, vec![edit.clone()])),
            }
        }
    }
    tracing::debug!(listeners = groups.len(), "flushing change block");
    for (listener, group) in groups {
        listener.process_edits(&group);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/change/block.rs"]
mod tests;
