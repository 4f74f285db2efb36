use crate::compose::diagnostic::{CompositionError, CompositionErrorKind};
use crate::layer::{Layer, LayerId, ListOpItem};
use crate::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of one built layer stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerStackId(u64);

/// A root layer plus its recursively resolved sublayers, strongest first.
///
/// An optional session layer sits above the root layer.
#[derive(Debug)]
pub struct LayerStack {
    id: LayerStackId,
    root: Arc<Layer>,
    layers: Vec<Arc<Layer>>,
    diagnostics: Vec<CompositionError>,
}

impl LayerStack {
    /// Resolve the sublayer tree under `root`.
    ///
    /// Sublayers are looked up by identifier among live layers. Unknown identifiers and
    /// sublayer cycles are recorded as diagnostics and skipped.
    pub fn build(root: Arc<Layer>, session: Option<Arc<Layer>>) -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);

        let mut layers = Vec::new();
        let mut diagnostics = Vec::new();
        if let Some(session) = session {
            let mut chain = Vec::new();
            collect(&session, &mut chain, &mut layers, &mut diagnostics);
        }
        let mut chain = Vec::new();
        collect(&root, &mut chain, &mut layers, &mut diagnostics);

        for d in &diagnostics {
            tracing::warn!(layer = root.identifier(), "{d}");
        }

        Self {
            id: LayerStackId(NEXT.fetch_add(1, Ordering::Relaxed)),
            root,
            layers,
            diagnostics,
        }
    }

    /// Stack identity; unique per build.
    pub fn id(&self) -> LayerStackId {
        self.id
    }

    /// Root layer.
    pub fn root_layer(&self) -> &Arc<Layer> {
        &self.root
    }

    /// Layers, strongest first.
    pub fn layers(&self) -> &[Arc<Layer>] {
        &self.layers
    }

    /// Return `true` when `layer` participates in this stack.
    pub fn contains(&self, layer: LayerId) -> bool {
        self.layers.iter().any(|l| l.id() == layer)
    }

    /// Return `true` when any layer has a spec at `path`.
    pub fn has_spec(&self, path: &Path) -> bool {
        self.layers.iter().any(|l| l.has_spec(path))
    }

    /// Flatten the list op authored for `field` at `path`, weakest layer first.
    pub fn compose_list_op<T: ListOpItem>(&self, path: &Path, field: &str) -> Vec<T> {
        let mut out = Vec::new();
        for layer in self.layers.iter().rev() {
            if let Some(op) = layer.get_field_as_list_op::<T>(path, field) {
                op.apply(&mut out);
            }
        }
        out
    }

    /// Problems found while resolving sublayers.
    pub fn diagnostics(&self) -> &[CompositionError] {
        &self.diagnostics
    }
}

fn collect(
    layer: &Arc<Layer>,
    chain: &mut Vec<LayerId>,
    out: &mut Vec<Arc<Layer>>,
    diagnostics: &mut Vec<CompositionError>,
) {
    if out.iter().any(|l| l.id() == layer.id()) {
        return;
    }
    out.push(Arc::clone(layer));
    chain.push(layer.id());
    for identifier in layer.sublayers() {
        let Some(sub) = Layer::find(&identifier) else {
            diagnostics.push(CompositionError::new(
                CompositionErrorKind::UnresolvedLayer,
                &Path::absolute_root(),
                format!(
                    "sublayer '{identifier}' of '{}' is not loaded",
                    layer.identifier()
                ),
            ));
            continue;
        };
        if chain.contains(&sub.id()) {
            diagnostics.push(CompositionError::new(
                CompositionErrorKind::SublayerCycle,
                &Path::absolute_root(),
                format!("'{identifier}' sublayers one of its ancestors"),
            ));
            continue;
        }
        collect(&sub, chain, out, diagnostics);
    }
    chain.pop();
}

#[cfg(test)]
#[path = "../../tests/unit/compose/layer_stack.rs"]
mod tests;
