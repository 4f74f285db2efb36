use crate::change::block::ChangeListener;
use crate::compose::builder::Builder;
use crate::compose::diagnostic::CompositionError;
use crate::compose::layer_stack::{LayerStack, LayerStackId};
use crate::compose::prim_index::PrimIndex;
use crate::layer::{Layer, LayerId};
use crate::path::Path;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};

/// Composition settings a cache is built with.
#[derive(Clone, Debug)]
pub(crate) struct ComposeOpts {
    pub(crate) max_depth: usize,
    pub(crate) variant_fallbacks: BTreeMap<String, Vec<String>>,
}

type Slot = Arc<OnceLock<Arc<PrimIndex>>>;

#[derive(Default)]
struct DependencyIndex {
    by_site: HashMap<(LayerId, Path), BTreeSet<Path>>,
    by_prim: HashMap<Path, Vec<(LayerId, Path)>>,
}

impl DependencyIndex {
    fn register(&mut self, index: &PrimIndex) {
        let prim = index.path().clone();
        let mut sites = Vec::new();
        for (node, layer) in index.sites() {
            let key = (layer.id(), node.path().clone());
            if self
                .by_site
                .entry(key.clone())
                .or_default()
                .insert(prim.clone())
            {
                sites.push(key);
            }
        }
        self.by_prim.entry(prim).or_default().extend(sites);
    }

    fn forget(&mut self, prim: &Path) {
        let Some(sites) = self.by_prim.remove(prim) else {
            return;
        };
        for site in sites {
            if let Some(set) = self.by_site.get_mut(&site) {
                set.remove(prim);
                if set.is_empty() {
                    self.by_site.remove(&site);
                }
            }
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Lazily computed prim indices for one stage.
///
/// First-time computation of an index is serialized per path: concurrent readers of the
/// same path wait for one computation, readers of other paths never block. The cache also
/// keeps the reverse dependency index `(layer, site) -> composed prim paths` used by change
/// processing.
pub struct PrimIndexCache {
    root_stack: Arc<LayerStack>,
    opts: ComposeOpts,
    listener: Weak<dyn ChangeListener>,
    slots: Mutex<HashMap<Path, Slot>>,
    memo: Mutex<HashMap<(LayerStackId, Path), Arc<PrimIndex>>>,
    stacks: Mutex<HashMap<LayerId, Arc<LayerStack>>>,
    deps: Mutex<DependencyIndex>,
}

impl std::fmt::Debug for PrimIndexCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimIndexCache")
            .field("root_stack", &self.root_stack.id())
            .field("cached", &lock(&self.slots).len())
            .finish()
    }
}

impl PrimIndexCache {
    pub(crate) fn new(
        root_stack: Arc<LayerStack>,
        opts: ComposeOpts,
        listener: Weak<dyn ChangeListener>,
    ) -> Self {
        for layer in root_stack.layers() {
            layer.add_listener(listener.clone());
        }
        Self {
            root_stack,
            opts,
            listener,
            slots: Mutex::new(HashMap::new()),
            memo: Mutex::new(HashMap::new()),
            stacks: Mutex::new(HashMap::new()),
            deps: Mutex::new(DependencyIndex::default()),
        }
    }

    /// The stage's root layer stack.
    pub fn root_stack(&self) -> &Arc<LayerStack> {
        &self.root_stack
    }

    pub(crate) fn max_depth(&self) -> usize {
        self.opts.max_depth
    }

    /// First configured fallback for `set` accepted by `exists`.
    pub(crate) fn fallback_selection(
        &self,
        set: &str,
        exists: impl Fn(&str) -> bool,
    ) -> Option<String> {
        self.opts
            .variant_fallbacks
            .get(set)?
            .iter()
            .find(|v| exists(v))
            .cloned()
    }

    /// Prim index of `path` (a prim path or `/`), computing it on first use.
    pub fn prim_index(&self, path: &Path) -> Arc<PrimIndex> {
        let slot = Arc::clone(lock(&self.slots).entry(path.clone()).or_default());
        Arc::clone(slot.get_or_init(|| {
            let index = Arc::new(self.compute(path));
            if !path.is_absolute_root() {
                lock(&self.deps).register(&index);
            }
            index
        }))
    }

    /// Already computed index of `path`, if any.
    pub fn cached(&self, path: &Path) -> Option<Arc<PrimIndex>> {
        let slot = lock(&self.slots).get(path).cloned()?;
        slot.get().cloned()
    }

    #[tracing::instrument(level = "debug", skip(self), fields(path = %path))]
    fn compute(&self, path: &Path) -> PrimIndex {
        let index = Builder::new(self).build_root(path);
        tracing::debug!(nodes = index.nodes().len(), "prim index computed");
        index
    }

    pub(crate) fn memo_get(&self, stack: LayerStackId, path: &Path) -> Option<Arc<PrimIndex>> {
        lock(&self.memo).get(&(stack, path.clone())).cloned()
    }

    pub(crate) fn memo_insert(&self, stack: LayerStackId, path: &Path, index: Arc<PrimIndex>) {
        lock(&self.memo).insert((stack, path.clone()), index);
    }

    /// Layer stack rooted at `layer`, built once per cache.
    pub(crate) fn layer_stack_for(&self, layer: &Arc<Layer>) -> Arc<LayerStack> {
        if layer.id() == self.root_stack.root_layer().id() {
            return Arc::clone(&self.root_stack);
        }
        let mut stacks = lock(&self.stacks);
        if let Some(s) = stacks.get(&layer.id()) {
            return Arc::clone(s);
        }
        let stack = Arc::new(LayerStack::build(Arc::clone(layer), None));
        for l in stack.layers() {
            l.add_listener(self.listener.clone());
        }
        stacks.insert(layer.id(), Arc::clone(&stack));
        stack
    }

    /// Return `true` when `layer` belongs to the root stack or any referenced stack.
    pub fn uses_layer(&self, layer: LayerId) -> bool {
        self.root_stack.contains(layer) || lock(&self.stacks).values().any(|s| s.contains(layer))
    }

    /// Forget every referenced layer stack and memoised index.
    pub(crate) fn drop_referenced_stacks(&self) {
        lock(&self.stacks).clear();
        lock(&self.memo).clear();
    }

    /// Drop cached indices at and below `path` and every memoised target index.
    pub fn invalidate_subtree(&self, path: &Path) {
        let removed: Vec<Path> = {
            let mut slots = lock(&self.slots);
            let doomed: Vec<Path> = slots
                .keys()
                .filter(|p| p.has_prefix(path))
                .cloned()
                .collect();
            for p in &doomed {
                slots.remove(p);
            }
            doomed
        };
        lock(&self.memo).clear();
        let mut deps = lock(&self.deps);
        for p in &removed {
            deps.forget(p);
        }
        tracing::debug!(root = %path, dropped = removed.len(), "invalidated prim indices");
    }

    /// Composed paths depending on `site` in `layer`.
    ///
    /// Dependencies registered on an ancestor of `site` are re-rooted at each dependent, so
    /// `/target/child.attr` under a dependency `/target -> /foo` yields `/foo/child.attr`.
    pub fn dependents(&self, layer: LayerId, site: &Path) -> BTreeSet<Path> {
        let deps = lock(&self.deps);
        let mut out = BTreeSet::new();
        for anc in site.ancestors() {
            if anc.is_absolute_root() {
                break;
            }
            let Some(set) = deps.by_site.get(&(layer, anc.clone())) else {
                continue;
            };
            for dependent in set {
                if let Some(p) = site.replace_prefix(&anc, dependent) {
                    out.insert(p.strip_variant_selections());
                }
            }
        }
        out
    }

    /// Composed prims with any registered site in `layer`.
    pub fn prims_using_layer(&self, layer: LayerId) -> BTreeSet<Path> {
        lock(&self.deps)
            .by_site
            .iter()
            .filter(|((id, _), _)| *id == layer)
            .flat_map(|(_, prims)| prims.iter().cloned())
            .collect()
    }

    /// Paths with a computed index, in namespace order.
    pub fn cached_paths(&self) -> Vec<Path> {
        let mut out: Vec<Path> = lock(&self.slots)
            .iter()
            .filter(|(_, slot)| slot.get().is_some())
            .map(|(p, _)| p.clone())
            .collect();
        out.sort();
        out
    }

    /// Every layer of the root stack and of the referenced stacks built so far.
    pub(crate) fn layers(&self) -> Vec<Arc<Layer>> {
        let mut out: Vec<Arc<Layer>> = self.root_stack.layers().to_vec();
        for stack in lock(&self.stacks).values() {
            for l in stack.layers() {
                if !out.iter().any(|o| o.id() == l.id()) {
                    out.push(Arc::clone(l));
                }
            }
        }
        out
    }

    /// Diagnostics of the root stack and of every computed index.
    pub fn diagnostics(&self) -> Vec<CompositionError> {
        let mut out: Vec<CompositionError> = self.root_stack.diagnostics().to_vec();
        let slots: Vec<Slot> = lock(&self.slots).values().cloned().collect();
        for slot in slots {
            if let Some(index) = slot.get() {
                for d in index.diagnostics() {
                    if !out.contains(d) {
                        out.push(d.clone());
                    }
                }
            }
        }
        out.sort_by(|a, b| a.site.cmp(&b.site));
        out
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compose/cache.rs"]
mod tests;
