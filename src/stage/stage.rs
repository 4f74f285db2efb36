use crate::change::block::{ChangeBlock, ChangeListener, RawEdit};
use crate::change::notice::ObjectsChanged;
use crate::change::processor::classify;
use crate::compose::{CompositionError, LayerStack, PrimIndex, PrimIndexCache};
use crate::foundation::core::{InterpolationType, TimeCode};
use crate::foundation::error::{StageError, StageResult};
use crate::foundation::token::{Token, fields};
use crate::layer::{Layer, Specifier, Value};
use crate::path::Path;
use crate::resolve;
use crate::stage::opts::StageOpts;
use crate::stage::prim::Prim;
use rayon::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

/// Process-unique stage identity carried by notices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(u64);

impl StageId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle returned by [`Stage::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&ObjectsChanged) + Send + Sync>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn read<T: Clone>(l: &RwLock<T>) -> T {
    l.read().unwrap_or_else(|e| e.into_inner()).clone()
}

fn write<T>(l: &RwLock<T>, value: T) -> T {
    std::mem::replace(&mut *l.write().unwrap_or_else(|e| e.into_inner()), value)
}

struct StageInner {
    id: StageId,
    root: Arc<Layer>,
    session: Option<Arc<Layer>>,
    opts: StageOpts,
    this: Weak<StageInner>,
    cache: RwLock<Arc<PrimIndexCache>>,
    edit_target: RwLock<Arc<Layer>>,
    interpolation: RwLock<InterpolationType>,
    subscribers: Mutex<Vec<(SubscriptionId, Callback)>>,
    next_subscription: AtomicU64,
}

impl StageInner {
    fn listener(&self) -> Weak<dyn ChangeListener> {
        self.this.clone()
    }

    fn build_cache(&self) -> Arc<PrimIndexCache> {
        let stack = Arc::new(LayerStack::build(
            Arc::clone(&self.root),
            self.session.clone(),
        ));
        Arc::new(PrimIndexCache::new(
            stack,
            self.opts.compose_opts(),
            self.listener(),
        ))
    }
}

/// Compute every composed prim at and below `root`, one namespace level at a time.
///
/// Indices register their sites as they are built, so after this pass the dependency index
/// covers the whole subtree whether or not anything was queried. Children of inactive prims
/// are not part of the stage and are skipped.
fn populate(cache: &PrimIndexCache, root: &Path) -> usize {
    let mut computed = 0;
    let mut frontier = vec![root.prim_path()];
    while !frontier.is_empty() {
        computed += frontier.len();
        frontier = frontier
            .par_iter()
            .flat_map_iter(|path| {
                let index = cache.prim_index(path);
                let descend =
                    path.is_absolute_root() || (index.has_specs() && resolve::is_active(&index));
                let children = if descend {
                    resolve::compose_children(&index)
                } else {
                    Vec::new()
                };
                children
                    .into_iter()
                    .filter_map(|name| path.append_child(name.as_str()).ok())
                    .collect::<Vec<_>>()
            })
            .collect();
    }
    computed
}

impl ChangeListener for StageInner {
    #[tracing::instrument(level = "debug", skip_all, fields(stage = self.id.0))]
    fn process_edits(&self, edits: &[RawEdit]) {
        let cache = read(&self.cache);
        let changes = classify(edits, &cache);
        if changes.is_empty() && !changes.root_stack_changed && !changes.referenced_stacks_changed {
            return;
        }

        let previously = cache.cached_paths();
        let cache = if changes.root_stack_changed {
            let fresh = self.build_cache();
            write(&self.cache, Arc::clone(&fresh));
            fresh
        } else {
            if changes.referenced_stacks_changed {
                cache.drop_referenced_stacks();
            }
            for path in &changes.resynced {
                cache.invalidate_subtree(path);
            }
            cache
        };

        // Recompose the resynced subtrees, plus anything queried there that is not part of the
        // composed tree, so the dependency index stays complete.
        let mut repopulated = 0;
        for root in &changes.resynced {
            repopulated += populate(&cache, root);
        }
        let stale: Vec<&Path> = previously
            .iter()
            .filter(|p| changes.resynced.iter().any(|r| p.has_prefix(r)))
            .collect();
        for path in &stale {
            cache.prim_index(path);
        }

        let notice = ObjectsChanged::new(self.id, &changes);
        tracing::debug!(
            resynced = notice.resynced_paths().len(),
            changed_info = notice.changed_info_only_paths().len(),
            repopulated,
            reprimed = stale.len(),
            "sending objects-changed notice"
        );
        if notice.is_empty() {
            return;
        }
        let callbacks: Vec<Callback> = lock(&self.subscribers)
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for cb in callbacks {
            cb(&notice);
        }
    }
}

impl Drop for StageInner {
    fn drop(&mut self) {
        let listener = self.listener();
        let cache = read(&self.cache);
        for layer in cache.layers() {
            layer.remove_listener(&listener);
        }
    }
}

/// A composed view over a root layer stack.
///
/// Cloning a stage is cheap and yields another handle to the same stage. Prim indices are
/// computed lazily and shared by every handle; edits to any layer the stage uses are
/// classified when the outermost change block closes, and subscribers receive one
/// [`ObjectsChanged`] notice per block.
#[derive(Clone)]
pub struct Stage {
    inner: Arc<StageInner>,
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.inner.id)
            .field("root", &self.inner.root.identifier())
            .finish()
    }
}

impl PartialEq for Stage {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Stage {
    /// Stage over a new anonymous root layer.
    pub fn create_in_memory(opts: StageOpts) -> StageResult<Stage> {
        Self::open(Layer::create_anonymous("stage"), opts)
    }

    /// Stage composed from `root` and its sublayers.
    pub fn open(root: Arc<Layer>, opts: StageOpts) -> StageResult<Stage> {
        opts.validate()?;
        let session = opts
            .session_layer
            .then(|| Layer::create_anonymous("session"));
        let interpolation = opts.interpolation;
        let inner = Arc::new_cyclic(|this: &Weak<StageInner>| {
            let listener: Weak<dyn ChangeListener> = this.clone();
            let stack = Arc::new(LayerStack::build(Arc::clone(&root), session.clone()));
            let cache = PrimIndexCache::new(stack, opts.compose_opts(), listener);
            StageInner {
                id: StageId::next(),
                edit_target: RwLock::new(Arc::clone(&root)),
                root,
                session,
                opts,
                this: this.clone(),
                cache: RwLock::new(Arc::new(cache)),
                interpolation: RwLock::new(interpolation),
                subscribers: Mutex::new(Vec::new()),
                next_subscription: AtomicU64::new(1),
            }
        });
        let populated = populate(
            &read::<Arc<PrimIndexCache>>(&inner.cache),
            &Path::absolute_root(),
        );
        tracing::debug!(
            stage = inner.id.0,
            root = inner.root.identifier(),
            populated,
            "stage opened"
        );
        Ok(Stage { inner })
    }

    /// Process-unique identity.
    pub fn id(&self) -> StageId {
        self.inner.id
    }

    /// Root layer.
    pub fn root_layer(&self) -> &Arc<Layer> {
        &self.inner.root
    }

    /// Session layer, when the stage was opened with one.
    pub fn session_layer(&self) -> Option<&Arc<Layer>> {
        self.inner.session.as_ref()
    }

    /// Current root layer stack.
    pub fn layer_stack(&self) -> Arc<LayerStack> {
        Arc::clone(self.cache().root_stack())
    }

    pub(crate) fn cache(&self) -> Arc<PrimIndexCache> {
        read(&self.inner.cache)
    }

    /// Layer receiving authoring calls made through this stage.
    pub fn edit_target(&self) -> Arc<Layer> {
        read(&self.inner.edit_target)
    }

    /// Route authoring to `layer`, which must belong to the root layer stack.
    pub fn set_edit_target(&self, layer: &Arc<Layer>) -> StageResult<()> {
        if !self.layer_stack().contains(layer.id()) {
            return Err(StageError::coding(format!(
                "layer '{}' is not in the layer stack of this stage",
                layer.identifier()
            )));
        }
        write(&self.inner.edit_target, Arc::clone(layer));
        Ok(())
    }

    /// Prim index of `path`, computing it on first use.
    pub fn prim_index(&self, path: &Path) -> Arc<PrimIndex> {
        self.cache().prim_index(path)
    }

    /// Compute the indices of `paths` in parallel.
    pub fn prefetch(&self, paths: &[Path]) {
        let cache = self.cache();
        paths.par_iter().for_each(|p| {
            cache.prim_index(p);
        });
    }

    /// The pseudo-root prim `/`.
    pub fn pseudo_root(&self) -> Prim {
        Prim::new(self.clone(), Path::absolute_root())
    }

    /// Composed prim at `path`.
    ///
    /// `None` when no layer has an opinion for it, or when an ancestor is inactive.
    pub fn get_prim_at_path(&self, path: &Path) -> Option<Prim> {
        if path.is_absolute_root() {
            return Some(self.pseudo_root());
        }
        if !path.is_prim_path() {
            return None;
        }
        let cache = self.cache();
        for anc in path.ancestors().skip(1) {
            if anc.is_absolute_root() {
                break;
            }
            if !resolve::is_active(&cache.prim_index(&anc)) {
                return None;
            }
        }
        cache
            .prim_index(path)
            .has_specs()
            .then(|| Prim::new(self.clone(), path.clone()))
    }

    fn check_authoring_path(path: &Path) -> StageResult<()> {
        if !path.is_prim_path() || path.is_absolute_root() || path.contains_variant_selection() {
            return Err(StageError::coding(format!(
                "{path} is not a prim path that can be authored from a stage"
            )));
        }
        Ok(())
    }

    /// Define a prim of `type_name` at `path`, defining any undefined ancestors too.
    pub fn define_prim(&self, path: &Path, type_name: &str) -> StageResult<Prim> {
        Self::check_authoring_path(path)?;
        let target = self.edit_target();
        let _block = ChangeBlock::new();
        let mut ancestors: Vec<Path> = path
            .ancestors()
            .skip(1)
            .take_while(|a| !a.is_absolute_root())
            .collect();
        ancestors.reverse();
        for anc in &ancestors {
            if !resolve::is_defined(&self.prim_index(anc)) {
                target.create_prim_spec(anc, Specifier::Def, "")?;
            }
        }
        target.create_prim_spec(path, Specifier::Def, type_name)?;
        Ok(Prim::new(self.clone(), path.clone()))
    }

    /// Existing prim at `path`, or a new `over` for it.
    pub fn override_prim(&self, path: &Path) -> StageResult<Prim> {
        Self::check_authoring_path(path)?;
        if let Some(prim) = self.get_prim_at_path(path) {
            return Ok(prim);
        }
        self.edit_target()
            .create_prim_spec(path, Specifier::Over, "")?;
        Ok(Prim::new(self.clone(), path.clone()))
    }

    /// Define a root-level class prim.
    pub fn create_class_prim(&self, path: &Path) -> StageResult<Prim> {
        Self::check_authoring_path(path)?;
        if path.element_count() != 1 {
            return Err(StageError::coding(format!(
                "class prims must be root prims, got {path}"
            )));
        }
        self.edit_target()
            .create_prim_spec(path, Specifier::Class, "")?;
        Ok(Prim::new(self.clone(), path.clone()))
    }

    /// Remove the edit target's spec at `path` and everything below it.
    ///
    /// Opinions from other layers are untouched. Returns `false` when the edit target had
    /// no spec there.
    pub fn remove_prim(&self, path: &Path) -> StageResult<bool> {
        Self::check_authoring_path(path)?;
        self.edit_target().remove_spec(path)
    }

    /// Depth-first, pre-order walk of the active, defined, non-abstract prims.
    ///
    /// Subtrees under a prim that fails the predicate are skipped.
    pub fn traverse(&self) -> Vec<Prim> {
        self.walk(|index| {
            resolve::is_active(index) && resolve::is_defined(index) && !resolve::is_abstract(index)
        })
    }

    /// Depth-first, pre-order walk of every composed prim.
    ///
    /// Children of inactive prims are not part of the stage and are never visited.
    pub fn traverse_all(&self) -> Vec<Prim> {
        self.walk(|_| true)
    }

    fn walk(&self, keep: impl Fn(&PrimIndex) -> bool) -> Vec<Prim> {
        let cache = self.cache();
        let mut out = Vec::new();
        let mut stack: Vec<Path> = vec![Path::absolute_root()];
        while let Some(path) = stack.pop() {
            let index = cache.prim_index(&path);
            if !path.is_absolute_root() {
                if !keep(&index) {
                    continue;
                }
                out.push(Prim::new(self.clone(), path.clone()));
                if !resolve::is_active(&index) {
                    continue;
                }
            }
            let children = resolve::compose_children(&index);
            for name in children.iter().rev() {
                if let Ok(child) = path.append_child(name.as_str()) {
                    stack.push(child);
                }
            }
        }
        out
    }

    /// Register `callback` for every notice this stage sends.
    pub fn subscribe(
        &self,
        callback: impl Fn(&ObjectsChanged) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        lock(&self.inner.subscribers).push((id, Arc::new(callback)));
        id
    }

    /// Drop a subscription. Returns `false` when `id` was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = lock(&self.inner.subscribers);
        let before = subs.len();
        subs.retain(|(sid, _)| *sid != id);
        subs.len() != before
    }

    /// Composition diagnostics gathered so far.
    pub fn diagnostics(&self) -> Vec<CompositionError> {
        self.cache().diagnostics()
    }

    fn root_metadata_f64(&self, field: &str) -> Option<f64> {
        let root = Path::absolute_root();
        self.layer_stack()
            .layers()
            .iter()
            .find_map(|l| l.get_field(&root, field))
            .and_then(|v| v.as_f64())
    }

    /// Time codes per second authored on the root layer stack.
    ///
    /// Falls back to an authored frames per second, then to the configured default.
    pub fn time_codes_per_second(&self) -> f64 {
        self.root_metadata_f64(fields::TIME_CODES_PER_SECOND)
            .or_else(|| self.root_metadata_f64(fields::FRAMES_PER_SECOND))
            .unwrap_or(self.inner.opts.default_time_codes_per_second)
    }

    /// Author time codes per second on the root layer.
    pub fn set_time_codes_per_second(&self, tcps: f64) -> StageResult<()> {
        if !(tcps.is_finite() && tcps > 0.0) {
            return Err(StageError::validation(format!(
                "time codes per second must be finite and > 0, got {tcps}"
            )));
        }
        self.inner
            .root
            .set_field(&Path::absolute_root(), fields::TIME_CODES_PER_SECOND, tcps)
    }

    /// Playback rate hint; falls back to [`Stage::time_codes_per_second`].
    pub fn frames_per_second(&self) -> f64 {
        self.root_metadata_f64(fields::FRAMES_PER_SECOND)
            .unwrap_or_else(|| self.time_codes_per_second())
    }

    /// Author frames per second on the root layer.
    pub fn set_frames_per_second(&self, fps: f64) -> StageResult<()> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(StageError::validation(format!(
                "frames per second must be finite and > 0, got {fps}"
            )));
        }
        self.inner
            .root
            .set_field(&Path::absolute_root(), fields::FRAMES_PER_SECOND, fps)
    }

    /// Interpolation used between time samples.
    pub fn interpolation_type(&self) -> InterpolationType {
        read(&self.inner.interpolation)
    }

    /// Change the interpolation used between time samples.
    pub fn set_interpolation_type(&self, interpolation: InterpolationType) {
        write(&self.inner.interpolation, interpolation);
    }

    fn split_property(path: &Path) -> StageResult<(Path, Token)> {
        match (path.is_property_path(), path.name()) {
            (true, Some(name)) => Ok((path.prim_path(), name.clone())),
            _ => Err(StageError::coding(format!("{path} is not a property path"))),
        }
    }

    /// Composed value of the attribute at `path` at `time`, with schema fallbacks.
    pub fn get_attribute_value(&self, path: &Path, time: TimeCode) -> StageResult<Option<Value>> {
        let (prim, name) = Self::split_property(path)?;
        Ok(Prim::new(self.clone(), prim)
            .get_attribute(name.as_str())
            .get(time))
    }

    /// Composed targets of the relationship at `path`, in stage namespace.
    pub fn get_relationship_targets(&self, path: &Path) -> StageResult<Vec<Path>> {
        let (prim, name) = Self::split_property(path)?;
        Ok(Prim::new(self.clone(), prim)
            .get_relationship(name.as_str())
            .targets())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/stage/stage.rs"]
mod tests;
