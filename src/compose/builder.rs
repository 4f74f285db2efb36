use crate::compose::cache::PrimIndexCache;
use crate::compose::diagnostic::{CompositionError, CompositionErrorKind};
use crate::compose::layer_stack::{LayerStack, LayerStackId};
use crate::compose::prim_index::{ArcType, Node, PrimIndex};
use crate::foundation::token::{Token, fields};
use crate::layer::{Layer, Reference, Value};
use crate::path::Path;
use crate::path::map::MapFunction;
use std::sync::Arc;

/// Working graph: nodes in insertion order plus child lists.
struct Graph {
    nodes: Vec<Node>,
    children: Vec<Vec<usize>>,
}

impl Graph {
    // Start a child's graph from its parent's index, every site moved one level down.
    fn from_parent(parent: &PrimIndex, name: &Token) -> Self {
        let mut g = Graph {
            nodes: Vec::with_capacity(parent.nodes.len()),
            children: Vec::with_capacity(parent.nodes.len()),
        };
        for n in &parent.nodes {
            let path = n
                .path
                .append_child(name.as_str())
                .unwrap_or_else(|_| n.path.clone());
            g.add(Node { path, ..n.clone() });
        }
        g
    }

    fn add(&mut self, node: Node) -> usize {
        let idx = self.nodes.len();
        if let Some(p) = node.parent {
            self.children[p].push(idx);
        }
        self.nodes.push(node);
        self.children.push(Vec::new());
        idx
    }

    fn preorder(&self) -> Vec<usize> {
        fn visit(g: &Graph, i: usize, out: &mut Vec<usize>) {
            out.push(i);
            let mut kids = g.children[i].clone();
            kids.sort_by_key(|&c| g.nodes[c].sibling_key());
            for c in kids {
                visit(g, c, out);
            }
        }
        let mut out = Vec::with_capacity(self.nodes.len());
        if !self.nodes.is_empty() {
            visit(self, 0, &mut out);
        }
        out
    }

    fn into_index(self, path: &Path, diagnostics: Vec<CompositionError>) -> PrimIndex {
        let order = self.preorder();
        let mut position = vec![0usize; self.nodes.len()];
        for (pos, &old) in order.iter().enumerate() {
            position[old] = pos;
        }
        let nodes = order
            .iter()
            .map(|&old| {
                let mut n = self.nodes[old].clone();
                n.parent = n.parent.map(|p| position[p]);
                n
            })
            .collect();
        PrimIndex {
            path: path.clone(),
            nodes,
            diagnostics,
        }
    }

    // Strongest authored selection for `set` among the nodes built so far.
    fn authored_selection(&self, set: &Token) -> Option<String> {
        for i in self.preorder() {
            let n = &self.nodes[i];
            for layer in n.layer_stack.layers() {
                if let Some(Value::Dictionary(d)) =
                    layer.get_field(&n.path, fields::VARIANT_SELECTION)
                {
                    if let Some(sel) = d.get(set.as_str()).and_then(Value::as_str) {
                        return Some(sel.to_string());
                    }
                }
            }
        }
        None
    }
}

/// Strength-ordered depth-first prim index construction.
///
/// A prim's index starts from its parent's index moved one namespace level down (ancestral
/// arcs), then every node's site is inspected for references, inherits, variant selections
/// and specializes. Arc targets are composed as complete indices of the target site in the
/// target layer stack and grafted under the introducing node.
///
/// Subgraphs go into the cache's memo only when nothing outside them shaped the result: an arc
/// dropped against a site pushed before the subgraph started makes it context dependent.
pub(crate) struct Builder<'c> {
    cache: &'c PrimIndexCache,
    in_progress: Vec<(LayerStackId, Path)>,
    // Lowest `in_progress` position a dropped arc collided with since the innermost subgraph began.
    cycle_floor: usize,
}

impl<'c> Builder<'c> {
    pub(crate) fn new(cache: &'c PrimIndexCache) -> Self {
        Self {
            cache,
            in_progress: Vec::new(),
            cycle_floor: usize::MAX,
        }
    }

    /// Index of `path` in the stage's root layer stack.
    pub(crate) fn build_root(&mut self, path: &Path) -> PrimIndex {
        let stack = Arc::clone(self.cache.root_stack());
        self.build(&stack, path, true)
    }

    fn root_only(stack: &Arc<LayerStack>, path: &Path) -> PrimIndex {
        PrimIndex {
            path: path.clone(),
            nodes: vec![Node {
                layer_stack: Arc::clone(stack),
                path: path.clone(),
                arc: ArcType::Root,
                map_to_root: MapFunction::identity(),
                parent: None,
                sibling_num: 0,
                namespace_depth: 0,
                depth: 0,
            }],
            diagnostics: Vec::new(),
        }
    }

    fn parent_index(
        &mut self,
        stack: &Arc<LayerStack>,
        parent: &Path,
        top: bool,
    ) -> Arc<PrimIndex> {
        // Only the stage's own ancestor chain goes through the per-path slots; every other
        // request uses the non-blocking memo so waits always point up the namespace.
        if top && Arc::ptr_eq(stack, self.cache.root_stack()) {
            self.cache.prim_index(parent)
        } else {
            self.subgraph(stack, parent)
        }
    }

    fn subgraph(&mut self, stack: &Arc<LayerStack>, path: &Path) -> Arc<PrimIndex> {
        if let Some(hit) = self.cache.memo_get(stack.id(), path) {
            // A memoized graph that reaches a site being composed here has to be rebuilt so
            // the cycle is cut at the same place any query order would cut it.
            if !hit.nodes.iter().any(|n| {
                self.in_progress_position(n.layer_stack.id(), &n.path)
                    .is_some()
            }) {
                return hit;
            }
        }

        let start = self.in_progress.len();
        let outer = std::mem::replace(&mut self.cycle_floor, usize::MAX);
        let index = Arc::new(self.build(stack, path, false));
        let floor = self.cycle_floor;
        self.cycle_floor = outer.min(floor);

        if floor >= start {
            self.cache.memo_insert(stack.id(), path, Arc::clone(&index));
        } else {
            tracing::trace!(%path, "subgraph depends on its caller, not memoized");
        }
        index
    }

    fn build(&mut self, stack: &Arc<LayerStack>, path: &Path, top: bool) -> PrimIndex {
        let (Some(parent), Some(name)) = (path.parent(), path.name()) else {
            return Self::root_only(stack, path);
        };
        let parent_index = self.parent_index(stack, &parent, top);
        let mut graph = Graph::from_parent(&parent_index, name);
        let mut diagnostics = Vec::new();

        self.in_progress.push((stack.id(), path.clone()));
        let ancestral = graph.nodes.len();
        for i in graph.preorder() {
            if i < ancestral {
                self.expand(&mut graph, i, path, &mut diagnostics);
            }
        }
        self.in_progress.pop();

        graph.into_index(path, diagnostics)
    }

    fn expand(
        &mut self,
        g: &mut Graph,
        i: usize,
        composed: &Path,
        diags: &mut Vec<CompositionError>,
    ) {
        let stack = Arc::clone(&g.nodes[i].layer_stack);
        let site = g.nodes[i].path.clone();

        let references: Vec<Reference> = stack.compose_list_op(&site, fields::REFERENCES);
        for (k, r) in references.into_iter().enumerate() {
            self.add_reference(g, i, k, r, composed, diags);
        }

        let inherits: Vec<Path> = stack.compose_list_op(&site, fields::INHERITS);
        for (k, class) in inherits.into_iter().enumerate() {
            let map = MapFunction::new_with_identity(class.clone(), site.clone());
            self.graft(
                g,
                i,
                k,
                ArcType::Inherit,
                Arc::clone(&stack),
                class,
                map,
                composed,
                diags,
            );
        }

        self.add_variants(g, i, composed, diags);

        let specializes: Vec<Path> = stack.compose_list_op(&site, fields::SPECIALIZES);
        for (k, base) in specializes.into_iter().enumerate() {
            let map = MapFunction::new_with_identity(base.clone(), site.clone());
            self.graft(
                g,
                i,
                k,
                ArcType::Specialize,
                Arc::clone(&stack),
                base,
                map,
                composed,
                diags,
            );
        }
    }

    fn add_reference(
        &mut self,
        g: &mut Graph,
        i: usize,
        sibling: usize,
        reference: Reference,
        composed: &Path,
        diags: &mut Vec<CompositionError>,
    ) {
        let stack = if reference.is_internal() {
            Arc::clone(&g.nodes[i].layer_stack)
        } else {
            match Layer::find(&reference.asset_path) {
                Some(layer) => self.cache.layer_stack_for(&layer),
                None => {
                    self.report(
                        diags,
                        CompositionError::new(
                            CompositionErrorKind::UnresolvedLayer,
                            composed,
                            format!("reference to unknown layer '{}'", reference.asset_path),
                        ),
                    );
                    return;
                }
            }
        };

        let target = match reference.prim_path {
            Some(p) => p,
            None => {
                let root = stack.root_layer();
                match root
                    .default_prim()
                    .and_then(|name| Path::absolute_root().append_child(name.as_str()).ok())
                {
                    Some(p) => p,
                    None => {
                        self.report(
                            diags,
                            CompositionError::new(
                                CompositionErrorKind::MissingDefaultPrim,
                                composed,
                                format!("layer '{}' has no default prim", root.identifier()),
                            ),
                        );
                        return;
                    }
                }
            }
        };

        let site = g.nodes[i].path.clone();
        let map = MapFunction::new(target.clone(), site, reference.layer_offset);
        self.graft(
            g,
            i,
            sibling,
            ArcType::Reference,
            stack,
            target,
            map,
            composed,
            diags,
        );
    }

    fn add_variants(
        &mut self,
        g: &mut Graph,
        i: usize,
        composed: &Path,
        diags: &mut Vec<CompositionError>,
    ) {
        let stack = Arc::clone(&g.nodes[i].layer_stack);
        let site = g.nodes[i].path.clone();
        let sets: Vec<Token> = stack.compose_list_op(&site, fields::VARIANT_SET_NAMES);

        for (k, set) in sets.iter().enumerate() {
            let authored = g.authored_selection(set);
            let selection = match &authored {
                Some(sel) => Some(sel.clone()),
                None => self.cache.fallback_selection(set.as_str(), |v| {
                    site.append_variant_selection(set.as_str(), v)
                        .is_ok_and(|p| stack.has_spec(&p))
                }),
            };
            let Some(selection) = selection.filter(|s| !s.is_empty()) else {
                continue;
            };

            let var_path = match site.append_variant_selection(set.as_str(), &selection) {
                Ok(p) => p,
                Err(e) => {
                    self.report(
                        diags,
                        CompositionError::new(
                            CompositionErrorKind::InvalidTarget,
                            composed,
                            e.to_string(),
                        ),
                    );
                    continue;
                }
            };
            if !stack.has_spec(&var_path) {
                if authored.is_some() {
                    self.report(
                        diags,
                        CompositionError::new(
                            CompositionErrorKind::MissingVariant,
                            composed,
                            format!("no spec for selected variant {var_path}"),
                        ),
                    );
                }
                continue;
            }

            let parent = &g.nodes[i];
            let node = Node {
                layer_stack: Arc::clone(&stack),
                path: var_path.clone(),
                arc: ArcType::Variant,
                map_to_root: parent
                    .map_to_root
                    .compose(&MapFunction::new_with_identity(var_path, site.clone())),
                parent: Some(i),
                sibling_num: k,
                namespace_depth: composed.element_count(),
                depth: parent.depth + 1,
            };
            let idx = g.add(node);
            self.expand(g, idx, composed, diags);
        }
    }

    fn in_progress_position(&self, stack: LayerStackId, path: &Path) -> Option<usize> {
        self.in_progress
            .iter()
            .position(|(id, p)| *id == stack && (p.has_prefix(path) || path.has_prefix(p)))
    }

    // Whether `path` collides with a site being composed, remembering how far out it reached.
    fn collides(&mut self, stack: LayerStackId, path: &Path) -> bool {
        match self.in_progress_position(stack, path) {
            Some(pos) => {
                self.cycle_floor = self.cycle_floor.min(pos);
                true
            }
            None => false,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn graft(
        &mut self,
        g: &mut Graph,
        parent: usize,
        sibling: usize,
        arc: ArcType,
        stack: Arc<LayerStack>,
        target: Path,
        local: MapFunction,
        composed: &Path,
        diags: &mut Vec<CompositionError>,
    ) {
        if !target.is_prim_path() || target.contains_variant_selection() {
            self.report(
                diags,
                CompositionError::new(
                    CompositionErrorKind::InvalidTarget,
                    composed,
                    format!("{arc:?} target {target} is not a prim path"),
                ),
            );
            return;
        }
        if self.collides(stack.id(), &target) {
            self.report(
                diags,
                CompositionError::new(
                    CompositionErrorKind::ArcCycle,
                    composed,
                    format!(
                        "{arc:?} to {target} in '{}'",
                        stack.root_layer().identifier()
                    ),
                ),
            );
            return;
        }
        if self.in_progress.len() >= self.cache.max_depth() {
            self.cycle_floor = 0;
            self.report(
                diags,
                CompositionError::new(
                    CompositionErrorKind::DepthLimit,
                    composed,
                    format!("{arc:?} to {target} exceeds the composition depth bound"),
                ),
            );
            return;
        }

        let sub = self.subgraph(&stack, &target);
        let mut collided = false;
        for n in &sub.nodes {
            collided |= self.collides(n.layer_stack.id(), &n.path);
        }
        if collided {
            self.report(
                diags,
                CompositionError::new(
                    CompositionErrorKind::ArcCycle,
                    composed,
                    format!("{arc:?} to {target} leads back to a site being composed"),
                ),
            );
            return;
        }
        diags.extend(sub.diagnostics.iter().cloned());

        let (map, base_depth) = {
            let p = &g.nodes[parent];
            (p.map_to_root.compose(&local), p.depth + 1)
        };
        let mut remap = Vec::with_capacity(sub.nodes.len());
        for (j, n) in sub.nodes.iter().enumerate() {
            let node = if j == 0 {
                Node {
                    layer_stack: Arc::clone(&n.layer_stack),
                    path: n.path.clone(),
                    arc,
                    map_to_root: map.clone(),
                    parent: Some(parent),
                    sibling_num: sibling,
                    namespace_depth: composed.element_count(),
                    depth: base_depth,
                }
            } else {
                Node {
                    map_to_root: map.compose(&n.map_to_root),
                    parent: n.parent.map(|q| remap[q]),
                    depth: base_depth + n.depth,
                    ..n.clone()
                }
            };
            remap.push(g.add(node));
        }
    }

    fn report(&self, diags: &mut Vec<CompositionError>, e: CompositionError) {
        tracing::warn!(kind = ?e.kind, site = %e.site, "dropping arc: {}", e.message);
        diags.push(e);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compose/builder.rs"]
mod tests;
