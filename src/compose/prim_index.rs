use crate::compose::diagnostic::CompositionError;
use crate::compose::layer_stack::LayerStack;
use crate::layer::Layer;
use crate::path::Path;
use crate::path::map::MapFunction;
use std::sync::Arc;
use xxhash_rust::xxh3::Xxh3;

const XXH3_SEED: u64 = 0x5c3e_9a17_d2b4_6f01;

/// Kind of arc that introduced a node. Declaration order is strength order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArcType {
    /// The prim's own site in the root layer stack.
    Root,
    /// A reference arc.
    Reference,
    /// An inherit arc.
    Inherit,
    /// A selected variant.
    Variant,
    /// A specialize arc.
    Specialize,
}

impl ArcType {
    fn code(self) -> u8 {
        match self {
            Self::Root => 0,
            Self::Reference => 1,
            Self::Inherit => 2,
            Self::Variant => 3,
            Self::Specialize => 4,
        }
    }
}

/// One contributing site of a prim index.
#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) layer_stack: Arc<LayerStack>,
    pub(crate) path: Path,
    pub(crate) arc: ArcType,
    pub(crate) map_to_root: MapFunction,
    pub(crate) parent: Option<usize>,
    pub(crate) sibling_num: usize,
    pub(crate) namespace_depth: usize,
    pub(crate) depth: usize,
}

impl Node {
    /// Layer stack holding this node's opinions.
    pub fn layer_stack(&self) -> &Arc<LayerStack> {
        &self.layer_stack
    }

    /// Site path within the node's layer stack.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Arc that introduced the node.
    pub fn arc(&self) -> ArcType {
        self.arc
    }

    /// Mapping from the node's namespace and time into the stage.
    pub fn map_to_root(&self) -> &MapFunction {
        &self.map_to_root
    }

    /// Index of the parent node in [`PrimIndex::nodes`]; `None` for the root node.
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// Number of arcs between the root node and this node.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Return `true` when any layer of the node's stack has a spec at the site.
    pub fn has_specs(&self) -> bool {
        self.layer_stack.has_spec(&self.path)
    }

    // Ordering key among siblings: arc strength, deeper introduction first, authored order.
    pub(crate) fn sibling_key(&self) -> (ArcType, std::cmp::Reverse<usize>, usize) {
        (
            self.arc,
            std::cmp::Reverse(self.namespace_depth),
            self.sibling_num,
        )
    }
}

/// Strength-ordered contributing sites for one composed prim.
#[derive(Clone, Debug)]
pub struct PrimIndex {
    pub(crate) path: Path,
    pub(crate) nodes: Vec<Node>,
    pub(crate) diagnostics: Vec<CompositionError>,
}

/// Stable 128-bit digest of a prim index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IndexFingerprint {
    /// High 64 bits.
    pub hi: u64,
    /// Low 64 bits.
    pub lo: u64,
}

impl PrimIndex {
    /// Composed path this index describes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Nodes, strongest first.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// The root node (the prim's site in the root layer stack).
    pub fn root_node(&self) -> &Node {
        &self.nodes[0]
    }

    /// Return `true` when any node has a spec.
    pub fn has_specs(&self) -> bool {
        self.nodes.iter().any(Node::has_specs)
    }

    /// Composition problems found while building this index.
    pub fn diagnostics(&self) -> &[CompositionError] {
        &self.diagnostics
    }

    /// `(node, layer)` pairs in strength order.
    pub fn sites(&self) -> impl Iterator<Item = (&Node, &Arc<Layer>)> {
        self.nodes
            .iter()
            .flat_map(|n| n.layer_stack.layers().iter().map(move |l| (n, l)))
    }

    /// Stable digest of the node list; equal indices give equal digests.
    pub fn fingerprint(&self) -> IndexFingerprint {
        let mut h = StableHasher::new();
        h.write_str(self.path.as_str());
        h.write_u32(self.nodes.len() as u32);
        for n in &self.nodes {
            h.write_u8(n.arc.code());
            h.write_str(n.layer_stack.root_layer().identifier());
            h.write_u32(n.layer_stack.layers().len() as u32);
            h.write_str(n.path.as_str());
            h.write_u64(n.parent.map_or(u64::MAX, |p| p as u64));
            let offset = n.map_to_root.time_offset();
            h.write_f64(offset.offset);
            h.write_f64(offset.scale);
        }
        h.finish()
    }
}

struct StableHasher {
    inner: Xxh3,
}

impl StableHasher {
    fn new() -> Self {
        Self {
            inner: Xxh3::with_seed(XXH3_SEED),
        }
    }

    fn write_bytes(&mut self, b: &[u8]) {
        self.inner.update(b);
    }

    fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        self.write_u64(v.to_bits());
    }

    fn write_str(&mut self, s: &str) {
        self.write_u32(s.len() as u32);
        self.write_bytes(s.as_bytes());
    }

    fn finish(self) -> IndexFingerprint {
        let v = self.inner.digest128();
        IndexFingerprint {
            hi: (v >> 64) as u64,
            lo: v as u64,
        }
    }
}
