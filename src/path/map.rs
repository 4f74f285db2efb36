use crate::foundation::core::LayerOffset;
use crate::path::Path;
use smallvec::{SmallVec, smallvec};

/// Namespace and time mapping from a composition node's site into the stage namespace.
///
/// Each pair maps a source prefix to a target prefix; a path is translated through the pair
/// with the longest matching source prefix. Paths outside every source prefix do not map.
#[derive(Clone, Debug, PartialEq)]
pub struct MapFunction {
    pairs: SmallVec<[(Path, Path); 2]>,
    time_offset: LayerOffset,
}

impl MapFunction {
    /// Map every path to itself.
    pub fn identity() -> Self {
        Self {
            pairs: smallvec![(Path::absolute_root(), Path::absolute_root())],
            time_offset: LayerOffset::IDENTITY,
        }
    }

    /// Map `source` (and its descendants) onto `target`.
    pub fn new(source: Path, target: Path, time_offset: LayerOffset) -> Self {
        Self {
            pairs: smallvec![(source, target)],
            time_offset,
        }
    }

    /// Same as [`MapFunction::new`] with an additional identity pair so paths outside `source`
    /// keep their global meaning (class-like arcs).
    pub fn new_with_identity(source: Path, target: Path) -> Self {
        let mut m = Self::new(source, target, LayerOffset::IDENTITY);
        m.pairs.push((Path::absolute_root(), Path::absolute_root()));
        m
    }

    /// Return `true` for the identity mapping.
    pub fn is_identity(&self) -> bool {
        self.time_offset.is_identity()
            && self
                .pairs
                .iter()
                .all(|(s, t)| s.is_absolute_root() && t.is_absolute_root())
    }

    /// Time offset from node time into stage time.
    pub fn time_offset(&self) -> LayerOffset {
        self.time_offset
    }

    /// Translate `path` from the node namespace into the target namespace.
    pub fn map_source_to_target(&self, path: &Path) -> Option<Path> {
        let (source, target) = self
            .pairs
            .iter()
            .filter(|(s, _)| path.has_prefix(s))
            .max_by_key(|(s, _)| s.element_count())?;
        path.replace_prefix(source, target)
            .map(|p| p.strip_variant_selections())
    }

    /// Mapping equivalent to applying `inner` and then `self`.
    pub fn compose(&self, inner: &MapFunction) -> MapFunction {
        if self.is_identity() {
            return inner.clone();
        }
        if inner.is_identity() {
            return self.clone();
        }
        let mut pairs: SmallVec<[(Path, Path); 2]> = SmallVec::new();
        for (s, t) in &inner.pairs {
            if let Some(mapped) = self.map_source_to_target(t) {
                if !pairs.iter().any(|(ps, _)| ps == s) {
                    pairs.push((s.clone(), mapped));
                }
            }
        }
        MapFunction {
            pairs,
            time_offset: self.time_offset.then_outer(inner.time_offset),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/path/map.rs"]
mod tests;
