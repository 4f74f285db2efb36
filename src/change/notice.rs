use crate::change::processor::ChangeSet;
use crate::path::Path;
use crate::stage::StageId;

/// Notice sent to stage subscribers once per closed change block that affected the stage.
///
/// `resynced_paths` and `changed_info_only_paths` are sorted and disjoint; no changed-info
/// path lies at or below a resynced path.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectsChanged {
    stage_id: StageId,
    resynced: Vec<Path>,
    changed_info: Vec<Path>,
}

impl ObjectsChanged {
    pub(crate) fn new(stage_id: StageId, changes: &ChangeSet) -> Self {
        let resynced: Vec<Path> = changes.resynced.iter().cloned().collect();
        let changed_info: Vec<Path> = changes.changed_info.iter().cloned().collect();
        let notice = Self {
            stage_id,
            resynced,
            changed_info,
        };
        for p in &notice.changed_info {
            assert!(
                !notice.resynced_object(p),
                "notice lists {p} as both resynced and changed-info"
            );
        }
        notice
    }

    /// Stage that sent the notice.
    pub fn stage_id(&self) -> StageId {
        self.stage_id
    }

    /// Roots of recomposed subtrees.
    pub fn resynced_paths(&self) -> &[Path] {
        &self.resynced
    }

    /// Objects whose values or metadata changed without recomposition.
    pub fn changed_info_only_paths(&self) -> &[Path] {
        &self.changed_info
    }

    /// Return `true` when `path` or one of its ancestors was resynced.
    pub fn resynced_object(&self, path: &Path) -> bool {
        path.ancestors()
            .any(|a| self.resynced.binary_search(&a).is_ok())
    }

    /// Return `true` when `path` itself changed info and was not resynced.
    pub fn changed_info_only(&self, path: &Path) -> bool {
        self.changed_info.binary_search(path).is_ok()
    }

    /// Return `true` when `path` was resynced or changed info.
    pub fn affected_object(&self, path: &Path) -> bool {
        self.resynced_object(path) || self.changed_info_only(path)
    }

    /// Return `true` when both path sets are empty.
    pub fn is_empty(&self) -> bool {
        self.resynced.is_empty() && self.changed_info.is_empty()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/change/notice.rs"]
mod tests;
