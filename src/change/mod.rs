//! Change blocks, raw edit delivery and classification of edits into stage notices.

pub(crate) mod block;
pub(crate) mod notice;
pub(crate) mod processor;

pub use block::{ChangeBlock, EditKind, RawEdit, is_change_block_open, open_change_block};
pub use notice::ObjectsChanged;
pub use processor::is_structural_field;
