use crate::foundation::token::Token;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, Weak};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Element {
    AbsoluteRoot,
    Prim(Token),
    VariantSelection { set: Token, selection: Token },
    Property(Token),
}

impl Element {
    fn kind_rank(&self) -> u8 {
        match self {
            Self::AbsoluteRoot => 0,
            Self::Prim(_) => 1,
            Self::VariantSelection { .. } => 2,
            Self::Property(_) => 3,
        }
    }

    pub(crate) fn cmp_element(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match self.kind_rank().cmp(&other.kind_rank()) {
            Ordering::Equal => {}
            o => return o,
        }
        match (self, other) {
            (Self::Prim(a), Self::Prim(b)) | (Self::Property(a), Self::Property(b)) => a.cmp(b),
            (
                Self::VariantSelection {
                    set: sa,
                    selection: la,
                },
                Self::VariantSelection {
                    set: sb,
                    selection: lb,
                },
            ) => sa.cmp(sb).then_with(|| la.cmp(lb)),
            _ => Ordering::Equal,
        }
    }
}

#[derive(Debug)]
pub(crate) struct PathNode {
    pub(crate) text: Box<str>,
    pub(crate) parent: Option<super::Path>,
    pub(crate) element: Element,
    pub(crate) depth: u32,
}

type Table = HashMap<Box<str>, Weak<PathNode>>;

fn table() -> &'static Mutex<Table> {
    static TABLE: OnceLock<Mutex<Table>> = OnceLock::new();
    TABLE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Return the live node for `text`, creating it from `parent` + `element` when absent.
pub(crate) fn intern(
    text: String,
    parent: Option<&super::Path>,
    element: Element,
) -> Arc<PathNode> {
    let mut t = table().lock().unwrap_or_else(|e| e.into_inner());
    if let Some(live) = t.get(text.as_str()).and_then(Weak::upgrade) {
        return live;
    }
    let depth = parent.map_or(0, |p| p.0.depth + 1);
    let node = Arc::new(PathNode {
        text: text.clone().into_boxed_str(),
        parent: parent.cloned(),
        element,
        depth,
    });
    t.insert(text.into_boxed_str(), Arc::downgrade(&node));
    node
}

/// Number of live entries in the process-wide table.
pub(crate) fn live_count() -> usize {
    let t = table().lock().unwrap_or_else(|e| e.into_inner());
    t.values().filter(|w| w.strong_count() > 0).count()
}

pub(crate) fn is_interned(text: &str) -> bool {
    let t = table().lock().unwrap_or_else(|e| e.into_inner());
    t.get(text).is_some_and(|w| w.strong_count() > 0)
}

impl Drop for PathNode {
    fn drop(&mut self) {
        let me = self as *const PathNode;
        let mut t = table().lock().unwrap_or_else(|e| e.into_inner());
        // Another thread may already have re-interned the same text.
        if t.get(&*self.text)
            .is_some_and(|w| std::ptr::eq(w.as_ptr(), me))
        {
            t.remove(&*self.text);
        }
    }
}
