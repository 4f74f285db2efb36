use crate::foundation::error::{StageError, StageResult};
use crate::layer::layer::Layer;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, Weak};

type Registry = HashMap<String, Weak<Layer>>;

fn registry() -> &'static Mutex<Registry> {
    static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Register the layer built by `make` under `identifier`, failing if a live layer already
/// owns that identifier.
pub(crate) fn register_new(
    identifier: &str,
    make: impl FnOnce() -> Arc<Layer>,
) -> StageResult<Arc<Layer>> {
    let mut reg = registry().lock().unwrap_or_else(|e| e.into_inner());
    if reg.get(identifier).is_some_and(|w| w.strong_count() > 0) {
        return Err(StageError::coding(format!(
            "a layer with identifier '{identifier}' already exists"
        )));
    }
    let layer = make();
    reg.insert(identifier.to_string(), Arc::downgrade(&layer));
    Ok(layer)
}

/// Live layer registered under `identifier`.
pub(crate) fn find(identifier: &str) -> Option<Arc<Layer>> {
    let reg = registry().lock().unwrap_or_else(|e| e.into_inner());
    reg.get(identifier).and_then(Weak::upgrade)
}

/// Forget `identifier` if it still points at `layer`.
pub(crate) fn unregister(identifier: &str, layer: *const Layer) {
    let mut reg = registry().lock().unwrap_or_else(|e| e.into_inner());
    if reg
        .get(identifier)
        .is_some_and(|w| std::ptr::eq(w.as_ptr(), layer))
    {
        reg.remove(identifier);
    }
}
