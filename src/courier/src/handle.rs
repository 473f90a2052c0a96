use std::sync::{Arc, PoisonError, RwLock};

use fxhash::FxHashMap;

/// Memoized call handles, keyed by method name.
///
/// Lookups for a name that is already cached return the same `Arc`. Two
/// threads racing on a first lookup may both build a handle, but only one is
/// stored and both callers receive the stored one.
pub(crate) struct HandleCache<H> {
    handles: RwLock<FxHashMap<String, Arc<H>>>,
}

impl<H> HandleCache<H> {
    pub(crate) fn new() -> Self {
        Self {
            handles: RwLock::new(FxHashMap::default()),
        }
    }

    pub(crate) fn get_or_insert_with(&self, method: &str, build: impl FnOnce() -> H) -> Arc<H> {
        if let Some(handle) = self
            .handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(method)
        {
            return handle.clone();
        }

        let handle = Arc::new(build());
        let mut handles = self.handles.write().unwrap_or_else(PoisonError::into_inner);
        handles
            .entry(method.to_string())
            .or_insert_with(|| {
                tracing::trace!(method, "caching method handle");
                handle
            })
            .clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn same_name_returns_same_handle() {
        let cache = HandleCache::new();
        let a = cache.get_or_insert_with("add", || "add".to_string());
        let b = cache.get_or_insert_with("add", || unreachable!("already cached"));
        assert!(Arc::ptr_eq(&a, &b));

        let c = cache.get_or_insert_with("sub", || "sub".to_string());
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn concurrent_first_lookups_agree() {
        let cache = Arc::new(HandleCache::new());
        let builds = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let builds = builds.clone();
                std::thread::spawn(move || {
                    cache.get_or_insert_with("add", || builds.fetch_add(1, Ordering::SeqCst))
                })
            })
            .collect();
        let results: Vec<Arc<usize>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(builds.load(Ordering::SeqCst) >= 1);
        for result in &results {
            assert!(Arc::ptr_eq(result, &results[0]));
        }
        assert_eq!(cache.len(), 1);
    }
}
