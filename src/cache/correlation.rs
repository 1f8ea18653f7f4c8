//! Weakly-keyed association between caller objects and open spans.

use std::any::Any;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::cache::ExpiringCache;
use crate::span::SpanHandle;

struct CorrelationEntry {
    /// Keeps the key's allocation (not the value) alive, so the address the
    /// entry is filed under cannot be reused while the entry exists.
    key: Weak<dyn Any + Send + Sync>,
    span: SpanHandle,
}

/// Maps an arbitrary caller-supplied object to the span opened on its
/// behalf, for flows where completion is signalled by presenting the same
/// object again rather than by a call returning.
///
/// Keys are held weakly: the cache never extends the caller object's
/// lifetime, and entries whose key has been dropped read as absent. The TTL
/// of the underlying cache remains the authoritative bound on retention.
pub(crate) struct CorrelationCache {
    inner: ExpiringCache<usize, CorrelationEntry>,
}

impl CorrelationCache {
    pub(crate) fn new(ttl: Duration, max_entries: usize) -> Self {
        CorrelationCache {
            inner: ExpiringCache::new(ttl, max_entries),
        }
    }

    /// Associate `span` with the object behind `key`.
    pub(crate) fn associate<K>(&self, key: &Arc<K>, span: SpanHandle)
    where
        K: Any + Send + Sync,
    {
        let entry = CorrelationEntry {
            key: Arc::downgrade(&(Arc::clone(key) as Arc<dyn Any + Send + Sync>)),
            span,
        };
        self.inner.insert(address_of(key), entry);
    }

    /// Span previously associated with the object behind `key`, if the
    /// entry is still live and the key object still exists.
    pub(crate) fn lookup<K>(&self, key: &Arc<K>) -> Option<SpanHandle>
    where
        K: Any + Send + Sync,
    {
        let addr = address_of(key);
        let found = self.inner.get(&addr, |entry| {
            if entry.key.strong_count() > 0 {
                Some(entry.span.clone())
            } else {
                None
            }
        });
        match found {
            Some(Some(span)) => Some(span),
            Some(None) => {
                // key object dropped out from under the entry
                self.inner.remove(&addr);
                None
            }
            None => None,
        }
    }

    /// Drop the association for the object behind `key`.
    pub(crate) fn remove<K>(&self, key: &Arc<K>)
    where
        K: Any + Send + Sync,
    {
        self.inner.remove(&address_of(key));
    }
}

fn address_of<K>(key: &Arc<K>) -> usize {
    Arc::as_ptr(key) as *const () as usize
}
