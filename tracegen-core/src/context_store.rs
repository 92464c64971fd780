//! Cross-trace context store (`spec.md` §4.5).
//!
//! A bounded, keyed registry of previously-exported span contexts so a
//! later "consumer" span can declare an asynchronous `Link` back to an
//! earlier "producer" span, even though the two live in different traces.
//! This is a shared-state channel with eviction, not a direct pointer to a
//! live span (`spec.md` §9): once a producer's context is evicted, later
//! lookups simply stop finding it.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::clock::now_unix_nanos;
use crate::ids::{SpanId, TraceId};

#[derive(Debug, Clone)]
pub struct ExportedContext {
    pub key: String,
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub inserted_at_unix_nanos: u128,
}

pub struct ContextStore {
    inner: Mutex<Inner>,
    max_size: usize,
}

struct Inner {
    entries: VecDeque<ExportedContext>,
}

impl ContextStore {
    pub fn new(max_size: usize) -> Self {
        ContextStore {
            inner: Mutex::new(Inner {
                entries: VecDeque::with_capacity(max_size.min(1024)),
            }),
            max_size: max_size.max(1),
        }
    }

    /// Insert a new context, evicting the oldest entry if the store is
    /// already at `max_size`. Never blocks the caller on contention beyond
    /// the brief critical section: traffic through this store is low.
    pub fn insert(&self, key: String, trace_id: TraceId, span_id: SpanId) {
        let mut inner = self.inner.lock().expect("context store mutex poisoned");
        if inner.entries.len() >= self.max_size {
            inner.entries.pop_front();
        }
        inner.entries.push_back(ExportedContext {
            key,
            trace_id,
            span_id,
            inserted_at_unix_nanos: now_unix_nanos(),
        });
    }

    /// Return every entry whose key matches `pattern` (`*` as a
    /// substring wildcard), oldest first.
    pub fn find(&self, pattern: &str) -> Vec<ExportedContext> {
        let inner = self.inner.lock().expect("context store mutex poisoned");
        inner
            .entries
            .iter()
            .filter(|e| glob_match(pattern, &e.key))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("context store mutex poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Match `text` against `pattern`, where `*` matches any (possibly empty)
/// substring. Case-sensitive, per `spec.md` §4.5.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let mut pos = 0usize;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !text[pos..].starts_with(part) {
                return false;
            }
            pos += part.len();
        } else if i == parts.len() - 1 {
            return text[pos..].ends_with(part) && text.len() - pos >= part.len();
        } else {
            match text[pos..].find(part) {
                Some(found) => pos += found + part.len(),
                None => return false,
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(1)
    }

    #[test]
    fn exact_key_round_trips() {
        let store = ContextStore::new(10);
        let mut r = rng();
        let t = TraceId::random(&mut r);
        let s = SpanId::random(&mut r);
        store.insert("k-abc".to_string(), t, s);
        let found = store.find("k-abc");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].trace_id.to_bytes(), t.to_bytes());
    }

    #[test]
    fn suffix_glob_matches() {
        let store = ContextStore::new(10);
        let mut r = rng();
        store.insert("k-111".to_string(), TraceId::random(&mut r), SpanId::random(&mut r));
        store.insert("k-222".to_string(), TraceId::random(&mut r), SpanId::random(&mut r));
        store.insert("other".to_string(), TraceId::random(&mut r), SpanId::random(&mut r));
        assert_eq!(store.find("k-*").len(), 2);
        assert_eq!(store.find("*").len(), 3);
    }

    #[test]
    fn store_never_exceeds_max_size() {
        let store = ContextStore::new(3);
        let mut r = rng();
        for i in 0..10 {
            store.insert(format!("k-{i}"), TraceId::random(&mut r), SpanId::random(&mut r));
        }
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn eviction_drops_oldest_first() {
        let store = ContextStore::new(2);
        let mut r = rng();
        store.insert("first".to_string(), TraceId::random(&mut r), SpanId::random(&mut r));
        store.insert("second".to_string(), TraceId::random(&mut r), SpanId::random(&mut r));
        store.insert("third".to_string(), TraceId::random(&mut r), SpanId::random(&mut r));
        assert!(store.find("first").is_empty());
        assert_eq!(store.find("second").len(), 1);
        assert_eq!(store.find("third").len(), 1);
    }

    #[test]
    fn glob_match_handles_prefix_suffix_and_middle_wildcards() {
        assert!(glob_match("k-*", "k-123"));
        assert!(!glob_match("k-*", "j-123"));
        assert!(glob_match("*-done", "job-done"));
        assert!(glob_match("k-*-done", "k-123-done"));
        assert!(!glob_match("k-*-done", "k-123"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
    }
}
