//! Sharded string interner.
//!
//! Interned strings live for the whole compilation; handles stay valid as
//! long as the interner does. Sharding keeps lock contention low when the
//! interner is shared, and packs the shard index into the [`Name`] handle
//! so lookups never hash.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::Name;

struct InternShard {
    map: FxHashMap<&'static str, u32>,
    strings: Vec<&'static str>,
}

impl InternShard {
    fn new() -> InternShard {
        InternShard {
            map: FxHashMap::default(),
            strings: Vec::with_capacity(256),
        }
    }

    fn with_empty() -> InternShard {
        let mut shard = InternShard::new();
        shard.map.insert("", 0);
        shard.strings.push("");
        shard
    }
}

/// String interner with per-shard locking.
///
/// Strings are leaked into `'static` storage; the interner is created once
/// per compilation and dropped with it, so the leak is bounded by the
/// compilation's own lifetime.
pub struct StringInterner {
    shards: [RwLock<InternShard>; Name::NUM_SHARDS],
}

impl StringInterner {
    pub fn new() -> StringInterner {
        let shards = std::array::from_fn(|i| {
            if i == 0 {
                RwLock::new(InternShard::with_empty())
            } else {
                RwLock::new(InternShard::new())
            }
        });
        StringInterner { shards }
    }

    fn shard_for(text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        use std::hash::{Hash, Hasher};
        let mut hasher = rustc_hash::FxHasher::default();
        text.hash(&mut hasher);
        (hasher.finish() as usize) % Name::NUM_SHARDS
    }

    /// Intern a string, returning its canonical handle.
    pub fn intern(&self, text: &str) -> Name {
        if text.is_empty() {
            return Name::EMPTY;
        }
        let shard_idx = Self::shard_for(text);
        let shard = &self.shards[shard_idx];

        {
            let guard = shard.read();
            if let Some(&local) = guard.map.get(text) {
                return Name::from_shard_local(shard_idx as u32, local);
            }
        }

        let mut guard = shard.write();
        // Double-check after upgrading to the write lock.
        if let Some(&local) = guard.map.get(text) {
            return Name::from_shard_local(shard_idx as u32, local);
        }

        let local = guard.strings.len() as u32;
        let stored: &'static str = Box::leak(text.to_owned().into_boxed_str());
        guard.strings.push(stored);
        guard.map.insert(stored, local);
        Name::from_shard_local(shard_idx as u32, local)
    }

    /// Resolve a handle back to its string.
    ///
    /// # Panics
    /// Panics if `name` did not come from this interner.
    pub fn lookup(&self, name: Name) -> &'static str {
        self.shards[name.shard()].read().strings[name.local()]
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        StringInterner::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_text_same_handle() {
        let interner = StringInterner::new();
        let a = interner.intern("hello");
        let b = interner.intern("hello");
        assert_eq!(a, b);
        assert_eq!(interner.lookup(a), "hello");
    }

    #[test]
    fn distinct_text_distinct_handles() {
        let interner = StringInterner::new();
        assert_ne!(interner.intern("a"), interner.intern("b"));
    }

    #[test]
    fn empty_string_is_preinterned() {
        let interner = StringInterner::new();
        assert_eq!(interner.intern(""), Name::EMPTY);
        assert_eq!(interner.lookup(Name::EMPTY), "");
    }
}
