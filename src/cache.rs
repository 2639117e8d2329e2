/// An entry in the cache.
struct Entry<K, V> {
    epoch: u64,
    key: K,
    value: V,
}

/// A least-recently-used cache with single-entry eviction.
///
/// Lookups are a linear scan, which stays cheap at the glyph-cache sizes
/// used here (on the order of a hundred entries).
pub(crate) struct LruCache<K, V> {
    entries: Vec<Entry<K, V>>,
    epoch: u64,
    max_entries: usize,
}

impl<K: PartialEq, V: Clone> LruCache<K, V> {
    pub(crate) fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            epoch: 0,
            max_entries: max_entries.max(1),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns the cached value for `key`, or builds, stores and returns
    /// one. The flag is `true` on a hit.
    pub(crate) fn get_or_insert_with<E>(
        &mut self,
        key: K,
        make: impl FnOnce() -> Result<V, E>,
    ) -> Result<(V, bool), E> {
        self.epoch += 1;
        let epoch = self.epoch;
        let mut oldest = 0;
        let mut oldest_epoch = u64::MAX;
        for (i, entry) in self.entries.iter_mut().enumerate() {
            if entry.key == key {
                entry.epoch = epoch;
                return Ok((entry.value.clone(), true));
            }
            if entry.epoch < oldest_epoch {
                oldest_epoch = entry.epoch;
                oldest = i;
            }
        }
        let value = make()?;
        let entry = Entry {
            epoch,
            key,
            value: value.clone(),
        };
        if self.entries.len() < self.max_entries {
            self.entries.push(entry);
        } else {
            self.entries[oldest] = entry;
        }
        Ok((value, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn get(cache: &mut LruCache<&'static str, i32>, key: &'static str, value: i32) -> bool {
        let (_, hit) = cache
            .get_or_insert_with(key, || Ok::<_, Infallible>(value))
            .expect("infallible");
        hit
    }

    #[test]
    fn existing_entry_is_not_rebuilt() {
        let mut cache = LruCache::new(3);
        assert!(!get(&mut cache, "a", 1));
        let (value, hit) = cache
            .get_or_insert_with("a", || Err::<i32, &str>("should not rebuild"))
            .expect("hit");
        assert!(hit);
        assert_eq!(value, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evicts_only_the_least_recently_used() {
        let mut cache = LruCache::new(3);
        get(&mut cache, "a", 1);
        get(&mut cache, "b", 2);
        get(&mut cache, "c", 3);
        assert!(get(&mut cache, "a", 0));

        assert!(!get(&mut cache, "d", 4));
        assert_eq!(cache.len(), 3);
        assert!(get(&mut cache, "a", 0));
        assert!(get(&mut cache, "c", 0));
        assert!(get(&mut cache, "d", 0));
        assert!(!get(&mut cache, "b", 2), "b should have been evicted");
    }

    #[test]
    fn failed_build_leaves_cache_untouched() {
        let mut cache: LruCache<u8, u8> = LruCache::new(2);
        assert!(cache.get_or_insert_with(1, || Err("boom")).is_err());
        assert_eq!(cache.len(), 0);
    }
}
