//! Timestamped, versioned collection underlying every MarketView container
//!
//! Mutation happens only on the single writer task. External observers poll
//! the version counter or hold the `Notify` handle and block until fresh
//! data arrives; there are no change events.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::Notify;

pub struct VersionedMap<K, V> {
    items: HashMap<K, V>,
    updated: DateTime<Utc>,
    version: u64,
    notify: Arc<Notify>,
}

impl<K, V> Default for VersionedMap<K, V> {
    fn default() -> Self {
        Self {
            items: HashMap::new(),
            updated: DateTime::<Utc>::MIN_UTC,
            version: 0,
            notify: Arc::new(Notify::new()),
        }
    }
}

impl<K: Eq + Hash, V> VersionedMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.items.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.items.get_mut(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.items.contains_key(key)
    }

    /// Insert without bumping the version. Callers batch their mutations
    /// and finish with a single `touch`.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.items.insert(key, value)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.items.remove(key)
    }

    pub fn entry(&mut self, key: K) -> std::collections::hash_map::Entry<'_, K, V> {
        self.items.entry(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.items.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.items.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.items.values_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.items.keys()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Mark the collection freshly updated and wake blocked consumers.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated = now;
        self.version += 1;
        self.notify.notify_waiters();
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.updated
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Handle a consumer can hold to block until the next `touch`.
    pub fn watch(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_bumps_version_and_timestamp() {
        let mut map: VersionedMap<String, u32> = VersionedMap::new();
        assert_eq!(map.version(), 0);

        map.insert("a".into(), 1);
        let now = Utc::now();
        map.touch(now);

        assert_eq!(map.version(), 1);
        assert_eq!(map.last_updated(), now);
        assert_eq!(map.get(&"a".to_string()), Some(&1));
    }

    #[tokio::test]
    async fn watch_wakes_on_touch() {
        let mut map: VersionedMap<String, u32> = VersionedMap::new();
        let notify = map.watch();
        let waiter = notify.notified();
        tokio::pin!(waiter);
        // Arm the waiter before touching so the wakeup is not lost.
        waiter.as_mut().enable();

        map.touch(Utc::now());
        waiter.await;
    }
}
