//! Process-wide query cache shared by loaders, reducers and views.
//!
//! Values are stored as JSON so unrelated resources can share one map; typed
//! access decodes on the way out. Writes are last-write-wins per key and every
//! change is broadcast to subscribers.

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Ordered tuple of strings identifying a cached resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// Key constructors shared by every writer of a resource
pub mod keys {
    use super::QueryKey;

    pub fn scene_messages(scene_id: &str, character_id: &str) -> QueryKey {
        QueryKey::new(["scenes", scene_id, "characters", character_id, "messages"])
    }

    pub fn thread_analysis(scene_id: &str) -> QueryKey {
        QueryKey::new(["game-master", "threads", scene_id, "analysis"])
    }

    pub fn scene_generation(story_id: &str) -> QueryKey {
        QueryKey::new(["stories", story_id, "scene-generation"])
    }

    pub fn story_generation() -> QueryKey {
        QueryKey::new(["story-generation"])
    }

    pub fn latest_scene(story_id: &str) -> QueryKey {
        QueryKey::new(["latest-scene", story_id])
    }

    pub fn stories() -> QueryKey {
        QueryKey::new(["stories"])
    }

    pub fn chapters(story_id: &str) -> QueryKey {
        QueryKey::new(["chapters", story_id])
    }
}

/// Cloneable handle to the shared cache
#[derive(Clone)]
pub struct QueryCache {
    entries: Arc<DashMap<QueryKey, Value>>,
    changes: broadcast::Sender<QueryKey>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            entries: Arc::new(DashMap::new()),
            changes,
        }
    }

    /// Decode the entry at `key`; a value of the wrong shape reads as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        let value = self.entries.get(key)?.value().clone();
        decode(key, value)
    }

    pub fn get_raw(&self, key: &QueryKey) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: QueryKey, value: &T) {
        let Some(value) = encode(&key, value) else {
            return;
        };
        self.entries.insert(key.clone(), value);
        self.notify(key);
    }

    /// Read-modify-write while holding the entry's lock.
    pub fn update<T, F>(&self, key: QueryKey, f: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Option<T>) -> T,
    {
        let next = match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let next = f(decode(&key, occupied.get().clone()));
                if let Some(value) = encode(&key, &next) {
                    occupied.insert(value);
                }
                next
            }
            Entry::Vacant(vacant) => {
                let next = f(None);
                if let Some(value) = encode(&key, &next) {
                    vacant.insert(value);
                }
                next
            }
        };
        self.notify(key);
        next
    }

    pub fn remove(&self, key: &QueryKey) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.notify(key.clone());
        }
        removed
    }

    /// Drop every entry whose key starts with `prefix`; returns how many went.
    pub fn invalidate_prefix(&self, prefix: &QueryKey) -> usize {
        let stale: Vec<QueryKey> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();

        stale.iter().filter(|key| self.remove(key)).count()
    }

    /// Receive the key of every subsequent change
    pub fn subscribe(&self) -> broadcast::Receiver<QueryKey> {
        self.changes.subscribe()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn notify(&self, key: QueryKey) {
        // No subscribers is fine
        let _ = self.changes.send(key);
    }
}

fn decode<T: DeserializeOwned>(key: &QueryKey, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Cached value has unexpected shape");
            None
        }
    }
}

fn encode<T: Serialize + ?Sized>(key: &QueryKey, value: &T) -> Option<Value> {
    match serde_json::to_value(value) {
        Ok(encoded) => Some(encoded),
        Err(e) => {
            tracing::error!(key = %key, error = %e, "Failed to encode cache value");
            None
        }
    }
}
