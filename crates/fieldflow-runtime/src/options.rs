//! Option lists for dynamic fields.
//!
//! Lists are stored under the field name and, for lookups by loader key,
//! under the source key as well. A source key always shows the list of the
//! field that wrote it last.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use fieldflow_config::DynamicOption;

#[derive(Debug, Default)]
struct Inner {
  lists: HashMap<String, Vec<DynamicOption>>,
  /// Source key -> field that last wrote it.
  writers: HashMap<String, String>,
}

/// Last-write-wins option lists shared by a session and its fetch tasks.
#[derive(Debug, Clone, Default)]
pub struct OptionsStore {
  inner: Arc<RwLock<Inner>>,
}

impl OptionsStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, key: &str) -> Option<Vec<DynamicOption>> {
    let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
    inner.lists.get(key).cloned()
  }

  pub fn contains(&self, key: &str) -> bool {
    let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
    inner.lists.contains_key(key)
  }

  /// Store `options` under the field name and the source key.
  pub fn set(&self, field: &str, source_key: &str, options: Vec<DynamicOption>) {
    let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
    inner.lists.insert(source_key.to_string(), options.clone());
    inner.lists.insert(field.to_string(), options);
    inner
      .writers
      .insert(source_key.to_string(), field.to_string());
  }

  /// Remove the list stored for a field, and the source key's list when this
  /// field wrote it last.
  pub fn remove(&self, field: &str, source_key: &str) -> bool {
    let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
    if inner.writers.get(source_key).is_some_and(|w| w == field) {
      inner.writers.remove(source_key);
      inner.lists.remove(source_key);
    }
    inner.lists.remove(field).is_some()
  }

  pub fn clear(&self) {
    let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
    inner.lists.clear();
    inner.writers.clear();
  }

  /// Sorted copy of every stored list.
  pub fn snapshot(&self) -> BTreeMap<String, Vec<DynamicOption>> {
    let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
    inner
      .lists
      .iter()
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_set_writes_both_keys() {
    let store = OptionsStore::new();
    store.set("channel", "discord_channels", vec![DynamicOption::new("c1", "#general")]);

    assert_eq!(store.get("channel"), store.get("discord_channels"));
    assert_eq!(store.get("channel").map(|o| o.len()), Some(1));

    assert!(store.remove("channel", "discord_channels"));
    assert!(!store.contains("channel"));
    assert!(!store.contains("discord_channels"));
  }

  #[test]
  fn test_shared_source_kept_for_other_writer() {
    let store = OptionsStore::new();
    store.set("from_channel", "discord_channels", vec![DynamicOption::new("c1", "#general")]);
    store.set("to_channel", "discord_channels", vec![DynamicOption::new("c2", "#random")]);

    // `to_channel` wrote the source key last, so clearing `from_channel`
    // leaves it alone.
    assert!(store.remove("from_channel", "discord_channels"));
    assert!(!store.contains("from_channel"));
    assert_eq!(store.get("discord_channels"), store.get("to_channel"));

    assert!(store.remove("to_channel", "discord_channels"));
    assert!(!store.contains("discord_channels"));
  }

  #[test]
  fn test_snapshot_is_sorted() {
    let store = OptionsStore::new();
    store.set("b", "src_b", Vec::new());
    store.set("a", "src_a", Vec::new());

    let keys: Vec<_> = store.snapshot().into_keys().collect();
    assert_eq!(keys, vec!["a", "b", "src_a", "src_b"]);
  }
}
