//! Propagation bookkeeping
//!
//! [`PropagationByResource`] records which resources need which operation for
//! a given identity change, before any task is built. Upstream layers
//! (workflow, data binders) add directives as they discover them; `purge()`
//! then collapses conflicting directives so that no resource is slated for
//! more than one operation.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::types::ResourceOperation;

/// Map of operation → set of resource keys, plus per-key "old
/// connector-object-key" tracking for renames decided upstream.
///
/// The key type is usually the resource key (`String`); for linked accounts
/// it is a `(resource, connector-object-key)` pair.
#[derive(Debug, Clone, Default)]
pub struct PropagationByResource<K = String>
where
    K: Clone + Eq + Hash,
{
    sets: HashMap<ResourceOperation, HashSet<K>>,
    /// Latest operation requested per key, with the sequence of that add.
    last_added: HashMap<K, (ResourceOperation, u64)>,
    old_conn_object_keys: HashMap<K, String>,
    seq: u64,
}

impl<K> PropagationByResource<K>
where
    K: Clone + Eq + Hash,
{
    /// Create an empty bookkeeping map.
    pub fn new() -> Self {
        Self {
            sets: HashMap::new(),
            last_added: HashMap::new(),
            old_conn_object_keys: HashMap::new(),
            seq: 0,
        }
    }

    /// Record that `key` needs `operation`. Returns true if the directive was
    /// not already present.
    pub fn add(&mut self, operation: ResourceOperation, key: K) -> bool {
        self.seq += 1;
        self.last_added.insert(key.clone(), (operation, self.seq));
        self.sets.entry(operation).or_default().insert(key)
    }

    /// Record that each key in `keys` needs `operation`.
    pub fn add_all(&mut self, operation: ResourceOperation, keys: impl IntoIterator<Item = K>) {
        for key in keys {
            self.add(operation, key);
        }
    }

    /// Merge another bookkeeping map into this one. Directives from `other`
    /// count as added after everything already present.
    pub fn merge(&mut self, other: &PropagationByResource<K>) {
        for (operation, keys) in &other.sets {
            self.sets
                .entry(*operation)
                .or_default()
                .extend(keys.iter().cloned());
        }

        let mut latest: Vec<(&K, &(ResourceOperation, u64))> = other.last_added.iter().collect();
        latest.sort_by_key(|(_, (_, seq))| *seq);
        for (key, (operation, _)) in latest {
            self.seq += 1;
            self.last_added.insert(key.clone(), (*operation, self.seq));
        }

        self.old_conn_object_keys.extend(
            other
                .old_conn_object_keys
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
    }

    /// Remove a single directive.
    pub fn remove(&mut self, operation: ResourceOperation, key: &K) -> bool {
        self.sets
            .get_mut(&operation)
            .map(|set| set.remove(key))
            .unwrap_or(false)
    }

    /// Remove the given keys from one operation only.
    pub fn remove_all_for<Q>(&mut self, operation: ResourceOperation, keys: &[Q])
    where
        Q: PartialEq<K>,
    {
        if let Some(set) = self.sets.get_mut(&operation) {
            set.retain(|k| !keys.iter().any(|q| q == k));
        }
    }

    /// Remove the given keys from every operation.
    pub fn remove_all<Q>(&mut self, keys: &[Q])
    where
        Q: PartialEq<K>,
    {
        for set in self.sets.values_mut() {
            set.retain(|k| !keys.iter().any(|q| q == k));
        }
    }

    /// Keep only the given keys, under every operation.
    pub fn retain_all<Q>(&mut self, keys: &[Q])
    where
        Q: PartialEq<K>,
    {
        for set in self.sets.values_mut() {
            set.retain(|k| keys.iter().any(|q| q == k));
        }
    }

    /// Remove every key matching the predicate, under every operation.
    pub fn remove_if(&mut self, mut predicate: impl FnMut(&K) -> bool) {
        for set in self.sets.values_mut() {
            set.retain(|k| !predicate(k));
        }
    }

    /// Remove every key matching the predicate, under one operation only.
    pub fn remove_if_for(
        &mut self,
        operation: ResourceOperation,
        mut predicate: impl FnMut(&K) -> bool,
    ) {
        if let Some(set) = self.sets.get_mut(&operation) {
            set.retain(|k| !predicate(k));
        }
    }

    /// The keys currently slated for the given operation.
    pub fn get(&self, operation: ResourceOperation) -> HashSet<K> {
        self.sets.get(&operation).cloned().unwrap_or_default()
    }

    /// Whether the directive is present.
    pub fn contains(&self, operation: ResourceOperation, key: &K) -> bool {
        self.sets
            .get(&operation)
            .map(|set| set.contains(key))
            .unwrap_or(false)
    }

    /// Whether no directive is present.
    pub fn is_empty(&self) -> bool {
        self.sets.values().all(HashSet::is_empty)
    }

    /// One `(key, operation)` entry per key, in the order the winning
    /// directives were added. Call [`purge`](Self::purge) first: before
    /// purging, a key slated under several operations surfaces only with its
    /// most recent one.
    pub fn as_map(&self) -> Vec<(K, ResourceOperation)> {
        let mut entries: Vec<(K, ResourceOperation, u64)> = self
            .last_added
            .iter()
            .filter(|(key, (operation, _))| {
                self.sets
                    .get(operation)
                    .map(|set| set.contains(*key))
                    .unwrap_or(false)
            })
            .map(|(key, (operation, seq))| (key.clone(), *operation, *seq))
            .collect();
        entries.sort_by_key(|(_, _, seq)| *seq);
        entries
            .into_iter()
            .map(|(key, operation, _)| (key, operation))
            .collect()
    }

    /// Collapse conflicting directives.
    ///
    /// For each key slated under more than one operation, only the most
    /// recently added directive survives; operation sets left empty are
    /// dropped entirely. Returns true if anything was removed.
    pub fn purge(&mut self) -> bool {
        let mut changed = false;

        for (operation, set) in &mut self.sets {
            let before = set.len();
            set.retain(|key| {
                self.last_added
                    .get(key)
                    .map(|(winner, _)| winner == operation)
                    .unwrap_or(false)
            });
            changed |= set.len() != before;
        }

        let before = self.sets.len();
        self.sets.retain(|_, set| !set.is_empty());
        changed |= self.sets.len() != before;

        changed
    }

    /// Record the pre-rename connector-object-key for a key.
    pub fn set_old_conn_object_key(&mut self, key: K, old_conn_object_key: impl Into<String>) {
        self.old_conn_object_keys
            .insert(key, old_conn_object_key.into());
    }

    /// The pre-rename connector-object-key for a key, if a rename occurred
    /// upstream of propagation.
    pub fn get_old_conn_object_key(&self, key: &K) -> Option<&str> {
        self.old_conn_object_keys.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purge_later_wins() {
        let mut prop = PropagationByResource::new();
        prop.add(ResourceOperation::Create, "ldap".to_string());
        prop.add(ResourceOperation::Delete, "ldap".to_string());

        prop.purge();

        assert!(!prop.contains(ResourceOperation::Create, &"ldap".to_string()));
        assert!(prop.contains(ResourceOperation::Delete, &"ldap".to_string()));
        assert_eq!(prop.as_map().len(), 1);
    }

    #[test]
    fn test_purge_delete_then_create() {
        let mut prop = PropagationByResource::new();
        prop.add(ResourceOperation::Delete, "ldap".to_string());
        prop.add(ResourceOperation::Create, "ldap".to_string());

        prop.purge();

        assert_eq!(
            prop.as_map(),
            vec![("ldap".to_string(), ResourceOperation::Create)]
        );
    }

    #[test]
    fn test_purge_drops_empty_sets() {
        let mut prop = PropagationByResource::new();
        prop.add(ResourceOperation::Create, "ldap".to_string());
        prop.add(ResourceOperation::Update, "ldap".to_string());

        assert!(prop.purge());
        assert!(prop.get(ResourceOperation::Create).is_empty());
        assert!(!prop.is_empty());
    }

    #[test]
    fn test_no_conflict_no_change() {
        let mut prop = PropagationByResource::new();
        prop.add(ResourceOperation::Create, "ldap".to_string());
        prop.add(ResourceOperation::Update, "db".to_string());

        assert!(!prop.purge());
        assert_eq!(prop.as_map().len(), 2);
    }

    #[test]
    fn test_as_map_insertion_order() {
        let mut prop = PropagationByResource::new();
        prop.add(ResourceOperation::Update, "c".to_string());
        prop.add(ResourceOperation::Update, "a".to_string());
        prop.add(ResourceOperation::Update, "b".to_string());

        let keys: Vec<String> = prop.as_map().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_remove_all_and_retain() {
        let mut prop = PropagationByResource::new();
        prop.add(ResourceOperation::Create, "ldap".to_string());
        prop.add(ResourceOperation::Update, "db".to_string());
        prop.add(ResourceOperation::Delete, "rest".to_string());

        prop.remove_all(&["db".to_string()]);
        assert!(!prop.contains(ResourceOperation::Update, &"db".to_string()));

        prop.retain_all(&["ldap".to_string()]);
        assert!(prop.contains(ResourceOperation::Create, &"ldap".to_string()));
        assert!(!prop.contains(ResourceOperation::Delete, &"rest".to_string()));
    }

    #[test]
    fn test_merge_later_wins_across_maps() {
        let mut first = PropagationByResource::new();
        first.add(ResourceOperation::Create, "ldap".to_string());

        let mut second = PropagationByResource::new();
        second.add(ResourceOperation::Delete, "ldap".to_string());
        second.set_old_conn_object_key("ldap".to_string(), "uid=old");

        first.merge(&second);
        first.purge();

        assert_eq!(
            first.as_map(),
            vec![("ldap".to_string(), ResourceOperation::Delete)]
        );
        assert_eq!(
            first.get_old_conn_object_key(&"ldap".to_string()),
            Some("uid=old")
        );
    }

    #[test]
    fn test_pair_keys_for_linked_accounts() {
        let mut prop: PropagationByResource<(String, String)> = PropagationByResource::new();
        prop.add(
            ResourceOperation::Delete,
            ("ldap".to_string(), "uid=john.admin".to_string()),
        );
        prop.remove_if(|(resource, _)| resource == "db");

        assert_eq!(prop.as_map().len(), 1);
    }
}
