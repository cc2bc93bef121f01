use std::collections::HashSet;
use std::hash::Hash;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta<T> {
    pub added: Vec<T>,
    pub removed: Vec<T>,
}

impl<T> Delta<T> {
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Items sharing a key are never reported, whatever else about them changed.
pub fn diff<T, K, F>(old: &[T], new: &[T], key: F) -> Delta<T>
where
    T: Clone,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let old_keys: HashSet<K> = old.iter().map(&key).collect();
    let new_keys: HashSet<K> = new.iter().map(&key).collect();

    let added = new
        .iter()
        .filter(|item| !old_keys.contains(&key(*item)))
        .cloned()
        .collect();
    let removed = old
        .iter()
        .filter(|item| !new_keys.contains(&key(*item)))
        .cloned()
        .collect();

    Delta { added, removed }
}

pub fn changes<T, K, F>(old: &[T], new: &[T], key: F) -> Option<Delta<T>>
where
    T: Clone + PartialEq,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    if old == new {
        return None;
    }
    Some(diff(old, new, key))
}
