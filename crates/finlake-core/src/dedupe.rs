use std::collections::HashMap;
use std::hash::Hash;

/// Keep the last item per key, preserving the order of survivors.
pub fn dedupe_keep_last<T, K, F>(items: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut last: HashMap<K, usize> = HashMap::new();
    for (idx, item) in items.iter().enumerate() {
        last.insert(key(item), idx);
    }
    items
        .into_iter()
        .enumerate()
        .filter(|(idx, item)| last.get(&key(item)) == Some(idx))
        .map(|(_, item)| item)
        .collect()
}
