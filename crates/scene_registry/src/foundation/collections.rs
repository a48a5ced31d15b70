//! Specialized collection types

use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Generational key of one scene incarnation
    ///
    /// Removing a scene from the registry frees its slot; any record still
    /// holding the old key fails validity checks even if the slot is reused.
    pub struct SceneKey;
}

/// Handle-based map using slot map for stable references
pub type HandleMap<T> = SlotMap<SceneKey, T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removed_key_is_never_revalidated() {
        let mut map: HandleMap<&str> = HandleMap::with_key();
        let first = map.insert("a");
        map.remove(first);
        let second = map.insert("b");

        assert!(!map.contains_key(first));
        assert!(map.contains_key(second));
        assert_ne!(first, second);
    }
}
