//! Incrementally maintained inverse link index.
//!
//! For every link target the index records which `(source type, property,
//! source object)` triples point at it, with a multiplicity so that a list
//! holding the same target twice is counted twice.

use crate::object::ObjectId;
use std::collections::{BTreeMap, HashMap};

/// Key of one inbound link: `(source type, property, source object)`.
pub(crate) type LinkSource = (String, String, ObjectId);

#[derive(Debug, Clone, Default)]
pub(crate) struct BacklinkIndex {
    inbound: HashMap<ObjectId, BTreeMap<LinkSource, u32>>,
}

impl BacklinkIndex {
    /// Records one link from `source` to `target`.
    pub fn add(&mut self, target: ObjectId, source_type: &str, property: &str, source: ObjectId) {
        *self
            .inbound
            .entry(target)
            .or_default()
            .entry((source_type.to_string(), property.to_string(), source))
            .or_insert(0) += 1;
    }

    /// Removes one link from `source` to `target`.
    pub fn remove(&mut self, target: ObjectId, source_type: &str, property: &str, source: ObjectId) {
        let Some(sources) = self.inbound.get_mut(&target) else {
            return;
        };
        let key = (source_type.to_string(), property.to_string(), source);
        if let Some(count) = sources.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                sources.remove(&key);
            }
        }
        if sources.is_empty() {
            self.inbound.remove(&target);
        }
    }

    /// Returns the distinct sources linking to `target` through
    /// `source_type.property`, in no particular order.
    pub fn sources(&self, target: ObjectId, source_type: &str, property: &str) -> Vec<ObjectId> {
        self.inbound
            .get(&target)
            .map(|sources| {
                sources
                    .keys()
                    .filter(|(t, p, _)| t == source_type && p == property)
                    .map(|(_, _, id)| *id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Removes and returns every inbound link of `target`.
    pub fn take_all(&mut self, target: ObjectId) -> Vec<LinkSource> {
        self.inbound
            .remove(&target)
            .map(|sources| sources.into_keys().collect())
            .unwrap_or_default()
    }

    /// Number of link targets currently indexed.
    #[cfg(test)]
    pub fn target_count(&self) -> usize {
        self.inbound.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_duplicate_links() {
        let mut index = BacklinkIndex::default();
        let post = ObjectId::new();
        let user = ObjectId::new();

        index.add(post, "User", "posts", user);
        index.add(post, "User", "posts", user);
        assert_eq!(index.sources(post, "User", "posts"), vec![user]);

        index.remove(post, "User", "posts", user);
        assert_eq!(index.sources(post, "User", "posts"), vec![user]);

        index.remove(post, "User", "posts", user);
        assert!(index.sources(post, "User", "posts").is_empty());
        assert_eq!(index.target_count(), 0);
    }

    #[test]
    fn sources_filter_by_property() {
        let mut index = BacklinkIndex::default();
        let target = ObjectId::new();
        let a = ObjectId::new();
        let b = ObjectId::new();

        index.add(target, "User", "posts", a);
        index.add(target, "User", "drafts", b);

        assert_eq!(index.sources(target, "User", "posts"), vec![a]);
        assert_eq!(index.sources(target, "User", "drafts"), vec![b]);
        assert!(index.sources(target, "Team", "posts").is_empty());
    }

    #[test]
    fn take_all_clears_target() {
        let mut index = BacklinkIndex::default();
        let target = ObjectId::new();
        index.add(target, "User", "posts", ObjectId::new());
        index.add(target, "User", "drafts", ObjectId::new());

        assert_eq!(index.take_all(target).len(), 2);
        assert_eq!(index.target_count(), 0);
    }
}
