//! Insertion-ordered name -> children multimap shared by Config, Mold and Section payloads

use crate::context::NodeRef;
use crate::error::{Error, Result};
use std::rc::Rc;

/// Holds (name -> ordered list of child) with insertion order preserved across *all* keys,
/// so a global walk yields children in chronological order regardless of name.
#[derive(Default)]
pub struct ElementStorage {
    entries: Vec<(String, NodeRef)>,
}

impl ElementStorage {
    /// An empty element storage.
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Insert `ctx` under `name`. Duplicate `(name, ctx)` pairs are rejected with `Exists`.
    pub fn add(&mut self, name: &str, ctx: NodeRef) -> Result<()> {
        if self
            .entries
            .iter()
            .any(|(n, c)| n == name && Rc::ptr_eq(c, &ctx))
        {
            return Err(Error::Exists(format!("{name} already attached to this parent")));
        }
        self.entries.push((name.to_string(), ctx));
        Ok(())
    }

    /// Remove a specific `(name, ctx)` entry.
    pub fn remove(&mut self, name: &str, ctx: &NodeRef) -> Result<()> {
        let pos = self
            .entries
            .iter()
            .position(|(n, c)| n == name && Rc::ptr_eq(c, ctx));
        match pos {
            Some(i) => {
                self.entries.remove(i);
                Ok(())
            }
            None => Err(Error::NotExist(format!("{name} not attached to this parent"))),
        }
    }

    /// Snapshot of all children named `name`, in insertion order.
    pub fn get(&self, name: &str) -> Vec<NodeRef> {
        self.entries
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, c)| Rc::clone(c))
            .collect()
    }

    /// Snapshot of all children in global insertion order.
    pub fn get_all(&self) -> Vec<NodeRef> {
        self.entries.iter().map(|(_, c)| Rc::clone(c)).collect()
    }

    /// Cheap peek at the first child named `name`, without bumping any external refcount
    /// bookkeeping (internal use only, e.g. from within the validator/resolver).
    pub fn first(&self, name: &str) -> Option<NodeRef> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| Rc::clone(c))
    }

    /// The *index*-th (0-based) child named `name`.
    pub fn nth(&self, name: &str, index: usize) -> Option<NodeRef> {
        self.entries
            .iter()
            .filter(|(n, _)| n == name)
            .nth(index)
            .map(|(_, c)| Rc::clone(c))
    }

    /// Number of distinct names stored, not the number of values.
    pub fn size(&self) -> usize {
        let mut names: Vec<&str> = self.entries.iter().map(|(n, _)| n.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names.len()
    }

    /// How many children are named `name`.
    pub fn count(&self, name: &str) -> usize {
        self.entries.iter().filter(|(n, _)| n == name).count()
    }

    /// True if no children have been added yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Node, Payload, State, Variant};
    use std::cell::RefCell;

    fn leaf(variant: Variant) -> NodeRef {
        Rc::new(RefCell::new(Node::new_detached(variant, State::Constructing, Payload::FreeText(String::new()))))
    }

    #[test]
    fn test_add_and_get_preserves_insertion_order() {
        let mut storage = ElementStorage::new();
        let a = leaf(Variant::Keyval);
        let b = leaf(Variant::Keyval);
        storage.add("host", Rc::clone(&a)).unwrap();
        storage.add("port", Rc::clone(&b)).unwrap();

        let all = storage.get_all();
        assert_eq!(all.len(), 2);
        assert!(Rc::ptr_eq(&all[0], &a));
        assert!(Rc::ptr_eq(&all[1], &b));
    }

    #[test]
    fn test_duplicate_add_rejected() {
        let mut storage = ElementStorage::new();
        let a = leaf(Variant::Keyval);
        storage.add("host", Rc::clone(&a)).unwrap();
        assert!(storage.add("host", Rc::clone(&a)).is_err());
    }

    #[test]
    fn test_nth_respects_name_filtered_order() {
        let mut storage = ElementStorage::new();
        let a = leaf(Variant::Keyval);
        let b = leaf(Variant::Keyval);
        let c = leaf(Variant::Keyval);
        storage.add("host", Rc::clone(&a)).unwrap();
        storage.add("other", Rc::clone(&c)).unwrap();
        storage.add("host", Rc::clone(&b)).unwrap();

        assert!(Rc::ptr_eq(&storage.nth("host", 0).unwrap(), &a));
        assert!(Rc::ptr_eq(&storage.nth("host", 1).unwrap(), &b));
        assert!(storage.nth("host", 2).is_none());
    }

    #[test]
    fn test_size_counts_distinct_names() {
        let mut storage = ElementStorage::new();
        storage.add("host", leaf(Variant::Keyval)).unwrap();
        storage.add("host", leaf(Variant::Keyval)).unwrap();
        storage.add("port", leaf(Variant::Keyval)).unwrap();
        assert_eq!(storage.size(), 2);
        assert_eq!(storage.count("host"), 2);
    }

    #[test]
    fn test_remove() {
        let mut storage = ElementStorage::new();
        let a = leaf(Variant::Keyval);
        storage.add("host", Rc::clone(&a)).unwrap();
        storage.remove("host", &a).unwrap();
        assert!(storage.get("host").is_empty());
        assert!(storage.remove("host", &a).is_err());
    }
}
