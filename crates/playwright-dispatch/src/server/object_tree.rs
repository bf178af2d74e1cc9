// Copyright 2026 Paul Adamson
// Licensed under the Apache License, Version 2.0
//
// Object Tree - guid-keyed arena of live remote objects
//
// Every object the driver announces with `__create__` lives here until it is
// disposed or the connection closes. Parent/child links are stored as guids
// in the arena, never as references between the objects themselves, so a
// subtree can be detached and dropped in one pass.
//
// Invariants:
// - a guid is present at most once
// - every non-root parent guid refers to a live entry
// - a disposed subtree is gone as a whole, children before parents

use crate::error::{Error, Result};
use crate::server::channel_owner::ChannelOwner;
use std::collections::HashMap;
use std::sync::Arc;

struct Node {
    object: Arc<dyn ChannelOwner>,
    parent: Option<Arc<str>>,
    children: Vec<Arc<str>>,
}

/// Arena of live objects keyed by guid.
///
/// Top-level objects (created under the empty guid) have no parent entry.
#[derive(Default)]
pub struct ObjectTree {
    nodes: HashMap<Arc<str>, Node>,
}

impl ObjectTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `object` under `parent`. An empty parent guid means top-level.
    ///
    /// Fails when the guid already exists or the parent is unknown.
    pub fn insert(&mut self, parent: &str, object: Arc<dyn ChannelOwner>) -> Result<()> {
        let guid: Arc<str> = Arc::from(object.guid());
        if self.nodes.contains_key(&guid) {
            return Err(Error::ProtocolError(format!(
                "Duplicate object guid: {}",
                guid
            )));
        }

        let parent = if parent.is_empty() {
            None
        } else {
            let parent_node = self.nodes.get_mut(parent).ok_or_else(|| {
                Error::ProtocolError(format!(
                    "Parent object not found: {} (creating {})",
                    parent, guid
                ))
            })?;
            parent_node.children.push(Arc::clone(&guid));
            Some(Arc::from(parent))
        };

        self.nodes.insert(
            guid,
            Node {
                object,
                parent,
                children: Vec::new(),
            },
        );
        Ok(())
    }

    pub fn get(&self, guid: &str) -> Option<Arc<dyn ChannelOwner>> {
        self.nodes.get(guid).map(|node| Arc::clone(&node.object))
    }

    pub fn contains(&self, guid: &str) -> bool {
        self.nodes.contains_key(guid)
    }

    /// Parent guid of a live object; `None` for top-level or unknown guids.
    pub fn parent_of(&self, guid: &str) -> Option<Arc<str>> {
        self.nodes.get(guid).and_then(|node| node.parent.clone())
    }

    /// Children in creation order.
    pub fn children_of(&self, guid: &str) -> Vec<Arc<str>> {
        self.nodes
            .get(guid)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    /// Removes `guid` and all of its descendants.
    ///
    /// The returned objects are ordered deepest-first so that every child is
    /// listed before its parent. An unknown guid yields an empty list.
    pub fn remove_subtree(&mut self, guid: &str) -> Vec<Arc<dyn ChannelOwner>> {
        if !self.nodes.contains_key(guid) {
            return Vec::new();
        }

        if let Some(parent) = self.parent_of(guid)
            && let Some(parent_node) = self.nodes.get_mut(&parent)
        {
            parent_node.children.retain(|child| &**child != guid);
        }

        // Pre-order walk, reversed below: descendants end up before ancestors
        let mut order: Vec<Arc<str>> = Vec::new();
        let mut stack: Vec<Arc<str>> = vec![Arc::from(guid)];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(&current) {
                stack.extend(node.children.iter().rev().cloned());
            }
            order.push(current);
        }

        order
            .into_iter()
            .rev()
            .filter_map(|g| self.nodes.remove(&g).map(|node| node.object))
            .collect()
    }

    /// Moves `guid` under `new_parent`.
    ///
    /// Refuses unknown guids and moves that would put an object beneath
    /// itself.
    pub fn reparent(&mut self, guid: &str, new_parent: &str) -> Result<()> {
        if !self.nodes.contains_key(guid) {
            return Err(Error::ProtocolError(format!(
                "Cannot adopt unknown object: {}",
                guid
            )));
        }
        if !self.nodes.contains_key(new_parent) {
            return Err(Error::ProtocolError(format!(
                "Cannot adopt into unknown parent: {}",
                new_parent
            )));
        }

        let mut ancestor: Option<Arc<str>> = Some(Arc::from(new_parent));
        while let Some(current) = ancestor {
            if &*current == guid {
                return Err(Error::ProtocolError(format!(
                    "Adopting {} into {} would create a cycle",
                    guid, new_parent
                )));
            }
            ancestor = self.parent_of(&current);
        }

        let guid: Arc<str> = Arc::from(guid);
        if let Some(old_parent) = self.parent_of(&guid)
            && let Some(old_node) = self.nodes.get_mut(&old_parent)
        {
            old_node.children.retain(|child| *child != guid);
        }

        if let Some(parent_node) = self.nodes.get_mut(new_parent) {
            parent_node.children.push(Arc::clone(&guid));
        }
        if let Some(node) = self.nodes.get_mut(&guid) {
            node.parent = Some(Arc::from(new_parent));
        }
        Ok(())
    }

    /// Empties the arena, returning every object deepest-first.
    pub fn drain(&mut self) -> Vec<Arc<dyn ChannelOwner>> {
        let roots: Vec<Arc<str>> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(guid, _)| Arc::clone(guid))
            .collect();

        let mut removed = Vec::with_capacity(self.nodes.len());
        for root in roots {
            removed.extend(self.remove_subtree(&root));
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
