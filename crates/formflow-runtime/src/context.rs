//! Nested isolated contexts
//!
//! A context is one scope of structure + form graph + selector namespace:
//! the root, or a modal pushed on top of it. Contexts form a tree through
//! parent links; destroying a context tears down its descendants first,
//! deepest-first. Control names are unique only within a context, so two
//! nested contexts may both declare `email` without collision.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use formflow_core::ContentBlock;

use crate::graph::FormGraph;

/// Process-local context identifier. Monotonically increasing, never
/// recycled within one engine instance, so stale ids can never alias a
/// newer context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(u64);

impl ContextId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// One isolated scope: its loaded blocks, its form graph, and its place in
/// the context tree.
pub struct Context {
    pub id: ContextId,
    pub parent: Option<ContextId>,
    pub blocks: Vec<ContentBlock>,
    pub graph: FormGraph,
}

/// Arena of live contexts. `order` tracks creation order; the most recently
/// created live context is the active one.
#[derive(Default)]
pub struct ContextStack {
    contexts: HashMap<ContextId, Context>,
    order: Vec<ContextId>,
    next: u64,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &mut self,
        parent: Option<ContextId>,
        blocks: Vec<ContentBlock>,
        graph: FormGraph,
    ) -> ContextId {
        let id = ContextId(self.next);
        self.next += 1;
        self.contexts.insert(
            id,
            Context {
                id,
                parent,
                blocks,
                graph,
            },
        );
        self.order.push(id);
        id
    }

    pub fn get(&self, id: ContextId) -> Option<&Context> {
        self.contexts.get(&id)
    }

    pub fn get_mut(&mut self, id: ContextId) -> Option<&mut Context> {
        self.contexts.get_mut(&id)
    }

    pub fn contains(&self, id: ContextId) -> bool {
        self.contexts.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The context new external events target: the most recently created
    /// live context.
    pub fn active(&self) -> Option<ContextId> {
        self.order.last().copied()
    }

    /// Nesting depth: 0 for a root context.
    pub fn depth(&self, id: ContextId) -> usize {
        let mut depth = 0;
        let mut current = self.contexts.get(&id).and_then(|c| c.parent);
        while let Some(parent) = current {
            depth += 1;
            current = self.contexts.get(&parent).and_then(|c| c.parent);
        }
        depth
    }

    /// Live context ids in creation order.
    pub fn ids(&self) -> Vec<ContextId> {
        self.order.clone()
    }

    /// Destroy every descendant of a context, deepest-first, leaving the
    /// context itself alive. Used when a scope is rebuilt in place.
    pub fn destroy_descendants(&mut self, id: ContextId) -> Vec<ContextId> {
        let children: Vec<ContextId> = self
            .order
            .iter()
            .copied()
            .filter(|&c| {
                self.contexts
                    .get(&c)
                    .map(|ctx| ctx.parent == Some(id))
                    .unwrap_or(false)
            })
            .collect();
        let mut destroyed = Vec::new();
        for child in children {
            destroyed.extend(self.destroy(child));
        }
        destroyed
    }

    /// Destroy a context and every descendant, deepest-first. Returns the
    /// destroyed ids in teardown order (the requested context last).
    pub fn destroy(&mut self, id: ContextId) -> Vec<ContextId> {
        if !self.contexts.contains_key(&id) {
            return Vec::new();
        }

        let mut doomed: Vec<ContextId> = self
            .order
            .iter()
            .copied()
            .filter(|&candidate| candidate == id || self.is_descendant_of(candidate, id))
            .collect();
        doomed.sort_by_key(|&c| std::cmp::Reverse(self.depth(c)));

        for ctx in &doomed {
            self.contexts.remove(ctx);
            self.order.retain(|o| o != ctx);
        }
        doomed
    }

    fn is_descendant_of(&self, candidate: ContextId, ancestor: ContextId) -> bool {
        let mut current = self.contexts.get(&candidate).and_then(|c| c.parent);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.contexts.get(&parent).and_then(|c| c.parent);
        }
        false
    }
}
