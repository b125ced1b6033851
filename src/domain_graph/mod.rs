//! Domain graph (ComputeAtMap / IdModel, spec §4.2): disjoint-set graphs
//! over [`IterDomainId`]s under three equivalence relations.
//!
//! The source keeps one shared-ownership graph per mapping mode with manual
//! union-find bookkeeping; here each [`EquivalenceKind`] gets its own
//! [`petgraph::unionfind::UnionFind`] keyed by an arena index, so merging is
//! O(α(n)) and `are_mapped` is a root comparison.

use std::collections::HashMap;

use petgraph::unionfind::UnionFind;
use thiserror::Error;

use crate::ir::{Fusion, IterDomainId};

#[derive(Debug, Error)]
pub enum DomainGraphError {
    #[error("self-mapping: {0:?} was mapped to itself under {1:?}")]
    SelfMapping(IterDomainId, EquivalenceKind),
    #[error("id {0:?} is not registered in this domain graph")]
    UnknownId(IterDomainId),
}

/// The three equivalence relations the source's `ComputeAtMap` maintains
/// (spec §4.2): `Exact` requires identical transform history, `Permissive`
/// additionally identifies broadcast with its concretized counterpart, and
/// `Loop` identifies IDs that share a loop after inlining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EquivalenceKind {
    Exact,
    Permissive,
    Loop,
}

/// One disjoint-set forest per [`EquivalenceKind`], over a shared index
/// space of every [`IterDomainId`] registered with [`DomainGraph::register`].
pub struct DomainGraph {
    index_of: HashMap<IterDomainId, usize>,
    ids: Vec<IterDomainId>,
    capacity: usize,
    exact: UnionFind<usize>,
    permissive: UnionFind<usize>,
    loop_map: UnionFind<usize>,
}

impl DomainGraph {
    pub fn new() -> Self {
        Self {
            index_of: HashMap::new(),
            ids: Vec::new(),
            capacity: 0,
            exact: UnionFind::new(0),
            permissive: UnionFind::new(0),
            loop_map: UnionFind::new(0),
        }
    }

    /// Build a graph covering every [`IterDomainId`] in `fusion`, with no
    /// mappings beyond self-identity, a starting point `build`
    /// (spec §4.2) callers extend by walking the fusion's exprs.
    pub fn build(fusion: &Fusion) -> Self {
        let mut graph = Self::new();
        for id in (0..fusion.num_iter_domains()).map(crate::ir::Id::new) {
            graph.register(id);
        }
        graph
    }

    fn register(&mut self, id: IterDomainId) -> usize {
        if let Some(&idx) = self.index_of.get(&id) {
            return idx;
        }
        let idx = self.ids.len();
        self.ids.push(id);
        self.index_of.insert(id, idx);
        self.grow();
        idx
    }

    fn grow(&mut self) {
        let n = self.ids.len();
        if self.capacity < n {
            let mut new_exact = UnionFind::new(n);
            let mut new_permissive = UnionFind::new(n);
            let mut new_loop = UnionFind::new(n);
            for i in 0..self.capacity {
                new_exact.union(i, self.exact.find(i));
                new_permissive.union(i, self.permissive.find(i));
                new_loop.union(i, self.loop_map.find(i));
            }
            self.exact = new_exact;
            self.permissive = new_permissive;
            self.loop_map = new_loop;
            self.capacity = n;
        }
    }

    fn set_for(&mut self, kind: EquivalenceKind) -> &mut UnionFind<usize> {
        match kind {
            EquivalenceKind::Exact => &mut self.exact,
            EquivalenceKind::Permissive => &mut self.permissive,
            EquivalenceKind::Loop => &mut self.loop_map,
        }
    }

    fn set_for_ref(&self, kind: EquivalenceKind) -> &UnionFind<usize> {
        match kind {
            EquivalenceKind::Exact => &self.exact,
            EquivalenceKind::Permissive => &self.permissive,
            EquivalenceKind::Loop => &self.loop_map,
        }
    }

    /// Map `a` and `b` under `kind`. Rejects mapping an ID to itself (spec
    /// §4.2 hard rejection used by the heuristic registry's self-mapping
    /// check).
    pub fn map_ids(
        &mut self,
        a: IterDomainId,
        b: IterDomainId,
        kind: EquivalenceKind,
    ) -> Result<(), DomainGraphError> {
        if a == b {
            return Err(DomainGraphError::SelfMapping(a, kind));
        }
        let ia = self.register(a);
        let ib = self.register(b);
        self.set_for(kind).union(ia, ib);
        Ok(())
    }

    /// `areMapped` (spec §4.2): reflexive, symmetric, transitive by
    /// construction of the underlying union-find.
    pub fn are_mapped(&self, a: IterDomainId, b: IterDomainId, kind: EquivalenceKind) -> bool {
        match (self.index_of.get(&a), self.index_of.get(&b)) {
            (Some(&ia), Some(&ib)) => self.set_for_ref(kind).find(ia) == self.set_for_ref(kind).find(ib),
            _ => a == b,
        }
    }

    /// True if every registered ID reaches every other under `kind`'s
    /// transitive closure (used by the heuristic registry's
    /// not-weakly-connected hard rejection, spec §4.4).
    pub fn is_weakly_connected(&self, kind: EquivalenceKind) -> bool {
        if self.ids.len() <= 1 {
            return true;
        }
        let set = self.set_for_ref(kind);
        let root = set.find(0);
        (1..self.ids.len()).all(|i| set.find(i) == root)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl Default for DomainGraph {
    fn default() -> Self {
        Self::new()
    }
}
