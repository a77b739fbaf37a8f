//! Who told us about whom.

use std::collections::HashSet;
use std::sync::RwLock;

use tradenet_types::Address;

/// Upper bound on remembered edges.
pub const MAX_EXCHANGE_EDGES: usize = 4096;

/// Deduplicated `(source, target)` edges: `source` reported `target` to us.
/// Holds at most `capacity` edges; new edges beyond that are ignored until
/// a source is pruned.
pub struct PeerExchangeGraph {
    capacity: usize,
    edges: RwLock<HashSet<(Address, Address)>>,
}

impl PeerExchangeGraph {
    pub fn new() -> Self {
        Self::with_capacity(MAX_EXCHANGE_EDGES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            edges: RwLock::new(HashSet::new()),
        }
    }

    /// Returns `true` if the edge was new. Self-loops and edges past the
    /// capacity are ignored.
    pub fn add_edge(&self, source: &Address, target: &Address) -> bool {
        if source == target {
            return false;
        }
        let mut edges = self.edges.write().unwrap_or_else(|e| e.into_inner());
        let edge = (source.clone(), target.clone());
        if edges.len() >= self.capacity && !edges.contains(&edge) {
            return false;
        }
        edges.insert(edge)
    }

    /// Forget everything `source` reported. Returns how many edges went.
    pub fn remove_source(&self, source: &Address) -> usize {
        let mut edges = self.edges.write().unwrap_or_else(|e| e.into_inner());
        let before = edges.len();
        edges.retain(|(s, _)| s != source);
        before - edges.len()
    }

    pub fn add_edges<'a>(&self, source: &Address, targets: impl IntoIterator<Item = &'a Address>) -> usize {
        targets
            .into_iter()
            .filter(|target| self.add_edge(source, target))
            .count()
    }

    pub fn edges(&self) -> Vec<(Address, Address)> {
        self.edges
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn targets_of(&self, source: &Address) -> Vec<Address> {
        self.edges
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(s, _)| s == source)
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.edges.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PeerExchangeGraph {
    fn default() -> Self {
        Self::new()
    }
}
