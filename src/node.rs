//! Node and edge-list primitives for the variation graph.
//!
//! Nodes live in an arena owned by the graph and are addressed by index, so
//! the cyclic node ↔ edge-list structure never owns itself. Edge lists and
//! buckets are sorted arrays with binary-search insertion; inserting an
//! equivalent entry merges coverage instead of allocating.

pub type NodeId = usize;

/// Node classification, ordered the way keys sort.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeType {
    Match,
    Mismatch,
    Insertion,
    Deletion,
}

/// The identity of a node.
///
/// Two nodes are equivalent iff all five fields match. The derived ordering
/// is the graph-wide total order on nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeKey {
    /// 1-based contig index.
    pub contig: u32,

    /// 1-based position. For insertions this is the anchor position.
    pub position: u32,

    /// Ordinal of an inserted base beyond the anchor (>= 1); 0 otherwise.
    pub offset: u32,

    pub node_type: NodeType,

    /// Integer base code (A=0 .. N=4).
    pub base: u8,
}

#[derive(Clone, Debug)]
pub struct Edge {
    pub node: NodeId,

    /// Copy of the neighbor's key; keeps edge-list ordering checks from
    /// reaching back into the arena.
    pub key: NodeKey,

    /// Number of read traversals over this edge.
    pub coverage: u32,
}

/// A sorted set of edges, ordered by the neighbor's key.
#[derive(Clone, Debug, Default)]
pub struct EdgeList {
    entries: Vec<Edge>,
}

impl EdgeList {
    fn index_of(&self, key: &NodeKey) -> Result<usize, usize> {
        self.entries.binary_search_by(|e| e.key.cmp(key))
    }

    /// Insert an edge, or merge coverage if the neighbor is already present.
    pub fn add(&mut self, node: NodeId, key: NodeKey) {
        match self.index_of(&key) {
            Ok(i) => self.entries[i].coverage += 1,
            Err(i) => self.entries.insert(
                i,
                Edge {
                    node,
                    key,
                    coverage: 1,
                },
            ),
        }
    }

    /// Drop the edge to `key` entirely. Returns false if it was not present.
    pub fn remove(&mut self, key: &NodeKey) -> bool {
        match self.index_of(key) {
            Ok(i) => {
                self.entries.remove(i);
                true
            }
            Err(_) => false,
        }
    }

    pub fn get(&self, key: &NodeKey) -> Option<&Edge> {
        self.index_of(key).ok().map(|i| &self.entries[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Edge> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    pub key: NodeKey,

    /// Number of reads passing through this node.
    pub coverage: u32,

    /// Downstream neighbors.
    pub next: EdgeList,

    /// Upstream neighbors.
    pub prev: EdgeList,
}

impl Node {
    pub fn new(key: NodeKey) -> Self {
        Self {
            key,
            coverage: 1,
            next: EdgeList::default(),
            prev: EdgeList::default(),
        }
    }
}

/// The sorted set of nodes at one graph position.
#[derive(Clone, Debug, Default)]
pub struct NodeBucket {
    entries: Vec<(NodeKey, NodeId)>,
}

impl NodeBucket {
    /// All keys in a bucket share (contig, position), so the full-key search
    /// reduces to comparing (offset, type, base).
    pub fn find(&self, key: &NodeKey) -> Option<NodeId> {
        self.entries
            .binary_search_by(|(k, _)| k.cmp(key))
            .ok()
            .map(|i| self.entries[i].1)
    }

    pub fn insert(&mut self, key: NodeKey, node: NodeId) {
        if let Err(i) = self.entries.binary_search_by(|(k, _)| k.cmp(&key)) {
            self.entries.insert(i, (key, node));
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries.iter().map(|(_, id)| *id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Arena of nodes. Released slots are recycled; indices are only held for
/// live nodes, so slots are stored without an occupancy wrapper.
#[derive(Debug, Default)]
pub struct NodeArena {
    nodes: Vec<Node>,
    free: Vec<NodeId>,
}

impl NodeArena {
    pub fn insert(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = node;
                id
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    /// Record a traversal from `prev` to `next` on both edge lists.
    pub fn connect(&mut self, prev: NodeId, next: NodeId) {
        let prev_key = self.nodes[prev].key;
        let next_key = self.nodes[next].key;
        self.nodes[prev].next.add(next, next_key);
        self.nodes[next].prev.add(prev, prev_key);
    }

    /// Destroy a node: unlink it from every neighbor's opposite edge list
    /// (preserving edge symmetry), then recycle the slot.
    pub fn release(&mut self, id: NodeId) {
        let key = self.nodes[id].key;
        let next_ids: Vec<NodeId> = self.nodes[id].next.iter().map(|e| e.node).collect();
        let prev_ids: Vec<NodeId> = self.nodes[id].prev.iter().map(|e| e.node).collect();
        for n in next_ids {
            self.nodes[n].prev.remove(&key);
        }
        for p in prev_ids {
            self.nodes[p].next.remove(&key);
        }
        self.nodes[id].next = EdgeList::default();
        self.nodes[id].prev = EdgeList::default();
        self.free.push(id);
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(position: u32, offset: u32, node_type: NodeType, base: u8) -> NodeKey {
        NodeKey {
            contig: 1,
            position,
            offset,
            node_type,
            base,
        }
    }

    #[test]
    fn test_key_ordering() {
        let a = key(10, 0, NodeType::Match, 0);
        let b = key(10, 0, NodeType::Mismatch, 0);
        let c = key(10, 1, NodeType::Insertion, 0);
        let d = key(11, 0, NodeType::Match, 0);
        assert!(a < b);
        assert!(b < c);
        assert!(c < d);
    }

    #[test]
    fn test_edge_list_merges_coverage() {
        let mut list = EdgeList::default();
        let k = key(5, 0, NodeType::Match, 2);
        list.add(0, k);
        list.add(0, k);
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(&k).unwrap().coverage, 2);
    }

    #[test]
    fn test_edge_list_sorted_insert_and_remove() {
        let mut list = EdgeList::default();
        let k1 = key(5, 0, NodeType::Match, 0);
        let k2 = key(5, 0, NodeType::Match, 3);
        let k3 = key(7, 0, NodeType::Match, 1);
        list.add(2, k3);
        list.add(0, k1);
        list.add(1, k2);
        let keys: Vec<NodeKey> = list.iter().map(|e| e.key).collect();
        assert_eq!(keys, vec![k1, k2, k3]);

        assert!(list.remove(&k2));
        assert!(!list.remove(&k2));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_arena_release_fixes_up_neighbors() {
        let mut arena = NodeArena::default();
        let a = arena.insert(Node::new(key(1, 0, NodeType::Match, 0)));
        let b = arena.insert(Node::new(key(2, 0, NodeType::Match, 1)));
        let c = arena.insert(Node::new(key(3, 0, NodeType::Match, 2)));
        arena.connect(a, b);
        arena.connect(b, c);

        assert_eq!(arena.get(a).next.len(), 1);
        assert_eq!(arena.get(c).prev.len(), 1);

        arena.release(b);
        assert!(arena.get(a).next.is_empty());
        assert!(arena.get(c).prev.is_empty());

        // The slot is recycled.
        let d = arena.insert(Node::new(key(4, 0, NodeType::Match, 3)));
        assert_eq!(d, b);
    }

    #[test]
    fn test_bucket_dedups() {
        let mut bucket = NodeBucket::default();
        let k = key(9, 0, NodeType::Match, 1);
        bucket.insert(k, 0);
        bucket.insert(k, 7);
        assert_eq!(bucket.len(), 1);
        assert_eq!(bucket.find(&k), Some(0));
    }
}
