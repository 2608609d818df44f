//! The sliding variation graph.
//!
//! A window `[position_start, position_end]` on a single contig. Each
//! position owns a sorted bucket of nodes plus a column-coverage counter.
//! Insertion nodes are attached to their anchor position's bucket with
//! offset >= 1 and never contribute to column coverage.

use crate::base::{nt2int, GAP};
use crate::decompose::Decomposition;
use crate::error::RemaError;
use crate::node::{Node, NodeArena, NodeBucket, NodeId, NodeKey, NodeType};

#[derive(Debug)]
pub struct Graph {
    /// 1-based contig index of the current window.
    contig: u32,

    /// 1-based, inclusive.
    position_start: u32,

    /// 1-based, inclusive.
    position_end: u32,

    buckets: Vec<NodeBucket>,

    /// Per-position coverage, insertions excluded.
    coverages: Vec<u32>,

    is_empty: bool,

    arena: NodeArena,
}

impl Graph {
    pub fn new() -> Self {
        Self {
            contig: 1,
            position_start: 1,
            position_end: 1,
            buckets: vec![NodeBucket::default()],
            coverages: vec![0],
            is_empty: true,
            arena: NodeArena::default(),
        }
    }

    pub fn contig(&self) -> u32 {
        self.contig
    }

    pub fn position_start(&self) -> u32 {
        self.position_start
    }

    pub fn position_end(&self) -> u32 {
        self.position_end
    }

    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    pub fn node(&self, id: NodeId) -> &Node {
        self.arena.get(id)
    }

    fn bucket_index(&self, position: u32) -> Option<usize> {
        if position < self.position_start || self.position_end < position {
            None
        } else {
            Some((position - self.position_start) as usize)
        }
    }

    pub fn node_bucket(&self, position: u32) -> Option<&NodeBucket> {
        self.bucket_index(position).map(|i| &self.buckets[i])
    }

    /// Column coverage at a position; 0 outside the window.
    pub fn coverage(&self, position: u32) -> u32 {
        self.bucket_index(position)
            .map(|i| self.coverages[i])
            .unwrap_or(0)
    }

    pub fn find(&self, key: &NodeKey) -> Option<NodeId> {
        self.bucket_index(key.position)
            .and_then(|i| self.buckets[i].find(key))
    }

    /// First position >= `position` with a non-empty bucket.
    pub fn first_position_at_or_after(&self, position: u32) -> Option<u32> {
        let mut p = position.max(self.position_start);
        while p <= self.position_end {
            if !self.buckets[(p - self.position_start) as usize].is_empty() {
                return Some(p);
            }
            p += 1;
        }
        None
    }

    /// Last position <= `position` with a non-empty bucket.
    pub fn last_position_at_or_before(&self, position: u32) -> Option<u32> {
        if position < self.position_start {
            return None;
        }
        let mut p = position.min(self.position_end);
        loop {
            if !self.buckets[(p - self.position_start) as usize].is_empty() {
                return Some(p);
            }
            if p == self.position_start {
                return None;
            }
            p -= 1;
        }
    }

    /// Add a decomposed record to the graph and return the strand-dependent
    /// start node: the first emitted node on the forward strand, the last on
    /// the reverse strand.
    pub fn add_record(
        &mut self,
        aln: &Decomposition,
        aln_start: u32,
        tid: usize,
        reverse: bool,
    ) -> Result<Option<NodeId>, RemaError> {
        if aln.is_empty() {
            return Ok(None);
        }

        // A leading insertion anchors one position before the alignment.
        let first_pos = if aln.refr[0] == GAP {
            aln_start - 1
        } else {
            aln_start
        };

        if self.is_empty {
            self.reset_window(tid as u32 + 1, first_pos);
            self.is_empty = false;
        } else if first_pos < self.position_start {
            // Extend the window backward.
            let diff = (self.position_start - first_pos) as usize;
            for _ in 0..diff {
                self.buckets.insert(0, NodeBucket::default());
                self.coverages.insert(0, 0);
            }
            self.position_start = first_pos;
        }

        if self.contig != tid as u32 + 1 {
            return Err(RemaError::OutOfRange(
                "record contig does not match the graph window".to_string(),
            ));
        }

        let mut ref_index: i64 = -1;
        let mut ins_offset: u32 = 0;
        let mut prev: Option<NodeId> = None;
        let mut ret: Option<NodeId> = None;

        for i in 0..aln.len() {
            if aln.read[i] == GAP {
                // Deletion: advance the reference, emit no node. The edge
                // spanning the deletion is added when the next node chains.
                ref_index += 1;
                ins_offset = 0;
                continue;
            }

            let (node_type, offset) = if aln.refr[i] == GAP {
                ins_offset += 1;
                (NodeType::Insertion, ins_offset)
            } else if aln.read[i] == aln.refr[i] {
                ref_index += 1;
                ins_offset = 0;
                (NodeType::Match, 0)
            } else {
                ref_index += 1;
                ins_offset = 0;
                (NodeType::Mismatch, 0)
            };

            let key = NodeKey {
                contig: self.contig,
                position: (aln_start as i64 + ref_index) as u32,
                offset,
                node_type,
                base: nt2int(aln.read[i]),
            };

            let cur = self.add_node(key, prev)?;
            if prev.is_none() && !reverse {
                ret = Some(cur);
            }
            prev = Some(cur);
        }

        if reverse {
            ret = prev;
        }
        Ok(ret)
    }

    /// Insert or merge a node and chain it to its predecessor.
    fn add_node(&mut self, key: NodeKey, prev: Option<NodeId>) -> Result<NodeId, RemaError> {
        if key.position < self.position_start {
            return Err(RemaError::OutOfRange(
                "node position precedes the graph window".to_string(),
            ));
        }

        let id = match self.find(&key) {
            Some(id) => {
                self.arena.get_mut(id).coverage += 1;
                if key.node_type != NodeType::Insertion {
                    let index = (key.position - self.position_start) as usize;
                    self.coverages[index] += 1;
                }
                id
            }
            None => {
                // Extend the window forward on demand.
                if self.position_end < key.position {
                    let len = (key.position - self.position_start + 1) as usize;
                    self.buckets.resize_with(len, NodeBucket::default);
                    self.coverages.resize(len, 0);
                    self.position_end = key.position;
                }
                let index = (key.position - self.position_start) as usize;
                let id = self.arena.insert(Node::new(key));
                self.buckets[index].insert(key, id);
                if key.node_type != NodeType::Insertion {
                    self.coverages[index] += 1;
                }
                self.is_empty = false;
                id
            }
        };

        if let Some(p) = prev {
            self.arena.connect(p, id);
        }
        Ok(id)
    }

    /// Drop everything the re-aligner can no longer reach.
    ///
    /// Never called concurrently with `add_record`.
    pub fn prune(&mut self, tid: usize, alignment_start: u32, offset: u32) {
        let contig = tid as u32 + 1;
        let cutoff = alignment_start.saturating_sub(offset);

        if self.contig != contig {
            self.reset_window(contig, alignment_start);
        } else if self.position_start < cutoff {
            if self.position_end < cutoff {
                // Every node is unreachable.
                self.reset_window(contig, alignment_start);
            } else {
                // Drop the prefix below the cutoff.
                let diff = (cutoff - self.position_start) as usize;
                let doomed: Vec<NodeId> = self.buckets[..diff]
                    .iter()
                    .flat_map(|bucket| bucket.ids())
                    .collect();
                for id in doomed {
                    self.arena.release(id);
                }
                self.buckets.drain(..diff);
                self.coverages.drain(..diff);
                self.position_start = cutoff;
            }
        }
    }

    fn reset_window(&mut self, contig: u32, position: u32) {
        self.arena.clear();
        self.buckets.clear();
        self.buckets.push(NodeBucket::default());
        self.coverages.clear();
        self.coverages.push(0);
        self.contig = contig;
        self.position_start = position;
        self.position_end = position;
        self.is_empty = true;
    }

    #[cfg(test)]
    pub fn assert_invariants(&self) {
        assert_eq!(
            self.buckets.len(),
            (self.position_end - self.position_start + 1) as usize
        );
        for (i, bucket) in self.buckets.iter().enumerate() {
            for id in bucket.ids() {
                let node = self.arena.get(id);
                assert_eq!(node.key.contig, self.contig);
                assert_eq!(
                    node.key.position,
                    self.position_start + i as u32,
                    "bucket index must match node position"
                );
                for edge in node.next.iter() {
                    let back = self.arena.get(edge.node).prev.get(&node.key).unwrap();
                    assert_eq!(back.coverage, edge.coverage, "edges must be symmetric");
                }
                for edge in node.prev.iter() {
                    let forward = self.arena.get(edge.node).next.get(&node.key).unwrap();
                    assert_eq!(forward.coverage, edge.coverage);
                }
            }
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
