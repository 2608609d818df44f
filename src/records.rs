//! Record envelope and the coordinate-ordered staging lists.

use crate::node::NodeId;
use noodles::sam::alignment::RecordBuf;
use std::collections::VecDeque;

/// A decoded record moving through the pipeline.
#[derive(Debug)]
pub struct RecordEnvelope {
    /// Index of the input it was read from.
    pub source: usize,

    pub record: RecordBuf,

    /// 0-based reference sequence index; 0 if absent.
    pub tid: usize,

    /// 1-based alignment start; 0 if absent.
    pub pos: u32,

    /// 1-based alignment end, inclusive.
    pub end: u32,

    /// Populated by the graph-build step, consumed by the re-aligner.
    pub start_node: Option<NodeId>,
}

impl RecordEnvelope {
    pub fn new(source: usize, record: RecordBuf) -> Self {
        let mut envelope = Self {
            source,
            record,
            tid: 0,
            pos: 0,
            end: 0,
            start_node: None,
        };
        envelope.refresh();
        envelope
    }

    /// Re-derive the cached coordinates from the record. Called after
    /// re-alignment moves a record.
    pub fn refresh(&mut self) {
        self.tid = self.record.reference_sequence_id().unwrap_or(0);
        self.pos = self
            .record
            .alignment_start()
            .map(|p| usize::from(p) as u32)
            .unwrap_or(0);
        self.end = self
            .record
            .alignment_end()
            .map(|p| usize::from(p) as u32)
            .unwrap_or(self.pos);
    }

    pub fn is_unmapped(&self) -> bool {
        self.record.flags().is_unmapped()
    }

    pub fn is_reverse(&self) -> bool {
        self.record.flags().is_reverse_complemented()
    }

    /// Missing mapping quality passes any threshold.
    pub fn mapping_quality(&self) -> u8 {
        self.record.mapping_quality().map(u8::from).unwrap_or(255)
    }
}

/// A list kept in `(tid, pos)` order.
///
/// Insertion appends at the tail and bubbles backward while the predecessor
/// sorts later; records arrive near-sorted, so the pass is short, and a
/// re-aligned record that moved by up to ±offset settles the same way.
#[derive(Debug, Default)]
pub struct RecordList {
    items: VecDeque<RecordEnvelope>,
}

impl RecordList {
    pub fn push(&mut self, envelope: RecordEnvelope) {
        self.items.push_back(envelope);
        let mut i = self.items.len() - 1;
        while i > 0 {
            let prev = &self.items[i - 1];
            let cur = &self.items[i];
            if (prev.tid, prev.pos) <= (cur.tid, cur.pos) {
                break;
            }
            self.items.swap(i, i - 1);
            i -= 1;
        }
    }

    pub fn pop_front(&mut self) -> Option<RecordEnvelope> {
        self.items.pop_front()
    }

    pub fn front(&self) -> Option<&RecordEnvelope> {
        self.items.front()
    }

    pub fn back(&self) -> Option<&RecordEnvelope> {
        self.items.back()
    }

    /// Detach up to `n` records from the head, preserving order.
    pub fn take_block(&mut self, n: usize) -> Vec<RecordEnvelope> {
        let n = n.min(self.items.len());
        self.items.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noodles::core::Position;
    use noodles::sam::alignment::record::Flags;

    fn envelope(tid: usize, pos: usize) -> RecordEnvelope {
        let record = RecordBuf::builder()
            .set_flags(Flags::empty())
            .set_reference_sequence_id(tid)
            .set_alignment_start(Position::try_from(pos).unwrap())
            .build();
        RecordEnvelope::new(0, record)
    }

    #[test]
    fn test_push_restores_near_sorted_order() {
        let mut list = RecordList::default();
        for (tid, pos) in [(0, 10), (0, 30), (0, 20), (0, 25), (1, 5)] {
            list.push(envelope(tid, pos));
        }
        let order: Vec<(usize, u32)> = std::iter::from_fn(|| list.pop_front())
            .map(|e| (e.tid, e.pos))
            .collect();
        assert_eq!(order, vec![(0, 10), (0, 20), (0, 25), (0, 30), (1, 5)]);
    }

    #[test]
    fn test_take_block() {
        let mut list = RecordList::default();
        for pos in [10, 20, 30] {
            list.push(envelope(0, pos));
        }
        let block = list.take_block(2);
        assert_eq!(block.len(), 2);
        assert_eq!(block[0].pos, 10);
        assert_eq!(list.len(), 1);
        assert_eq!(list.front().unwrap().pos, 30);

        assert_eq!(list.take_block(10).len(), 1);
        assert!(list.is_empty());
    }
}
