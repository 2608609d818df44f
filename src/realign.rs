//! The graph-guided re-aligner.
//!
//! Each record is re-aligned by a bounded best-first search over the graph:
//! a bound pass retraces the original alignment to establish a score floor,
//! start cells are seeded from every qualifying node within ±offset of the
//! record's 5'-most anchor, and the main search expands along graph edges,
//! pruning by score, coverage cutoffs, and heap size. A successful search
//! emits a rebuilt record; any abort hands the original back untouched.

use crate::base::{bound_qual, char_to_qual, nt2int, INT2NT};
use crate::cutoffs::CoverageCutoffs;
use crate::error::RemaError;
use crate::graph::Graph;
use crate::heap::{same_column, HeapKind, SearchCell, SearchHeap, Space};
use crate::node::{NodeId, NodeType};
use noodles::core::Position;
use noodles::sam::alignment::record::cigar::{op::Kind, Op};
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record::Flags;
use noodles::sam::alignment::record_buf::data::field::Value;
use noodles::sam::alignment::record_buf::{Cigar, Data, QualityScores, Sequence};
use noodles::sam::alignment::RecordBuf;

/// Subtracted from the original quality where base correction rewrites a
/// base.
const CORRECT_BASE_QUALITY_PENALTY: i32 = 20;

#[derive(Debug, Clone)]
pub struct RealignParams {
    /// Multi-start window half-width around the record's anchor.
    pub offset: u32,

    pub correct_bases: bool,

    pub use_qualities: bool,

    /// Columns busier than this abort the search for the record.
    pub max_total_coverage: u32,

    /// Live-queue ceiling; exceeding it abandons the record.
    pub max_heap_size: usize,
}

fn cs_tag() -> Result<Tag, RemaError> {
    Tag::try_from([b'C', b'S']).map_err(|_| RemaError::StateError("invalid CS tag".to_string()))
}

fn cq_tag() -> Result<Tag, RemaError> {
    Tag::try_from([b'C', b'Q']).map_err(|_| RemaError::StateError("invalid CQ tag".to_string()))
}

fn string_tag(record: &RecordBuf, tag: Tag) -> Option<Vec<u8>> {
    match record.data().get(&tag) {
        Some(Value::String(s)) => {
            let bytes: &[u8] = s.as_ref();
            Some(bytes.to_vec())
        }
        _ => None,
    }
}

fn strip_mate_info(record: &mut RecordBuf) {
    record.flags_mut().remove(
        Flags::PROPERLY_SEGMENTED | Flags::MATE_REVERSE_COMPLEMENTED | Flags::MATE_UNMAPPED,
    );
    *record.mate_reference_sequence_id_mut() = None;
    *record.mate_alignment_start_mut() = None;
    *record.template_length_mut() = 0;
}

/// Filter a node for traversal: -1 aborts the whole search (column
/// overload), 1 rejects the candidate, 0 accepts.
fn pass_filters(
    graph: &Graph,
    position: u32,
    to_node_coverage: u32,
    cutoffs: &CoverageCutoffs,
    max_total_coverage: u32,
) -> i32 {
    let total = graph.coverage(position);
    if max_total_coverage < total {
        -1
    } else if cutoffs.get(total) <= to_node_coverage {
        0
    } else {
        1
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Retrace the original alignment: neighbors must match the read base,
    /// no early termination, aborts just mean "unbounded".
    Bound,

    /// The real search: any neighbor passing the filters, early termination
    /// under an established best, aborts return the record unchanged.
    Full,
}

enum SearchEnd {
    Finished(Option<u32>),
    Aborted,
}

struct SearchContext<'a> {
    graph: &'a Graph,
    cutoffs: &'a CoverageCutoffs,
    params: &'a RealignParams,
    read_length: usize,
    reverse: bool,
    space: Space,

    /// Per read offset: base code used for scoring (color codes in color
    /// space).
    search_bases: Vec<u8>,

    /// Per read offset: quality used for scoring.
    search_quals: Vec<i32>,

    /// Per read offset: nucleotide base code, used by the bound gate.
    gate_bases: Vec<u8>,
}

impl SearchContext<'_> {
    fn seed(&self, heap: &mut SearchHeap, node: NodeId) {
        let n = self.graph.node(node);
        let cell = SearchCell::root(
            node,
            n.key,
            n.coverage,
            self.search_bases[0],
            self.search_quals[0],
            self.params.use_qualities,
        );
        let index = heap.push_cell(cell);
        heap.enqueue(index);
    }

    fn run(&self, heap: &mut SearchHeap, phase: Phase, mut best: Option<u32>) -> SearchEnd {
        while let Some(mut cur) = heap.pop() {
            if self.params.max_heap_size < heap.live_len() {
                // Too many to consider.
                return SearchEnd::Aborted;
            }

            // Column merging: adjacent cells at the same graph column and
            // read progress collapse to the dominant one. Insertion cells
            // never merge (distinct offsets compare equal here).
            while let Some(next) = heap.peek() {
                if heap.cell(cur).key.node_type == NodeType::Insertion
                    || !same_column(heap.cell(cur), heap.cell(next))
                {
                    break;
                }
                let keep_next = {
                    let a = heap.cell(cur);
                    let b = heap.cell(next);
                    (a.score, a.coverage_sum) < (b.score, b.coverage_sum)
                };
                heap.pop();
                if keep_next {
                    cur = next;
                }
            }

            let cell = heap.cell(cur).clone();

            if cell.read_offset as usize == self.read_length - 1 {
                // Complete path: keep the strictly better one.
                let better = match best {
                    None => true,
                    Some(b) => {
                        let b = heap.cell(b);
                        (b.score, b.coverage_sum) < (cell.score, cell.coverage_sum)
                    }
                };
                if better {
                    best = Some(cur);
                }
                continue;
            }

            if phase == Phase::Full {
                if let Some(b) = best {
                    if cell.score < heap.cell(b).score {
                        // Scores only become more negative; this cell can
                        // never beat the best.
                        continue;
                    }
                }
            }

            let k = cell.read_offset as usize + 1;
            let node = self.graph.node(cell.node);
            let edges = if self.reverse { &node.prev } else { &node.next };

            for edge in edges.iter() {
                if phase == Phase::Bound && edge.key.base != self.gate_bases[k] {
                    continue;
                }
                match pass_filters(
                    self.graph,
                    edge.key.position,
                    edge.coverage,
                    self.cutoffs,
                    self.params.max_total_coverage,
                ) {
                    0 => {
                        let next = SearchCell::extend(
                            &cell,
                            cur,
                            edge.node,
                            edge.key,
                            edge.coverage,
                            self.search_bases[k],
                            self.search_quals[k],
                            self.params.use_qualities,
                            self.space,
                        );
                        let index = heap.push_cell(next);
                        heap.enqueue(index);
                    }
                    p if p < 0 => return SearchEnd::Aborted,
                    _ => {}
                }
            }
        }

        SearchEnd::Finished(best)
    }
}

/// Re-align one record against the graph. Returns the re-aligned record, or
/// the original when the record is soft-clipped, the search aborts, or no
/// complete path is found.
pub fn realign(
    graph: &Graph,
    mut record: RecordBuf,
    start_node: NodeId,
    heap: &mut SearchHeap,
    cutoffs: &CoverageCutoffs,
    params: &RealignParams,
) -> Result<RecordBuf, RemaError> {
    // Soft-clipped records pass through unchanged.
    {
        let ops = record.cigar().as_ref();
        let clipped = ops
            .first()
            .map(|op| op.kind() == Kind::SoftClip)
            .unwrap_or(false)
            || ops
                .last()
                .map(|op| op.kind() == Kind::SoftClip)
                .unwrap_or(false);
        if clipped {
            return Ok(record);
        }
    }

    let read_length = record.sequence().len();
    if read_length == 0 {
        return Ok(record);
    }

    let reverse = record.flags().is_reverse_complemented();
    let pos = record
        .alignment_start()
        .map(usize::from)
        .ok_or_else(|| RemaError::OutOfRange("record has no alignment start".to_string()))?
        as u32;
    let end = record
        .alignment_end()
        .map(|p| usize::from(p) as u32)
        .unwrap_or(pos);

    // Color space: both tags present, with an optional adapter quality to
    // trim. A quality should not be given for an unobserved base.
    let colors = string_tag(&record, cs_tag()?);
    let mut color_quals = string_tag(&record, cq_tag()?);
    let space = match (&colors, &mut color_quals) {
        (Some(colors), Some(quals)) => {
            if quals.len() == colors.len() {
                quals.remove(0);
            }
            if colors.len() < read_length + 1 || quals.len() < read_length {
                return Err(RemaError::OutOfRange(
                    "malformed CS/CQ auxiliary data".to_string(),
                ));
            }
            Space::Color
        }
        _ => Space::Nucleotide,
    };

    strip_mate_info(&mut record);

    let seq: Vec<u8> = record.sequence().as_ref().to_vec();
    let quals: Vec<u8> = record.quality_scores().as_ref().to_vec();

    // Bases and qualities indexed by read offset: 5'-first on the forward
    // strand, 3'-first on the reverse strand (the sequence is stored in
    // reference orientation either way).
    let mut gate_bases = Vec::with_capacity(read_length);
    let mut nt_quals = Vec::with_capacity(read_length);
    for k in 0..read_length {
        let i = if reverse { read_length - 1 - k } else { k };
        gate_bases.push(nt2int(seq[i]));
        nt_quals.push(quals.get(i).map(|q| *q as i32).unwrap_or(1));
    }

    let (search_bases, search_quals) = match (space, &colors, &color_quals) {
        (Space::Color, Some(colors), Some(cq)) => (
            (0..read_length).map(|k| nt2int(colors[1 + k])).collect(),
            (0..read_length).map(|k| char_to_qual(cq[k])).collect(),
        ),
        _ => (gate_bases.clone(), nt_quals.clone()),
    };

    let context = SearchContext {
        graph,
        cutoffs,
        params,
        read_length,
        reverse,
        space,
        search_bases,
        search_quals,
        gate_bases,
    };

    heap.clear();
    heap.set_kind(if reverse { HeapKind::Max } else { HeapKind::Min });

    // Bound with the original alignment path.
    let start_key = graph.node(start_node).key;
    let start_coverage = graph.node(start_node).coverage;
    let mut best = None;
    if pass_filters(
        graph,
        start_key.position,
        start_coverage,
        cutoffs,
        params.max_total_coverage,
    ) == 0
    {
        context.seed(heap, start_node);
        best = match context.run(heap, Phase::Bound, None) {
            SearchEnd::Finished(best) => best,
            SearchEnd::Aborted => None,
        };
    }
    if best.is_some() {
        // Keep the pool: the bound path's backpointers stay valid.
        heap.reset();
    } else {
        heap.clear();
    }

    // Seed start cells around the 5'-most anchor.
    let anchor = if reverse { end } else { pos };
    let lo = anchor.saturating_sub(params.offset);
    let hi = anchor + params.offset;

    if reverse {
        let mut p = hi;
        loop {
            let Some(found) = graph.last_position_at_or_before(p) else {
                break;
            };
            if found < lo {
                break;
            }
            if !seed_bucket(&context, heap, found)? {
                return Ok(record);
            }
            if found == 0 {
                break;
            }
            p = found - 1;
            if p < lo {
                break;
            }
        }
    } else {
        let mut p = lo;
        while p <= hi {
            let Some(found) = graph.first_position_at_or_after(p) else {
                break;
            };
            if found > hi {
                break;
            }
            if !seed_bucket(&context, heap, found)? {
                return Ok(record);
            }
            p = found + 1;
        }
    }

    match context.run(heap, Phase::Full, best) {
        SearchEnd::Aborted => {
            heap.clear();
            Ok(record)
        }
        SearchEnd::Finished(None) => {
            heap.clear();
            Ok(record)
        }
        SearchEnd::Finished(Some(best)) => {
            let updated = emit(
                &record,
                heap,
                best,
                space,
                colors.as_deref(),
                color_quals.as_deref(),
                reverse,
                params.correct_bases,
            );
            heap.clear();
            updated
        }
    }
}

/// Seed every qualifying node in the bucket at `position`. Returns false
/// when the search must abort for this record.
fn seed_bucket(
    context: &SearchContext<'_>,
    heap: &mut SearchHeap,
    position: u32,
) -> Result<bool, RemaError> {
    let bucket = context
        .graph
        .node_bucket(position)
        .ok_or_else(|| RemaError::StateError("bucket scan left the window".to_string()))?;
    for id in bucket.ids() {
        let node = context.graph.node(id);
        match pass_filters(
            context.graph,
            node.key.position,
            node.coverage,
            context.cutoffs,
            context.params.max_total_coverage,
        ) {
            0 => context.seed(heap, id),
            p if p < 0 => {
                heap.clear();
                return Ok(false);
            }
            _ => {}
        }
    }
    Ok(true)
}

/// Rebuild the record from the best cell's backtrace.
#[allow(clippy::too_many_arguments)]
fn emit(
    record: &RecordBuf,
    heap: &SearchHeap,
    best: u32,
    space: Space,
    colors: Option<&[u8]>,
    color_quals: Option<&[u8]>,
    reverse: bool,
    correct_bases: bool,
) -> Result<RecordBuf, RemaError> {
    // Collect the path and orient it genomically left-to-right. On the
    // forward strand the best cell is the 3' (rightmost) end.
    let mut chain = Vec::new();
    let mut cur = Some(best);
    while let Some(i) = cur {
        chain.push(i);
        cur = heap.cell(i).prev;
    }
    if !reverse {
        chain.reverse();
    }

    let mut seq_bytes = Vec::with_capacity(chain.len());
    let mut ops: Vec<Op> = Vec::new();
    let mut prev_position: Option<u32> = None;

    for &i in &chain {
        let key = heap.cell(i).key;
        if let Some(prev) = prev_position {
            if key.position > prev + 1 {
                // A coordinate gap between emitted bases is a deletion.
                push_op(&mut ops, Kind::Deletion, (key.position - prev - 1) as usize);
            }
        }
        let kind = match key.node_type {
            NodeType::Match | NodeType::Mismatch => Kind::Match,
            NodeType::Insertion => Kind::Insertion,
            NodeType::Deletion => {
                return Err(RemaError::OutOfRange(
                    "deletion node on an alignment path".to_string(),
                ))
            }
        };
        push_op(&mut ops, kind, 1);
        seq_bytes.push(INT2NT[key.base as usize]);
        prev_position = Some(key.position);
    }

    let first = heap.cell(chain[0]).key;
    let old_seq: Vec<u8> = record.sequence().as_ref().to_vec();
    let old_quals: Vec<u8> = record.quality_scores().as_ref().to_vec();

    let qualities = match space {
        Space::Color => {
            let colors = colors
                .ok_or_else(|| RemaError::StateError("color space without CS".to_string()))?;
            let cq = color_quals
                .ok_or_else(|| RemaError::StateError("color space without CQ".to_string()))?;
            derive_color_qualities(colors, cq, &old_seq, &seq_bytes)
        }
        Space::Nucleotide if correct_bases => old_seq
            .iter()
            .zip(&seq_bytes)
            .zip(&old_quals)
            .map(|((old, new), qual)| {
                if old.to_ascii_uppercase() == *new {
                    bound_qual(*qual as i32)
                } else {
                    bound_qual(*qual as i32 - CORRECT_BASE_QUALITY_PENALTY)
                }
            })
            .collect(),
        Space::Nucleotide => old_quals,
    };

    let mut data = Data::default();
    for tag in [cs_tag()?, cq_tag()?, Tag::READ_GROUP] {
        if let Some(value) = record.data().get(&tag) {
            data.insert(tag, value.clone());
        }
    }

    let mut updated = record.clone();
    *updated.reference_sequence_id_mut() = Some(first.contig as usize - 1);
    *updated.alignment_start_mut() = Some(Position::try_from(first.position as usize)?);
    *updated.cigar_mut() = Cigar::from(ops);
    *updated.sequence_mut() = Sequence::from(seq_bytes);
    *updated.quality_scores_mut() = QualityScores::from(qualities);
    *updated.data_mut() = data;

    Ok(updated)
}

fn push_op(ops: &mut Vec<Op>, kind: Kind, len: usize) {
    match ops.last_mut() {
        Some(last) if last.kind() == kind => *last = Op::new(kind, last.len() + len),
        _ => ops.push(Op::new(kind, len)),
    }
}

/// Base qualities from the two flanking color qualities: both colors
/// consistent gives their sum plus ten, one consistent gives the
/// difference, neither gives one. `m1` judges consistency against the old
/// base call, `m2` against the new one.
fn derive_color_qualities(colors: &[u8], cq: &[u8], old_seq: &[u8], new_seq: &[u8]) -> Vec<u8> {
    let len = new_seq.len();
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        let qual = if i == len - 1 {
            char_to_qual(cq[i])
        } else {
            let transition = nt2int(colors[i]) ^ nt2int(colors[i + 1]);
            let m1 = transition == nt2int(old_seq[i]);
            let m2 = transition == nt2int(new_seq[i]);
            match (m1, m2) {
                (true, true) => char_to_qual(cq[i]) + char_to_qual(cq[i + 1]) + 10,
                (true, false) => char_to_qual(cq[i]) - char_to_qual(cq[i + 1]),
                (false, true) => char_to_qual(cq[i + 1]) - char_to_qual(cq[i]),
                (false, false) => 1,
            }
        };
        out.push(bound_qual(qual));
    }
    out
}
