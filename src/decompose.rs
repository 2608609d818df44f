//! Alignment decomposition: expand a record's CIGAR against the fetched
//! reference into gapped read/reference arrays, canonicalize indels to their
//! leftmost placement, and map read bases back to reference columns.

use crate::base::GAP;
use crate::error::RemaError;
use crate::reference::ReferenceWindow;
use noodles::sam::alignment::record::cigar::op::Kind;
use noodles::sam::alignment::RecordBuf;

/// Per-read scratch produced from a record and its reference window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decomposition {
    /// Read bases with `-` at deletion columns. ASCII, uppercase.
    pub read: Vec<u8>,

    /// Reference bases with `-` at insertion columns. ASCII, uppercase.
    pub refr: Vec<u8>,

    /// For each read base (gaps excluded), the 0-based reference column
    /// within the fetched window.
    pub positions: Vec<u32>,

    /// For each read base (gaps excluded), its index in the aligned arrays.
    pub positions_index: Vec<u32>,
}

impl Decomposition {
    pub fn from_record(
        record: &RecordBuf,
        window: &ReferenceWindow,
    ) -> Result<Self, RemaError> {
        let alignment_start = record
            .alignment_start()
            .ok_or_else(|| RemaError::OutOfRange("record has no alignment start".to_string()))?;
        let pos0 = usize::from(alignment_start) - 1;

        if pos0 < window.beg as usize {
            return Err(RemaError::OutOfRange(
                "record starts before the reference window".to_string(),
            ));
        }

        // First pass: sizes.
        let mut length = 0;
        let mut positions_length = 0;
        let mut has_indel = false;
        for op in record.cigar().as_ref().iter() {
            match op.kind() {
                Kind::Match | Kind::SequenceMatch | Kind::SequenceMismatch => {
                    length += op.len();
                    positions_length += op.len();
                }
                Kind::Insertion => {
                    length += op.len();
                    positions_length += op.len();
                    has_indel = true;
                }
                Kind::Deletion => {
                    length += op.len();
                    has_indel = true;
                }
                _ => {}
            }
        }

        let seq = record.sequence().as_ref();
        let ref_bases = window.bases();

        let mut read = vec![0u8; length];
        let mut refr = vec![0u8; length];

        let mut aln_index = 0;
        let mut read_index = 0;
        let mut ref_index = pos0 - window.beg as usize;

        for op in record.cigar().as_ref().iter() {
            match op.kind() {
                Kind::Match | Kind::SequenceMatch | Kind::SequenceMismatch => {
                    for _ in 0..op.len() {
                        refr[aln_index] = fetch(ref_bases, ref_index)?;
                        read[aln_index] = seq[read_index].to_ascii_uppercase();
                        ref_index += 1;
                        read_index += 1;
                        aln_index += 1;
                    }
                }
                Kind::Insertion => {
                    for _ in 0..op.len() {
                        refr[aln_index] = GAP;
                        read[aln_index] = seq[read_index].to_ascii_uppercase();
                        read_index += 1;
                        aln_index += 1;
                    }
                }
                Kind::Deletion => {
                    for _ in 0..op.len() {
                        refr[aln_index] = fetch(ref_bases, ref_index)?;
                        read[aln_index] = GAP;
                        ref_index += 1;
                        aln_index += 1;
                    }
                }
                Kind::SoftClip => read_index += op.len(),
                Kind::HardClip => {}
                kind => {
                    return Err(RemaError::OutOfRange(format!(
                        "unsupported CIGAR operation: {:?}",
                        kind
                    )))
                }
            }
        }

        let mut decomposition = Self {
            read,
            refr,
            positions: Vec::new(),
            positions_index: Vec::new(),
        };

        if has_indel {
            decomposition.left_justify();
        }

        decomposition.fill_positions(positions_length);

        Ok(decomposition)
    }

    pub fn len(&self) -> usize {
        self.read.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read.is_empty()
    }

    /// Shift every indel run as far toward the 5' end of the reference as
    /// the flanking bases allow. Passes repeat until nothing moves, so the
    /// operation is idempotent.
    pub fn left_justify(&mut self) {
        while left_justify_pass(&mut self.read, &mut self.refr) {}
    }

    fn fill_positions(&mut self, positions_length: usize) {
        self.positions = Vec::with_capacity(positions_length);
        self.positions_index = Vec::with_capacity(positions_length);

        let mut ref_index: i64 = -1;
        for aln_index in 0..self.read.len() {
            if aln_index == 0 || self.refr[aln_index - 1] != GAP {
                ref_index += 1;
            }
            if self.read[aln_index] != GAP {
                self.positions.push(ref_index as u32);
                self.positions_index.push(aln_index as u32);
            }
        }
    }
}

fn fetch(ref_bases: &[u8], index: usize) -> Result<u8, RemaError> {
    ref_bases
        .get(index)
        .copied()
        .ok_or_else(|| RemaError::OutOfRange("record extends past the reference window".to_string()))
}

/// One left-justification sweep. Returns whether anything moved.
fn left_justify_pass(read: &mut [u8], refr: &mut [u8]) -> bool {
    let mut changed = false;
    let mut i = 0;

    while i < read.len() {
        if read[i] == GAP {
            // Deletion run.
            let start = i;
            while i < read.len() && read[i] == GAP {
                i += 1;
            }
            // Only a run followed by an aligned column is shifted.
            if i < read.len() && refr[i] != GAP {
                let mut s = start;
                let mut e = i - 1;
                while s > 0 && read[s - 1] != GAP && refr[s - 1] != GAP && refr[s - 1] == refr[e] {
                    read[e] = read[s - 1];
                    read[s - 1] = GAP;
                    s -= 1;
                    e -= 1;
                    changed = true;
                }
                i = e + 1;
            }
        } else if refr[i] == GAP {
            // Insertion run.
            let start = i;
            while i < read.len() && refr[i] == GAP && read[i] != GAP {
                i += 1;
            }
            if i < read.len() && read[i] != GAP && refr[i] != GAP {
                let mut s = start;
                let mut e = i - 1;
                while s > 0 && read[s - 1] != GAP && refr[s - 1] != GAP && read[s - 1] == read[e] {
                    refr[e] = refr[s - 1];
                    refr[s - 1] = GAP;
                    s -= 1;
                    e -= 1;
                    changed = true;
                }
                i = e + 1;
            }
        } else {
            i += 1;
        }
    }

    changed
}
