use crate::error::RemaError;
use noodles::core::{Position, Region};
use noodles::fasta::io::{
    indexed_reader::{Builder, IndexedReader},
    BufReader,
};

/// A fetched slice of reference sequence.
///
/// Coordinates are 0-based inclusive, like the range set. Bases are stored
/// uppercase so decomposition never mismatches against soft-masked
/// reference.
#[derive(Debug, Clone)]
pub struct ReferenceWindow {
    pub tid: usize,

    /// 0-based, inclusive.
    pub beg: u32,

    /// 0-based, inclusive.
    pub end: u32,

    seq: Vec<u8>,
}

impl ReferenceWindow {
    pub fn new(tid: usize, beg: u32, mut seq: Vec<u8>) -> Self {
        seq.make_ascii_uppercase();
        let end = beg + seq.len().saturating_sub(1) as u32;
        Self { tid, beg, end, seq }
    }

    pub fn bases(&self) -> &[u8] {
        &self.seq
    }

    /// Whether `[beg, end]` (0-based inclusive) on `tid` is fully covered.
    pub fn covers(&self, tid: usize, beg: u32, end: u32) -> bool {
        self.tid == tid && self.beg <= beg && end <= self.end
    }
}

/// Random access over an indexed FASTA (with a .fai next to it).
pub struct FastaRepository {
    reader: IndexedReader<BufReader<std::fs::File>>,
}

impl FastaRepository {
    pub fn open(path: &str) -> Result<Self, RemaError> {
        let reader = Builder::default()
            .build_from_path(path)
            .map_err(|e| RemaError::OpenFile(format!("{}: {}", path, e)))?;
        Ok(Self { reader })
    }

    /// Fetch `[beg, end]` (0-based inclusive) of the named contig.
    pub fn fetch(
        &mut self,
        name: &str,
        tid: usize,
        beg: u32,
        end: u32,
    ) -> Result<ReferenceWindow, RemaError> {
        if end < beg {
            return Err(RemaError::OutOfRange(format!(
                "reference fetch {}:{}-{}",
                name,
                beg + 1,
                end + 1
            )));
        }

        let start = Position::try_from(beg as usize + 1)?;
        let stop = Position::try_from(end as usize + 1)?;
        let region = Region::new(name, start..=stop);

        let record = self
            .reader
            .query(&region)
            .map_err(|e| RemaError::ReadFile(format!("reference {}: {}", name, e)))?;

        let seq = record.sequence().as_ref().to_vec();
        if seq.len() != (end - beg + 1) as usize {
            return Err(RemaError::OutOfRange(format!(
                "reference fetch {}:{}-{} returned {} bases",
                name,
                beg + 1,
                end + 1,
                seq.len()
            )));
        }

        Ok(ReferenceWindow::new(tid, beg, seq))
    }
}
