//! Genomic range sets: parsing, normalization, and the output-side cursor.
//!
//! Ranges parse as `name[:begin[-end]]`, 1-based inclusive, with commas and
//! whitespace stripped from the string. Internally they are 0-based
//! inclusive, sorted by `(tid, beg)`, clamped to contig bounds, and merged
//! when they overlap.

use crate::error::RemaError;
use itertools::Itertools;
use nom::{
    bytes::complete::take_till,
    character::complete::{char, digit1},
    combinator::opt,
    sequence::preceded,
    IResult, Parser,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GenomicRange {
    pub tid: usize,

    /// 0-based, inclusive.
    pub beg: u32,

    /// 0-based, inclusive.
    pub end: u32,
}

#[derive(Debug, Clone, Default)]
pub struct RangeSet {
    ranges: Vec<GenomicRange>,
    cursor: usize,
}

fn range_parts(input: &str) -> IResult<&str, (&str, Option<(&str, Option<&str>)>)> {
    (
        take_till(|c| c == ':'),
        opt(preceded(
            char(':'),
            (digit1, opt(preceded(char('-'), digit1))),
        )),
    )
        .parse(input)
}

impl RangeSet {
    /// One range per contig, covering it whole.
    pub fn whole_contigs(contigs: &[(String, u32)]) -> Self {
        let mut set = Self::default();
        for (tid, (_, length)) in contigs.iter().enumerate() {
            if *length > 0 {
                set.add(GenomicRange {
                    tid,
                    beg: 0,
                    end: length - 1,
                });
            }
        }
        set
    }

    /// Parse one range per line, expanding both sides by `offset` and
    /// clamping to the contig.
    pub fn from_lines<'a, I>(
        lines: I,
        contigs: &[(String, u32)],
        offset: u32,
    ) -> Result<Self, RemaError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut set = Self::default();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            set.add(parse_range(line, contigs, offset)?);
        }
        if set.ranges.is_empty() {
            return Err(RemaError::ParsingError("no usable ranges".to_string()));
        }
        Ok(set)
    }

    pub fn add(&mut self, range: GenomicRange) {
        self.ranges.push(range);
        self.ranges.sort_by_key(|r| (r.tid, r.beg));
        self.ranges = std::mem::take(&mut self.ranges)
            .into_iter()
            .coalesce(|a, b| {
                if a.tid == b.tid && b.beg <= a.end {
                    Ok(GenomicRange {
                        tid: a.tid,
                        beg: a.beg,
                        end: a.end.max(b.end),
                    })
                } else {
                    Err((a, b))
                }
            })
            .collect();
    }

    pub fn peek(&self) -> Option<GenomicRange> {
        self.ranges.get(self.cursor).copied()
    }

    /// Advance to the next range and return it, or None when exhausted.
    pub fn poll(&mut self) -> Option<GenomicRange> {
        if self.cursor + 1 < self.ranges.len() {
            self.cursor += 1;
            self.peek()
        } else {
            None
        }
    }

    /// Whether a record starting at `pos` (0-based) on `tid` falls inside a
    /// remaining range. Consumes ranges that end before the record; records
    /// arrive sorted, so consumed ranges never match again.
    pub fn contains_start(&mut self, tid: usize, pos: u32) -> bool {
        let mut range = match self.peek() {
            Some(r) => r,
            None => return false,
        };
        while range.tid < tid || (range.tid == tid && range.end < pos) {
            range = match self.poll() {
                Some(r) => r,
                None => return false,
            };
        }
        !(tid < range.tid || (range.tid == tid && pos < range.beg))
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Parse `name[:begin[-end]]` against the known contigs.
fn parse_range(
    input: &str,
    contigs: &[(String, u32)],
    offset: u32,
) -> Result<GenomicRange, RemaError> {
    // Commas and whitespace are allowed inside numerics.
    let sanitized: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();

    let (rest, (name, bounds)) = range_parts(&sanitized)
        .map_err(|_| RemaError::ParsingError(format!("invalid range: {}", input)))?;
    if !rest.is_empty() || name.is_empty() {
        return Err(RemaError::ParsingError(format!("invalid range: {}", input)));
    }

    let tid = contigs
        .iter()
        .position(|(contig, _)| contig == name)
        .ok_or_else(|| {
            RemaError::ParsingError(format!("reference sequence [{}] not found", name))
        })?;
    let length = contigs[tid].1;
    if length == 0 {
        return Err(RemaError::ParsingError(format!(
            "reference sequence [{}] has no length",
            name
        )));
    }

    let (beg, end) = match bounds {
        None => (0i64, length as i64 - 1),
        Some((beg_str, end_str)) => {
            let beg: i64 = beg_str.parse::<u32>()? as i64 - 1;
            let end: i64 = match end_str {
                Some(s) => s.parse::<u32>()? as i64 - 1,
                None => length as i64 - 1,
            };
            // Expand so re-alignment has context on both sides.
            (beg - offset as i64, end + offset as i64)
        }
    };

    let beg = beg.clamp(0, length as i64 - 1) as u32;
    let end = end.clamp(0, length as i64 - 1) as u32;
    if beg > end {
        return Err(RemaError::ParsingError(format!("invalid range: {}", input)));
    }

    Ok(GenomicRange { tid, beg, end })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn contigs() -> Vec<(String, u32)> {
        vec![("chr1".to_string(), 1000), ("chr2".to_string(), 500)]
    }

    #[rstest]
    #[case("chr1", 0, 0, 999)]
    #[case("chr1:100", 0, 99, 999)]
    #[case("chr1:100-200", 0, 99, 199)]
    #[case("chr2:1-10", 1, 0, 9)]
    #[case("chr1:1,000", 0, 999, 999)]
    #[case("chr1: 100 - 200", 0, 99, 199)]
    fn test_parse(
        #[case] input: &str,
        #[case] tid: usize,
        #[case] beg: u32,
        #[case] end: u32,
    ) {
        let range = parse_range(input, &contigs(), 0).unwrap();
        assert_eq!(range, GenomicRange { tid, beg, end });
    }

    #[test]
    fn test_parse_expands_and_clamps() {
        let range = parse_range("chr1:5-990", &contigs(), 20).unwrap();
        assert_eq!(range.beg, 0);
        assert_eq!(range.end, 999);
    }

    #[rstest]
    #[case("chrX:1-10")]
    #[case("chr1:200-100")]
    #[case(":")]
    fn test_parse_rejects(#[case] input: &str) {
        assert!(parse_range(input, &contigs(), 0).is_err());
    }

    #[test]
    fn test_add_sorts_and_merges() {
        let mut set = RangeSet::default();
        set.add(GenomicRange {
            tid: 1,
            beg: 10,
            end: 20,
        });
        set.add(GenomicRange {
            tid: 0,
            beg: 100,
            end: 200,
        });
        set.add(GenomicRange {
            tid: 0,
            beg: 150,
            end: 300,
        });
        assert_eq!(set.len(), 2);
        assert_eq!(
            set.peek(),
            Some(GenomicRange {
                tid: 0,
                beg: 100,
                end: 300
            })
        );
    }

    #[test]
    fn test_contains_start_consumes_ranges() {
        let contigs = contigs();
        let mut set = RangeSet::from_lines(["chr1:101-200", "chr2:1-100"], &contigs, 0).unwrap();

        assert!(!set.contains_start(0, 50));
        assert!(set.contains_start(0, 120));
        // Moving past the first range consumes it.
        assert!(set.contains_start(1, 10));
        // Exhausted for good once the cursor moves past the last range.
        assert!(!set.contains_start(2, 10));
        assert!(!set.contains_start(2, 10));
    }

    #[test]
    fn test_whole_contigs() {
        let set = RangeSet::whole_contigs(&contigs());
        assert_eq!(set.len(), 2);
        assert_eq!(
            set.peek(),
            Some(GenomicRange {
                tid: 0,
                beg: 0,
                end: 999
            })
        );
    }
}
