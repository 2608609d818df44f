//! Record source and sink over SAM/BAM files.
//!
//! Inputs open as indexed BAM (range-scoped queries) or plain SAM
//! (sequential streaming). Per range, one stream per input is interleaved
//! through a one-record-per-source buffer ordered by `(tid, pos)`; the core
//! only ever sees decoded `RecordBuf`s inside record envelopes.

use crate::error::RemaError;
use crate::ranges::GenomicRange;
use crate::records::RecordEnvelope;
use noodles::bam;
use noodles::bgzf;
use noodles::core::{Position, Region};
use noodles::sam::{self, alignment::io::Write as _, alignment::RecordBuf};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write as _};

type BamReader = bam::io::IndexedReader<bgzf::io::Reader<File>>;
type SamReader = sam::io::Reader<BufReader<File>>;
type BamWriter = bam::io::Writer<bgzf::io::Writer<File>>;
type SamWriter = sam::io::Writer<BufWriter<File>>;

fn is_sam(path: &str) -> bool {
    path.ends_with(".sam")
}

enum InputKind {
    Bam(BamReader),
    Sam(SamReader),
}

struct Input {
    kind: InputKind,
    header: sam::Header,

    /// Lookahead carried over a range change for sequential inputs.
    pending: Option<RecordBuf>,
}

pub struct RecordSource {
    inputs: Vec<Input>,
}

impl RecordSource {
    /// Open every input. With `use_ranges`, all inputs must support random
    /// access; SAM files do not.
    pub fn open(paths: &[String], use_ranges: bool) -> Result<Self, RemaError> {
        let mut inputs = Vec::with_capacity(paths.len());
        for path in paths {
            let input = if is_sam(path) {
                if use_ranges {
                    return Err(RemaError::CliError(
                        "range querying is not possible with SAM files".to_string(),
                    ));
                }
                let file = File::open(path)
                    .map_err(|e| RemaError::OpenFile(format!("{}: {}", path, e)))?;
                let mut reader = sam::io::Reader::new(BufReader::new(file));
                let header = reader
                    .read_header()
                    .map_err(|e| RemaError::ReadFile(format!("{}: {}", path, e)))?;
                Input {
                    kind: InputKind::Sam(reader),
                    header,
                    pending: None,
                }
            } else {
                let mut reader = bam::io::indexed_reader::Builder::default()
                    .build_from_path(path)
                    .map_err(|e| RemaError::OpenFile(format!("{}: {}", path, e)))?;
                let header = reader
                    .read_header()
                    .map_err(|e| RemaError::ReadFile(format!("{}: {}", path, e)))?;
                Input {
                    kind: InputKind::Bam(reader),
                    header,
                    pending: None,
                }
            };
            inputs.push(input);
        }
        Ok(Self { inputs })
    }

    pub fn headers(&self) -> Vec<sam::Header> {
        self.inputs.iter().map(|i| i.header.clone()).collect()
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    /// Seek every input to a range and return the interleaved stream.
    /// Sequential inputs ignore the range and continue where they left off.
    pub fn change_range(
        &mut self,
        contig_name: &str,
        range: GenomicRange,
    ) -> Result<InterleavedRecords<'_>, RemaError> {
        let mut streams = Vec::with_capacity(self.inputs.len());
        for (source, input) in self.inputs.iter_mut().enumerate() {
            let Input {
                kind,
                header,
                pending,
            } = input;
            let header: &sam::Header = header;
            let pending = pending.take();

            let iter: Box<dyn Iterator<Item = Result<RecordBuf, RemaError>> + '_> = match kind {
                InputKind::Bam(reader) => {
                    let start = Position::try_from(range.beg as usize + 1)?;
                    let end = Position::try_from(range.end as usize + 1)?;
                    let region = Region::new(contig_name, start..=end);
                    let query = reader
                        .query(header, &region)
                        .map_err(|e| RemaError::ReadFile(format!("query failed: {}", e)))?;
                    Box::new(query.map(move |result| {
                        let record = result.map_err(RemaError::from)?;
                        RecordBuf::try_from_alignment_record(header, &record)
                            .map_err(RemaError::from)
                    }))
                }
                InputKind::Sam(reader) => Box::new(reader.records().map(move |result| {
                    let record = result.map_err(RemaError::from)?;
                    RecordBuf::try_from_alignment_record(header, &record).map_err(RemaError::from)
                })),
            };

            streams.push(SourceStream {
                source,
                pending,
                iter,
            });
        }

        let mut interleaved = InterleavedRecords {
            buffer: (0..streams.len()).map(|_| None).collect(),
            streams,
        };
        interleaved.fill()?;
        Ok(interleaved)
    }

    /// Hand unconsumed lookahead records back after a range ends. Indexed
    /// inputs re-query on the next range, so only sequential inputs keep
    /// theirs.
    pub fn restore(&mut self, leftovers: Vec<(usize, RecordBuf)>) {
        for (source, record) in leftovers {
            if let InputKind::Sam(_) = self.inputs[source].kind {
                self.inputs[source].pending = Some(record);
            }
        }
    }
}

struct SourceStream<'a> {
    source: usize,
    pending: Option<RecordBuf>,
    iter: Box<dyn Iterator<Item = Result<RecordBuf, RemaError>> + 'a>,
}

impl SourceStream<'_> {
    fn next_record(&mut self) -> Result<Option<RecordBuf>, RemaError> {
        if let Some(record) = self.pending.take() {
            return Ok(Some(record));
        }
        match self.iter.next() {
            Some(result) => result.map(Some),
            None => Ok(None),
        }
    }
}

/// Multiple inputs interleaved by `(tid, pos)`: at most one decoded record
/// per source is buffered at a time.
pub struct InterleavedRecords<'a> {
    streams: Vec<SourceStream<'a>>,
    buffer: Vec<Option<RecordEnvelope>>,
}

impl InterleavedRecords<'_> {
    fn fill(&mut self) -> Result<(), RemaError> {
        for (i, stream) in self.streams.iter_mut().enumerate() {
            if self.buffer[i].is_none() {
                if let Some(record) = stream.next_record()? {
                    self.buffer[i] = Some(RecordEnvelope::new(stream.source, record));
                }
            }
        }
        Ok(())
    }

    /// Pop the least `(tid, pos)` record and refill from its source.
    pub fn next(&mut self) -> Result<Option<RecordEnvelope>, RemaError> {
        let least = self
            .buffer
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|e| (i, (e.tid, e.pos))))
            .min_by_key(|(_, key)| *key);

        let Some((i, _)) = least else {
            return Ok(None);
        };
        let envelope = self.buffer[i].take();
        if let Some(record) = self.streams[i].next_record()? {
            self.buffer[i] = Some(RecordEnvelope::new(i, record));
        }
        Ok(envelope)
    }

    /// Tear down the stream, returning buffered lookahead records.
    pub fn finish(self) -> Vec<(usize, RecordBuf)> {
        self.buffer
            .into_iter()
            .flatten()
            .map(|e| (e.source, e.record))
            .collect()
    }
}

enum OutputKind {
    Bam(BamWriter),
    Sam(SamWriter),
}

struct Output {
    kind: OutputKind,
    header: sam::Header,
}

/// One writer per input, or a single merged writer.
pub struct RecordSink {
    outputs: Vec<Output>,
}

impl RecordSink {
    pub fn create(
        paths: &[String],
        input_headers: &[sam::Header],
        template: Option<&sam::Header>,
    ) -> Result<Self, RemaError> {
        let mut outputs = Vec::with_capacity(paths.len());
        if paths.len() == 1 {
            let header = template
                .cloned()
                .unwrap_or_else(|| input_headers[0].clone());
            outputs.push(open_output(&paths[0], header)?);
        } else {
            for (path, header) in paths.iter().zip(input_headers) {
                outputs.push(open_output(path, header.clone())?);
            }
        }
        Ok(Self { outputs })
    }

    /// Route the record to the writer matching its source.
    pub fn write(&mut self, envelope: &RecordEnvelope) -> Result<(), RemaError> {
        let index = if self.outputs.len() == 1 {
            0
        } else {
            envelope.source
        };
        let output = &mut self.outputs[index];
        match &mut output.kind {
            OutputKind::Bam(writer) => writer
                .write_alignment_record(&output.header, &envelope.record)
                .map_err(|e| RemaError::WriteFile(e.to_string())),
            OutputKind::Sam(writer) => writer
                .write_alignment_record(&output.header, &envelope.record)
                .map_err(|e| RemaError::WriteFile(e.to_string())),
        }
    }

    pub fn finish(&mut self) -> Result<(), RemaError> {
        for output in &mut self.outputs {
            match &mut output.kind {
                OutputKind::Bam(writer) => writer
                    .try_finish()
                    .map_err(|e| RemaError::WriteFile(e.to_string()))?,
                OutputKind::Sam(writer) => writer
                    .get_mut()
                    .flush()
                    .map_err(|e| RemaError::WriteFile(e.to_string()))?,
            }
        }
        Ok(())
    }
}

fn open_output(path: &str, header: sam::Header) -> Result<Output, RemaError> {
    let file =
        File::create(path).map_err(|e| RemaError::OpenFile(format!("{}: {}", path, e)))?;
    let kind = if is_sam(path) {
        let mut writer = sam::io::Writer::new(BufWriter::new(file));
        writer
            .write_header(&header)
            .map_err(|e| RemaError::WriteFile(format!("{}: {}", path, e)))?;
        OutputKind::Sam(writer)
    } else {
        let mut writer = bam::io::Writer::new(file);
        writer
            .write_header(&header)
            .map_err(|e| RemaError::WriteFile(format!("{}: {}", path, e)))?;
        OutputKind::Bam(writer)
    };
    Ok(Output { kind, header })
}

/// Read a SAM header from a template file (for merged output).
pub fn read_header_template(path: &str) -> Result<sam::Header, RemaError> {
    let file = File::open(path).map_err(|e| RemaError::OpenFile(format!("{}: {}", path, e)))?;
    let mut reader = sam::io::Reader::new(BufReader::new(file));
    reader
        .read_header()
        .map_err(|e| RemaError::ReadFile(format!("{}: {}", path, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_sam(dir: &tempfile::TempDir, name: &str, records: &[&str]) -> String {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        writeln!(file, "@HD\tVN:1.6\tSO:coordinate").unwrap();
        writeln!(file, "@SQ\tSN:sq0\tLN:100").unwrap();
        for record in records {
            writeln!(file, "{}", record).unwrap();
        }
        path.to_str().unwrap().to_string()
    }

    fn sam_line(name: &str, pos: u32, seq: &str) -> String {
        format!(
            "{}\t0\tsq0\t{}\t60\t{}M\t*\t0\t0\t{}\t{}",
            name,
            pos,
            seq.len(),
            seq,
            "I".repeat(seq.len())
        )
    }

    #[test]
    fn test_sequential_interleaving() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_sam(
            &dir,
            "a.sam",
            &[&sam_line("a1", 5, "ACGTA"), &sam_line("a2", 30, "ACGTA")],
        );
        let b = write_sam(&dir, "b.sam", &[&sam_line("b1", 10, "CGTAC")]);

        let mut source = RecordSource::open(&[a, b], false).unwrap();
        assert_eq!(source.num_inputs(), 2);

        let range = GenomicRange {
            tid: 0,
            beg: 0,
            end: 99,
        };
        let mut records = source.change_range("sq0", range).unwrap();

        let order: Vec<(usize, u32)> = std::iter::from_fn(|| records.next().unwrap())
            .map(|e| (e.source, e.pos))
            .collect();
        assert_eq!(order, vec![(0, 5), (1, 10), (0, 30)]);

        let leftovers = records.finish();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_lookahead_survives_range_change() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_sam(
            &dir,
            "a.sam",
            &[&sam_line("a1", 5, "ACGTA"), &sam_line("a2", 30, "ACGTA")],
        );

        let mut source = RecordSource::open(&[a], false).unwrap();
        let range = GenomicRange {
            tid: 0,
            beg: 0,
            end: 99,
        };

        let mut records = source.change_range("sq0", range).unwrap();
        let first = records.next().unwrap().unwrap();
        assert_eq!(first.pos, 5);
        // a2 sits in the lookahead buffer; finish hands it back.
        let finished = records.finish();
        source.restore(finished);

        let mut records = source.change_range("sq0", range).unwrap();
        let second = records.next().unwrap().unwrap();
        assert_eq!(second.pos, 30);
    }

    #[test]
    fn test_sam_rejects_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_sam(&dir, "a.sam", &[]);
        assert!(RecordSource::open(&[a], true).is_err());
    }

    #[test]
    fn test_sink_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_sam(&dir, "in.sam", &[&sam_line("r1", 7, "ACGTA")]);
        let output = dir.path().join("out.sam");
        let output = output.to_str().unwrap().to_string();

        let mut source = RecordSource::open(&[input], false).unwrap();
        let headers = source.headers();
        let mut sink = RecordSink::create(&[output.clone()], &headers, None).unwrap();

        let range = GenomicRange {
            tid: 0,
            beg: 0,
            end: 99,
        };
        let mut records = source.change_range("sq0", range).unwrap();
        while let Some(envelope) = records.next().unwrap() {
            sink.write(&envelope).unwrap();
        }
        sink.finish().unwrap();

        let text = std::fs::read_to_string(&output).unwrap();
        assert!(text.contains("@SQ\tSN:sq0\tLN:100"));
        assert!(text.contains("r1\t0\tsq0\t7\t60\t5M"));
    }
}
