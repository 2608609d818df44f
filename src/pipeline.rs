//! The pipeline driver.
//!
//! Per input range: records stream from the source in coordinate order,
//! stage through the `to-graph` list into the variation graph, migrate to
//! the `to-align` list, get re-aligned against the graph, and settle into
//! the `to-output` list, which drains to the sink once records trail the
//! graph window by more than twice the offset.
//!
//! Work is drained in fixed 256-record blocks claimed by a fixed pool of
//! scoped workers. Lock order: a list mutex first, the graph mutex
//! innermost; no worker holds the graph-list mutex while taking the graph
//! mutex.

use crate::cutoffs::CoverageCutoffs;
use crate::decompose::Decomposition;
use crate::error::RemaError;
use crate::graph::Graph;
use crate::heap::{HeapKind, SearchHeap};
use crate::ranges::{GenomicRange, RangeSet};
use crate::realign::{realign, RealignParams};
use crate::records::{RecordEnvelope, RecordList};
use crate::reference::{FastaRepository, ReferenceWindow};
use crate::repository::{read_header_template, InterleavedRecords, RecordSink, RecordSource};
use crate::settings::Settings;
use log::{info, warn};
use noodles::sam::alignment::RecordBuf;
use std::io::Write as _;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Records claimed per lock acquisition.
const BLOCK_SIZE: usize = 256;

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RemaError> {
    mutex
        .lock()
        .map_err(|_| RemaError::Thread("poisoned mutex".to_string()))
}

/// Everything workers share read-only.
struct Shared {
    params: RealignParams,
    cutoffs: CoverageCutoffs,
    num_threads: usize,
    max_queue_size: usize,
    min_mapq: u8,
}

/// The `to-align` list and the output-side range cursor share a mutex: the
/// cursor is consumed while deciding which records migrate.
struct AlignStage {
    list: RecordList,
    ranges_out: RangeSet,
    next_block: usize,
}

struct Progress {
    processed: u64,
    max_length: usize,
}

impl Progress {
    fn new() -> Self {
        Self {
            processed: 0,
            max_length: 0,
        }
    }

    fn report(&mut self, contig_name: &str, pos: u32, end: u32) {
        let mut message = format!(
            "\rRecords processed: {} (last {}:{}-{})",
            self.processed, contig_name, pos, end
        );
        if message.len() < self.max_length {
            let pad = self.max_length - message.len();
            message.extend(std::iter::repeat(' ').take(pad));
        } else {
            self.max_length = message.len();
        }
        eprint!("{}", message);
        let _ = std::io::stderr().flush();
    }

    fn finish(&self) {
        eprintln!();
    }
}

/// Run `worker` on the fixed pool, or inline when there is one thread.
fn run_workers<F>(num_threads: usize, worker: F) -> Result<(), RemaError>
where
    F: Fn() -> Result<(), RemaError> + Sync,
{
    if num_threads <= 1 {
        return worker();
    }
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..num_threads).map(|_| scope.spawn(&worker)).collect();
        let mut result = Ok(());
        for handle in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
                Err(_) => {
                    if result.is_ok() {
                        result = Err(RemaError::Thread("worker thread panicked".to_string()));
                    }
                }
            }
        }
        result
    })
}

pub fn run(settings: &Settings) -> Result<(), RemaError> {
    let start_time = Instant::now();

    if settings.num_threads > 1 {
        warn!(
            "multiple threads may not increase performance; consider sharding with -R instead"
        );
    }

    let use_ranges = settings.use_ranges();
    let mut source = RecordSource::open(&settings.inputs, use_ranges)?;
    let input_headers = source.headers();

    // The first input's header is canonical: ranges and contig names
    // resolve against it.
    let contigs: Vec<(String, u32)> = input_headers[0]
        .reference_sequences()
        .iter()
        .map(|(name, map)| {
            let name = std::str::from_utf8(name.as_ref())?.to_string();
            Ok((name, usize::from(map.length()) as u32))
        })
        .collect::<Result<_, RemaError>>()?;
    if contigs.is_empty() {
        return Err(RemaError::ParsingError(
            "input header has no reference sequences".to_string(),
        ));
    }

    let template = match &settings.header_template {
        Some(path) => Some(read_header_template(path)?),
        None => None,
    };
    let mut sink = RecordSink::create(&settings.outputs, &input_headers, template.as_ref())?;

    let mut fasta = FastaRepository::open(&settings.reference)?;

    let (mut ranges_in, ranges_out) = if use_ranges {
        let lines: Vec<String> = match (&settings.range, &settings.ranges_file) {
            (Some(range), None) => vec![range.clone()],
            (None, Some(path)) => std::fs::read_to_string(path)
                .map_err(|e| RemaError::OpenFile(format!("{}: {}", path, e)))?
                .lines()
                .map(str::to_string)
                .collect(),
            _ => {
                return Err(RemaError::CliError(
                    "-R and -Z were both specified".to_string(),
                ))
            }
        };
        // Input ranges gain offset context on both sides; output ranges do
        // not.
        (
            RangeSet::from_lines(lines.iter().map(String::as_str), &contigs, settings.offset)?,
            RangeSet::from_lines(lines.iter().map(String::as_str), &contigs, 0)?,
        )
    } else {
        (
            RangeSet::whole_contigs(&contigs),
            RangeSet::whole_contigs(&contigs),
        )
    };

    let shared = Shared {
        params: RealignParams {
            offset: settings.offset,
            correct_bases: settings.correct_bases,
            use_qualities: settings.use_qualities,
            max_total_coverage: settings.max_total_coverage,
            max_heap_size: settings.max_heap_size,
        },
        cutoffs: CoverageCutoffs::new(settings.min_allele_coverage, settings.min_allele_prob),
        num_threads: settings.num_threads,
        max_queue_size: settings.max_queue_size,
        min_mapq: settings.min_mapq,
    };

    let align_stage = Mutex::new(AlignStage {
        list: RecordList::default(),
        ranges_out,
        next_block: 0,
    });
    let mut to_output = RecordList::default();
    let mut progress = Progress::new();

    let mut range = ranges_in.peek();
    while let Some(current) = range {
        process_range(
            &shared,
            &mut source,
            &mut fasta,
            &contigs,
            &align_stage,
            &mut to_output,
            &mut sink,
            &mut progress,
            current,
        )?;
        range = ranges_in.poll();
    }

    // Flush whatever is still queued for output.
    while let Some(envelope) = to_output.pop_front() {
        sink.write(&envelope)?;
    }
    sink.finish()?;
    progress.finish();

    info!(
        "Elapsed time: {:.2} sec",
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn process_range(
    shared: &Shared,
    source: &mut RecordSource,
    fasta: &mut FastaRepository,
    contigs: &[(String, u32)],
    align_stage: &Mutex<AlignStage>,
    to_output: &mut RecordList,
    sink: &mut RecordSink,
    progress: &mut Progress,
    range: GenomicRange,
) -> Result<(), RemaError> {
    let contig_name = contigs[range.tid].0.clone();
    let graph = Mutex::new(Graph::new());
    let mut to_graph = RecordList::default();
    let mut window = fasta.fetch(&contig_name, range.tid, range.beg, range.end)?;
    let mut previous: Option<(usize, u32)> = None;

    let mut records = source.change_range(&contig_name, range)?;
    let mut next = next_record(&mut records, contigs)?;

    if let Some(envelope) = &next {
        if !envelope.is_unmapped() {
            lock(&graph)?.prune(envelope.tid, envelope.pos, shared.params.offset);
        }
    }

    while let Some(envelope) = next {
        if envelope.is_unmapped() || envelope.mapping_quality() < shared.min_mapq {
            // Removed from output.
            next = next_record(&mut records, contigs)?;
            continue;
        }

        if let Some(previous) = previous {
            if (envelope.tid, envelope.pos) < previous {
                return Err(RemaError::OutOfRange(
                    "SAM/BAM input is not coordinate sorted".to_string(),
                ));
            }
        }
        previous = Some((envelope.tid, envelope.pos));

        if shared.max_queue_size <= to_graph.len() {
            drain_graph(shared, &graph, &mut to_graph, align_stage, &window)?;
        }

        // A contig switch settles all staged work first: graph records must
        // decompose against the window they were read under, and pending
        // aligned work drains so the graph can be cleared to the new
        // contig.
        if envelope.tid != window.tid {
            if !to_graph.is_empty() {
                drain_graph(shared, &graph, &mut to_graph, align_stage, &window)?;
            }
            if !lock(align_stage)?.list.is_empty() {
                drain_align(
                    shared,
                    &graph,
                    align_stage,
                    to_output,
                    sink,
                    progress,
                    contigs,
                    true,
                )?;
            }
        }
        ensure_window(fasta, contigs, &mut window, &envelope)?;

        to_graph.push(envelope);

        if shared.max_queue_size <= lock(align_stage)?.list.len() {
            drain_align(
                shared,
                &graph,
                align_stage,
                to_output,
                sink,
                progress,
                contigs,
                false,
            )?;
        }

        next = next_record(&mut records, contigs)?;
    }

    if !to_graph.is_empty() {
        drain_graph(shared, &graph, &mut to_graph, align_stage, &window)?;
    }
    if !lock(align_stage)?.list.is_empty() {
        drain_align(
            shared,
            &graph,
            align_stage,
            to_output,
            sink,
            progress,
            contigs,
            true,
        )?;
    }

    let finished = records.finish();
    source.restore(finished);
    Ok(())
}

fn next_record(
    records: &mut InterleavedRecords<'_>,
    contigs: &[(String, u32)],
) -> Result<Option<RecordEnvelope>, RemaError> {
    let Some(envelope) = records.next()? else {
        return Ok(None);
    };
    if !envelope.is_unmapped() && envelope.tid >= contigs.len() {
        return Err(RemaError::OutOfRange(format!(
            "record references unknown contig index {}",
            envelope.tid
        )));
    }
    Ok(Some(envelope))
}

/// Grow (or move) the reference window to cover the record's span.
fn ensure_window(
    fasta: &mut FastaRepository,
    contigs: &[(String, u32)],
    window: &mut ReferenceWindow,
    envelope: &RecordEnvelope,
) -> Result<(), RemaError> {
    let beg = envelope.pos.saturating_sub(1);
    let end = envelope.end.saturating_sub(1);
    if window.covers(envelope.tid, beg, end) {
        return Ok(());
    }

    let (name, length) = &contigs[envelope.tid];
    let (mut new_beg, mut new_end) = if window.tid == envelope.tid {
        (window.beg.min(beg), window.end.max(end))
    } else {
        (beg, end)
    };
    new_end = new_end.min(length.saturating_sub(1));
    new_beg = new_beg.min(new_end);
    *window = fasta.fetch(name, envelope.tid, new_beg, new_end)?;
    Ok(())
}

/// Drain the `to-graph` list into the graph and migrate survivors to the
/// `to-align` list.
fn drain_graph(
    shared: &Shared,
    graph: &Mutex<Graph>,
    to_graph: &mut RecordList,
    align_stage: &Mutex<AlignStage>,
    window: &ReferenceWindow,
) -> Result<(), RemaError> {
    if to_graph.is_empty() {
        return Ok(());
    }

    // Moving to a new contig with no pending aligned work: prune first.
    {
        let stage = lock(align_stage)?;
        if stage.list.is_empty() {
            if let Some(head) = to_graph.front() {
                let mut graph = lock(graph)?;
                if graph.contig() != head.tid as u32 + 1 {
                    graph.prune(head.tid, head.pos, shared.params.offset);
                }
            }
        }
    }

    let work = Mutex::new(std::mem::take(to_graph));
    run_workers(shared.num_threads, || {
        graph_worker(&work, graph, align_stage, window)
    })?;

    // The list drained completely; keep the allocation.
    *to_graph = work
        .into_inner()
        .map_err(|_| RemaError::Thread("poisoned mutex".to_string()))?;
    Ok(())
}

fn graph_worker(
    work: &Mutex<RecordList>,
    graph: &Mutex<Graph>,
    align_stage: &Mutex<AlignStage>,
    window: &ReferenceWindow,
) -> Result<(), RemaError> {
    loop {
        let mut block = lock(work)?.take_block(BLOCK_SIZE);
        if block.is_empty() {
            return Ok(());
        }

        for envelope in &mut block {
            let aln = Decomposition::from_record(&envelope.record, window)?;
            let mut graph = lock(graph)?;
            envelope.start_node =
                graph.add_record(&aln, envelope.pos, envelope.tid, envelope.is_reverse())?;
        }

        let mut stage = lock(align_stage)?;
        for envelope in block {
            let on_graph_contig = {
                let graph = lock(graph)?;
                graph.contig() == envelope.tid as u32 + 1
            };
            let keep = on_graph_contig
                && stage
                    .ranges_out
                    .contains_start(envelope.tid, envelope.pos.saturating_sub(1))
                && envelope.start_node.is_some();
            if keep {
                stage.list.push(envelope);
            }
        }
    }
}

/// Re-align the staged records, move them to `to-output`, prune the graph,
/// and emit records that trail the window.
#[allow(clippy::too_many_arguments)]
fn drain_align(
    shared: &Shared,
    graph: &Mutex<Graph>,
    align_stage: &Mutex<AlignStage>,
    to_output: &mut RecordList,
    sink: &mut RecordSink,
    progress: &mut Progress,
    contigs: &[(String, u32)],
    flush: bool,
) -> Result<(), RemaError> {
    let should_process = {
        let stage = lock(align_stage)?;
        match (stage.list.front(), stage.list.back()) {
            (Some(head), Some(tail)) => {
                flush || head.end + shared.params.offset < tail.pos
            }
            _ => false,
        }
    };

    let mut last: Option<(usize, u32, u32)> = None;

    if should_process {
        let results: Mutex<Vec<(usize, Vec<RecordEnvelope>)>> = Mutex::new(Vec::new());
        {
            let guard = lock(graph)?;
            let graph_ref: &Graph = &guard;
            run_workers(shared.num_threads, || {
                align_worker(shared, graph_ref, align_stage, &results)
            })?;
        }

        let mut results = results
            .into_inner()
            .map_err(|_| RemaError::Thread("poisoned mutex".to_string()))?;
        results.sort_by_key(|(sequence, _)| *sequence);

        for (_, block) in results {
            for envelope in block {
                progress.processed += 1;
                last = Some((envelope.tid, envelope.pos, envelope.end));
                to_output.push(envelope);
            }
        }

        if let Some((tid, pos, end)) = last {
            progress.report(&contigs[tid].0, pos, end);
            let stage = lock(align_stage)?;
            let mut graph = lock(graph)?;
            match stage.list.front() {
                Some(head) => graph.prune(head.tid, head.pos, shared.params.offset),
                None => graph.prune(tid, pos, shared.params.offset),
            }
        }
    }

    // Emit: a record may still move forward by offset while a later one
    // moves back by offset, so only records trailing the window by more
    // than twice the offset are final.
    let graph = lock(graph)?;
    loop {
        let emit = match to_output.front() {
            None => false,
            Some(head) => {
                flush
                    || (head.tid as u32 + 1) < graph.contig()
                    || head.pos + 2 * shared.params.offset < graph.position_start()
            }
        };
        if !emit {
            break;
        }
        if let Some(envelope) = to_output.pop_front() {
            sink.write(&envelope)?;
        }
    }

    Ok(())
}

fn align_worker(
    shared: &Shared,
    graph: &Graph,
    align_stage: &Mutex<AlignStage>,
    results: &Mutex<Vec<(usize, Vec<RecordEnvelope>)>>,
) -> Result<(), RemaError> {
    let mut heap = SearchHeap::new(HeapKind::Min);
    loop {
        let (sequence, mut block) = {
            let mut stage = lock(align_stage)?;
            let block = stage.list.take_block(BLOCK_SIZE);
            if block.is_empty() {
                return Ok(());
            }
            let sequence = stage.next_block;
            stage.next_block += 1;
            (sequence, block)
        };

        for envelope in &mut block {
            if let Some(start_node) = envelope.start_node.take() {
                let record = std::mem::replace(&mut envelope.record, RecordBuf::default());
                envelope.record = realign(
                    graph,
                    record,
                    start_node,
                    &mut heap,
                    &shared.cutoffs,
                    &shared.params,
                )?;
                envelope.refresh();
            }
        }

        lock(results)?.push((sequence, block));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const REFERENCE: &str = "ACGTACGTACGTACGTACGT";
    const REFERENCE2: &str = "TTTTGGGGCCCCAAAATTGG";

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let fixture = Self {
                dir: tempfile::tempdir().unwrap(),
            };
            let fa = fixture.path("ref.fa");
            let mut file = std::fs::File::create(&fa).unwrap();
            writeln!(file, ">sq0").unwrap();
            writeln!(file, "{}", REFERENCE).unwrap();
            writeln!(file, ">sq1").unwrap();
            writeln!(file, "{}", REFERENCE2).unwrap();
            let mut fai = std::fs::File::create(fixture.path("ref.fa.fai")).unwrap();
            writeln!(fai, "sq0\t20\t5\t20\t21").unwrap();
            writeln!(fai, "sq1\t20\t31\t20\t21").unwrap();
            fixture
        }

        fn path(&self, name: &str) -> String {
            self.dir.path().join(name).to_str().unwrap().to_string()
        }

        fn write_sam(&self, name: &str, records: &[String]) -> String {
            let path = self.path(name);
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "@HD\tVN:1.6\tSO:coordinate").unwrap();
            writeln!(file, "@SQ\tSN:sq0\tLN:20").unwrap();
            writeln!(file, "@SQ\tSN:sq1\tLN:20").unwrap();
            for record in records {
                writeln!(file, "{}", record).unwrap();
            }
            path
        }

        fn settings(&self, inputs: Vec<String>, outputs: Vec<String>) -> Settings {
            Settings {
                inputs,
                outputs,
                reference: self.path("ref.fa"),
                offset: 5,
                min_mapq: 0,
                min_allele_prob: 0.1,
                min_allele_coverage: 3,
                max_total_coverage: 100,
                range: None,
                ranges_file: None,
                correct_bases: false,
                use_qualities: true,
                max_heap_size: 8192,
                max_queue_size: 65536,
                num_threads: 1,
                header_template: None,
            }
        }
    }

    fn sam_line(name: &str, pos: usize, seq: &str, mapq: u8) -> String {
        sam_line_on(name, "sq0", pos, seq, mapq)
    }

    fn sam_line_on(name: &str, contig: &str, pos: usize, seq: &str, mapq: u8) -> String {
        format!(
            "{}\t0\t{}\t{}\t{}\t{}M\t*\t0\t0\t{}\t{}",
            name,
            contig,
            pos,
            mapq,
            seq.len(),
            seq,
            "I".repeat(seq.len())
        )
    }

    /// Records from an output SAM as (name, pos, cigar, seq) tuples.
    fn read_output(path: &str) -> Vec<(String, usize, String, String)> {
        let text = std::fs::read_to_string(path).unwrap();
        text.lines()
            .filter(|line| !line.starts_with('@'))
            .map(|line| {
                let fields: Vec<&str> = line.split('\t').collect();
                (
                    fields[0].to_string(),
                    fields[3].parse().unwrap(),
                    fields[5].to_string(),
                    fields[9].to_string(),
                )
            })
            .collect()
    }

    #[test]
    fn test_identity_round_trip() {
        let fixture = Fixture::new();
        let input = fixture.write_sam(
            "in.sam",
            &[
                sam_line("r1", 1, "ACGTA", 60),
                sam_line("r2", 3, "GTACG", 60),
                sam_line("r3", 6, "CGTAC", 60),
            ],
        );
        let output = fixture.path("out.sam");
        let settings = fixture.settings(vec![input], vec![output.clone()]);

        run(&settings).unwrap();

        let records = read_output(&output);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], ("r1".into(), 1, "5M".into(), "ACGTA".into()));
        assert_eq!(records[1], ("r2".into(), 3, "5M".into(), "GTACG".into()));
        assert_eq!(records[2], ("r3".into(), 6, "5M".into(), "CGTAC".into()));
    }

    #[test]
    fn test_mismatch_corrected_end_to_end() {
        let fixture = Fixture::new();
        let mut lines = Vec::new();
        for i in 0..9 {
            lines.push(sam_line(&format!("clean{}", i), 1, "ACGTA", 60));
        }
        lines.push(sam_line("mm", 1, "ACTTA", 60));
        let input = fixture.write_sam("in.sam", &lines);
        let output = fixture.path("out.sam");
        let settings = fixture.settings(vec![input], vec![output.clone()]);

        run(&settings).unwrap();

        let records = read_output(&output);
        assert_eq!(records.len(), 10);
        let mm = records.iter().find(|(name, ..)| name == "mm").unwrap();
        assert_eq!(mm.2, "5M");
        assert_eq!(mm.3, "ACGTA");
    }

    #[test]
    fn test_mismatch_corrected_with_worker_pool() {
        let fixture = Fixture::new();
        let mut lines = Vec::new();
        for i in 0..9 {
            lines.push(sam_line(&format!("clean{}", i), 1, "ACGTA", 60));
        }
        lines.push(sam_line("mm", 1, "ACTTA", 60));
        let input = fixture.write_sam("in.sam", &lines);
        let output = fixture.path("out.sam");
        let mut settings = fixture.settings(vec![input], vec![output.clone()]);
        settings.num_threads = 2;

        run(&settings).unwrap();

        let records = read_output(&output);
        assert_eq!(records.len(), 10);
        let mm = records.iter().find(|(name, ..)| name == "mm").unwrap();
        assert_eq!(mm.3, "ACGTA");
    }

    #[test]
    fn test_unsorted_input_is_rejected() {
        let fixture = Fixture::new();
        let input = fixture.write_sam(
            "in.sam",
            &[
                sam_line("r1", 10, "CGTACG", 60),
                sam_line("r2", 5, "ACGTA", 60),
            ],
        );
        let output = fixture.path("out.sam");
        let settings = fixture.settings(vec![input], vec![output]);

        match run(&settings) {
            Err(RemaError::OutOfRange(_)) => {}
            other => panic!("expected OutOfRange, got {:?}", other),
        }
    }

    #[test]
    fn test_low_mapq_records_are_dropped() {
        let fixture = Fixture::new();
        let input = fixture.write_sam(
            "in.sam",
            &[
                sam_line("keep", 1, "ACGTA", 60),
                sam_line("drop", 3, "GTACG", 5),
            ],
        );
        let output = fixture.path("out.sam");
        let mut settings = fixture.settings(vec![input], vec![output.clone()]);
        settings.min_mapq = 10;

        run(&settings).unwrap();

        let records = read_output(&output);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, "keep");
    }

    #[test]
    fn test_per_input_output_routing() {
        let fixture = Fixture::new();
        let a = fixture.write_sam("a.sam", &[sam_line("a1", 1, "ACGTA", 60)]);
        let b = fixture.write_sam("b.sam", &[sam_line("b1", 3, "GTACG", 60)]);
        let out_a = fixture.path("a.out.sam");
        let out_b = fixture.path("b.out.sam");
        let settings = fixture.settings(vec![a, b], vec![out_a.clone(), out_b.clone()]);

        run(&settings).unwrap();

        let records_a = read_output(&out_a);
        let records_b = read_output(&out_b);
        assert_eq!(records_a.len(), 1);
        assert_eq!(records_a[0].0, "a1");
        assert_eq!(records_b.len(), 1);
        assert_eq!(records_b[0].0, "b1");
    }

    #[test]
    fn test_contig_change_drains_in_order() {
        let fixture = Fixture::new();
        let input = fixture.write_sam(
            "in.sam",
            &[
                sam_line("r1", 1, "ACGTA", 60),
                sam_line("r2", 4, "TACGT", 60),
                sam_line_on("s1", "sq1", 1, "TTTTG", 60),
                sam_line_on("s2", "sq1", 5, "GGGGC", 60),
            ],
        );
        let output = fixture.path("out.sam");
        let settings = fixture.settings(vec![input], vec![output.clone()]);

        run(&settings).unwrap();

        let records = read_output(&output);
        let names: Vec<&str> = records.iter().map(|(name, ..)| name.as_str()).collect();
        // Contig-0 records are written before contig-1 re-alignment output.
        assert_eq!(names, vec!["r1", "r2", "s1", "s2"]);
        for (_, _, cigar, _) in &records {
            assert_eq!(cigar, "5M");
        }
    }

    #[test]
    fn test_merged_output_with_header_template() {
        let fixture = Fixture::new();
        let a = fixture.write_sam("a.sam", &[sam_line("a1", 1, "ACGTA", 60)]);
        let b = fixture.write_sam("b.sam", &[sam_line("b1", 3, "GTACG", 60)]);
        let template = fixture.write_sam("template.sam", &[]);
        let merged = fixture.path("merged.sam");
        let mut settings = fixture.settings(vec![a, b], vec![merged.clone()]);
        settings.header_template = Some(template);

        run(&settings).unwrap();

        let records = read_output(&merged);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, "a1");
        assert_eq!(records[1].0, "b1");
    }
}
