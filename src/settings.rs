use crate::error::RemaError;
use clap::Parser;
use log::LevelFilter;

#[derive(Parser, Clone, Debug)]
#[command(author, version, about = "rema: graph-guided micro re-alignment of short reads", long_about = None)]
pub struct Cli {
    /// Input SAM/BAM. Repeatable. BAM inputs must be indexed (.bai) when a
    /// range is given; SAM inputs stream sequentially and reject ranges.
    #[arg(short = 'i', long = "input", value_name = "FILE", required = true)]
    inputs: Vec<String>,

    /// Output SAM/BAM. One per input, or a single merged output.
    #[arg(short = 'o', long = "output", value_name = "FILE", required = true)]
    outputs: Vec<String>,

    /// Reference FASTA file, indexed with a .fai.
    #[arg(short = 'r', long = "reference", value_name = "FILE")]
    reference: String,

    /// Alignment offset: how far a re-alignment may move, and how much
    /// flanking context ranges gain on the input side.
    #[arg(short = 'O', long = "offset", default_value_t = 20)]
    offset: u32,

    /// Minimum mapping quality.
    #[arg(short = 'm', long = "min-mapq", default_value_t = 0)]
    min_mapq: u8,

    /// Minimum allele probability conditioned on coverage.
    #[arg(short = 'p', long = "min-allele-prob", default_value_t = 0.1)]
    min_allele_prob: f64,

    /// Minimum haploid coverage for the consensus.
    #[arg(short = 'c', long = "min-allele-coverage", default_value_t = 3)]
    min_allele_coverage: u32,

    /// Maximum total coverage over a reference base.
    #[arg(short = 't', long = "max-total-coverage", default_value_t = 100)]
    max_total_coverage: u32,

    /// A genomic range to consider: name[:begin[-end]], 1-based inclusive.
    #[arg(short = 'R', long = "range", value_name = "STRING")]
    range: Option<String>,

    /// File of genomic ranges to consider, one per line.
    #[arg(short = 'Z', long = "ranges", value_name = "FILE")]
    ranges_file: Option<String>,

    /// Correct aligned bases (0 or 1).
    #[arg(short = 'C', long = "correct-bases", default_value_t = 0)]
    correct_bases: u8,

    /// Use sequence qualities to weight alignments (0 or 1).
    #[arg(short = 'q', long = "use-qualities", default_value_t = 1)]
    use_qualities: u8,

    /// Maximum heap size for the alignment search.
    #[arg(short = 'H', long = "max-heap-size", default_value_t = 8192)]
    max_heap_size: usize,

    /// Maximum queue size between pipeline stages.
    #[arg(short = 'Q', long = "max-queue-size", default_value_t = 65536)]
    max_queue_size: usize,

    /// Number of worker threads.
    #[arg(short = 'n', long = "num-threads", default_value_t = 1)]
    num_threads: usize,

    /// Header template for the output when merging multiple inputs into a
    /// single file.
    #[arg(short = 'b', long = "header", value_name = "FILE")]
    header_template: Option<String>,

    #[arg(long = "log-level", default_value = "info")]
    pub log_level: LevelFilter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub reference: String,
    pub offset: u32,
    pub min_mapq: u8,
    pub min_allele_prob: f64,
    pub min_allele_coverage: u32,
    pub max_total_coverage: u32,
    pub range: Option<String>,
    pub ranges_file: Option<String>,
    pub correct_bases: bool,
    pub use_qualities: bool,
    pub max_heap_size: usize,
    pub max_queue_size: usize,
    pub num_threads: usize,
    pub header_template: Option<String>,
}

impl Settings {
    pub fn new(cli: Cli) -> Result<Self, RemaError> {
        if cli.inputs.is_empty() {
            return Err(RemaError::CliError("no inputs (-i)".to_string()));
        }
        if cli.outputs.is_empty() {
            return Err(RemaError::CliError("no outputs (-o)".to_string()));
        }
        if cli.outputs.len() != cli.inputs.len() && cli.outputs.len() != 1 {
            return Err(RemaError::CliError(
                "the same number of inputs and outputs must be specified, or only one output"
                    .to_string(),
            ));
        }
        if cli.inputs.len() > 1 && cli.outputs.len() == 1 && cli.header_template.is_none() {
            return Err(RemaError::CliError(
                "multiple inputs and a single output requires the -b option".to_string(),
            ));
        }
        if cli.range.is_some() && cli.ranges_file.is_some() {
            return Err(RemaError::CliError(
                "-R and -Z were both specified".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&cli.min_allele_prob) || cli.min_allele_prob == 0.0 {
            return Err(RemaError::CliError(
                "minimum allele probability must be in (0, 1]".to_string(),
            ));
        }
        if cli.num_threads == 0 {
            return Err(RemaError::CliError(
                "at least one thread is required".to_string(),
            ));
        }

        let correct_bases = match cli.correct_bases {
            0 => false,
            1 => true,
            _ => {
                return Err(RemaError::CliError(
                    "correct bases (-C) must be 0 or 1".to_string(),
                ))
            }
        };
        let use_qualities = match cli.use_qualities {
            0 => false,
            1 => true,
            _ => {
                return Err(RemaError::CliError(
                    "use qualities (-q) must be 0 or 1".to_string(),
                ))
            }
        };

        Ok(Self {
            inputs: cli.inputs,
            outputs: cli.outputs,
            reference: cli.reference,
            offset: cli.offset,
            min_mapq: cli.min_mapq,
            min_allele_prob: cli.min_allele_prob,
            min_allele_coverage: cli.min_allele_coverage,
            max_total_coverage: cli.max_total_coverage,
            range: cli.range,
            ranges_file: cli.ranges_file,
            correct_bases,
            use_qualities,
            max_heap_size: cli.max_heap_size,
            max_queue_size: cli.max_queue_size,
            num_threads: cli.num_threads,
            header_template: cli.header_template,
        })
    }

    /// Whether explicit ranges were requested.
    pub fn use_ranges(&self) -> bool {
        self.range.is_some() || self.ranges_file.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parse(command: &str) -> Result<Settings, RemaError> {
        let words = shlex::split(command).unwrap();
        let cli = Cli::try_parse_from(words)
            .map_err(|e| RemaError::CliError(e.to_string()))?;
        Settings::new(cli)
    }

    #[test]
    fn test_minimal() {
        let settings = parse("rema -i in.bam -o out.bam -r ref.fa").unwrap();
        assert_eq!(settings.inputs, vec!["in.bam"]);
        assert_eq!(settings.outputs, vec!["out.bam"]);
        assert_eq!(settings.offset, 20);
        assert_eq!(settings.min_mapq, 0);
        assert_eq!(settings.min_allele_prob, 0.1);
        assert_eq!(settings.min_allele_coverage, 3);
        assert_eq!(settings.max_total_coverage, 100);
        assert!(!settings.correct_bases);
        assert!(settings.use_qualities);
        assert_eq!(settings.max_heap_size, 8192);
        assert_eq!(settings.max_queue_size, 65536);
        assert_eq!(settings.num_threads, 1);
        assert!(!settings.use_ranges());
    }

    #[test]
    fn test_multiple_inputs_and_outputs() {
        let settings =
            parse("rema -i a.bam -i b.bam -o a.out.bam -o b.out.bam -r ref.fa").unwrap();
        assert_eq!(settings.inputs.len(), 2);
        assert_eq!(settings.outputs.len(), 2);
    }

    #[test]
    fn test_merged_output_requires_header_template() {
        assert!(parse("rema -i a.bam -i b.bam -o merged.bam -r ref.fa").is_err());
        let settings =
            parse("rema -i a.bam -i b.bam -o merged.bam -r ref.fa -b header.sam").unwrap();
        assert_eq!(settings.header_template.as_deref(), Some("header.sam"));
    }

    #[rstest]
    #[case("rema -i a.bam -o 1.bam -o 2.bam -o 3.bam -r ref.fa")]
    #[case("rema -i a.bam -o out.bam -r ref.fa -R chr1:1-100 -Z ranges.txt")]
    #[case("rema -i a.bam -o out.bam -r ref.fa -C 2")]
    #[case("rema -i a.bam -o out.bam -r ref.fa -q 5")]
    #[case("rema -i a.bam -o out.bam -r ref.fa -p 0.0")]
    #[case("rema -i a.bam -o out.bam -r ref.fa -p 1.5")]
    #[case("rema -i a.bam -o out.bam -r ref.fa -n 0")]
    fn test_rejected(#[case] command: &str) {
        assert!(parse(command).is_err());
    }

    #[test]
    fn test_range_and_flags() {
        let settings = parse(
            "rema -i in.bam -o out.sam -r ref.fa -R chr2:100-200 -O 10 -m 20 -C 1 -q 0 -H 64 -Q 128 -n 4",
        )
        .unwrap();
        assert_eq!(settings.range.as_deref(), Some("chr2:100-200"));
        assert!(settings.use_ranges());
        assert_eq!(settings.offset, 10);
        assert_eq!(settings.min_mapq, 20);
        assert!(settings.correct_bases);
        assert!(!settings.use_qualities);
        assert_eq!(settings.max_heap_size, 64);
        assert_eq!(settings.max_queue_size, 128);
        assert_eq!(settings.num_threads, 4);
    }
}
