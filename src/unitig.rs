//src/unitig.rs

use std::io::BufRead;

use log::{debug, info};

use crate::aggregator::{Aggregator, UnitigAggregator};
use crate::dictionary::{KmerDictionary, Unitig, UnitigDictionary};
use crate::error::{KmatError, Result};
use crate::matrix::MatrixReader;
use crate::matrix_writer::{MatrixSink, MatrixWriter};
use crate::types::{OutputRow, UnitigOptions, UnitigSummary};

/// Feeds every resolvable row of `reader` into `aggregator`. Rows whose k-mer
/// belongs to no group are skipped.
pub fn aggregate_rows<R, D, A>(
    reader: &mut MatrixReader<R>,
    dict: &D,
    aggregator: &mut A,
) -> Result<(u64, u64)>
where
    R: BufRead,
    D: KmerDictionary,
    A: Aggregator,
{
    let mut seen = 0u64;
    let mut matched = 0u64;
    while let Some((kmer, counts)) = reader.next_counts()? {
        seen += 1;
        if let Some(group) = dict.lookup(kmer) {
            matched += 1;
            aggregator.process(group, counts);
        }
    }
    Ok((seen, matched))
}

/// Final `(abundance, fraction)` vectors of one unitig.
pub fn summarize_unitig<A: Aggregator>(
    aggregator: &A,
    group: usize,
    unitig: &Unitig,
    write_seq: bool,
    with_fractions: bool,
) -> OutputRow {
    let samples = aggregator.sample_count();
    let mut abundances = Vec::with_capacity(samples);
    let mut fractions = Vec::with_capacity(samples);
    for sample in 0..samples {
        let (abundance, fraction) = aggregator.summarize(group, sample, unitig.expected_kmers);
        abundances.push(abundance);
        fractions.push(fraction);
    }

    let identifier = if write_seq {
        unitig.sequence.clone()
    } else {
        unitig.name.clone()
    };
    OutputRow {
        identifier,
        abundances,
        fractions: with_fractions.then_some(fractions),
    }
}

/// `unitig` entry point: aggregates a k-mer matrix into a unitig matrix.
pub fn build_unitig_matrix(opts: &UnitigOptions) -> Result<UnitigSummary> {
    // 1. Inputs.
    if !opts.unitigs.is_file() {
        return Err(KmatError::InvalidArgument(format!(
            "unitig file \"{}\" does not exist",
            opts.unitigs.display()
        )));
    }
    if !opts.matrix.is_file() {
        return Err(KmatError::InvalidArgument(format!(
            "k-mer matrix file \"{}\" does not exist",
            opts.matrix.display()
        )));
    }
    if !(0.0..=1.0).contains(&opts.min_fraction) {
        return Err(KmatError::InvalidArgument(format!(
            "min-frac must be in [0, 1], got {}",
            opts.min_fraction
        )));
    }

    // 2. Dictionary.
    info!("building k-mer dictionary");
    let dict = UnitigDictionary::build(&opts.unitigs, opts.kmer_size, opts.minimizer_size)?;
    debug!("k-mers indexed: {}, unitigs: {}", dict.len(), dict.group_count());

    // 3. Aggregation pass. The first row fixes the sample count.
    info!("aggregating k-mer counts ({})", opts.statistic);
    let mut reader = MatrixReader::open(&opts.matrix)?;
    if !reader.advance()? {
        return Err(KmatError::EmptyInput {
            path: opts.matrix.clone(),
        });
    }
    let k = reader.kmer().len();
    if k != dict.kmer_size() {
        return Err(KmatError::KmerLengthMismatch {
            left: k,
            right: dict.kmer_size(),
        });
    }
    let samples = reader.parse_counts()?.len();
    debug!("samples: {samples}");

    let mut aggregator =
        UnitigAggregator::new(opts.statistic, samples, dict.group_count(), opts.min_fraction);
    let mut summary = UnitigSummary {
        kmers_seen: 1,
        samples,
        unitigs: dict.group_count(),
        ..Default::default()
    };
    if let Some(group) = dict.lookup(reader.kmer()) {
        summary.kmers_matched += 1;
        aggregator.process(group, reader.parse_counts()?);
    }
    let (seen, matched) = aggregate_rows(&mut reader, &dict, &mut aggregator)?;
    summary.kmers_seen += seen;
    summary.kmers_matched += matched;
    debug!(
        "{}/{} k-mers matched a unitig",
        summary.kmers_matched, summary.kmers_seen
    );

    // 4. Finalisation in unitig order.
    info!("writing unitig matrix");
    let mut sink = MatrixSink::create(opts.format, &opts.out_prefix, opts.write_fractions, samples)?;
    for (group, unitig) in dict.unitigs().iter().enumerate() {
        let row = summarize_unitig(&aggregator, group, unitig, opts.write_seq, opts.write_fractions);
        sink.write_row(
            &row.identifier,
            &row.abundances,
            row.fractions.as_deref().unwrap_or(&[]),
        )?;
    }
    sink.finish()?;

    for path in MatrixSink::output_paths(opts.format, &opts.out_prefix, opts.write_fractions) {
        info!("unitig matrix written to \"{}\"", path.display());
    }
    Ok(summary)
}
