// src/lib.rs
pub mod aggregator;
pub mod dictionary;
pub mod error;
pub mod fasta;
pub mod filter;
pub mod join;
pub mod matrix;
pub mod matrix_writer;
pub mod nucleotide;
pub mod types;
pub mod unitig;

use std::path::Path;

pub use crate::aggregator::{Aggregator, MeanAggregator, MedianAggregator, Statistic, UnitigAggregator};
pub use crate::dictionary::{KmerDictionary, UnitigDictionary};
pub use crate::error::{KmatError, Result};
pub use crate::filter::{filter_matrix, filter_partitions, run_filter, FilterPolicy};
pub use crate::matrix::{LineSink, MatrixReader};
pub use crate::matrix_writer::{MatrixSink, MatrixWriter, OutputFormat};
pub use crate::nucleotide::NucleotideOrder;
pub use crate::types::{FilterOptions, FilterStats, JoinStats, OutputRow, Threshold, UnitigOptions, UnitigSummary};
pub use crate::unitig::build_unitig_matrix;

/// Which two-matrix join to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Diff,
    Merge,
    Select,
}

/// Joins two matrix files and writes the result to `output`, or stdout.
pub fn join_files(
    kind: JoinKind,
    left: &Path,
    right: &Path,
    output: Option<&Path>,
    order: NucleotideOrder,
) -> Result<JoinStats> {
    // 1. Open both inputs before creating the output
    let mut left = MatrixReader::open(left)?;
    let mut right = MatrixReader::open(right)?;
    let mut out = LineSink::create(output)?;

    // 2. Run the join
    let stats = match kind {
        JoinKind::Diff => join::diff(&mut left, &mut right, order, &mut out)?,
        JoinKind::Merge => join::merge(&mut left, &mut right, order, &mut out)?,
        JoinKind::Select => join::select(&mut left, &mut right, order, &mut out)?,
    };
    out.finish()?;
    Ok(stats)
}

/// Reverse-complements (or canonicalises) the keys of a matrix file.
pub fn reverse_file(
    input: &Path,
    output: Option<&Path>,
    order: NucleotideOrder,
    canonicalize: bool,
) -> Result<JoinStats> {
    let mut reader = MatrixReader::open(input)?;
    let mut out = LineSink::create(output)?;
    let stats = join::reverse(&mut reader, order, canonicalize, &mut out)?;
    out.finish()?;
    Ok(stats)
}

/// Writes the k-mers of a matrix file as FASTA records.
pub fn fasta_file(input: &Path, output: Option<&Path>) -> Result<usize> {
    let mut reader = MatrixReader::open(input)?;
    let mut out = LineSink::create(output)?;
    let n = fasta::matrix_to_fasta(&mut reader, &mut out)?;
    out.finish()?;
    Ok(n)
}

/// Length-filters a FASTA file and rewrites each record on single lines.
pub fn fafmt_file(input: &Path, min_length: usize, output: Option<&Path>) -> Result<(usize, usize)> {
    if !input.exists() {
        return Err(KmatError::InvalidArgument(format!(
            "input file {} does not exist",
            input.display()
        )));
    }
    let mut out = LineSink::create(output)?;
    let counts = fasta::format_fasta(input, min_length, &mut out)?;
    out.finish()?;
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_join_files_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        let out = dir.path().join("out.txt");
        fs::write(&a, "AAA 1\nAAC 2\n").unwrap();
        fs::write(&b, "AAC 7\n").unwrap();

        let stats = join_files(JoinKind::Diff, &a, &b, Some(&out), NucleotideOrder::Lexicographic)
            .unwrap();
        assert_eq!(stats.emitted, 1);
        assert_eq!(fs::read_to_string(&out).unwrap(), "AAA 1\n");

        join_files(JoinKind::Select, &b, &a, Some(&out), NucleotideOrder::Lexicographic).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "AAC 2\n");
    }

    #[test]
    fn test_missing_input_does_not_create_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let err = join_files(
            JoinKind::Merge,
            &dir.path().join("missing.txt"),
            &dir.path().join("missing2.txt"),
            Some(&out),
            NucleotideOrder::Lexicographic,
        )
        .unwrap_err();
        assert!(matches!(err, KmatError::IoOpenFailure { .. }));
        assert!(!out.exists());
    }

    #[test]
    fn test_fafmt_missing_input() {
        assert!(matches!(
            fafmt_file(Path::new("/nonexistent.fa"), 0, None),
            Err(KmatError::InvalidArgument(_))
        ));
    }
}
