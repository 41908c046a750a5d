//src/types.rs

use std::ops::AddAssign;
use std::path::PathBuf;

use crate::aggregator::Statistic;
use crate::matrix_writer::OutputFormat;

/// Minimum number of samples on one side of the presence/absence split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Threshold {
    /// Share of the row's samples, in `[0, 1]`.
    Fraction(f64),
    /// Absolute number of samples.
    Count(u32),
}

impl Threshold {
    pub fn is_zero(&self) -> bool {
        match *self {
            Threshold::Fraction(f) => f == 0.0,
            Threshold::Count(n) => n == 0,
        }
    }

    /// `true` if `hits` samples out of `nb_samples` meet this threshold.
    pub fn is_met(&self, hits: usize, nb_samples: usize) -> bool {
        match *self {
            Threshold::Fraction(f) => hits as f64 >= f * nb_samples as f64,
            Threshold::Count(n) => hits >= n as usize,
        }
    }
}

/// How one row was classified by a [`crate::filter::FilterPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowVerdict {
    pub nb_present: usize,
    pub nb_absent: usize,
    pub enough_present: bool,
    pub enough_absent: bool,
}

impl RowVerdict {
    pub fn retained(&self) -> bool {
        self.enough_present && self.enough_absent
    }
}

/// One aggregated unitig, ready for a [`crate::matrix_writer::MatrixWriter`].
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRow {
    pub identifier: String,
    pub abundances: Vec<f64>,
    pub fractions: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinStats {
    /// Input rows that took part in the join.
    pub considered: u64,
    pub emitted: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub rows: u64,
    pub retained: u64,
}

impl AddAssign for FilterStats {
    fn add_assign(&mut self, other: Self) {
        self.rows += other.rows;
        self.retained += other.retained;
    }
}

impl std::iter::Sum for FilterStats {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(FilterStats::default(), |mut acc, s| {
            acc += s;
            acc
        })
    }
}

/// Options of the `filter` command.
#[derive(Debug, Clone)]
pub struct FilterOptions {
    /// A matrix file, or a directory holding a `matrices/` subdirectory.
    pub input: PathBuf,
    /// `None` writes to stdout.
    pub output: Option<PathBuf>,
    pub min_abundance: u32,
    pub min_frac_absent: f64,
    pub min_nb_absent: Option<u32>,
    pub min_frac_present: f64,
    pub min_nb_present: Option<u32>,
    pub threads: usize,
    pub keep_tmp: bool,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output: None,
            min_abundance: 1,
            min_frac_absent: 0.1,
            min_nb_absent: None,
            min_frac_present: 0.1,
            min_nb_present: None,
            threads: 4,
            keep_tmp: false,
        }
    }
}

/// Options of the `unitig` command.
#[derive(Debug, Clone)]
pub struct UnitigOptions {
    pub unitigs: PathBuf,
    pub matrix: PathBuf,
    pub kmer_size: usize,
    pub minimizer_size: usize,
    pub out_prefix: PathBuf,
    pub min_fraction: f64,
    pub write_fractions: bool,
    pub write_seq: bool,
    pub statistic: Statistic,
    pub format: OutputFormat,
}

impl Default for UnitigOptions {
    fn default() -> Self {
        Self {
            unitigs: PathBuf::new(),
            matrix: PathBuf::new(),
            kmer_size: 31,
            minimizer_size: 15,
            out_prefix: PathBuf::from("out"),
            min_fraction: 0.0,
            write_fractions: false,
            write_seq: false,
            statistic: Statistic::Mean,
            format: OutputFormat::Text,
        }
    }
}

/// Counters reported by a unitig aggregation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitigSummary {
    pub kmers_seen: u64,
    pub kmers_matched: u64,
    pub unitigs: usize,
    pub samples: usize,
}
