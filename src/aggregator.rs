//src/aggregator.rs

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use log::debug;

use crate::error::KmatError;

/// Per-group, per-sample abundance statistic over the k-mers of each group.
pub trait Aggregator {
    /// Accumulates one k-mer's counts into `group`.
    fn process(&mut self, group: usize, counts: &[u32]);

    /// `(abundance, fraction)` of `sample` in `group`, where `expected` is the
    /// number of k-mers the group should contain.
    fn summarize(&self, group: usize, sample: usize, expected: usize) -> (f64, f64);

    fn sample_count(&self) -> usize;
    fn group_count(&self) -> usize;
}

/// Statistic selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Statistic {
    #[default]
    Mean,
    Median,
}

impl FromStr for Statistic {
    type Err = KmatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mean" => Ok(Statistic::Mean),
            "median" => Ok(Statistic::Median),
            other => Err(KmatError::InvalidArgument(format!(
                "unknown statistic \"{other}\" (expected mean or median)"
            ))),
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statistic::Mean => write!(f, "mean"),
            Statistic::Median => write!(f, "median"),
        }
    }
}

/// Shared bounds check; returns `false` (and logs) when the row must be ignored.
fn accepts(group: usize, counts: &[u32], groups: usize, samples: usize) -> bool {
    if group >= groups {
        debug!("got group id {group} but max possible is {}", groups.saturating_sub(1));
        return false;
    }
    if counts.len() != samples {
        debug!("got {} samples, expected {samples}", counts.len());
        return false;
    }
    true
}

/// Running `(presence, sum)` per sample, both saturating at `u32::MAX`.
#[derive(Debug, Clone)]
pub struct MeanAggregator {
    samples: usize,
    groups: usize,
    min_fraction: f64,
    cells: Vec<(u32, u32)>,
}

impl MeanAggregator {
    pub fn new(samples: usize, groups: usize, min_fraction: f64) -> Self {
        Self {
            samples,
            groups,
            min_fraction,
            cells: vec![(0, 0); samples * groups],
        }
    }
}

impl Aggregator for MeanAggregator {
    fn process(&mut self, group: usize, counts: &[u32]) {
        if !accepts(group, counts, self.groups, self.samples) {
            return;
        }
        let row = &mut self.cells[group * self.samples..(group + 1) * self.samples];
        for ((presence, sum), &count) in row.iter_mut().zip(counts) {
            *presence = presence.saturating_add(u32::from(count > 0));
            *sum = sum.saturating_add(count);
        }
    }

    fn summarize(&self, group: usize, sample: usize, expected: usize) -> (f64, f64) {
        if group >= self.groups || sample >= self.samples || expected == 0 {
            return (0.0, 0.0);
        }
        let (presence, sum) = self.cells[group * self.samples + sample];
        let fraction = presence as f64 / expected as f64;
        let abundance = if fraction >= self.min_fraction {
            sum as f64 / expected as f64
        } else {
            0.0
        };
        (abundance, fraction)
    }

    fn sample_count(&self) -> usize {
        self.samples
    }

    fn group_count(&self) -> usize {
        self.groups
    }
}

/// Exact median over a value histogram per sample.
///
/// Zero counts are recorded but only strictly positive values are ranked, while
/// the fraction is still divided by the full expected k-mer count.
#[derive(Debug, Clone)]
pub struct MedianAggregator {
    samples: usize,
    groups: usize,
    min_fraction: f64,
    histograms: Vec<BTreeMap<u32, u32>>,
}

impl MedianAggregator {
    pub fn new(samples: usize, groups: usize, min_fraction: f64) -> Self {
        Self {
            samples,
            groups,
            min_fraction,
            histograms: vec![BTreeMap::new(); samples * groups],
        }
    }
}

impl Aggregator for MedianAggregator {
    fn process(&mut self, group: usize, counts: &[u32]) {
        if !accepts(group, counts, self.groups, self.samples) {
            return;
        }
        let row = &mut self.histograms[group * self.samples..(group + 1) * self.samples];
        for (hist, &count) in row.iter_mut().zip(counts) {
            let seen = hist.entry(count).or_insert(0);
            *seen = seen.saturating_add(1);
        }
    }

    fn summarize(&self, group: usize, sample: usize, expected: usize) -> (f64, f64) {
        if group >= self.groups || sample >= self.samples || expected == 0 {
            return (0.0, 0.0);
        }
        let hist = &self.histograms[group * self.samples + sample];

        // 1. Presence: occurrences of every non-zero value.
        let present: u64 = hist.range(1..).map(|(_, &n)| u64::from(n)).sum();

        // 2. Walk the sorted keys up to the middle rank(s).
        let mut abundance = 0.0;
        if present > 0 {
            let idx1 = (present - 1) / 2;
            let idx2 = present / 2;
            let mut running = 0u64;
            let mut m1: Option<u32> = None;
            let mut m2 = 0u32;
            for (&value, &n) in hist.range(1..) {
                running += u64::from(n);
                if m1.is_none() && running > idx1 {
                    m1 = Some(value);
                }
                if running > idx2 {
                    m2 = value;
                    break;
                }
            }
            abundance = match m1 {
                Some(m1) if idx1 != idx2 => (f64::from(m1) + f64::from(m2)) / 2.0,
                _ => f64::from(m2),
            };
        }

        let fraction = present as f64 / expected as f64;
        if fraction < self.min_fraction {
            abundance = 0.0;
        }
        (abundance, fraction)
    }

    fn sample_count(&self) -> usize {
        self.samples
    }

    fn group_count(&self) -> usize {
        self.groups
    }
}

/// Aggregator chosen once per run from a [`Statistic`].
#[derive(Debug, Clone)]
pub enum UnitigAggregator {
    Mean(MeanAggregator),
    Median(MedianAggregator),
}

impl UnitigAggregator {
    pub fn new(statistic: Statistic, samples: usize, groups: usize, min_fraction: f64) -> Self {
        match statistic {
            Statistic::Mean => {
                UnitigAggregator::Mean(MeanAggregator::new(samples, groups, min_fraction))
            }
            Statistic::Median => {
                UnitigAggregator::Median(MedianAggregator::new(samples, groups, min_fraction))
            }
        }
    }
}

impl Aggregator for UnitigAggregator {
    fn process(&mut self, group: usize, counts: &[u32]) {
        match self {
            UnitigAggregator::Mean(a) => a.process(group, counts),
            UnitigAggregator::Median(a) => a.process(group, counts),
        }
    }

    fn summarize(&self, group: usize, sample: usize, expected: usize) -> (f64, f64) {
        match self {
            UnitigAggregator::Mean(a) => a.summarize(group, sample, expected),
            UnitigAggregator::Median(a) => a.summarize(group, sample, expected),
        }
    }

    fn sample_count(&self) -> usize {
        match self {
            UnitigAggregator::Mean(a) => a.sample_count(),
            UnitigAggregator::Median(a) => a.sample_count(),
        }
    }

    fn group_count(&self) -> usize {
        match self {
            UnitigAggregator::Mean(a) => a.group_count(),
            UnitigAggregator::Median(a) => a.group_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted_median(values: &[u32]) -> f64 {
        let mut v: Vec<u32> = values.iter().copied().filter(|&x| x > 0).collect();
        if v.is_empty() {
            return 0.0;
        }
        v.sort_unstable();
        let n = v.len();
        if n % 2 == 0 {
            (f64::from(v[n / 2 - 1]) + f64::from(v[n / 2])) / 2.0
        } else {
            f64::from(v[n / 2])
        }
    }

    #[test]
    fn test_mean_basic() {
        let mut agg = MeanAggregator::new(2, 1, 0.0);
        agg.process(0, &[2, 0]);
        agg.process(0, &[4, 0]);
        agg.process(0, &[0, 3]);
        let (ab, fr) = agg.summarize(0, 0, 4);
        assert_eq!(ab, 1.5);
        assert_eq!(fr, 0.5);
        let (ab, fr) = agg.summarize(0, 1, 4);
        assert_eq!(ab, 0.75);
        assert_eq!(fr, 0.25);
    }

    #[test]
    fn test_mean_min_fraction_zeroes_abundance_only() {
        let mut agg = MeanAggregator::new(1, 1, 0.5);
        agg.process(0, &[10]);
        agg.process(0, &[0]);
        agg.process(0, &[0]);
        let (ab, fr) = agg.summarize(0, 0, 3);
        assert_eq!(ab, 0.0);
        assert!((fr - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_mean_saturates() {
        let mut agg = MeanAggregator::new(1, 1, 0.0);
        agg.process(0, &[u32::MAX]);
        agg.process(0, &[5]);
        let (ab, _) = agg.summarize(0, 0, 1);
        assert_eq!(ab, u32::MAX as f64);
    }

    #[test]
    fn test_median_skips_zero_counts() {
        let mut agg = MedianAggregator::new(1, 1, 0.0);
        for c in [4, 0, 6, 2, 0] {
            agg.process(0, &[c]);
        }
        let (ab, fr) = agg.summarize(0, 0, 5);
        assert_eq!(ab, 4.0);
        assert_eq!(fr, 0.6);
    }

    #[test]
    fn test_median_even_and_repeated_values() {
        let mut agg = MedianAggregator::new(1, 1, 0.0);
        for c in [1, 3, 3, 9] {
            agg.process(0, &[c]);
        }
        assert_eq!(agg.summarize(0, 0, 4).0, 3.0);

        let mut agg = MedianAggregator::new(1, 1, 0.0);
        for c in [1, 2, 8, 9] {
            agg.process(0, &[c]);
        }
        assert_eq!(agg.summarize(0, 0, 4).0, 5.0);
    }

    #[test]
    fn test_median_min_fraction() {
        let mut agg = MedianAggregator::new(1, 1, 0.75);
        agg.process(0, &[7]);
        agg.process(0, &[0]);
        assert_eq!(agg.summarize(0, 0, 2), (0.0, 0.5));
    }

    #[test]
    fn test_out_of_range_and_bad_rows() {
        for stat in [Statistic::Mean, Statistic::Median] {
            let mut agg = UnitigAggregator::new(stat, 2, 2, 0.0);
            agg.process(5, &[1, 1]);
            agg.process(0, &[1, 1, 1]);
            agg.process(1, &[3, 3]);
            assert_eq!(agg.summarize(0, 0, 1), (0.0, 0.0));
            assert_eq!(agg.summarize(1, 0, 0), (0.0, 0.0));
            assert_eq!(agg.summarize(2, 0, 1), (0.0, 0.0));
            assert_eq!(agg.summarize(1, 2, 1), (0.0, 0.0));
            assert_eq!(agg.summarize(1, 1, 1), (3.0, 1.0));
            assert_eq!(agg.sample_count(), 2);
            assert_eq!(agg.group_count(), 2);
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// Rows of one group: 1 to 4 samples, 1 to 19 k-mers.
        fn group_rows() -> impl Strategy<Value = Vec<Vec<u32>>> {
            (1usize..5).prop_flat_map(|samples| {
                prop::collection::vec(prop::collection::vec(0u32..50, samples), 1..20)
            })
        }

        proptest! {
            #[test]
            fn prop_matches_direct_computation(rows in group_rows()) {
                let samples = rows[0].len();
                let kmers = rows.len();

                let mut mean = MeanAggregator::new(samples, 1, 0.0);
                let mut median = MedianAggregator::new(samples, 1, 0.0);
                for row in &rows {
                    mean.process(0, row);
                    median.process(0, row);
                }

                for s in 0..samples {
                    let column: Vec<u32> = rows.iter().map(|r| r[s]).collect();
                    let present = column.iter().filter(|&&c| c > 0).count() as f64;
                    let sum: f64 = column.iter().map(|&c| f64::from(c)).sum();

                    let (ab, fr) = mean.summarize(0, s, kmers);
                    prop_assert!((ab - sum / kmers as f64).abs() < 1e-9);
                    prop_assert!((fr - present / kmers as f64).abs() < 1e-12);

                    let (ab, fr) = median.summarize(0, s, kmers);
                    prop_assert_eq!(ab, sorted_median(&column));
                    prop_assert!((fr - present / kmers as f64).abs() < 1e-12);
                }
            }

            #[test]
            fn prop_row_order_does_not_matter(rows in group_rows()) {
                let samples = rows[0].len();
                let reversed: Vec<Vec<u32>> = rows.iter().rev().cloned().collect();
                for stat in [Statistic::Mean, Statistic::Median] {
                    let mut fwd = UnitigAggregator::new(stat, samples, 1, 0.0);
                    let mut bwd = UnitigAggregator::new(stat, samples, 1, 0.0);
                    for (a, b) in rows.iter().zip(&reversed) {
                        fwd.process(0, a);
                        bwd.process(0, b);
                    }
                    for s in 0..samples {
                        prop_assert_eq!(fwd.summarize(0, s, rows.len()), bwd.summarize(0, s, rows.len()));
                    }
                }
            }
        }
    }
}
