//src/filter.rs

use std::fs::{self, File};
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::error::{KmatError, Result};
use crate::matrix::{has_gz_extension, LineSink, MatrixReader};
use crate::types::{FilterOptions, FilterStats, RowVerdict, Threshold};

const PARTITIONS_DIR: &str = "matrices";
const FILTERED_DIR: &str = "matrices_filtered";

/// Presence/absence predicate applied to one row of counts.
///
/// A sample is *present* when its count is at least `min_abundance`, *absent*
/// otherwise. A row is kept when both sides reach their threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterPolicy {
    pub min_abundance: u32,
    pub absent: Threshold,
    pub present: Threshold,
}

impl FilterPolicy {
    pub fn new(min_abundance: u32, absent: Threshold, present: Threshold) -> Self {
        Self {
            min_abundance,
            absent,
            present,
        }
    }

    /// Builds a policy from command-line style options. A sample count, when
    /// given, replaces the matching fraction.
    pub fn from_options(
        min_abundance: u32,
        min_frac_absent: f64,
        min_nb_absent: Option<u32>,
        min_frac_present: f64,
        min_nb_present: Option<u32>,
    ) -> Result<Self> {
        for (name, value) in [
            ("min-frac-absent", min_frac_absent),
            ("min-frac-present", min_frac_present),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(KmatError::InvalidArgument(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
        }

        let absent = match min_nb_absent {
            Some(n) => Threshold::Count(n),
            None => Threshold::Fraction(min_frac_absent),
        };
        let present = match min_nb_present {
            Some(n) => Threshold::Count(n),
            None => Threshold::Fraction(min_frac_present),
        };
        Ok(Self::new(min_abundance, absent, present))
    }

    /// `true` when no row can ever be dropped.
    pub fn is_noop(&self) -> bool {
        self.absent.is_zero() && self.present.is_zero()
    }

    pub fn evaluate(&self, counts: &[u32], nb_samples: usize) -> RowVerdict {
        let nb_present = counts.iter().filter(|&&c| c >= self.min_abundance).count();
        let nb_absent = counts.len() - nb_present;
        RowVerdict {
            nb_present,
            nb_absent,
            enough_present: self.present.is_met(nb_present, nb_samples),
            enough_absent: self.absent.is_met(nb_absent, nb_samples),
        }
    }

    pub fn retains(&self, counts: &[u32], nb_samples: usize) -> bool {
        self.is_noop() || self.evaluate(counts, nb_samples).retained()
    }
}

impl TryFrom<&FilterOptions> for FilterPolicy {
    type Error = KmatError;

    fn try_from(opts: &FilterOptions) -> Result<Self> {
        FilterPolicy::from_options(
            opts.min_abundance,
            opts.min_frac_absent,
            opts.min_nb_absent,
            opts.min_frac_present,
            opts.min_nb_present,
        )
    }
}

/// Copies the rows of `reader` kept by `policy` to `out`, verbatim.
pub fn filter_matrix<R: BufRead, W: Write>(
    reader: &mut MatrixReader<R>,
    policy: &FilterPolicy,
    out: &mut LineSink<W>,
) -> Result<FilterStats> {
    let mut stats = FilterStats::default();
    loop {
        let keep = match reader.next_counts()? {
            Some((_, counts)) => policy.retains(counts, counts.len()),
            None => break,
        };
        stats.rows += 1;
        if keep {
            stats.retained += 1;
            out.write_line(reader.line())?;
        }
    }

    debug!(
        "{}: {} samples, {}/{} k-mers retained",
        reader.path().display(),
        reader.nb_samples().unwrap_or(0),
        stats.retained,
        stats.rows
    );
    Ok(stats)
}

/// Every regular file under `dir`, sorted by file name.
fn list_partitions(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| KmatError::open(dir, e))?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Filtered copy of `partition`: same file name, so distinct partitions never
/// share an output.
fn filtered_name(partition: &Path, filtered_dir: &Path) -> PathBuf {
    filtered_dir.join(partition.file_name().unwrap_or_default())
}

/// Filters one partition. A `.gz` output is written gzip-compressed so the
/// concatenation pass can open it like any other partition.
fn filter_partition(input: &Path, output: &Path, policy: &FilterPolicy) -> Result<FilterStats> {
    let mut reader = MatrixReader::open(input)?;
    let f = BufWriter::new(File::create(output).map_err(|e| KmatError::open(output, e))?);

    if has_gz_extension(output) {
        let mut sink = LineSink::new(GzEncoder::new(f, Compression::fast()), output);
        let stats = filter_matrix(&mut reader, policy, &mut sink)?;
        sink.finish()?
            .finish()
            .and_then(|mut w| w.flush())
            .map_err(|e| KmatError::write(output, e))?;
        Ok(stats)
    } else {
        let mut sink = LineSink::new(f, output);
        let stats = filter_matrix(&mut reader, policy, &mut sink)?;
        sink.finish()?;
        Ok(stats)
    }
}

/// Appends `partitions`, in order, to `out`. Rows still go through the reader.
fn concatenate<W: Write>(partitions: &[PathBuf], out: &mut LineSink<W>) -> Result<u64> {
    let mut rows = 0u64;
    for path in partitions {
        let mut reader = MatrixReader::open(path)?;
        while reader.advance()? {
            out.write_line(reader.line())?;
            rows += 1;
        }
    }
    Ok(rows)
}

/// Filters every partition of `<input>/matrices/` in parallel, then concatenates
/// the results in file-name order into the output.
pub fn filter_partitions(opts: &FilterOptions) -> Result<FilterStats> {
    let policy = FilterPolicy::try_from(opts)?;
    if opts.threads == 0 {
        return Err(KmatError::InvalidArgument(
            "threads must be at least 1".to_string(),
        ));
    }

    let partitions_dir = opts.input.join(PARTITIONS_DIR);
    let partitions = list_partitions(&partitions_dir)?;
    if partitions.is_empty() {
        return Err(KmatError::EmptyInput {
            path: partitions_dir,
        });
    }
    info!(
        "filtering partitioned matrix: {} ({} partitions)",
        opts.input.display(),
        partitions.len()
    );

    let mut out = LineSink::create(opts.output.as_deref())?;

    // 1. Nothing to drop: stream the partitions straight through.
    if policy.is_noop() {
        info!("No filtering needed - concatenating partitions");
        let rows = concatenate(&partitions, &mut out)?;
        out.finish()?;
        info!("{rows}/{rows} k-mers retained (no filtering)");
        return Ok(FilterStats {
            rows,
            retained: rows,
        });
    }

    // 2. One task per partition on a bounded pool.
    let filtered_dir = opts.input.join(FILTERED_DIR);
    fs::create_dir_all(&filtered_dir).map_err(|e| KmatError::open(&filtered_dir, e))?;
    let tasks: Vec<(PathBuf, PathBuf)> = partitions
        .iter()
        .map(|p| (p.clone(), filtered_name(p, &filtered_dir)))
        .collect();

    let nb_threads = opts.threads.min(tasks.len());
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(nb_threads)
        .build()?;
    debug!("filter pool: {nb_threads} worker(s)");

    let per_task: Result<Vec<FilterStats>> = pool.install(|| {
        tasks
            .par_iter()
            .map(|(input, output)| filter_partition(input, output, &policy))
            .collect()
    });

    // 3. Sum after the join, then concatenate.
    let outcome = per_task.and_then(|per_task| {
        let stats: FilterStats = per_task.into_iter().sum();
        let filtered: Vec<PathBuf> = tasks.into_iter().map(|(_, o)| o).collect();
        concatenate(&filtered, &mut out)?;
        out.finish()?;
        Ok(stats)
    });

    if !opts.keep_tmp {
        if let Err(e) = fs::remove_dir_all(&filtered_dir) {
            warn!("cannot remove {}: {e}", filtered_dir.display());
        }
    }

    let stats = outcome?;
    info!("{}/{} k-mers retained", stats.retained, stats.rows);
    Ok(stats)
}

/// `filter` entry point: a single matrix file, or a partitioned matrix directory.
pub fn run_filter(opts: &FilterOptions) -> Result<FilterStats> {
    let input = &opts.input;
    if input.is_file() {
        info!("filtering text matrix: {}", input.display());
        let policy = FilterPolicy::try_from(opts)?;
        let mut reader = MatrixReader::open(input)?;
        let mut out = LineSink::create(opts.output.as_deref())?;
        let stats = filter_matrix(&mut reader, &policy, &mut out)?;
        out.finish()?;
        info!("{} samples", reader.nb_samples().unwrap_or(0));
        info!("{}/{} k-mers retained", stats.retained, stats.rows);
        return Ok(stats);
    }

    if input.join(PARTITIONS_DIR).is_dir() {
        return filter_partitions(opts);
    }

    Err(KmatError::InvalidArgument(format!(
        "{} is neither a matrix file nor a partitioned matrix directory",
        input.display()
    )))
}
