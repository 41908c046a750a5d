//src/join.rs
//
// Sorted merge-joins over two matrix streams, plus the key-order transform used
// to canonicalise a single stream. Both inputs must be sorted under the same
// `NucleotideOrder`; nothing here checks it.

use std::cmp::Ordering;
use std::io::{BufRead, Write};

use log::info;

use crate::error::{KmatError, Result};
use crate::matrix::{LineSink, MatrixReader};
use crate::nucleotide::{
    compare, count_fields, is_canonical, reverse_complement_in_place, NucleotideOrder,
};
use crate::types::JoinStats;

fn check_kmer_sizes<R1: BufRead, R2: BufRead>(
    left: &MatrixReader<R1>,
    right: &MatrixReader<R2>,
) -> Result<()> {
    if left.has_row() && right.has_row() && left.kmer().len() != right.kmer().len() {
        return Err(KmatError::KmerLengthMismatch {
            left: left.kmer().len(),
            right: right.kmer().len(),
        });
    }
    Ok(())
}

/// Fails if the current row of `reader` does not hold `expected` fields.
fn check_width<R: BufRead>(reader: &MatrixReader<R>, expected: usize) -> Result<()> {
    let found = count_fields(reader.tail());
    if found != expected {
        return Err(KmatError::SampleCountMismatch {
            path: reader.path().to_path_buf(),
            line_no: reader.line_no(),
            expected,
            found,
        });
    }
    Ok(())
}

/// `"0 0 ... 0"` with `n` zeros, or an empty string.
fn zero_padding(n: usize) -> String {
    vec!["0"; n].join(" ")
}

/// Rows of `left` whose k-mer is absent from `right`, with their tails.
pub fn diff<R1, R2, W>(
    left: &mut MatrixReader<R1>,
    right: &mut MatrixReader<R2>,
    order: NucleotideOrder,
    out: &mut LineSink<W>,
) -> Result<JoinStats>
where
    R1: BufRead,
    R2: BufRead,
    W: Write,
{
    let mut stats = JoinStats::default();
    left.advance()?;
    right.advance()?;
    check_kmer_sizes(left, right)?;

    while left.has_row() && right.has_row() {
        match compare(left.kmer(), right.kmer(), order) {
            Ordering::Equal => {
                stats.considered += 1;
                left.advance()?;
                right.advance()?;
            }
            Ordering::Less => {
                stats.considered += 1;
                stats.emitted += 1;
                out.write_fields(left.kmer(), &[left.tail()])?;
                left.advance()?;
            }
            Ordering::Greater => {
                right.advance()?;
            }
        }
    }
    while left.has_row() {
        stats.considered += 1;
        stats.emitted += 1;
        out.write_fields(left.kmer(), &[left.tail()])?;
        left.advance()?;
    }

    info!("{}/{} k-mers retained", stats.emitted, stats.considered);
    Ok(stats)
}

/// Full outer join. A k-mer missing from one side gets that side's width of zeros.
///
/// Each side's width is fixed by its first row; a later row of another width is
/// a `SampleCountMismatch`.
pub fn merge<R1, R2, W>(
    left: &mut MatrixReader<R1>,
    right: &mut MatrixReader<R2>,
    order: NucleotideOrder,
    out: &mut LineSink<W>,
) -> Result<JoinStats>
where
    R1: BufRead,
    R2: BufRead,
    W: Write,
{
    let mut stats = JoinStats::default();
    left.advance()?;
    right.advance()?;
    check_kmer_sizes(left, right)?;

    // 1. Widths come from the first row of each side.
    let nb_left = if left.has_row() { count_fields(left.tail()) } else { 0 };
    let nb_right = if right.has_row() { count_fields(right.tail()) } else { 0 };
    info!("samples in 1st matrix: {nb_left}");
    info!("samples in 2nd matrix: {nb_right}");
    let pad_left = zero_padding(nb_left);
    let pad_right = zero_padding(nb_right);

    // 2. Interleave.
    while left.has_row() && right.has_row() {
        stats.emitted += 1;
        match compare(left.kmer(), right.kmer(), order) {
            Ordering::Equal => {
                stats.considered += 2;
                check_width(left, nb_left)?;
                check_width(right, nb_right)?;
                out.write_fields(left.kmer(), &[left.tail(), right.tail()])?;
                left.advance()?;
                right.advance()?;
            }
            Ordering::Less => {
                stats.considered += 1;
                check_width(left, nb_left)?;
                out.write_fields(left.kmer(), &[left.tail(), &pad_right])?;
                left.advance()?;
            }
            Ordering::Greater => {
                stats.considered += 1;
                check_width(right, nb_right)?;
                out.write_fields(right.kmer(), &[&pad_left, right.tail()])?;
                right.advance()?;
            }
        }
    }

    // 3. Drain whichever side is left.
    while left.has_row() {
        stats.considered += 1;
        stats.emitted += 1;
        check_width(left, nb_left)?;
        out.write_fields(left.kmer(), &[left.tail(), &pad_right])?;
        left.advance()?;
    }
    while right.has_row() {
        stats.considered += 1;
        stats.emitted += 1;
        check_width(right, nb_right)?;
        out.write_fields(right.kmer(), &[&pad_left, right.tail()])?;
        right.advance()?;
    }

    info!("{} k-mers in merged matrix", stats.emitted);
    Ok(stats)
}

/// Semi-join: rows of `right` whose k-mer also appears in `left`. Only the keys
/// of `left` are read, and reading stops once `right` is exhausted.
pub fn select<R1, R2, W>(
    left: &mut MatrixReader<R1>,
    right: &mut MatrixReader<R2>,
    order: NucleotideOrder,
    out: &mut LineSink<W>,
) -> Result<JoinStats>
where
    R1: BufRead,
    R2: BufRead,
    W: Write,
{
    let mut stats = JoinStats::default();
    left.advance()?;
    right.advance()?;
    check_kmer_sizes(left, right)?;

    while left.has_row() && right.has_row() {
        match compare(left.kmer(), right.kmer(), order) {
            Ordering::Equal => {
                stats.considered += 1;
                stats.emitted += 1;
                out.write_fields(right.kmer(), &[right.tail()])?;
                left.advance()?;
                right.advance()?;
            }
            Ordering::Less => {
                stats.considered += 1;
                left.advance()?;
            }
            Ordering::Greater => {
                right.advance()?;
            }
        }
    }

    info!("retained k-mers: {}", stats.emitted);
    Ok(stats)
}

/// Reverse-complements every key or, with `canonicalize`, only the keys that are
/// not canonical under `order`. The output is generally no longer sorted.
pub fn reverse<R, W>(
    input: &mut MatrixReader<R>,
    order: NucleotideOrder,
    canonicalize: bool,
    out: &mut LineSink<W>,
) -> Result<JoinStats>
where
    R: BufRead,
    W: Write,
{
    let mut stats = JoinStats::default();
    let mut key: Vec<u8> = Vec::new();
    let mut flipped = 0u64;

    while input.advance()? {
        stats.considered += 1;
        key.clear();
        key.extend_from_slice(input.kmer().as_bytes());
        if !canonicalize || !is_canonical(&key, order) {
            reverse_complement_in_place(&mut key);
            flipped += 1;
        }
        // The reader only accepts ACGT, so the flipped key is still ASCII.
        let kmer = std::str::from_utf8(&key).map_err(|e| {
            KmatError::InvalidArgument(format!("non-ASCII k-mer after reverse: {e}"))
        })?;
        out.write_fields(kmer, &[input.tail()])?;
        stats.emitted += 1;
    }

    info!("{} k-mers written, {} reverse-complemented", stats.emitted, flipped);
    Ok(stats)
}
