//src/fasta.rs

use std::io::{BufRead, Write};
use std::path::Path;

use log::info;
use seq_io::fasta::{Reader, Record};

use crate::error::{KmatError, Result};
use crate::matrix::{open_input, LineSink, MatrixReader};

/// Writes every k-mer of the matrix as its own FASTA record, named `1`, `2`, ...
pub fn matrix_to_fasta<R: BufRead, W: Write>(
    reader: &mut MatrixReader<R>,
    out: &mut LineSink<W>,
) -> Result<usize> {
    let mut nb_kmers = 0usize;
    while reader.advance()? {
        nb_kmers += 1;
        out.write_line(&format!(">{nb_kmers}"))?;
        out.write_line(reader.kmer())?;
    }
    info!("{nb_kmers} k-mers processed");
    Ok(nb_kmers)
}

/// Rewrites a FASTA file with one sequence line per record, dropping records
/// shorter than `min_length`. Returns `(total, retained)`.
pub fn format_fasta<P: AsRef<Path>, W: Write>(
    path: P,
    min_length: usize,
    out: &mut LineSink<W>,
) -> Result<(usize, usize)> {
    let path = path.as_ref();
    let to_error = |e: &dyn std::fmt::Display| KmatError::Fasta {
        path: path.to_path_buf(),
        msg: e.to_string(),
    };

    let mut reader = Reader::new(open_input(path)?);
    let mut total = 0usize;
    let mut retained = 0usize;

    while let Some(result) = reader.next() {
        let record = result.map_err(|e| to_error(&e))?;
        total += 1;

        let seq = record.full_seq();
        if seq.len() < min_length {
            continue;
        }

        let mut header = String::from(">");
        header.push_str(record.id().map_err(|e| to_error(&e))?);
        if let Some(desc) = record.desc() {
            let desc = desc.map_err(|e| to_error(&e))?;
            if !desc.is_empty() {
                header.push(' ');
                header.push_str(desc);
            }
        }
        out.write_line(&header)?;
        out.write_all(&seq)?;
        out.write_all(b"\n")?;
        retained += 1;
    }

    info!("{retained}/{total} sequences retained");
    Ok((total, retained))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::tests::{output, reader, sink};
    use std::fs;

    #[test]
    fn test_matrix_to_fasta() {
        let mut s = sink();
        let n = matrix_to_fasta(&mut reader("AAC 1 2\n\nacg 0 1\n"), &mut s).unwrap();
        assert_eq!(n, 2);
        assert_eq!(output(s), ">1\nAAC\n>2\nACG\n");
    }

    #[test]
    fn test_format_fasta() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.fa");
        fs::write(
            &path,
            ">utg1 LN:i:8 KC:i:12\nACGT\nACGT\n>utg2\nAC\n>utg3\nGGGGG\n",
        )
        .unwrap();

        let mut s = sink();
        let (total, retained) = format_fasta(&path, 5, &mut s).unwrap();
        assert_eq!((total, retained), (3, 2));
        assert_eq!(output(s), ">utg1 LN:i:8 KC:i:12\nACGTACGT\n>utg3\nGGGGG\n");
    }

    #[test]
    fn test_format_fasta_missing_file() {
        let mut s = sink();
        assert!(matches!(
            format_fasta("/nonexistent/in.fa", 0, &mut s),
            Err(KmatError::IoOpenFailure { .. })
        ));
    }
}
