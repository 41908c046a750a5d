//src/dictionary.rs

use std::path::{Path, PathBuf};

use ahash::AHashMap;
use log::debug;
use seq_io::fasta::{Reader, Record};

use crate::error::{KmatError, Result};
use crate::matrix::open_input;
use crate::nucleotide::{canonical, is_valid_kmer};

/// Exact-match mapping from a k-mer to the id of the group that contains it.
pub trait KmerDictionary {
    /// Group id of `kmer` on either strand, or `None` if it belongs to no group.
    fn lookup(&self, kmer: &str) -> Option<usize>;

    fn group_count(&self) -> usize;
}

/// One record of the unitig FASTA file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unitig {
    pub name: String,
    pub sequence: String,
    /// `len - k + 1`, or 0 for sequences shorter than k.
    pub expected_kmers: usize,
}

/// Canonical k-mers of a unitig FASTA file, each mapped to its record index.
///
/// When a k-mer occurs in several unitigs the first one keeps it.
#[derive(Debug, Clone)]
pub struct UnitigDictionary {
    k: usize,
    index: AHashMap<Box<[u8]>, usize>,
    unitigs: Vec<Unitig>,
}

fn fasta_error(path: &Path, err: impl std::fmt::Display) -> KmatError {
    KmatError::Fasta {
        path: PathBuf::from(path),
        msg: err.to_string(),
    }
}

impl UnitigDictionary {
    pub fn build<P: AsRef<Path>>(path: P, k: usize, minimizer_size: usize) -> Result<Self> {
        let path = path.as_ref();
        if k == 0 {
            return Err(KmatError::InvalidArgument(
                "k-mer size must be at least 1".to_string(),
            ));
        }
        if minimizer_size >= k {
            return Err(KmatError::InvalidArgument(format!(
                "minimizer size ({minimizer_size}) must be smaller than k-mer size ({k})"
            )));
        }

        let mut dict = Self {
            k,
            index: AHashMap::new(),
            unitigs: Vec::new(),
        };

        let mut reader = Reader::new(open_input(path)?);
        while let Some(result) = reader.next() {
            let record = result.map_err(|e| fasta_error(path, e))?;
            let name = record.id().map_err(|e| fasta_error(path, e))?.to_string();
            let mut seq = record.full_seq().into_owned();
            seq.make_ascii_uppercase();
            dict.insert(name, seq);
        }

        debug!("k-mers indexed: {}", dict.index.len());
        debug!("unitigs processed: {}", dict.unitigs.len());
        Ok(dict)
    }

    fn insert(&mut self, name: String, seq: Vec<u8>) {
        let id = self.unitigs.len();
        for window in seq.windows(self.k) {
            if !is_valid_kmer(window) {
                continue;
            }
            self.index
                .entry(canonical(window).into_boxed_slice())
                .or_insert(id);
        }

        let expected_kmers = (seq.len() + 1).saturating_sub(self.k);
        self.unitigs.push(Unitig {
            name,
            sequence: String::from_utf8_lossy(&seq).into_owned(),
            expected_kmers,
        });
    }

    pub fn kmer_size(&self) -> usize {
        self.k
    }

    /// Number of distinct canonical k-mers.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Unitigs in file order; the position is the group id.
    pub fn unitigs(&self) -> &[Unitig] {
        &self.unitigs
    }
}

impl KmerDictionary for UnitigDictionary {
    fn lookup(&self, kmer: &str) -> Option<usize> {
        if kmer.len() != self.k {
            return None;
        }
        let mut key = kmer.as_bytes().to_vec();
        key.make_ascii_uppercase();
        self.index.get(canonical(&key).as_slice()).copied()
    }

    fn group_count(&self) -> usize {
        self.unitigs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nucleotide::reverse_complement;
    use std::fs;

    fn write_fasta(dir: &Path, text: &str) -> PathBuf {
        let path = dir.join("unitigs.fa");
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_build_and_lookup_both_strands() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fasta(dir.path(), ">u0 len=6\nACGTTG\n>u1\nCCCAA\nA\n>short\nAC\n");
        let dict = UnitigDictionary::build(&path, 4, 2).unwrap();

        assert_eq!(dict.group_count(), 3);
        assert_eq!(dict.unitigs()[0].name, "u0");
        assert_eq!(dict.unitigs()[1].sequence, "CCCAAA");
        assert_eq!(dict.unitigs()[0].expected_kmers, 3);
        assert_eq!(dict.unitigs()[1].expected_kmers, 3);
        assert_eq!(dict.unitigs()[2].expected_kmers, 0);

        assert_eq!(dict.lookup("ACGT"), Some(0));
        assert_eq!(dict.lookup("GTTG"), Some(0));
        assert_eq!(dict.lookup(&reverse_complement("GTTG")), Some(0));
        assert_eq!(dict.lookup("ccaa"), Some(1));
        assert_eq!(dict.lookup("TTTG"), Some(1));
        assert_eq!(dict.lookup("GGGG"), None);
        assert_eq!(dict.lookup("ACG"), None);
    }

    #[test]
    fn test_first_unitig_keeps_shared_kmer() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fasta(dir.path(), ">a\nAAAC\n>b\nGTTT\n");
        let dict = UnitigDictionary::build(&path, 4, 1).unwrap();
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.lookup("GTTT"), Some(0));
    }

    #[test]
    fn test_windows_with_n_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fasta(dir.path(), ">a\nAACNGGG\n");
        let dict = UnitigDictionary::build(&path, 3, 1).unwrap();
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.unitigs()[0].expected_kmers, 5);
    }

    #[test]
    fn test_invalid_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fasta(dir.path(), ">a\nACGT\n");
        assert!(matches!(
            UnitigDictionary::build(&path, 4, 4),
            Err(KmatError::InvalidArgument(_))
        ));
        assert!(UnitigDictionary::build(&path, 0, 0).is_err());
    }
}
