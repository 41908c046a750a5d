//src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, KmatError>;

/// Every failure is fatal: callers abort the run and report the message.
#[derive(Debug, Error)]
pub enum KmatError {
    /// A k-mer token holds a byte outside the nucleotide alphabet.
    #[error("{}: bad character found in k-mer \"{text}\" at line {line_no}", path.display())]
    MalformedKmer {
        path: PathBuf,
        line_no: usize,
        text: String,
    },

    /// A count token is not an unsigned 32-bit integer.
    #[error("{}: error loading counts at line {line_no} (token \"{token}\")", path.display())]
    MalformedCount {
        path: PathBuf,
        line_no: usize,
        token: String,
    },

    /// Row width differs from the width set by the first row.
    #[error("{}: inconsistent number of samples at line {line_no}: found {found}, expected {expected}", path.display())]
    SampleCountMismatch {
        path: PathBuf,
        line_no: usize,
        expected: usize,
        found: usize,
    },

    /// Two streams being joined disagree on k.
    #[error("different k-mer size between the two input matrices: {left} vs {right}")]
    KmerLengthMismatch { left: usize, right: usize },

    /// A row of one matrix disagrees with k set by its first row.
    #[error("{}: k-mer of size {found} at line {line_no}, expected {expected}", path.display())]
    InconsistentKmerLength {
        path: PathBuf,
        line_no: usize,
        expected: usize,
        found: usize,
    },

    #[error("cannot open {}: {source}", path.display())]
    IoOpenFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write to {}: {source}", path.display())]
    IoWriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A row could not be read, e.g. it is not valid UTF-8.
    #[error("{}: cannot read line {line_no}: {source}", path.display())]
    Read {
        path: PathBuf,
        line_no: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{}: input is empty", path.display())]
    EmptyInput { path: PathBuf },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{}: FASTA parse error: {msg}", path.display())]
    Fasta { path: PathBuf, msg: String },

    #[error("cannot build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl KmatError {
    pub(crate) fn open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        KmatError::IoOpenFailure {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        KmatError::IoWriteFailure {
            path: path.into(),
            source,
        }
    }
}
