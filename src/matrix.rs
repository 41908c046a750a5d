//src/matrix.rs

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

use crate::error::{KmatError, Result};
use crate::nucleotide::is_valid_kmer;

pub(crate) fn has_gz_extension(path: &Path) -> bool {
    path.extension().map(|ext| ext == "gz").unwrap_or(false)
}

/// Opens `path` for buffered reading, decompressing on the fly if it ends with ".gz".
pub fn open_input<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let f = File::open(path).map_err(|e| KmatError::open(path, e))?;

    let reader: Box<dyn BufRead> = if has_gz_extension(path) {
        Box::new(BufReader::new(MultiGzDecoder::new(f)))
    } else {
        Box::new(BufReader::with_capacity(1 << 16, f))
    };
    Ok(reader)
}

/// Forward-only cursor over a text k-mer matrix.
///
/// Each non-blank line is `<kmer><ws><count_1>...<ws><count_N>`. The reader keeps
/// exactly one row: call [`advance`](Self::advance) then use the accessors, or use
/// the [`next_kmer`](Self::next_kmer) / [`next_counts`](Self::next_counts) shortcuts.
///
/// Rows are *assumed* sorted; the reader never checks it.
pub struct MatrixReader<R: BufRead> {
    reader: R,
    path: PathBuf,
    line: String,
    line_no: usize,
    kmer_start: usize,
    kmer_end: usize,
    tail_start: usize,
    has_row: bool,
    kmer_size: Option<usize>,
    nb_samples: Option<usize>,
    counts: Vec<u32>,
}

impl MatrixReader<Box<dyn BufRead>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = open_input(&path)?;
        Ok(Self::from_reader(reader, path.as_ref()))
    }
}

impl<R: BufRead> MatrixReader<R> {
    /// Wraps an already opened stream; `path` is only used in error messages.
    pub fn from_reader(reader: R, path: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            path: path.into(),
            line: String::new(),
            line_no: 0,
            kmer_start: 0,
            kmer_end: 0,
            tail_start: 0,
            has_row: false,
            kmer_size: None,
            nb_samples: None,
            counts: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 1-based number of the last line read, blank lines included.
    pub fn line_no(&self) -> usize {
        self.line_no
    }

    pub fn has_row(&self) -> bool {
        self.has_row
    }

    /// k-mer size, known once the first row was read.
    pub fn kmer_size(&self) -> Option<usize> {
        self.kmer_size
    }

    /// Sample count, known once the first row was parsed with `next_counts`.
    pub fn nb_samples(&self) -> Option<usize> {
        self.nb_samples
    }

    /// The current row, without trailing whitespace.
    pub fn line(&self) -> &str {
        &self.line
    }

    /// The current k-mer, upper-cased.
    pub fn kmer(&self) -> &str {
        &self.line[self.kmer_start..self.kmer_end]
    }

    /// Everything after the k-mer and its separator, relayed verbatim by joins.
    pub fn tail(&self) -> &str {
        &self.line[self.tail_start..]
    }

    /// Moves to the next non-blank row. Returns `false` at end of stream.
    pub fn advance(&mut self) -> Result<bool> {
        loop {
            self.line.clear();
            let n = self
                .reader
                .read_line(&mut self.line)
                .map_err(|source| KmatError::Read {
                    path: self.path.clone(),
                    line_no: self.line_no + 1,
                    source,
                })?;
            if n == 0 {
                self.has_row = false;
                return Ok(false);
            }
            self.line_no += 1;

            let trimmed = self.line.trim_end().len();
            self.line.truncate(trimmed);
            if !self.line.is_empty() {
                break;
            }
        }

        let bytes = self.line.as_bytes();
        let kmer_start = bytes
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(bytes.len());
        let kmer_end = bytes[kmer_start..]
            .iter()
            .position(|b| b.is_ascii_whitespace())
            .map(|i| kmer_start + i)
            .unwrap_or(bytes.len());
        let tail_start = bytes[kmer_end..]
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .map(|i| kmer_end + i)
            .unwrap_or(bytes.len());

        if !is_valid_kmer(&bytes[kmer_start..kmer_end]) {
            return Err(KmatError::MalformedKmer {
                path: self.path.clone(),
                line_no: self.line_no,
                text: self.line[kmer_start..kmer_end].to_string(),
            });
        }

        let k = kmer_end - kmer_start;
        match self.kmer_size {
            None => self.kmer_size = Some(k),
            Some(expected) if expected != k => {
                return Err(KmatError::InconsistentKmerLength {
                    path: self.path.clone(),
                    line_no: self.line_no,
                    expected,
                    found: k,
                });
            }
            Some(_) => {}
        }

        self.line[kmer_start..kmer_end].make_ascii_uppercase();
        self.kmer_start = kmer_start;
        self.kmer_end = kmer_end;
        self.tail_start = tail_start;
        self.has_row = true;
        Ok(true)
    }

    /// Next row as `(kmer, tail)`.
    pub fn next_kmer(&mut self) -> Result<Option<(&str, &str)>> {
        if !self.advance()? {
            return Ok(None);
        }
        Ok(Some((self.kmer(), self.tail())))
    }

    /// Next row as `(kmer, counts)`. The first parsed row fixes the sample count.
    pub fn next_counts(&mut self) -> Result<Option<(&str, &[u32])>> {
        if !self.advance()? {
            return Ok(None);
        }
        self.parse_counts()?;
        Ok(Some((self.kmer(), &self.counts)))
    }

    /// Parses the tail of the current row into the internal count buffer.
    pub fn parse_counts(&mut self) -> Result<&[u32]> {
        self.counts.clear();
        let tail = &self.line[self.tail_start..];
        for token in tail.split_ascii_whitespace() {
            let value: u32 = token.parse().map_err(|_| KmatError::MalformedCount {
                path: self.path.clone(),
                line_no: self.line_no,
                token: token.to_string(),
            })?;
            self.counts.push(value);
        }

        let found = self.counts.len();
        match self.nb_samples {
            None => self.nb_samples = Some(found),
            Some(expected) if expected != found => {
                return Err(KmatError::SampleCountMismatch {
                    path: self.path.clone(),
                    line_no: self.line_no,
                    expected,
                    found,
                });
            }
            Some(_) => {}
        }
        Ok(&self.counts)
    }
}

/// Line-oriented output shared by the join, filter and FASTA commands.
pub struct LineSink<W: Write> {
    writer: W,
    path: PathBuf,
}

impl LineSink<Box<dyn Write>> {
    /// Buffered file at `path`, or stdout when `path` is `None`.
    pub fn create(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                let f = File::create(p).map_err(|e| KmatError::open(p, e))?;
                Ok(Self::new(Box::new(BufWriter::new(f)), p))
            }
            None => Ok(Self::new(
                Box::new(BufWriter::new(io::stdout())),
                "<stdout>",
            )),
        }
    }
}

impl<W: Write> LineSink<W> {
    pub fn new(writer: W, path: impl Into<PathBuf>) -> Self {
        Self {
            writer,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `key` followed by every non-empty part, space separated.
    pub fn write_fields(&mut self, key: &str, parts: &[&str]) -> Result<()> {
        self.put(key.as_bytes())?;
        for part in parts.iter().filter(|p| !p.is_empty()) {
            self.put(b" ")?;
            self.put(part.as_bytes())?;
        }
        self.put(b"\n")
    }

    pub fn write_line(&mut self, line: &str) -> Result<()> {
        self.put(line.as_bytes())?;
        self.put(b"\n")
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.put(bytes)
    }

    fn put(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer
            .write_all(bytes)
            .map_err(|e| KmatError::write(&self.path, e))
    }

    /// Flushes and hands back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.writer
            .flush()
            .map_err(|e| KmatError::write(&self.path, e))?;
        Ok(self.writer)
    }
}
