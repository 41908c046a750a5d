//src/matrix_writer.rs

use std::ffi::OsString;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{KmatError, Result};
use crate::matrix::LineSink;

/// Destination of per-unitig abundance (and optionally fraction) rows.
pub trait MatrixWriter {
    /// `fractions` is ignored unless the writer was created with fraction output.
    fn write_row(&mut self, id: &str, abundances: &[f64], fractions: &[f64]) -> Result<()>;

    /// Flushes and closes every output file.
    fn finish(self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Space-separated `.mat` files.
    #[default]
    Text,
    /// Gzip-compressed, tab-separated files with a header line.
    TsvGz,
}

impl FromStr for OutputFormat {
    type Err = KmatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "tsv-gz" | "tsv.gz" => Ok(OutputFormat::TsvGz),
            other => Err(KmatError::InvalidArgument(format!(
                "unknown output format \"{other}\" (expected text or tsv-gz)"
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::TsvGz => write!(f, "tsv-gz"),
        }
    }
}

/// `<prefix><suffix>`, keeping non-UTF-8 prefixes intact.
pub(crate) fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn format_values(id: &str, values: &[f64], sep: char) -> String {
    let mut line = String::with_capacity(id.len() + values.len() * 8);
    line.push_str(id);
    for v in values {
        line.push(sep);
        line.push_str(&format!("{v:.2}"));
    }
    line
}

/// `<prefix>.abundance.mat` and, optionally, `<prefix>.frac.mat`.
pub struct TextMatrixWriter {
    abundance: LineSink<BufWriter<File>>,
    fraction: Option<LineSink<BufWriter<File>>>,
}

impl TextMatrixWriter {
    pub fn create(prefix: &Path, write_fractions: bool) -> Result<Self> {
        let abundance = Self::open(&with_suffix(prefix, ".abundance.mat"))?;
        let fraction = if write_fractions {
            Some(Self::open(&with_suffix(prefix, ".frac.mat"))?)
        } else {
            None
        };
        Ok(Self { abundance, fraction })
    }

    fn open(path: &Path) -> Result<LineSink<BufWriter<File>>> {
        let f = File::create(path).map_err(|e| KmatError::open(path, e))?;
        Ok(LineSink::new(BufWriter::new(f), path))
    }
}

impl MatrixWriter for TextMatrixWriter {
    fn write_row(&mut self, id: &str, abundances: &[f64], fractions: &[f64]) -> Result<()> {
        self.abundance.write_line(&format_values(id, abundances, ' '))?;
        if let Some(sink) = self.fraction.as_mut() {
            sink.write_line(&format_values(id, fractions, ' '))?;
        }
        Ok(())
    }

    fn finish(self) -> Result<()> {
        self.abundance.finish()?;
        if let Some(sink) = self.fraction {
            sink.finish()?;
        }
        Ok(())
    }
}

type GzTsv = csv::Writer<GzEncoder<BufWriter<File>>>;

/// One gzip-compressed TSV output and the path used in its error messages.
struct TsvFile {
    path: PathBuf,
    writer: GzTsv,
}

impl TsvFile {
    fn create(path: PathBuf, samples: usize) -> Result<Self> {
        let f = File::create(&path).map_err(|e| KmatError::open(&path, e))?;
        let gz = GzEncoder::new(BufWriter::new(f), Compression::default());
        let writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_writer(gz);

        let mut file = Self { path, writer };
        let mut header = Vec::with_capacity(samples + 1);
        header.push("unitig_id".to_string());
        header.extend((0..samples).map(|i| format!("sample_{i}")));
        file.write_record(&header)?;
        Ok(file)
    }

    fn write_values(&mut self, id: &str, values: &[f64]) -> Result<()> {
        let mut record = Vec::with_capacity(values.len() + 1);
        record.push(id.to_string());
        record.extend(values.iter().map(|v| format!("{v:.2}")));
        self.write_record(&record)
    }

    fn write_record(&mut self, record: &[String]) -> Result<()> {
        self.writer
            .write_record(record)
            .map_err(|e| KmatError::write(&self.path, io::Error::from(e)))
    }

    fn finish(self) -> Result<()> {
        let path = self.path;
        let gz = self
            .writer
            .into_inner()
            .map_err(|e| {
                let source = io::Error::new(e.error().kind(), e.error().to_string());
                KmatError::write(&path, source)
            })?;
        let mut inner = gz.finish().map_err(|e| KmatError::write(&path, e))?;
        inner.flush().map_err(|e| KmatError::write(&path, e))
    }
}

/// `<prefix>.abundance.tsv.gz` and, optionally, `<prefix>.frac.tsv.gz`.
pub struct CompressedTsvMatrixWriter {
    abundance: TsvFile,
    fraction: Option<TsvFile>,
}

impl CompressedTsvMatrixWriter {
    pub fn create(prefix: &Path, write_fractions: bool, samples: usize) -> Result<Self> {
        let abundance = TsvFile::create(with_suffix(prefix, ".abundance.tsv.gz"), samples)?;
        let fraction = if write_fractions {
            Some(TsvFile::create(with_suffix(prefix, ".frac.tsv.gz"), samples)?)
        } else {
            None
        };
        Ok(Self { abundance, fraction })
    }
}

impl MatrixWriter for CompressedTsvMatrixWriter {
    fn write_row(&mut self, id: &str, abundances: &[f64], fractions: &[f64]) -> Result<()> {
        self.abundance.write_values(id, abundances)?;
        if let Some(file) = self.fraction.as_mut() {
            file.write_values(id, fractions)?;
        }
        Ok(())
    }

    fn finish(self) -> Result<()> {
        self.abundance.finish()?;
        if let Some(file) = self.fraction {
            file.finish()?;
        }
        Ok(())
    }
}

/// Writer chosen once per run from an [`OutputFormat`].
pub enum MatrixSink {
    Text(TextMatrixWriter),
    TsvGz(CompressedTsvMatrixWriter),
}

impl MatrixSink {
    pub fn create(
        format: OutputFormat,
        prefix: &Path,
        write_fractions: bool,
        samples: usize,
    ) -> Result<Self> {
        Ok(match format {
            OutputFormat::Text => MatrixSink::Text(TextMatrixWriter::create(prefix, write_fractions)?),
            OutputFormat::TsvGz => MatrixSink::TsvGz(CompressedTsvMatrixWriter::create(
                prefix,
                write_fractions,
                samples,
            )?),
        })
    }

    /// Paths of every file this sink writes.
    pub fn output_paths(format: OutputFormat, prefix: &Path, write_fractions: bool) -> Vec<PathBuf> {
        let (abundance, fraction) = match format {
            OutputFormat::Text => (".abundance.mat", ".frac.mat"),
            OutputFormat::TsvGz => (".abundance.tsv.gz", ".frac.tsv.gz"),
        };
        let mut paths = vec![with_suffix(prefix, abundance)];
        if write_fractions {
            paths.push(with_suffix(prefix, fraction));
        }
        paths
    }
}

impl MatrixWriter for MatrixSink {
    fn write_row(&mut self, id: &str, abundances: &[f64], fractions: &[f64]) -> Result<()> {
        match self {
            MatrixSink::Text(w) => w.write_row(id, abundances, fractions),
            MatrixSink::TsvGz(w) => w.write_row(id, abundances, fractions),
        }
    }

    fn finish(self) -> Result<()> {
        match self {
            MatrixSink::Text(w) => w.finish(),
            MatrixSink::TsvGz(w) => w.finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::MultiGzDecoder;
    use std::fs;
    use std::io::Read;

    fn gunzip(path: &Path) -> String {
        let mut text = String::new();
        MultiGzDecoder::new(File::open(path).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        text
    }

    #[test]
    fn test_text_writer() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("out");
        let mut sink = MatrixSink::create(OutputFormat::Text, &prefix, true, 2).unwrap();
        sink.write_row("utg0", &[1.0, 2.346], &[0.5, 1.0]).unwrap();
        sink.write_row("utg1", &[0.0, 10.0], &[0.0, 1.0 / 3.0]).unwrap();
        sink.finish().unwrap();

        let ab = fs::read_to_string(dir.path().join("out.abundance.mat")).unwrap();
        assert_eq!(ab, "utg0 1.00 2.35\nutg1 0.00 10.00\n");
        let fr = fs::read_to_string(dir.path().join("out.frac.mat")).unwrap();
        assert_eq!(fr, "utg0 0.50 1.00\nutg1 0.00 0.33\n");
    }

    #[test]
    fn test_text_writer_without_fractions() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("out");
        let mut sink = MatrixSink::create(OutputFormat::Text, &prefix, false, 1).unwrap();
        sink.write_row("ACGT", &[3.0], &[]).unwrap();
        sink.finish().unwrap();
        assert!(!dir.path().join("out.frac.mat").exists());
        assert_eq!(
            MatrixSink::output_paths(OutputFormat::Text, &prefix, false),
            vec![dir.path().join("out.abundance.mat")]
        );
    }

    #[test]
    fn test_compressed_tsv_writer() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("run");
        let mut sink = MatrixSink::create(OutputFormat::TsvGz, &prefix, true, 3).unwrap();
        sink.write_row("u0", &[1.0, 0.0, 4.5], &[1.0, 0.0, 0.25]).unwrap();
        sink.finish().unwrap();

        let ab = gunzip(&dir.path().join("run.abundance.tsv.gz"));
        assert_eq!(
            ab,
            "unitig_id\tsample_0\tsample_1\tsample_2\nu0\t1.00\t0.00\t4.50\n"
        );
        let fr = gunzip(&dir.path().join("run.frac.tsv.gz"));
        assert!(fr.ends_with("u0\t1.00\t0.00\t0.25\n"));
    }

    #[test]
    fn test_unwritable_prefix() {
        let err = MatrixSink::create(
            OutputFormat::Text,
            Path::new("/nonexistent/dir/out"),
            false,
            1,
        )
        .err()
        .unwrap();
        assert!(matches!(err, KmatError::IoOpenFailure { .. }));
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("tsv-gz".parse::<OutputFormat>().unwrap(), OutputFormat::TsvGz);
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert!("hdf5".parse::<OutputFormat>().is_err());
    }
}
