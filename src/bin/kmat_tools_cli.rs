use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, LevelFilter};

use kmat_tools::{
    fafmt_file, fasta_file, join_files, reverse_file, run_filter, build_unitig_matrix,
    FilterOptions, JoinKind, NucleotideOrder, OutputFormat, Statistic, UnitigOptions,
};

/// A collection of tools to process text-based k-mer matrices.
#[derive(Parser, Debug)]
#[command(name = "kmat-tools", author, version, about, long_about = None)]
struct Cli {
    /// Log level (error, warn, info, debug, trace). RUST_LOG overrides it.
    #[arg(long, global = true, default_value = "info")]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct JoinArgs {
    /// First sorted matrix.
    left: PathBuf,
    /// Second sorted matrix.
    right: PathBuf,
    /// Output file [default: stdout].
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Inputs are sorted in A<C<T<G order.
    #[arg(short = 'z', long)]
    actg: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rows of the first matrix whose k-mer is absent from the second.
    Diff(JoinArgs),
    /// Outer join of two matrices, missing samples filled with zeros.
    Merge(JoinArgs),
    /// Rows of the second matrix whose k-mer appears in the first.
    Select(JoinArgs),
    /// Reverse-complement (or canonicalise) every k-mer.
    Reverse {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short = 'z', long)]
        actg: bool,
        /// Only flip k-mers that are not canonical.
        #[arg(short, long)]
        canonicalize: bool,
    },
    /// Write the k-mers of a matrix as FASTA.
    Fasta {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Filter a FASTA file by length and write one sequence line per record.
    Fafmt {
        input: PathBuf,
        /// Minimum sequence length.
        #[arg(short = 'l', long, default_value_t = 0)]
        min_length: usize,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Keep k-mers present and absent in enough samples.
    Filter {
        /// A matrix file, or a directory holding a `matrices/` subdirectory.
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Minimum count for a sample to be present.
        #[arg(short = 'a', long, default_value_t = 1)]
        min_abundance: u32,
        /// Minimum fraction of samples where the k-mer is absent.
        #[arg(short = 'f', long, default_value_t = 0.1)]
        min_frac_absent: f64,
        /// Minimum fraction of samples where the k-mer is present.
        #[arg(short = 'F', long, default_value_t = 0.1)]
        min_frac_present: f64,
        /// Minimum number of absent samples (overrides -f).
        #[arg(short = 'n', long)]
        min_nb_absent: Option<u32>,
        /// Minimum number of present samples (overrides -F).
        #[arg(short = 'N', long)]
        min_nb_present: Option<u32>,
        #[arg(short, long, default_value_t = 4)]
        threads: usize,
        /// Keep the filtered partitions.
        #[arg(long)]
        keep_tmp: bool,
    },
    /// Build a unitig abundance matrix from a k-mer matrix.
    Unitig {
        unitigs: PathBuf,
        matrix: PathBuf,
        #[arg(short, long, default_value_t = 31)]
        kmer_size: usize,
        #[arg(short, long, default_value_t = 15)]
        minimizer_size: usize,
        /// Output files prefix.
        #[arg(short, long, default_value = "out")]
        prefix: PathBuf,
        /// Abundance is set to 0 below this k-mer fraction.
        #[arg(short = 'f', long, default_value_t = 0.0)]
        min_frac: f64,
        /// Also write the k-mer fraction matrix.
        #[arg(long)]
        out_frac: bool,
        /// Write the unitig sequence instead of its name.
        #[arg(short = 's', long)]
        write_seq: bool,
        /// mean or median.
        #[arg(long, default_value = "mean")]
        statistic: Statistic,
        /// text or tsv-gz.
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Diff(_) => "diff",
            Command::Merge(_) => "merge",
            Command::Select(_) => "select",
            Command::Reverse { .. } => "reverse",
            Command::Fasta { .. } => "fasta",
            Command::Fafmt { .. } => "fafmt",
            Command::Filter { .. } => "filter",
            Command::Unitig { .. } => "unitig",
        }
    }
}

fn spinner(color: &str, msg: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template(&format!("{{spinner:.{color}}} {{msg}}"))
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(msg);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn run(cli: Cli) -> kmat_tools::Result<()> {
    match cli.command {
        Command::Diff(args) => run_join(JoinKind::Diff, args),
        Command::Merge(args) => run_join(JoinKind::Merge, args),
        Command::Select(args) => run_join(JoinKind::Select, args),
        Command::Reverse {
            input,
            output,
            actg,
            canonicalize,
        } => {
            let pb = spinner("blue", "Reversing k-mers...");
            let stats = reverse_file(
                &input,
                output.as_deref(),
                NucleotideOrder::from_actg_flag(actg),
                canonicalize,
            );
            pb.finish_and_clear();
            stats.map(|_| ())
        }
        Command::Fasta { input, output } => {
            let pb = spinner("blue", "Writing k-mers as FASTA...");
            let n = fasta_file(&input, output.as_deref());
            pb.finish_and_clear();
            n.map(|_| ())
        }
        Command::Fafmt {
            input,
            min_length,
            output,
        } => {
            let pb = spinner("blue", "Formatting FASTA...");
            let counts = fafmt_file(&input, min_length, output.as_deref());
            pb.finish_and_clear();
            counts.map(|_| ())
        }
        Command::Filter {
            input,
            output,
            min_abundance,
            min_frac_absent,
            min_frac_present,
            min_nb_absent,
            min_nb_present,
            threads,
            keep_tmp,
        } => {
            let opts = FilterOptions {
                input,
                output,
                min_abundance,
                min_frac_absent,
                min_nb_absent,
                min_frac_present,
                min_nb_present,
                threads,
                keep_tmp,
            };
            let pb = spinner("green", "Filtering k-mers...");
            let stats = run_filter(&opts);
            pb.finish_and_clear();
            stats.map(|_| ())
        }
        Command::Unitig {
            unitigs,
            matrix,
            kmer_size,
            minimizer_size,
            prefix,
            min_frac,
            out_frac,
            write_seq,
            statistic,
            format,
        } => {
            let opts = UnitigOptions {
                unitigs,
                matrix,
                kmer_size,
                minimizer_size,
                out_prefix: prefix,
                min_fraction: min_frac,
                write_fractions: out_frac,
                write_seq,
                statistic,
                format,
            };
            let pb = spinner("yellow", "Building unitig matrix...");
            let summary = build_unitig_matrix(&opts);
            pb.finish_and_clear();
            let summary = summary?;
            info!(
                "{} unitigs, {} samples, {}/{} k-mers matched",
                summary.unitigs, summary.samples, summary.kmers_matched, summary.kmers_seen
            );
            Ok(())
        }
    }
}

fn run_join(kind: JoinKind, args: JoinArgs) -> kmat_tools::Result<()> {
    let pb = spinner("cyan", "Joining matrices...");
    let stats = join_files(
        kind,
        &args.left,
        &args.right,
        args.output.as_deref(),
        NucleotideOrder::from_actg_flag(args.actg),
    );
    pb.finish_and_clear();
    stats.map(|_| ())
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level)
        .parse_default_env()
        .init();

    info!("Command: {}", cli.command.name());

    if let Err(e) = run(cli) {
        error!("{e}");
        process::exit(1);
    }
}
