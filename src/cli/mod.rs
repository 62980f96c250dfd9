use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::error::Result;
use crate::logging::Verbosity;
use crate::options::{CompressOptions, DecompressOptions};

#[derive(Parser, Debug)]
#[command(name = "tarlz4", author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by `compress` and `decompress`.
#[derive(ClapArgs, Clone, Debug, Default)]
pub struct CommonFlags {
    /// Read/write buffer size in bytes. [default: 8192]
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Log a line each time progress crosses the next interval.
    #[arg(long)]
    pub progress: bool,

    /// Percentage step between progress lines. [default: 10]
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub progress_interval: Option<u32>,

    /// Messages at or above this level are promoted to INFO.
    #[arg(long, value_enum)]
    pub verbosity: Option<Verbosity>,

    /// JSON file with options. Flags given on the command line win.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Archive a directory into <OUTPUT>/<NAME>.tar.lz4.
    #[command(alias = "c")]
    Compress {
        /// Directory to archive.
        source: PathBuf,

        /// Existing directory that receives the container.
        #[arg(short, long)]
        output: PathBuf,

        /// Base name of the container. [default: source directory name]
        #[arg(long)]
        name: Option<String>,

        /// Number of slices and worker threads. [0 = one per CPU core]
        #[arg(long)]
        threads: Option<usize>,

        /// File or directory name to leave out. Repeatable.
        #[arg(long = "exclude", value_name = "NAME")]
        excludes: Vec<String>,

        #[command(flatten)]
        common: CommonFlags,
    },
    /// Extract a .tar.lz4 container into <OUTPUT>/<NAME>.
    #[command(alias = "x")]
    Decompress {
        /// Container to extract.
        archive: PathBuf,

        /// Directory that receives the extracted tree.
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        common: CommonFlags,
    },
    /// List the entries of a .tar.lz4 container.
    #[command(alias = "l")]
    List {
        archive: PathBuf,
    },
}

impl Commands {
    /// Options for `compress`: config file first, then flags on top.
    pub fn compress_options(&self) -> Result<CompressOptions> {
        let Commands::Compress { threads, excludes, common, .. } = self else {
            return Ok(CompressOptions::default());
        };
        let mut opts = match &common.config {
            Some(path) => CompressOptions::from_json_file(path)?,
            None => CompressOptions::default(),
        };
        if let Some(threads) = threads {
            opts.threads = resolve_threads(*threads);
        }
        for name in excludes {
            opts.excludes.insert(name.clone());
        }
        if let Some(size) = common.buffer_size {
            opts.buffer_size = size;
        }
        if common.progress {
            opts.progress = true;
        }
        if let Some(interval) = common.progress_interval {
            opts.progress_interval = interval;
        }
        if let Some(verbosity) = common.verbosity {
            opts.verbosity = verbosity;
        }
        Ok(opts)
    }

    /// Options for `decompress`: config file first, then flags on top.
    pub fn decompress_options(&self) -> Result<DecompressOptions> {
        let Commands::Decompress { common, .. } = self else {
            return Ok(DecompressOptions::default());
        };
        let mut opts = match &common.config {
            Some(path) => DecompressOptions::from_json_file(path)?,
            None => DecompressOptions::default(),
        };
        if let Some(size) = common.buffer_size {
            opts.buffer_size = size;
        }
        if common.progress {
            opts.progress = true;
        }
        if let Some(interval) = common.progress_interval {
            opts.progress_interval = interval;
        }
        if let Some(verbosity) = common.verbosity {
            opts.verbosity = verbosity;
        }
        Ok(opts)
    }
}

/// `0` means one thread per CPU core.
pub fn resolve_threads(requested: usize) -> usize {
    if requested == 0 {
        num_cpus::get()
    } else {
        requested
    }
}

pub fn run() -> std::result::Result<Commands, Box<dyn std::error::Error>> {
    let args = Args::parse();
    Ok(args.command)
}
