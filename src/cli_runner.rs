//! Command dispatch for the `tarlz4` binary, kept in the library so tests and
//! other front-ends can drive it.

use crate::cli::{self, Commands};
use crate::common::EntryKind;
use crate::compress::Compressor;
use crate::extract::Decompressor;
use crate::logging;

/// Parses the command line and runs the selected command.
pub fn run_cli_app() -> Result<(), Box<dyn std::error::Error>> {
    let command = cli::run()?;
    logging::init_subscriber("info");
    run_command(&command)
}

pub fn run_command(command: &Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Compress { source, output, name, .. } => {
            let compressor = Compressor::new(command.compress_options()?);
            let container = match name {
                Some(name) => compressor.compress(source, output, name)?,
                None => compressor.compress_default_name(source, output)?,
            };
            println!("{}", container.display());
        }
        Commands::Decompress { archive, output, .. } => {
            let root = Decompressor::new(command.decompress_options()?).decompress(archive, output)?;
            println!("{}", root.display());
        }
        Commands::List { archive } => {
            for entry in Decompressor::default().list(archive)? {
                match entry.kind {
                    EntryKind::Directory => println!("d {:>12} {}/", "-", entry.path.display()),
                    EntryKind::File => println!("f {:>12} {}", entry.size, entry.path.display()),
                }
            }
        }
    }

    Ok(())
}
