//! Proteogenomics worker main executable

pub mod common;
pub mod contigs;
pub mod err;
pub mod flows;
pub mod pipeline;
pub mod reference;
pub mod snpeff;
pub mod tools;

use clap::{Parser, Subcommand};
use console::{Emoji, Term};

/// CLI parser based on clap.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Proteogenomics sample processing",
    long_about = "This tool drives the external tools that turn sequencing reads into \
                  sample-specific variants, isoforms, fusions and expression values"
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: common::Args,

    /// The sub command to run
    #[command(subcommand)]
    command: Commands,
}

/// Enum supporting the parsing of top-level commands.
#[allow(clippy::large_enum_variant)]
#[derive(Debug, Subcommand)]
enum Commands {
    /// Variants, isoforms and fusions for the sample protein database.
    Proteins(flows::sample_db::Args),
    /// Long non-coding RNA classification.
    Lncrna(flows::lncrna::Args),
    /// Gene fusion calling.
    Fusion(flows::fusion::Args),
    /// Transcript quantification.
    Quantify(flows::quantify::Args),
    /// Strandedness inference only.
    Strandedness(flows::strandedness::Args),
    /// Reference download and preparation only.
    Reference(flows::reference::Args),
    /// Contig name translation of a TSV file.
    TranslateContigs(contigs::Args),
    /// Translatable records of a snpEff-annotated VCF file.
    InterpretAnn(snpeff::Args),
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Build a tracing subscriber according to the configuration in `cli.common`.
    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(match cli.common.verbose.log_level() {
            Some(level) => match level {
                log::Level::Error => tracing::Level::ERROR,
                log::Level::Warn => tracing::Level::WARN,
                log::Level::Info => tracing::Level::INFO,
                log::Level::Debug => tracing::Level::DEBUG,
                log::Level::Trace => tracing::Level::TRACE,
            },
            None => tracing::Level::INFO,
        })
        .compact()
        .finish();

    // Install collector and go into sub commands.
    let term = Term::stderr();
    tracing::subscriber::with_default(collector, || {
        match &cli.command {
            Commands::Proteins(args) => flows::sample_db::run(&cli.common, args)?,
            Commands::Lncrna(args) => flows::lncrna::run(&cli.common, args)?,
            Commands::Fusion(args) => flows::fusion::run(&cli.common, args)?,
            Commands::Quantify(args) => flows::quantify::run(&cli.common, args)?,
            Commands::Strandedness(args) => flows::strandedness::run(&cli.common, args)?,
            Commands::Reference(args) => flows::reference::run(&cli.common, args)?,
            Commands::TranslateContigs(args) => contigs::run(&cli.common, args)?,
            Commands::InterpretAnn(args) => snpeff::run(&cli.common, args)?,
        }

        Ok::<(), anyhow::Error>(())
    })?;
    term.write_line(&format!("All done. Have a nice day!{}", Emoji(" 😃", "")))?;

    Ok(())
}
