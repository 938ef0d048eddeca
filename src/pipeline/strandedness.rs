//! Library strand protocol, given explicitly or inferred from a read subset.

use std::{
    io::{BufRead, Write},
    path::Path,
};

use thousands::Separable;

use crate::common::io::{open_read_maybe_gz, write_atomically};

/// Fraction of explained reads above which a library counts as stranded.
pub const STRANDED_THRESHOLD: f64 = 0.8;

/// Strand protocol of a library.
#[derive(
    clap::ValueEnum,
    serde::Serialize,
    serde::Deserialize,
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum::Display,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Strandedness {
    /// Unstranded library.
    #[default]
    None,
    /// First read on the transcript strand.
    Forward,
    /// First read on the opposite strand.
    Reverse,
}

impl Strandedness {
    /// Strand flag for stringtie, if any.
    pub fn stringtie_flag(self) -> Option<&'static str> {
        match self {
            Strandedness::None => None,
            Strandedness::Forward => Some("--fr"),
            Strandedness::Reverse => Some("--rf"),
        }
    }
}

/// Resolution state of the strandedness of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrandednessState {
    /// Inference was requested but has not run yet.
    Unspecified,
    ExplicitForward,
    ExplicitNone,
    Inferred(Strandedness),
}

impl StrandednessState {
    /// Initial state from the command line flags; inference wins over an
    /// explicit strand-specific flag.
    pub fn from_flags(strand_specific: bool, infer: bool) -> Self {
        if infer {
            StrandednessState::Unspecified
        } else if strand_specific {
            StrandednessState::ExplicitForward
        } else {
            StrandednessState::ExplicitNone
        }
    }

    /// Whether the state still needs the inference sub-stage.
    pub fn needs_inference(self) -> bool {
        self == StrandednessState::Unspecified
    }

    /// Resolve the state, calling `infer` only if inference is pending.
    pub fn resolve<F>(self, infer: F) -> Result<Self, anyhow::Error>
    where
        F: FnOnce() -> Result<Strandedness, anyhow::Error>,
    {
        match self {
            StrandednessState::Unspecified => {
                let inferred = infer()?;
                tracing::info!("inferred strandedness: {}", inferred);
                Ok(StrandednessState::Inferred(inferred))
            }
            resolved => Ok(resolved),
        }
    }

    /// The effective strandedness; pending inference counts as unstranded.
    pub fn strandedness(self) -> Strandedness {
        match self {
            StrandednessState::Unspecified | StrandednessState::ExplicitNone => Strandedness::None,
            StrandednessState::ExplicitForward => Strandedness::Forward,
            StrandednessState::Inferred(strandedness) => strandedness,
        }
    }
}

/// Parsed summary of `infer_experiment.py`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct InferredStrandedness {
    pub paired: bool,
    /// Fraction of reads that could not be assigned.
    pub undetermined: f64,
    /// Fraction explained by `1++,1--,2+-,2-+` (or `++,--`).
    pub forward: f64,
    /// Fraction explained by `1+-,1-+,2++,2--` (or `+-,-+`).
    pub reverse: f64,
    pub strandedness: Strandedness,
}

/// Parse the summary written by `infer_experiment.py`.
pub fn parse_infer_experiment(text: &str) -> Result<InferredStrandedness, anyhow::Error> {
    let fraction = |line: &str| -> Result<f64, anyhow::Error> {
        let value = line
            .rsplit(':')
            .next()
            .map(str::trim)
            .unwrap_or_default();
        value
            .parse::<f64>()
            .map_err(|e| anyhow::anyhow!("invalid fraction in {:?}: {}", line, e))
    };

    let mut paired = None;
    let mut undetermined = 0.0;
    let mut forward = None;
    let mut reverse = None;
    for line in text.lines().map(str::trim) {
        if line.starts_with("This is PairEnd") {
            paired = Some(true);
        } else if line.starts_with("This is SingleEnd") {
            paired = Some(false);
        } else if line.starts_with("Fraction of reads failed to determine") {
            undetermined = fraction(line)?;
        } else if line.contains("\"1++,1--,2+-,2-+\"") || line.contains("\"++,--\"") {
            forward = Some(fraction(line)?);
        } else if line.contains("\"1+-,1-+,2++,2--\"") || line.contains("\"+-,-+\"") {
            reverse = Some(fraction(line)?);
        }
    }

    let (paired, forward, reverse) = match (paired, forward, reverse) {
        (Some(paired), Some(forward), Some(reverse)) => (paired, forward, reverse),
        _ => anyhow::bail!("not an infer_experiment.py summary:\n{}", text),
    };
    let strandedness = if forward >= STRANDED_THRESHOLD {
        Strandedness::Forward
    } else if reverse >= STRANDED_THRESHOLD {
        Strandedness::Reverse
    } else {
        Strandedness::None
    };

    Ok(InferredStrandedness {
        paired,
        undetermined,
        forward,
        reverse,
        strandedness,
    })
}

/// Write the first `reads` records of the (maybe gzipped) FASTQ `input` to
/// `output` as plain text.
///
/// Returns the number of records written.
pub fn subset_fastq(input: &Path, output: &Path, reads: usize) -> Result<usize, anyhow::Error> {
    let reader = open_read_maybe_gz(input)
        .map_err(|e| anyhow::anyhow!("could not open {:?}: {}", input, e))?;
    let mut written = 0;
    write_atomically(output, |writer| {
        let mut lines = reader.lines();
        while written < reads {
            let record = lines.by_ref().take(4).collect::<Result<Vec<_>, _>>()?;
            match record.len() {
                0 => break,
                4 => {
                    for line in &record {
                        writeln!(writer, "{}", line)?;
                    }
                    written += 1;
                }
                n => anyhow::bail!("truncated FASTQ record with {} lines in {:?}", n, input),
            }
        }
        Ok(())
    })?;
    tracing::debug!(
        "wrote {} reads from {:?} to {:?}",
        written.separate_with_commas(),
        input,
        output
    );
    Ok(written)
}
