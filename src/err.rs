//! Error types of the worker.

use std::path::PathBuf;

/// Problems with the run configuration, detected before any stage runs.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("experiment type was not recognized: {0}")]
    InvalidExperimentType(String),
    #[error("cannot do isoform analysis without RNA sequencing data")]
    IsoformRequiresRnaSeq,
    #[error("cannot do gene fusion analysis without RNA sequencing data")]
    FusionRequiresRnaSeq,
    #[error("the `{0}` command requires RNA-Seq reads")]
    CommandRequiresRnaSeq(String),
    #[error("there are {first} first-strand and {second} second-strand fastq files")]
    MismatchedFastqCounts { first: usize, second: usize },
    #[error("no fastq files were given")]
    NoFastqs,
    #[error("reference {0:?} is not supported, use GRCh37 or GRCh38")]
    UnsupportedReference(String),
    #[error("thread and worker counts must be at least 1")]
    InvalidThreadCount,
    #[error("lncRNA classification requires the slncky annotations directory")]
    MissingSlnckyAnnotations,
    #[error("gene fusion analysis requires the STAR-Fusion genome library")]
    MissingFusionLibrary,
}

/// Problems while running one external stage.
#[derive(thiserror::Error, Debug)]
pub enum StageError {
    #[error("stage {stage}: required input {path:?} is missing")]
    MissingInput { stage: String, path: PathBuf },
    #[error("stage {stage}: could not start {program}: {source}")]
    Spawn {
        stage: String,
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("stage {stage}: {program} exited with {code:?}\n{stderr}")]
    NonZeroExit {
        stage: String,
        program: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("stage {stage}: expected output {path:?} was not produced")]
    MissingOutput { stage: String, path: PathBuf },
    #[error("stage {stage}: output {path:?} is empty")]
    EmptyOutput { stage: String, path: PathBuf },
    #[error("stage {stage}: {source}")]
    Io {
        stage: String,
        #[source]
        source: std::io::Error,
    },
}

/// Problems parsing a snpEff `ANN` entry.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AnnError {
    #[error("expected at least {expected} fields in ANN entry, got {actual}: {line:?}")]
    TooFewFields {
        expected: usize,
        actual: usize,
        line: String,
    },
}
