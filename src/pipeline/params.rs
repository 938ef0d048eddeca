//! Run configuration and its validation.

use std::path::{Path, PathBuf};

use crate::{common::expand_path, err::ConfigError, pipeline::stage::RunArgs};

/// Kind of sequencing experiment the reads come from.
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
    Hash,
    strum::Display,
    strum::EnumIter,
)]
pub enum ExperimentType {
    #[default]
    #[strum(serialize = "RNASequencing")]
    #[serde(rename = "RNASequencing")]
    RnaSequencing,
    #[strum(serialize = "WholeGenomeSequencing")]
    #[serde(rename = "WholeGenomeSequencing")]
    WholeGenomeSequencing,
    #[strum(serialize = "ExomeSequencing")]
    #[serde(rename = "ExomeSequencing")]
    ExomeSequencing,
}

impl ExperimentType {
    pub fn is_rna_seq(self) -> bool {
        self == ExperimentType::RnaSequencing
    }
}

impl std::str::FromStr for ExperimentType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "rnasequencing" | "rnaseq" => Ok(ExperimentType::RnaSequencing),
            "wholegenomesequencing" | "wgs" => Ok(ExperimentType::WholeGenomeSequencing),
            "exomesequencing" | "wes" => Ok(ExperimentType::ExomeSequencing),
            _ => Err(ConfigError::InvalidExperimentType(s.to_owned())),
        }
    }
}

/// The reads of one sample, single-end or paired-end.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, derive_new::new)]
pub struct FastqSet {
    pub first: PathBuf,
    pub second: Option<PathBuf>,
}

impl FastqSet {
    pub fn is_paired(&self) -> bool {
        self.second.is_some()
    }

    /// All read files of the set.
    pub fn paths(&self) -> Vec<&Path> {
        std::iter::once(self.first.as_path())
            .chain(self.second.as_deref())
            .collect()
    }

    /// Name derived from the first read file, without FASTQ and compression
    /// extensions.
    pub fn prefix(&self) -> String {
        fastq_stem(&self.first)
    }

    pub fn is_gzipped(&self) -> bool {
        self.first.extension().map(|e| e == "gz").unwrap_or(false)
    }

    pub fn is_bzipped(&self) -> bool {
        self.first.extension().map(|e| e == "bz2").unwrap_or(false)
    }
}

/// File name of `path` without `.gz`/`.bz2` and `.fastq`/`.fq` extensions.
pub fn fastq_stem(path: &Path) -> String {
    let mut name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    for ext in [".gz", ".bz2", ".fastq", ".fq"] {
        if let Some(stripped) = name.strip_suffix(ext) {
            name = stripped.to_owned();
        }
    }
    name
}

/// Split the comma-separated read lists into per-sample read sets.
pub fn separate_fastqs(fq1: &str, fq2: Option<&str>) -> Result<Vec<FastqSet>, ConfigError> {
    let split = |s: &str| {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect::<Vec<_>>()
    };
    let first = split(fq1);
    let second = fq2.map(split).unwrap_or_default();
    if !second.is_empty() && first.len() != second.len() {
        return Err(ConfigError::MismatchedFastqCounts {
            first: first.len(),
            second: second.len(),
        });
    }

    let mut second = second.into_iter();
    Ok(first
        .into_iter()
        .map(|first| FastqSet::new(first, second.next()))
        .collect())
}

/// The command being run, used for validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Command {
    Proteins,
    Lncrna,
    Fusion,
    Quantify,
    Strandedness,
}

impl Command {
    fn requires_rna_seq(self) -> bool {
        matches!(self, Command::Lncrna | Command::Fusion | Command::Quantify)
    }
}

/// Configuration snapshot of one run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, derive_builder::Builder)]
#[builder(setter(into))]
pub struct PipelineParameters {
    /// Directory all analysis artifacts are written to.
    pub analysis_dir: PathBuf,
    /// Directory holding the reference files.
    pub reference_dir: PathBuf,
    /// Name of the reference build, e.g., `GRCh38`.
    #[builder(default = "String::from(\"GRCh38\")")]
    pub reference: String,
    #[builder(default)]
    pub experiment_type: ExperimentType,
    #[builder(default)]
    pub fastqs: Vec<FastqSet>,
    /// Threads handed to each external tool.
    #[builder(default = "1")]
    pub threads: usize,
    /// Size of the worker pool for variant calling.
    #[builder(default = "1")]
    pub variant_calling_workers: usize,
    #[builder(default)]
    pub strand_specific: bool,
    #[builder(default)]
    pub infer_strandedness: bool,
    /// Number of reads used for inferring strandedness.
    #[builder(default = "300_000")]
    pub read_subset: usize,
    #[builder(default)]
    pub skip_variant_analysis: bool,
    #[builder(default)]
    pub do_isoform_analysis: bool,
    #[builder(default)]
    pub do_fusion_analysis: bool,
    #[builder(default)]
    pub quick_snpeff_without_stats: bool,
    /// Adapter sequences for trimming; trimming is skipped without them.
    #[builder(default, setter(strip_option))]
    pub adapters: Option<PathBuf>,
    #[builder(default, setter(strip_option))]
    pub genome_fasta: Option<PathBuf>,
    #[builder(default, setter(strip_option))]
    pub gene_model: Option<PathBuf>,
    #[builder(default, setter(strip_option))]
    pub protein_fasta: Option<PathBuf>,
    /// Known variant sites for base quality recalibration.
    #[builder(default, setter(strip_option))]
    pub known_sites: Option<PathBuf>,
    /// Reference annotation and orthologs directory for slncky.
    #[builder(default, setter(strip_option))]
    pub slncky_annotations: Option<PathBuf>,
    /// CTAT genome library for STAR-Fusion.
    #[builder(default, setter(strip_option))]
    pub fusion_library: Option<PathBuf>,
}

impl PipelineParameters {
    /// Write the snapshot to `<analysis>/parameters.json`.
    pub fn write_snapshot(&self) -> Result<PathBuf, anyhow::Error> {
        std::fs::create_dir_all(&self.analysis_dir)?;
        let path = self.analysis_dir.join("parameters.json");
        crate::common::io::write_atomically(&path, |w| {
            serde_json::to_writer_pretty(w, self)?;
            Ok(())
        })?;
        Ok(path)
    }
}

/// Reject configurations that cannot work for `command`.
///
/// Runs before any stage so that no external tool starts on bad input.
pub fn validate(command: Command, params: &PipelineParameters) -> Result<(), ConfigError> {
    let rna_seq = params.experiment_type.is_rna_seq();
    if params.do_isoform_analysis && !rna_seq {
        return Err(ConfigError::IsoformRequiresRnaSeq);
    }
    if params.do_fusion_analysis && !rna_seq {
        return Err(ConfigError::FusionRequiresRnaSeq);
    }
    if command.requires_rna_seq() && !rna_seq {
        return Err(ConfigError::CommandRequiresRnaSeq(command.to_string()));
    }
    if command == Command::Lncrna && params.slncky_annotations.is_none() {
        return Err(ConfigError::MissingSlnckyAnnotations);
    }
    let fusion = command == Command::Fusion
        || (command == Command::Proteins && params.do_fusion_analysis);
    if fusion && params.fusion_library.is_none() {
        return Err(ConfigError::MissingFusionLibrary);
    }
    if params.fastqs.is_empty() {
        return Err(ConfigError::NoFastqs);
    }
    if params.threads == 0 || params.variant_calling_workers == 0 {
        return Err(ConfigError::InvalidThreadCount);
    }
    Ok(())
}

/// Command line arguments shared by the read-consuming commands.
#[derive(clap::Args, Debug, Clone)]
pub struct ParamArgs {
    /// Directory for all analysis outputs.
    #[arg(long)]
    pub analysis_dir: String,
    /// Directory for downloaded and derived reference files.
    #[arg(long)]
    pub reference_dir: String,
    /// Reference build, GRCh37 or GRCh38.
    #[arg(long, default_value = "GRCh38")]
    pub reference: String,
    /// Comma-separated first-strand read files.
    #[arg(long)]
    pub fq1: String,
    /// Comma-separated second-strand read files.
    #[arg(long)]
    pub fq2: Option<String>,
    /// Kind of sequencing experiment.
    #[arg(long, value_enum, default_value_t = ExperimentType::RnaSequencing)]
    pub experiment_type: ExperimentType,
    /// Threads per external tool.
    #[arg(long, default_value_t = 1)]
    pub threads: usize,
    /// Parallel variant calling workers.
    #[arg(long, default_value_t = 1)]
    pub variant_calling_workers: usize,
    /// Library is strand-specific (forward).
    #[arg(long)]
    pub strand_specific: bool,
    /// Infer strandedness from a subset of the reads.
    #[arg(long)]
    pub infer_strandedness: bool,
    /// Number of reads used for inferring strandedness.
    #[arg(long, default_value_t = 300_000)]
    pub read_subset: usize,
    /// Adapter sequences for read trimming.
    #[arg(long)]
    pub adapters: Option<String>,
    /// Use this genome FASTA instead of the Ensembl one.
    #[arg(long)]
    pub genome_fasta: Option<String>,
    /// Use this gene model instead of the Ensembl one.
    #[arg(long)]
    pub gene_model: Option<String>,
    /// Use this protein FASTA instead of the Ensembl one.
    #[arg(long)]
    pub protein_fasta: Option<String>,

    #[command(flatten)]
    pub run: RunArgs,
}

impl ParamArgs {
    /// Builder prefilled from the command line.
    pub fn to_builder(&self) -> Result<PipelineParametersBuilder, anyhow::Error> {
        let fastqs = separate_fastqs(&self.fq1, self.fq2.as_deref())?;
        let mut builder = PipelineParametersBuilder::default();
        builder
            .analysis_dir(expand_path(&self.analysis_dir)?)
            .reference_dir(expand_path(&self.reference_dir)?)
            .reference(self.reference.clone())
            .experiment_type(self.experiment_type)
            .fastqs(fastqs)
            .threads(self.threads)
            .variant_calling_workers(self.variant_calling_workers)
            .strand_specific(self.strand_specific)
            .infer_strandedness(self.infer_strandedness)
            .read_subset(self.read_subset);
        if let Some(adapters) = &self.adapters {
            builder.adapters(expand_path(adapters)?);
        }
        if let Some(genome_fasta) = &self.genome_fasta {
            builder.genome_fasta(expand_path(genome_fasta)?);
        }
        if let Some(gene_model) = &self.gene_model {
            builder.gene_model(expand_path(gene_model)?);
        }
        if let Some(protein_fasta) = &self.protein_fasta {
            builder.protein_fasta(expand_path(protein_fasta)?);
        }
        Ok(builder)
    }
}
