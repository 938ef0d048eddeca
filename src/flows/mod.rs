//! The pipeline flows and the primitives they share.
//!
//! Every flow validates its parameters first, then resolves the reference and
//! runs its stages through a `StageRunner`.  Native steps (reordering the
//! genome, filtering the gene model, interpreting annotations) are skipped in
//! dry runs because their inputs are never produced.

use std::path::{Path, PathBuf};

use itertools::Itertools;

use crate::{
    common::GenomeRelease,
    contigs::ChromosomeMapping,
    err::StageError,
    pipeline::{
        gate::{is_present, StageGate},
        params::{fastq_stem, FastqSet, PipelineParameters},
        stage::{DryRunExecutor, ProcessExecutor, RunArgs, StageRunner},
        strandedness::{parse_infer_experiment, subset_fastq, Strandedness, StrandednessState},
    },
    reference::{
        download_requests,
        gene_model::{filter_gene_model, gene_model_contigs},
        karyotype::{genome_contigs, normalize_karyotypic_order},
        prepare_genome_indices, ReferenceBuild,
    },
    tools::{
        align::{hisat2_align, hisat2_build, star_genome_generate, StarAlign},
        intervals::{bed12_path, gene_model_to_bed12},
        strand::infer_experiment,
        trim::Trim,
    },
};

pub mod fusion;
pub mod lncrna;
pub mod quantify;
pub mod reference;
pub mod sample_db;
pub mod strandedness;

/// What a flow produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct FlowOutcome {
    /// Final artifacts of the flow.
    pub artifacts: Vec<PathBuf>,
    /// Number of stages handed to the executor.
    pub invocations: usize,
    /// Number of stages skipped because their outputs were present.
    pub skipped: usize,
}

impl FlowOutcome {
    pub fn new(runner: &StageRunner, artifacts: Vec<PathBuf>) -> Self {
        Self {
            artifacts,
            invocations: runner.invocations(),
            skipped: runner.skipped(),
        }
    }

    fn log(&self) {
        tracing::info!(
            "{} stage(s) run, {} skipped",
            self.invocations,
            self.skipped
        );
        for artifact in &self.artifacts {
            tracing::info!("  {:?}", artifact);
        }
    }
}

/// Run `flow` with the executor selected on the command line.
pub fn with_runner<F>(
    run_args: &RunArgs,
    analysis_dir: &Path,
    flow: F,
) -> Result<FlowOutcome, anyhow::Error>
where
    F: FnOnce(&StageRunner) -> Result<FlowOutcome, anyhow::Error>,
{
    let gate = StageGate::new(analysis_dir, run_args.verify_markers);
    let outcome = if run_args.dry_run {
        let executor = DryRunExecutor::default();
        flow(&StageRunner::new(&executor, gate))?
    } else {
        flow(&StageRunner::new(&ProcessExecutor, gate))?
    };
    outcome.log();
    crate::common::trace_rss_now();
    Ok(outcome)
}

/// Write the parameter snapshot unless this is a dry run.
pub fn write_snapshot(runner: &StageRunner, params: &PipelineParameters) -> Result<(), anyhow::Error> {
    if !runner.is_dry_run() {
        let path = params.write_snapshot()?;
        tracing::debug!("wrote parameters to {:?}", path);
    }
    Ok(())
}

/// The reference after download and normalization.
#[derive(Debug, Clone)]
pub struct PreparedReference {
    pub build: ReferenceBuild,
    pub release: GenomeRelease,
    /// Genome in karyotypic order.
    pub genome: PathBuf,
    /// Gene model restricted to the contigs of `genome`.
    pub gene_model: PathBuf,
    /// Contigs of `genome` in file order; empty in dry runs.
    pub contigs: Vec<String>,
}

/// Resolve, download and normalize the reference of `params`.
pub fn prepare_reference(
    runner: &StageRunner,
    params: &PipelineParameters,
) -> Result<PreparedReference, anyhow::Error> {
    let build = ReferenceBuild::resolve(&params.reference, &params.reference_dir).with_overrides(
        params.genome_fasta.as_deref(),
        params.gene_model.as_deref(),
        params.protein_fasta.as_deref(),
    );
    let release = build.ensure_valid()?;
    runner.run_all(&download_requests(&build))?;

    if runner.is_dry_run() {
        runner.run_all(&prepare_genome_indices(&build.genome_fasta))?;
        return Ok(PreparedReference {
            genome: build.genome_fasta.clone(),
            gene_model: build.gene_model().to_path_buf(),
            contigs: Vec::new(),
            build,
            release,
        });
    }

    let genome = normalize_karyotypic_order(&build.genome_fasta)?.path;
    let contigs = genome_contigs(&genome)?;

    let model_contigs = gene_model_contigs(build.gene_model())?;
    let uncovered = ChromosomeMapping::load(release).uncovered(model_contigs.iter().map(String::as_str));
    if !uncovered.is_empty() {
        tracing::warn!(
            "{} gene model contig(s) are unknown to the {} name mapping: {}",
            uncovered.len(),
            release.name(),
            uncovered.iter().join(", ")
        );
    }
    let filtered = filter_gene_model(build.gene_model(), &contigs)?;
    if !filtered.dropped_contigs.is_empty() {
        tracing::info!(
            "dropped gene model records on {}",
            filtered.dropped_contigs.iter().join(", ")
        );
    }

    runner.run_all(&prepare_genome_indices(&genome))?;
    Ok(PreparedReference {
        build,
        release,
        genome,
        gene_model: filtered.path,
        contigs,
    })
}

/// Index used for read alignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlignerIndex {
    /// STAR index directory, for RNA-seq.
    Star(PathBuf),
    /// hisat2 index prefix, for DNA.
    Hisat2(PathBuf),
}

/// Build the aligner index fitting the experiment type next to the genome.
pub fn build_aligner_index(
    runner: &StageRunner,
    params: &PipelineParameters,
    reference: &PreparedReference,
) -> Result<AlignerIndex, StageError> {
    if params.experiment_type.is_rna_seq() {
        let index_dir = reference.genome.with_extension("star");
        runner.run(&star_genome_generate(
            &reference.genome,
            &reference.gene_model,
            &index_dir,
            params.threads,
        ))?;
        Ok(AlignerIndex::Star(index_dir))
    } else {
        let prefix = reference.genome.with_extension("hisat2");
        runner.run(&hisat2_build(&reference.genome, &prefix, params.threads))?;
        Ok(AlignerIndex::Hisat2(prefix))
    }
}

/// Output directory of the sample with reads `fastqs`.
pub fn sample_dir(params: &PipelineParameters, fastqs: &FastqSet) -> PathBuf {
    params.analysis_dir.join(fastqs.prefix())
}

/// Trim `fastqs` into `out_dir`; without adapters the reads are used as is.
pub fn trim(
    runner: &StageRunner,
    params: &PipelineParameters,
    fastqs: &FastqSet,
    out_dir: &Path,
) -> Result<FastqSet, StageError> {
    let Some(adapters) = params.adapters.as_deref() else {
        tracing::info!("no adapters given, not trimming {}", fastqs.prefix());
        return Ok(fastqs.clone());
    };
    let trim = Trim {
        fastqs,
        adapters,
        out_dir,
        threads: params.threads,
    };
    runner.run(&trim.request())?;
    Ok(trim.trimmed().fastqs)
}

/// Align the reads of `sample` and return the coordinate-sorted BAM.
pub fn align(
    runner: &StageRunner,
    params: &PipelineParameters,
    index: &AlignerIndex,
    sample: &str,
    fastqs: &FastqSet,
    out_dir: &Path,
) -> Result<PathBuf, StageError> {
    match index {
        AlignerIndex::Star(index_dir) => {
            let align = StarAlign {
                fastqs,
                index_dir,
                out_prefix: out_dir.join(format!("{}.", sample)),
                threads: params.threads,
                two_pass: true,
                chimeric: false,
            };
            runner.run(&align.request())?;
            Ok(align.bam())
        }
        AlignerIndex::Hisat2(index_prefix) => {
            let bam = out_dir.join(format!("{}.hisat2.bam", sample));
            runner.run(&hisat2_align(fastqs, index_prefix, &bam, params.threads))?;
            Ok(bam)
        }
    }
}

/// Strandedness of `sample`, inferring it from a read subset if requested.
pub fn resolve_strandedness(
    runner: &StageRunner,
    params: &PipelineParameters,
    reference: &PreparedReference,
    index: &AlignerIndex,
    sample: &str,
    fastqs: &FastqSet,
    out_dir: &Path,
) -> Result<Strandedness, anyhow::Error> {
    let state = StrandednessState::from_flags(params.strand_specific, params.infer_strandedness);
    if state.needs_inference() {
        if runner.is_dry_run() {
            tracing::info!("dry run, assuming {} is unstranded", sample);
            return Ok(Strandedness::None);
        }
        if let AlignerIndex::Hisat2(_) = index {
            tracing::warn!(
                "strandedness of {} can only be inferred for RNA-seq reads, assuming unstranded",
                sample
            );
            return Ok(Strandedness::None);
        }
    }
    let state = state.resolve(|| match index {
        AlignerIndex::Star(index_dir) => {
            infer_strandedness(runner, params, reference, index_dir, sample, fastqs, out_dir)
        }
        AlignerIndex::Hisat2(_) => Ok(Strandedness::None),
    })?;
    Ok(state.strandedness())
}

/// Align a subset of the reads and classify them with `infer_experiment.py`.
fn infer_strandedness(
    runner: &StageRunner,
    params: &PipelineParameters,
    reference: &PreparedReference,
    index_dir: &Path,
    sample: &str,
    fastqs: &FastqSet,
    out_dir: &Path,
) -> Result<Strandedness, anyhow::Error> {
    let dir = out_dir.join("strandedness");
    std::fs::create_dir_all(&dir)?;

    let subset_path = |path: &Path| dir.join(format!("{}.subset.fastq", fastq_stem(path)));
    let subset = FastqSet::new(
        subset_path(&fastqs.first),
        fastqs.second.as_deref().map(subset_path),
    );
    for (input, output) in fastqs.paths().into_iter().zip(subset.paths()) {
        if !is_present(output) {
            subset_fastq(input, output, params.read_subset)?;
        }
    }

    let align = StarAlign {
        fastqs: &subset,
        index_dir,
        out_prefix: dir.join(format!("{}.subset.", sample)),
        threads: params.threads,
        two_pass: false,
        chimeric: false,
    };
    runner.run(&align.request())?;
    runner.run(&gene_model_to_bed12(&reference.gene_model))?;

    let summary = dir.join(format!("{}.infer_experiment.txt", sample));
    runner.run(&infer_experiment(
        &align.bam(),
        &bed12_path(&reference.gene_model),
        &summary,
    ))?;
    let inferred = parse_infer_experiment(&std::fs::read_to_string(&summary)?)?;
    tracing::info!(
        "{}: {:.3} forward, {:.3} reverse, {:.3} undetermined",
        sample,
        inferred.forward,
        inferred.reverse,
        inferred.undetermined
    );
    Ok(inferred.strandedness)
}

/// Resolve the strandedness of every sample of `params`.
pub fn strandedness_per_sample(
    runner: &StageRunner,
    params: &PipelineParameters,
) -> Result<Vec<(String, Strandedness)>, anyhow::Error> {
    let reference = prepare_reference(runner, params)?;
    let index = build_aligner_index(runner, params, &reference)?;
    params
        .fastqs
        .iter()
        .map(|fastqs| {
            let sample = fastqs.prefix();
            let out_dir = sample_dir(params, fastqs);
            let strandedness =
                resolve_strandedness(runner, params, &reference, &index, &sample, fastqs, &out_dir)?;
            Ok::<_, anyhow::Error>((sample, strandedness))
        })
        .collect()
}

#[cfg(test)]
pub mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::pipeline::{params::test::params_in, stage::testing::RecordingExecutor};

    pub const GENOME: &str = ">1 dna:chromosome\nACGTACGT\n>2 dna:chromosome\nACGTACGT\n";
    pub const GTF: &str = "#!genome-build GRCh38\n\
        1\tensembl\tgene\t1\t8\t.\t+\t.\tgene_id \"G1\";\n\
        KI270721.1\tensembl\tgene\t1\t8\t.\t+\t.\tgene_id \"G2\";\n";
    pub const PROTEINS: &str = ">ENSP01 pep:known transcript:ENST01 gene:ENSG01\nMKVL\n\
        >ENSP09 pep:known transcript:ENST09 gene:ENSG09\nMKUL\n";
    pub const INFER_EXPERIMENT: &str = "This is PairEnd Data\n\
        Fraction of reads failed to determine: 0.0100\n\
        Fraction of reads explained by \"1++,1--,2+-,2-+\": 0.0200\n\
        Fraction of reads explained by \"1+-,1-+,2++,2--\": 0.9700\n";

    /// Executor faking reference files and tool outputs.
    pub fn recording_executor() -> RecordingExecutor {
        RecordingExecutor::default()
            .with_contents("pep.all.fa", PROTEINS)
            .with_contents(".fa", GENOME)
            .with_contents(".gtf", GTF)
            .with_contents("infer_experiment.txt", INFER_EXPERIMENT)
            .with_contents(
                ".snpEffAnnotated.vcf",
                crate::snpeff::vcf::test::ANNOTATED_VCF,
            )
    }

    /// Write paired FASTQ files with `reads` records for `params`.
    pub fn write_reads(params: &PipelineParameters, reads: usize) -> Result<(), anyhow::Error> {
        for fastqs in &params.fastqs {
            for path in fastqs.paths() {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let record = "@r\nACGT\n+\nIIII\n";
                std::fs::write(path, record.repeat(reads))?;
            }
        }
        Ok(())
    }

    #[test]
    fn prepare_reference_filters_gene_model() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let params = params_in(&tmp_dir).build()?;
        let executor = recording_executor();
        let runner = StageRunner::new(&executor, StageGate::new(&params.analysis_dir, false));

        let reference = prepare_reference(&runner, &params)?;

        assert_eq!(reference.release, GenomeRelease::Grch38);
        assert_eq!(reference.contigs, vec!["1", "2"]);
        assert_eq!(
            reference.genome,
            tmp_dir.join("reference/Homo_sapiens.GRCh38.dna.primary_assembly.fa")
        );
        assert_eq!(
            reference.gene_model,
            tmp_dir.join("reference/Homo_sapiens.GRCh38.81.filtered.gtf")
        );
        assert_eq!(
            std::fs::read_to_string(&reference.gene_model)?,
            "#!genome-build GRCh38\n1\tensembl\tgene\t1\t8\t.\t+\t.\tgene_id \"G1\";\n"
        );
        assert_eq!(
            executor.names(),
            vec![
                "download genome",
                "download gtf",
                "download gff3",
                "download proteins",
                "genome faidx",
                "genome dictionary"
            ]
        );
        Ok(())
    }

    #[test]
    fn prepare_reference_rejects_unknown_build() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let params = params_in(&tmp_dir).reference("hg19").build()?;
        let executor = recording_executor();
        let runner = StageRunner::new(&executor, StageGate::new(&params.analysis_dir, false));

        assert!(prepare_reference(&runner, &params).is_err());
        assert_eq!(runner.invocations(), 0);
        Ok(())
    }

    #[test]
    fn infer_strandedness_from_subset() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let params = params_in(&tmp_dir)
            .infer_strandedness(true)
            .read_subset(2usize)
            .build()?;
        write_reads(&params, 5)?;
        let executor = recording_executor();
        let runner = StageRunner::new(&executor, StageGate::new(&params.analysis_dir, false));

        let result = strandedness_per_sample(&runner, &params)?;

        assert_eq!(result, vec![("sample_1".to_string(), Strandedness::Reverse)]);
        let subset = tmp_dir.join("analysis/sample_1/strandedness/sample_1.subset.fastq");
        assert_eq!(std::fs::read_to_string(subset)?, "@r\nACGT\n+\nIIII\n".repeat(2));
        assert!(executor
            .names()
            .contains(&"infer experiment sample_1.subset.Aligned.sortedByCoord.out.bam".to_string()));
        Ok(())
    }

    #[test]
    fn explicit_strandedness_runs_nothing() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let params = params_in(&tmp_dir).strand_specific(true).build()?;
        let executor = recording_executor();
        let runner = StageRunner::new(&executor, StageGate::new(&params.analysis_dir, false));
        let reference = PreparedReference {
            build: ReferenceBuild::resolve("GRCh38", &params.reference_dir),
            release: GenomeRelease::Grch38,
            genome: tmp_dir.join("reference/genome.fa"),
            gene_model: tmp_dir.join("reference/genes.gtf"),
            contigs: Vec::new(),
        };

        let strandedness = resolve_strandedness(
            &runner,
            &params,
            &reference,
            &AlignerIndex::Star(tmp_dir.join("reference/genome.star")),
            "sample_1",
            &params.fastqs[0],
            &tmp_dir.join("analysis/sample_1"),
        )?;

        assert_eq!(strandedness, Strandedness::Forward);
        assert_eq!(runner.invocations(), 0);
        Ok(())
    }
}
