//! Implementation of the `proteins` subcommand: from reads to the annotated
//! variants a sample-specific protein database is assembled from.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use crate::{
    common::expand_path,
    flows::{
        align, build_aligner_index, fusion::call_fusions, prepare_reference,
        resolve_strandedness, sample_dir, trim, with_runner, write_snapshot, AlignerIndex,
        FlowOutcome, PreparedReference,
    },
    pipeline::{
        gate::is_present,
        params::{validate, Command, ParamArgs, PipelineParameters},
        stage::StageRunner,
    },
    reference::{
        important_protein_accessions, known_sites_requests, write_selenocysteine_fasta,
        ProteinAccessions,
    },
    snpeff::vcf::{interpret_vcf, write_impact_summary, write_translatable_tsv},
    tools::{
        annotate::SnpEffAnnotate,
        assemble::{assemble, merge},
        variants::{
            add_read_groups, apply_bqsr, base_recalibrator, haplotype_caller, index_bam,
            mark_duplicates, merge_vcfs, shard_contigs, split_n_cigar_reads,
        },
        with_suffix,
    },
};

/// Command line arguments for the `proteins` subcommand.
#[derive(Debug, clap::Parser)]
#[command(author, version, about = "Call and annotate sample variants for a protein database", long_about = None)]
pub struct Args {
    #[command(flatten)]
    pub params: ParamArgs,
    /// Stop after the alignment.
    #[arg(long)]
    pub skip_variant_analysis: bool,
    /// Assemble novel isoforms with stringtie (RNA-seq only).
    #[arg(long)]
    pub do_isoform_analysis: bool,
    /// Call gene fusions with STAR-Fusion (RNA-seq only).
    #[arg(long)]
    pub do_fusion_analysis: bool,
    /// Run snpEff without writing its HTML summary.
    #[arg(long)]
    pub quick_snpeff_without_stats: bool,
    /// Known variant sites for base quality recalibration; the Ensembl
    /// variation VCF of the build is downloaded without.
    #[arg(long)]
    pub known_sites: Option<String>,
    /// CTAT genome library for STAR-Fusion.
    #[arg(long)]
    pub fusion_library: Option<String>,
}

impl Args {
    fn to_params(&self) -> Result<PipelineParameters, anyhow::Error> {
        let mut builder = self.params.to_builder()?;
        builder
            .skip_variant_analysis(self.skip_variant_analysis)
            .do_isoform_analysis(self.do_isoform_analysis)
            .do_fusion_analysis(self.do_fusion_analysis)
            .quick_snpeff_without_stats(self.quick_snpeff_without_stats);
        if let Some(known_sites) = &self.known_sites {
            builder.known_sites(expand_path(known_sites)?);
        }
        if let Some(fusion_library) = &self.fusion_library {
            builder.fusion_library(expand_path(fusion_library)?);
        }
        Ok(builder.build()?)
    }
}

/// Call, annotate and interpret the variants in `bam`.
///
/// Base qualities are recalibrated when `known_sites` are given.  Returns the
/// annotated VCF followed by the translatable TSV and impact summary (the
/// latter two not in dry runs).
#[allow(clippy::too_many_arguments)]
fn call_variants(
    runner: &StageRunner,
    params: &PipelineParameters,
    reference: &PreparedReference,
    known_sites: Option<&Path>,
    bad_accessions: &HashSet<String>,
    sample: &str,
    bam: &Path,
    out_dir: &Path,
) -> Result<Vec<PathBuf>, anyhow::Error> {
    let prefix = out_dir.join(sample);
    let rna_seq = params.experiment_type.is_rna_seq();

    let grouped = with_suffix(&prefix, ".rg.bam");
    let deduplicated = with_suffix(&prefix, ".dedup.bam");
    runner.run_all(&[
        add_read_groups(bam, &grouped, sample),
        mark_duplicates(
            &grouped,
            &deduplicated,
            &with_suffix(&prefix, ".dedup.metrics.txt"),
        ),
        index_bam(&deduplicated),
    ])?;
    let mut current = deduplicated;
    if rna_seq {
        let split = with_suffix(&prefix, ".split.bam");
        runner.run(&split_n_cigar_reads(&reference.genome, &current, &split))?;
        current = split;
    }
    if let Some(known_sites) = known_sites {
        let table = with_suffix(&prefix, ".recal.table");
        let recalibrated = with_suffix(&prefix, ".recal.bam");
        runner.run_all(&[
            base_recalibrator(&reference.genome, &current, known_sites, &table),
            apply_bqsr(&reference.genome, &current, &table, &recalibrated),
        ])?;
        current = recalibrated;
    }

    let (calls, requests): (Vec<_>, Vec<_>) = shard_contigs(&reference.contigs)
        .iter()
        .map(|shard| {
            let output = with_suffix(&prefix, &format!(".{}.vcf", shard.name));
            let request = haplotype_caller(&reference.genome, &current, shard, &output, rna_seq);
            (output, request)
        })
        .unzip();
    runner.run_parallel(&requests, params.variant_calling_workers)?;
    let merged = with_suffix(&prefix, ".vcf");
    runner.run(&merge_vcfs(&calls, &merged))?;

    let annotate = SnpEffAnnotate {
        release: reference.release,
        input: &merged,
        out_prefix: prefix.clone(),
        no_stats: params.quick_snpeff_without_stats,
    };
    runner.run(&annotate.request())?;
    let annotated = annotate.vcf();
    if runner.is_dry_run() {
        return Ok(vec![annotated]);
    }

    let tsv = with_suffix(&prefix, ".translatable.tsv");
    let summary = with_suffix(&prefix, ".impact.json");
    if is_present(&tsv) && is_present(&summary) {
        tracing::info!("skipping interpretation of {:?}, outputs present", &annotated);
    } else {
        let interpretation = interpret_vcf(&annotated, bad_accessions)?;
        write_translatable_tsv(&tsv, &interpretation)?;
        write_impact_summary(&summary, &interpretation)?;
    }
    Ok(vec![annotated, tsv, summary])
}

/// Run the sample database flow for `params`.
pub fn run_flow(runner: &StageRunner, params: &PipelineParameters) -> Result<FlowOutcome, anyhow::Error> {
    validate(Command::Proteins, params)?;
    write_snapshot(runner, params)?;

    let reference = prepare_reference(runner, params)?;
    let index = build_aligner_index(runner, params, &reference)?;
    let known_sites = match (&params.known_sites, params.skip_variant_analysis) {
        (_, true) => None,
        (Some(path), false) => Some(path.clone()),
        (None, false) => {
            runner.run_all(&known_sites_requests(&reference.build))?;
            reference.build.known_sites.as_ref().map(|d| d.path.clone())
        }
    };
    let accessions = if runner.is_dry_run() || params.skip_variant_analysis {
        ProteinAccessions::default()
    } else {
        important_protein_accessions(&reference.build.protein_fasta)?
    };

    let mut artifacts = Vec::new();
    let mut assemblies = Vec::new();
    for fastqs in &params.fastqs {
        let sample = fastqs.prefix();
        let out_dir = sample_dir(params, fastqs);
        tracing::info!("processing sample {}", &sample);

        let strandedness =
            resolve_strandedness(runner, params, &reference, &index, &sample, fastqs, &out_dir)?;
        let reads = trim(runner, params, fastqs, &out_dir)?;
        let bam = align(runner, params, &index, &sample, &reads, &out_dir)?;

        if params.skip_variant_analysis {
            artifacts.push(bam.clone());
        } else {
            artifacts.extend(call_variants(
                runner,
                params,
                &reference,
                known_sites.as_deref(),
                &accessions.bad,
                &sample,
                &bam,
                &out_dir,
            )?);
        }
        if params.do_isoform_analysis {
            let gtf = out_dir.join(format!("{}.stringtie.gtf", sample));
            runner.run(&assemble(
                &bam,
                &reference.gene_model,
                &gtf,
                params.threads,
                strandedness,
            ))?;
            assemblies.push(gtf);
        }
        if params.do_fusion_analysis {
            if let (AlignerIndex::Star(index_dir), Some(library)) =
                (&index, params.fusion_library.as_deref())
            {
                artifacts.push(call_fusions(
                    runner, params, index_dir, library, &sample, &reads, &out_dir,
                )?);
            }
        }
    }

    if !assemblies.is_empty() {
        let merged = params.analysis_dir.join("stringtie.merged.gtf");
        runner.run(&merge(
            &assemblies,
            &reference.gene_model,
            &merged,
            params.threads,
        ))?;
        artifacts.push(merged);
    }
    if !accessions.selenocysteine.is_empty() {
        artifacts.push(write_selenocysteine_fasta(
            &reference.build.protein_fasta,
            &accessions,
        )?);
    }

    Ok(FlowOutcome::new(runner, artifacts))
}

/// Main entry point for the `proteins` subcommand.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    let before_anything = std::time::Instant::now();
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let params = args.to_params()?;
    with_runner(&args.params.run, &params.analysis_dir, |runner| {
        run_flow(runner, &params)
    })?;

    tracing::info!(
        "All of `proteins` completed in {:?}",
        before_anything.elapsed()
    );
    Ok(())
}
