//! Implementation of the `lncrna` subcommand.

use crate::{
    common::expand_path,
    contigs::{translate_leading_column, translated_path, BlankLinePolicy, ChromosomeMapping, Direction},
    err::ConfigError,
    flows::{
        align, build_aligner_index, prepare_reference, resolve_strandedness, sample_dir, trim,
        with_runner, write_snapshot, FlowOutcome,
    },
    pipeline::{
        gate::is_present,
        params::{validate, Command, ParamArgs, PipelineParameters},
        stage::StageRunner,
    },
    tools::{
        assemble::{assemble, merge},
        intervals::{bed12_path, gene_model_to_bed12},
        lncrna::Slncky,
    },
};

/// Command line arguments for the `lncrna` subcommand.
#[derive(Debug, clap::Parser)]
#[command(author, version, about = "Classify long non-coding RNAs with slncky", long_about = None)]
pub struct Args {
    #[command(flatten)]
    pub params: ParamArgs,
    /// Directory with slncky's `annotations.config` and annotation files.
    #[arg(long)]
    pub slncky_annotations: String,
}

/// Run the lncRNA flow for `params`.
pub fn run_flow(runner: &StageRunner, params: &PipelineParameters) -> Result<FlowOutcome, anyhow::Error> {
    validate(Command::Lncrna, params)?;
    let annotations_dir = params
        .slncky_annotations
        .as_deref()
        .ok_or(ConfigError::MissingSlnckyAnnotations)?;
    write_snapshot(runner, params)?;

    let reference = prepare_reference(runner, params)?;
    let index = build_aligner_index(runner, params, &reference)?;

    let mut assemblies = Vec::new();
    for fastqs in &params.fastqs {
        let sample = fastqs.prefix();
        let out_dir = sample_dir(params, fastqs);
        let strandedness =
            resolve_strandedness(runner, params, &reference, &index, &sample, fastqs, &out_dir)?;
        let reads = trim(runner, params, fastqs, &out_dir)?;
        let bam = align(runner, params, &index, &sample, &reads, &out_dir)?;

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

    let lncrna_dir = params.analysis_dir.join("lncrna");
    let merged = lncrna_dir.join("stringtie.merged.gtf");
    runner.run(&merge(
        &assemblies,
        &reference.gene_model,
        &merged,
        params.threads,
    ))?;
    runner.run(&gene_model_to_bed12(&merged))?;

    // slncky only knows UCSC contig names.
    let bed12 = bed12_path(&merged);
    let ucsc_bed12 = translated_path(&bed12, Direction::EnsemblToUcsc);
    if runner.is_dry_run() {
        tracing::info!("dry run, not translating {:?}", &bed12);
    } else if is_present(&ucsc_bed12) {
        tracing::info!("translated transcripts {:?} already present", &ucsc_bed12);
    } else {
        let translated = translate_leading_column(
            &bed12,
            &ChromosomeMapping::load(reference.release),
            Direction::EnsemblToUcsc,
            BlankLinePolicy::Skip,
        )?;
        tracing::info!(
            "translated {} transcripts to UCSC names, dropped {} on unknown contigs",
            translated.written,
            translated.dropped
        );
    }

    let slncky = Slncky {
        bed12: &ucsc_bed12,
        annotations_dir,
        release: reference.release,
        out_prefix: lncrna_dir.join("lncRNA"),
        threads: params.threads,
    };
    runner.run(&slncky.request())?;

    Ok(FlowOutcome::new(
        runner,
        vec![slncky.lncs_bed(), slncky.lncs_info()],
    ))
}

/// Main entry point for the `lncrna` subcommand.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let mut builder = args.params.to_builder()?;
    builder.slncky_annotations(expand_path(&args.slncky_annotations)?);
    let params = builder.build()?;
    with_runner(&args.params.run, &params.analysis_dir, |runner| {
        run_flow(runner, &params)
    })?;
    Ok(())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        flows::test::{recording_executor, write_reads},
        pipeline::{gate::StageGate, params::test::params_in, params::ExperimentType},
    };

    const BED12: &str = "1\t0\t8\tT1\t0\t+\t0\t8\t0\t1\t8,\t0,\n\
        GL000192.1\t0\t8\tT2\t0\t+\t0\t8\t0\t1\t8,\t0,\n";

    #[test]
    fn lncrna_flow_translates_to_ucsc() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let annotations = tmp_dir.join("slncky");
        std::fs::create_dir_all(&annotations)?;
        std::fs::write(annotations.join("annotations.config"), "hg38\n")?;
        let params = params_in(&tmp_dir)
            .slncky_annotations(annotations)
            .build()?;
        write_reads(&params, 4)?;
        let executor = recording_executor().with_contents(".bed12", BED12);
        let runner = StageRunner::new(&executor, StageGate::new(&params.analysis_dir, false));

        let outcome = run_flow(&runner, &params)?;

        let lncrna_dir = tmp_dir.join("analysis/lncrna");
        assert_eq!(
            outcome.artifacts,
            vec![
                lncrna_dir.join("lncRNA.lncs.bed"),
                lncrna_dir.join("lncRNA.lncs.info.txt")
            ]
        );
        assert_eq!(
            std::fs::read_to_string(lncrna_dir.join("stringtie.merged.ucsc.bed12"))?,
            "chr1\t0\t8\tT1\t0\t+\t0\t8\t0\t1\t8,\t0,\n"
        );
        let slncky = executor
            .requests
            .lock()
            .expect("poisoned")
            .iter()
            .find(|r| r.name == "slncky")
            .map(|r| r.command_line())
            .expect("slncky ran");
        assert!(slncky.contains("stringtie.merged.ucsc.bed12 hg38"));
        Ok(())
    }

    #[test]
    fn lncrna_requires_rna_seq() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let params = params_in(&tmp_dir)
            .experiment_type(ExperimentType::ExomeSequencing)
            .build()?;
        let executor = recording_executor();
        let runner = StageRunner::new(&executor, StageGate::new(&params.analysis_dir, false));

        let err = run_flow(&runner, &params).expect_err("lncRNA needs RNA-seq");

        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::CommandRequiresRnaSeq("lncrna".into()))
        );
        assert_eq!(runner.invocations(), 0);
        Ok(())
    }
}
