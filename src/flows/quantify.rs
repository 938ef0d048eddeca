//! Implementation of the `quantify` subcommand.

use crate::{
    flows::{
        prepare_reference, resolve_strandedness, sample_dir, trim, with_runner, write_snapshot,
        AlignerIndex, FlowOutcome,
    },
    pipeline::{
        params::{validate, Command, ParamArgs, PipelineParameters},
        stage::StageRunner,
    },
    tools::{
        quantify::{prepare_reference as rsem_prepare_reference, CalculateExpression},
        variants::{index_bam, sort_bam},
    },
};

/// Command line arguments for the `quantify` subcommand.
#[derive(Debug, clap::Parser)]
#[command(author, version, about = "Quantify transcript expression with RSEM", long_about = None)]
pub struct Args {
    #[command(flatten)]
    pub params: ParamArgs,
}

/// Run the quantification flow for `params`.
///
/// The STAR index built along with the RSEM reference also serves the
/// strandedness inference.
pub fn run_flow(runner: &StageRunner, params: &PipelineParameters) -> Result<FlowOutcome, anyhow::Error> {
    validate(Command::Quantify, params)?;
    write_snapshot(runner, params)?;

    let reference = prepare_reference(runner, params)?;
    let rsem_dir = reference.genome.with_extension("rsem");
    let rsem_prefix = rsem_dir.join("reference");
    runner.run(&rsem_prepare_reference(
        &reference.genome,
        &reference.gene_model,
        &rsem_prefix,
        params.threads,
    ))?;
    let index = AlignerIndex::Star(rsem_dir);

    let mut artifacts = Vec::new();
    for fastqs in &params.fastqs {
        let sample = fastqs.prefix();
        let out_dir = sample_dir(params, fastqs);
        let strandedness =
            resolve_strandedness(runner, params, &reference, &index, &sample, fastqs, &out_dir)?;
        let reads = trim(runner, params, fastqs, &out_dir)?;

        let quantify = CalculateExpression {
            fastqs: &reads,
            reference_prefix: &rsem_prefix,
            out_prefix: out_dir.join(&sample),
            threads: params.threads,
            strandedness,
            output_genome_bam: true,
        };
        runner.run(&quantify.request())?;
        let sorted = quantify.sorted_genome_bam();
        runner.run(&sort_bam(&quantify.genome_bam(), &sorted, params.threads))?;
        runner.run(&index_bam(&sorted))?;

        artifacts.extend([quantify.isoform_results(), quantify.gene_results(), sorted]);
    }
    Ok(FlowOutcome::new(runner, artifacts))
}

/// Main entry point for the `quantify` subcommand.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let params = args.params.to_builder()?.build()?;
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
        err::ConfigError,
        flows::test::{recording_executor, write_reads},
        pipeline::{gate::StageGate, params::test::params_in, params::ExperimentType},
    };

    #[test]
    fn quantify_with_inferred_strandedness() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let params = params_in(&tmp_dir)
            .infer_strandedness(true)
            .read_subset(2usize)
            .build()?;
        write_reads(&params, 4)?;
        let executor = recording_executor();
        let runner = StageRunner::new(&executor, StageGate::new(&params.analysis_dir, false));

        let outcome = run_flow(&runner, &params)?;

        let sample_dir = tmp_dir.join("analysis/sample_1");
        assert_eq!(
            outcome.artifacts,
            vec![
                sample_dir.join("sample_1.isoforms.results"),
                sample_dir.join("sample_1.genes.results"),
                sample_dir.join("sample_1.genome.sorted.bam"),
            ]
        );
        let requests = executor.requests.lock().expect("poisoned");
        let rsem = requests
            .iter()
            .find(|r| r.program == "rsem-calculate-expression")
            .map(|r| r.command_line())
            .expect("RSEM ran");
        assert!(rsem.contains("--strandedness reverse"));
        let subset_align = requests
            .iter()
            .find(|r| r.name.contains("subset"))
            .map(|r| r.command_line())
            .expect("subset was aligned");
        assert!(subset_align.contains(".rsem"));
        Ok(())
    }

    #[test]
    fn quantify_rejects_wgs() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let params = params_in(&tmp_dir)
            .experiment_type(ExperimentType::WholeGenomeSequencing)
            .build()?;
        let executor = recording_executor();
        let runner = StageRunner::new(&executor, StageGate::new(&params.analysis_dir, false));

        let err = run_flow(&runner, &params).expect_err("quantification needs RNA-seq");

        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::CommandRequiresRnaSeq("quantify".into()))
        );
        assert!(!tmp_dir.join("analysis/parameters.json").exists());
        Ok(())
    }
}
