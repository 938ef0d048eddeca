//! Implementation of the `reference` subcommand.

use crate::{
    common::expand_path,
    flows::{build_aligner_index, prepare_reference, with_runner, AlignerIndex, FlowOutcome},
    pipeline::{
        params::{ExperimentType, PipelineParameters, PipelineParametersBuilder},
        stage::{RunArgs, StageRunner},
    },
};

/// Command line arguments for the `reference` subcommand.
#[derive(Debug, clap::Parser)]
#[command(author, version, about = "Download and prepare a reference build", long_about = None)]
pub struct Args {
    /// Directory for downloaded and derived reference files.
    #[arg(long)]
    pub reference_dir: String,
    /// Reference build, GRCh37 or GRCh38.
    #[arg(long, default_value = "GRCh38")]
    pub reference: String,
    /// Build the aligner index for this kind of experiment.
    #[arg(long, value_enum, default_value_t = ExperimentType::RnaSequencing)]
    pub experiment_type: ExperimentType,
    /// Threads per external tool.
    #[arg(long, default_value_t = 1)]
    pub threads: usize,
    /// Use this genome FASTA instead of the Ensembl one.
    #[arg(long)]
    pub genome_fasta: Option<String>,
    /// Use this gene model instead of the Ensembl one.
    #[arg(long)]
    pub gene_model: Option<String>,

    #[command(flatten)]
    pub run: RunArgs,
}

impl Args {
    /// Parameters with the reference directory doubling as analysis directory.
    fn to_params(&self) -> Result<PipelineParameters, anyhow::Error> {
        let reference_dir = expand_path(&self.reference_dir)?;
        let mut builder = PipelineParametersBuilder::default();
        builder
            .analysis_dir(reference_dir.clone())
            .reference_dir(reference_dir)
            .reference(self.reference.clone())
            .experiment_type(self.experiment_type)
            .threads(self.threads);
        if let Some(genome_fasta) = &self.genome_fasta {
            builder.genome_fasta(expand_path(genome_fasta)?);
        }
        if let Some(gene_model) = &self.gene_model {
            builder.gene_model(expand_path(gene_model)?);
        }
        Ok(builder.build()?)
    }
}

/// Prepare the reference of `params` without touching any reads.
pub fn run_flow(runner: &StageRunner, params: &PipelineParameters) -> Result<FlowOutcome, anyhow::Error> {
    if params.threads == 0 {
        return Err(crate::err::ConfigError::InvalidThreadCount.into());
    }
    let reference = prepare_reference(runner, params)?;
    let index = match build_aligner_index(runner, params, &reference)? {
        AlignerIndex::Star(path) | AlignerIndex::Hisat2(path) => path,
    };
    Ok(FlowOutcome::new(
        runner,
        vec![reference.genome, reference.gene_model, index],
    ))
}

/// Main entry point for the `reference` subcommand.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let params = args.to_params()?;
    with_runner(&args.run, &params.analysis_dir, |runner| {
        run_flow(runner, &params)
    })?;
    Ok(())
}

#[cfg(test)]
mod test {
    use clap::Parser;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        err::ConfigError,
        flows::test::recording_executor,
        pipeline::{gate::StageGate, params::test::params_in},
    };

    #[test]
    fn prepare_grch38_for_rna_seq() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let params = params_in(&tmp_dir).build()?;
        let executor = recording_executor();
        let runner = StageRunner::new(&executor, StageGate::new(&params.analysis_dir, false));

        let outcome = run_flow(&runner, &params)?;

        let reference_dir = tmp_dir.join("reference");
        assert_eq!(
            outcome.artifacts,
            vec![
                reference_dir.join("Homo_sapiens.GRCh38.dna.primary_assembly.fa"),
                reference_dir.join("Homo_sapiens.GRCh38.81.filtered.gtf"),
                reference_dir.join("Homo_sapiens.GRCh38.dna.primary_assembly.star"),
            ]
        );

        let rerun = StageRunner::new(&executor, StageGate::new(&params.analysis_dir, false));
        let outcome = run_flow(&rerun, &params)?;
        assert_eq!(outcome.invocations, 0);
        Ok(())
    }

    #[test]
    fn unsupported_build_runs_nothing() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let params = params_in(&tmp_dir).reference("hg18").build()?;
        let executor = recording_executor();
        let runner = StageRunner::new(&executor, StageGate::new(&params.analysis_dir, false));

        let err = run_flow(&runner, &params).expect_err("hg18 is not supported");

        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::UnsupportedReference("hg18".into()))
        );
        assert_eq!(runner.invocations(), 0);
        Ok(())
    }

    #[test]
    fn args_to_params() -> Result<(), anyhow::Error> {
        let args = Args::try_parse_from([
            "reference",
            "--reference-dir",
            "/data/ref",
            "--reference",
            "GRCh37",
            "--experiment-type",
            "whole-genome-sequencing",
        ])?;

        let params = args.to_params()?;

        assert_eq!(params.analysis_dir, params.reference_dir);
        assert_eq!(params.reference, "GRCh37");
        assert_eq!(params.experiment_type, ExperimentType::WholeGenomeSequencing);
        Ok(())
    }
}
