//! Implementation of the `strandedness` subcommand.

use console::Term;

use crate::{
    flows::{strandedness_per_sample, with_runner, FlowOutcome},
    pipeline::{
        params::{validate, Command, ParamArgs, PipelineParameters},
        stage::StageRunner,
        strandedness::Strandedness,
    },
};

/// Command line arguments for the `strandedness` subcommand.
#[derive(Debug, clap::Parser)]
#[command(author, version, about = "Infer the library strandedness of RNA-seq reads", long_about = None)]
pub struct Args {
    #[command(flatten)]
    pub params: ParamArgs,
}

/// Infer the strandedness of every sample and write one line per sample.
pub fn run_flow(
    runner: &StageRunner,
    params: &PipelineParameters,
    out: &Term,
) -> Result<Vec<(String, Strandedness)>, anyhow::Error> {
    validate(Command::Strandedness, params)?;
    let result = strandedness_per_sample(runner, params)?;
    for (sample, strandedness) in &result {
        out.write_line(&format!("{}\t{}", sample, strandedness))?;
    }
    Ok(result)
}

/// Main entry point for the `strandedness` subcommand.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let mut builder = args.params.to_builder()?;
    builder.infer_strandedness(true);
    let params = builder.build()?;
    let term = Term::stdout();
    with_runner(&args.params.run, &params.analysis_dir, |runner| {
        run_flow(runner, &params, &term)?;
        Ok(FlowOutcome::new(runner, Vec::new()))
    })?;
    Ok(())
}
