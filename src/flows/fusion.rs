//! Implementation of the `fusion` subcommand.

use std::path::{Path, PathBuf};

use crate::{
    common::expand_path,
    err::{ConfigError, StageError},
    flows::{
        build_aligner_index, prepare_reference, sample_dir, trim, with_runner, write_snapshot,
        AlignerIndex, FlowOutcome,
    },
    pipeline::{
        params::{validate, Command, FastqSet, ParamArgs, PipelineParameters},
        stage::StageRunner,
    },
    tools::{
        align::StarAlign,
        fusion::{fusion_predictions, star_fusion},
    },
};

/// Command line arguments for the `fusion` subcommand.
#[derive(Debug, clap::Parser)]
#[command(author, version, about = "Call gene fusions with STAR-Fusion", long_about = None)]
pub struct Args {
    #[command(flatten)]
    pub params: ParamArgs,
    /// CTAT genome library for STAR-Fusion.
    #[arg(long)]
    pub fusion_library: String,
}

/// Align `fastqs` in chimeric mode and call fusions from the junctions.
pub fn call_fusions(
    runner: &StageRunner,
    params: &PipelineParameters,
    index_dir: &Path,
    library: &Path,
    sample: &str,
    fastqs: &FastqSet,
    out_dir: &Path,
) -> Result<PathBuf, StageError> {
    let align = StarAlign {
        fastqs,
        index_dir,
        out_prefix: out_dir.join(format!("{}.chimeric.", sample)),
        threads: params.threads,
        two_pass: true,
        chimeric: true,
    };
    runner.run(&align.request())?;

    let fusion_dir = out_dir.join("star-fusion");
    runner.run(&star_fusion(
        library,
        &align.chimeric_junctions(),
        &fusion_dir,
        params.threads,
    ))?;
    Ok(fusion_predictions(&fusion_dir))
}

/// Run the fusion flow for `params`.
pub fn run_flow(runner: &StageRunner, params: &PipelineParameters) -> Result<FlowOutcome, anyhow::Error> {
    validate(Command::Fusion, params)?;
    let library = params
        .fusion_library
        .as_deref()
        .ok_or(ConfigError::MissingFusionLibrary)?;
    write_snapshot(runner, params)?;

    let reference = prepare_reference(runner, params)?;
    let AlignerIndex::Star(index_dir) = build_aligner_index(runner, params, &reference)? else {
        anyhow::bail!("fusion calling requires a STAR index");
    };

    let mut artifacts = Vec::new();
    for fastqs in &params.fastqs {
        let sample = fastqs.prefix();
        let out_dir = sample_dir(params, fastqs);
        let reads = trim(runner, params, fastqs, &out_dir)?;
        artifacts.push(call_fusions(
            runner, params, &index_dir, library, &sample, &reads, &out_dir,
        )?);
    }
    Ok(FlowOutcome::new(runner, artifacts))
}

/// Main entry point for the `fusion` subcommand.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let mut builder = args.params.to_builder()?;
    builder.fusion_library(expand_path(&args.fusion_library)?);
    let params = builder.build()?;
    with_runner(&args.params.run, &params.analysis_dir, |runner| {
        run_flow(runner, &params)
    })?;
    Ok(())
}
