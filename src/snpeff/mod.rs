//! Interpretation of snpEff annotations.

use std::collections::HashSet;

use crate::{
    common::expand_path,
    reference::bad_protein_accessions,
    snpeff::vcf::{interpret_vcf, write_impact_summary, write_translatable_tsv},
    tools::with_suffix,
};

pub mod ann;
pub mod vcf;

/// Command line arguments for the `interpret-ann` subcommand.
#[derive(Debug, clap::Parser)]
#[command(author, version, about = "Write the translatable snpEff annotations of a VCF file", long_about = None)]
pub struct Args {
    /// snpEff-annotated VCF file.
    #[arg(long)]
    pub path_input: String,
    /// Protein FASTA; transcripts of proteins with `X` or `*` are excluded.
    #[arg(long)]
    pub path_protein_fasta: Option<String>,
    /// Output TSV; the impact summary is written next to it as `.impact.json`.
    #[arg(long)]
    pub path_output: String,
}

/// Main entry point for the `interpret-ann` subcommand.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let bad_accessions = match &args.path_protein_fasta {
        Some(path) => bad_protein_accessions(&expand_path(path)?)?,
        None => HashSet::new(),
    };
    let interpretation = interpret_vcf(&expand_path(&args.path_input)?, &bad_accessions)?;

    let output = expand_path(&args.path_output)?;
    write_translatable_tsv(&output, &interpretation)?;
    write_impact_summary(&with_suffix(&output.with_extension(""), ".impact.json"), &interpretation)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::snpeff::vcf::{test::ANNOTATED_VCF, ImpactSummary};

    #[test]
    fn run_with_bad_proteins() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let vcf = tmp_dir.join("sample.vcf");
        std::fs::write(&vcf, ANNOTATED_VCF)?;
        let proteins = tmp_dir.join("pep.all.fa");
        std::fs::write(
            &proteins,
            ">ENSP03.1 pep:known transcript:ENST03 gene:ENSG02\nMK*L\n",
        )?;
        let args = Args {
            path_input: vcf.to_string_lossy().into_owned(),
            path_protein_fasta: Some(proteins.to_string_lossy().into_owned()),
            path_output: tmp_dir.join("out/sample.tsv").to_string_lossy().into_owned(),
        };
        std::fs::create_dir_all(tmp_dir.join("out"))?;

        run(&crate::common::Args::default(), &args)?;

        let tsv = std::fs::read_to_string(tmp_dir.join("out/sample.tsv"))?;
        assert_eq!(tsv.lines().count(), 3);
        assert!(!tsv.contains("ENST03"));
        let summary: ImpactSummary = serde_json::from_reader(std::fs::File::open(
            tmp_dir.join("out/sample.impact.json"),
        )?)?;
        assert_eq!(summary.excluded, 2);
        assert_eq!(summary.unknown_effects, vec!["made_up_effect".to_string()]);
        Ok(())
    }
}
