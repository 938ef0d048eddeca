//! Gene model to BED12 conversion with the UCSC utilities.

use std::path::{Path, PathBuf};

use crate::{
    pipeline::stage::StageRequest,
    tools::{bash_request, is_gff3, shell_path},
};

/// BED12 path for `gene_model`: `<dir>/<stem>.bed12`.
pub fn bed12_path(gene_model: &Path) -> PathBuf {
    gene_model.with_extension("bed12")
}

/// Convert `gene_model` to BED12 via genePred.
pub fn gene_model_to_bed12(gene_model: &Path) -> StageRequest {
    let bed = bed12_path(gene_model);
    let to_gene_pred = if is_gff3(gene_model) {
        "gff3ToGenePred"
    } else {
        "gtfToGenePred"
    };
    let script = format!(
        "{} {} /dev/stdout | genePredToBed /dev/stdin /dev/stdout",
        to_gene_pred,
        shell_path(gene_model),
    );
    bash_request(
        format!("BED12 {}", gene_model.to_string_lossy()),
        &script,
    )
    .input(gene_model)
    .stdout_to(bed)
}

#[cfg(test)]
mod test {
    use std::path::{Path, PathBuf};

    use pretty_assertions::assert_eq;

    #[test]
    fn gtf_to_bed12() {
        let request = super::gene_model_to_bed12(Path::new("/o/merged.gtf"));

        assert_eq!(
            request.args[1],
            "set -euo pipefail; gtfToGenePred /o/merged.gtf /dev/stdout | genePredToBed /dev/stdin /dev/stdout"
        );
        assert_eq!(request.stdout, Some(PathBuf::from("/o/merged.bed12")));
    }

    #[test]
    fn gff3_to_bed12() {
        let request = super::gene_model_to_bed12(Path::new("/r/genes.gff3"));
        assert!(request.args[1].contains("gff3ToGenePred"));
    }
}
