//! Strandedness inference with RSeQC.

use std::path::Path;

use crate::{pipeline::stage::StageRequest, tools::file_name};

/// Run `infer_experiment.py` on `bam`, writing its summary to `summary`.
pub fn infer_experiment(bam: &Path, bed12: &Path, summary: &Path) -> StageRequest {
    StageRequest::new(
        format!("infer experiment {}", file_name(bam)),
        "infer_experiment.py",
    )
    .path_opt("-r", bed12)
    .path_opt("-i", bam)
    .input(bam)
    .input(bed12)
    .stdout_to(summary)
}
