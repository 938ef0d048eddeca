//! Transcript assembly with stringtie.

use std::path::{Path, PathBuf};

use crate::pipeline::{stage::StageRequest, strandedness::Strandedness};

/// Assemble transcripts of one sample guided by `gene_model`.
pub fn assemble(
    bam: &Path,
    gene_model: &Path,
    output: &Path,
    threads: usize,
    strandedness: Strandedness,
) -> StageRequest {
    let mut request = StageRequest::new(
        format!("stringtie {}", bam.to_string_lossy()),
        "stringtie",
    )
    .path_arg(bam)
    .opt("-p", threads.to_string())
    .path_opt("-G", gene_model)
    .path_opt("-o", output);
    if let Some(flag) = strandedness.stringtie_flag() {
        request = request.arg(flag);
    }
    request.input(bam).input(gene_model).output(output)
}

/// Merge per-sample assemblies into one transcript set.
pub fn merge(gtfs: &[PathBuf], gene_model: &Path, output: &Path, threads: usize) -> StageRequest {
    let mut request = StageRequest::new("stringtie merge", "stringtie")
        .arg("--merge")
        .opt("-p", threads.to_string())
        .path_opt("-G", gene_model)
        .path_opt("-o", output);
    for gtf in gtfs {
        request = request.path_arg(gtf);
    }
    request
        .input(gene_model)
        .inputs(gtfs.iter().cloned())
        .output(output)
}
