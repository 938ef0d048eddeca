//! Gene fusion calling with STAR-Fusion.

use std::path::{Path, PathBuf};

use crate::pipeline::stage::StageRequest;

/// Fusion predictions written to `out_dir`.
pub fn fusion_predictions(out_dir: &Path) -> PathBuf {
    out_dir.join("star-fusion.fusion_predictions.tsv")
}

/// Call fusions from STAR's chimeric junctions.
pub fn star_fusion(
    genome_lib_dir: &Path,
    chimeric_junctions: &Path,
    out_dir: &Path,
    threads: usize,
) -> StageRequest {
    StageRequest::new(
        format!("STAR-Fusion {}", chimeric_junctions.to_string_lossy()),
        "STAR-Fusion",
    )
    .path_opt("--genome_lib_dir", genome_lib_dir)
    .path_opt("-J", chimeric_junctions)
    .path_opt("--output_dir", out_dir)
    .opt("--CPU", threads.to_string())
    .input(genome_lib_dir)
    .input(chimeric_junctions)
    .output(fusion_predictions(out_dir))
}
