//! Long non-coding RNA classification with slncky.

use std::path::{Path, PathBuf};

use crate::{common::GenomeRelease, pipeline::stage::StageRequest, tools::with_suffix};

/// UCSC assembly name slncky uses for `release`.
pub fn ucsc_assembly(release: GenomeRelease) -> &'static str {
    match release {
        GenomeRelease::Grch37 => "hg19",
        GenomeRelease::Grch38 => "hg38",
    }
}

/// One slncky run on UCSC-named transcripts.
#[derive(Debug, Clone)]
pub struct Slncky<'a> {
    pub bed12: &'a Path,
    pub annotations_dir: &'a Path,
    pub release: GenomeRelease,
    pub out_prefix: PathBuf,
    pub threads: usize,
}

impl Slncky<'_> {
    pub fn lncs_bed(&self) -> PathBuf {
        with_suffix(&self.out_prefix, ".lncs.bed")
    }

    pub fn lncs_info(&self) -> PathBuf {
        with_suffix(&self.out_prefix, ".lncs.info.txt")
    }

    pub fn request(&self) -> StageRequest {
        let config = self.annotations_dir.join("annotations.config");
        StageRequest::new("slncky", "slncky.v1.0")
            .opt("-n", self.threads.to_string())
            .path_opt("-c", &config)
            .path_arg(self.bed12)
            .arg(ucsc_assembly(self.release))
            .path_arg(&self.out_prefix)
            .input(self.bed12)
            .input(config)
            .output(self.lncs_bed())
            .output(self.lncs_info())
    }
}
