//! Variant effect annotation with snpEff.

use std::path::{Path, PathBuf};

use crate::{
    common::GenomeRelease,
    pipeline::stage::StageRequest,
    tools::{file_name, with_suffix},
};

/// One `snpEff ann` run.
#[derive(Debug, Clone)]
pub struct SnpEffAnnotate<'a> {
    pub release: GenomeRelease,
    pub input: &'a Path,
    /// Prefix of the outputs, e.g., `/out/sample`.
    pub out_prefix: PathBuf,
    /// Skip writing the HTML summary.
    pub no_stats: bool,
}

impl SnpEffAnnotate<'_> {
    /// The annotated VCF.
    pub fn vcf(&self) -> PathBuf {
        with_suffix(&self.out_prefix, ".snpEffAnnotated.vcf")
    }

    /// HTML summary, if written.
    pub fn stats(&self) -> Option<PathBuf> {
        (!self.no_stats).then(|| with_suffix(&self.out_prefix, ".snpEffAnnotated.html"))
    }

    pub fn request(&self) -> StageRequest {
        let mut request = StageRequest::new(format!("snpEff {}", file_name(self.input)), "snpEff")
            .arg("ann");
        request = match self.stats() {
            Some(stats) => request.path_opt("-stats", &stats).output(stats),
            None => request.arg("-noStats"),
        };
        request
            .arg(self.release.snpeff_database())
            .path_arg(self.input)
            .input(self.input)
            .stdout_to(self.vcf())
    }
}
