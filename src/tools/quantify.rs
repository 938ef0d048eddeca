//! Transcript quantification with RSEM.

use std::path::{Path, PathBuf};

use crate::{
    pipeline::{params::FastqSet, stage::StageRequest, strandedness::Strandedness},
    tools::{align::star_index_files, is_gff3, with_suffix},
};

/// Output suffixes of `rsem-calculate-expression`.
pub const ISOFORM_RESULTS_SUFFIX: &str = ".isoforms.results";
pub const GENE_RESULTS_SUFFIX: &str = ".genes.results";
pub const GENOME_BAM_SUFFIX: &str = ".genome.bam";
pub const GENOME_SORTED_BAM_SUFFIX: &str = ".genome.sorted.bam";

/// Prepare the RSEM reference together with a STAR index in the same
/// directory; the index doubles as aligner index for strandedness inference.
pub fn prepare_reference(
    genome: &Path,
    gene_model: &Path,
    reference_prefix: &Path,
    threads: usize,
) -> StageRequest {
    let model_flag = if is_gff3(gene_model) { "--gff3" } else { "--gtf" };
    let reference_dir = reference_prefix.parent().unwrap_or(Path::new("."));
    StageRequest::new("RSEM reference", "rsem-prepare-reference")
        .path_opt(model_flag, gene_model)
        .arg("--star")
        .opt("--num-threads", threads.to_string())
        .path_arg(genome)
        .path_arg(reference_prefix)
        .input(genome)
        .input(gene_model)
        .output(with_suffix(reference_prefix, ".grp"))
        .output(with_suffix(reference_prefix, ".transcripts.fa"))
        .outputs(star_index_files(reference_dir))
}

/// One `rsem-calculate-expression` run.
#[derive(Debug, Clone)]
pub struct CalculateExpression<'a> {
    pub fastqs: &'a FastqSet,
    pub reference_prefix: &'a Path,
    pub out_prefix: PathBuf,
    pub threads: usize,
    pub strandedness: Strandedness,
    pub output_genome_bam: bool,
}

impl CalculateExpression<'_> {
    pub fn isoform_results(&self) -> PathBuf {
        with_suffix(&self.out_prefix, ISOFORM_RESULTS_SUFFIX)
    }

    pub fn gene_results(&self) -> PathBuf {
        with_suffix(&self.out_prefix, GENE_RESULTS_SUFFIX)
    }

    pub fn genome_bam(&self) -> PathBuf {
        with_suffix(&self.out_prefix, GENOME_BAM_SUFFIX)
    }

    pub fn sorted_genome_bam(&self) -> PathBuf {
        with_suffix(&self.out_prefix, GENOME_SORTED_BAM_SUFFIX)
    }

    pub fn request(&self) -> StageRequest {
        let mut request = StageRequest::new(
            format!("RSEM quantify {}", self.fastqs.prefix()),
            "rsem-calculate-expression",
        )
        .arg("--time")
        .arg("--calc-ci")
        .arg("--star")
        .opt("--num-threads", self.threads.to_string())
        .opt("--strandedness", self.strandedness.to_string());
        if self.fastqs.is_gzipped() {
            request = request.arg("--star-gzipped-read-file");
        } else if self.fastqs.is_bzipped() {
            request = request.arg("--star-bzipped-read-file");
        }
        if self.fastqs.is_paired() {
            request = request.arg("--paired-end");
        }
        request = if self.output_genome_bam {
            request.arg("--output-genome-bam").output(self.genome_bam())
        } else {
            request.arg("--no-bam-output")
        };
        for path in self.fastqs.paths() {
            request = request.path_arg(path);
        }
        request
            .path_arg(self.reference_prefix)
            .path_arg(&self.out_prefix)
            .input(with_suffix(self.reference_prefix, ".grp"))
            .inputs(self.fastqs.paths())
            .output(self.isoform_results())
            .output(self.gene_results())
    }
}

#[cfg(test)]
mod test {
    use std::path::{Path, PathBuf};

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn prepare_reference_gtf() {
        let request = prepare_reference(
            Path::new("/ref/genome.fa"),
            Path::new("/ref/genes.gtf"),
            Path::new("/ref/rsem/genome"),
            4,
        );

        assert_eq!(
            request.command_line(),
            "rsem-prepare-reference --gtf /ref/genes.gtf --star --num-threads 4 /ref/genome.fa /ref/rsem/genome"
        );
        assert_eq!(request.outputs[2], PathBuf::from("/ref/rsem/SA"));
    }

    #[rstest::rstest]
    #[case(Strandedness::Forward, true, "--strandedness forward --star-gzipped-read-file --paired-end --output-genome-bam")]
    #[case(Strandedness::None, false, "--strandedness none --star-gzipped-read-file --paired-end --no-bam-output")]
    fn calculate_expression(
        #[case] strandedness: Strandedness,
        #[case] output_genome_bam: bool,
        #[case] expected_flags: &str,
    ) {
        let fastqs = FastqSet::new("/r/s_1.fq.gz".into(), Some("/r/s_2.fq.gz".into()));
        let quantify = CalculateExpression {
            fastqs: &fastqs,
            reference_prefix: Path::new("/ref/rsem/genome"),
            out_prefix: PathBuf::from("/out/s_1"),
            threads: 2,
            strandedness,
            output_genome_bam,
        };

        let request = quantify.request();

        assert!(request.command_line().contains(expected_flags));
        assert!(request
            .command_line()
            .ends_with("/r/s_1.fq.gz /r/s_2.fq.gz /ref/rsem/genome /out/s_1"));
        assert_eq!(request.outputs.contains(&quantify.genome_bam()), output_genome_bam);
        assert_eq!(
            quantify.isoform_results(),
            PathBuf::from("/out/s_1.isoforms.results")
        );
    }
}
