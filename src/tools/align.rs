//! Read alignment with STAR (RNA-seq) and hisat2 (DNA).

use std::path::{Path, PathBuf};

use crate::{
    pipeline::{params::FastqSet, stage::StageRequest},
    tools::{bash_request, file_name, is_gff3, shell_path, with_suffix},
};

/// Default `--sjdbOverhang` for building STAR indices.
pub const STAR_OVERHANG: usize = 100;

/// Files of a STAR index that mark it complete.
pub fn star_index_files(index_dir: &Path) -> Vec<PathBuf> {
    ["SA", "SAindex", "Genome", "chrNameLength.txt"]
        .iter()
        .map(|name| index_dir.join(name))
        .collect()
}

/// Build a STAR genome index with splice junctions from `gene_model`.
pub fn star_genome_generate(
    genome: &Path,
    gene_model: &Path,
    index_dir: &Path,
    threads: usize,
) -> StageRequest {
    let mut request = StageRequest::new("STAR genome index", "STAR")
        .opt("--runMode", "genomeGenerate")
        .opt("--runThreadN", threads.to_string())
        .path_opt("--genomeDir", index_dir)
        .path_opt("--genomeFastaFiles", genome)
        .path_opt("--sjdbGTFfile", gene_model)
        .opt("--sjdbOverhang", STAR_OVERHANG.to_string());
    if is_gff3(gene_model) {
        request = request.opt("--sjdbGTFtagExonParentTranscript", "Parent");
    }
    request
        .input(genome)
        .input(gene_model)
        .outputs(star_index_files(index_dir))
}

/// One STAR alignment run.
#[derive(Debug, Clone)]
pub struct StarAlign<'a> {
    pub fastqs: &'a FastqSet,
    pub index_dir: &'a Path,
    /// Prefix of all output files, e.g., `/out/sample.`.
    pub out_prefix: PathBuf,
    pub threads: usize,
    /// Use `--twopassMode Basic`.
    pub two_pass: bool,
    /// Detect chimeric alignments for fusion calling.
    pub chimeric: bool,
}

impl StarAlign<'_> {
    fn prefixed(&self, name: &str) -> PathBuf {
        let mut path = self.out_prefix.as_os_str().to_owned();
        path.push(name);
        PathBuf::from(path)
    }

    /// The coordinate-sorted alignment.
    pub fn bam(&self) -> PathBuf {
        self.prefixed("Aligned.sortedByCoord.out.bam")
    }

    /// Chimeric junctions, written in chimeric mode.
    pub fn chimeric_junctions(&self) -> PathBuf {
        self.prefixed("Chimeric.out.junction")
    }

    pub fn request(&self) -> StageRequest {
        let name = file_name(&self.out_prefix);
        let mut request = StageRequest::new(
            format!("STAR align {}", name.trim_end_matches('.')),
            "STAR",
        )
        .opt("--runThreadN", self.threads.to_string())
        .path_opt("--genomeDir", self.index_dir)
        .arg("--readFilesIn")
        .args(self.fastqs.paths().iter().map(|p| p.to_string_lossy()));
        if self.fastqs.is_gzipped() {
            request = request.opt("--readFilesCommand", "zcat");
        } else if self.fastqs.is_bzipped() {
            request = request.opt("--readFilesCommand", "bzcat");
        }
        request = request
            .args(["--outSAMtype", "BAM", "SortedByCoordinate"])
            .opt("--outSAMstrandField", "intronMotif")
            .opt("--outFilterIntronMotifs", "RemoveNoncanonical")
            .path_opt("--outFileNamePrefix", &self.out_prefix);
        if self.two_pass {
            request = request.opt("--twopassMode", "Basic");
        }
        if self.chimeric {
            request = request
                .opt("--chimSegmentMin", "12")
                .opt("--chimJunctionOverhangMin", "12")
                .opt("--chimSegmentReadGapMax", "3")
                .opt("--chimOutJunctionFormat", "1")
                .opt("--alignSJDBoverhangMin", "10")
                .opt("--alignMatesGapMax", "100000")
                .opt("--alignIntronMax", "100000")
                .args(["--alignSJstitchMismatchNmax", "5", "-1", "5", "5"])
                .output(self.chimeric_junctions());
        }
        request
            .inputs(star_index_files(self.index_dir))
            .inputs(self.fastqs.paths())
            .output(self.bam())
    }
}

/// First file of a hisat2 index with prefix `index_prefix`.
pub fn hisat2_index_file(index_prefix: &Path) -> PathBuf {
    with_suffix(index_prefix, ".1.ht2")
}

/// Build a hisat2 index.
pub fn hisat2_build(genome: &Path, index_prefix: &Path, threads: usize) -> StageRequest {
    StageRequest::new("hisat2 index", "hisat2-build")
        .opt("-p", threads.to_string())
        .path_arg(genome)
        .path_arg(index_prefix)
        .input(genome)
        .output(hisat2_index_file(index_prefix))
}

/// Align DNA reads without spliced alignment and sort the result.
///
/// The sorted BAM is written next to `bam` and only renamed once the whole
/// pipe succeeded.
pub fn hisat2_align(
    fastqs: &FastqSet,
    index_prefix: &Path,
    bam: &Path,
    threads: usize,
) -> StageRequest {
    let reads = match &fastqs.second {
        Some(second) => format!("-1 {} -2 {}", shell_path(&fastqs.first), shell_path(second)),
        None => format!("-U {}", shell_path(&fastqs.first)),
    };
    let partial = with_suffix(bam, ".partial");
    let script = format!(
        "hisat2 -p {threads} --no-spliced-alignment -x {} {} \
         | samtools sort -@ {threads} -O bam -o {partial} - && mv {partial} {}",
        shell_path(index_prefix),
        reads,
        shell_path(bam),
        partial = shell_path(&partial),
    );
    bash_request(format!("hisat2 align {}", fastqs.prefix()), &script)
        .input(hisat2_index_file(index_prefix))
        .inputs(fastqs.paths())
        .output(bam)
}
