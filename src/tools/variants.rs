//! Variant calling with GATK and the samtools helpers around it.

use std::path::{Path, PathBuf};

use crate::{
    common::is_canonical,
    pipeline::stage::StageRequest,
    tools::{file_name, with_suffix},
};

/// Sort `input` by coordinate into `output`.
pub fn sort_bam(input: &Path, output: &Path, threads: usize) -> StageRequest {
    StageRequest::new(
        format!("sort {}", input.to_string_lossy()),
        "samtools",
    )
    .arg("sort")
    .opt("-@", threads.to_string())
    .path_opt("-o", output)
    .path_arg(input)
    .input(input)
    .output(output)
}

/// Index `bam`, producing `<bam>.bai`.
pub fn index_bam(bam: &Path) -> StageRequest {
    StageRequest::new(format!("index {}", bam.to_string_lossy()), "samtools")
        .arg("index")
        .path_arg(bam)
        .input(bam)
        .output(with_suffix(bam, ".bai"))
}

/// Index `genome`, producing `<genome>.fai`.
pub fn faidx(genome: &Path) -> StageRequest {
    StageRequest::new("genome faidx", "samtools")
        .arg("faidx")
        .path_arg(genome)
        .input(genome)
        .output(with_suffix(genome, ".fai"))
}

/// Sequence dictionary of `genome`: `<dir>/<stem>.dict`.
pub fn sequence_dictionary_path(genome: &Path) -> PathBuf {
    genome.with_extension("dict")
}

pub fn create_sequence_dictionary(genome: &Path) -> StageRequest {
    let dict = sequence_dictionary_path(genome);
    StageRequest::new("genome dictionary", "gatk")
        .arg("CreateSequenceDictionary")
        .path_opt("-R", genome)
        .path_opt("-O", &dict)
        .input(genome)
        .output(dict)
}

pub fn add_read_groups(input: &Path, output: &Path, sample: &str) -> StageRequest {
    StageRequest::new(format!("read groups {}", sample), "gatk")
        .arg("AddOrReplaceReadGroups")
        .path_opt("-I", input)
        .path_opt("-O", output)
        .opt("-RGID", "1")
        .opt("-RGLB", "lib1")
        .opt("-RGPL", "illumina")
        .opt("-RGPU", "unit1")
        .opt("-RGSM", sample)
        .input(input)
        .output(output)
}

pub fn mark_duplicates(input: &Path, output: &Path, metrics: &Path) -> StageRequest {
    StageRequest::new(
        format!("mark duplicates {}", input.to_string_lossy()),
        "gatk",
    )
    .arg("MarkDuplicates")
    .path_opt("-I", input)
    .path_opt("-O", output)
    .path_opt("-M", metrics)
    .input(input)
    .output(output)
    .output(metrics)
}

/// Split reads spanning introns, needed for RNA-seq alignments.
pub fn split_n_cigar_reads(genome: &Path, input: &Path, output: &Path) -> StageRequest {
    StageRequest::new(
        format!("split N cigar {}", input.to_string_lossy()),
        "gatk",
    )
    .arg("SplitNCigarReads")
    .path_opt("-R", genome)
    .path_opt("-I", input)
    .path_opt("-O", output)
    .input(genome)
    .input(input)
    .output(output)
}

/// Index the feature file `vcf`, producing `<vcf>.idx`.
pub fn index_feature_file(vcf: &Path) -> StageRequest {
    StageRequest::new(format!("index features {}", file_name(vcf)), "gatk")
        .arg("IndexFeatureFile")
        .path_opt("-I", vcf)
        .input(vcf)
        .output(with_suffix(vcf, ".idx"))
}

pub fn base_recalibrator(
    genome: &Path,
    input: &Path,
    known_sites: &Path,
    table: &Path,
) -> StageRequest {
    StageRequest::new(
        format!("base recalibration {}", input.to_string_lossy()),
        "gatk",
    )
    .arg("BaseRecalibrator")
    .path_opt("-R", genome)
    .path_opt("-I", input)
    .path_opt("--known-sites", known_sites)
    .path_opt("-O", table)
    .inputs([genome, input, known_sites])
    .output(table)
}

pub fn apply_bqsr(genome: &Path, input: &Path, table: &Path, output: &Path) -> StageRequest {
    StageRequest::new(format!("apply BQSR {}", input.to_string_lossy()), "gatk")
        .arg("ApplyBQSR")
        .path_opt("-R", genome)
        .path_opt("-I", input)
        .path_opt("--bqsr-recal-file", table)
        .path_opt("-O", output)
        .inputs([genome, input, table])
        .output(output)
}

/// A set of contigs called together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContigShard {
    pub name: String,
    /// Contigs of the shard; empty means the whole genome.
    pub contigs: Vec<String>,
}

/// Partition `contigs` into shards: each canonical chromosome alone, all
/// other contigs together in one trailing shard.
pub fn shard_contigs(contigs: &[String]) -> Vec<ContigShard> {
    if contigs.is_empty() {
        return vec![ContigShard {
            name: "all".into(),
            contigs: Vec::new(),
        }];
    }
    let (canonical, other): (Vec<_>, Vec<_>) = contigs.iter().partition(|c| is_canonical(c));
    let mut shards = canonical
        .into_iter()
        .map(|contig| ContigShard {
            name: contig.clone(),
            contigs: vec![contig.clone()],
        })
        .collect::<Vec<_>>();
    if !other.is_empty() {
        shards.push(ContigShard {
            name: "other".into(),
            contigs: other.into_iter().cloned().collect(),
        });
    }
    shards
}

/// Call variants in one shard with HaplotypeCaller.
pub fn haplotype_caller(
    genome: &Path,
    bam: &Path,
    shard: &ContigShard,
    output: &Path,
    rna_seq: bool,
) -> StageRequest {
    let mut request = StageRequest::new(
        format!("haplotype caller {} {}", file_name(bam), shard.name),
        "gatk",
    )
    .arg("HaplotypeCaller")
    .path_opt("-R", genome)
    .path_opt("-I", bam)
    .path_opt("-O", output);
    for contig in &shard.contigs {
        request = request.opt("-L", contig.clone());
    }
    if rna_seq {
        request = request
            .arg("--dont-use-soft-clipped-bases")
            .opt("--standard-min-confidence-threshold-for-calling", "20");
    }
    request.inputs([genome, bam]).output(output)
}

pub fn merge_vcfs(inputs: &[PathBuf], output: &Path) -> StageRequest {
    let mut request = StageRequest::new(
        format!("merge shard calls {}", file_name(output)),
        "gatk",
    )
    .arg("MergeVcfs");
    for input in inputs {
        request = request.path_opt("-I", input);
    }
    request
        .path_opt("-O", output)
        .inputs(inputs.iter().cloned())
        .output(output)
}
