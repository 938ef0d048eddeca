//! Resolution of the reference files for a genome build.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use strum::IntoEnumIterator;

use crate::{
    common::{
        io::{open_read_maybe_gz, write_atomically},
        GenomeRelease,
    },
    err::ConfigError,
    pipeline::{gate::is_present, stage::StageRequest},
    tools::{download::wget_gunzip, variants, with_infix},
};

pub mod gene_model;
pub mod karyotype;

/// Base URL of the Ensembl FTP server.
const ENSEMBL_FTP: &str = "ftp://ftp.ensembl.org/pub";

/// Canonical Ensembl file names of one release.
struct EnsemblFiles {
    ensembl_release: u32,
    genome: &'static str,
    gtf: &'static str,
    gff3: Option<&'static str>,
    proteins: &'static str,
    /// Local name of the variation VCF, which Ensembl names the same for all
    /// releases.
    known_sites: &'static str,
}

fn ensembl_files(release: GenomeRelease) -> EnsemblFiles {
    match release {
        GenomeRelease::Grch37 => EnsemblFiles {
            ensembl_release: 75,
            genome: "Homo_sapiens.GRCh37.75.dna.primary_assembly.fa",
            gtf: "Homo_sapiens.GRCh37.75.gtf",
            gff3: None,
            proteins: "Homo_sapiens.GRCh37.75.pep.all.fa",
            known_sites: "Homo_sapiens.GRCh37.75.variation.vcf",
        },
        GenomeRelease::Grch38 => EnsemblFiles {
            ensembl_release: 81,
            genome: "Homo_sapiens.GRCh38.dna.primary_assembly.fa",
            gtf: "Homo_sapiens.GRCh38.81.gtf",
            gff3: Some("Homo_sapiens.GRCh38.81.gff3"),
            proteins: "Homo_sapiens.GRCh38.pep.all.fa",
            known_sites: "Homo_sapiens.GRCh38.81.variation.vcf",
        },
    }
}

/// A file to fetch from Ensembl.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Download {
    pub name: String,
    pub url: String,
    pub path: PathBuf,
}

/// The reference files of one genome build.
///
/// Resolved once per run and passed to every stage that needs it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ReferenceBuild {
    /// Build name as given by the user.
    pub name: String,
    /// `None` if the name was not recognized.
    pub release: Option<GenomeRelease>,
    pub genome_fasta: PathBuf,
    pub gtf: PathBuf,
    /// Same as `gtf` where Ensembl has no GFF3 for the release.
    pub gff3: PathBuf,
    pub protein_fasta: PathBuf,
    /// Files still to be fetched from Ensembl.
    pub downloads: Vec<Download>,
    /// Ensembl known variant sites for base quality recalibration, fetched
    /// only by the flows calling variants.
    pub known_sites: Option<Download>,
}

impl ReferenceBuild {
    /// Compute the canonical Ensembl paths of `name` below `target_dir`.
    ///
    /// An unrecognized name gives a build with empty paths that fails
    /// `ensure_valid`.
    pub fn resolve(name: &str, target_dir: &Path) -> Self {
        let release = GenomeRelease::iter().find(|r| r.name().eq_ignore_ascii_case(name));
        let Some(release) = release else {
            tracing::warn!("reference {:?} is not recognized", name);
            return Self {
                name: name.to_owned(),
                release: None,
                genome_fasta: PathBuf::new(),
                gtf: PathBuf::new(),
                gff3: PathBuf::new(),
                protein_fasta: PathBuf::new(),
                downloads: Vec::new(),
                known_sites: None,
            };
        };

        let files = ensembl_files(release);
        let base = format!("{}/release-{}", ENSEMBL_FTP, files.ensembl_release);
        let download = |name: &str, dir: &str, file: &str| Download {
            name: name.to_owned(),
            url: format!("{}/{}/{}.gz", base, dir, file),
            path: target_dir.join(file),
        };

        let mut downloads = vec![
            download("genome", "fasta/homo_sapiens/dna", files.genome),
            download("gtf", "gtf/homo_sapiens", files.gtf),
        ];
        if let Some(gff3) = files.gff3 {
            downloads.push(download("gff3", "gff3/homo_sapiens", gff3));
        }
        downloads.push(download("proteins", "fasta/homo_sapiens/pep", files.proteins));
        let known_sites = Download {
            name: "known sites".to_owned(),
            url: format!("{}/variation/vcf/homo_sapiens/Homo_sapiens.vcf.gz", base),
            path: target_dir.join(files.known_sites),
        };

        Self {
            name: release.name(),
            release: Some(release),
            genome_fasta: target_dir.join(files.genome),
            gtf: target_dir.join(files.gtf),
            gff3: target_dir.join(files.gff3.unwrap_or(files.gtf)),
            protein_fasta: target_dir.join(files.proteins),
            downloads,
            known_sites: Some(known_sites),
        }
    }

    /// Replace paths with user-supplied files; these are not downloaded.
    pub fn with_overrides(
        mut self,
        genome_fasta: Option<&Path>,
        gene_model: Option<&Path>,
        protein_fasta: Option<&Path>,
    ) -> Self {
        if let Some(path) = genome_fasta {
            self.genome_fasta = path.to_path_buf();
            self.downloads.retain(|d| d.name != "genome");
        }
        if let Some(path) = gene_model {
            self.gtf = path.to_path_buf();
            self.gff3 = path.to_path_buf();
            self.downloads.retain(|d| d.name != "gtf" && d.name != "gff3");
        }
        if let Some(path) = protein_fasta {
            self.protein_fasta = path.to_path_buf();
            self.downloads.retain(|d| d.name != "proteins");
        }
        self
    }

    /// The gene model used by aligners, assemblers and quantifiers.
    pub fn gene_model(&self) -> &Path {
        &self.gtf
    }

    /// The recognized release.
    pub fn ensure_valid(&self) -> Result<GenomeRelease, ConfigError> {
        let paths = [
            &self.genome_fasta,
            &self.gtf,
            &self.gff3,
            &self.protein_fasta,
        ];
        match self.release {
            Some(release) if paths.iter().all(|p| !p.as_os_str().is_empty()) => Ok(release),
            _ => Err(ConfigError::UnsupportedReference(self.name.clone())),
        }
    }
}

/// Requests fetching the files of `build` that are not there yet.
pub fn download_requests(build: &ReferenceBuild) -> Vec<StageRequest> {
    build
        .downloads
        .iter()
        .map(|d| wget_gunzip(&d.name, &d.url, &d.path))
        .collect()
}

/// Requests fetching and indexing the Ensembl known variant sites of `build`.
pub fn known_sites_requests(build: &ReferenceBuild) -> Vec<StageRequest> {
    build
        .known_sites
        .iter()
        .flat_map(|d| {
            [
                wget_gunzip(&d.name, &d.url, &d.path),
                variants::index_feature_file(&d.path),
            ]
        })
        .collect()
}

/// Requests for the FASTA index and sequence dictionary of `genome`.
pub fn prepare_genome_indices(genome: &Path) -> Vec<StageRequest> {
    vec![
        variants::faidx(genome),
        variants::create_sequence_dictionary(genome),
    ]
}

/// Accessions of the protein FASTA that need special handling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProteinAccessions {
    /// Protein and transcript accessions of proteins with unknown (`X`) or
    /// stop (`*`) residues, with and without version.
    pub bad: HashSet<String>,
    /// Sequences of the remaining proteins containing selenocysteine (`U`),
    /// by protein accession.
    pub selenocysteine: IndexMap<String, String>,
}

/// Collect the bad and the selenocysteine proteins of `protein_fasta`.
pub fn important_protein_accessions(protein_fasta: &Path) -> Result<ProteinAccessions, anyhow::Error> {
    let transcript_re = regex::Regex::new(r"transcript:([A-Za-z0-9_.]+)")?;
    let reader = open_read_maybe_gz(protein_fasta)
        .map_err(|e| anyhow::anyhow!("could not open {:?}: {}", protein_fasta, e))?;

    let mut result = ProteinAccessions::default();
    let mut total = 0;
    for record in bio::io::fasta::Reader::new(reader).records() {
        let record = record?;
        total += 1;
        if !record.seq().iter().any(|&aa| aa == b'X' || aa == b'*') {
            if record.seq().contains(&b'U') {
                result.selenocysteine.insert(
                    record.id().to_owned(),
                    String::from_utf8_lossy(record.seq()).into_owned(),
                );
            }
            continue;
        }
        let mut accessions = vec![record.id().to_owned()];
        if let Some(captures) = record.desc().and_then(|desc| transcript_re.captures(desc)) {
            accessions.push(captures[1].to_owned());
        }
        for accession in accessions {
            if let Some((unversioned, _)) = accession.split_once('.') {
                result.bad.insert(unversioned.to_owned());
            }
            result.bad.insert(accession);
        }
    }
    tracing::debug!(
        "{} accessions of bad proteins and {} selenocysteine proteins among {} in {:?}",
        result.bad.len(),
        result.selenocysteine.len(),
        total,
        protein_fasta
    );
    Ok(result)
}

/// Protein and transcript accessions of proteins with unknown (`X`) or stop
/// (`*`) residues.
pub fn bad_protein_accessions(protein_fasta: &Path) -> Result<HashSet<String>, anyhow::Error> {
    Ok(important_protein_accessions(protein_fasta)?.bad)
}

/// Path of the selenocysteine proteins derived from `protein_fasta`.
pub fn selenocysteine_path(protein_fasta: &Path) -> PathBuf {
    with_infix(protein_fasta, "selenocysteine")
}

/// Write the selenocysteine proteins of `accessions` as FASTA next to
/// `protein_fasta`, unless already present.
pub fn write_selenocysteine_fasta(
    protein_fasta: &Path,
    accessions: &ProteinAccessions,
) -> Result<PathBuf, anyhow::Error> {
    let output = selenocysteine_path(protein_fasta);
    if is_present(&output) {
        return Ok(output);
    }
    write_atomically(&output, |writer| {
        let mut fasta_writer = bio::io::fasta::Writer::new(writer);
        for (accession, sequence) in &accessions.selenocysteine {
            fasta_writer.write(accession, None, sequence.as_bytes())?;
        }
        fasta_writer.flush()?;
        Ok(())
    })?;
    tracing::info!(
        "wrote {} selenocysteine proteins to {:?}",
        accessions.selenocysteine.len(),
        &output
    );
    Ok(output)
}
