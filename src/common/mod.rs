//! Common functionality.

use byte_unit::{Byte, UnitType};
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use indexmap::IndexMap;

pub mod io;

/// Commonly used command line arguments.
#[derive(Parser, Debug)]
pub struct Args {
    /// Verbosity of the program
    #[clap(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            verbose: Verbosity::new(0, 0),
        }
    }
}

/// Helper to print the current memory resident set size via `tracing`.
pub fn trace_rss_now() {
    let rss = procfs::process::Process::myself()
        .and_then(|me| me.stat())
        .map(|stat| stat.rss * procfs::page_size());
    match rss {
        Ok(bytes) => tracing::debug!(
            "RSS now: {:.2}",
            Byte::from_u64(bytes).get_appropriate_unit(UnitType::Binary)
        ),
        Err(e) => tracing::trace!("could not determine RSS: {}", e),
    }
}

/// Return the version of the crate and `x.y.z` in tests.
pub fn worker_version() -> &'static str {
    if cfg!(test) {
        "x.y.z"
    } else {
        env!("CARGO_PKG_VERSION")
    }
}

/// Expand `~` and environment variables in a user-supplied path.
pub fn expand_path(path: &str) -> Result<std::path::PathBuf, anyhow::Error> {
    shellexpand::full(path)
        .map(|expanded| std::path::PathBuf::from(expanded.as_ref()))
        .map_err(|e| anyhow::anyhow!("could not expand path {:?}: {}", path, e))
}

/// Definition of canonical chromosome names, in karyotypic order.
pub const CHROMS: &[&str] = &[
    "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "13", "14", "15", "16", "17",
    "18", "19", "20", "21", "22", "X", "Y", "M",
];

/// Build mapping of chromosome names to their karyotypic rank.
///
/// Both the Ensembl (`1`, `MT`) and the UCSC (`chr1`, `chrM`) spelling are
/// present.
pub fn build_chrom_map() -> IndexMap<String, usize> {
    let mut result = IndexMap::new();
    for (i, &chrom_name) in CHROMS.iter().enumerate() {
        result.insert(chrom_name.to_owned(), i);
        result.insert(format!("chr{chrom_name}"), i);
    }
    result.insert("MT".to_owned(), 24);
    result.insert("chrMT".to_owned(), 24);
    result
}

/// Return whether the given chromosome name is a canonical one.
///
/// The prefix `"chr"` is stripped from the name before checking.
pub fn is_canonical(chrom: &str) -> bool {
    let chrom = chrom.strip_prefix("chr").unwrap_or(chrom);
    chrom == "MT" || CHROMS.contains(&chrom)
}

/// Select the genome release to use.
#[derive(
    clap::ValueEnum,
    serde::Serialize,
    serde::Deserialize,
    Clone,
    Copy,
    Debug,
    strum::Display,
    strum::EnumIter,
    PartialEq,
    Eq,
    enum_map::Enum,
    PartialOrd,
    Ord,
    Hash,
)]
pub enum GenomeRelease {
    /// GRCh37 / hg19
    #[strum(serialize = "GRCh37")]
    #[serde(rename = "GRCh37")]
    Grch37,
    /// GRCh38 / hg38
    #[strum(serialize = "GRCh38")]
    #[serde(rename = "GRCh38")]
    Grch38,
}

impl GenomeRelease {
    pub fn name(&self) -> String {
        self.to_string()
    }

    /// Name of the matching snpEff database.
    ///
    /// For GRCh38 this is the Ensembl release 86 database while the gene model
    /// and proteins come from release 81.  Transcripts added after 81 have no
    /// protein in the FASTA and thus never count as bad.
    pub fn snpeff_database(&self) -> &'static str {
        match self {
            GenomeRelease::Grch37 => "GRCh37.75",
            GenomeRelease::Grch38 => "GRCh38.86",
        }
    }
}

impl std::str::FromStr for GenomeRelease {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.to_ascii_lowercase();
        if s.starts_with("grch37") {
            Ok(GenomeRelease::Grch37)
        } else if s.starts_with("grch38") {
            Ok(GenomeRelease::Grch38)
        } else {
            Err(anyhow::anyhow!("Unknown genome release: {}", s))
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::GenomeRelease;

    #[rstest::rstest]
    #[case(GenomeRelease::Grch37, "GRCh37.75")]
    #[case(GenomeRelease::Grch38, "GRCh38.86")]
    fn snpeff_database(#[case] release: GenomeRelease, #[case] expected: &str) {
        assert_eq!(release.snpeff_database(), expected);
    }

    #[rstest::rstest]
    #[case("GRCh37", Some(GenomeRelease::Grch37))]
    #[case("grch38", Some(GenomeRelease::Grch38))]
    #[case("GRCh38.p13", Some(GenomeRelease::Grch38))]
    #[case("hg19", None)]
    fn genome_release_from_str(#[case] name: &str, #[case] expected: Option<GenomeRelease>) {
        assert_eq!(name.parse::<GenomeRelease>().ok(), expected);
    }

    #[test]
    fn chrom_map_ranks_both_conventions() {
        let map = super::build_chrom_map();
        assert_eq!(map.get("1"), Some(&0));
        assert_eq!(map.get("chr1"), Some(&0));
        assert_eq!(map.get("X"), Some(&22));
        assert_eq!(map.get("MT"), Some(&24));
        assert_eq!(map.get("chrM"), Some(&24));
        assert_eq!(map.get("GL000192.1"), None);
    }

    #[rstest::rstest]
    #[case("chr1", true)]
    #[case("MT", true)]
    #[case("KI270706.1", false)]
    fn is_canonical(#[case] chrom: &str, #[case] expected: bool) {
        assert_eq!(super::is_canonical(chrom), expected);
    }
}
