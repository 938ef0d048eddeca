//! Translation between the Ensembl (`1`, `MT`, `GL000192.1`) and UCSC (`chr1`,
//! `chrM`, `chr1_gl000192_random`) contig naming conventions.

use std::{
    io::{BufRead, Write},
    path::{Path, PathBuf},
};

use indexmap::IndexMap;

use crate::common::{io::write_atomically, GenomeRelease};

/// Fixed Ensembl-to-UCSC table for GRCh37.
const GRCH37_ENSEMBL2UCSC: &str = include_str!("../../data/chrom_mappings/GRCh37_ensembl2UCSC.txt");
/// Fixed Ensembl-to-UCSC table for GRCh38.
const GRCH38_ENSEMBL2UCSC: &str = include_str!("../../data/chrom_mappings/GRCh38_ensembl2UCSC.txt");

/// Direction of a contig name translation.
#[derive(
    clap::ValueEnum,
    serde::Serialize,
    serde::Deserialize,
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
)]
#[strum(serialize_all = "kebab-case")]
pub enum Direction {
    /// Ensembl names to UCSC names.
    EnsemblToUcsc,
    /// UCSC names to Ensembl names.
    UcscToEnsembl,
}

impl Direction {
    /// The opposite direction.
    pub fn reverse(self) -> Self {
        match self {
            Direction::EnsemblToUcsc => Direction::UcscToEnsembl,
            Direction::UcscToEnsembl => Direction::EnsemblToUcsc,
        }
    }

    /// Infix used for the output file of a translation.
    fn file_infix(self) -> &'static str {
        match self {
            Direction::EnsemblToUcsc => "ucsc",
            Direction::UcscToEnsembl => "ensembl",
        }
    }
}

/// How to treat blank lines in files passed to `translate_leading_column`.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum BlankLinePolicy {
    /// Skip blank lines and keep going.
    #[default]
    Skip,
    /// Treat the first blank line as the end of the file.
    Stop,
}

/// Bidirectional contig name lookup for one genome release.
#[derive(Debug, Clone)]
pub struct ChromosomeMapping {
    release: GenomeRelease,
    ensembl_to_ucsc: IndexMap<String, String>,
    ucsc_to_ensembl: IndexMap<String, String>,
}

impl ChromosomeMapping {
    /// Load the fixed table for `release`.
    pub fn load(release: GenomeRelease) -> Self {
        let table = match release {
            GenomeRelease::Grch37 => GRCH37_ENSEMBL2UCSC,
            GenomeRelease::Grch38 => GRCH38_ENSEMBL2UCSC,
        };
        let mut ensembl_to_ucsc = IndexMap::new();
        let mut ucsc_to_ensembl = IndexMap::new();
        for line in table.lines() {
            if let Some((ensembl, ucsc)) = line.split_once('\t') {
                ensembl_to_ucsc.insert(ensembl.to_owned(), ucsc.to_owned());
                ucsc_to_ensembl.insert(ucsc.to_owned(), ensembl.to_owned());
            }
        }
        tracing::trace!(
            "loaded {} contig name pairs for {}",
            ensembl_to_ucsc.len(),
            release
        );
        Self {
            release,
            ensembl_to_ucsc,
            ucsc_to_ensembl,
        }
    }

    pub fn release(&self) -> GenomeRelease {
        self.release
    }

    fn table(&self, direction: Direction) -> &IndexMap<String, String> {
        match direction {
            Direction::EnsemblToUcsc => &self.ensembl_to_ucsc,
            Direction::UcscToEnsembl => &self.ucsc_to_ensembl,
        }
    }

    /// Ordered `(source, target)` pairs for `direction`.
    pub fn pairs(&self, direction: Direction) -> Vec<(&str, &str)> {
        self.table(direction)
            .iter()
            .map(|(source, target)| (source.as_str(), target.as_str()))
            .collect()
    }

    /// Translate a single name; `None` if it is not a source name of `direction`.
    pub fn translate(&self, name: &str, direction: Direction) -> Option<&str> {
        self.table(direction).get(name).map(|s| s.as_str())
    }

    /// Whether `name` is already spelled in the target convention of `direction`.
    pub fn is_target(&self, name: &str, direction: Direction) -> bool {
        self.table(direction.reverse()).contains_key(name)
    }

    /// Contigs known to neither convention.
    pub fn uncovered<'a, I>(&self, contigs: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        contigs
            .into_iter()
            .filter(|c| !self.ensembl_to_ucsc.contains_key(*c) && !self.ucsc_to_ensembl.contains_key(*c))
            .map(|c| c.to_owned())
            .collect()
    }
}

/// Result of `translate_leading_column`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translated {
    /// Path of the written file.
    pub path: PathBuf,
    /// Number of data rows written.
    pub written: usize,
    /// Number of rows dropped because of an unknown contig name.
    pub dropped: usize,
    /// Number of blank lines seen.
    pub blank: usize,
}

/// Output path for translating `input` in `direction`: `<stem>.<ucsc|ensembl><ext>`.
pub fn translated_path(input: &Path, direction: Direction) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{}.{}.{}", stem, direction.file_infix(), ext.to_string_lossy()),
        None => format!("{}.{}", stem, direction.file_infix()),
    };
    input.with_file_name(name)
}

/// Rewrite the first column of the tab-separated file at `input`.
///
/// Names in the source convention are translated, names already in the target
/// convention are passed through and rows with unknown names are dropped.
/// Comment rows starting with `#` are skipped.  The input file is left
/// untouched.
pub fn translate_leading_column(
    input: &Path,
    mapping: &ChromosomeMapping,
    direction: Direction,
    policy: BlankLinePolicy,
) -> Result<Translated, anyhow::Error> {
    let output = translated_path(input, direction);
    tracing::debug!(
        "translating contig names {} from {:?} to {:?}",
        direction,
        input,
        &output
    );
    let reader = std::fs::File::open(input)
        .map(std::io::BufReader::new)
        .map_err(|e| anyhow::anyhow!("could not open {:?}: {}", input, e))?;

    let mut written = 0;
    let mut dropped = 0;
    let mut blank = 0;
    write_atomically(&output, |writer| {
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                blank += 1;
                match policy {
                    BlankLinePolicy::Stop => break,
                    BlankLinePolicy::Skip => continue,
                }
            }
            if line.starts_with('#') {
                continue;
            }
            let (contig, rest) = match line.split_once('\t') {
                Some((contig, rest)) => (contig, Some(rest)),
                None => (line.as_str(), None),
            };
            let contig = if let Some(target) = mapping.translate(contig, direction) {
                target
            } else if mapping.is_target(contig, direction) {
                contig
            } else {
                dropped += 1;
                continue;
            };
            match rest {
                Some(rest) => writeln!(writer, "{}\t{}", contig, rest)?,
                None => writeln!(writer, "{}", contig)?,
            }
            written += 1;
        }
        Ok(())
    })?;

    if blank > 0 {
        tracing::warn!("{} blank line(s) in {:?} ({})", blank, input, policy);
    }
    tracing::debug!("wrote {} rows, dropped {} rows", written, dropped);

    Ok(Translated {
        path: output,
        written,
        dropped,
        blank,
    })
}

/// Command line arguments for the `translate-contigs` subcommand.
#[derive(Debug, clap::Parser)]
#[command(author, version, about = "Translate contig names in the first column of a TSV file", long_about = None)]
pub struct Args {
    /// Tab-separated input file, left untouched.
    #[arg(long)]
    pub path_input: String,
    /// Genome release of the contig names.
    #[arg(long, value_enum, default_value_t = GenomeRelease::Grch38)]
    pub genome_release: GenomeRelease,
    /// Direction of the translation.
    #[arg(long, value_enum, default_value_t = Direction::EnsemblToUcsc)]
    pub direction: Direction,
    /// Handling of blank lines.
    #[arg(long, value_enum, default_value_t = BlankLinePolicy::Skip)]
    pub blank_lines: BlankLinePolicy,
}

/// Main entry point for the `translate-contigs` subcommand.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let input = crate::common::expand_path(&args.path_input)?;
    let mapping = ChromosomeMapping::load(args.genome_release);
    let translated = translate_leading_column(&input, &mapping, args.direction, args.blank_lines)?;
    tracing::info!(
        "wrote {} rows to {:?}, dropped {} rows with unknown contigs",
        translated.written,
        &translated.path,
        translated.dropped
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use strum::IntoEnumIterator;

    use super::*;

    #[rstest::rstest]
    #[case(GenomeRelease::Grch37)]
    #[case(GenomeRelease::Grch38)]
    fn round_trip(#[case] release: GenomeRelease) {
        let mapping = ChromosomeMapping::load(release);
        for direction in [Direction::EnsemblToUcsc, Direction::UcscToEnsembl] {
            let pairs = mapping.pairs(direction);
            assert!(!pairs.is_empty());
            for (source, target) in pairs {
                assert_eq!(mapping.translate(source, direction), Some(target));
                assert_eq!(mapping.translate(target, direction.reverse()), Some(source));
            }
        }
    }

    #[test]
    fn tables_cover_primary_assembly() {
        for release in GenomeRelease::iter() {
            let mapping = ChromosomeMapping::load(release);
            assert_eq!(mapping.translate("1", Direction::EnsemblToUcsc), Some("chr1"));
            assert_eq!(mapping.translate("MT", Direction::EnsemblToUcsc), Some("chrM"));
            assert_eq!(mapping.translate("chrX", Direction::UcscToEnsembl), Some("X"));
            assert!(mapping.uncovered(["1", "chrY", "decoy"]) == vec!["decoy".to_string()]);
        }
    }

    #[test]
    fn pairs_keep_table_order() {
        let mapping = ChromosomeMapping::load(GenomeRelease::Grch38);
        let pairs = mapping.pairs(Direction::EnsemblToUcsc);
        assert_eq!(pairs[0], ("1", "chr1"));
        assert_eq!(pairs[24], ("MT", "chrM"));
        assert_eq!(pairs[25], ("KI270706.1", "chr1_KI270706v1_random"));
    }

    #[rstest::rstest]
    #[case(Direction::EnsemblToUcsc, "chr1\t100\t200\nchr2\t5\t10\n", "regions.ucsc.bed")]
    #[case(Direction::UcscToEnsembl, "1\t100\t200\n2\t5\t10\n", "regions.ensembl.bed")]
    fn translate_filters_rows(
        #[case] direction: Direction,
        #[case] expected: &str,
        #[case] expected_name: &str,
    ) -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let input = tmp_dir.join("regions.bed");
        let original = "1\t100\t200\nchr2\t5\t10\nscaffold_17\t1\t2\n# comment\n";
        std::fs::write(&input, original)?;

        let mapping = ChromosomeMapping::load(GenomeRelease::Grch38);
        let translated =
            translate_leading_column(&input, &mapping, direction, BlankLinePolicy::Skip)?;

        assert_eq!(translated.path, tmp_dir.join(expected_name));
        assert_eq!(translated.written, 2);
        assert_eq!(translated.dropped, 1);
        assert_eq!(std::fs::read_to_string(&translated.path)?, expected);
        assert_eq!(std::fs::read_to_string(&input)?, original);

        Ok(())
    }

    #[rstest::rstest]
    #[case(BlankLinePolicy::Skip, "chr1\t1\t2\nchrX\t3\t4\n")]
    #[case(BlankLinePolicy::Stop, "chr1\t1\t2\n")]
    fn translate_blank_lines(
        #[case] policy: BlankLinePolicy,
        #[case] expected: &str,
    ) -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let input = tmp_dir.join("regions.bed");
        std::fs::write(&input, "1\t1\t2\n\nX\t3\t4\n")?;

        let mapping = ChromosomeMapping::load(GenomeRelease::Grch37);
        let translated =
            translate_leading_column(&input, &mapping, Direction::EnsemblToUcsc, policy)?;

        assert_eq!(translated.blank, 1);
        assert_eq!(std::fs::read_to_string(&translated.path)?, expected);

        Ok(())
    }

    #[test]
    fn run_translate_contigs() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let input = tmp_dir.join("genes.tsv");
        std::fs::write(&input, "chr1\tA\nchrMT\tB\nchrM\tC\n")?;
        let input_arg = input.to_string_lossy().into_owned();
        let args = Args::try_parse_from([
            "translate-contigs",
            "--path-input",
            input_arg.as_str(),
            "--genome-release",
            "grch37",
            "--direction",
            "ucsc-to-ensembl",
        ])?;

        run(&crate::common::Args::default(), &args)?;

        assert_eq!(
            std::fs::read_to_string(tmp_dir.join("genes.ensembl.tsv"))?,
            "1\tA\nMT\tC\n"
        );
        Ok(())
    }

    #[test]
    fn translated_path_without_extension() {
        assert_eq!(
            translated_path(Path::new("/tmp/contigs"), Direction::UcscToEnsembl),
            PathBuf::from("/tmp/contigs.ensembl")
        );
    }
}
