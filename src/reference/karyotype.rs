//! Karyotypic ordering of genome FASTA files.

use std::{
    fs::File,
    io::{BufRead, BufReader, Read as _, Seek, SeekFrom, Write as _},
    path::{Path, PathBuf},
};

use indexmap::IndexMap;

use crate::{
    common::{
        build_chrom_map,
        io::{open_read_maybe_gz, write_atomically},
    },
    pipeline::gate::is_present,
};

/// Result of `normalize_karyotypic_order`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderedGenome {
    /// Path of the genome in karyotypic order.
    pub path: PathBuf,
    /// Whether the genome was rewritten in this call.
    pub rewritten: bool,
}

/// Output path of reordering `genome`: `<stem>.karyotypic.fa`.
pub fn karyotypic_path(genome: &Path) -> PathBuf {
    let name = genome
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    let stem = Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    genome.with_file_name(format!("{}.karyotypic.fa", stem))
}

/// Contig names of `genome` in file order.
pub fn genome_contigs(genome: &Path) -> Result<Vec<String>, anyhow::Error> {
    let reader = open_read_maybe_gz(genome)
        .map_err(|e| anyhow::anyhow!("could not open {:?}: {}", genome, e))?;
    let mut result = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if let Some(header) = line.strip_prefix('>') {
            result.push(header.split_whitespace().next().unwrap_or_default().to_owned());
        }
    }
    Ok(result)
}

/// `contigs` in karyotypic order: 1-22, X, Y, MT, then the rest in input
/// order.
pub fn karyotypic_order(contigs: &[String]) -> Vec<String> {
    let ranks = build_chrom_map();
    let mut sorted = contigs.iter().enumerate().collect::<Vec<_>>();
    sorted.sort_by_key(|(idx, name)| {
        (
            ranks.get(name.as_str()).copied().unwrap_or(ranks.len()),
            *idx,
        )
    });
    sorted.into_iter().map(|(_, name)| name.clone()).collect()
}

/// Whether `contigs` already are in karyotypic order.
pub fn is_karyotypic(contigs: &[String]) -> bool {
    karyotypic_order(contigs) == contigs
}

/// Byte range of one record in an uncompressed FASTA file.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RecordSpan {
    start: u64,
    len: u64,
    /// Whether the last line of the record ends with a newline.
    terminated: bool,
}

/// Byte ranges of the records of the uncompressed FASTA `reader`, by contig.
fn record_spans<R: BufRead>(mut reader: R) -> Result<IndexMap<String, RecordSpan>, anyhow::Error> {
    let mut result: IndexMap<String, RecordSpan> = IndexMap::new();
    let mut current = None;
    let mut offset = 0u64;
    let mut line = Vec::new();
    loop {
        line.clear();
        let len = reader.read_until(b'\n', &mut line)? as u64;
        if len == 0 {
            break;
        }
        if let Some(header) = line.strip_prefix(b">") {
            let name = String::from_utf8_lossy(header)
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_owned();
            if result.contains_key(&name) {
                anyhow::bail!("duplicate contig {} in genome", name);
            }
            current = Some(result.len());
            result.insert(
                name,
                RecordSpan {
                    start: offset,
                    len: 0,
                    terminated: true,
                },
            );
        }
        if let Some(idx) = current {
            let span = &mut result[idx];
            span.len += len;
            span.terminated = line.ends_with(b"\n");
        }
        offset += len;
    }
    Ok(result)
}

/// Bring the records of `genome` into karyotypic order.
///
/// A present `<stem>.karyotypic.fa` is returned as is.  A genome that already
/// is in karyotypic order is returned without writing anything.  Records are
/// copied byte-wise by offset so that only one line is held in memory; a
/// gzipped genome is decompressed next to the output first.
pub fn normalize_karyotypic_order(genome: &Path) -> Result<ReorderedGenome, anyhow::Error> {
    let output = karyotypic_path(genome);
    if is_present(&output) {
        tracing::info!("karyotypic genome {:?} already present", &output);
        return Ok(ReorderedGenome {
            path: output,
            rewritten: false,
        });
    }

    let contigs = genome_contigs(genome)?;
    if is_karyotypic(&contigs) {
        tracing::info!("genome {:?} already is in karyotypic order", genome);
        return Ok(ReorderedGenome {
            path: genome.to_path_buf(),
            rewritten: false,
        });
    }

    tracing::info!(
        "reordering {} contigs of {:?} into {:?}",
        contigs.len(),
        genome,
        &output
    );
    let decompressed = if genome.extension().map(|ext| ext == "gz").unwrap_or(false) {
        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::io::copy(&mut open_read_maybe_gz(genome)?, tmp.as_file_mut())?;
        Some(tmp)
    } else {
        None
    };
    let source = decompressed.as_ref().map(|tmp| tmp.path()).unwrap_or(genome);

    let spans = record_spans(BufReader::new(File::open(source)?))?;
    let mut input = File::open(source)?;
    write_atomically(&output, |writer| {
        for contig in karyotypic_order(&contigs) {
            let span = spans
                .get(&contig)
                .ok_or_else(|| anyhow::anyhow!("contig {} vanished from {:?}", contig, source))?;
            input.seek(SeekFrom::Start(span.start))?;
            std::io::copy(&mut (&mut input).take(span.len), writer)?;
            if !span.terminated {
                writer.write_all(b"\n")?;
            }
        }
        Ok(())
    })?;
    crate::common::trace_rss_now();

    Ok(ReorderedGenome {
        path: output,
        rewritten: true,
    })
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[rstest::rstest]
    #[case(&["1", "2", "10", "X", "Y", "MT", "GL000192.1"], true)]
    #[case(&["chr1", "chr2", "chrX", "chrM", "chr1_gl000191_random"], true)]
    #[case(&["1", "10", "2"], false)]
    #[case(&["GL000192.1", "1"], false)]
    fn karyotypic_detection(#[case] contigs: &[&str], #[case] expected: bool) {
        assert_eq!(is_karyotypic(&names(contigs)), expected);
    }

    #[test]
    fn karyotypic_order_keeps_rest_in_file_order() {
        assert_eq!(
            karyotypic_order(&names(&["KI2.1", "10", "X", "GL1.1", "1", "MT"])),
            names(&["1", "10", "X", "MT", "KI2.1", "GL1.1"])
        );
    }

    #[test]
    fn reorder_rewrites_once() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let genome = tmp_dir.join("genome.fa");
        std::fs::write(&genome, ">2 dna\nCCCC\n>GL1.1\nGGGG\n>1 dna\nAAAA\n")?;

        let reordered = normalize_karyotypic_order(&genome)?;

        assert!(reordered.rewritten);
        assert_eq!(reordered.path, tmp_dir.join("genome.karyotypic.fa"));
        assert_eq!(genome_contigs(&reordered.path)?, names(&["1", "2", "GL1.1"]));
        assert_eq!(
            std::fs::read_to_string(&reordered.path)?,
            ">1 dna\nAAAA\n>2 dna\nCCCC\n>GL1.1\nGGGG\n"
        );

        std::fs::remove_file(&genome)?;
        let again = normalize_karyotypic_order(&genome)?;
        assert!(!again.rewritten);
        assert_eq!(again.path, reordered.path);
        Ok(())
    }

    #[test]
    fn reorder_karyotypic_genome_is_noop() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let genome = tmp_dir.join("genome.fa");
        let contents = ">1\nAAAA\n>2\nCCCC\n>X\nGGGG\n";
        std::fs::write(&genome, contents)?;

        for _ in 0..2 {
            let reordered = normalize_karyotypic_order(&genome)?;
            assert!(!reordered.rewritten);
            assert_eq!(reordered.path, genome);
        }

        assert!(!tmp_dir.join("genome.karyotypic.fa").exists());
        assert_eq!(std::fs::read_to_string(&genome)?, contents);
        assert_eq!(genome_contigs(&genome)?, names(&["1", "2", "X"]));
        Ok(())
    }

    #[test]
    fn reorder_gzipped_genome() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let genome = tmp_dir.join("genome.fa.gz");
        let mut encoder = flate2::write::GzEncoder::new(
            std::fs::File::create(&genome)?,
            flate2::Compression::default(),
        );
        encoder.write_all(b">X\nGG\nGG\n>1 dna:chromosome\nAAAA\n>2\nCC")?;
        encoder.finish()?;

        let reordered = normalize_karyotypic_order(&genome)?;

        assert!(reordered.rewritten);
        assert_eq!(
            std::fs::read_to_string(&reordered.path)?,
            ">1 dna:chromosome\nAAAA\n>2\nCC\n>X\nGG\nGG\n"
        );
        let leftovers = std::fs::read_dir(&*tmp_dir)?.count();
        assert_eq!(leftovers, 2);
        Ok(())
    }

    #[test]
    fn reorder_rejects_duplicate_contigs() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let genome = tmp_dir.join("genome.fa");
        std::fs::write(&genome, ">2\nCC\n>1\nAA\n>2\nGG\n")?;

        assert!(normalize_karyotypic_order(&genome).is_err());
        assert!(!tmp_dir.join("genome.karyotypic.fa").exists());
        Ok(())
    }

    #[rstest::rstest]
    #[case("/ref/Homo_sapiens.GRCh38.dna.primary_assembly.fa", "/ref/Homo_sapiens.GRCh38.dna.primary_assembly.karyotypic.fa")]
    #[case("/ref/genome.fa.gz", "/ref/genome.karyotypic.fa")]
    fn karyotypic_path_names(#[case] genome: &str, #[case] expected: &str) {
        assert_eq!(karyotypic_path(Path::new(genome)), PathBuf::from(expected));
    }
}
