//! Restricting a gene model to the contigs of the genome.

use std::{
    io::{BufRead, Write},
    path::{Path, PathBuf},
};

use indexmap::IndexSet;

use crate::{
    common::io::{open_read_maybe_gz, write_atomically},
    pipeline::gate::is_present,
    tools::with_infix,
};

/// Result of `filter_gene_model`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredGeneModel {
    pub path: PathBuf,
    /// Whether the file was written in this call.
    pub written: bool,
    /// Contigs of the gene model missing from the genome, in file order.
    pub dropped_contigs: Vec<String>,
}

/// Output path of filtering `gene_model`: `<stem>.filtered<ext>`.
pub fn filtered_path(gene_model: &Path) -> PathBuf {
    with_infix(gene_model, "filtered")
}

/// Contigs referenced by the records of a GTF/GFF3 file, in file order.
pub fn gene_model_contigs(gene_model: &Path) -> Result<IndexSet<String>, anyhow::Error> {
    let mut result = IndexSet::new();
    for line in open_read_maybe_gz(gene_model)?.lines() {
        let line = line?;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(contig) = line.split('\t').next() {
            if !result.contains(contig) {
                result.insert(contig.to_owned());
            }
        }
    }
    Ok(result)
}

/// Keep the comment lines of `gene_model` and the records on a contig in
/// `genome_contigs`.
///
/// Nothing is done if the output is already present.
pub fn filter_gene_model(
    gene_model: &Path,
    genome_contigs: &[String],
) -> Result<FilteredGeneModel, anyhow::Error> {
    let output = filtered_path(gene_model);
    if is_present(&output) {
        tracing::info!("filtered gene model {:?} already present", &output);
        return Ok(FilteredGeneModel {
            path: output,
            written: false,
            dropped_contigs: Vec::new(),
        });
    }

    let keep = genome_contigs.iter().map(String::as_str).collect::<IndexSet<_>>();
    let reader = open_read_maybe_gz(gene_model)
        .map_err(|e| anyhow::anyhow!("could not open {:?}: {}", gene_model, e))?;
    let mut dropped_contigs = IndexSet::new();
    let mut kept = 0usize;
    let mut dropped = 0usize;
    write_atomically(&output, |writer| {
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            if !line.starts_with('#') {
                let contig = line.split('\t').next().unwrap_or_default();
                if !keep.contains(contig) {
                    if !dropped_contigs.contains(contig) {
                        dropped_contigs.insert(contig.to_owned());
                    }
                    dropped += 1;
                    continue;
                }
                kept += 1;
            }
            writeln!(writer, "{}", line)?;
        }
        Ok(())
    })?;

    tracing::info!(
        "kept {} gene model records, dropped {} on {} contigs missing from the genome",
        kept,
        dropped,
        dropped_contigs.len()
    );
    Ok(FilteredGeneModel {
        path: output,
        written: true,
        dropped_contigs: dropped_contigs.into_iter().collect(),
    })
}
