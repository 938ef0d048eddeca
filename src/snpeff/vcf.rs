//! Reading snpEff-annotated VCF files and writing the translatable records.

use std::{collections::HashSet, path::Path};

use enum_map::EnumMap;
use indexmap::IndexSet;
use noodles::vcf;
use thousands::Separable;

use crate::{
    common::io::write_atomically,
    snpeff::ann::{classify_impact, is_translatable, unknown_effects, Impact, VariantEffectRecord},
};

/// An annotation entry that survived filtering, with its variant.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TranslatableRecord {
    pub chrom: String,
    /// 1-based position.
    pub pos: usize,
    pub reference: String,
    pub impact: Impact,
    pub effect: VariantEffectRecord,
}

/// Result of `interpret_vcf`.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Interpretation {
    /// Translatable entries in file order.
    pub records: Vec<TranslatableRecord>,
    /// Number of annotation entries per impact, over all entries.
    pub impact_counts: EnumMap<Impact, usize>,
    /// Effect tags not belonging to any impact tier, in order of appearance.
    pub unknown_effects: IndexSet<String>,
    /// Number of VCF records read.
    pub variants: usize,
    /// Number of annotation entries read.
    pub effects: usize,
    /// Number of entries excluded for a bad transcript or protein.
    pub excluded: usize,
}

/// Extract the raw `INFO/ANN` entries of `record`.
fn ann_entries(record: &vcf::variant::RecordBuf) -> Result<Vec<String>, anyhow::Error> {
    use vcf::variant::record_buf::info::field::{value::Array, Value};

    match record.info().get("ANN") {
        Some(Some(Value::Array(Array::String(ann)))) => Ok(ann.iter().flatten().cloned().collect()),
        Some(Some(Value::String(ann))) => Ok(vec![ann.clone()]),
        Some(Some(_)) => anyhow::bail!("invalid type of INFO/ANN"),
        Some(None) | None => Ok(Vec::new()),
    }
}

/// Read the snpEff-annotated VCF at `path` and keep the translatable entries.
///
/// Entries with a bad-transcript warning or on a transcript/protein in
/// `bad_accessions` are counted as excluded.  Each unknown effect tag is
/// logged once.
pub fn interpret_vcf(
    path: &Path,
    bad_accessions: &HashSet<String>,
) -> Result<Interpretation, anyhow::Error> {
    tracing::info!("interpreting annotations in {:?}", path);
    let mut reader = vcf::io::reader::Builder::default()
        .build_from_path(path)
        .map_err(|e| anyhow::anyhow!("could not open {:?}: {}", path, e))?;
    let header = reader.read_header()?;

    let mut result = Interpretation::default();
    for record in reader.records() {
        let record = vcf::variant::RecordBuf::try_from_variant_record(&header, &record?)?;
        result.variants += 1;

        let chrom = record.reference_sequence_name().to_string();
        let pos = record.variant_start().map(usize::from).unwrap_or_default();
        let reference = record.reference_bases().to_string();

        for entry in ann_entries(&record)? {
            let effect = entry
                .parse::<VariantEffectRecord>()
                .map_err(|e| anyhow::anyhow!("{}:{}: {}", chrom, pos, e))?;
            result.effects += 1;

            for tag in unknown_effects(&effect) {
                if result.unknown_effects.insert(tag.to_owned()) {
                    tracing::warn!("unknown effect {:?}, counted as {}", tag, Impact::Modifier);
                }
            }
            let impact = classify_impact(&effect);
            result.impact_counts[impact] += 1;

            if is_translatable(&effect, bad_accessions) {
                result.records.push(TranslatableRecord {
                    chrom: chrom.clone(),
                    pos,
                    reference: reference.clone(),
                    impact,
                    effect,
                });
            } else {
                result.excluded += 1;
            }
        }
    }

    tracing::info!(
        "{} variants with {} annotations, {} translatable, {} excluded",
        result.variants.separate_with_commas(),
        result.effects.separate_with_commas(),
        result.records.len().separate_with_commas(),
        result.excluded.separate_with_commas()
    );
    Ok(result)
}

/// One line of the translatable TSV.
#[derive(Debug, serde::Serialize)]
struct TsvRow<'a> {
    chrom: &'a str,
    pos: usize,
    reference: &'a str,
    allele: &'a str,
    gene_name: &'a str,
    gene_id: &'a str,
    feature_id: &'a str,
    transcript_biotype: &'a str,
    effects: String,
    impact: Impact,
    hgvs_c: &'a str,
    hgvs_p: &'a str,
    protein_position: String,
    synonymous: bool,
    frameshift: bool,
}

impl<'a> From<&'a TranslatableRecord> for TsvRow<'a> {
    fn from(record: &'a TranslatableRecord) -> Self {
        let effect = &record.effect;
        Self {
            chrom: &record.chrom,
            pos: record.pos,
            reference: &record.reference,
            allele: &effect.allele,
            gene_name: &effect.gene_name,
            gene_id: &effect.gene_id,
            feature_id: &effect.feature_id,
            transcript_biotype: &effect.transcript_biotype,
            effects: effect.effects.join("&"),
            impact: record.impact,
            hgvs_c: &effect.hgvs_c,
            hgvs_p: &effect.hgvs_p,
            protein_position: effect.protein.to_string(),
            synonymous: effect.synonymous,
            frameshift: effect.frameshift,
        }
    }
}

/// Write the translatable records of `interpretation` as TSV with header.
pub fn write_translatable_tsv(path: &Path, interpretation: &Interpretation) -> Result<(), anyhow::Error> {
    write_atomically(path, |w| {
        let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(w);
        for record in &interpretation.records {
            writer.serialize(TsvRow::from(record))?;
        }
        writer.flush()?;
        Ok(())
    })?;
    tracing::debug!(
        "wrote {} translatable records to {:?}",
        interpretation.records.len(),
        path
    );
    Ok(())
}

/// Counts of an interpretation, written next to the TSV.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ImpactSummary {
    pub variants: usize,
    pub effects: usize,
    pub translatable: usize,
    pub excluded: usize,
    pub impact_counts: EnumMap<Impact, usize>,
    pub unknown_effects: Vec<String>,
}

impl From<&Interpretation> for ImpactSummary {
    fn from(interpretation: &Interpretation) -> Self {
        Self {
            variants: interpretation.variants,
            effects: interpretation.effects,
            translatable: interpretation.records.len(),
            excluded: interpretation.excluded,
            impact_counts: interpretation.impact_counts,
            unknown_effects: interpretation.unknown_effects.iter().cloned().collect(),
        }
    }
}

/// Write the impact summary of `interpretation` as JSON.
pub fn write_impact_summary(path: &Path, interpretation: &Interpretation) -> Result<(), anyhow::Error> {
    write_atomically(path, |w| {
        serde_json::to_writer_pretty(w, &ImpactSummary::from(interpretation))?;
        Ok(())
    })
}

#[cfg(test)]
pub mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    /// A small annotated VCF with one missense, one synonymous and one
    /// bad-transcript entry, plus an unknown effect tag.
    pub const ANNOTATED_VCF: &str = "##fileformat=VCFv4.2\n\
##INFO=<ID=ANN,Number=.,Type=String,Description=\"Functional annotations\">\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
1\t1000\t.\tG\tA\t50\tPASS\tANN=A|missense_variant|MODERATE|GENE1|ENSG01|transcript|ENST01.1|protein_coding|2/5|c.35G>A|p.Gly12Asp|100/2000|35/900|12/299||,A|made_up_effect|MODIFIER|GENE1|ENSG01|transcript|ENST02|protein_coding||||||||\n\
2\t2000\t.\tC\tT\t50\tPASS\tANN=T|synonymous_variant|LOW|GENE2|ENSG02|transcript|ENST03|protein_coding|1/3|c.9C>T|p.Leu3Leu|50/800|9/600|3/199||,T|stop_gained|HIGH|GENE2|ENSG02|transcript|ENST04|protein_coding|1/3|c.9C>T|p.Gln3*|50/800|9/600|3/199||WARNING_TRANSCRIPT_INCOMPLETE\n";

    #[tracing_test::traced_test]
    #[test]
    fn interpret_small_vcf() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("sample.snpEffAnnotated.vcf");
        std::fs::write(&path, ANNOTATED_VCF)?;

        let interpretation = interpret_vcf(&path, &HashSet::new())?;

        assert_eq!(interpretation.variants, 2);
        assert_eq!(interpretation.effects, 4);
        assert_eq!(interpretation.excluded, 1);
        assert_eq!(
            interpretation
                .records
                .iter()
                .map(|r| r.effect.feature_id.as_str())
                .collect::<Vec<_>>(),
            vec!["ENST01.1", "ENST02", "ENST03"]
        );
        assert_eq!(interpretation.records[0].chrom, "1");
        assert_eq!(interpretation.records[0].pos, 1000);
        assert_eq!(interpretation.records[0].reference, "G");
        assert_eq!(interpretation.records[0].impact, Impact::Moderate);
        assert!(interpretation.records[2].effect.synonymous);
        assert_eq!(interpretation.impact_counts[Impact::High], 1);
        assert_eq!(interpretation.impact_counts[Impact::Moderate], 1);
        assert_eq!(interpretation.impact_counts[Impact::Low], 1);
        assert_eq!(interpretation.impact_counts[Impact::Modifier], 1);
        assert_eq!(
            interpretation.unknown_effects.iter().collect::<Vec<_>>(),
            vec!["made_up_effect"]
        );
        assert!(logs_contain("unknown effect \"made_up_effect\""));
        Ok(())
    }

    #[test]
    fn interpret_excludes_bad_proteins() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("sample.snpEffAnnotated.vcf");
        std::fs::write(&path, ANNOTATED_VCF)?;
        let bad = ["ENST01".to_string()].into_iter().collect::<HashSet<_>>();

        let interpretation = interpret_vcf(&path, &bad)?;

        assert_eq!(interpretation.excluded, 2);
        assert_eq!(interpretation.records.len(), 2);
        Ok(())
    }

    #[test]
    fn write_tsv_and_summary() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("sample.snpEffAnnotated.vcf");
        std::fs::write(&path, ANNOTATED_VCF)?;
        let interpretation = interpret_vcf(&path, &HashSet::new())?;

        let tsv = tmp_dir.join("sample.translatable.tsv");
        write_translatable_tsv(&tsv, &interpretation)?;
        let lines = std::fs::read_to_string(&tsv)?
            .lines()
            .map(|s| s.to_owned())
            .collect::<Vec<_>>();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            "chrom\tpos\treference\tallele\tgene_name\tgene_id\tfeature_id\t\
             transcript_biotype\teffects\timpact\thgvs_c\thgvs_p\tprotein_position\t\
             synonymous\tframeshift"
        );
        assert_eq!(
            lines[1],
            "1\t1000\tG\tA\tGENE1\tENSG01\tENST01.1\tprotein_coding\tmissense_variant\t\
             MODERATE\tc.35G>A\tp.Gly12Asp\t12/299\tfalse\tfalse"
        );

        let json = tmp_dir.join("sample.impact.json");
        write_impact_summary(&json, &interpretation)?;
        let summary: ImpactSummary = serde_json::from_reader(std::fs::File::open(&json)?)?;
        assert_eq!(summary, ImpactSummary::from(&interpretation));
        assert_eq!(summary.translatable, 3);
        Ok(())
    }
}
