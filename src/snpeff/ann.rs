//! Parsing and classification of snpEff `ANN` entries.

use std::collections::HashSet;

use crate::err::AnnError;

/// Minimal number of `|`-separated fields; the warnings field may be absent.
pub const MIN_FIELDS: usize = 15;

/// Effects with high putative impact.
pub const HIGH_EFFECTS: &[&str] = &[
    "chromosome_number_variation",
    "exon_loss_variant",
    "frameshift_variant",
    "rare_amino_acid_variant",
    "splice_acceptor_variant",
    "splice_donor_variant",
    "start_lost",
    "stop_gained",
    "stop_lost",
    "transcript_ablation",
];

/// Effects with moderate putative impact.
pub const MODERATE_EFFECTS: &[&str] = &[
    "3_prime_UTR_truncation",
    "exon_loss",
    "5_prime_UTR_truncation",
    "exon_loss_variant",
    "coding_sequence_variant",
    "conservative_inframe_insertion",
    "conservative_inframe_deletion",
    "disruptive_inframe_deletion",
    "disruptive_inframe_insertion",
    "inframe_deletion",
    "inframe_insertion",
    "missense_variant",
    "regulatory_region_ablation",
    "splice_region_variant",
    "TFBS_ablation",
];

/// Effects with low putative impact.
pub const LOW_EFFECTS: &[&str] = &[
    "5_prime_UTR_premature_start_codon_gain_variant",
    "initiator_codon_variant",
    "splice_region_variant",
    "start_retained",
    "stop_retained_variant",
    "synonymous_variant",
    "sequence_feature",
];

/// Effects without predicted impact on the protein.
pub const MODIFIER_EFFECTS: &[&str] = &[
    "3_prime_UTR_variant",
    "5_prime_UTR_variant",
    "coding_sequence_variant",
    "conserved_intergenic_variant",
    "conserved_intron_variant",
    "downstream_gene_variant",
    "exon_variant",
    "feature_elongation",
    "feature_truncation",
    "gene_variant",
    "intergenic_region",
    "intragenic_variant",
    "intron_variant",
    "mature_miRNA_variant",
    "miRNA",
    "NMD_transcript_variant",
    "non_coding_transcript_exon_variant",
    "non_coding_transcript_variant",
    "regulatory_region_amplification",
    "regulatory_region_variant",
    "TF_binding_site_variant",
    "TFBS_amplification",
    "transcript_amplification",
    "transcript_variant",
    "upstream_gene_variant",
];

/// Effects changing the protein sequence.
pub const NON_SYNONYMOUS_EFFECTS: &[&str] = &[
    "exon_loss_variant",
    "frameshift_variant",
    "rare_amino_acid_variant",
    "start_lost",
    "stop_gained",
    "stop_lost",
    "conservative_inframe_insertion",
    "conservative_inframe_deletion",
    "disruptive_inframe_deletion",
    "disruptive_inframe_insertion",
    "inframe_deletion",
    "inframe_insertion",
    "missense_variant",
];

/// Warnings indicating an unreliable transcript model.
pub const BAD_TRANSCRIPT_WARNINGS: &[&str] = &[
    "WARNING_TRANSCRIPT_INCOMPLETE",
    "WARNING_TRANSCRIPT_MULTIPLE_STOP_CODONS",
    "WARNING_TRANSCRIPT_NO_STOP_CODON",
    "WARNING_TRANSCRIPT_NO_START_CODON",
];

/// Putative impact, ordered from least to most severe.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    enum_map::Enum,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Impact {
    Modifier,
    Low,
    Moderate,
    High,
}

impl Impact {
    /// Effects of the tier.
    pub fn effects(self) -> &'static [&'static str] {
        match self {
            Impact::High => HIGH_EFFECTS,
            Impact::Moderate => MODERATE_EFFECTS,
            Impact::Low => LOW_EFFECTS,
            Impact::Modifier => MODIFIER_EFFECTS,
        }
    }
}

/// A `value/total` pair where either side may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Ratio {
    pub value: Option<u32>,
    pub total: Option<u32>,
}

impl std::str::FromStr for Ratio {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, total) = s.split_once('/').unwrap_or((s, ""));
        Ok(Ratio {
            value: value.trim().parse().ok(),
            total: total.trim().parse().ok(),
        })
    }
}

impl std::fmt::Display for Ratio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let part = |v: Option<u32>| v.map(|v| v.to_string()).unwrap_or_default();
        if self.value.is_none() && self.total.is_none() {
            return Ok(());
        }
        write!(f, "{}/{}", part(self.value), part(self.total))
    }
}

/// One parsed `ANN` entry, i.e., the effect of an allele on one feature.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VariantEffectRecord {
    pub allele: String,
    pub effects: Vec<String>,
    /// Impact as written by snpEff, if recognized.
    pub putative_impact: Option<Impact>,
    pub gene_name: String,
    pub gene_id: String,
    pub feature_type: String,
    pub feature_id: String,
    pub transcript_biotype: String,
    /// Exon or intron rank and total.
    pub rank: Ratio,
    pub hgvs_c: String,
    pub hgvs_p: String,
    pub cdna: Ratio,
    pub cds: Ratio,
    pub protein: Ratio,
    pub distance: Option<i64>,
    pub warnings: Vec<String>,
    /// No effect changes the protein sequence.
    pub synonymous: bool,
    pub frameshift: bool,
    /// A warning flags the transcript model as unreliable.
    pub bad_transcript: bool,
}

impl std::str::FromStr for VariantEffectRecord {
    type Err = AnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields = s.split('|').collect::<Vec<_>>();
        if fields.len() < MIN_FIELDS {
            return Err(AnnError::TooFewFields {
                expected: MIN_FIELDS,
                actual: fields.len(),
                line: s.to_owned(),
            });
        }
        let tags = |s: &str| {
            s.split('&')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect::<Vec<_>>()
        };
        let ratio = |s: &str| s.parse::<Ratio>().unwrap_or_default();

        let effects = tags(fields[1]);
        let warnings = fields.get(15).copied().map(tags).unwrap_or_default();
        let synonymous = !effects
            .iter()
            .any(|e| NON_SYNONYMOUS_EFFECTS.contains(&e.as_str()));
        let frameshift = effects.iter().any(|e| e == "frameshift_variant");
        let bad_transcript = warnings
            .iter()
            .any(|w| BAD_TRANSCRIPT_WARNINGS.contains(&w.as_str()));

        Ok(VariantEffectRecord {
            allele: fields[0].to_owned(),
            putative_impact: fields[2].trim().parse().ok(),
            gene_name: fields[3].to_owned(),
            gene_id: fields[4].to_owned(),
            feature_type: fields[5].to_owned(),
            feature_id: fields[6].to_owned(),
            transcript_biotype: fields[7].to_owned(),
            rank: ratio(fields[8]),
            hgvs_c: fields[9].to_owned(),
            hgvs_p: fields[10].to_owned(),
            cdna: ratio(fields[11]),
            cds: ratio(fields[12]),
            protein: ratio(fields[13]),
            distance: fields[14].trim().parse().ok(),
            effects,
            warnings,
            synonymous,
            frameshift,
            bad_transcript,
        })
    }
}

/// The most severe tier any effect of `record` falls into.
///
/// Records without a known effect are `Impact::Modifier`; see
/// `unknown_effects` for the tags that were not recognized.
pub fn classify_impact(record: &VariantEffectRecord) -> Impact {
    [Impact::High, Impact::Moderate, Impact::Low, Impact::Modifier]
        .into_iter()
        .find(|impact| {
            record
                .effects
                .iter()
                .any(|e| impact.effects().contains(&e.as_str()))
        })
        .unwrap_or(Impact::Modifier)
}

/// Effects of `record` that belong to no impact tier.
pub fn unknown_effects(record: &VariantEffectRecord) -> Vec<&str> {
    record
        .effects
        .iter()
        .map(String::as_str)
        .filter(|e| {
            ![HIGH_EFFECTS, MODERATE_EFFECTS, LOW_EFFECTS, MODIFIER_EFFECTS]
                .iter()
                .any(|tier| tier.contains(e))
        })
        .collect()
}

/// Whether the protein of `record` can be translated reliably.
pub fn is_translatable(record: &VariantEffectRecord, bad_accessions: &HashSet<String>) -> bool {
    if record.bad_transcript {
        return false;
    }
    let unversioned = record
        .feature_id
        .split_once('.')
        .map(|(id, _)| id)
        .unwrap_or(&record.feature_id);
    !bad_accessions.contains(&record.feature_id) && !bad_accessions.contains(unversioned)
}

/// Human-readable explanation of a snpEff warning or error code.
pub fn warning_description(tag: &str) -> Option<&'static str> {
    Some(match tag {
        "ERROR_CHROMOSOME_NOT_FOUND" => {
            "Chromosome does not exist in reference genome database. Typically indicates a \
             mismatch between the chromosome names in the input file and the chromosome names \
             used in the reference genome."
        }
        "ERROR_OUT_OF_CHROMOSOME_RANGE" => {
            "The variant's genomic coordinate is greater than chromosome's length."
        }
        "WARNING_REF_DOES_NOT_MATCH_GENOME" => {
            "The 'REF' field in the input VCF file does not match the reference genome."
        }
        "WARNING_SEQUENCE_NOT_AVAILABLE" => {
            "Reference sequence is not available, thus no inference could be performed."
        }
        "WARNING_TRANSCRIPT_INCOMPLETE" => {
            "A protein coding transcript having a non-multiple of 3 length. It indicates that \
             the reference genome has missing information about this particular transcript."
        }
        "WARNING_TRANSCRIPT_MULTIPLE_STOP_CODONS" => {
            "A protein coding transcript has two or more STOP codons in the middle of the coding \
             sequence (CDS). This usually means the reference genome may have an error in this \
             transcript."
        }
        "WARNING_TRANSCRIPT_NO_START_CODON" => {
            "A protein coding transcript does not have a proper START codon. This probably \
             indicates an error or missing information in the reference genome."
        }
        "WARNING_TRANSCRIPT_NO_STOP_CODON" => {
            "A protein coding transcript does not have a proper STOP codon. This probably \
             indicates an error or missing information in the reference genome."
        }
        "INFO_REALIGN_3_PRIME" => {
            "Variant has been realigned to the most 3-prime position within the transcript, \
             as required by the HGVS specification."
        }
        "INFO_COMPOUND_ANNOTATION" => "This effect is a result of combining more than one variants.",
        "INFO_NON_REFERENCE_ANNOTATION" => {
            "An alternative reference sequence was used to calculate this annotation."
        }
        _ => return None,
    })
}
