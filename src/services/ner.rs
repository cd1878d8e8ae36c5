//! Biomedical named-entity recognition.
//!
//! Recognition combines a curated lexicon with morphological rules
//! (drug suffixes, gene-symbol shapes, disease suffixes). The configured
//! model name selects the label inventory: the BioNLP models emit
//! fine-grained labels, the generic scientific models collapse everything
//! to `ENTITY`.
use std::collections::{BTreeMap, HashMap, HashSet};

use regex::Regex;

use crate::domain::{
    EntityProfile, EntityType, ExtractedEntity, SentenceEntities, normalize_entity,
};

/// Default minimum number of sentences an entity must appear in.
pub const DEFAULT_MIN_OCCURRENCES: usize = 4;

/// Label inventory emitted by the configured model.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ModelProfile {
    /// Fine-grained BioNLP13CG-style labels.
    FineGrained,
    /// Single generic `ENTITY` label.
    Generic,
}

impl ModelProfile {
    fn from_model_name(name: &str) -> Self {
        if name.contains("bionlp") || name.contains("craft") {
            Self::FineGrained
        } else {
            Self::Generic
        }
    }
}

pub struct EntityRecognizer {
    model_name: String,
    profile: ModelProfile,
    pub min_entity_occurrences: usize,
    lexicon: HashMap<&'static str, &'static str>,
    skip_words: HashSet<&'static str>,
    exclude_patterns: Vec<Regex>,
    initials: Regex,
    short_token: Regex,
    token: Regex,
    gene_symbol: Regex,
}

/// Curated term -> raw label entries. Multi-word terms are matched before
/// their constituents.
const LEXICON: &[(&str, &str)] = &[
    // Genes and gene products
    ("egfr", "GENE_OR_GENE_PRODUCT"),
    ("kras", "GENE_OR_GENE_PRODUCT"),
    ("tp53", "GENE_OR_GENE_PRODUCT"),
    ("p53", "GENE_OR_GENE_PRODUCT"),
    ("brca1", "GENE_OR_GENE_PRODUCT"),
    ("brca2", "GENE_OR_GENE_PRODUCT"),
    ("her2", "GENE_OR_GENE_PRODUCT"),
    ("braf", "GENE_OR_GENE_PRODUCT"),
    ("alk", "GENE_OR_GENE_PRODUCT"),
    ("vegf", "GENE_OR_GENE_PRODUCT"),
    ("tnf-alpha", "GENE_OR_GENE_PRODUCT"),
    ("interleukin-6", "GENE_OR_GENE_PRODUCT"),
    ("il-6", "GENE_OR_GENE_PRODUCT"),
    ("tgf-beta", "GENE_OR_GENE_PRODUCT"),
    ("mtor", "GENE_OR_GENE_PRODUCT"),
    ("akt", "GENE_OR_GENE_PRODUCT"),
    ("pi3k", "GENE_OR_GENE_PRODUCT"),
    ("insulin", "GENE_OR_GENE_PRODUCT"),
    ("hemoglobin", "GENE_OR_GENE_PRODUCT"),
    ("cytochrome p450", "GENE_OR_GENE_PRODUCT"),
    // Chemicals and drugs
    ("gefitinib", "SIMPLE_CHEMICAL"),
    ("erlotinib", "SIMPLE_CHEMICAL"),
    ("imatinib", "SIMPLE_CHEMICAL"),
    ("cisplatin", "SIMPLE_CHEMICAL"),
    ("doxorubicin", "SIMPLE_CHEMICAL"),
    ("paclitaxel", "SIMPLE_CHEMICAL"),
    ("tamoxifen", "SIMPLE_CHEMICAL"),
    ("metformin", "SIMPLE_CHEMICAL"),
    ("aspirin", "SIMPLE_CHEMICAL"),
    ("glucose", "SIMPLE_CHEMICAL"),
    ("dopamine", "SIMPLE_CHEMICAL"),
    ("serotonin", "SIMPLE_CHEMICAL"),
    ("cortisol", "SIMPLE_CHEMICAL"),
    ("calcium", "ION"),
    ("sodium", "ION"),
    ("potassium", "ION"),
    ("glutamate", "AMINO_ACID"),
    ("glycine", "AMINO_ACID"),
    // Diseases
    ("breast cancer", "CANCER"),
    ("lung cancer", "CANCER"),
    ("colorectal cancer", "CANCER"),
    ("prostate cancer", "CANCER"),
    ("leukemia", "CANCER"),
    ("melanoma", "CANCER"),
    ("glioblastoma", "CANCER"),
    ("nsclc", "CANCER"),
    ("diabetes", "DISEASE"),
    ("alzheimer's disease", "DISEASE"),
    ("parkinson's disease", "DISEASE"),
    ("hypertension", "DISEASE"),
    ("asthma", "DISEASE"),
    ("fibrosis", "PATHOLOGICAL_FORMATION"),
    ("inflammation", "PATHOLOGICAL_FORMATION"),
    // Organisms
    ("escherichia coli", "ORGANISM"),
    ("e. coli", "ORGANISM"),
    ("saccharomyces cerevisiae", "ORGANISM"),
    ("zebrafish", "ORGANISM"),
    // Anatomy
    ("t cells", "CELL"),
    ("b cells", "CELL"),
    ("macrophages", "CELL"),
    ("fibroblasts", "CELL"),
    ("neurons", "CELL"),
    ("hepatocytes", "CELL"),
    ("epithelium", "TISSUE"),
    ("endothelium", "TISSUE"),
    ("bone marrow", "TISSUE"),
    ("liver", "ORGAN"),
    ("lung", "ORGAN"),
    ("kidney", "ORGAN"),
    ("pancreas", "ORGAN"),
    ("hippocampus", "ORGAN"),
];

const SKIP_WORDS: &[&str] = &[
    "citation", "figure", "table", "references", "et al", "doi", "abstract", "introduction",
    "methods", "results", "discussion", "conclusion", "supplementary", "materials",
    "acknowledgments", "university", "department", "institute", "laboratory", "center",
    "journal", "review", "article", "study", "copyright", "license", "published", "publisher",
    "corresponding", "author", "authors", "correspondence", "affiliation", "affiliations",
    "international journal", "and", "or", "the", "of", "in", "on", "at",
];

const EXCLUDE_PATTERNS: &[&str] = &[
    r"^(international journal)",
    r"(journal of|review of)",
    r"(university|institute|department of)",
    r"^(figure|fig\.|table|supplementary|appendix)",
    r"(citation:|reference:|doi:|pmid:|issn:)",
    r"(copyright|license agreement|published by)",
    r"^\d+[,\s]*\d+[,\s]*\d+",
    r"et al\.",
    r"^(abstract|introduction|methods|materials and methods|results|discussion|conclusion|acknowledgments)$",
    r"[\x00-\x1f\x7f]",
    r"^[^a-z0-9]+$",
];

/// Drug-name suffixes (INN stems) mapped to the chemical label.
const CHEMICAL_SUFFIXES: &[&str] = &[
    "inib", "mab", "ciclib", "pril", "sartan", "statin", "mycin", "cillin", "azole", "oxacin",
];

const CANCER_SUFFIXES: &[&str] = &["oma", "carcinoma", "sarcoma", "blastoma"];
const PATHOLOGY_SUFFIXES: &[&str] = &["itis", "osis", "emia", "pathy"];

const ORGANISM_WORDS: &[&str] = &["human", "humans", "mouse", "mice", "rat", "rats", "patients"];

impl EntityRecognizer {
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            profile: ModelProfile::from_model_name(model_name),
            min_entity_occurrences: DEFAULT_MIN_OCCURRENCES,
            lexicon: LEXICON.iter().copied().collect(),
            skip_words: SKIP_WORDS.iter().copied().collect(),
            exclude_patterns: EXCLUDE_PATTERNS
                .iter()
                .map(|p| Regex::new(p).expect("static regex"))
                .collect(),
            initials: Regex::new(r"^(?:[A-Z]\.?){1,3}$").expect("static regex"),
            short_token: Regex::new(r"^[A-Za-z]{1,2}$").expect("static regex"),
            token: Regex::new(r"[A-Za-z0-9][A-Za-z0-9'\-./]*").expect("static regex"),
            gene_symbol: Regex::new(r"^[A-Z][A-Z0-9-]{2,7}$").expect("static regex"),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Raw labeled spans before validity filtering, for the preview
    /// endpoint's debug output.
    pub fn raw_spans(&self, text: &str) -> Vec<(String, String)> {
        self.candidate_spans(text)
            .into_iter()
            .map(|(span_text, _, _, label)| (span_text, label.to_string()))
            .collect()
    }

    /// Extract valid entities from a single piece of text.
    pub fn extract_entities(&self, text: &str) -> Vec<ExtractedEntity> {
        self.candidate_spans(text)
            .into_iter()
            .filter_map(|(span_text, start, end, raw_label)| {
                if !self.is_valid_entity(&span_text) {
                    return None;
                }
                let entity_type = EntityType::from_label(raw_label)?;
                Some(ExtractedEntity {
                    text: span_text,
                    entity_type,
                    start,
                    end,
                })
            })
            .collect()
    }

    /// Extract entities per sentence, keeping only sentences with at least
    /// one entity.
    pub fn extract_from_sentences(&self, sentences: &[String]) -> Vec<SentenceEntities> {
        sentences
            .iter()
            .enumerate()
            .filter_map(|(idx, sentence)| {
                let entities = self.extract_entities(sentence);
                if entities.is_empty() {
                    None
                } else {
                    Some(SentenceEntities {
                        sentence_id: idx,
                        sentence: sentence.clone(),
                        entities,
                    })
                }
            })
            .collect()
    }

    /// Number of sentences each normalized entity appears in.
    pub fn entity_counts(&self, sentence_entities: &[SentenceEntities]) -> HashMap<String, usize> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for sent in sentence_entities {
            let seen: HashSet<String> = sent
                .entities
                .iter()
                .map(|e| normalize_entity(&e.text))
                .collect();
            for name in seen {
                *counts.entry(name).or_default() += 1;
            }
        }
        counts
    }

    /// Drop entities below the given sentence-occurrence threshold, and
    /// sentences left without entities.
    pub fn filter_entities(
        &self,
        sentence_entities: &[SentenceEntities],
        min_occurrences: usize,
    ) -> Vec<SentenceEntities> {
        let counts = self.entity_counts(sentence_entities);

        sentence_entities
            .iter()
            .filter_map(|sent| {
                let entities: Vec<_> = sent
                    .entities
                    .iter()
                    .filter(|e| {
                        counts
                            .get(&normalize_entity(&e.text))
                            .is_some_and(|&c| c >= min_occurrences)
                    })
                    .cloned()
                    .collect();
                if entities.is_empty() {
                    None
                } else {
                    Some(SentenceEntities {
                        sentence_id: sent.sentence_id,
                        sentence: sent.sentence.clone(),
                        entities,
                    })
                }
            })
            .collect()
    }

    /// Aggregate unique entities keyed by normalized name, counting total
    /// mentions.
    pub fn unique_entities(
        &self,
        sentence_entities: &[SentenceEntities],
    ) -> BTreeMap<String, EntityProfile> {
        let mut entities: BTreeMap<String, EntityProfile> = BTreeMap::new();
        for sent in sentence_entities {
            for entity in &sent.entities {
                let normalized = normalize_entity(&entity.text);
                entities
                    .entry(normalized)
                    .or_insert_with(|| EntityProfile {
                        original_name: entity.text.clone(),
                        entity_type: entity.entity_type,
                        count: 0,
                    })
                    .count += 1;
            }
        }
        entities
    }

    /// Scan a sentence for labeled spans. Trigram and bigram lexicon terms
    /// take precedence over unigram matches; a token claimed by a longer
    /// span is not reconsidered.
    fn candidate_spans(&self, text: &str) -> Vec<(String, usize, usize, &'static str)> {
        // Trailing punctuation belongs to the sentence, not the token.
        let tokens: Vec<(usize, usize)> = self
            .token
            .find_iter(text)
            .filter_map(|m| {
                let trimmed = m.as_str().trim_end_matches(['.', ',', ';', ':', '\'', '-', '/']);
                if trimmed.is_empty() {
                    None
                } else {
                    Some((m.start(), m.start() + trimmed.len()))
                }
            })
            .collect();

        let mut spans = Vec::new();
        let mut claimed = vec![false; tokens.len()];

        for width in (1..=3usize).rev() {
            if tokens.len() < width {
                continue;
            }
            for i in 0..=tokens.len() - width {
                if claimed[i..i + width].iter().any(|&c| c) {
                    continue;
                }
                let start = tokens[i].0;
                let end = tokens[i + width - 1].1;
                let span_text = &text[start..end];
                let label = if width == 1 {
                    self.label_for_term(span_text)
                        .or_else(|| self.label_from_shape(span_text))
                } else {
                    self.label_for_term(span_text)
                };
                if let Some(label) = label {
                    claimed[i..i + width].iter_mut().for_each(|c| *c = true);
                    spans.push((span_text.to_string(), start, end, self.emit(label)));
                }
            }
        }

        spans.sort_by_key(|&(_, start, _, _)| start);
        spans
    }

    fn label_for_term(&self, term: &str) -> Option<&'static str> {
        self.lexicon.get(normalize_entity(term).as_str()).copied()
    }

    /// Morphological fallbacks for tokens the lexicon does not know.
    fn label_from_shape(&self, token: &str) -> Option<&'static str> {
        let lower = token.to_lowercase();

        for suffix in CHEMICAL_SUFFIXES {
            if lower.len() > suffix.len() + 2 && lower.ends_with(suffix) {
                return Some("SIMPLE_CHEMICAL");
            }
        }
        for suffix in CANCER_SUFFIXES {
            if lower.len() > suffix.len() + 2 && lower.ends_with(suffix) {
                return Some("CANCER");
            }
        }
        for suffix in PATHOLOGY_SUFFIXES {
            if lower.len() > suffix.len() + 2 && lower.ends_with(suffix) {
                return Some("PATHOLOGICAL_FORMATION");
            }
        }
        if ORGANISM_WORDS.contains(&lower.as_str()) {
            return Some("ORGANISM");
        }
        // Gene symbols: short all-caps tokens containing a digit (EGFR is
        // in the lexicon; this catches the long tail like CDKN2A).
        if self.gene_symbol.is_match(token) && token.chars().any(|c| c.is_ascii_digit()) {
            return Some("GENE_OR_GENE_PRODUCT");
        }
        None
    }

    /// Map a fine-grained label to the profile's inventory.
    fn emit(&self, label: &'static str) -> &'static str {
        match self.profile {
            ModelProfile::FineGrained => label,
            ModelProfile::Generic => "ENTITY",
        }
    }

    /// Reject academic metadata, initials, and low-content spans.
    fn is_valid_entity(&self, text: &str) -> bool {
        let trimmed = text.trim();
        let lower = trimmed.to_lowercase();

        if trimmed.len() < 3 || trimmed.len() > 80 {
            return false;
        }
        if self.skip_words.contains(lower.as_str()) {
            return false;
        }
        if self.exclude_patterns.iter().any(|p| p.is_match(&lower)) {
            return false;
        }
        if !trimmed.chars().any(|c| c.is_ascii_alphabetic()) {
            return false;
        }
        let alpha = trimmed.chars().filter(|c| c.is_alphabetic()).count();
        if (alpha as f64) / (trimmed.chars().count() as f64) < 0.4 {
            return false;
        }
        if self.initials.is_match(trimmed) || self.short_token.is_match(trimmed) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recognizer() -> EntityRecognizer {
        EntityRecognizer::new("en_ner_bionlp13cg_md")
    }

    #[test]
    fn recognizes_lexicon_terms_with_types() {
        let entities = recognizer().extract_entities("Gefitinib inhibits EGFR in lung cancer.");
        let by_name: HashMap<_, _> = entities
            .iter()
            .map(|e| (e.text.to_lowercase(), e.entity_type))
            .collect();
        assert_eq!(by_name["gefitinib"], EntityType::Chemical);
        assert_eq!(by_name["egfr"], EntityType::GeneOrGeneProduct);
        assert_eq!(by_name["lung cancer"], EntityType::Disease);
    }

    #[test]
    fn multiword_terms_beat_their_constituents() {
        let entities = recognizer().extract_entities("Patients with breast cancer were enrolled.");
        assert!(entities.iter().any(|e| e.text == "breast cancer"));
        // "cancer" alone must not also be reported inside the claimed span.
        assert!(!entities.iter().any(|e| e.text == "cancer"));
    }

    #[test]
    fn suffix_rules_catch_unknown_drugs_and_diseases() {
        let entities = recognizer().extract_entities("Osimertinib reduced hepatoblastoma growth.");
        let by_name: HashMap<_, _> = entities
            .iter()
            .map(|e| (e.text.to_lowercase(), e.entity_type))
            .collect();
        assert_eq!(by_name["osimertinib"], EntityType::Chemical);
        assert_eq!(by_name["hepatoblastoma"], EntityType::Disease);
    }

    #[test]
    fn generic_profile_collapses_labels() {
        let recognizer = EntityRecognizer::new("en_core_sci_lg");
        let entities = recognizer.extract_entities("Gefitinib inhibits EGFR.");
        assert!(!entities.is_empty());
        assert!(entities.iter().all(|e| e.entity_type == EntityType::Entity));
    }

    #[test]
    fn rejects_academic_metadata() {
        let recognizer = recognizer();
        assert!(recognizer.extract_entities("International Journal of Oncology").is_empty());
        assert!(recognizer.extract_entities("Figure 3 and Table 2").is_empty());
    }

    #[test]
    fn occurrence_filter_drops_rare_entities() {
        let recognizer = recognizer();
        let sentences: Vec<String> = vec![
            "EGFR signaling was elevated.".into(),
            "EGFR inhibition reduced growth.".into(),
            "EGFR expression correlated with survival.".into(),
            "Macrophages were depleted once.".into(),
        ];
        let extracted = recognizer.extract_from_sentences(&sentences);
        let filtered = recognizer.filter_entities(&extracted, 3);

        let unique = recognizer.unique_entities(&filtered);
        assert!(unique.contains_key("egfr"));
        assert!(!unique.contains_key("macrophages"));
    }

    #[test]
    fn counts_are_per_sentence_not_per_mention() {
        let recognizer = recognizer();
        let sentences: Vec<String> =
            vec!["EGFR and EGFR and EGFR were measured in the assay.".into()];
        let extracted = recognizer.extract_from_sentences(&sentences);
        let counts = recognizer.entity_counts(&extracted);
        assert_eq!(counts["egfr"], 1);
    }

    #[test]
    fn unique_entities_aggregate_mentions() {
        let recognizer = recognizer();
        let sentences: Vec<String> = vec![
            "EGFR was upregulated here.".into(),
            "Total EGFR increased again.".into(),
        ];
        let extracted = recognizer.extract_from_sentences(&sentences);
        let unique = recognizer.unique_entities(&extracted);
        assert_eq!(unique["egfr"].count, 2);
        assert_eq!(unique["egfr"].entity_type, EntityType::GeneOrGeneProduct);
    }
}
