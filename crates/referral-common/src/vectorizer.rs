/// Tf-idf feature vectorizer.
///
/// `Vocabulary::fit` learns slot assignments and document frequencies from a
/// corpus of condition strings; `transform` maps any string onto that fixed
/// shape. Slot 0 is reserved for out-of-vocabulary tokens so the dimension
/// never changes after fitting; the bucket carries zero weight, which keeps
/// unrecognized text from manufacturing similarity and lets callers detect
/// "no recognized tokens" as an all-zero vector. Transformed vectors are
/// L2-normalized, so cosine similarity between them is a plain dot product.
use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::CommonError;
use crate::text;

/// Slot that absorbs tokens never seen during fitting.
pub const OOV_SLOT: usize = 0;

#[derive(Debug, Clone)]
pub struct Vocabulary {
    /// Fitted terms; the term at position `i` owns slot `i + 1`.
    terms: Vec<String>,
    /// Term → slot lookup, rebuilt from `terms` on deserialization.
    slots: HashMap<String, usize>,
    /// Per-slot inverse document frequency; `idf[OOV_SLOT]` is 0.
    idf: Vec<f32>,
}

impl Vocabulary {
    /// Learn slot assignments and idf weights from the training conditions.
    ///
    /// Slots are assigned in order of first occurrence, so the same corpus
    /// always produces the same vocabulary.
    pub fn fit(documents: &[&str]) -> Result<Self, CommonError> {
        if documents.is_empty() {
            return Err(CommonError::Vectorizer(
                "cannot fit a vocabulary on an empty corpus".to_string(),
            ));
        }

        let mut terms: Vec<String> = Vec::new();
        let mut slots: HashMap<String, usize> = HashMap::new();
        let mut doc_freq: Vec<usize> = Vec::new();

        for document in documents {
            let mut seen: HashSet<usize> = HashSet::new();
            for token in text::tokenize(document) {
                let slot = *slots.entry(token.clone()).or_insert_with(|| {
                    terms.push(token.clone());
                    doc_freq.push(0);
                    terms.len()
                });
                seen.insert(slot);
            }
            for slot in seen {
                doc_freq[slot - 1] += 1;
            }
        }

        let document_count = documents.len() as f32;
        let mut idf = Vec::with_capacity(terms.len() + 1);
        idf.push(0.0);
        for df in &doc_freq {
            idf.push(((1.0 + document_count) / (1.0 + *df as f32)).ln() + 1.0);
        }

        debug!(terms = terms.len(), documents = documents.len(), "vocabulary fitted");
        Ok(Self { terms, slots, idf })
    }

    /// Rebuild a vocabulary from its persisted parts.
    pub fn from_parts(terms: Vec<String>, idf: Vec<f32>) -> Result<Self, CommonError> {
        if idf.len() != terms.len() + 1 {
            return Err(CommonError::Vectorizer(format!(
                "idf table has {} entries for {} terms",
                idf.len(),
                terms.len()
            )));
        }
        let slots = terms
            .iter()
            .enumerate()
            .map(|(position, term)| (term.clone(), position + 1))
            .collect();
        Ok(Self { terms, slots, idf })
    }

    /// Map a condition string onto the fitted vector shape.
    ///
    /// Never fails: unknown tokens land in the zero-weight OOV slot, so a
    /// string with no recognized tokens transforms to the all-zero vector.
    pub fn transform(&self, condition: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension()];
        for token in text::tokenize(condition) {
            let slot = self.slots.get(&token).copied().unwrap_or(OOV_SLOT);
            vector[slot] += 1.0;
        }
        for (slot, value) in vector.iter_mut().enumerate() {
            *value *= self.idf[slot];
        }
        l2_normalize(&mut vector);
        vector
    }

    /// Vector length, OOV bucket included. Fixed once fitted.
    pub fn dimension(&self) -> usize {
        self.terms.len() + 1
    }

    /// Number of distinct fitted terms (OOV bucket excluded).
    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn idf(&self) -> &[f32] {
        &self.idf
    }

    /// Whether a token was seen during fitting.
    pub fn contains(&self, token: &str) -> bool {
        self.slots.contains_key(token)
    }
}

/// Scale a vector to unit length in place; the all-zero vector is left as is.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fitted() -> Vocabulary {
        Vocabulary::fit(&["chest pain", "chest tightness", "ankle sprain"]).expect("fit")
    }

    #[test]
    fn slots_follow_first_occurrence_order() {
        let vocabulary = fitted();
        assert_eq!(
            vocabulary.terms(),
            ["chest", "pain", "tightness", "ankle", "sprain"]
        );
        assert_eq!(vocabulary.dimension(), 6);
    }

    #[test]
    fn transform_is_deterministic() {
        let vocabulary = fitted();
        assert_eq!(vocabulary.transform("chest pain"), vocabulary.transform("chest pain"));
    }

    #[test]
    fn lexically_identical_inputs_share_a_vector() {
        let vocabulary = fitted();
        assert_eq!(
            vocabulary.transform("Chest PAIN!"),
            vocabulary.transform("chest pain")
        );
    }

    #[test]
    fn unseen_tokens_yield_the_zero_vector() {
        let vocabulary = fitted();
        let vector = vocabulary.transform("quantum flux");
        assert_eq!(vector.len(), vocabulary.dimension());
        assert!(vector.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn unseen_tokens_do_not_grow_the_dimension() {
        let vocabulary = fitted();
        let before = vocabulary.dimension();
        let _ = vocabulary.transform("entirely novel complaint");
        assert_eq!(vocabulary.dimension(), before);
    }

    #[test]
    fn rare_terms_outweigh_common_terms() {
        let vocabulary =
            Vocabulary::fit(&["back pain", "knee pain", "chest pain"]).expect("fit");
        let vector = vocabulary.transform("chest pain");
        let chest_slot = 1 + vocabulary
            .terms()
            .iter()
            .position(|t| t == "chest")
            .expect("chest fitted");
        let pain_slot = 1 + vocabulary
            .terms()
            .iter()
            .position(|t| t == "pain")
            .expect("pain fitted");
        assert!(vector[chest_slot] > vector[pain_slot]);
    }

    #[test]
    fn transformed_vectors_are_unit_length() {
        let vocabulary = fitted();
        let vector = vocabulary.transform("chest pain");
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn from_parts_reproduces_transform() {
        let vocabulary = fitted();
        let rebuilt =
            Vocabulary::from_parts(vocabulary.terms().to_vec(), vocabulary.idf().to_vec())
                .expect("rebuild");
        assert_eq!(
            vocabulary.transform("chest pain and tightness"),
            rebuilt.transform("chest pain and tightness")
        );
    }

    #[test]
    fn from_parts_rejects_mismatched_tables() {
        let err = Vocabulary::from_parts(vec!["chest".to_string()], vec![0.0]).unwrap_err();
        assert!(matches!(err, CommonError::Vectorizer(_)));
    }

    #[test]
    fn empty_corpus_is_rejected() {
        let err = Vocabulary::fit(&[]).unwrap_err();
        assert!(matches!(err, CommonError::Vectorizer(_)));
    }
}
