/// The trained recommendation model.
///
/// Owns everything inference needs: the frozen vocabulary, the labeled and
/// indexed training vectors, the corpus records, and the validated label
/// table. Instances are immutable after construction; re-training builds a
/// new instance and the service swaps it in whole.
///
/// Classification is a k-nearest-neighbor vote over the training vectors,
/// weighted by cosine similarity. Ties between equally similar neighbors
/// order by ascending record index, ties between equally weighted labels by
/// the lexicographically smaller label, so the same model always returns
/// the same answer.
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

use bincode::{Decode, Encode};
use tracing::{debug, info, warn};

use referral_common::index::VectorIndex;
use referral_common::vectorizer::Vocabulary;

use crate::artifact::{ArtifactPayload, ARTIFACT_VERSION};
use crate::error::AppError;
use crate::model::{AppointmentRecord, ModelInfo, SimilarAppointment, SpecialistEntry};

/// A classifier needs at least two usable records...
const MIN_RECORDS: usize = 2;
/// ...and at least two label classes to be meaningful.
const MIN_DISTINCT_LABELS: usize = 2;

/// Metadata persisted alongside the model state.
#[derive(Debug, Clone, Encode, Decode)]
pub struct ModelMeta {
    /// SHA-256 fingerprint of the three source files at training time.
    pub corpus_fingerprint: String,
    /// Training time, unix seconds.
    pub trained_at: i64,
    /// Neighbors consulted per classification vote.
    pub neighbors: usize,
}

/// Counters from one fit, folded into the training report.
#[derive(Debug, Clone, Copy)]
pub struct FitStats {
    pub skipped_unknown_label: usize,
}

#[derive(Debug)]
pub struct TrainedModel {
    meta: ModelMeta,
    vocabulary: Vocabulary,
    index: VectorIndex,
    /// Per-record label id, aligned with the index rows.
    labels: Vec<u32>,
    /// Interned label names, sorted; the only labels the classifier can emit.
    label_table: Vec<String>,
    fallback_label: String,
    records: Vec<AppointmentRecord>,
}

impl TrainedModel {
    /// Fit the classifier and similarity index from a loaded corpus.
    ///
    /// Records whose specialist appears in neither the specialist catalog
    /// nor the fallback label are skipped and counted; the model must never
    /// emit a label outside the catalogs.
    pub fn fit(
        records: Vec<AppointmentRecord>,
        specialists: &[SpecialistEntry],
        fallback_label: String,
        meta: ModelMeta,
    ) -> Result<(Self, FitStats), AppError> {
        let allowed: HashSet<&str> = specialists
            .iter()
            .map(|s| s.name.as_str())
            .chain(std::iter::once(fallback_label.as_str()))
            .collect();

        let mut kept: Vec<AppointmentRecord> = Vec::with_capacity(records.len());
        let mut skipped_unknown_label = 0usize;
        for record in records {
            if allowed.contains(record.specialist.as_str()) {
                kept.push(record);
            } else {
                warn!(
                    specialist = %record.specialist,
                    "skipping record with a label missing from the catalogs"
                );
                skipped_unknown_label += 1;
            }
        }

        if kept.len() < MIN_RECORDS {
            return Err(AppError::InsufficientData(format!(
                "{} usable records, need at least {MIN_RECORDS}",
                kept.len()
            )));
        }

        let label_table: Vec<String> = kept
            .iter()
            .map(|r| r.specialist.clone())
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect();
        if label_table.len() < MIN_DISTINCT_LABELS {
            return Err(AppError::InsufficientData(format!(
                "{} distinct specialist labels, need at least {MIN_DISTINCT_LABELS}",
                label_table.len()
            )));
        }

        let label_ids: HashMap<&str, u32> = label_table
            .iter()
            .enumerate()
            .map(|(id, name)| (name.as_str(), id as u32))
            .collect();
        let labels: Vec<u32> = kept
            .iter()
            .map(|record| {
                label_ids.get(record.specialist.as_str()).copied().ok_or_else(|| {
                    AppError::Internal(format!(
                        "label {:?} missing from the label table",
                        record.specialist
                    ))
                })
            })
            .collect::<Result<_, _>>()?;

        let conditions: Vec<&str> = kept.iter().map(|r| r.condition.as_str()).collect();
        let vocabulary = Vocabulary::fit(&conditions)?;
        if vocabulary.term_count() == 0 {
            return Err(AppError::InsufficientData(
                "no usable tokens in any condition".to_string(),
            ));
        }

        let rows: Vec<Vec<f32>> =
            kept.iter().map(|r| vocabulary.transform(&r.condition)).collect();
        let index = VectorIndex::from_rows(vocabulary.dimension(), rows)?;

        log_keyword_coverage(specialists, &vocabulary);
        info!(
            records = kept.len(),
            labels = label_table.len(),
            vocabulary = vocabulary.dimension(),
            skipped_unknown_label,
            "model fitted"
        );

        Ok((
            Self {
                meta,
                vocabulary,
                index,
                labels,
                label_table,
                fallback_label,
                records: kept,
            },
            FitStats { skipped_unknown_label },
        ))
    }

    /// Specialist label best matching a free-text condition.
    ///
    /// Empty or unrecognized input is not an error: a condition that
    /// transforms to the all-zero vector yields the fallback label.
    pub fn recommend_specialist(&self, condition: &str) -> Result<String, AppError> {
        let vector = self.vocabulary.transform(condition);
        if vector.iter().all(|v| *v == 0.0) {
            debug!(condition_len = condition.len(), "no recognized tokens, using fallback");
            return Ok(self.fallback_label.clone());
        }

        let neighbors = self.index.search(&vector, self.meta.neighbors)?;
        let mut weights: HashMap<u32, f32> = HashMap::new();
        for neighbor in neighbors.iter().filter(|n| n.score > 0.0) {
            *weights.entry(self.labels[neighbor.index]).or_insert(0.0) += neighbor.score;
        }

        let mut tallies: Vec<(u32, f32)> = weights.into_iter().collect();
        tallies.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| self.label_table[a.0 as usize].cmp(&self.label_table[b.0 as usize]))
        });
        match tallies.first() {
            Some((label_id, _)) => Ok(self.label_table[*label_id as usize].clone()),
            None => Ok(self.fallback_label.clone()),
        }
    }

    /// The `count` records most similar to the record at `index`, excluding
    /// the record itself, ordered by descending similarity then ascending
    /// index.
    pub fn similar(&self, index: usize, count: usize) -> Result<Vec<SimilarAppointment>, AppError> {
        let len = self.records.len();
        if index >= len || count == 0 {
            return Err(AppError::IndexOutOfRange { index, count, len });
        }
        let neighbors = self.index.neighbors_of(index, count)?;
        Ok(neighbors
            .into_iter()
            .map(|neighbor| SimilarAppointment {
                index: neighbor.index,
                score: neighbor.score,
                record: self.records[neighbor.index].clone(),
            })
            .collect())
    }

    pub fn info(&self) -> ModelInfo {
        let trained_at_utc = chrono::DateTime::from_timestamp(self.meta.trained_at, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string());
        ModelInfo {
            schema_version: ARTIFACT_VERSION,
            corpus_fingerprint: self.meta.corpus_fingerprint.clone(),
            trained_at: self.meta.trained_at,
            trained_at_utc,
            record_count: self.records.len(),
            label_count: self.label_table.len(),
            vocabulary_size: self.vocabulary.dimension(),
            neighbors: self.meta.neighbors,
            fallback_label: self.fallback_label.clone(),
            labels: self.label_table.clone(),
        }
    }

    /// Records in the similarity corpus.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The validated labels the classifier can emit, sorted.
    pub fn labels(&self) -> &[String] {
        &self.label_table
    }

    /// Feature vector length, out-of-vocabulary bucket included.
    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.dimension()
    }

    pub fn fallback_label(&self) -> &str {
        &self.fallback_label
    }

    pub fn meta(&self) -> &ModelMeta {
        &self.meta
    }

    pub(crate) fn to_payload(&self) -> ArtifactPayload {
        ArtifactPayload {
            meta: self.meta.clone(),
            terms: self.vocabulary.terms().to_vec(),
            idf: self.vocabulary.idf().to_vec(),
            label_table: self.label_table.clone(),
            fallback_label: self.fallback_label.clone(),
            labels: self.labels.clone(),
            rows: self.index.rows().to_vec(),
            records: self.records.clone(),
        }
    }

    /// Rebuild a model from a decoded artifact payload, re-validating every
    /// cross-reference the payload carries.
    pub(crate) fn from_payload(payload: ArtifactPayload) -> Result<Self, AppError> {
        let vocabulary = Vocabulary::from_parts(payload.terms, payload.idf)
            .map_err(|e| AppError::IncompatibleArtifact(format!("vocabulary: {e}")))?;
        if payload.rows.len() != payload.records.len()
            || payload.labels.len() != payload.records.len()
        {
            return Err(AppError::IncompatibleArtifact(format!(
                "row/label/record counts disagree: {} rows, {} labels, {} records",
                payload.rows.len(),
                payload.labels.len(),
                payload.records.len()
            )));
        }
        if payload.labels.iter().any(|id| *id as usize >= payload.label_table.len()) {
            return Err(AppError::IncompatibleArtifact(
                "label id outside the label table".to_string(),
            ));
        }
        if payload.fallback_label.is_empty() {
            return Err(AppError::IncompatibleArtifact("empty fallback label".to_string()));
        }
        if payload.meta.neighbors == 0 {
            return Err(AppError::IncompatibleArtifact("neighbor count is zero".to_string()));
        }
        let index = VectorIndex::from_rows(vocabulary.dimension(), payload.rows)
            .map_err(|e| AppError::IncompatibleArtifact(format!("feature matrix: {e}")))?;
        Ok(Self {
            meta: payload.meta,
            vocabulary,
            index,
            labels: payload.labels,
            label_table: payload.label_table,
            fallback_label: payload.fallback_label,
            records: payload.records,
        })
    }
}

/// Log how much of each specialty's keyword set the fitted vocabulary
/// actually covers. Purely diagnostic; a specialty with no keyword overlap
/// can still be recommended through its historical records.
fn log_keyword_coverage(specialists: &[SpecialistEntry], vocabulary: &Vocabulary) {
    for specialist in specialists.iter().filter(|s| !s.keywords.is_empty()) {
        let known = specialist.keywords.iter().filter(|k| vocabulary.contains(k)).count();
        debug!(
            specialist = %specialist.name,
            known_keywords = known,
            total_keywords = specialist.keywords.len(),
            "catalog keyword coverage"
        );
    }
}
