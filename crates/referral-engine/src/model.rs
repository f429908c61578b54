use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// A single historical appointment row from the training corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct AppointmentRecord {
    /// Booking reference issued by the front desk, e.g. "HC0042"
    pub token: Option<String>,
    /// Patient age at booking time
    pub age: u32,
    /// Free-text condition description from the appointment form
    pub condition: String,
    /// Specialist the appointment was booked with
    pub specialist: String,
    /// Prior-history note, when one was recorded
    pub medical_history: Option<String>,
}

/// A specialty from the specialist directory.
#[derive(Debug, Clone, Serialize)]
pub struct SpecialistEntry {
    /// Specialist label, e.g. "Cardiology"
    pub name: String,
    /// Normalized tokens describing the specialty's domain
    pub keywords: Vec<String>,
}

/// A general-physician directory row; the first row designates the fallback
/// recommendation.
#[derive(Debug, Clone, Serialize)]
pub struct GeneralPhysicianEntry {
    /// Physician or practice label, e.g. "General Physician"
    pub name: String,
    /// Normalized tokens describing the practice's domain
    pub keywords: Vec<String>,
}

/// A similar historical appointment returned from a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarAppointment {
    /// Position of the record within the loaded corpus
    pub index: usize,
    /// Cosine similarity to the probe record (1.0 = identical features)
    pub score: f32,
    /// The full historical record
    pub record: AppointmentRecord,
}

/// Metadata about the active model, for operator inspection.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    /// Artifact schema version the model round-trips through
    pub schema_version: u32,
    /// SHA-256 fingerprint of the source files the model was trained on
    pub corpus_fingerprint: String,
    /// Training time, unix seconds
    pub trained_at: i64,
    /// Training time, RFC 3339
    pub trained_at_utc: String,
    /// Records in the similarity corpus
    pub record_count: usize,
    /// Distinct specialist labels the classifier can emit
    pub label_count: usize,
    /// Feature vector length (out-of-vocabulary bucket included)
    pub vocabulary_size: usize,
    /// Neighbors consulted per classification vote
    pub neighbors: usize,
    /// Label returned when a condition has no recognized tokens
    pub fallback_label: String,
    /// The validated label table
    pub labels: Vec<String>,
}
