/// Versioned binary artifact persistence.
///
/// Layout: 4-byte magic, little-endian u32 schema version, 32-byte SHA-256
/// digest of the payload, then the bincode-encoded payload. Any disagreement
/// (magic, version, digest, payload shape) loads as `IncompatibleArtifact`;
/// the artifact is never partially read.
///
/// Saves are atomic: the bytes go to a sibling temporary file which is then
/// renamed over the destination, so a crash mid-write never leaves a
/// corrupt artifact visible to the next load.
use std::path::Path;

use bincode::{config, decode_from_slice, encode_to_vec, Decode, Encode};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::AppError;
use crate::model::AppointmentRecord;
use crate::recommender::{ModelMeta, TrainedModel};

pub const ARTIFACT_MAGIC: [u8; 4] = *b"RFER";
pub const ARTIFACT_VERSION: u32 = 1;

/// Magic + version + payload digest.
const HEADER_LEN: usize = 4 + 4 + 32;

/// The persisted form of a `TrainedModel`. Runtime lookup structures are
/// rebuilt from these fields on load.
#[derive(Debug, Encode, Decode)]
pub(crate) struct ArtifactPayload {
    pub meta: ModelMeta,
    pub terms: Vec<String>,
    pub idf: Vec<f32>,
    pub label_table: Vec<String>,
    pub fallback_label: String,
    pub labels: Vec<u32>,
    pub rows: Vec<Vec<f32>>,
    pub records: Vec<AppointmentRecord>,
}

/// Encode a model into artifact bytes.
pub fn serialize(model: &TrainedModel) -> Result<Vec<u8>, AppError> {
    let payload = encode_to_vec(model.to_payload(), config::standard())
        .map_err(|e| AppError::Internal(format!("artifact payload encoding failed: {e}")))?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&ARTIFACT_MAGIC);
    bytes.extend_from_slice(&ARTIFACT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&Sha256::digest(&payload));
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Decode artifact bytes back into a model, validating the header, the
/// payload digest, and every cross-reference inside the payload.
pub fn deserialize(bytes: &[u8]) -> Result<TrainedModel, AppError> {
    if bytes.len() < HEADER_LEN {
        return Err(AppError::IncompatibleArtifact(format!(
            "truncated artifact: {} bytes",
            bytes.len()
        )));
    }
    if bytes[..4] != ARTIFACT_MAGIC {
        return Err(AppError::IncompatibleArtifact("unrecognized magic bytes".to_string()));
    }

    let mut version_bytes = [0u8; 4];
    version_bytes.copy_from_slice(&bytes[4..8]);
    let version = u32::from_le_bytes(version_bytes);
    if version != ARTIFACT_VERSION {
        return Err(AppError::IncompatibleArtifact(format!(
            "schema version {version}, this build expects {ARTIFACT_VERSION}"
        )));
    }

    let payload = &bytes[HEADER_LEN..];
    if bytes[8..HEADER_LEN] != *Sha256::digest(payload).as_slice() {
        return Err(AppError::IncompatibleArtifact("payload digest mismatch".to_string()));
    }

    let (decoded, consumed): (ArtifactPayload, usize) =
        decode_from_slice(payload, config::standard())
            .map_err(|e| AppError::IncompatibleArtifact(format!("payload decode failed: {e}")))?;
    if consumed != payload.len() {
        return Err(AppError::IncompatibleArtifact(format!(
            "{} trailing bytes after the payload",
            payload.len() - consumed
        )));
    }
    TrainedModel::from_payload(decoded)
}

/// Write the artifact atomically: encode, write to a sibling `.tmp` file,
/// rename over the destination.
pub fn save(model: &TrainedModel, path: &Path) -> Result<(), AppError> {
    let bytes = serialize(model)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, &bytes).map_err(|e| AppError::ArtifactWrite {
        path: tmp.display().to_string(),
        message: e.to_string(),
    })?;
    std::fs::rename(&tmp, path).map_err(|e| AppError::ArtifactWrite {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    info!(path = %path.display(), bytes = bytes.len(), "model artifact written");
    Ok(())
}

/// Read and validate an artifact from disk.
pub fn load(path: &Path) -> Result<TrainedModel, AppError> {
    let bytes = std::fs::read(path).map_err(|e| AppError::ArtifactRead {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let model = deserialize(&bytes)?;
    info!(
        path = %path.display(),
        records = model.len(),
        labels = model.labels().len(),
        "model artifact loaded"
    );
    Ok(model)
}
