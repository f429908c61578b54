/// Training pipeline: corpus → features → model fit → artifact.
///
/// Also owns staleness detection. Every artifact records a SHA-256
/// fingerprint of the three source files it was trained from;
/// `needs_training` compares that against the current corpus so startup can
/// skip retraining when nothing changed. Model fitting is CPU-bound and
/// runs on the blocking thread pool.
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::artifact;
use crate::config::Config;
use crate::corpus;
use crate::error::AppError;
use crate::recommender::{ModelMeta, TrainedModel};

/// Summary of one `train` or `load_or_train` run, for operator reporting.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    /// Whether a fresh model was fitted (false: loaded from the artifact).
    pub trained: bool,
    pub record_count: usize,
    pub label_count: usize,
    pub vocabulary_size: usize,
    /// Appointment rows dropped by the loader.
    pub skipped_appointment_rows: usize,
    /// Catalog rows dropped by the loader.
    pub skipped_catalog_rows: usize,
    /// Appointment rows dropped at fit time for labels outside the catalogs.
    pub skipped_unknown_labels: usize,
    pub corpus_fingerprint: String,
}

pub struct TrainingPipeline {
    config: Config,
}

impl TrainingPipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// SHA-256 over the three source files, length-prefixed, in
    /// appointments / specialists / general-physicians order.
    pub fn corpus_fingerprint(&self) -> Result<String, AppError> {
        let mut hasher = Sha256::new();
        for path in [
            &self.config.appointments_path,
            &self.config.specialists_path,
            &self.config.general_physicians_path,
        ] {
            let bytes = std::fs::read(path).map_err(|e| AppError::DataLoad {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(&bytes);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Whether startup must run the pipeline instead of loading the
    /// artifact: forced retraining, no usable artifact, or a corpus that no
    /// longer matches the artifact's fingerprint.
    pub fn needs_training(&self) -> Result<bool, AppError> {
        if self.config.force_retrain {
            return Ok(true);
        }
        let fingerprint = self.corpus_fingerprint()?;
        Ok(self.usable_artifact(&fingerprint).is_none())
    }

    /// Load the artifact when it matches the current corpus, otherwise run
    /// the full pipeline.
    pub async fn load_or_train(&self) -> Result<(TrainedModel, TrainingReport), AppError> {
        if self.config.force_retrain {
            info!("forced retraining requested");
            return self.train().await;
        }
        let fingerprint = self.corpus_fingerprint()?;
        match self.usable_artifact(&fingerprint) {
            Some(model) => {
                info!("model artifact is current, skipping training");
                let report = report_for_loaded(&model);
                Ok((model, report))
            }
            None => self.train().await,
        }
    }

    /// Run the full pipeline: load the corpus, fit a model, persist the
    /// artifact atomically.
    pub async fn train(&self) -> Result<(TrainedModel, TrainingReport), AppError> {
        let started = Instant::now();
        info!("training pipeline started");

        // 1. Load the corpus and both catalogs.
        let bundle = corpus::load_corpus(
            &self.config.appointments_path,
            &self.config.specialists_path,
            &self.config.general_physicians_path,
        )?;
        let stats = bundle.stats;

        // 2. Fingerprint the sources the model is about to learn from.
        let fingerprint = self.corpus_fingerprint()?;

        let fallback_label = bundle
            .general_physicians
            .first()
            .map(|entry| entry.name.clone())
            .ok_or_else(|| AppError::DataLoad {
                path: self.config.general_physicians_path.display().to_string(),
                message: "no usable rows in the general-physician catalog".to_string(),
            })?;

        // 3. Fit off the async runtime; vectorization is CPU-bound.
        let meta = ModelMeta {
            corpus_fingerprint: fingerprint.clone(),
            trained_at: Utc::now().timestamp(),
            neighbors: self.config.neighbors,
        };
        let (model, fit_stats) = tokio::task::spawn_blocking(move || {
            TrainedModel::fit(bundle.appointments, &bundle.specialists, fallback_label, meta)
        })
        .await
        .map_err(|e| AppError::Internal(format!("training task join error: {e}")))??;

        // 4. Persist before anything serves from the new model.
        artifact::save(&model, &self.config.artifact_path)?;

        let report = TrainingReport {
            trained: true,
            record_count: model.len(),
            label_count: model.labels().len(),
            vocabulary_size: model.vocabulary_size(),
            skipped_appointment_rows: stats.skipped_appointment_rows,
            skipped_catalog_rows: stats.skipped_catalog_rows,
            skipped_unknown_labels: fit_stats.skipped_unknown_label,
            corpus_fingerprint: fingerprint,
        };
        info!(
            records = report.record_count,
            labels = report.label_count,
            vocabulary = report.vocabulary_size,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "training complete"
        );
        Ok((model, report))
    }

    fn usable_artifact(&self, fingerprint: &str) -> Option<TrainedModel> {
        match artifact::load(&self.config.artifact_path) {
            Ok(model) if model.meta().corpus_fingerprint == fingerprint => Some(model),
            Ok(_) => {
                info!("artifact fingerprint differs from the current corpus, retraining");
                None
            }
            Err(reason) => {
                info!(reason = %reason, "stored artifact not usable, training");
                None
            }
        }
    }
}

fn report_for_loaded(model: &TrainedModel) -> TrainingReport {
    TrainingReport {
        trained: false,
        record_count: model.len(),
        label_count: model.labels().len(),
        vocabulary_size: model.vocabulary_size(),
        skipped_appointment_rows: 0,
        skipped_catalog_rows: 0,
        skipped_unknown_labels: 0,
        corpus_fingerprint: model.meta().corpus_fingerprint.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    const APPOINTMENTS: &str = concat!(
        "token,age,patient_condition,specialist\n",
        "HC0001,34,skin rash on arm,Dermatology\n",
        "HC0002,51,migraine headache,Neurology\n",
        "HC0003,47,chest tightness,Cardiology\n",
        "HC0004,28,ankle sprain,Orthopedics\n",
        "HC0005,39,itchy skin eczema,Dermatology\n",
        "HC0006,62,chest pain,Cardiology\n",
        "HC0007,23,fractured wrist,Orthopedics\n",
        "HC0008,55,numbness of fingers,Neurology\n",
        "HC0009,31,knee swelling,Orthopedics\n",
        "HC0010,58,palpitations and dizziness,Cardiology\n",
    );
    const SPECIALISTS: &str = concat!(
        "name,keywords\n",
        "Cardiology,\"chest pain palpitations heart\"\n",
        "Dermatology,\"skin rash eczema\"\n",
        "Neurology,\"headache migraine numbness\"\n",
        "Orthopedics,\"fracture sprain joint\"\n",
    );
    const GENERAL: &str = "name,keywords\nGeneral Physician,\"fever checkup\"\n";

    fn test_config(dir: &Path) -> Config {
        fs::write(dir.join("appointments.csv"), APPOINTMENTS).expect("write appointments");
        fs::write(dir.join("specialist.csv"), SPECIALISTS).expect("write specialists");
        fs::write(dir.join("general.csv"), GENERAL).expect("write general");
        Config {
            appointments_path: dir.join("appointments.csv"),
            specialists_path: dir.join("specialist.csv"),
            general_physicians_path: dir.join("general.csv"),
            artifact_path: dir.join("model.bin"),
            neighbors: 3,
            force_retrain: false,
        }
    }

    #[tokio::test]
    async fn test_first_run_trains_second_run_loads() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let config = test_config(dir.path());
        let pipeline = TrainingPipeline::new(config.clone());

        let (model, report) = pipeline.load_or_train().await.expect("first run");
        assert!(report.trained);
        assert_eq!(report.record_count, 10);
        assert_eq!(report.label_count, 4);
        assert!(config.artifact_path.exists());

        let (loaded, second) = pipeline.load_or_train().await.expect("second run");
        assert!(!second.trained);
        assert_eq!(second.corpus_fingerprint, report.corpus_fingerprint);
        assert_eq!(
            model.recommend_specialist("chest pain").expect("classify"),
            loaded.recommend_specialist("chest pain").expect("classify")
        );
    }

    #[tokio::test]
    async fn test_corpus_change_triggers_retraining() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let config = test_config(dir.path());
        let pipeline = TrainingPipeline::new(config.clone());

        pipeline.load_or_train().await.expect("first run");
        assert!(!pipeline.needs_training().expect("needs_training"));

        let mut appointments = APPOINTMENTS.to_string();
        appointments.push_str("HC0011,45,lower back pain,Orthopedics\n");
        fs::write(&config.appointments_path, appointments).expect("rewrite appointments");

        assert!(pipeline.needs_training().expect("needs_training"));
        let (model, report) = pipeline.load_or_train().await.expect("retrain");
        assert!(report.trained);
        assert_eq!(model.len(), 11);
    }

    #[tokio::test]
    async fn test_force_retrain_ignores_a_current_artifact() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let mut config = test_config(dir.path());
        TrainingPipeline::new(config.clone()).load_or_train().await.expect("first run");

        config.force_retrain = true;
        let pipeline = TrainingPipeline::new(config);
        assert!(pipeline.needs_training().expect("needs_training"));
        let (_, report) = pipeline.load_or_train().await.expect("forced run");
        assert!(report.trained);
    }

    #[tokio::test]
    async fn test_single_label_corpus_fails_with_insufficient_data() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let mut config = test_config(dir.path());
        fs::write(
            &config.appointments_path,
            concat!(
                "token,age,patient_condition,specialist\n",
                "HC0001,40,chest pain,Cardiology\n",
                "HC0002,41,palpitations,Cardiology\n",
            ),
        )
        .expect("rewrite appointments");
        config.force_retrain = true;

        let err = TrainingPipeline::new(config).load_or_train().await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientData(_)));
    }

    #[tokio::test]
    async fn test_unknown_labels_are_reported() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let config = test_config(dir.path());
        let mut appointments = APPOINTMENTS.to_string();
        appointments.push_str("HC0011,45,itchy scalp,Wizardry\n");
        fs::write(&config.appointments_path, appointments).expect("rewrite appointments");

        let (model, report) = TrainingPipeline::new(config).train().await.expect("train");
        assert_eq!(report.skipped_unknown_labels, 1);
        assert_eq!(model.len(), 10);
    }

    #[tokio::test]
    async fn test_training_leaves_no_temporary_file() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let config = test_config(dir.path());
        TrainingPipeline::new(config.clone()).train().await.expect("train");
        assert!(config.artifact_path.exists());
        assert!(!config.artifact_path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_column_aborts_training() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let config = test_config(dir.path());
        fs::write(&config.appointments_path, "age,specialist\n40,Cardiology\n")
            .expect("rewrite appointments");

        let err = TrainingPipeline::new(config).train().await.unwrap_err();
        assert!(matches!(err, AppError::DataLoad { .. }));
    }

    #[test]
    fn test_fingerprint_is_stable_and_content_sensitive() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let config = test_config(dir.path());
        let pipeline = TrainingPipeline::new(config.clone());

        let first = pipeline.corpus_fingerprint().expect("fingerprint");
        let second = pipeline.corpus_fingerprint().expect("fingerprint");
        assert_eq!(first, second);

        fs::write(&config.specialists_path, "name\nCardiology\n").expect("rewrite specialists");
        let changed = pipeline.corpus_fingerprint().expect("fingerprint");
        assert_ne!(first, changed);
    }
}
