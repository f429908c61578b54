use std::path::PathBuf;

use crate::error::AppError;

/// Neighbors consulted per classification vote when `RECOMMENDER_NEIGHBORS`
/// is not set.
pub const DEFAULT_NEIGHBORS: usize = 5;

/// Engine configuration loaded explicitly from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Historical appointments CSV (read-only training input).
    pub appointments_path: PathBuf,
    /// Specialist catalog CSV (read-only training input).
    pub specialists_path: PathBuf,
    /// General-physician catalog CSV (read-only training input).
    pub general_physicians_path: PathBuf,
    /// Where the trained model artifact is written and loaded.
    pub artifact_path: PathBuf,
    /// Neighbors consulted per classification vote. Applies from the next
    /// training run; a loaded artifact keeps the value it was trained with.
    pub neighbors: usize,
    /// Retrain at startup even when the stored artifact is current.
    pub force_retrain: bool,
}

impl Config {
    /// Required:
    /// - `APPOINTMENTS_PATH`: historical appointments CSV
    /// - `SPECIALISTS_PATH`: specialist catalog CSV
    /// - `GENERAL_PHYSICIANS_PATH`: general-physician catalog CSV
    /// - `MODEL_ARTIFACT_PATH`: where the trained artifact is written/loaded
    ///
    /// Optional:
    /// - `RECOMMENDER_NEIGHBORS`: vote size for classification (default 5)
    /// - `FORCE_RETRAIN`: `1`/`true` retrains even if the artifact is current
    pub fn from_env() -> Result<Self, AppError> {
        let appointments_path = required_path("APPOINTMENTS_PATH")?;
        let specialists_path = required_path("SPECIALISTS_PATH")?;
        let general_physicians_path = required_path("GENERAL_PHYSICIANS_PATH")?;

        let artifact_path = PathBuf::from(required_var("MODEL_ARTIFACT_PATH")?);
        if let Some(parent) = artifact_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(AppError::Config(format!(
                    "artifact directory not found: {}",
                    parent.display()
                )));
            }
        }

        let neighbors = match std::env::var("RECOMMENDER_NEIGHBORS") {
            Ok(value) => value.parse::<usize>().ok().filter(|n| *n >= 1).ok_or_else(|| {
                AppError::Config(format!(
                    "RECOMMENDER_NEIGHBORS must be a positive integer, got {value:?}"
                ))
            })?,
            Err(_) => DEFAULT_NEIGHBORS,
        };

        let force_retrain = std::env::var("FORCE_RETRAIN")
            .map(|value| {
                let value = value.trim().to_ascii_lowercase();
                value == "1" || value == "true"
            })
            .unwrap_or(false);

        Ok(Self {
            appointments_path,
            specialists_path,
            general_physicians_path,
            artifact_path,
            neighbors,
            force_retrain,
        })
    }
}

fn required_var(name: &str) -> Result<String, AppError> {
    std::env::var(name)
        .map_err(|_| AppError::Config(format!("{name} environment variable is required")))
}

fn required_path(name: &str) -> Result<PathBuf, AppError> {
    let path = PathBuf::from(required_var(name)?);
    if !path.is_file() {
        return Err(AppError::Config(format!(
            "{name} file not found: {}",
            path.display()
        )));
    }
    Ok(path)
}
