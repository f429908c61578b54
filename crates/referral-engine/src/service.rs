/// Query-serving facade over the trained model.
///
/// A fitted model is immutable, so the service keeps the current instance
/// behind an `Arc` and each query clones that handle under a short read
/// guard. Queries then run lock-free on their own snapshot; `reload` swaps
/// the handle for a new model while in-flight queries finish on the
/// instance they started with.
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::error::AppError;
use crate::model::{ModelInfo, SimilarAppointment};
use crate::recommender::TrainedModel;

pub struct RecommendationService {
    model: RwLock<Arc<TrainedModel>>,
}

impl RecommendationService {
    pub fn new(model: TrainedModel) -> Self {
        Self { model: RwLock::new(Arc::new(model)) }
    }

    /// Handle to the current model; the lock is held only for the clone.
    pub async fn snapshot(&self) -> Arc<TrainedModel> {
        self.model.read().await.clone()
    }

    /// Specialist label best matching a free-text condition.
    pub async fn recommend_doctor(&self, condition: &str) -> Result<String, AppError> {
        self.snapshot().await.recommend_specialist(condition)
    }

    /// Historical appointments most similar to the record at `index`,
    /// ordered by descending similarity.
    pub async fn recommend(
        &self,
        index: usize,
        count: usize,
    ) -> Result<Vec<SimilarAppointment>, AppError> {
        self.snapshot().await.similar(index, count)
    }

    pub async fn model_info(&self) -> ModelInfo {
        self.snapshot().await.info()
    }

    /// Swap in a freshly trained model.
    pub async fn reload(&self, model: TrainedModel) {
        let mut guard = self.model.write().await;
        *guard = Arc::new(model);
        info!(records = guard.len(), labels = guard.labels().len(), "model reloaded");
    }
}
