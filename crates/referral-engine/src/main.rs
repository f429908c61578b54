use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use referral_engine::config::Config;
use referral_engine::service::RecommendationService;
use referral_engine::train::TrainingPipeline;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting specialist recommendation engine");

    let config = Config::from_env()?;
    info!(
        appointments = %config.appointments_path.display(),
        specialists = %config.specialists_path.display(),
        general_physicians = %config.general_physicians_path.display(),
        artifact = %config.artifact_path.display(),
        neighbors = config.neighbors,
        "configuration loaded"
    );

    let pipeline = TrainingPipeline::new(config);
    let (model, report) = pipeline.load_or_train().await?;
    if report.trained {
        info!(
            records = report.record_count,
            labels = report.label_count,
            vocabulary = report.vocabulary_size,
            skipped_appointment_rows = report.skipped_appointment_rows,
            skipped_unknown_labels = report.skipped_unknown_labels,
            "model trained"
        );
    } else {
        info!(
            records = report.record_count,
            labels = report.label_count,
            "model loaded from artifact"
        );
    }
    let service = RecommendationService::new(model);

    // Operator shell on stdio: a bare line classifies a condition, commands
    // cover the rest of the query surface.
    println!("ready. type a condition, or: similar <index> <count> | info | retrain | quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("quit") | Some("exit") => break,
            Some("info") => {
                println!("{}", serde_json::to_string_pretty(&service.model_info().await)?);
            }
            Some("similar") => {
                let index = parts.next().and_then(|v| v.parse::<usize>().ok());
                let count = parts.next().and_then(|v| v.parse::<usize>().ok());
                match (index, count) {
                    (Some(index), Some(count)) => match service.recommend(index, count).await {
                        Ok(results) => println!("{}", serde_json::to_string_pretty(&results)?),
                        Err(e) => println!("error: {e}"),
                    },
                    _ => println!("usage: similar <index> <count>"),
                }
            }
            Some("retrain") => match pipeline.train().await {
                Ok((model, report)) => {
                    service.reload(model).await;
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                Err(e) => println!("error: {e}"),
            },
            _ => match service.recommend_doctor(line).await {
                Ok(label) => println!("{label}"),
                Err(e) => println!("error: {e}"),
            },
        }
    }

    info!("engine shut down");
    Ok(())
}
