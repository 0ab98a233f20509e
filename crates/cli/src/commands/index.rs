use serde::Serialize;
use tracing::info;

use kendra_core::service::IndexBuildReport;
use kendra_db::repositories::{EmbeddingRepository, SqlEmbeddingRepository};

use crate::commands::{
    current_thread_runtime, finish, open_analytics, CommandContext, CommandResult, Failure,
};

#[derive(Debug, Serialize)]
struct IndexOutput {
    #[serde(flatten)]
    report: IndexBuildReport,
    persisted: usize,
}

/// Embeds every service and replaces the stored vectors.
pub fn run(context: &CommandContext) -> CommandResult {
    let config = match context.load_config("index") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match current_thread_runtime("index") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let (pool, analytics) = open_analytics(&config).await?;
        let report =
            analytics.build_index().await.map_err(|error| context.request_failure(error))?;

        let index = analytics.index().unwrap_or_default();
        let persisted = SqlEmbeddingRepository::new(pool.clone())
            .replace_all(&report.provider, &index)
            .await
            .map_err(|error| Failure::new("embedding_persistence", error.to_string(), 5))?;
        pool.close().await;

        info!(
            event_name = "cli.index.persisted",
            correlation_id = %context.correlation_id,
            persisted,
            "similarity index built and stored"
        );
        Ok::<_, Failure>(IndexOutput { report, persisted })
    });

    finish("index", result)
}
