use serde::Serialize;

use kendra_db::migrations;

use crate::commands::{
    connect_pool, current_thread_runtime, finish, CommandContext, CommandResult, Failure,
};

#[derive(Debug, Serialize)]
struct MigrateOutput {
    applied_versions: Vec<i64>,
}

pub fn run(context: &CommandContext) -> CommandResult {
    let config = match context.load_config("migrate") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match current_thread_runtime("migrate") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_pool(&config).await?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| Failure::new("migration", error.to_string(), 5))?;
        let applied_versions = migrations::applied_versions(&pool)
            .await
            .map_err(|error| Failure::new("migration", error.to_string(), 5))?;
        pool.close().await;
        Ok::<_, Failure>(MigrateOutput { applied_versions })
    });

    finish("migrate", result)
}
