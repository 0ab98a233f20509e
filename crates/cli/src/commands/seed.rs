use serde::Serialize;

use kendra_db::{migrations, DemoDataset, SeedResult};

use crate::commands::{
    connect_pool, current_thread_runtime, finish, CommandContext, CommandResult, Failure,
};

#[derive(Debug, Serialize)]
struct SeedOutput {
    seeded: SeedResult,
    checks_passed: usize,
}

pub fn run(context: &CommandContext) -> CommandResult {
    let config = match context.load_config("seed") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match current_thread_runtime("seed") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_pool(&config).await?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| Failure::new("migration", error.to_string(), 5))?;

        let seeded = DemoDataset::load(&pool)
            .await
            .map_err(|error| Failure::new("seed_execution", error.to_string(), 5))?;

        let verification = DemoDataset::verify(&pool)
            .await
            .map_err(|error| Failure::new("seed_verification", error.to_string(), 6))?;

        pool.close().await;

        if verification.all_present {
            Ok::<_, Failure>(SeedOutput { seeded, checks_passed: verification.checks.len() })
        } else {
            Err(Failure::new("seed_verification", verification_message(&verification.checks), 6))
        }
    });

    finish("seed", result)
}

fn verification_message(checks: &[(&'static str, bool)]) -> String {
    let failed_checks = checks
        .iter()
        .filter_map(|(check, passed)| (!passed).then_some(*check))
        .collect::<Vec<_>>();

    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
