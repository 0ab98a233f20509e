//! Read-only analytics commands: cluster summary and the recommendation requests.

use chrono::NaiveDate;
use clap::Args;

use kendra_core::domain::center::CenterId;
use kendra_core::domain::service::ServiceType;
use kendra_core::errors::AnalyticsError;
use kendra_core::recommend::{
    ServiceToCenterRequest, SortOrder, TrainingPlanRequest, TrainingRequest,
    UnderperformingRequest,
};
use kendra_core::service::AnalyticsService;

use crate::commands::{
    current_thread_runtime, date_range, finish, open_analytics, CommandContext, CommandResult,
};

#[derive(Debug, Clone, Default, Args)]
pub struct PeriodArgs {
    #[arg(long, help = "First provision date to include (YYYY-MM-DD)")]
    pub from: Option<NaiveDate>,
    #[arg(long, help = "Last provision date to include (YYYY-MM-DD)")]
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Args)]
pub struct ClustersArgs {
    #[arg(long, help = "Cluster inactive centers as well")]
    pub include_inactive: bool,
}

#[derive(Debug, Clone, Args)]
pub struct UnderperformingArgs {
    #[arg(long, default_value_t = 10, help = "Number of centers to return (1-1000)")]
    pub num_centers: usize,
    #[arg(long, default_value = "asc", help = "Score order: asc lists the weakest first")]
    pub sort: SortOrder,
    #[arg(long, help = "Only report centers in this district")]
    pub district: Option<String>,
    #[command(flatten)]
    pub period: PeriodArgs,
}

#[derive(Debug, Clone, Args)]
pub struct RecommendCentersArgs {
    #[arg(long, help = "Description of the candidate service")]
    pub description: String,
    #[arg(long, default_value = "", help = "Name of the candidate service")]
    pub name: String,
    #[arg(long = "service-type", default_value = "general")]
    pub service_type: ServiceType,
    #[arg(short = 'k', long = "top", default_value_t = 10, help = "Number of centers (1-1000)")]
    pub k: usize,
    #[arg(long, help = "Consider inactive centers as well")]
    pub include_inactive: bool,
    #[command(flatten)]
    pub period: PeriodArgs,
}

#[derive(Debug, Clone, Args)]
pub struct RecommendTrainingArgs {
    #[arg(long)]
    pub center_id: i64,
    #[arg(long, default_value_t = 0.0, help = "Drop needs below this priority")]
    pub min_priority: f64,
    #[arg(long)]
    pub limit: Option<usize>,
    #[command(flatten)]
    pub period: PeriodArgs,
}

#[derive(Debug, Clone, Args)]
pub struct TrainingPlanArgs {
    #[arg(long, help = "Maximum number of centers in the plan")]
    pub limit: Option<usize>,
    #[command(flatten)]
    pub period: PeriodArgs,
}

pub fn clusters(context: &CommandContext, args: &ClustersArgs) -> CommandResult {
    let include_inactive = args.include_inactive;
    with_analytics(context, "clusters", |analytics| async move {
        analytics.cluster_summary(include_inactive).await
    })
}

pub fn underperforming(context: &CommandContext, args: &UnderperformingArgs) -> CommandResult {
    let request = date_range(args.period.from, args.period.to).map(|date_range| {
        let mut request = UnderperformingRequest::new(args.num_centers);
        request.sort_order = args.sort;
        request.district = args.district.clone();
        request.date_range = date_range;
        request
    });
    with_request(context, "underperforming", request, |analytics, request| async move {
        analytics.detect_underperforming(&request).await
    })
}

pub fn recommend_centers(context: &CommandContext, args: &RecommendCentersArgs) -> CommandResult {
    let request = date_range(args.period.from, args.period.to).map(|date_range| {
        let mut request =
            ServiceToCenterRequest::new(args.description.clone(), args.service_type, args.k);
        request.name = args.name.clone();
        request.include_inactive = args.include_inactive;
        request.date_range = date_range;
        request
    });
    with_request(context, "recommend-centers", request, |analytics, request| async move {
        analytics.recommend_centers_for_service(&request).await
    })
}

pub fn recommend_training(context: &CommandContext, args: &RecommendTrainingArgs) -> CommandResult {
    let request = date_range(args.period.from, args.period.to).map(|date_range| {
        let mut request = TrainingRequest::new(CenterId(args.center_id));
        request.min_priority = args.min_priority;
        request.limit = args.limit;
        request.date_range = date_range;
        request
    });
    with_request(context, "recommend-training", request, |analytics, request| async move {
        analytics.recommend_training_for_center(&request).await
    })
}

pub fn training_plan(context: &CommandContext, args: &TrainingPlanArgs) -> CommandResult {
    let request = date_range(args.period.from, args.period.to)
        .map(|date_range| TrainingPlanRequest { limit: args.limit, date_range });
    with_request(context, "training-plan", request, |analytics, request| async move {
        analytics.training_plan(&request).await
    })
}

fn with_request<R, T, F, Fut>(
    context: &CommandContext,
    command: &str,
    request: Result<R, AnalyticsError>,
    call: F,
) -> CommandResult
where
    T: serde::Serialize,
    F: FnOnce(std::sync::Arc<AnalyticsService>, R) -> Fut,
    Fut: std::future::Future<Output = Result<T, AnalyticsError>>,
{
    let request = match request {
        Ok(request) => request,
        Err(error) => {
            let failure = context.request_failure(error);
            return CommandResult::failure(
                command,
                failure.error_class,
                failure.message,
                failure.exit_code,
            );
        }
    };
    with_analytics(context, command, move |analytics| call(analytics, request))
}

/// Loads config, opens the store and runs one analytics call on a current-thread runtime.
fn with_analytics<T, F, Fut>(context: &CommandContext, command: &str, call: F) -> CommandResult
where
    T: serde::Serialize,
    F: FnOnce(std::sync::Arc<AnalyticsService>) -> Fut,
    Fut: std::future::Future<Output = Result<T, AnalyticsError>>,
{
    let config = match context.load_config(command) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match current_thread_runtime(command) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let (pool, analytics) = open_analytics(&config).await?;
        let outcome = call(std::sync::Arc::new(analytics)).await;
        pool.close().await;
        outcome.map_err(|error| context.request_failure(error))
    });

    finish(command, result)
}
