use nestrun_browser::CdpSurfaceProvider;
use nestrun_core::job::JobRequest;
use nestrun_storage::S3AssetStore;
use nestrun_worker::{run_job, WorkerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nestrun_worker=info,nestrun_core=info,nestrun_browser=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "Worker exiting with failure");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = WorkerConfig::from_env();

    let path = std::env::args()
        .nth(1)
        .ok_or("usage: nestrun-worker <job-request.json>")?;
    let raw = tokio::fs::read_to_string(&path).await?;
    let request: JobRequest = serde_json::from_str(&raw)?;

    let store = S3AssetStore::connect(&config.bucket, &config.region).await;
    let provider = CdpSurfaceProvider::new(&config.devtools_url, &config.nesting_service_host);

    run_job(&store, &provider, &request).await?;
    Ok(())
}
