/// Worker configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development. In
/// production, override via environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Asset store bucket name.
    pub bucket: String,
    /// Asset store bucket region.
    pub region: String,
    /// URL of the remote nesting page.
    pub nesting_service_host: String,
    /// DevTools HTTP endpoint of the headless browser.
    pub devtools_url: String,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                          |
    /// |-------------------------|----------------------------------|
    /// | `AWS_S3_BUCKET_NAME`    | `nestrun-assets`                 |
    /// | `AWS_S3_BUCKET_REGION`  | `us-east-2`                      |
    /// | `NESTING_SERVICE_HOST`  | `https://svg-nest.netlify.app/`  |
    /// | `DEVTOOLS_URL`          | `http://127.0.0.1:9222`          |
    pub fn from_env() -> Self {
        let bucket =
            std::env::var("AWS_S3_BUCKET_NAME").unwrap_or_else(|_| "nestrun-assets".into());
        let region = std::env::var("AWS_S3_BUCKET_REGION").unwrap_or_else(|_| "us-east-2".into());
        let nesting_service_host = std::env::var("NESTING_SERVICE_HOST")
            .unwrap_or_else(|_| "https://svg-nest.netlify.app/".into());
        let devtools_url =
            std::env::var("DEVTOOLS_URL").unwrap_or_else(|_| "http://127.0.0.1:9222".into());

        Self {
            bucket,
            region,
            nesting_service_host,
            devtools_url,
        }
    }
}
