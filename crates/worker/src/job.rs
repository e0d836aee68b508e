//! End-to-end nesting job orchestration.
//!
//! One call to [`run_job`] drives the whole pipeline: validate the
//! request, compose the bin and parts documents from the asset store,
//! provision a browser surface, upload, start, wait for convergence,
//! extract the artifact, and persist it under a fresh job id. The
//! surface is closed on every exit path, success or failure.

use std::fmt;
use std::time::Duration;

use nestrun_browser::{
    await_convergence, ConvergenceError, ConvergenceOutcome, NestingSurface, SurfaceError,
    SurfaceProvider,
};
use nestrun_core::compose::{compose, ComposeError, ComposedAsset};
use nestrun_core::error::CoreError;
use nestrun_core::job::JobRequest;
use nestrun_core::store::{result_key, AssetStore, StoreError};
use uuid::Uuid;

/// Content type of the persisted result artifact.
const RESULT_CONTENT_TYPE: &str = "image/svg+xml";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which composed document a failing phase was acting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobDocument {
    Bin,
    Parts,
}

impl fmt::Display for JobDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobDocument::Bin => write!(f, "bin"),
            JobDocument::Parts => write!(f, "parts"),
        }
    }
}

/// Errors from one job run, tagged with the phase that failed.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("invalid job request: {0}")]
    InvalidRequest(#[from] CoreError),

    #[error("failed to compose {document} document: {source}")]
    Compose {
        document: JobDocument,
        #[source]
        source: ComposeError,
    },

    #[error("failed to provision browser surface: {0}")]
    Provision(#[source] SurfaceError),

    #[error("failed to upload {document} document: {source}")]
    Upload {
        document: JobDocument,
        #[source]
        source: SurfaceError,
    },

    #[error("failed to start the nesting run: {0}")]
    Start(#[source] SurfaceError),

    #[error("nesting page is missing required element {0}")]
    MissingDomElement(String),

    #[error("browser surface error: {0}")]
    Surface(#[source] SurfaceError),

    #[error(transparent)]
    Convergence(#[from] ConvergenceError),

    #[error("nesting run did not converge within {waited:?}")]
    ConvergenceTimedOut { waited: Duration },

    #[error("failed to read the result artifact: {0}")]
    Extraction(#[source] SurfaceError),

    #[error("nesting page produced no result artifact")]
    EmptyResult,

    #[error("failed to persist the result artifact: {0}")]
    StorageUpload(#[from] StoreError),
}

/// A completed job.
#[derive(Debug)]
pub struct JobOutcome {
    /// Which trigger resolved the convergence wait.
    pub outcome: ConvergenceOutcome,
    /// Asset store key of the persisted artifact.
    pub result_key: String,
    /// Backend location reference of the persisted artifact.
    pub location: String,
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// Run one nesting job end to end.
///
/// Composition happens before any browser resource is acquired, so a
/// request whose sources are all missing never provisions a session.
/// Once a surface is provisioned it is closed on every exit path;
/// close failures are logged, never propagated over the job's own
/// outcome.
pub async fn run_job<P: SurfaceProvider>(
    store: &dyn AssetStore,
    provider: &P,
    request: &JobRequest,
) -> Result<JobOutcome, JobError> {
    request.validate()?;

    let job_id = Uuid::new_v4();
    tracing::info!(
        %job_id,
        owner = %request.owner,
        parts = request.parts.len(),
        "Starting nesting job",
    );

    let bin = compose(store, std::slice::from_ref(&request.bin))
        .await
        .map_err(|source| JobError::Compose {
            document: JobDocument::Bin,
            source,
        })?;
    let parts = compose(store, &request.parts)
        .await
        .map_err(|source| JobError::Compose {
            document: JobDocument::Parts,
            source,
        })?;

    let surface = provider.provision().await.map_err(JobError::Provision)?;
    let result = drive(store, &surface, request, job_id, &parts, &bin).await;

    if let Err(e) = surface.close().await {
        tracing::warn!(%job_id, error = %e, "Failed to close browser session");
    }

    match &result {
        Ok(outcome) => {
            tracing::info!(
                %job_id,
                result_key = %outcome.result_key,
                location = %outcome.location,
                outcome = ?outcome.outcome,
                "Nesting job finished",
            );
        }
        Err(e) => {
            tracing::error!(%job_id, error = %e, "Nesting job failed");
        }
    }
    result
}

/// The browser-bound phases, separated out so the caller can close the
/// surface no matter where they fail.
async fn drive<S: NestingSurface>(
    store: &dyn AssetStore,
    surface: &S,
    request: &JobRequest,
    job_id: Uuid,
    parts: &ComposedAsset,
    bin: &ComposedAsset,
) -> Result<JobOutcome, JobError> {
    surface
        .upload_parts(&parts.content)
        .await
        .map_err(|source| JobError::Upload {
            document: JobDocument::Parts,
            source,
        })?;
    surface
        .upload_bin(&bin.content)
        .await
        .map_err(|source| JobError::Upload {
            document: JobDocument::Bin,
            source,
        })?;

    surface.start().await.map_err(JobError::Start)?;
    capture(surface, "after start").await;

    let watcher = surface.watch_progress().await.map_err(|e| match e {
        SurfaceError::MissingElement(selector) => JobError::MissingDomElement(selector),
        other => JobError::Surface(other),
    })?;

    let config = &request.configuration;
    let outcome = await_convergence(
        watcher,
        f64::from(config.target_iterations()),
        config.efficiency_target(),
        config.timeout(),
    )
    .await?;

    capture(surface, "after convergence wait").await;
    if let ConvergenceOutcome::TimedOut { waited } = outcome {
        return Err(JobError::ConvergenceTimedOut { waited });
    }

    surface.send_result().await.map_err(JobError::Surface)?;
    let artifact = match surface.read_output().await.map_err(JobError::Extraction)? {
        Some(artifact) if !artifact.is_empty() => artifact,
        _ => return Err(JobError::EmptyResult),
    };

    let result_key = result_key(&job_id.to_string());
    let location = store
        .put(&result_key, artifact.into_bytes(), RESULT_CONTENT_TYPE)
        .await?;

    Ok(JobOutcome {
        outcome,
        result_key,
        location,
    })
}

/// Best-effort diagnostic screenshot; never fails the job.
async fn capture<S: NestingSurface>(surface: &S, stage: &str) {
    match surface.screenshot().await {
        Ok(encoded) => {
            tracing::debug!(stage, encoded_len = encoded.len(), "Captured screenshot");
        }
        Err(e) => {
            tracing::warn!(stage, error = %e, "Screenshot failed");
        }
    }
}
