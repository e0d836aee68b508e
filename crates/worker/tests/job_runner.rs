//! End-to-end job runner tests over a scripted browser surface.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use nestrun_browser::signal::SignalWatcher;
use nestrun_browser::{
    ConvergenceOutcome, NestingSurface, ProgressSignal, SurfaceError, SurfaceProvider,
};
use nestrun_core::job::{JobConfig, JobRequest, PartDescriptor};
use nestrun_core::store::AssetStore;
use nestrun_storage::MemoryAssetStore;
use nestrun_worker::job::{JobDocument, JobError};
use nestrun_worker::run_job;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Scripted surface
// ---------------------------------------------------------------------------

/// Surface that plays back a fixed progress script once started and
/// records every call it receives.
struct ScriptedSurface {
    calls: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    signal_tx: Arc<watch::Sender<ProgressSignal>>,
    signal_rx: watch::Receiver<ProgressSignal>,
    script: Vec<ProgressSignal>,
    output: Option<String>,
    missing_parts_input: bool,
}

impl ScriptedSurface {
    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl NestingSurface for ScriptedSurface {
    async fn upload_parts(&self, _svg: &str) -> Result<(), SurfaceError> {
        self.record("upload_parts");
        if self.missing_parts_input {
            return Err(SurfaceError::MissingElement("#fileinput".to_string()));
        }
        Ok(())
    }

    async fn upload_bin(&self, _svg: &str) -> Result<(), SurfaceError> {
        self.record("upload_bin");
        Ok(())
    }

    async fn start(&self) -> Result<(), SurfaceError> {
        self.record("start");
        let tx = Arc::clone(&self.signal_tx);
        let script = self.script.clone();
        tokio::spawn(async move {
            for signal in script {
                tokio::time::sleep(Duration::from_millis(10)).await;
                tx.send_replace(signal);
            }
        });
        Ok(())
    }

    async fn watch_progress(&self) -> Result<SignalWatcher, SurfaceError> {
        self.record("watch_progress");
        Ok(SignalWatcher::new(
            self.signal_rx.clone(),
            CancellationToken::new(),
        ))
    }

    async fn send_result(&self) -> Result<(), SurfaceError> {
        self.record("send_result");
        Ok(())
    }

    async fn read_output(&self) -> Result<Option<String>, SurfaceError> {
        self.record("read_output");
        Ok(self.output.clone())
    }

    async fn screenshot(&self) -> Result<String, SurfaceError> {
        Ok("c2NyZWVuc2hvdA==".to_string())
    }

    async fn close(&self) -> Result<(), SurfaceError> {
        self.record("close");
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct ScriptedProvider {
    calls: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    script: Vec<ProgressSignal>,
    output: Option<String>,
    missing_parts_input: bool,
}

impl ScriptedProvider {
    fn new(script: Vec<ProgressSignal>, output: Option<&str>) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
            script,
            output: output.map(|s| s.to_string()),
            missing_parts_input: false,
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SurfaceProvider for ScriptedProvider {
    type Surface = ScriptedSurface;

    async fn provision(&self) -> Result<ScriptedSurface, SurfaceError> {
        self.calls.lock().unwrap().push("provision".to_string());
        let (signal_tx, signal_rx) = watch::channel(ProgressSignal::default());
        Ok(ScriptedSurface {
            calls: Arc::clone(&self.calls),
            closed: Arc::clone(&self.closed),
            signal_tx: Arc::new(signal_tx),
            signal_rx,
            script: self.script.clone(),
            output: self.output.clone(),
            missing_parts_input: self.missing_parts_input,
        })
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const BIN_SVG: &str = r#"<svg><rect id="sheet" width="100" height="100"/></svg>"#;
const PART_SVG: &str = r#"<svg><path id="outline" d="M0 0h10v10z"/></svg>"#;

fn descriptor(part_id: &str, quantity: u32) -> PartDescriptor {
    PartDescriptor {
        owner_id: "user-1".to_string(),
        part_id: part_id.to_string(),
        quantity,
    }
}

fn request(configuration: JobConfig) -> JobRequest {
    JobRequest {
        owner: "user-1".to_string(),
        bin: descriptor("bin-1", 1),
        parts: vec![descriptor("part-1", 2)],
        configuration,
    }
}

async fn seeded_store() -> MemoryAssetStore {
    let store = MemoryAssetStore::new();
    store.insert("user-1/bin-1.svg", BIN_SVG).await;
    store.insert("user-1/part-1.svg", PART_SVG).await;
    store
}

fn progress(iterations: f64, efficiency: f64) -> ProgressSignal {
    ProgressSignal {
        iterations,
        placed: 0.0,
        efficiency,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn happy_path_persists_the_artifact_and_closes_the_surface() {
    let store = seeded_store().await;
    let provider = ScriptedProvider::new(
        vec![
            progress(1.0, 10.0),
            progress(2.0, 20.0),
            progress(3.0, 30.0),
        ],
        Some("<svg>nested</svg>"),
    );
    let req = request(JobConfig {
        max_iterations: Some(3),
        material_utilization: None,
        timeout_ms: None,
    });

    let outcome = run_job(&store, &provider, &req).await.expect("job succeeds");

    assert_eq!(outcome.outcome, ConvergenceOutcome::IterationLimitReached);
    assert!(outcome.result_key.starts_with("result/"));
    assert!(outcome.result_key.ends_with("/result.svg"));
    assert_eq!(outcome.location, format!("memory://{}", outcome.result_key));

    let stored = store
        .get(&outcome.result_key)
        .await
        .expect("artifact stored");
    assert_eq!(stored, b"<svg>nested</svg>".to_vec());

    assert!(provider.closed());
    let calls = provider.calls();
    assert_eq!(
        calls,
        vec![
            "provision",
            "upload_parts",
            "upload_bin",
            "start",
            "watch_progress",
            "send_result",
            "read_output",
            "close",
        ]
    );
}

#[tokio::test]
async fn efficiency_target_resolves_before_the_iteration_limit() {
    let store = seeded_store().await;
    let provider = ScriptedProvider::new(
        vec![progress(1.0, 30.0), progress(2.0, 72.5)],
        Some("<svg>nested</svg>"),
    );
    let req = request(JobConfig {
        max_iterations: Some(10),
        material_utilization: Some(70.0),
        timeout_ms: None,
    });

    let outcome = run_job(&store, &provider, &req).await.expect("job succeeds");
    assert_eq!(
        outcome.outcome,
        ConvergenceOutcome::EfficiencyThresholdReached
    );
    assert!(provider.closed());
}

#[tokio::test]
async fn convergence_timeout_fails_the_job_but_still_closes() {
    let store = seeded_store().await;
    // No progress ever arrives.
    let provider = ScriptedProvider::new(vec![], Some("<svg>nested</svg>"));
    let req = request(JobConfig {
        max_iterations: Some(3),
        material_utilization: None,
        timeout_ms: Some(200),
    });

    let result = run_job(&store, &provider, &req).await;
    assert_matches!(
        result,
        Err(JobError::ConvergenceTimedOut { waited }) if waited == Duration::from_millis(200)
    );
    assert!(provider.closed());
    // Nothing was persisted.
    assert_eq!(store.keys().await.len(), 2);
}

#[tokio::test]
async fn missing_parts_input_fails_the_upload_and_closes() {
    let store = seeded_store().await;
    let mut provider = ScriptedProvider::new(vec![], None);
    provider.missing_parts_input = true;
    let req = request(JobConfig::default());

    let result = run_job(&store, &provider, &req).await;
    assert_matches!(
        result,
        Err(JobError::Upload {
            document: JobDocument::Parts,
            ..
        })
    );
    assert!(provider.closed());
}

#[tokio::test]
async fn unfetchable_sources_fail_before_any_session_exists() {
    let store = MemoryAssetStore::new();
    let provider = ScriptedProvider::new(vec![], None);
    let req = request(JobConfig::default());

    let result = run_job(&store, &provider, &req).await;
    assert_matches!(
        result,
        Err(JobError::Compose {
            document: JobDocument::Bin,
            ..
        })
    );
    assert!(provider.calls().is_empty());
    assert!(!provider.closed());
}

#[tokio::test]
async fn empty_artifact_is_an_error() {
    let store = seeded_store().await;
    let provider = ScriptedProvider::new(vec![progress(1.0, 99.0)], Some(""));
    let req = request(JobConfig::default());

    let result = run_job(&store, &provider, &req).await;
    assert_matches!(result, Err(JobError::EmptyResult));
    assert!(provider.closed());
}

#[tokio::test]
async fn absent_artifact_is_an_error() {
    let store = seeded_store().await;
    let provider = ScriptedProvider::new(vec![progress(1.0, 99.0)], None);
    let req = request(JobConfig::default());

    let result = run_job(&store, &provider, &req).await;
    assert_matches!(result, Err(JobError::EmptyResult));
    assert!(provider.closed());
}

#[tokio::test]
async fn invalid_request_never_touches_the_store_or_browser() {
    let store = seeded_store().await;
    let provider = ScriptedProvider::new(vec![], None);
    let mut req = request(JobConfig::default());
    req.bin.quantity = 3;

    let result = run_job(&store, &provider, &req).await;
    assert_matches!(result, Err(JobError::InvalidRequest(_)));
    assert!(provider.calls().is_empty());
}
