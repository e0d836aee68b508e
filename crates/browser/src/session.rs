//! Live browser session over one DevTools page target.
//!
//! A [`BrowserSession`] owns the WebSocket connection to a page target
//! and exposes the nesting page through the [`NestingSurface`] trait.
//! A background reader task classifies every incoming frame: command
//! responses resolve their pending waiters, progress binding events
//! feed the signal channel, load events feed the navigation counter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::client::CdpClient;
use crate::dom;
use crate::protocol::{
    self, BindingCalled, CommandEnvelope, CommandFailure, ConsoleCalled, IncomingMessage,
    EVENT_BINDING_CALLED, EVENT_CONSOLE_CALLED, EVENT_LOAD_FIRED,
};
use crate::signal::{ProgressSignal, SignalWatcher};
use crate::{NestingSurface, SurfaceError, SurfaceProvider};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;
type PendingCommands = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, CommandFailure>>>>>;

/// One exclusively-owned page target session.
pub struct BrowserSession {
    client: CdpClient,
    target_id: String,
    sink: Mutex<WsSink>,
    pending: PendingCommands,
    next_id: AtomicU64,
    signal_rx: watch::Receiver<ProgressSignal>,
    load_rx: watch::Receiver<u64>,
    cancel: CancellationToken,
    binding_installed: Mutex<bool>,
    staging: TempDir,
    closed: AtomicBool,
}

impl BrowserSession {
    /// Open a fresh page target on `client` and attach to it.
    ///
    /// Enables the `Page` and `Runtime` protocol domains so navigation
    /// and binding events flow before anything else happens.
    pub async fn open(client: CdpClient) -> Result<Self, SurfaceError> {
        let target = client.open_page().await?;
        let ws_stream = client.connect(&target).await?;
        let (sink, stream) = ws_stream.split();

        let pending: PendingCommands = Arc::new(Mutex::new(HashMap::new()));
        let (signal_tx, signal_rx) = watch::channel(ProgressSignal::default());
        let (load_tx, load_rx) = watch::channel(0u64);
        let cancel = CancellationToken::new();

        tokio::spawn(read_loop(
            stream,
            Arc::clone(&pending),
            signal_tx,
            load_tx,
            cancel.clone(),
        ));

        let session = Self {
            client,
            target_id: target.id,
            sink: Mutex::new(sink),
            pending,
            next_id: AtomicU64::new(1),
            signal_rx,
            load_rx,
            cancel,
            binding_installed: Mutex::new(false),
            staging: TempDir::new()?,
            closed: AtomicBool::new(false),
        };

        session.execute("Page.enable", Value::Null).await?;
        session.execute("Runtime.enable", Value::Null).await?;
        Ok(session)
    }

    /// Navigate the page and wait for its load event.
    pub async fn navigate(&self, url: &str) -> Result<(), SurfaceError> {
        let mut load_rx = self.load_rx.clone();
        // Snapshot the counter first so a load fired between the
        // command and the wait is never missed.
        let _ = load_rx.borrow_and_update();

        self.execute("Page.navigate", json!({ "url": url })).await?;
        load_rx.changed().await.map_err(|_| {
            SurfaceError::Connection("connection closed while waiting for page load".to_string())
        })?;

        tracing::info!(target_id = %self.target_id, url, "Nesting page loaded");
        Ok(())
    }

    /// Issue one protocol command and wait for its response.
    async fn execute(&self, method: &str, params: Value) -> Result<Value, SurfaceError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = serde_json::to_string(&CommandEnvelope { id, method, params })?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let send_result = self.sink.lock().await.send(Message::Text(frame)).await;
        if let Err(e) = send_result {
            self.pending.lock().await.remove(&id);
            return Err(SurfaceError::Connection(format!(
                "failed to send {method}: {e}"
            )));
        }

        let outcome = rx.await.map_err(|_| {
            SurfaceError::Connection(format!("connection closed before {method} responded"))
        })?;
        outcome.map_err(|failure| SurfaceError::Command {
            method: method.to_string(),
            message: format!("{} (code {})", failure.message, failure.code),
        })
    }

    /// Evaluate an expression in the page, returning its value.
    async fn evaluate(&self, expression: &str) -> Result<Value, SurfaceError> {
        let result = self
            .execute(
                "Runtime.evaluate",
                json!({ "expression": expression, "returnByValue": true }),
            )
            .await?;
        Ok(result.pointer("/result/value").cloned().unwrap_or(Value::Null))
    }

    /// Evaluate a contract script, which returns `"ok"` or
    /// `"missing:<selector>"`.
    async fn evaluate_contract(&self, script: &str) -> Result<(), SurfaceError> {
        let value = self.evaluate(script).await?;
        match value.as_str() {
            Some("ok") => Ok(()),
            Some(missing) if missing.starts_with("missing:") => Err(
                SurfaceError::MissingElement(missing.trim_start_matches("missing:").to_string()),
            ),
            _ => Err(SurfaceError::Command {
                method: "Runtime.evaluate".to_string(),
                message: format!("unexpected script result: {value}"),
            }),
        }
    }

    /// Stage `svg` on disk and push it into the file input at
    /// `selector`.
    async fn set_file_input(
        &self,
        selector: &str,
        file_name: &str,
        svg: &str,
    ) -> Result<(), SurfaceError> {
        let path = self.staging.path().join(file_name);
        tokio::fs::write(&path, svg).await?;

        let document = self.execute("DOM.getDocument", json!({ "depth": 1 })).await?;
        let root_id = document
            .pointer("/root/nodeId")
            .and_then(Value::as_u64)
            .ok_or_else(|| SurfaceError::Command {
                method: "DOM.getDocument".to_string(),
                message: "response carried no root node".to_string(),
            })?;

        let node = self
            .execute(
                "DOM.querySelector",
                json!({ "nodeId": root_id, "selector": selector }),
            )
            .await?;
        let node_id = node.pointer("/nodeId").and_then(Value::as_u64).unwrap_or(0);
        if node_id == 0 {
            return Err(SurfaceError::MissingElement(selector.to_string()));
        }

        self.execute(
            "DOM.setFileInputFiles",
            json!({ "nodeId": node_id, "files": [path.to_string_lossy()] }),
        )
        .await?;

        tracing::debug!(selector, file_name, bytes = svg.len(), "Uploaded document");
        Ok(())
    }
}

#[async_trait]
impl NestingSurface for BrowserSession {
    async fn upload_parts(&self, svg: &str) -> Result<(), SurfaceError> {
        self.set_file_input(dom::PARTS_INPUT, "parts.svg", svg).await
    }

    async fn upload_bin(&self, svg: &str) -> Result<(), SurfaceError> {
        self.set_file_input(dom::BIN_INPUT, "bin.svg", svg).await
    }

    async fn start(&self) -> Result<(), SurfaceError> {
        self.evaluate_contract(&dom::click_script(dom::START_BUTTON))
            .await
    }

    async fn watch_progress(&self) -> Result<SignalWatcher, SurfaceError> {
        let mut installed = self.binding_installed.lock().await;
        if !*installed {
            self.execute(
                "Runtime.addBinding",
                json!({ "name": dom::PROGRESS_BINDING }),
            )
            .await?;
            *installed = true;
        }
        drop(installed);

        self.evaluate_contract(&dom::observer_script()).await?;

        // Each watcher gets its own channel fed by a forwarding task
        // gated on its token, so releasing the watcher stops signal
        // delivery instead of only marking the token cancelled.
        let token = self.cancel.child_token();
        let (fwd_tx, fwd_rx) = watch::channel(*self.signal_rx.borrow());
        tokio::spawn(forward_signals(
            self.signal_rx.clone(),
            fwd_tx,
            token.clone(),
        ));
        Ok(SignalWatcher::new(fwd_rx, token))
    }

    async fn send_result(&self) -> Result<(), SurfaceError> {
        self.evaluate_contract(&dom::click_script(dom::SEND_RESULT_BUTTON))
            .await
    }

    async fn read_output(&self) -> Result<Option<String>, SurfaceError> {
        let value = self.evaluate(&dom::read_output_script()).await?;
        Ok(value
            .as_str()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string()))
    }

    async fn screenshot(&self) -> Result<String, SurfaceError> {
        let result = self.execute("Page.captureScreenshot", Value::Null).await?;
        let data = result
            .pointer("/data")
            .and_then(Value::as_str)
            .ok_or_else(|| SurfaceError::Command {
                method: "Page.captureScreenshot".to_string(),
                message: "response carried no image data".to_string(),
            })?;

        tracing::debug!(encoded_len = data.len(), "Captured page screenshot");
        tracing::trace!(data, "Screenshot payload");
        Ok(data.to_string())
    }

    async fn close(&self) -> Result<(), SurfaceError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.cancel.cancel();
        // Best effort; the target close below is what actually frees
        // browser resources.
        let _ = self.sink.lock().await.close().await;
        self.client.close_page(&self.target_id).await
    }
}

/// Forwards progress updates into a per-watcher channel until the
/// watcher is released or the session's signal source closes.
async fn forward_signals(
    mut source: watch::Receiver<ProgressSignal>,
    sink: watch::Sender<ProgressSignal>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = source.changed() => {
                if changed.is_err() {
                    break;
                }
                let latest = *source.borrow_and_update();
                sink.send_replace(latest);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Reader task
// ---------------------------------------------------------------------------

async fn read_loop(
    mut stream: WsStream,
    pending: PendingCommands,
    signal_tx: watch::Sender<ProgressSignal>,
    load_tx: watch::Sender<u64>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    handle_frame(&text, &pending, &signal_tx, &load_tx).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::debug!("DevTools connection closed");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "DevTools connection failed");
                    break;
                }
            },
        }
    }

    // Dropping the waiters tells every in-flight command the
    // connection is gone.
    pending.lock().await.clear();
}

async fn handle_frame(
    text: &str,
    pending: &Mutex<HashMap<u64, oneshot::Sender<Result<Value, CommandFailure>>>>,
    signal_tx: &watch::Sender<ProgressSignal>,
    load_tx: &watch::Sender<u64>,
) {
    match protocol::classify(text) {
        Ok(IncomingMessage::Response { id, outcome }) => {
            if let Some(waiter) = pending.lock().await.remove(&id) {
                let _ = waiter.send(outcome);
            } else {
                tracing::trace!(id, "Response for unknown command id");
            }
        }
        Ok(IncomingMessage::Event { method, params }) => {
            handle_event(&method, params, signal_tx, load_tx);
        }
        Err(e) => {
            tracing::warn!(error = %e, "Discarding unparseable DevTools frame");
        }
    }
}

fn handle_event(
    method: &str,
    params: Value,
    signal_tx: &watch::Sender<ProgressSignal>,
    load_tx: &watch::Sender<u64>,
) {
    match method {
        EVENT_BINDING_CALLED => {
            let binding: BindingCalled = match serde_json::from_value(params) {
                Ok(binding) => binding,
                Err(e) => {
                    tracing::warn!(error = %e, "Malformed binding event");
                    return;
                }
            };
            if binding.name != dom::PROGRESS_BINDING {
                tracing::trace!(name = %binding.name, "Ignoring unrelated binding call");
                return;
            }
            match serde_json::from_str::<ProgressSignal>(&binding.payload) {
                Ok(signal) => {
                    tracing::trace!(?signal, "Progress signal");
                    signal_tx.send_replace(signal);
                }
                Err(e) => {
                    tracing::warn!(error = %e, payload = %binding.payload, "Malformed progress payload");
                }
            }
        }
        EVENT_LOAD_FIRED => {
            load_tx.send_modify(|loads| *loads += 1);
        }
        EVENT_CONSOLE_CALLED => {
            if let Ok(console) = serde_json::from_value::<ConsoleCalled>(params) {
                tracing::debug!(kind = %console.kind, args = ?console.args, "Page console");
            }
        }
        _ => {
            tracing::trace!(method, "Ignoring DevTools event");
        }
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Provisions one fresh page target per job: open, attach, navigate to
/// the nesting page.
pub struct CdpSurfaceProvider {
    devtools_url: String,
    page_url: String,
}

impl CdpSurfaceProvider {
    pub fn new(devtools_url: impl Into<String>, page_url: impl Into<String>) -> Self {
        Self {
            devtools_url: devtools_url.into(),
            page_url: page_url.into(),
        }
    }
}

#[async_trait]
impl SurfaceProvider for CdpSurfaceProvider {
    type Surface = BrowserSession;

    async fn provision(&self) -> Result<BrowserSession, SurfaceError> {
        let client = CdpClient::new(self.devtools_url.clone());
        let session = BrowserSession::open(client).await?;

        if let Err(e) = session.navigate(&self.page_url).await {
            // The target is already open; don't leak it.
            if let Err(close_err) = session.close().await {
                tracing::warn!(error = %close_err, "Failed to close session after navigation error");
            }
            return Err(e);
        }
        Ok(session)
    }
}
