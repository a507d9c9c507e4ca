//! Background execution host.
//!
//! Ingestion and filtering run on a dedicated OS thread that owns its own
//! single-threaded tokio runtime. Callers talk to it only through channels:
//! requests go in through a [`WorkerHandle`], responses come back on the
//! receiver returned by [`WorkerHost::new`]. Every payload is moved across
//! the boundary by value.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use futures::future::BoxFuture;
use futures::FutureExt;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::catalog::{Category, Channel, PlaylistSource};
use crate::errors::{CatalogError, CatalogResult};
use crate::filter::{filter_channels, FilterQuery};
use crate::ingest::{ingest, FetchContext};

/// Identifies one request. Ids increase monotonically per host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestKind {
    Load,
    Add,
    Filter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum WorkerRequest {
    Load { source: PlaylistSource },
    /// Processed exactly like `Load`, the kind only matters to the caller
    Add { source: PlaylistSource },
    #[serde(rename_all = "camelCase")]
    Filter {
        all_channels: Vec<Channel>,
        query: FilterQuery,
    },
}

impl WorkerRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            WorkerRequest::Load { .. } => RequestKind::Load,
            WorkerRequest::Add { .. } => RequestKind::Add,
            WorkerRequest::Filter { .. } => RequestKind::Filter,
        }
    }
}

/// Success data: categories for LOAD/ADD, channels for FILTER. On the wire
/// it is a bare array; the response's `kind` says which one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Categories(Vec<Category>),
    Channels(Vec<Channel>),
}

impl Payload {
    fn decode(kind: RequestKind, data: serde_json::Value) -> Result<Self, serde_json::Error> {
        match kind {
            RequestKind::Load | RequestKind::Add => serde_json::from_value(data).map(Payload::Categories),
            RequestKind::Filter => serde_json::from_value(data).map(Payload::Channels),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Success { data: Payload },
    Error { message: String, error: CatalogError },
}

impl Outcome {
    fn failure(error: CatalogError) -> Self {
        Outcome::Error {
            message: error.to_string(),
            error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawResponse")]
pub struct WorkerResponse {
    pub id: RequestId,
    pub kind: RequestKind,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Wire form of a response before `data` is decoded against `kind`
#[derive(Deserialize)]
struct RawResponse {
    id: RequestId,
    kind: RequestKind,
    #[serde(flatten)]
    outcome: RawOutcome,
}

#[derive(Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum RawOutcome {
    Success { data: serde_json::Value },
    Error { message: String, error: CatalogError },
}

impl TryFrom<RawResponse> for WorkerResponse {
    type Error = serde_json::Error;

    fn try_from(raw: RawResponse) -> Result<Self, Self::Error> {
        let outcome = match raw.outcome {
            RawOutcome::Success { data } => Outcome::Success {
                data: Payload::decode(raw.kind, data)?,
            },
            RawOutcome::Error { message, error } => Outcome::Error { message, error },
        };
        Ok(WorkerResponse {
            id: raw.id,
            kind: raw.kind,
            outcome,
        })
    }
}

impl WorkerResponse {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    pub fn into_result(self) -> CatalogResult<Payload> {
        match self.outcome {
            Outcome::Success { data } => Ok(data),
            Outcome::Error { error, .. } => Err(error),
        }
    }
}

struct Envelope {
    id: RequestId,
    request: WorkerRequest,
}

/// Cheap, cloneable sender side of a running worker
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    requests: mpsc::UnboundedSender<Envelope>,
    next_id: Arc<AtomicU64>,
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Envelope({} {:?})", self.id, self.request.kind())
    }
}

impl WorkerHandle {
    /// Queues a request and returns its id without waiting for the reply.
    pub fn send(&self, request: WorkerRequest) -> CatalogResult<RequestId> {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!("Dispatching {:?} request {}", request.kind(), id);
        self.requests
            .send(Envelope { id, request })
            .map_err(|_| CatalogError::internal("background worker is not running"))?;
        Ok(id)
    }

    pub fn load(&self, source: PlaylistSource) -> CatalogResult<RequestId> {
        self.send(WorkerRequest::Load { source })
    }

    pub fn add(&self, source: PlaylistSource) -> CatalogResult<RequestId> {
        self.send(WorkerRequest::Add { source })
    }

    pub fn filter(&self, all_channels: Vec<Channel>, query: FilterQuery) -> CatalogResult<RequestId> {
        self.send(WorkerRequest::Filter { all_channels, query })
    }
}

/// Turns one request into its result. Runs on the worker runtime.
type Executor = Arc<dyn Fn(WorkerRequest) -> BoxFuture<'static, CatalogResult<Payload>> + Send + Sync>;

struct Running {
    handle: WorkerHandle,
    stop: oneshot::Sender<()>,
    thread: JoinHandle<()>,
}

/// Owns the background worker. The thread is started on the first call to
/// [`WorkerHost::handle`] and never more than once.
pub struct WorkerHost {
    executor: Executor,
    responses: mpsc::UnboundedSender<WorkerResponse>,
    running: OnceCell<Running>,
}

impl WorkerHost {
    pub fn new(ctx: FetchContext) -> (Self, mpsc::UnboundedReceiver<WorkerResponse>) {
        Self::with_executor(Arc::new(move |request: WorkerRequest| {
            let ctx = ctx.clone();
            async move { execute(&ctx, request).await }.boxed()
        }))
    }

    fn with_executor(executor: Executor) -> (Self, mpsc::UnboundedReceiver<WorkerResponse>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let host = Self {
            executor,
            responses: tx,
            running: OnceCell::new(),
        };
        (host, rx)
    }

    pub fn is_started(&self) -> bool {
        self.running.get().is_some()
    }

    pub fn handle(&self) -> CatalogResult<WorkerHandle> {
        self.running
            .get_or_try_init(|| self.start())
            .map(|running| running.handle.clone())
    }

    fn start(&self) -> CatalogResult<Running> {
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let executor = self.executor.clone();
        let responses = self.responses.clone();

        let thread = std::thread::Builder::new()
            .name("catalog-worker".to_string())
            .spawn(move || run_worker(executor, req_rx, responses, stop_rx))
            .map_err(|e| CatalogError::internal(format!("failed to start background worker: {}", e)))?;

        info!("Background worker started");
        Ok(Running {
            handle: WorkerHandle {
                requests: req_tx,
                next_id: Arc::new(AtomicU64::new(1)),
            },
            stop: stop_tx,
            thread,
        })
    }

    /// Stops the worker and waits for its thread. Requests still in flight
    /// are abandoned and handles report the worker as not running.
    pub fn shutdown(self) -> CatalogResult<()> {
        let Some(running) = self.running.into_inner() else {
            return Ok(());
        };
        let _ = running.stop.send(());
        drop(running.handle);
        running
            .thread
            .join()
            .map_err(|panic| CatalogError::internal(panic_message(panic.as_ref())))?;
        info!("Background worker stopped");
        Ok(())
    }
}

fn run_worker(
    executor: Executor,
    mut requests: mpsc::UnboundedReceiver<Envelope>,
    responses: mpsc::UnboundedSender<WorkerResponse>,
    mut stop: oneshot::Receiver<()>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("Background worker runtime failed to start: {}", e);
            let error = CatalogError::internal(format!("worker runtime unavailable: {}", e));
            while let Some(Envelope { id, request }) = requests.blocking_recv() {
                let _ = responses.send(WorkerResponse {
                    id,
                    kind: request.kind(),
                    outcome: Outcome::failure(error.clone()),
                });
            }
            return;
        }
    };

    runtime.block_on(async move {
        loop {
            tokio::select! {
                _ = &mut stop => break,
                envelope = requests.recv() => {
                    let Some(envelope) = envelope else { break };
                    let executor = executor.clone();
                    let responses = responses.clone();
                    tokio::spawn(async move {
                        let response = process(&executor, envelope).await;
                        if responses.send(response).is_err() {
                            debug!("Response dropped, receiver is gone");
                        }
                    });
                }
            }
        }
    });
}

async fn process(executor: &Executor, envelope: Envelope) -> WorkerResponse {
    let Envelope { id, request } = envelope;
    let kind = request.kind();

    let work = async move { (**executor)(request).await };
    let outcome = match AssertUnwindSafe(work).catch_unwind().await {
        Ok(Ok(data)) => Outcome::Success { data },
        Ok(Err(err)) => {
            warn!("{:?} request {} failed: {}", kind, id, err);
            Outcome::failure(err)
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!("{:?} request {} panicked: {}", kind, id, message);
            Outcome::failure(CatalogError::internal(message))
        }
    };

    WorkerResponse { id, kind, outcome }
}

/// Runs one request to completion. LOAD and ADD refuse empty catalogs.
pub async fn execute(ctx: &FetchContext, request: WorkerRequest) -> CatalogResult<Payload> {
    match request {
        WorkerRequest::Load { source } | WorkerRequest::Add { source } => {
            let categories = ingest(ctx, &source).await?;
            if categories.is_empty() {
                return Err(CatalogError::EmptyResult);
            }
            Ok(Payload::Categories(categories))
        }
        WorkerRequest::Filter { all_channels, query } => {
            let channels = tokio::task::spawn_blocking(move || filter_channels(&all_channels, &query))
                .await
                .map_err(|e| CatalogError::internal(format!("filter task failed: {}", e)))?;
            Ok(Payload::Channels(channels))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "background worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::View;

    const PLAYLIST: &str = "#EXTM3U\n#EXTINF:-1 group-title=\"News\",News One\nhttp://a.test/news1\n#EXTINF:-1 group-title=\"Sports\",Sports One\nhttp://a.test/sports1\n";

    #[test]
    fn test_request_kind() {
        assert_eq!(WorkerRequest::Load { source: PlaylistSource::file("") }.kind(), RequestKind::Load);
        assert_eq!(WorkerRequest::Add { source: PlaylistSource::file("") }.kind(), RequestKind::Add);
        let filter = WorkerRequest::Filter {
            all_channels: Vec::new(),
            query: FilterQuery::default(),
        };
        assert_eq!(filter.kind(), RequestKind::Filter);
    }

    #[test]
    fn test_response_envelope_shape() {
        let ok = WorkerResponse {
            id: RequestId(3),
            kind: RequestKind::Filter,
            outcome: Outcome::Success {
                data: Payload::Channels(Vec::new()),
            },
        };
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["kind"], "FILTER");
        assert_eq!(json["id"], 3);
        assert!(json["data"].is_array());

        let err = WorkerResponse {
            id: RequestId(4),
            kind: RequestKind::Load,
            outcome: Outcome::failure(CatalogError::Format),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "Invalid M3U file: missing #EXTM3U header");
        assert_eq!(json["error"]["type"], "format");
    }

    #[test]
    fn test_empty_filter_result_round_trips_as_channels() {
        let response = WorkerResponse {
            id: RequestId(9),
            kind: RequestKind::Filter,
            outcome: Outcome::Success {
                data: Payload::Channels(Vec::new()),
            },
        };
        let text = serde_json::to_string(&response).unwrap();
        let decoded: WorkerResponse = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded, response);

        let mut session = crate::session::CatalogSession::new(10);
        session.track(RequestKind::Filter, RequestId(9));
        assert_eq!(session.apply(decoded), crate::session::Applied::DisplayUpdated);
        assert!(session.display_channels().is_empty());
    }

    #[test]
    fn test_response_data_is_decoded_by_kind() {
        let load: WorkerResponse =
            serde_json::from_str(r#"{"id":1,"kind":"LOAD","status":"success","data":[]}"#).unwrap();
        assert_eq!(load.into_result().unwrap(), Payload::Categories(Vec::new()));

        let err: WorkerResponse = serde_json::from_str(
            r#"{"id":2,"kind":"ADD","status":"error","message":"No channels found","error":{"type":"empty_result"}}"#,
        )
        .unwrap();
        assert_eq!(err.into_result().unwrap_err(), CatalogError::EmptyResult);

        let mismatched = serde_json::from_str::<WorkerResponse>(
            r#"{"id":3,"kind":"FILTER","status":"success","data":[{"name":"News","channels":[]}]}"#,
        );
        assert!(mismatched.is_err());
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "background worker panicked");
    }

    #[tokio::test]
    async fn test_execute_load_and_filter() {
        let ctx = FetchContext::offline(false);
        let data = execute(&ctx, WorkerRequest::Load { source: PlaylistSource::file(PLAYLIST) })
            .await
            .unwrap();
        let Payload::Categories(categories) = data else {
            panic!("expected categories");
        };
        assert_eq!(categories.len(), 2);

        let all_channels = crate::preprocessing::flatten_categories(&categories);
        let query = FilterQuery::default().with_view(View::Categories).with_search("news");
        let data = execute(&ctx, WorkerRequest::Filter { all_channels, query }).await.unwrap();
        let Payload::Channels(channels) = data else {
            panic!("expected channels");
        };
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "News One");
    }

    #[tokio::test]
    async fn test_execute_rejects_empty_catalog_for_load_and_add() {
        let ctx = FetchContext::offline(false);
        for request in [
            WorkerRequest::Load { source: PlaylistSource::file("#EXTM3U\n") },
            WorkerRequest::Add { source: PlaylistSource::file("#EXTM3U\n") },
        ] {
            assert_eq!(execute(&ctx, request).await.unwrap_err(), CatalogError::EmptyResult);
        }
    }

    #[test]
    fn test_host_starts_lazily_and_once() {
        let (host, _rx) = WorkerHost::new(FetchContext::offline(false));
        assert!(!host.is_started());
        let a = host.handle().unwrap();
        let b = host.handle().unwrap();
        assert!(host.is_started());

        let first = a.load(PlaylistSource::file(PLAYLIST)).unwrap();
        let second = b.load(PlaylistSource::file(PLAYLIST)).unwrap();
        assert!(second > first);

        host.shutdown().unwrap();
        assert!(a.load(PlaylistSource::file(PLAYLIST)).is_err());
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_reply_and_worker_keeps_serving() {
        let executor: Executor = Arc::new(|request: WorkerRequest| {
            async move {
                if let WorkerRequest::Filter { query, .. } = &request {
                    if query.search_term == "boom" {
                        panic!("filter exploded");
                    }
                }
                execute(&FetchContext::offline(false), request).await
            }
            .boxed()
        });
        let (host, mut rx) = WorkerHost::with_executor(executor);
        let worker = host.handle().unwrap();
        let wait = std::time::Duration::from_secs(10);

        let bad = worker.filter(Vec::new(), FilterQuery::default().with_search("boom")).unwrap();
        let response = tokio::time::timeout(wait, rx.recv()).await.unwrap().unwrap();
        assert_eq!(response.id, bad);
        assert_eq!(response.kind, RequestKind::Filter);
        match response.outcome {
            Outcome::Error { message, error } => {
                assert!(message.contains("filter exploded"));
                assert_eq!(error, CatalogError::internal("filter exploded"));
            }
            other => panic!("expected an error reply, got {:?}", other),
        }

        let good = worker.load(PlaylistSource::file(PLAYLIST)).unwrap();
        let response = tokio::time::timeout(wait, rx.recv()).await.unwrap().unwrap();
        assert_eq!(response.id, good);
        assert!(response.is_success());
        assert!(rx.try_recv().is_err());

        host.shutdown().unwrap();
    }

    #[test]
    fn test_shutdown_without_start() {
        let (host, _rx) = WorkerHost::new(FetchContext::offline(false));
        host.shutdown().unwrap();
    }
}
