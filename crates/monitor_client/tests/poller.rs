use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex, Once};
use std::time::Duration;

use monitor_client::{
    ApiClient, ApiError, BatchBackend, BatchEvent, BatchEventSink, BatchPoller, ChannelEventSink,
    ClientSettings, HistoryNavigator, KeyValueStore, MemoryStore, NullEventSink, SessionContext,
};
use monitor_core::{
    BatchAccepted, BatchProgress, BatchStatus, FailedItem, BATCH_ID_KEY, TOKEN_KEY, USERNAME_KEY,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const POLL: Duration = Duration::from_millis(20);

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(monitor_logging::initialize_for_tests);
}

fn client_for(server: &MockServer) -> ApiClient {
    init_logging();
    let durable = Arc::new(MemoryStore::with_entries([
        (TOKEN_KEY, "t1"),
        (USERNAME_KEY, "alice"),
    ]));
    let session = Arc::new(SessionContext::new(
        durable,
        Arc::new(HistoryNavigator::new("/jobs")),
    ));
    let settings = ClientSettings {
        poll_interval: POLL,
        ..ClientSettings::default()
    }
    .with_base_url(server.uri());
    ApiClient::new(settings, session).expect("client builds")
}

fn envelope(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "code": 0, "message": "ok", "data": data }))
}

fn progress_body(status: &str, current: u64, total: u64) -> ResponseTemplate {
    envelope(json!({
        "status": status,
        "total": total,
        "current": current,
        "success": current,
        "failed": 0,
        "failedItems": null,
    }))
}

async fn mount_submit(server: &MockServer, batch_id: &str) {
    Mock::given(method("POST"))
        .and(path("/jobs/batch-analyze"))
        .respond_with(envelope(json!({ "batchId": batch_id })))
        .expect(1)
        .mount(server)
        .await;
}

async fn settle(poller: &BatchPoller) {
    tokio::time::timeout(Duration::from_secs(5), poller.wait_until_idle())
        .await
        .expect("poller went idle");
}

fn job_ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

#[tokio::test]
async fn submitted_batch_is_polled_until_done() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jobs/batch-analyze"))
        .and(body_json(json!({ "jobIds": ["j1", "j2"] })))
        .respond_with(envelope(json!({ "batchId": "b1" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs/batch-analyze/b1"))
        .respond_with(progress_body("running", 1, 2))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs/batch-analyze/b1"))
        .respond_with(progress_body("done", 2, 2))
        .mount(&server)
        .await;

    let tab = Arc::new(MemoryStore::new());
    let (tx, rx) = mpsc::channel();
    let poller = BatchPoller::new(
        client_for(&server),
        tab.clone(),
        Arc::new(ChannelEventSink::new(tx)),
    );

    let batch_id = poller.submit(&job_ids(&["j1", "j2"])).await.unwrap();
    assert_eq!(batch_id, "b1");
    assert_eq!(tab.get(BATCH_ID_KEY).as_deref(), Some("b1"));
    assert!(poller.is_polling());
    assert_eq!(poller.progress(), Some(BatchProgress::started(2)));

    settle(&poller).await;

    let progress = poller.progress().expect("last snapshot kept");
    assert_eq!(progress.status, BatchStatus::Done);
    assert_eq!(progress.current, progress.total);
    assert_eq!(poller.batch_id(), None);
    assert_eq!(tab.get(BATCH_ID_KEY), None);

    let events: Vec<BatchEvent> = rx.try_iter().collect();
    assert_eq!(
        events.first(),
        Some(&BatchEvent::Progress(BatchProgress::started(2)))
    );
    assert!(matches!(events.last(), Some(BatchEvent::Finished(p)) if p.status == BatchStatus::Done));
}

#[tokio::test]
async fn cancelled_batch_stops_polling() {
    let server = MockServer::start().await;
    mount_submit(&server, "b2").await;
    Mock::given(method("POST"))
        .and(path("/jobs/batch-analyze/b2/cancel"))
        .respond_with(envelope(json!(null)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs/batch-analyze/b2"))
        .respond_with(progress_body("running", 0, 3))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs/batch-analyze/b2"))
        .respond_with(progress_body("cancelled", 1, 3))
        .expect(1)
        .mount(&server)
        .await;

    let tab = Arc::new(MemoryStore::new());
    let poller = BatchPoller::new(client_for(&server), tab.clone(), Arc::new(NullEventSink));

    poller.submit(&job_ids(&["a", "b", "c"])).await.unwrap();
    poller.cancel().await;
    settle(&poller).await;
    let requests_at_finish = server.received_requests().await.unwrap().len();

    let progress = poller.progress().unwrap();
    assert_eq!(progress.status, BatchStatus::Cancelled);
    assert_eq!(progress.current, 1);
    assert!(!poller.is_polling());
    assert_eq!(tab.get(BATCH_ID_KEY), None);

    tokio::time::sleep(POLL * 5).await;
    assert_eq!(
        server.received_requests().await.unwrap().len(),
        requests_at_finish
    );
}

#[tokio::test]
async fn reload_resumes_without_resubmitting() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jobs/batch-analyze"))
        .respond_with(envelope(json!({ "batchId": "other" })))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs/batch-analyze/b7"))
        .respond_with(progress_body("running", 3, 5))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs/batch-analyze/b7"))
        .respond_with(progress_body("done", 5, 5))
        .mount(&server)
        .await;

    let tab = Arc::new(MemoryStore::with_entries([(BATCH_ID_KEY, "b7")]));
    let poller = BatchPoller::new(client_for(&server), tab.clone(), Arc::new(NullEventSink));

    let recovered = poller.recover().await.expect("snapshot fetched");
    assert_eq!(recovered.status, BatchStatus::Running);
    assert_eq!(recovered.current, 3);
    assert!(poller.is_polling());
    assert_eq!(tab.get(BATCH_ID_KEY).as_deref(), Some("b7"));

    settle(&poller).await;
    assert_eq!(poller.progress().unwrap().status, BatchStatus::Done);
    assert_eq!(tab.get(BATCH_ID_KEY), None);
}

#[tokio::test]
async fn reload_after_completion_shows_result_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jobs/batch-analyze/b8"))
        .respond_with(envelope(json!({
            "status": "done",
            "total": 2,
            "current": 2,
            "success": 1,
            "failed": 1,
            "failedItems": [{ "jobId": "j2", "error": "llm timeout" }],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tab = Arc::new(MemoryStore::with_entries([(BATCH_ID_KEY, "b8")]));
    let poller = BatchPoller::new(client_for(&server), tab.clone(), Arc::new(NullEventSink));

    let progress = poller.recover().await.unwrap();

    assert_eq!(progress.status, BatchStatus::Done);
    assert_eq!(
        progress.failed_items,
        vec![FailedItem {
            job_id: "j2".to_string(),
            error: "llm timeout".to_string(),
        }]
    );
    assert!(!poller.is_polling());
    assert_eq!(tab.get(BATCH_ID_KEY), None);
}

#[tokio::test]
async fn recover_without_stored_batch_does_nothing() {
    let server = MockServer::start().await;
    let tab = Arc::new(MemoryStore::new());
    let poller = BatchPoller::new(client_for(&server), tab, Arc::new(NullEventSink));

    assert_eq!(poller.recover().await, None);
    assert!(!poller.is_polling());
}

#[tokio::test]
async fn failed_poll_forgets_the_batch() {
    let server = MockServer::start().await;
    mount_submit(&server, "b3").await;
    Mock::given(method("GET"))
        .and(path("/jobs/batch-analyze/b3"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "code": 404,
            "message": "batch not found",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tab = Arc::new(MemoryStore::new());
    let (tx, rx) = mpsc::channel();
    let poller = BatchPoller::new(
        client_for(&server),
        tab.clone(),
        Arc::new(ChannelEventSink::new(tx)),
    );

    poller.submit(&job_ids(&["j1", "j2"])).await.unwrap();
    settle(&poller).await;

    assert_eq!(poller.batch_id(), None);
    assert_eq!(tab.get(BATCH_ID_KEY), None);
    assert_eq!(poller.progress(), Some(BatchProgress::started(2)));
    let events: Vec<BatchEvent> = rx.try_iter().collect();
    assert_eq!(
        events.last(),
        Some(&BatchEvent::Abandoned {
            batch_id: "b3".to_string()
        })
    );
}

#[tokio::test]
async fn rejected_submission_tracks_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jobs/batch-analyze"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": 400,
            "message": "jobIds is required",
        })))
        .mount(&server)
        .await;

    let tab = Arc::new(MemoryStore::new());
    let poller = BatchPoller::new(client_for(&server), tab.clone(), Arc::new(NullEventSink));

    let err = poller.submit(&[]).await.unwrap_err();

    assert_eq!(err.code(), 400);
    assert_eq!(err.message(), "jobIds is required");
    assert_eq!(poller.batch_id(), None);
    assert!(!poller.is_polling());
    assert_eq!(tab.get(BATCH_ID_KEY), None);
}

#[tokio::test]
async fn stop_keeps_the_batch_for_later_recovery() {
    let server = MockServer::start().await;
    mount_submit(&server, "b4").await;
    Mock::given(method("GET"))
        .and(path("/jobs/batch-analyze/b4"))
        .respond_with(progress_body("running", 0, 1))
        .mount(&server)
        .await;

    let tab = Arc::new(MemoryStore::new());
    let poller = BatchPoller::new(client_for(&server), tab.clone(), Arc::new(NullEventSink));

    poller.submit(&job_ids(&["j1"])).await.unwrap();
    poller.stop();
    settle(&poller).await;

    assert!(!poller.is_polling());
    assert_eq!(poller.batch_id().as_deref(), Some("b4"));
    assert_eq!(tab.get(BATCH_ID_KEY).as_deref(), Some("b4"));
}

#[tokio::test]
async fn shutdown_then_reload_picks_the_batch_up_again() {
    let server = MockServer::start().await;
    mount_submit(&server, "b5").await;
    Mock::given(method("GET"))
        .and(path("/jobs/batch-analyze/b5"))
        .respond_with(progress_body("running", 1, 2))
        .mount(&server)
        .await;

    let tab = Arc::new(MemoryStore::new());
    let first = BatchPoller::new(client_for(&server), tab.clone(), Arc::new(NullEventSink));
    first.submit(&job_ids(&["j1", "j2"])).await.unwrap();
    first.shutdown().await;
    assert!(!first.is_polling());
    drop(first);

    let second = BatchPoller::new(client_for(&server), tab.clone(), Arc::new(NullEventSink));
    let progress = second.recover().await.unwrap();

    assert_eq!(progress.current, 1);
    assert_eq!(second.batch_id().as_deref(), Some("b5"));
    assert!(second.is_polling());
    second.shutdown().await;
}

#[derive(Default)]
struct ScriptedBackend {
    snapshots: Mutex<Vec<BatchProgress>>,
    calls: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl BatchBackend for ScriptedBackend {
    async fn start(&self, job_ids: &[String]) -> Result<BatchAccepted, ApiError> {
        self.calls.lock().unwrap().push(format!("start {}", job_ids.len()));
        Ok(BatchAccepted {
            batch_id: "scripted".to_string(),
        })
    }

    async fn progress(&self, batch_id: &str) -> Result<BatchProgress, ApiError> {
        self.calls.lock().unwrap().push(format!("progress {batch_id}"));
        let mut snapshots = self.snapshots.lock().unwrap();
        if snapshots.is_empty() {
            return Err(ApiError::Transport {
                message: "script exhausted".to_string(),
                timed_out: false,
            });
        }
        Ok(snapshots.remove(0))
    }

    async fn cancel(&self, batch_id: &str) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(format!("cancel {batch_id}"));
        Err(ApiError::Http {
            status: 500,
            message: "cancel failed".to_string(),
            details: None,
        })
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<BatchEvent>>,
}

impl BatchEventSink for RecordingSink {
    fn emit(&self, event: BatchEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[tokio::test]
async fn cancel_failure_is_swallowed_and_server_status_still_wins() {
    init_logging();
    let mut running = BatchProgress::started(2);
    running.current = 1;
    let mut done = BatchProgress::started(2);
    done.status = BatchStatus::Done;
    done.current = 2;
    done.success = 2;

    let backend = Arc::new(ScriptedBackend {
        snapshots: Mutex::new(vec![running.clone(), done.clone()]),
        ..ScriptedBackend::default()
    });
    let sink = Arc::new(RecordingSink::default());
    let poller = BatchPoller::with_backend(
        backend.clone(),
        POLL,
        Arc::new(MemoryStore::new()),
        sink.clone(),
    );

    poller.submit(&job_ids(&["j1", "j2"])).await.unwrap();
    poller.cancel().await;
    assert!(poller.is_polling());
    settle(&poller).await;

    assert_eq!(poller.progress(), Some(done.clone()));
    tokio::time::sleep(POLL * 5).await;
    assert_eq!(
        *backend.calls.lock().unwrap(),
        vec![
            "start 2".to_string(),
            "cancel scripted".to_string(),
            "progress scripted".to_string(),
            "progress scripted".to_string(),
        ]
    );
    assert_eq!(
        *sink.events.lock().unwrap(),
        vec![
            BatchEvent::Progress(BatchProgress::started(2)),
            BatchEvent::Progress(running),
            BatchEvent::Finished(done),
        ]
    );
}

/// Hands out `b0`, `b1`, ... on submit. `b0` is already done; later batches keep running.
#[derive(Default)]
struct SequentialBackend {
    submitted: AtomicUsize,
    later_polls: AtomicUsize,
}

#[async_trait::async_trait]
impl BatchBackend for SequentialBackend {
    async fn start(&self, _job_ids: &[String]) -> Result<BatchAccepted, ApiError> {
        let n = self.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(BatchAccepted {
            batch_id: format!("b{n}"),
        })
    }

    async fn progress(&self, batch_id: &str) -> Result<BatchProgress, ApiError> {
        let mut progress = BatchProgress::started(1);
        if batch_id == "b0" {
            progress.status = BatchStatus::Done;
            progress.current = 1;
            progress.success = 1;
        } else {
            self.later_polls.fetch_add(1, Ordering::SeqCst);
        }
        Ok(progress)
    }

    async fn cancel(&self, _batch_id: &str) -> Result<(), ApiError> {
        Ok(())
    }
}

/// Holds the first `Finished` event until the gate opens.
struct GatedSink {
    held: AtomicBool,
    entered: mpsc::Sender<()>,
    gate: Mutex<mpsc::Receiver<()>>,
}

impl BatchEventSink for GatedSink {
    fn emit(&self, event: BatchEvent) {
        if matches!(event, BatchEvent::Finished(_)) && !self.held.swap(true, Ordering::SeqCst) {
            let _ = self.entered.send(());
            let _ = self.gate.lock().unwrap().recv_timeout(Duration::from_secs(5));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn finishing_batch_does_not_disturb_the_next_submission() {
    init_logging();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (gate_tx, gate_rx) = mpsc::channel();
    let backend = Arc::new(SequentialBackend::default());
    let tab = Arc::new(MemoryStore::new());
    let poller = BatchPoller::with_backend(
        backend.clone(),
        POLL,
        tab.clone(),
        Arc::new(GatedSink {
            held: AtomicBool::new(false),
            entered: entered_tx,
            gate: Mutex::new(gate_rx),
        }),
    );

    assert_eq!(poller.submit(&job_ids(&["j1"])).await.unwrap(), "b0");
    // The poll task for b0 is now parked inside the sink with its Finished event.
    tokio::task::spawn_blocking(move || entered_rx.recv_timeout(Duration::from_secs(5)))
        .await
        .unwrap()
        .expect("b0 finished");

    assert_eq!(poller.submit(&job_ids(&["j2"])).await.unwrap(), "b1");
    gate_tx.send(()).unwrap();
    tokio::time::sleep(POLL * 5).await;

    assert_eq!(tab.get(BATCH_ID_KEY).as_deref(), Some("b1"));
    assert_eq!(poller.batch_id().as_deref(), Some("b1"));
    assert!(poller.is_polling());
    assert!(backend.later_polls.load(Ordering::SeqCst) > 0);
    poller.shutdown().await;
}
