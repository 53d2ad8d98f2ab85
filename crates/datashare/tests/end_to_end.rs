#![cfg(unix)]

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use datashare::cursor::{CursorError, PageWindow, Value};
use datashare::memory::{Dataset, MemoryProvider};
use datashare::peer::{
    Bundle, Consumer, ConsumerConfig, Provider, ProviderHandler, ProviderRef, Response,
    ResponsePayload, SocketDirActivator, NOT_SUPPORTED, PROVIDER_IO_ERROR,
};

const PROVIDER_ID: &str = "org.example.contacts";

const DATASET: &str = r#"{
    "tables": {
        "contacts": {
            "columns": ["id", "name", "photo"],
            "rows": [
                [1, "ada", [1, 2, 3]],
                [2, "grace", null],
                [3, "alan", null],
                [4, "barbara", null],
                [5, "edsger", null]
            ]
        }
    },
    "maps": {
        "settings": { "theme": ["dark", "light", "solar"] }
    }
}"#;

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/dse2e-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

/// A provider serving on its own thread until stopped.
struct ProviderThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ProviderThread {
    fn spawn<H, F>(dir: PathBuf, make_handler: F) -> Self
    where
        H: ProviderHandler,
        F: FnOnce() -> H + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();
        let thread_stop = stop.clone();
        let handle = thread::spawn(move || {
            let mut provider =
                Provider::bind(&dir, PROVIDER_ID, make_handler()).expect("provider should bind");
            ready_tx.send(()).expect("test should be waiting");
            provider
                .run_until(&thread_stop, Duration::from_millis(20))
                .expect("provider loop should run");
        });
        ready_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("provider should start");
        Self {
            stop,
            handle: Some(handle),
        }
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.join().expect("provider thread should not panic");
        }
    }
}

impl Drop for ProviderThread {
    fn drop(&mut self) {
        self.stop();
    }
}

type Responses = Rc<RefCell<Vec<Response>>>;

fn consumer(dir: &Path) -> (Consumer<SocketDirActivator>, Responses) {
    let seen: Responses = Rc::default();
    let sink = Rc::clone(&seen);
    let consumer = Consumer::with_config(
        "org.example.consumer",
        SocketDirActivator::new(dir),
        move |response: Response| sink.borrow_mut().push(response),
        ConsumerConfig {
            launch_backoff: Duration::from_millis(10),
            ..ConsumerConfig::default()
        },
    );
    (consumer, seen)
}

fn take_one(seen: &Responses, request_id: i32) -> Response {
    let mut seen = seen.borrow_mut();
    let index = seen
        .iter()
        .position(|response| response.request_id == request_id)
        .expect("response should be delivered");
    let response = seen.remove(index);
    assert!(
        seen.iter().all(|other| other.request_id != request_id),
        "response delivered twice"
    );
    response
}

fn contacts() -> ProviderRef {
    ProviderRef::new(PROVIDER_ID, "contacts").expect("valid ref")
}

fn settings() -> ProviderRef {
    ProviderRef::new(PROVIDER_ID, "settings").expect("valid ref")
}

fn memory_provider() -> MemoryProvider {
    MemoryProvider::new(Dataset::from_json(DATASET).expect("dataset should parse"))
}

#[test]
fn select_pages_through_rows() {
    let dir = unique_temp_dir("select");
    let _provider = ProviderThread::spawn(dir.clone(), memory_provider);
    let (mut consumer, seen) = consumer(&dir);

    let window = PageWindow::new(2, 2).expect("window");
    let id = consumer
        .select(&contacts(), &["id", "name"], None, Some("id ASC"), window)
        .expect("select should send");
    consumer.wait_for(id).expect("response should arrive");

    let response = take_one(&seen, id);
    assert!(response.provider_result, "{:?}", response.error);
    let mut cursor = response.payload.into_cursor().expect("select returns a cursor");
    assert_eq!(cursor.column_count(), 2);
    assert_eq!(cursor.row_count(), 2);
    assert_eq!(cursor.get_column_name(1).expect("name"), "name");

    cursor.step_first().expect("first row");
    assert_eq!(cursor.get_int64_data(0).expect("id"), 3);
    assert_eq!(cursor.get_text_data(1).expect("name"), "alan");
    cursor.step_next().expect("second row");
    assert_eq!(cursor.get_text_data(1).expect("name"), "barbara");
    assert!(matches!(cursor.step_next(), Err(CursorError::EndOfResultSet)));
    cursor.step_previous().expect("back to last row");
    assert_eq!(cursor.get_int64_data(0).expect("id"), 4);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn blob_and_null_cells_survive() {
    let dir = unique_temp_dir("blob");
    let _provider = ProviderThread::spawn(dir.clone(), memory_provider);
    let (mut consumer, seen) = consumer(&dir);

    let id = consumer
        .select(
            &contacts(),
            &["photo"],
            None,
            Some("id"),
            PageWindow::default(),
        )
        .expect("select should send");
    consumer.wait_for(id).expect("response should arrive");

    let mut cursor = take_one(&seen, id)
        .payload
        .into_cursor()
        .expect("cursor");
    cursor.step_first().expect("first row");
    assert_eq!(cursor.get_blob(0).expect("blob"), vec![1, 2, 3]);
    let mut small = [0u8; 2];
    assert!(matches!(
        cursor.get_blob_data(0, &mut small),
        Err(CursorError::MaxExceeded { .. })
    ));
    cursor.step_next().expect("second row");
    assert_eq!(cursor.get_value(0).expect("value"), Value::Null);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn writes_are_visible_to_later_reads() {
    let dir = unique_temp_dir("writes");
    let _provider = ProviderThread::spawn(dir.clone(), memory_provider);
    let (mut consumer, seen) = consumer(&dir);

    let mut values = Bundle::new();
    values.insert_str("id", "6");
    values.insert_str("name", "'frances'");
    let insert = consumer.insert(&contacts(), values).expect("insert sends");
    consumer.wait_for(insert).expect("insert resolves");
    let response = take_one(&seen, insert);
    assert!(response.provider_result);
    assert!(matches!(response.payload, ResponsePayload::RowId(6)));

    let mut values = Bundle::new();
    values.insert_str("name", "fran");
    let update = consumer
        .update(&contacts(), values, Some("id = 6"))
        .expect("update sends");
    let delete = consumer
        .delete(&contacts(), Some("id = 1"))
        .expect("delete sends");
    consumer.wait_for(update).expect("update resolves");
    consumer.wait_for(delete).expect("delete resolves");
    assert!(take_one(&seen, update).provider_result);
    assert!(take_one(&seen, delete).provider_result);

    let select = consumer
        .select(&contacts(), &["name"], None, Some("id DESC"), PageWindow::default())
        .expect("select sends");
    consumer.wait_for(select).expect("select resolves");
    let mut cursor = take_one(&seen, select)
        .payload
        .into_cursor()
        .expect("cursor");
    assert_eq!(cursor.row_count(), 5);
    cursor.step_first().expect("first row");
    assert_eq!(cursor.get_text_data(0).expect("name"), "fran");
    cursor.step_last().expect("last row");
    assert_eq!(cursor.get_text_data(0).expect("name"), "grace");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn map_operations_round_trip() {
    let dir = unique_temp_dir("map");
    let _provider = ProviderThread::spawn(dir.clone(), memory_provider);
    let (mut consumer, seen) = consumer(&dir);

    let add = consumer
        .map_add(&settings(), "theme", "contrast")
        .expect("add sends");
    let set = consumer
        .map_set(&settings(), "theme", "light", "sepia")
        .expect("set sends");
    let remove = consumer
        .map_remove(&settings(), "theme", "dark")
        .expect("remove sends");
    for id in [add, set, remove] {
        consumer.wait_for(id).expect("request resolves");
        assert!(take_one(&seen, id).provider_result);
    }

    let get = consumer
        .map_get(&settings(), "theme", PageWindow::new(1, 2).expect("window"))
        .expect("get sends");
    consumer.wait_for(get).expect("get resolves");
    let response = take_one(&seen, get);
    let ResponsePayload::Values(values) = response.payload else {
        panic!("map get returns values");
    };
    assert_eq!(values, ["sepia", "solar"]);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn provider_errors_resolve_the_request() {
    let dir = unique_temp_dir("errors");
    let _provider = ProviderThread::spawn(dir.clone(), memory_provider);
    let (mut consumer, seen) = consumer(&dir);

    let missing = ProviderRef::new(PROVIDER_ID, "nope").expect("valid ref");
    let id = consumer.delete(&missing, None).expect("delete sends");
    consumer.wait_for(id).expect("request resolves");
    let response = take_one(&seen, id);
    assert!(!response.provider_result);
    assert!(response
        .error
        .expect("error message")
        .contains("no table named nope"));

    let _ = std::fs::remove_dir_all(&dir);
}

struct ReadOnly;

impl ProviderHandler for ReadOnly {}

#[test]
fn unimplemented_operations_are_not_supported() {
    let dir = unique_temp_dir("unsupported");
    let _provider = ProviderThread::spawn(dir.clone(), || ReadOnly);
    let (mut consumer, seen) = consumer(&dir);

    let id = consumer
        .map_add(&settings(), "theme", "dark")
        .expect("add sends");
    consumer.wait_for(id).expect("request resolves");
    let response = take_one(&seen, id);
    assert!(!response.provider_result);
    assert_eq!(response.error.as_deref(), Some(NOT_SUPPORTED));

    let _ = std::fs::remove_dir_all(&dir);
}

/// Holds every map add unanswered.
struct Silent;

impl ProviderHandler for Silent {
    fn on_map_add(
        &mut self,
        _ctx: &datashare::peer::RequestContext,
        _request: &datashare::peer::MapValueRequest,
        _responder: &mut datashare::peer::Responder<'_>,
    ) -> datashare::peer::Result<()> {
        Ok(())
    }
}

#[test]
fn provider_shutdown_fails_pending_requests() {
    let dir = unique_temp_dir("shutdown");
    let mut provider = ProviderThread::spawn(dir.clone(), || Silent);
    let (mut consumer, seen) = consumer(&dir);

    let ids: Vec<i32> = (0..3)
        .map(|n| {
            consumer
                .map_add(&settings(), "theme", &format!("v{n}"))
                .expect("add sends")
        })
        .collect();
    thread::sleep(Duration::from_millis(100));
    provider.stop();

    for id in &ids {
        consumer.wait_for(*id).expect("request resolves");
    }
    assert_eq!(consumer.pending_count(), 0);
    assert!(!consumer.has_channel(PROVIDER_ID));
    for id in ids {
        let response = take_one(&seen, id);
        assert!(!response.provider_result);
        assert_eq!(response.error.as_deref(), Some(PROVIDER_IO_ERROR));
    }

    let _ = std::fs::remove_dir_all(&dir);
}
