use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use spanare_config::ScannerConfig;
use spanare_engine::{Scanner, ScannerError};
use spanare_poller::{FetchError, RecordSource};

/// Serves one fixed body on the first fetch, nothing afterwards.
struct OneShot {
    body: Option<Vec<u8>>,
    dropped: Arc<AtomicBool>,
}

impl RecordSource for OneShot {
    fn fetch(&mut self) -> Result<Vec<u8>, FetchError> {
        Ok(self.body.take().unwrap_or_default())
    }
}

impl Drop for OneShot {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

struct Panics;

impl RecordSource for Panics {
    fn fetch(&mut self) -> Result<Vec<u8>, FetchError> {
        panic!("simulated worker crash");
    }
}

struct Quiet;

impl RecordSource for Quiet {
    fn fetch(&mut self) -> Result<Vec<u8>, FetchError> {
        Ok(Vec::new())
    }
}

fn config(endpoints: &[&str]) -> ScannerConfig {
    let mut cfg = ScannerConfig::with_endpoints(endpoints.iter().copied());
    cfg.poll_interval_ms = 100;
    cfg.watchdog_interval_ms = 50;
    cfg.max_restart_delay_ms = 200;
    cfg
}

fn wait_for(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

const SAMPLE: &str = r#"[
    {"src_mac":"AA:BB:CC:DD:EE:FF","dst_mac":"11:22:33:44:55:66","src_ip":"10.0.0.1","timestamp":1700000000.5},
    {"src_mac":"not-a-mac","dst_mac":"11:22:33:44:55:66"},
    {"src_mac":"AA:BB:CC:DD:EE:01","dst_mac":"11:22:33:44:55:66","timestamp":1700000001}
]"#;

#[test]
fn records_flow_from_source_to_consumer() {
    let dropped = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&dropped);
    let scanner = Scanner::builder(config(&["https://feed.example/macs"]))
        .source_factory(move |_: &str| {
            Box::new(OneShot {
                body: Some(SAMPLE.as_bytes().to_vec()),
                dropped: Arc::clone(&flag),
            }) as Box<dyn RecordSource>
        })
        .build()
        .unwrap();
    scanner.start().unwrap();

    let first = scanner.pop(2_000).expect("first record");
    assert_eq!(first.src_mac.high(), 0xAABB_CCDD);
    assert_eq!(first.src_mac.low(), 0xEEFF);
    assert_eq!(first.timestamp_ns, 1_700_000_000_500_000_000);
    assert_eq!(first.src_ip.unwrap().to_string(), "10.0.0.1");

    let second = scanner.pop(2_000).expect("second record");
    assert_eq!(second.src_mac.low(), 0xEE01);

    let status = scanner.status();
    assert_eq!(status.packets_processed, 2);
    assert_eq!(status.error_count, 1);
    assert_eq!(status.buffer_fill, 0);
    assert_eq!(status.active_workers, 1);

    drop(scanner);
    assert!(dropped.load(Ordering::SeqCst), "drop must join workers");
}

#[test]
fn one_worker_per_endpoint() {
    let endpoints = ["https://a.example", "https://b.example", "http://c.example:8080"];
    let scanner = Scanner::builder(config(&endpoints))
        .source_factory(|_: &str| Box::new(Quiet) as Box<dyn RecordSource>)
        .build()
        .unwrap();
    scanner.start().unwrap();

    assert_eq!(scanner.status().active_workers, 3);
    let workers = scanner.workers();
    let seen: Vec<&str> = workers.iter().map(|w| w.endpoint()).collect();
    assert_eq!(seen, endpoints);

    scanner.shutdown();
    assert_eq!(scanner.status().active_workers, 0);
}

#[test]
fn start_is_once_only() {
    let scanner = Scanner::builder(config(&["https://a.example"]))
        .source_factory(|_: &str| Box::new(Quiet) as Box<dyn RecordSource>)
        .build()
        .unwrap();

    scanner.start().unwrap();
    assert!(matches!(scanner.start(), Err(ScannerError::AlreadyStarted)));
    scanner.shutdown();
    assert!(matches!(scanner.start(), Err(ScannerError::ShutDown)));
}

#[test]
fn non_positive_timeouts_do_not_wait() {
    let scanner = Scanner::builder(config(&["https://a.example"]))
        .source_factory(|_: &str| Box::new(Quiet) as Box<dyn RecordSource>)
        .build()
        .unwrap();
    scanner.start().unwrap();

    let start = Instant::now();
    assert_eq!(scanner.pop(0), None);
    assert_eq!(scanner.pop(-250), None);
    assert!(start.elapsed() < Duration::from_millis(100));
}

#[test]
fn shutdown_is_prompt_and_idempotent() {
    let mut cfg = config(&["https://a.example", "https://b.example"]);
    cfg.poll_interval_ms = 60_000;
    cfg.watchdog_interval_ms = 30_000;
    let scanner = Scanner::builder(cfg)
        .source_factory(|_: &str| Box::new(Quiet) as Box<dyn RecordSource>)
        .build()
        .unwrap();
    scanner.start().unwrap();
    assert!(wait_for(Duration::from_secs(2), || scanner
        .workers()
        .iter()
        .all(|w| w.has_succeeded())));

    let start = Instant::now();
    scanner.shutdown();
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(!scanner.is_running());

    let start = Instant::now();
    scanner.shutdown();
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[test]
fn watchdog_replaces_a_crashed_worker() {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&created);
    let scanner = Scanner::builder(config(&["https://a.example", "https://b.example"]))
        .source_factory(move |endpoint: &str| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if endpoint == "https://a.example" && n == 0 {
                Box::new(Panics) as Box<dyn RecordSource>
            } else {
                Box::new(Quiet)
            }
        })
        .build()
        .unwrap();
    scanner.start().unwrap();

    assert!(wait_for(Duration::from_secs(2), || {
        let status = scanner.status();
        status.worker_restarts == 1 && status.active_workers == 2
    }));

    let workers = scanner.workers();
    assert_eq!(workers[0].endpoint(), "https://a.example");
    assert_eq!(workers[1].endpoint(), "https://b.example");
    assert!(workers.iter().all(|w| w.is_alive()));
    assert_eq!(created.load(Ordering::SeqCst), 3);
}

#[test]
fn crash_loops_are_throttled() {
    let scanner = Scanner::builder(config(&["https://a.example"]))
        .source_factory(|_: &str| Box::new(Panics) as Box<dyn RecordSource>)
        .build()
        .unwrap();
    scanner.start().unwrap();

    std::thread::sleep(Duration::from_millis(1_000));
    let restarts = scanner.status().worker_restarts;
    scanner.shutdown();

    // One restart per 50 ms tick would be about 20.
    assert!(restarts >= 2, "restarts: {restarts}");
    assert!(restarts <= 10, "restarts: {restarts}");
}

#[test]
fn version_is_exposed() {
    assert_eq!(spanare_engine::version(), env!("CARGO_PKG_VERSION"));
}
