#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use spanare_poller::{FetchError, RecordSource};

/// Replays a fixed list of outcomes, then repeats `fallback` forever.
pub struct ScriptedSource {
    script: Arc<Mutex<VecDeque<Result<Vec<u8>, FetchError>>>>,
    fallback: fn() -> Result<Vec<u8>, FetchError>,
    pub fetches: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new(
        script: Vec<Result<Vec<u8>, FetchError>>,
        fallback: fn() -> Result<Vec<u8>, FetchError>,
    ) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            fallback,
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self::new(Vec::new(), unavailable)
    }
}

impl RecordSource for ScriptedSource {
    fn fetch(&mut self) -> Result<Vec<u8>, FetchError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        match self.script.lock().pop_front() {
            Some(outcome) => outcome,
            None => (self.fallback)(),
        }
    }
}

pub fn unavailable() -> Result<Vec<u8>, FetchError> {
    Err(FetchError::Status(503))
}

pub fn empty() -> Result<Vec<u8>, FetchError> {
    Ok(Vec::new())
}

pub fn garbled() -> Result<Vec<u8>, FetchError> {
    Ok(b"<html>".to_vec())
}

pub fn record_json(src_last: u8, timestamp: u64) -> String {
    format!(
        r#"{{"src_mac":"AA:BB:CC:DD:EE:{src_last:02X}","dst_mac":"11:22:33:44:55:66","timestamp":{timestamp}}}"#
    )
}

pub fn batch(records: &[String]) -> Vec<u8> {
    format!("[{}]", records.join(",")).into_bytes()
}

/// Polls `cond` every few milliseconds until it holds or `limit` passes.
pub fn wait_for(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
