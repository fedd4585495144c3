//! `HttpSource` against a throwaway HTTP/1.1 server on loopback.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use spanare_config::ScannerConfig;
use spanare_poller::source::MAX_BODY_BYTES;
use spanare_poller::{FetchError, HttpSourceFactory, SourceFactory};

/// Serves each canned response to one connection, in order, and forwards
/// the raw request text.
fn serve(responses: Vec<Vec<u8>>) -> (String, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for response in responses {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut buf = [0u8; 4096];
            let n = stream.read(&mut buf).unwrap_or(0);
            let _ = tx.send(String::from_utf8_lossy(&buf[..n]).into_owned());
            let _ = stream.write_all(&response);
        }
    });

    (format!("http://{addr}/macs"), rx)
}

fn response(status: &str, extra_headers: &str, body: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n{extra_headers}\r\n",
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(body);
    out
}

fn factory(timeout_ms: u64) -> HttpSourceFactory {
    let mut config = ScannerConfig::with_endpoints(["http://127.0.0.1/"]);
    config.request_timeout_ms = timeout_ms;
    HttpSourceFactory::new(&config).unwrap()
}

#[test]
fn fetches_body_and_identifies_itself() {
    let body = br#"[{"src_mac":"AA:BB:CC:DD:EE:FF","dst_mac":"11:22:33:44:55:66"}]"#;
    let (url, requests) = serve(vec![response("200 OK", "", body)]);

    let mut source = factory(2_000).create(&url);
    assert_eq!(source.fetch().unwrap(), body.to_vec());

    let request = requests.recv_timeout(Duration::from_secs(2)).unwrap();
    let request = request.to_ascii_lowercase();
    assert!(request.starts_with("get /macs http/1.1"));
    assert!(request.contains("user-agent: spanare/"));
}

#[test]
fn non_success_status_is_a_failure() {
    let (url, _requests) = serve(vec![response("503 Service Unavailable", "", b"busy")]);
    let mut source = factory(2_000).create(&url);
    assert!(matches!(source.fetch(), Err(FetchError::Status(503))));
}

#[test]
fn plain_http_redirect_is_refused() {
    let (url, _requests) = serve(vec![response(
        "302 Found",
        "Location: http://127.0.0.1:9/elsewhere\r\n",
        b"",
    )]);
    let mut source = factory(2_000).create(&url);
    assert!(matches!(source.fetch(), Err(FetchError::Request(_))));
}

#[test]
fn oversized_body_is_rejected() {
    let body = vec![b' '; MAX_BODY_BYTES + 16];
    let (url, _requests) = serve(vec![response("200 OK", "", &body)]);
    let mut source = factory(10_000).create(&url);
    assert!(matches!(
        source.fetch(),
        Err(FetchError::BodyTooLarge(MAX_BODY_BYTES))
    ));
}

#[test]
fn silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/macs", listener.local_addr().unwrap());
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let holder = thread::spawn(move || {
        let conn = listener.accept();
        let _ = done_rx.recv_timeout(Duration::from_secs(5));
        drop(conn);
    });

    let mut source = factory(200).create(&url);
    assert!(matches!(source.fetch(), Err(FetchError::Request(_))));

    done_tx.send(()).unwrap();
    holder.join().unwrap();
}

#[test]
fn unreachable_endpoint_is_a_request_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/macs", listener.local_addr().unwrap());
    drop(listener);

    let mut source = factory(1_000).create(&url);
    assert!(matches!(source.fetch(), Err(FetchError::Request(_))));
}
