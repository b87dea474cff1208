//! Integration tests for webhook notifications against a local endpoint.

#![allow(missing_docs, clippy::missing_panics_doc)]

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bambu_networking::config::WebhookConfig;
use bambu_networking::interceptor::{Message, MessageInterceptor};
use bambu_networking::webhook::WebhookDispatcher;

static TEST_MUTEX: Mutex<()> = Mutex::new(());
static DELIVERED: Mutex<Vec<(String, Vec<u8>)>> = Mutex::new(Vec::new());

fn host_callback(message: &Message<'_>) {
    DELIVERED
        .lock()
        .expect("delivered lock")
        .push((message.device_id().into_owned(), message.payload().to_vec()));
}

fn take_delivered() -> Vec<(String, Vec<u8>)> {
    std::mem::take(&mut *DELIVERED.lock().expect("delivered lock"))
}

fn guard() -> std::sync::MutexGuard<'static, ()> {
    let guard = TEST_MUTEX.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    take_delivered();
    guard
}

#[derive(Debug)]
struct CapturedRequest {
    request_line: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    /// Connections accepted after the first one.
    extra_connections: usize,
}

impl CapturedRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Serves exactly one request with `status`, after waiting `delay`.
fn serve_once(status: &'static str, delay: Duration) -> (SocketAddr, JoinHandle<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept webhook connection");
        let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));

        let mut request_line = String::new();
        reader.read_line(&mut request_line).expect("read request line");

        let mut headers = Vec::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).expect("read header line");
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
        }

        let length = headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.parse::<usize>().ok())
            .unwrap_or(0);
        let mut body = vec![0; length];
        reader.read_exact(&mut body).expect("read request body");

        thread::sleep(delay);
        let mut stream = stream;
        let _ = write!(
            stream,
            "HTTP/1.1 {status}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        );
        let _ = stream.flush();
        drop(stream);

        listener.set_nonblocking(true).expect("nonblocking listener");
        let mut extra_connections = 0;
        let deadline = Instant::now() + Duration::from_millis(200);
        while Instant::now() < deadline {
            match listener.accept() {
                Ok(_) => extra_connections += 1,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(_) => break,
            }
        }

        CapturedRequest {
            request_line: request_line.trim_end().to_string(),
            headers,
            body,
            extra_connections,
        }
    });

    (addr, handle)
}

fn interceptor_for(url: Option<String>, timeout: Duration) -> MessageInterceptor<WebhookDispatcher> {
    let interceptor =
        MessageInterceptor::new(WebhookDispatcher::new(&WebhookConfig { url, timeout }));
    interceptor.register(Some(Arc::new(host_callback)));
    interceptor
}

#[test]
fn test_notify_then_forward() {
    let _guard = guard();
    let (addr, server) = serve_once("200 OK", Duration::ZERO);
    let interceptor = interceptor_for(Some(format!("http://{addr}/hook")), Duration::from_secs(5));

    interceptor.deliver(&Message::new(b"D1", br#"{"x":1}"#));

    let request = server.join().expect("server thread");
    assert_eq!(request.request_line, "POST /hook HTTP/1.1");
    assert_eq!(request.header("content-type"), Some("application/json"));
    assert_eq!(request.header("dev_id"), Some("D1"));
    assert_eq!(request.body, br#"{"x":1}"#);
    assert_eq!(request.extra_connections, 0);

    assert_eq!(
        take_delivered(),
        vec![("D1".to_string(), br#"{"x":1}"#.to_vec())]
    );
}

#[test]
fn test_error_status_still_forwards() {
    let _guard = guard();
    let (addr, server) = serve_once("500 Internal Server Error", Duration::ZERO);
    let interceptor = interceptor_for(Some(format!("http://{addr}/hook")), Duration::from_secs(5));

    interceptor.deliver(&Message::new(b"D1", br#"{"x":1}"#));

    let request = server.join().expect("server thread");
    assert_eq!(request.body, br#"{"x":1}"#);
    assert_eq!(
        take_delivered(),
        vec![("D1".to_string(), br#"{"x":1}"#.to_vec())]
    );
}

#[test]
fn test_connection_refused_still_forwards() {
    let _guard = guard();
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
        listener.local_addr().expect("listener address")
    };
    let interceptor = interceptor_for(Some(format!("http://{addr}/hook")), Duration::from_secs(5));

    interceptor.deliver(&Message::new(b"D1", br#"{"x":1}"#));

    assert_eq!(
        take_delivered(),
        vec![("D1".to_string(), br#"{"x":1}"#.to_vec())]
    );
}

#[test]
fn test_timeout_bounds_delivery() {
    let _guard = guard();
    let (addr, server) = serve_once("200 OK", Duration::from_secs(2));
    let interceptor = interceptor_for(
        Some(format!("http://{addr}/hook")),
        Duration::from_millis(250),
    );

    let started = Instant::now();
    interceptor.deliver(&Message::new(b"D1", br#"{"x":1}"#));
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_millis(1500), "delivery took {elapsed:?}");
    assert_eq!(
        take_delivered(),
        vec![("D1".to_string(), br#"{"x":1}"#.to_vec())]
    );

    let request = server.join().expect("server thread");
    assert_eq!(request.header("dev_id"), Some("D1"));
}

#[test]
fn test_no_url_still_forwards() {
    let _guard = guard();
    let interceptor = interceptor_for(None, Duration::from_secs(5));
    assert!(!interceptor.notifier().is_enabled());
    assert_eq!(interceptor.notifier().url(), None);

    for _ in 0..3 {
        interceptor.deliver(&Message::new(b"D7", b"{}"));
    }

    assert_eq!(take_delivered().len(), 3);
}
