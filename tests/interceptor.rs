//! Integration tests for local message interception.

#![allow(missing_docs, clippy::missing_panics_doc)]

use std::sync::{Arc, Mutex};
use std::thread;

use bambu_networking::interceptor::{Message, MessageInterceptor, Notifier, Subscriber};

static TEST_MUTEX: Mutex<()> = Mutex::new(());
static EVENTS: Mutex<Vec<String>> = Mutex::new(Vec::new());

fn record(event: String) {
    EVENTS.lock().expect("events lock").push(event);
}

fn take_events() -> Vec<String> {
    std::mem::take(&mut *EVENTS.lock().expect("events lock"))
}

fn describe(message: &Message<'_>) -> String {
    format!(
        "{}:{}",
        message.device_id(),
        String::from_utf8_lossy(message.payload())
    )
}

struct RecordingNotifier;

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &Message<'_>) {
        record(format!("notify:{}", describe(message)));
    }
}

/// Host callback stand-in that records under its tag.
struct Recording(&'static str);

impl Subscriber for Recording {
    fn receive(&self, message: &Message<'_>) {
        record(format!("{}:{}", self.0, describe(message)));
    }
}

fn callback(tag: &'static str) -> Option<Arc<dyn Subscriber>> {
    Some(Arc::new(Recording(tag)))
}

fn guard() -> std::sync::MutexGuard<'static, ()> {
    let guard = TEST_MUTEX.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    take_events();
    guard
}

#[test]
fn test_notify_then_forward() {
    let _guard = guard();
    let interceptor = MessageInterceptor::new(RecordingNotifier);
    interceptor.register(callback("a"));

    let message = Message::new(b"D1", br#"{"x":1}"#);
    interceptor.deliver(&message);

    assert_eq!(
        take_events(),
        vec![r#"notify:D1:{"x":1}"#.to_string(), r#"a:D1:{"x":1}"#.to_string()]
    );
}

#[test]
fn test_last_registration_wins() {
    let _guard = guard();
    let interceptor = MessageInterceptor::new(RecordingNotifier);

    let first = callback("a");
    assert!(interceptor.register(first.clone()).is_none());
    let replaced = interceptor.register(callback("b"));
    assert!(Arc::ptr_eq(
        &replaced.expect("a was registered"),
        &first.expect("a exists")
    ));

    interceptor.deliver(&Message::new(b"D2", b"{}"));
    interceptor.deliver(&Message::new(b"D2", b"[]"));

    assert_eq!(
        take_events(),
        vec![
            "notify:D2:{}".to_string(),
            "b:D2:{}".to_string(),
            "notify:D2:[]".to_string(),
            "b:D2:[]".to_string(),
        ]
    );
}

#[test]
fn test_message_without_callback_is_dropped() {
    let _guard = guard();
    let interceptor = MessageInterceptor::new(RecordingNotifier);
    assert!(!interceptor.has_callback());

    interceptor.deliver(&Message::new(b"D3", b"{}"));

    // Notification still happens; there is nobody to forward to.
    assert_eq!(take_events(), vec!["notify:D3:{}".to_string()]);
}

#[test]
fn test_unregistering_with_null() {
    let _guard = guard();
    let interceptor = MessageInterceptor::new(RecordingNotifier);
    interceptor.register(callback("a"));
    interceptor.register(None);
    assert!(!interceptor.has_callback());

    interceptor.deliver(&Message::new(b"D4", b"{}"));

    assert_eq!(take_events(), vec!["notify:D4:{}".to_string()]);
}

#[test]
fn test_payload_forwarded_byte_for_byte() {
    let _guard = guard();
    let interceptor = MessageInterceptor::new(RecordingNotifier);
    interceptor.register(callback("a"));

    // Not NUL-terminated and containing a NUL: the length travels with it.
    let payload = *b"{\"s\":\"a\0b\"}xyz";
    let body = &payload[..payload.len() - 3];
    let message = unsafe {
        Message::from_raw(b"D5".as_ptr().cast(), 2, body.as_ptr().cast(), body.len())
    };
    interceptor.deliver(&message);

    let expected = String::from_utf8_lossy(body);
    assert_eq!(
        take_events(),
        vec![format!("notify:D5:{expected}"), format!("a:D5:{expected}")]
    );
}

#[test]
fn test_concurrent_delivery() {
    const THREADS: usize = 4;
    const MESSAGES: usize = 25;

    let _guard = guard();
    let interceptor = MessageInterceptor::new(RecordingNotifier);
    interceptor.register(callback("a"));

    thread::scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|| {
                for _ in 0..MESSAGES {
                    interceptor.deliver(&Message::new(b"D6", b"{}"));
                }
            });
        }
    });

    let events = take_events();
    let notified = events.iter().filter(|e| e.starts_with("notify:")).count();
    let delivered = events.iter().filter(|e| e.starts_with("a:")).count();
    assert_eq!(notified, THREADS * MESSAGES);
    assert_eq!(delivered, THREADS * MESSAGES);
}
