//! Stream sessions driven by a scripted in-memory transport.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::Method;
use responses_client::interceptors::HookResult;
use responses_client::transport::{
    Frame, FrameStream, OutboundCall, RawResponse, StreamFailure, Transport, TransportError,
};
use responses_client::types::Event;
use responses_client::{ApiClient, ApiClientBuilder, Error, Interceptor, StreamSession};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

fn delta(n: usize) -> Frame {
    Frame::data(format!(
        r#"{{"type":"response.output_text.delta","item_id":"msg_1","output_index":0,"content_index":0,"delta":"d{n}","sequence_number":{n}}}"#
    ))
}

/// Frames a scripted connection yields, plus flags observing its lifetime.
#[derive(Clone, Default)]
struct Connection {
    opened: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    read: Arc<AtomicUsize>,
    last_call: Arc<Mutex<Option<OutboundCall>>>,
}

/// Yields the script, then stays open until dropped.
struct ScriptedStream {
    frames: std::vec::IntoIter<Frame>,
    hold_open: bool,
    conn: Connection,
}

impl futures::Stream for ScriptedStream {
    type Item = Frame;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Frame>> {
        self.conn.opened.store(true, Ordering::SeqCst);
        match self.frames.next() {
            Some(frame) => {
                self.conn.read.fetch_add(1, Ordering::SeqCst);
                Poll::Ready(Some(frame))
            }
            None if self.hold_open => Poll::Pending,
            None => Poll::Ready(None),
        }
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.conn.closed.store(true, Ordering::SeqCst);
    }
}

struct ScriptedTransport {
    frames: Vec<Frame>,
    hold_open: bool,
    conn: Connection,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn perform(&self, _call: &OutboundCall) -> responses_client::Result<RawResponse> {
        Err(Error::Transport(TransportError::Other("one-shot calls are not scripted".into())))
    }

    fn open_stream(&self, call: &OutboundCall) -> FrameStream {
        *self.conn.last_call.lock().unwrap() = Some(call.clone());
        Box::pin(ScriptedStream {
            frames: self.frames.clone().into_iter(),
            hold_open: self.hold_open,
            conn: self.conn.clone(),
        })
    }
}

fn scripted(frames: Vec<Frame>, hold_open: bool) -> (ApiClientBuilder, Connection) {
    let conn = Connection::default();
    let transport = ScriptedTransport {
        frames,
        hold_open,
        conn: conn.clone(),
    };
    let builder = ApiClient::builder()
        .base_url("https://api.example.com")
        .transport(Arc::new(transport));
    (builder, conn)
}

fn client_with(frames: Vec<Frame>, hold_open: bool) -> (ApiClient, Connection) {
    let (builder, conn) = scripted(frames, hold_open);
    (builder.build().expect("client"), conn)
}

async fn open(client: &ApiClient) -> StreamSession<Event> {
    let call = client.call(Method::POST, "v1/responses").expect("call");
    client.stream(call).await.expect("session")
}

async fn wait_until(flag: &AtomicBool) -> bool {
    for _ in 0..200 {
        if flag.load(Ordering::SeqCst) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

#[tokio::test]
async fn all_events_arrive_in_order_then_the_session_ends() {
    let (client, conn) = client_with((1..=5).map(delta).collect(), false);
    let events: Vec<Event> = open(&client)
        .await
        .map(|item| item.expect("event"))
        .collect()
        .await;

    let deltas: Vec<&str> = events.iter().filter_map(Event::text_delta).collect();
    assert_eq!(deltas, vec!["d1", "d2", "d3", "d4", "d5"]);
    assert!(wait_until(&conn.closed).await);

    let call = conn.last_call.lock().unwrap().clone().expect("call");
    assert_eq!(call.headers["accept"], "text/event-stream");
}

#[tokio::test]
async fn stream_returns_before_the_connection_is_polled() {
    let (client, conn) = client_with(vec![delta(1)], true);
    let call = client.call(Method::POST, "v1/responses").expect("call");
    let session: StreamSession<Event> = client.stream(call).await.expect("session");
    // The producer has not run yet on this single-threaded runtime.
    assert!(!conn.opened.load(Ordering::SeqCst));
    session.close().await;
    assert!(conn.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn error_frame_ends_the_session_after_earlier_events() {
    let failure = StreamFailure {
        status: Some(500),
        body: Some(Bytes::from_static(b"upstream exploded")),
        message: "HTTP status 500".into(),
    };
    let frames = vec![delta(1), delta(2), Frame::Error(failure), delta(4)];
    let (client, conn) = client_with(frames, false);

    let items: Vec<_> = open(&client).await.collect().await;
    assert_eq!(items.len(), 3);
    assert!(items[0].is_ok() && items[1].is_ok());
    match &items[2] {
        Err(Error::Transport(TransportError::Stream { status, body, .. })) => {
            assert_eq!(*status, Some(500));
            assert_eq!(body.as_deref(), Some(&b"upstream exploded"[..]));
        }
        other => panic!("unexpected item: {other:?}"),
    }
    assert!(wait_until(&conn.closed).await);
    assert_eq!(conn.read.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn typed_error_frame_becomes_an_api_error() {
    let failure = StreamFailure {
        status: Some(429),
        body: Some(Bytes::from_static(
            br#"{"error":{"type":"rate_limit_exceeded","message":"slow down"}}"#,
        )),
        message: "HTTP status 429".into(),
    };
    let (client, _) = client_with(vec![Frame::Error(failure)], false);

    let items: Vec<_> = open(&client).await.collect().await;
    assert_eq!(items.len(), 1);
    let err = items[0].as_ref().unwrap_err();
    assert_eq!(err.api_error().map(|e| e.message.as_str()), Some("slow down"));
    assert!(err.is_stream_fatal());
}

#[tokio::test]
async fn cancel_after_an_event_stops_delivery_and_closes_the_connection() {
    let (client, conn) = client_with((1..=10).map(delta).collect(), true);
    let mut session = open(&client).await;

    let first = session.next().await.expect("item").expect("event");
    assert_eq!(first.text_delta(), Some("d1"));

    session.cancel();
    assert!(session.next().await.is_none());
    assert!(session.next().await.is_none());
    assert!(wait_until(&conn.closed).await);
    // One frame handed off, at most one more waiting in the channel and one in hand.
    assert!(conn.read.load(Ordering::SeqCst) <= 3);
}

#[tokio::test]
async fn session_waits_while_upstream_is_quiet() {
    let (client, conn) = client_with(vec![delta(1)], true);
    let mut session = open(&client).await;
    assert!(session.next().await.is_some());

    let mut next = tokio_test::task::spawn(session.next());
    tokio_test::assert_pending!(next.poll());
    drop(next);

    session.close().await;
    assert!(conn.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn dropping_the_session_closes_the_connection() {
    let (client, conn) = client_with(vec![delta(1)], true);
    let mut session = open(&client).await;
    assert!(session.next().await.is_some());
    drop(session);
    assert!(wait_until(&conn.closed).await);
}

#[tokio::test]
async fn cancel_handle_works_from_another_task() {
    let (client, conn) = client_with(vec![delta(1)], true);
    let mut session = open(&client).await;
    let handle = session.cancel_handle();

    assert!(session.next().await.is_some());
    tokio::spawn(async move { handle.cancel() }).await.expect("join");

    assert!(session.is_cancelled());
    assert!(session.next().await.is_none());
    assert!(wait_until(&conn.closed).await);
}

#[tokio::test]
async fn empty_and_unknown_frames_are_skipped() {
    let frames = vec![
        Frame::Event(Default::default()),
        Frame::data(""),
        delta(1),
        Frame::data(r#"{"type":"response.something_new","sequence_number":2}"#),
        delta(3),
    ];
    let (client, _) = client_with(frames, false);

    let deltas: Vec<String> = open(&client)
        .await
        .map(|item| item.expect("event").text_delta().map(str::to_string))
        .filter_map(|d| async move { d })
        .collect()
        .await;
    // Unrecognized event types vanish without an error or a placeholder.
    assert_eq!(deltas, vec!["d1", "d3"]);
}

#[tokio::test]
async fn a_bad_frame_is_reported_and_the_session_continues() {
    let frames = vec![delta(1), Frame::data("{not json"), delta(3)];
    let (client, _) = client_with(frames, false);

    let items: Vec<_> = open(&client).await.collect().await;
    assert_eq!(items.len(), 3);
    assert!(items[0].is_ok());
    assert!(matches!(&items[1], Err(Error::Decode(_))));
    assert!(!items[1].as_ref().unwrap_err().is_stream_fatal());
    assert_eq!(items[2].as_ref().unwrap().text_delta(), Some("d3"));
}

#[tokio::test]
async fn partial_response_objects_in_events_decode() {
    let frames = vec![Frame::data(
        r#"{"type":"response.created","sequence_number":0,"response":{"id":"resp_1","object":"response","created_at":1,"model":"gpt-4.1","status":"in_progress","output":[]}}"#,
    )];
    let (client, _) = client_with(frames, false);

    let items: Vec<_> = open(&client).await.collect().await;
    let event = items[0].as_ref().expect("event");
    let response = event.response().expect("response");
    assert_eq!(response.id, "resp_1");
    assert_eq!(response.temperature, 1.0);
}

/// Rewrites chunk bytes and records event text.
struct Rewriter {
    seen_text: Arc<Mutex<Vec<String>>>,
}

impl Interceptor for Rewriter {
    fn name(&self) -> &str {
        "rewriter"
    }

    fn on_stream_chunk(&self, _call: &OutboundCall, chunk: Bytes) -> HookResult<Bytes> {
        let text = String::from_utf8_lossy(&chunk).replace("\"d1\"", "\"rewritten\"");
        Ok(Bytes::from(text))
    }

    fn on_stream_event(&self, _call: &OutboundCall, event: String) -> HookResult<String> {
        self.seen_text.lock().unwrap().push(event.clone());
        Ok(event.replace("d1", "ignored"))
    }
}

#[tokio::test]
async fn chunk_hooks_feed_decoding_and_event_hooks_only_observe() {
    let seen_text = Arc::new(Mutex::new(Vec::new()));
    let rewriter = Rewriter {
        seen_text: seen_text.clone(),
    };
    let (builder, _) = scripted(vec![delta(1)], false);
    let client = builder.interceptor(rewriter).build().expect("client");

    let items: Vec<_> = open(&client).await.collect().await;
    assert_eq!(items[0].as_ref().unwrap().text_delta(), Some("rewritten"));

    let seen = seen_text.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].contains("\"d1\""));
}

struct Faulty;

impl Interceptor for Faulty {
    fn name(&self) -> &str {
        "faulty"
    }

    fn on_stream_chunk(&self, _call: &OutboundCall, chunk: Bytes) -> HookResult<Bytes> {
        if chunk.windows(4).any(|w| w == b"\"d2\"") {
            return Err("cannot handle d2".into());
        }
        Ok(chunk)
    }
}

#[tokio::test]
async fn interceptor_failure_is_fatal_to_the_session() {
    let (builder, conn) = scripted((1..=4).map(delta).collect(), false);
    let client = builder.interceptor(Faulty).build().expect("client");

    let items: Vec<_> = open(&client).await.collect().await;
    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    match &items[1] {
        Err(Error::Interceptor { interceptor, .. }) => assert_eq!(interceptor, "faulty"),
        other => panic!("unexpected item: {other:?}"),
    }
    assert!(wait_until(&conn.closed).await);
}

/// Records the messages its error hook receives.
struct Watcher {
    errors: Arc<Mutex<Vec<String>>>,
}

impl Interceptor for Watcher {
    fn on_error(&self, site: &responses_client::interceptors::ErrorSite<'_>) {
        self.errors.lock().unwrap().push(site.message.to_string());
    }
}

#[tokio::test]
async fn error_hooks_see_stream_interceptor_failures() {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let (builder, _) = scripted((1..=3).map(delta).collect(), false);
    let client = builder
        .interceptor(Watcher { errors: errors.clone() })
        .interceptor(Faulty)
        .build()
        .expect("client");

    let items: Vec<_> = open(&client).await.collect().await;
    assert!(matches!(items.last(), Some(Err(Error::Interceptor { .. }))));

    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("cannot handle d2"));
}

struct Panicking;

impl Interceptor for Panicking {
    fn on_stream_chunk(&self, _call: &OutboundCall, chunk: Bytes) -> HookResult<Bytes> {
        if chunk.windows(4).any(|w| w == b"\"d2\"") {
            panic!("hook bug on d2");
        }
        Ok(chunk)
    }
}

#[tokio::test]
async fn producer_panic_is_reported_once_then_the_session_ends() {
    let (builder, conn) = scripted((1..=3).map(delta).collect(), false);
    let client = builder.interceptor(Panicking).build().expect("client");

    let items: Vec<_> = open(&client).await.collect().await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap().text_delta(), Some("d1"));
    match &items[1] {
        Err(err @ Error::Runtime { message, .. }) => {
            assert!(message.contains("hook bug on d2"));
            assert!(err.is_stream_fatal());
            assert_eq!(err.context().and_then(|c| c.source.as_deref()), Some("stream_session"));
        }
        other => panic!("unexpected item: {other:?}"),
    }
    assert!(conn.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn request_hook_failure_fails_stream_synchronously() {
    struct Refuse;
    impl Interceptor for Refuse {
        fn on_request(&self, _call: OutboundCall) -> HookResult<OutboundCall> {
            Err("refused".into())
        }
    }

    let (builder, conn) = scripted(vec![delta(1)], false);
    let client = builder.interceptor(Refuse).build().expect("client");
    let call = client.call(Method::POST, "v1/responses").expect("call");
    let err = client.stream::<Event>(call).await.unwrap_err();
    assert!(matches!(err, Error::Interceptor { .. }));
    assert!(conn.last_call.lock().unwrap().is_none());
}

#[tokio::test]
async fn read_errors_from_a_real_frame_stream_are_terminal() {
    struct FailingTransport;

    #[async_trait]
    impl Transport for FailingTransport {
        async fn perform(&self, _call: &OutboundCall) -> responses_client::Result<RawResponse> {
            Ok(RawResponse::new(200, "{}"))
        }

        fn open_stream(&self, _call: &OutboundCall) -> FrameStream {
            let input = tokio_stream::iter(vec![
                Ok(Bytes::from_static(b"data: {\"type\":\"response.output_text.delta\",\"item_id\":\"m\",\"output_index\":0,\"content_index\":0,\"delta\":\"a\"}\n\n")),
                Err(Error::Transport(TransportError::Other("connection reset".into()))),
            ]);
            responses_client::transport::sse::decode_frames(Box::pin(input))
        }
    }

    let client = ApiClient::builder()
        .transport(Arc::new(FailingTransport))
        .build()
        .expect("client");
    let items: Vec<_> = open(&client).await.collect().await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap().text_delta(), Some("a"));
    assert!(matches!(&items[1], Err(Error::Transport(TransportError::Stream { .. }))));
}
