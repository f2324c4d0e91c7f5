//! Streaming through the reqwest transport against a mockito SSE endpoint.

use futures::StreamExt;
use mockito::{Matcher, Server};
use responses_client::transport::TransportError;
use responses_client::types::{Event, Request};
use responses_client::{ApiClient, Error, ResponsesApi};

fn sse(events: &[&str]) -> String {
    events
        .iter()
        .map(|data| format!("data: {}\n\n", data))
        .collect::<Vec<_>>()
        .join("")
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn api(base_url: &str) -> ResponsesApi {
    init_tracing();
    ResponsesApi::new(
        ApiClient::builder()
            .base_url(base_url)
            .auth_token("sk-test")
            .build()
            .expect("client"),
    )
}

#[tokio::test]
async fn stream_create_yields_events_in_wire_order() {
    let mut server = Server::new_async().await;
    let body = sse(&[
        r#"{"type":"response.created","sequence_number":0,"response":{"id":"resp_1","object":"response","created_at":1,"model":"gpt-4.1","status":"in_progress","output":[]}}"#,
        r#"{"type":"response.output_text.delta","item_id":"msg_1","output_index":0,"content_index":0,"delta":"Hel","sequence_number":1}"#,
        r#"{"type":"response.output_text.delta","item_id":"msg_1","output_index":0,"content_index":0,"delta":"lo","sequence_number":2}"#,
        r#"{"type":"response.completed","sequence_number":3,"response":{"id":"resp_1","object":"response","created_at":1,"model":"gpt-4.1","status":"completed","output":[{"type":"message","id":"msg_1","role":"assistant","content":[{"type":"output_text","text":"Hello"}]}]}}"#,
    ]);
    let mock = server
        .mock("POST", "/v1/responses")
        .match_header("accept", "text/event-stream")
        .match_body(Matcher::PartialJson(serde_json::json!({"stream": true})))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(body)
        .create_async()
        .await;

    let session = api(&server.url())
        .stream(&Request::new("gpt-4.1", "hi"))
        .await
        .expect("session");
    let events: Vec<Event> = session.map(|e| e.expect("event")).collect().await;
    mock.assert_async().await;

    assert_eq!(events.len(), 4);
    assert!(matches!(events[0], Event::ResponseCreated { .. }));
    let text: String = events.iter().filter_map(Event::text_delta).collect();
    assert_eq!(text, "Hello");
    assert!(events[3].is_terminal());
    assert_eq!(events[3].response().map(|r| r.output_text()).as_deref(), Some("Hello"));
}

#[tokio::test]
async fn stream_by_id_sends_resume_parameters() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/v1/responses/resp_1")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("stream".into(), "true".into()),
            Matcher::UrlEncoded("starting_after".into(), "7".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse(&[
            r#"{"type":"response.output_text.done","item_id":"msg_1","output_index":0,"content_index":0,"text":"Hello","sequence_number":8}"#,
            "[DONE]",
        ]))
        .create_async()
        .await;

    let events: Vec<_> = api(&server.url())
        .stream_by_id("resp_1", Some(7), &[])
        .await
        .expect("session")
        .collect()
        .await;
    mock.assert_async().await;

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].as_ref().unwrap().sequence_number(), Some(8));
}

#[tokio::test]
async fn rejected_stream_carries_the_typed_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/v1/responses")
        .with_status(401)
        .with_body(r#"{"error":{"type":"invalid_request_error","message":"bad key","code":"invalid_api_key"}}"#)
        .create_async()
        .await;

    let items: Vec<_> = api(&server.url())
        .stream(&Request::new("gpt-4.1", "hi"))
        .await
        .expect("session")
        .collect()
        .await;

    assert_eq!(items.len(), 1);
    let err = items[0].as_ref().unwrap_err();
    assert_eq!(err.api_error().and_then(|e| e.code.as_deref()), Some("invalid_api_key"));
}

#[tokio::test]
async fn rejected_stream_without_envelope_is_a_transport_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/v1/responses")
        .with_status(503)
        .with_body("try later")
        .create_async()
        .await;

    let items: Vec<_> = api(&server.url())
        .stream(&Request::new("gpt-4.1", "hi"))
        .await
        .expect("session")
        .collect()
        .await;

    assert_eq!(items.len(), 1);
    match &items[0] {
        Err(err @ Error::Transport(TransportError::Stream { body, .. })) => {
            assert_eq!(err.status(), Some(503));
            assert_eq!(body.as_deref(), Some(&b"try later"[..]));
        }
        other => panic!("unexpected item: {other:?}"),
    }
}

#[tokio::test]
async fn in_band_error_events_are_ordinary_events() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/v1/responses")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse(&[
            r#"{"type":"error","message":"model overloaded","code":"server_error","sequence_number":0}"#,
            r#"{"type":"response.output_text.delta","item_id":"m","output_index":0,"content_index":0,"delta":"x","sequence_number":1}"#,
        ]))
        .create_async()
        .await;

    let events: Vec<Event> = api(&server.url())
        .stream(&Request::new("gpt-4.1", "hi"))
        .await
        .expect("session")
        .map(|e| e.expect("event"))
        .collect()
        .await;

    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], Event::Error { message, .. } if message == "model overloaded"));
}
