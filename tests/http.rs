use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use serial_forwarder::shutdown::{self, ShutdownOutcome, ShutdownPlan};
use serial_forwarder::{
    AppState, BridgeEvent, Forwarder, ForwarderBuilder, MockPort, SimulatedForwarder, build_router,
};

async fn live_state(mock: &MockPort) -> AppState {
    let forwarder = ForwarderBuilder::new("/dev/mock")
        .capacity(256)
        .build_with_port(mock.clone())
        .await
        .unwrap();
    AppState::new(Arc::new(forwarder), CancellationToken::new())
}

async fn get(state: &AppState, uri: &str) -> Response {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    build_router(state.clone()).oneshot(req).await.unwrap()
}

async fn body_text(resp: Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn write_decodes_path_and_echoes() {
    let mock = MockPort::new();
    let state = live_state(&mock).await;

    let resp = get(&state, "/write/hello%20world").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "hello world");
    assert_eq!(&mock.written_data()[..], b"hello world");
}

#[tokio::test]
async fn write_keeps_slashes_in_payload() {
    let mock = MockPort::new();
    let state = live_state(&mock).await;

    let resp = get(&state, "/write/a/b%2Fc").await;
    assert_eq!(body_text(resp).await, "a/b/c");
    assert_eq!(&mock.written_data()[..], b"a/b/c");
}

#[tokio::test]
async fn writecf_appends_terminator() {
    let mock = MockPort::new();
    let state = live_state(&mock).await;

    let resp = get(&state, "/writecf/abc").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "abc");
    assert_eq!(&mock.written_data()[..], b"abc\r\n");
}

#[tokio::test]
async fn post_write_forwards_payload_and_echoes_body() {
    let mock = MockPort::new();
    let state = live_state(&mock).await;

    let body = serde_json::json!({ "payload": "P1 255", "source": "ui" });
    let req = Request::builder()
        .method("POST")
        .uri("/write")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = build_router(state.clone()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let echoed: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(echoed, body);
    assert_eq!(&mock.written_data()[..], b"P1 255");
}

#[tokio::test]
async fn post_write_without_payload_is_rejected() {
    let mock = MockPort::new();
    let state = live_state(&mock).await;

    let req = Request::builder()
        .method("POST")
        .uri("/write")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"value": 1}"#))
        .unwrap();
    let resp = build_router(state).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(mock.written_data().is_empty());
}

#[tokio::test]
async fn post_write_accepts_form_body() {
    let mock = MockPort::new();
    let state = live_state(&mock).await;

    let req = Request::builder()
        .method("POST")
        .uri("/write")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("payload=abc&source=ui"))
        .unwrap();
    let resp = build_router(state).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let echoed: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(echoed, serde_json::json!({ "payload": "abc", "source": "ui" }));
    assert_eq!(&mock.written_data()[..], b"abc");
}

#[tokio::test]
async fn routes_answer_without_trailing_slash() {
    let mock = MockPort::new();
    let state = live_state(&mock).await;

    for uri in ["/read", "/lastread", "/readout"] {
        let resp = get(&state, uri).await;
        assert_eq!(resp.status(), StatusCode::OK, "{uri}");
    }
    assert_eq!(body_text(get(&state, "/lastread").await).await, "0");

    let resp = get(&state, "/stop").await;
    assert_eq!(body_text(resp).await, "Server shut down");
    assert!(state.shutdown.is_cancelled());
}

#[tokio::test]
async fn lastread_is_zero_before_data() {
    let mock = MockPort::new();
    let state = live_state(&mock).await;

    let resp = get(&state, "/lastread/").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "0");
}

#[tokio::test]
async fn read_returns_buffer() {
    let mock = MockPort::new();
    let state = live_state(&mock).await;
    let mut rx = state.forwarder.subscribe();

    mock.queue_read(b"7,8\r\n");
    let chunk = loop {
        match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
            Ok(Ok(BridgeEvent::Data(chunk))) => break chunk,
            Ok(Ok(_)) => continue,
            other => panic!("no data event: {other:?}"),
        }
    };

    assert_eq!(body_text(get(&state, "/read/").await).await, chunk);
    let stamp = chunk.split(',').next().unwrap();
    assert_eq!(body_text(get(&state, "/lastread/").await).await, stamp);
}

#[tokio::test]
async fn write_after_port_loss_is_unavailable() {
    let mock = MockPort::new();
    let state = live_state(&mock).await;
    let mut rx = state.forwarder.subscribe();

    mock.hang_up();
    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event, BridgeEvent::Disconnected);

    let resp = get(&state, "/write/ping").await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn readout_page_served() {
    let mock = MockPort::new();
    let state = live_state(&mock).await;

    for uri in ["/", "/readout/"] {
        let resp = get(&state, uri).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_text(resp).await.contains("/ws"));
    }
}

#[tokio::test]
async fn stop_acknowledges_and_cancels() {
    let mock = MockPort::new();
    let state = live_state(&mock).await;

    let resp = get(&state, "/stop/").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "Server shut down");
    assert!(state.shutdown.is_cancelled());
}

#[tokio::test]
async fn simulated_read_returns_six_values() {
    let state = AppState::new(
        Arc::new(SimulatedForwarder::new("/dev/null", 9600, 64)),
        CancellationToken::new(),
    );

    let line = body_text(get(&state, "/read/").await).await;
    let values: Vec<u32> = line.split(',').map(|v| v.parse().unwrap()).collect();
    assert_eq!(values.len(), 6);
    assert!(values.iter().all(|&v| v < 12_300));
    assert_ne!(body_text(get(&state, "/lastread/").await).await, "0");
}

#[tokio::test]
async fn websocket_streams_data_and_forwards_input() {
    let mock = MockPort::new();
    let state = live_state(&mock).await;
    let token = state.shutdown.clone();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(shutdown::serve(
        listener,
        build_router(state),
        token.clone(),
        ShutdownPlan::default(),
    ));

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();

    let next_json = |msg: Option<Result<Message, _>>| -> serde_json::Value {
        match msg {
            Some(Ok(Message::Text(text))) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    };

    // Replay of the (empty) buffer on connect.
    let replay = next_json(socket.next().await);
    assert_eq!(replay, serde_json::json!({ "event": "data", "payload": "" }));

    mock.queue_read(b"42,43\r\n");
    let data = next_json(
        tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .unwrap(),
    );
    assert_eq!(data["event"], "data");
    assert!(data["payload"].as_str().unwrap().ends_with(",42,43\r\n"));

    socket
        .send(Message::Text(r#"{"event":"input","payload":"M1"}"#.into()))
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while mock.written_data() != b"M1\r\n" {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("input was not forwarded");

    token.cancel();
    let closed = tokio::time::timeout(Duration::from_secs(2), socket.next())
        .await
        .unwrap();
    assert!(matches!(closed, Some(Ok(Message::Close(_))) | None));

    let outcome = tokio::time::timeout(Duration::from_secs(6), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome, ShutdownOutcome::Graceful);
}
