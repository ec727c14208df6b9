use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use formrelay::transport::Transport;
use formrelay::{spawn, ClientConfig, Engine, HttpTransport, RecordingHost, TransportError, WidgetRegistry};
use tokio::net::TcpListener;
use tokio::time::Instant;
use url::Url;

type Received = Arc<Mutex<Vec<String>>>;

async fn xforms_server(State(received): State<Received>, headers: HeaderMap, body: String) -> (StatusCode, String) {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    received.lock().unwrap().push(body);
    if content_type != "application/xml" {
        return (StatusCode::UNSUPPORTED_MEDIA_TYPE, String::new());
    }
    (
        StatusCode::OK,
        concat!(
            "<xxf:event-response xmlns:xxf=\"http://orbeon.org/oxf/xml/xforms\">",
            "<xxf:dynamic-state>D1</xxf:dynamic-state>",
            "<xxf:action><xxf:control-values>",
            "<xxf:control id=\"age\">43</xxf:control>",
            "</xxf:control-values></xxf:action>",
            "</xxf:event-response>"
        )
        .to_string(),
    )
}

async fn broken() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn start_server() -> (SocketAddr, Received) {
    let received = Received::default();
    let app = Router::new()
        .route("/xforms-server", post(xforms_server))
        .route("/broken", post(broken))
        .with_state(received.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, received)
}

#[tokio::test]
async fn posts_xml_and_returns_body() {
    let (addr, received) = start_server().await;
    let transport = HttpTransport::new(Url::parse(&format!("http://{addr}/xforms-server")).unwrap()).unwrap();
    let response = transport.post("<xxf:event-request/>".to_string()).await.unwrap();
    assert!(response.contains("D1"));
    assert_eq!(received.lock().unwrap().as_slice(), ["<xxf:event-request/>"]);
}

#[tokio::test]
async fn error_status_is_a_transport_failure() {
    let (addr, _received) = start_server().await;
    let transport = HttpTransport::new(Url::parse(&format!("http://{addr}/broken")).unwrap()).unwrap();
    let err = transport.post("<x/>".to_string()).await.unwrap_err();
    assert_eq!(err, TransportError::Status(500));
}

#[tokio::test]
async fn round_trip_against_form_server() {
    let (addr, received) = start_server().await;
    let config = ClientConfig {
        server_url: format!("http://{addr}/xforms-server"),
        ..ClientConfig::default()
    };
    let page = concat!(
        r#"<form id="f" class="xforms-form">"#,
        r#"<input type="hidden" name="$static-state" value="S">"#,
        r#"<input type="hidden" name="$dynamic-state" value="D0">"#,
        r#"<span id="age" class="xforms-control xforms-input"><input value=""></span>"#,
        r#"</form>"#
    );
    let engine = Engine::load(
        page,
        &config,
        WidgetRegistry::with_builtins(),
        Box::new(RecordingHost::new()),
        Instant::now(),
    );
    let transport = HttpTransport::new(config.server_url().unwrap()).unwrap();
    let client = spawn(engine, Arc::new(transport));

    client.set_value("age", "a<b&c>").await.unwrap();
    client.when_idle().await.unwrap();

    let bodies = received.lock().unwrap().clone();
    assert_eq!(bodies.len(), 1);
    assert!(bodies[0].contains(">a&lt;b&amp;c></xxf:event>"));
    assert_eq!(client.get_value("age").await.unwrap(), "43");
    assert!(client.take_reports().await.unwrap().is_empty());
}
