//! Verify request and response translation against JSON test vectors stored
//! in `test-vectors/`.
//!
//! Each translation case describes client properties, a framework request
//! and the expected transport-side builder and body plan. Each response case
//! describes a transport response and what the framework should see.

use std::io::{self, Cursor, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use connector_core::response::to_inbound;
use connector_core::translate::translate;
use connector_core::{
    BodySource, ConnectorConfig, Entity, Headers, OutboundRequest, ProcessingError, Properties,
    ResponseBody, TransportResponse,
};
use serde_json::Value;

fn properties(value: &Value) -> Properties {
    let mut props = Properties::new();
    for (key, value) in value.as_object().unwrap() {
        props.set(key, value.clone());
    }
    props
}

fn headers(value: &Value) -> Vec<(String, String)> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|h| {
            let arr = h.as_array().unwrap();
            (arr[0].as_str().unwrap().to_string(), arr[1].as_str().unwrap().to_string())
        })
        .collect()
}

fn entity(value: &Value) -> Entity {
    match value["kind"].as_str().unwrap() {
        "none" => Entity::None,
        "text" => Entity::Text(value["value"].as_str().unwrap().to_string()),
        "bytes" => Entity::Bytes(Bytes::from(value["value"].as_str().unwrap().to_string())),
        "json" => Entity::json(value["value"].clone()),
        other => panic!("unknown entity kind: {other}"),
    }
}

fn request(value: &Value) -> OutboundRequest {
    let mut request = OutboundRequest::new(
        value["method"].as_str().unwrap(),
        value["uri"].as_str().unwrap(),
    )
    .entity(entity(&value["entity"]));
    for (name, v) in headers(&value["headers"]) {
        request = request.header(&name, &v);
    }
    request.properties = properties(&value["properties"]);
    request
}

// ---------------------------------------------------------------------------
// Translation
// ---------------------------------------------------------------------------

#[test]
fn translate_test_vectors() {
    let raw = include_str!("../../test-vectors/translate.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let client = ConnectorConfig::from_properties(&properties(&case["client"])).unwrap();
        let request = request(&case["request"]);
        let expected = &case["expected"];

        let t = translate(&request, &client).unwrap();
        assert_eq!(t.builder.method(), expected["method"].as_str().unwrap(), "{name}: method");
        assert_eq!(t.builder.uri(), expected["uri"].as_str().unwrap(), "{name}: uri");

        let actual_headers: Vec<(String, String)> = t
            .builder
            .headers()
            .pairs()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect();
        assert_eq!(actual_headers, headers(&expected["headers"]), "{name}: headers");

        let expected_timeout = expected["read_timeout_ms"].as_u64().map(Duration::from_millis);
        assert_eq!(t.read_timeout, expected_timeout, "{name}: read timeout");
        let built = t.builder.clone().build(BodySource::Empty);
        assert_eq!(built.timeout(), expected_timeout, "{name}: request timeout");
        assert_eq!(t.body.kind(), expected["body"].as_str().unwrap(), "{name}: body");

        let again = translate(&request, &client).unwrap();
        assert_eq!(again.builder, t.builder, "{name}: translation is repeatable");
    }
}

#[test]
fn translate_error_vectors() {
    let raw = include_str!("../../test-vectors/translate.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in vectors["error_cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let props = properties(&case["properties"]);

        let mut request = OutboundRequest::get("http://localhost:8080/ping");
        request.properties = props.clone();
        let err = translate(&request, &ConnectorConfig::default()).unwrap_err();
        assert!(matches!(err, ProcessingError::Config(_)), "{name}: request scope");

        assert!(
            ConnectorConfig::from_properties(&props).is_err(),
            "{name}: client scope"
        );
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// In-memory body that records whether it was closed.
struct RecordingBody {
    inner: Cursor<Vec<u8>>,
    closed: Arc<AtomicBool>,
}

impl Read for RecordingBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl ResponseBody for RecordingBody {
    fn close(self: Box<Self>) -> io::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn response_test_vectors() {
    let raw = include_str!("../../test-vectors/response.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let status = case["status"].as_u64().unwrap() as u16;
        let expected = &case["expected"];

        let mut native_headers = Headers::new();
        for (n, v) in headers(&case["headers"]) {
            native_headers.add(&n, &v);
        }
        let closed = Arc::new(AtomicBool::new(false));
        let body = RecordingBody {
            inner: Cursor::new(case["body"].as_str().unwrap().as_bytes().to_vec()),
            closed: Arc::clone(&closed),
        };

        let mut inbound = to_inbound(TransportResponse::new(
            status,
            native_headers.clone(),
            Box::new(body),
        ));

        assert_eq!(inbound.status, status, "{name}: status");
        assert_eq!(inbound.headers, native_headers, "{name}: headers");
        assert_eq!(
            inbound.has_entity(),
            expected["has_entity"].as_bool().unwrap(),
            "{name}: has_entity"
        );
        assert_eq!(
            closed.load(Ordering::SeqCst),
            expected["closed_by_connector"].as_bool().unwrap(),
            "{name}: closed by connector"
        );
        if let Some(text) = expected["entity"].as_str() {
            assert_eq!(inbound.read_entity_string().unwrap(), text, "{name}: entity");
            assert!(closed.load(Ordering::SeqCst), "{name}: reading closes the entity");
        }
    }
}
