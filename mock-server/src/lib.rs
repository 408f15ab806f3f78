use std::collections::BTreeMap;
use std::time::Duration;

use axum::{
    body::Body,
    extract::Query,
    http::{HeaderMap, StatusCode},
    response::AppendHeaders,
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Payload echoed by `POST /post`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Data {
    pub data: String,
}

/// Answer of `POST /upload`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UploadSummary {
    pub bytes: u64,
}

#[derive(Debug, Deserialize)]
pub struct Trickle {
    #[serde(default)]
    pub chunks: u32,
    #[serde(rename = "intervalInMilliseconds", default)]
    pub interval_millis: u64,
}

#[derive(Debug, Deserialize)]
pub struct Sleep {
    #[serde(rename = "sleepTimeInMilliseconds", default)]
    pub millis: u64,
}

pub fn app() -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/pingWithSleep", get(ping_with_sleep))
        .route("/post", post(echo_data))
        .route("/upload", post(upload))
        .route("/uploadWithSleep", post(upload_with_sleep))
        .route("/trickle", get(trickle))
        .route("/noContent", get(no_content))
        .route("/empty", get(empty))
        .route("/multiHeader", get(multi_header))
        .route("/headers", get(echo_headers).post(echo_headers))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "mock server listening");
    }
    axum::serve(listener, app()).await
}

async fn ping() -> StatusCode {
    StatusCode::OK
}

async fn ping_with_sleep(Query(sleep): Query<Sleep>) -> String {
    debug!(millis = sleep.millis, "sleeping before answering");
    tokio::time::sleep(Duration::from_millis(sleep.millis)).await;
    sleep.millis.to_string()
}

async fn echo_data(Json(data): Json<Data>) -> Json<Data> {
    Json(data)
}

async fn upload(body: Body) -> Result<Json<UploadSummary>, StatusCode> {
    let mut stream = body.into_data_stream();
    let mut bytes = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|_| StatusCode::BAD_REQUEST)?;
        bytes += chunk.len() as u64;
    }
    debug!(bytes, "upload received");
    Ok(Json(UploadSummary { bytes }))
}

/// Sleeps without reading the request body, so a large upload stalls.
async fn upload_with_sleep(Query(sleep): Query<Sleep>, _body: Body) -> String {
    tokio::time::sleep(Duration::from_millis(sleep.millis)).await;
    sleep.millis.to_string()
}

/// Sends the head at once, then one `x` per chunk with a pause before each.
async fn trickle(Query(trickle): Query<Trickle>) -> Body {
    let interval = Duration::from_millis(trickle.interval_millis);
    let chunks = futures::stream::iter(0..trickle.chunks).then(move |_| async move {
        tokio::time::sleep(interval).await;
        Ok::<_, std::io::Error>(vec![b'x'])
    });
    Body::from_stream(chunks)
}

async fn no_content() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn empty() -> (StatusCode, &'static str) {
    (StatusCode::OK, "")
}

async fn multi_header() -> (AppendHeaders<[(&'static str, &'static str); 2]>, &'static str) {
    (
        AppendHeaders([("x-multi", "one"), ("x-multi", "two")]),
        "multi",
    )
}

/// Request headers as name to every value, in arrival order.
async fn echo_headers(headers: HeaderMap) -> Json<BTreeMap<String, Vec<String>>> {
    let mut echoed: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers.iter() {
        echoed
            .entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    Json(echoed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uses_plain_field_name() {
        let json = serde_json::to_value(Data {
            data: "hello".to_string(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "data": "hello" }));
    }

    #[test]
    fn sleep_query_defaults_to_zero() {
        let sleep: Sleep = serde_json::from_str("{}").unwrap();
        assert_eq!(sleep.millis, 0);
        let sleep: Sleep = serde_json::from_str(r#"{"sleepTimeInMilliseconds":250}"#).unwrap();
        assert_eq!(sleep.millis, 250);
    }
}
