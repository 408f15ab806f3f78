//! Translation of framework requests into transport requests.
//!
//! # Design
//! Translation only reads the `OutboundRequest`; it never consumes the
//! entity, so the same request can be translated any number of times. The
//! entity kind is resolved here into a `BodyPlan` and never re-inspected
//! downstream. The builder is returned without a body because a streamed
//! body only exists once the bridge has connected its pipe.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::config::{ConnectorConfig, TransferMode, READ_TIMEOUT};
use crate::error::ProcessingError;
use crate::http::{Entity, EntityWriter, OutboundRequest};
use crate::transport::{TransportRequest, TransportRequestBuilder};

/// How the request body reaches the transport.
#[derive(Clone)]
pub enum BodyPlan {
    Empty,
    Fixed(Bytes),
    /// Run the writer into memory (at most `capacity` bytes), then send fixed.
    Buffered {
        writer: Arc<dyn EntityWriter>,
        capacity: usize,
    },
    /// Pipe the writer's output to the transport while sending.
    Streaming(Arc<dyn EntityWriter>),
}

impl BodyPlan {
    pub fn kind(&self) -> &'static str {
        match self {
            BodyPlan::Empty => "empty",
            BodyPlan::Fixed(_) => "fixed",
            BodyPlan::Buffered { .. } => "buffered",
            BodyPlan::Streaming(_) => "streaming",
        }
    }
}

impl std::fmt::Debug for BodyPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())
    }
}

/// Result of translating one request.
#[derive(Debug)]
pub struct Translation {
    pub builder: TransportRequestBuilder,
    /// `None` means wait indefinitely.
    pub read_timeout: Option<Duration>,
    pub body: BodyPlan,
}

pub fn translate(
    request: &OutboundRequest,
    client: &ConnectorConfig,
) -> Result<Translation, ProcessingError> {
    let props = &request.properties;
    let read_timeout = match props.duration_millis(READ_TIMEOUT)? {
        Some(timeout) => Some(timeout),
        None if props.get(READ_TIMEOUT).is_some() => None,
        None => client.read_timeout,
    };
    let transfer_mode = props.transfer_mode()?.unwrap_or(client.transfer_mode);
    let capacity = props.buffer_capacity()?.unwrap_or(client.buffer_capacity);

    let mut builder = TransportRequest::builder(&request.method, &request.uri);
    for (name, value) in request.headers.pairs() {
        builder = builder.header(name, value);
    }
    if let Some(timeout) = read_timeout {
        builder = builder.timeout(timeout);
    }

    let body = match &request.entity {
        Entity::None => BodyPlan::Empty,
        Entity::Bytes(bytes) => BodyPlan::Fixed(bytes.clone()),
        Entity::Text(text) => BodyPlan::Fixed(Bytes::from(text.clone())),
        Entity::Stream(writer) => match transfer_mode {
            TransferMode::Buffered => BodyPlan::Buffered {
                writer: Arc::clone(writer),
                capacity,
            },
            TransferMode::Chunked => BodyPlan::Streaming(Arc::clone(writer)),
        },
    };

    Ok(Translation {
        builder,
        read_timeout,
        body,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::config::TRANSFER_MODE;
    use crate::error::ConfigError;
    use crate::transport::BodySource;

    fn streaming_request() -> OutboundRequest {
        OutboundRequest::post(
            "http://localhost:8080/upload",
            Entity::stream(|sink: &mut dyn Write| sink.write_all(b"payload")),
        )
        .header("Accept", "application/json")
        .header("X-Tag", "one")
        .header("x-tag", "two")
    }

    #[test]
    fn headers_are_copied_value_by_value() {
        let t = translate(&streaming_request(), &ConnectorConfig::default()).unwrap();
        assert_eq!(t.builder.method(), "POST");
        assert_eq!(t.builder.uri(), "http://localhost:8080/upload");
        assert_eq!(t.builder.headers().get_all("x-tag"), ["one", "two"]);
        assert_eq!(t.builder.headers().get("accept"), Some("application/json"));
    }

    #[test]
    fn translating_twice_gives_equivalent_requests() {
        let request = streaming_request();
        let first = translate(&request, &ConnectorConfig::default()).unwrap();
        let second = translate(&request, &ConnectorConfig::default()).unwrap();
        assert_eq!(first.builder, second.builder);
        assert_eq!(first.body.kind(), second.body.kind());
    }

    #[test]
    fn in_memory_entities_never_need_the_bridge() {
        let config = ConnectorConfig::default();
        let cases = [
            (Entity::None, "empty"),
            (Entity::Bytes(Bytes::from_static(b"raw")), "fixed"),
            (Entity::Text("text".to_string()), "fixed"),
        ];
        for (entity, kind) in cases {
            let request = OutboundRequest::new("PUT", "http://h/").entity(entity);
            assert_eq!(translate(&request, &config).unwrap().body.kind(), kind);
        }
    }

    #[test]
    fn text_becomes_utf8_bytes() {
        let request = OutboundRequest::post("http://h/", Entity::Text("héllo".to_string()));
        let t = translate(&request, &ConnectorConfig::default()).unwrap();
        match t.body {
            BodyPlan::Fixed(bytes) => assert_eq!(bytes.as_ref(), "héllo".as_bytes()),
            other => panic!("expected fixed body, got {other:?}"),
        }
    }

    #[test]
    fn request_read_timeout_overrides_client() {
        let client = ConnectorConfig {
            read_timeout: Some(Duration::from_secs(30)),
            ..ConnectorConfig::default()
        };
        let request = OutboundRequest::get("http://h/").property(READ_TIMEOUT, 1500);
        let t = translate(&request, &client).unwrap();
        assert_eq!(t.read_timeout, Some(Duration::from_millis(1500)));

        let built = t.builder.build(BodySource::Empty);
        assert_eq!(built.timeout(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn client_read_timeout_is_the_fallback() {
        let client = ConnectorConfig {
            read_timeout: Some(Duration::from_secs(2)),
            ..ConnectorConfig::default()
        };
        let t = translate(&OutboundRequest::get("http://h/"), &client).unwrap();
        assert_eq!(t.read_timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn non_positive_request_timeout_disables_client_timeout() {
        let client = ConnectorConfig {
            read_timeout: Some(Duration::from_secs(2)),
            ..ConnectorConfig::default()
        };
        let request = OutboundRequest::get("http://h/").property(READ_TIMEOUT, 0);
        let t = translate(&request, &client).unwrap();
        assert_eq!(t.read_timeout, None);
        assert_eq!(t.builder.build(BodySource::Empty).timeout(), None);
    }

    #[test]
    fn buffered_mode_is_selected_per_request() {
        let request = streaming_request().property(TRANSFER_MODE, "BUFFERED");
        let t = translate(&request, &ConnectorConfig::default()).unwrap();
        assert_eq!(t.body.kind(), "buffered");

        let t = translate(&streaming_request(), &ConnectorConfig::default()).unwrap();
        assert_eq!(t.body.kind(), "streaming");
    }

    #[test]
    fn malformed_request_timeout_is_a_config_error() {
        let request = OutboundRequest::get("http://h/").property(READ_TIMEOUT, true);
        let err = translate(&request, &ConnectorConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            ProcessingError::Config(ConfigError::InvalidValue { .. })
        ));
    }
}
