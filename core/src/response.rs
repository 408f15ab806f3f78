//! Translation of transport responses into framework responses.
//!
//! A response announcing no content (status 204, or a `content-length` of
//! exactly zero) never exposes its body: the native body is closed here and
//! any error from closing it is dropped, since nobody will read it. Every
//! other body is handed to the caller unread and unclosed.

use tracing::debug;

use crate::http::{EntityStream, Headers, InboundResponse};
use crate::transport::TransportResponse;

pub const NO_CONTENT: u16 = 204;

pub fn to_inbound(response: TransportResponse) -> InboundResponse {
    let (status, native_headers, body) = response.into_parts();

    let mut headers = Headers::new();
    for (name, value) in native_headers.pairs() {
        headers.add(name, value);
    }

    let entity = match body {
        Some(body) if announces_no_content(status, &headers) => {
            if let Err(err) = body.close() {
                debug!(status, error = %err, "ignoring close error on discarded body");
            }
            None
        }
        Some(body) => Some(EntityStream::new(body)),
        None => None,
    };

    InboundResponse::new(status, headers, entity)
}

fn announces_no_content(status: u16, headers: &Headers) -> bool {
    status == NO_CONTENT
        || headers
            .get("content-length")
            .and_then(|value| value.trim().parse::<u64>().ok())
            == Some(0)
}
